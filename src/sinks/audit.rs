//! Audit trail for apply and rollback runs: a JSONL file and an optional
//! `dbo.ddl_audit` table in the target environment.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::db::{ConnectionProvider, ResultSet, SqlSession};

const PREVIEW_CHARS: usize = 1000;
pub const DEFAULT_AUDIT_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(rename = "env")]
    pub environment: String,
    pub dry_run: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub script_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

/// First [`PREVIEW_CHARS`] characters of a script.
pub fn script_preview(script: &str) -> String {
    script.chars().take(PREVIEW_CHARS).collect()
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Writes `entry` to every sink. Sinks are independent: a failure is logged
/// and the remaining sinks still run.
pub async fn record_all(sinks: &[&dyn AuditSink], entry: &AuditEntry) {
    for sink in sinks {
        match sink.record(entry).await {
            Ok(()) => debug!(sink = sink.name(), action = %entry.action, "audit recorded"),
            Err(err) => warn!(sink = sink.name(), error = %format!("{err:#}"), "audit write failed"),
        }
    }
}

/// Appends one JSON object per line.
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Last `limit` entries of the audit file, oldest first. Lines that are not
/// JSON come back as `{"raw": line}`.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<JsonValue>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..]
        .iter()
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|_| serde_json::json!({ "raw": line }))
        })
        .collect())
}

const ENSURE_AUDIT_TABLE: &str = "IF OBJECT_ID('dbo.ddl_audit','U') IS NULL BEGIN
  CREATE TABLE dbo.ddl_audit (
    id INT IDENTITY(1,1) PRIMARY KEY,
    [timestamp] DATETIME2 NULL,
    [action] NVARCHAR(50) NULL,
    [env] NVARCHAR(50) NULL,
    [dryRun] BIT NULL,
    [success] BIT NULL,
    [rowsAffected] NVARCHAR(MAX) NULL,
    [error] NVARCHAR(MAX) NULL,
    [scriptPreview] NVARCHAR(MAX) NULL,
    [userName] NVARCHAR(200) NULL,
    [correlationId] NVARCHAR(200) NULL,
    [gitCommit] NVARCHAR(200) NULL,
    [clientIp] NVARCHAR(200) NULL
  ); END";

const INSERT_AUDIT_ROW: &str = "INSERT INTO dbo.ddl_audit \
([timestamp],[action],[env],[dryRun],[success],[rowsAffected],[error],[scriptPreview],[userName],[correlationId],[gitCommit]) \
VALUES (CONVERT(DATETIME2, @P1, 126), @P2, @P3, CAST(@P4 AS BIT), CAST(@P5 AS BIT), \
NULLIF(@P6, ''), NULLIF(@P7, ''), @P8, NULLIF(@P9, ''), NULLIF(@P10, ''), NULLIF(@P11, ''))";

fn bit(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Audit rows in the `dbo.ddl_audit` table of the environment the entry is
/// about. Entries for environments the provider does not know are skipped.
pub struct DbAuditSink<'a, P: ?Sized> {
    provider: &'a P,
    ensured: Mutex<HashSet<String>>,
}

impl<'a, P: ConnectionProvider + ?Sized> DbAuditSink<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    fn is_ensured(&self, environment: &str) -> bool {
        self.ensured
            .lock()
            .map(|set| set.contains(environment))
            .unwrap_or(false)
    }

    async fn write(&self, session: &mut P::Session, entry: &AuditEntry) -> Result<()> {
        if !self.is_ensured(&entry.environment) {
            session
                .execute_batch(ENSURE_AUDIT_TABLE)
                .await
                .context("Failed to create dbo.ddl_audit")?;
            if let Ok(mut set) = self.ensured.lock() {
                set.insert(entry.environment.clone());
            }
        }

        let timestamp = entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let rows = entry.rows_affected.map(|r| r.to_string()).unwrap_or_default();
        let params = [
            timestamp.as_str(),
            entry.action.as_str(),
            entry.environment.as_str(),
            bit(entry.dry_run),
            bit(entry.success),
            rows.as_str(),
            entry.error.as_deref().unwrap_or(""),
            entry.script_preview.as_str(),
            entry.user.as_deref().unwrap_or(""),
            entry.correlation_id.as_deref().unwrap_or(""),
            entry.commit_id.as_deref().unwrap_or(""),
        ];
        session.query(INSERT_AUDIT_ROW, &params).await?;
        Ok(())
    }
}

#[async_trait]
impl<'a, P: ConnectionProvider + ?Sized> AuditSink for DbAuditSink<'a, P> {
    fn name(&self) -> &str {
        "database"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        if !self.provider.contains(&entry.environment) {
            debug!(environment = %entry.environment, "no connection for database audit");
            return Ok(());
        }
        let mut session = self.provider.acquire(&entry.environment).await?;
        let result = self.write(&mut session, entry).await;
        self.provider.release(session).await;
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub top: Option<usize>,
}

/// `SELECT TOP (n)` over `dbo.ddl_audit`, newest first, with the filter's
/// clauses bound as parameters.
pub fn audit_query(filter: &AuditFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut bind = |clause: &str, value: &str| {
        params.push(value.to_string());
        clauses.push(clause.replace("{}", &format!("@P{}", params.len())));
    };
    if let Some(action) = &filter.action {
        bind("[action] = {}", action);
    }
    if let Some(since) = &filter.since {
        bind("[timestamp] >= CONVERT(DATETIME2, {})", since);
    }
    if let Some(until) = &filter.until {
        bind("[timestamp] <= CONVERT(DATETIME2, {})", until);
    }
    let top = filter.top.filter(|n| *n > 0).unwrap_or(DEFAULT_AUDIT_LIMIT);
    let filter_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (
        format!("SELECT TOP ({top}) * FROM dbo.ddl_audit{filter_sql} ORDER BY id DESC"),
        params,
    )
}

pub async fn query_db_audit<S: SqlSession + ?Sized>(
    session: &mut S,
    filter: &AuditFilter,
) -> Result<ResultSet> {
    let (sql, params) = audit_query(filter);
    let params: Vec<&str> = params.iter().map(String::as_str).collect();
    let sets = session.query(&sql, &params).await?;
    Ok(sets.into_iter().next().unwrap_or_default())
}
