//! Version-control archive of applied scripts. Each successful apply commits
//! its implementation and rollback scripts together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

const LOG_FORMAT: &str = "--format=%H|%ai|%an|%ae|%s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedScript {
    /// `implementation` or `rollback`.
    pub action: String,
    pub content: String,
}

impl ArchivedScript {
    pub fn new(action: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub environment: String,
    pub user: Option<String>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub rows_affected: Option<u64>,
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReceipt {
    pub commit_id: String,
    pub files: Vec<String>,
}

#[async_trait]
pub trait ScriptArchive: Send + Sync {
    /// Stores every non-blank script and commits them as one unit.
    async fn record_scripts(
        &self,
        scripts: &[ArchivedScript],
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveReceipt>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub hash: String,
    pub short_hash: String,
    pub date: String,
    pub author: String,
    pub email: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDetails {
    pub commit: CommitSummary,
    pub metadata: BTreeMap<String, String>,
    pub files: Vec<String>,
    pub diff: String,
}

/// Git repository holding archived scripts under `scripts_dir`.
pub struct GitArchive {
    repo_dir: PathBuf,
    scripts_dir: String,
}

impl GitArchive {
    pub fn new(repo_dir: impl Into<PathBuf>, scripts_dir: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn scripts_path(&self) -> PathBuf {
        self.repo_dir.join(&self.scripts_dir)
    }

    fn is_repository(&self) -> bool {
        self.repo_dir.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .context("Failed to run git")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.first().unwrap_or(&""), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ensure_repository(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.scripts_path())
            .await
            .with_context(|| format!("Failed to create {}", self.scripts_path().display()))?;
        if self.is_repository() {
            return Ok(());
        }
        self.git(&["init"]).await?;
        self.git(&["config", "user.name", "ddlplan"]).await?;
        self.git(&["config", "user.email", "ddlplan@localhost"]).await?;
        info!(repo = %self.repo_dir.display(), "initialized script archive");
        Ok(())
    }

    /// Most recent commits, newest first. An uninitialized archive has no history.
    pub async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>> {
        if !self.is_repository() {
            return Ok(Vec::new());
        }
        let limit = limit.to_string();
        let stdout = self.git(&["log", "-n", limit.as_str(), LOG_FORMAT]).await?;
        Ok(parse_log(&stdout))
    }

    /// Commits whose message mentions `schema.name`.
    pub async fn object_history(
        &self,
        schema: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CommitSummary>> {
        if !self.is_repository() {
            return Ok(Vec::new());
        }
        let limit = limit.to_string();
        let grep = format!("--grep={schema}.{name}");
        let stdout = self
            .git(&["log", "-n", limit.as_str(), "--fixed-strings", grep.as_str(), LOG_FORMAT])
            .await?;
        Ok(parse_log(&stdout))
    }

    pub async fn commit_details(&self, hash: &str) -> Result<CommitDetails> {
        let header = self
            .git(&["show", "-s", "--format=%H|%ai|%an|%ae|%B", hash])
            .await?;
        let commit = parse_log_line(&header)
            .ok_or_else(|| anyhow!("Unexpected git show output for {hash}"))?;
        let files = self
            .git(&["show", "--name-only", "--format=", hash])
            .await?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        let diff = self.git(&["show", hash]).await?;
        let metadata = parse_commit_metadata(&header);
        Ok(CommitDetails {
            commit,
            metadata,
            files,
            diff,
        })
    }

    async fn write_script(&self, file_name: &str, content: &str) -> Result<()> {
        let path = self.scripts_path().join(file_name);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[async_trait]
impl ScriptArchive for GitArchive {
    async fn record_scripts(
        &self,
        scripts: &[ArchivedScript],
        metadata: &ArchiveMetadata,
    ) -> Result<ArchiveReceipt> {
        self.ensure_repository().await?;

        let stamp = file_timestamp(&metadata.timestamp);
        let mut files = Vec::new();
        for script in scripts.iter().filter(|s| !s.content.trim().is_empty()) {
            let action = script.action.to_lowercase();
            let tracked = script_file_name(&stamp, &action, metadata, false);
            let clean = script_file_name(&stamp, &action, metadata, true);
            let headed = format!("{}{}", tracking_header(&action, metadata), script.content);
            self.write_script(&tracked, &headed).await?;
            self.write_script(&clean, &script.content).await?;
            for file in [&tracked, &clean] {
                let relative = Path::new(&self.scripts_dir)
                    .join(file)
                    .to_string_lossy()
                    .into_owned();
                self.git(&["add", "--", relative.as_str()]).await?;
            }
            files.push(tracked);
            files.push(clean);
        }
        if files.is_empty() {
            return Err(anyhow!("No scripts to archive"));
        }

        let has_rollback = scripts.iter().any(|s| s.action.eq_ignore_ascii_case("rollback"));
        let mut args: Vec<String> = vec!["commit".to_string()];
        for line in commit_message(metadata, has_rollback, &files) {
            args.push("-m".to_string());
            args.push(line);
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git(&args).await?;

        let commit_id = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
        debug!(commit = %commit_id, files = files.len(), "scripts archived");
        Ok(ArchiveReceipt { commit_id, files })
    }
}

/// ISO timestamp with `:` and `.` replaced, to the second.
fn file_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H-%M-%S").to_string()
}

fn file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn user_or_default(metadata: &ArchiveMetadata) -> &str {
    metadata.user.as_deref().filter(|u| !u.is_empty()).unwrap_or("system")
}

/// `<ts>_<action>_<env>_<user>_<corr8>[_clean].sql`
pub fn script_file_name(stamp: &str, action: &str, metadata: &ArchiveMetadata, clean: bool) -> String {
    let correlation: String = metadata
        .correlation_id
        .as_deref()
        .map(|c| c.chars().take(8).collect())
        .filter(|c: &String| !c.is_empty())
        .unwrap_or_else(|| "manual".to_string());
    format!(
        "{stamp}_{}_{}_{}_{}{}.sql",
        file_component(action),
        file_component(&metadata.environment),
        file_component(user_or_default(metadata)),
        file_component(&correlation),
        if clean { "_clean" } else { "" }
    )
}

fn or_na(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| "N/A".to_string())
}

fn objects_line(metadata: &ArchiveMetadata) -> String {
    or_na(Some(metadata.objects.join(", ")))
}

pub fn tracking_header(action: &str, metadata: &ArchiveMetadata) -> String {
    format!(
        "-- Script Tracking\n\
         -- Timestamp: {}\n\
         -- Environment: {}\n\
         -- User: {}\n\
         -- Action: {action}\n\
         -- Correlation ID: {}\n\
         -- Rows Affected: {}\n\
         -- Object(s): {}\n\n",
        metadata.timestamp.to_rfc3339(),
        metadata.environment,
        user_or_default(metadata),
        or_na(metadata.correlation_id.clone()),
        or_na(metadata.rows_affected.map(|r| r.to_string())),
        objects_line(metadata),
    )
}

/// One line per `-m`: a title followed by `Key: value` lines.
pub fn commit_message(metadata: &ArchiveMetadata, has_rollback: bool, files: &[String]) -> Vec<String> {
    let action = metadata.action.to_uppercase();
    let user = user_or_default(metadata);
    let title = if has_rollback && !metadata.action.eq_ignore_ascii_case("rollback") {
        format!("{action}(+RB): {} - {user}", metadata.environment)
    } else {
        format!("{action}: {} - {user}", metadata.environment)
    };
    vec![
        title,
        format!("Environment: {}", metadata.environment),
        format!("User: {user}"),
        format!("Action: {}", metadata.action),
        format!("Timestamp: {}", metadata.timestamp.to_rfc3339()),
        format!("Correlation ID: {}", or_na(metadata.correlation_id.clone())),
        format!("Rows Affected: {}", or_na(metadata.rows_affected.map(|r| r.to_string()))),
        format!("Objects: {}", objects_line(metadata)),
        format!("Files: {}", files.join(", ")),
    ]
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+)(?:\(\+RB\))?:\s*(\w+)\s*-\s*(\S+)").expect("valid regex"))
}

fn parse_log_line(line: &str) -> Option<CommitSummary> {
    let mut parts = line.splitn(5, '|');
    let hash = parts.next()?.trim().to_string();
    let date = parts.next()?.trim().to_string();
    let author = parts.next()?.trim().to_string();
    let email = parts.next()?.trim().to_string();
    let message = parts.next()?.trim().to_string();
    if hash.is_empty() {
        return None;
    }
    let title = title_re().captures(&message);
    let capture = |idx: usize| title.as_ref().and_then(|c| c.get(idx)).map(|m| m.as_str().to_string());
    Some(CommitSummary {
        short_hash: hash.chars().take(8).collect(),
        action: capture(1).map(|a| a.to_lowercase()),
        environment: capture(2),
        user: capture(3),
        hash,
        date,
        author,
        email,
        message,
    })
}

pub fn parse_log(stdout: &str) -> Vec<CommitSummary> {
    stdout.lines().filter_map(parse_log_line).collect()
}

/// `Key: value` lines of a commit message written by [`commit_message`].
pub fn parse_commit_metadata(message: &str) -> BTreeMap<String, String> {
    const KEYS: [(&str, &str); 7] = [
        ("Environment", "environment"),
        ("User", "user"),
        ("Action", "action"),
        ("Timestamp", "timestamp"),
        ("Correlation ID", "correlationId"),
        ("Rows Affected", "rowsAffected"),
        ("Objects", "objects"),
    ];
    let mut metadata = BTreeMap::new();
    for line in message.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if let Some((_, field)) = KEYS.iter().find(|(k, _)| k.eq_ignore_ascii_case(key.trim())) {
            metadata
                .entry(field.to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }
    metadata
}
