use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::{ExecutionReport, execute_batches};
use crate::aggregate::is_safe_identifier;
use crate::db::queries::SCHEMA_EXISTS;
use crate::db::{ConnectionProvider, SqlSession, require_environment};
use crate::error::EngineError;
use crate::sinks::{
    ArchiveMetadata, ArchivedScript, AuditEntry, AuditSink, ScriptArchive, record_all,
    script_preview,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Apply,
    Rollback,
}

impl ApplyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyAction::Apply => "apply",
            ApplyAction::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub environment: String,
    pub action: ApplyAction,
    /// Script to execute: the implementation for an apply, the rollback
    /// script for a rollback.
    pub script: String,
    /// Rollback script archived next to an applied implementation.
    pub rollback_script: Option<String>,
    pub dry_run: bool,
    pub auto_create_schemas: bool,
    pub user: Option<String>,
    pub correlation_id: Option<String>,
    /// `schema.name` of the objects the script touches, for the archive.
    pub objects: Vec<String>,
}

impl ApplyRequest {
    pub fn new(environment: impl Into<String>, action: ApplyAction, script: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            action,
            script: script.into(),
            rollback_script: None,
            dry_run: false,
            auto_create_schemas: false,
            user: None,
            correlation_id: None,
            objects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub success: bool,
    pub dry_run: bool,
    pub action: ApplyAction,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
    pub rows_affected: u64,
    pub completed_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<EngineError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created_schemas: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_schemas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_warning: Option<String>,
}

impl ApplyOutcome {
    fn new(request: &ApplyRequest) -> Self {
        Self {
            success: false,
            dry_run: request.dry_run,
            action: request.action,
            environment: request.environment.clone(),
            report: None,
            rows_affected: 0,
            completed_batches: 0,
            error: None,
            failure: None,
            created_schemas: Vec::new(),
            skipped_schemas: Vec::new(),
            commit_id: None,
            archive_warning: None,
        }
    }

    fn fail(&mut self, err: EngineError) {
        if let EngineError::Execution {
            rows_affected,
            completed_batches,
            ..
        } = &err
        {
            self.rows_affected = *rows_affected;
            self.completed_batches = *completed_batches;
        }
        self.success = false;
        self.error = Some(err.to_string());
        self.failure = Some(err);
    }
}

fn schema_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        const IDENT: &str = r#"([\[\]"\w]+)\s*\.\s*([\[\]"\w]+)"#;
        [
            r"(?i)\b(?:CREATE|ALTER|DROP)\s+(?:TABLE|VIEW|PROCEDURE|FUNCTION|TRIGGER)\s+",
            r#"(?i)\bCREATE\s+(?:UNIQUE\s+)?(?:(?:CLUSTERED|NONCLUSTERED)\s+)?INDEX\s+[\[\]\w".]+\s+ON\s+"#,
            r#"(?i)\bALTER\s+INDEX\s+[\[\]\w".]+\s+ON\s+"#,
            r"(?i)\bINSERT\s+INTO\s+",
            r"(?i)\bUPDATE\s+",
            r"(?i)\bDELETE\s+FROM\s+",
        ]
        .iter()
        .map(|prefix| Regex::new(&format!("{prefix}{IDENT}")).expect("valid regex"))
        .collect()
    })
}

/// Schema names referenced by schema-qualified DDL and DML targets, in order
/// of first appearance.
pub fn extract_schema_names(script: &str) -> Vec<String> {
    let mut schemas: Vec<String> = Vec::new();
    for re in schema_patterns() {
        for caps in re.captures_iter(script) {
            let schema = caps[1].trim_matches(|c: char| matches!(c, '[' | ']' | '"'));
            if !schema.is_empty() && !schemas.iter().any(|s| s == schema) {
                schemas.push(schema.to_string());
            }
        }
    }
    schemas
}

/// Creates the missing schemas among `names`. Returns `(created, skipped)`;
/// names that are not plain identifiers are skipped untouched.
async fn ensure_schemas<S: SqlSession + ?Sized>(
    session: &mut S,
    names: &[String],
) -> anyhow::Result<(Vec<String>, Vec<String>)> {
    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for name in names {
        if !is_safe_identifier(name) {
            warn!(schema = %name, "skipping schema with unsafe name");
            skipped.push(name.clone());
            continue;
        }
        let sets = session.query(SCHEMA_EXISTS, &[name.as_str()]).await?;
        let exists = sets.first().is_some_and(|set| !set.rows.is_empty());
        if !exists {
            session
                .execute_query(&format!("EXEC('CREATE SCHEMA [{name}]')"))
                .await?;
            info!(schema = %name, "schema created");
            created.push(name.clone());
        }
    }
    Ok((created, skipped))
}

async fn run<S: SqlSession + ?Sized>(
    session: &mut S,
    request: &ApplyRequest,
    outcome: &mut ApplyOutcome,
) -> Result<ExecutionReport, EngineError> {
    if request.auto_create_schemas && !request.dry_run {
        let names = extract_schema_names(&request.script);
        let (created, skipped) = ensure_schemas(session, &names).await.map_err(|err| {
            EngineError::Execution {
                batch: 0,
                message: format!("Schema check/creation failed: {err}"),
                rows_affected: 0,
                completed_batches: 0,
                dry_run: false,
            }
        })?;
        outcome.created_schemas = created;
        outcome.skipped_schemas = skipped;
    }
    execute_batches(session, &request.script, request.dry_run).await
}

async fn archive_scripts(
    archive: &dyn ScriptArchive,
    request: &ApplyRequest,
    rows_affected: u64,
) -> anyhow::Result<String> {
    let mut scripts = Vec::new();
    let action = match request.action {
        ApplyAction::Apply => {
            scripts.push(ArchivedScript::new("implementation", request.script.clone()));
            if let Some(rollback) = request.rollback_script.as_ref().filter(|s| !s.trim().is_empty()) {
                scripts.push(ArchivedScript::new("rollback", rollback.clone()));
            }
            "implementation"
        }
        ApplyAction::Rollback => {
            scripts.push(ArchivedScript::new("rollback", request.script.clone()));
            "rollback"
        }
    };
    let metadata = ArchiveMetadata {
        environment: request.environment.clone(),
        user: request.user.clone(),
        action: action.to_string(),
        timestamp: Utc::now(),
        correlation_id: request.correlation_id.clone(),
        rows_affected: Some(rows_affected),
        objects: request.objects.clone(),
    };
    let receipt = archive.record_scripts(&scripts, &metadata).await?;
    Ok(receipt.commit_id)
}

/// Runs an apply or rollback against one environment, then archives and
/// audits the run. An unknown environment is an error; every later failure
/// is reported on the returned outcome and is still audited.
pub async fn apply_script<P: ConnectionProvider + ?Sized>(
    provider: &P,
    request: &ApplyRequest,
    archive: Option<&dyn ScriptArchive>,
    audit: &[&dyn AuditSink],
) -> Result<ApplyOutcome, EngineError> {
    require_environment(provider, &request.environment)?;
    let mut outcome = ApplyOutcome::new(request);

    match provider.acquire(&request.environment).await {
        Ok(mut session) => {
            let result = run(&mut session, request, &mut outcome).await;
            provider.release(session).await;
            match result {
                Ok(report) => {
                    outcome.success = true;
                    outcome.rows_affected = report.total_rows_affected;
                    outcome.completed_batches = report.batches.len();
                    outcome.report = Some(report);
                }
                Err(err) => outcome.fail(err),
            }
        }
        Err(err) => outcome.fail(EngineError::Execution {
            batch: 0,
            message: format!("connection failed: {err:#}"),
            rows_affected: 0,
            completed_batches: 0,
            dry_run: request.dry_run,
        }),
    }

    if outcome.success && !request.dry_run {
        if let Some(archive) = archive {
            match archive_scripts(archive, request, outcome.rows_affected).await {
                Ok(commit_id) => outcome.commit_id = Some(commit_id),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "script archive failed");
                    outcome.archive_warning = Some(format!("{err:#}"));
                }
            }
        }
    }

    let entry = AuditEntry {
        timestamp: Utc::now(),
        action: request.action.as_str().to_string(),
        environment: request.environment.clone(),
        dry_run: request.dry_run,
        success: outcome.success,
        rows_affected: Some(outcome.rows_affected),
        error: outcome.error.clone(),
        script_preview: script_preview(&request.script),
        user: request.user.clone(),
        correlation_id: request.correlation_id.clone(),
        commit_id: outcome.commit_id.clone(),
    };
    record_all(audit, &entry).await;

    info!(
        environment = %request.environment,
        action = request.action.as_str(),
        success = outcome.success,
        dry_run = request.dry_run,
        rows = outcome.rows_affected,
        "run finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::db::fake::{FakeProvider, FakeSession};
    use crate::db::{ResultSet, Value};
    use crate::sinks::ArchiveReceipt;

    #[derive(Default)]
    struct RecordingArchive {
        calls: Mutex<Vec<(Vec<ArchivedScript>, ArchiveMetadata)>>,
        fail: bool,
    }

    #[async_trait]
    impl ScriptArchive for RecordingArchive {
        async fn record_scripts(
            &self,
            scripts: &[ArchivedScript],
            metadata: &ArchiveMetadata,
        ) -> anyhow::Result<ArchiveReceipt> {
            if self.fail {
                return Err(anyhow!("not a git repository"));
            }
            self.calls
                .lock()
                .expect("lock")
                .push((scripts.to_vec(), metadata.clone()));
            Ok(ArchiveReceipt {
                commit_id: "abc123".to_string(),
                files: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        entries: Mutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingAudit {
        fn name(&self) -> &str {
            "memory"
        }

        async fn record(&self, entry: &AuditEntry) -> anyhow::Result<()> {
            self.entries.lock().expect("lock").push(entry.clone());
            Ok(())
        }
    }

    fn request(script: &str) -> ApplyRequest {
        ApplyRequest {
            rollback_script: Some("DROP TABLE [dbo].[T]".to_string()),
            user: Some("alice".to_string()),
            objects: vec!["dbo.T".to_string()],
            ..ApplyRequest::new("DEV", ApplyAction::Apply, script)
        }
    }

    #[test]
    fn extracts_schema_names_from_ddl_and_dml() {
        let script = "CREATE TABLE [sales].[Orders] (Id int)\n\
                      CREATE UNIQUE NONCLUSTERED INDEX IX_a ON hr.People (Name)\n\
                      ALTER INDEX IX_b ON \"ops\".Jobs REBUILD\n\
                      INSERT INTO audit.Log VALUES (1)\n\
                      UPDATE sales.Orders SET x = 1\n\
                      DELETE FROM [bad-name].T\n\
                      DROP VIEW dbo.v";
        assert_eq!(
            extract_schema_names(script),
            vec!["sales", "dbo", "hr", "ops", "audit"]
        );
    }

    #[tokio::test]
    async fn successful_apply_archives_and_audits() {
        let provider = FakeProvider::default().with("DEV", FakeSession::new());
        let archive = RecordingArchive::default();
        let audit = RecordingAudit::default();
        let outcome = apply_script(
            &provider,
            &request("CREATE TABLE [dbo].[T] (x int)\nGO\nINSERT INTO dbo.T VALUES (1)"),
            Some(&archive),
            &[&audit],
        )
        .await
        .expect("outcome");

        assert!(outcome.success);
        assert_eq!(outcome.rows_affected, 2);
        assert_eq!(outcome.completed_batches, 2);
        assert_eq!(outcome.commit_id.as_deref(), Some("abc123"));

        let calls = archive.calls.lock().expect("lock");
        assert_eq!(calls.len(), 1);
        let actions: Vec<&str> = calls[0].0.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["implementation", "rollback"]);
        assert_eq!(calls[0].1.rows_affected, Some(2));

        let entries = audit.entries.lock().expect("lock");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
        assert_eq!(entries[0].commit_id.as_deref(), Some("abc123"));
        assert_eq!(provider.release_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_is_neither_archived_nor_committed() {
        let provider = FakeProvider::default().with("DEV", FakeSession::new());
        let archive = RecordingArchive::default();
        let audit = RecordingAudit::default();
        let outcome = apply_script(
            &provider,
            &ApplyRequest {
                dry_run: true,
                ..request("CREATE TABLE [dbo].[T] (x int)")
            },
            Some(&archive),
            &[&audit],
        )
        .await
        .expect("outcome");

        assert!(outcome.success && outcome.dry_run);
        assert!(archive.calls.lock().expect("lock").is_empty());
        assert!(audit.entries.lock().expect("lock")[0].dry_run);
        assert!(provider.session("DEV").committed.is_empty());
    }

    #[tokio::test]
    async fn execution_failure_is_reported_and_audited() {
        let provider = FakeProvider::default().with("DEV", FakeSession::new().fail_always("INSERT"));
        let archive = RecordingArchive::default();
        let audit = RecordingAudit::default();
        let outcome = apply_script(
            &provider,
            &request("CREATE TABLE t (x int)\nGO\nINSERT INTO t VALUES (1)\nGO\nSELECT 1"),
            Some(&archive),
            &[&audit],
        )
        .await
        .expect("outcome");

        assert!(!outcome.success);
        assert_eq!(outcome.completed_batches, 1);
        assert_eq!(outcome.rows_affected, 1);
        assert!(matches!(outcome.failure, Some(EngineError::Execution { batch: 2, .. })));
        assert!(archive.calls.lock().expect("lock").is_empty());
        let entries = audit.entries.lock().expect("lock");
        assert!(!entries[0].success);
        assert!(entries[0].error.as_deref().is_some_and(|e| e.contains("batch 2")));
        assert_eq!(provider.release_count(), 1);
    }

    #[tokio::test]
    async fn unknown_environment_fails_before_any_io() {
        let provider = FakeProvider::default();
        let audit = RecordingAudit::default();
        let err = apply_script(&provider, &request("SELECT 1"), None, &[&audit])
            .await
            .expect_err("unknown env");
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(audit.entries.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn archive_failure_is_only_a_warning() {
        let provider = FakeProvider::default().with("DEV", FakeSession::new());
        let archive = RecordingArchive {
            fail: true,
            ..RecordingArchive::default()
        };
        let outcome = apply_script(&provider, &request("SELECT 1"), Some(&archive), &[])
            .await
            .expect("outcome");
        assert!(outcome.success);
        assert!(outcome.commit_id.is_none());
        assert!(
            outcome
                .archive_warning
                .as_deref()
                .is_some_and(|w| w.contains("not a git repository"))
        );
    }

    #[tokio::test]
    async fn missing_schemas_are_created_and_unsafe_ones_skipped() {
        let exists = ResultSet::new(&["present"], vec![vec![Value::Int(1)]]);
        let provider = FakeProvider::default().with(
            "DEV",
            FakeSession::new().respond("sys.schemas", vec![ResultSet::new(&["present"], vec![])]),
        );
        let outcome = apply_script(
            &provider,
            &ApplyRequest {
                auto_create_schemas: true,
                ..request("CREATE TABLE sales.T (x int)\nGO\nCREATE TABLE [1stage].U (x int)")
            },
            None,
            &[],
        )
        .await
        .expect("outcome");
        assert!(outcome.success);
        assert_eq!(outcome.created_schemas, vec!["sales"]);
        assert_eq!(outcome.skipped_schemas, vec!["1stage"]);
        let session = provider.session("DEV");
        assert_eq!(session.executed[0], "EXEC('CREATE SCHEMA [sales]')");
        assert_eq!(session.queries[0].1, vec!["sales".to_string()]);

        let provider = FakeProvider::default()
            .with("DEV", FakeSession::new().respond("sys.schemas", vec![exists]));
        let outcome = apply_script(
            &provider,
            &ApplyRequest {
                auto_create_schemas: true,
                ..request("CREATE TABLE sales.T (x int)")
            },
            None,
            &[],
        )
        .await
        .expect("outcome");
        assert!(outcome.created_schemas.is_empty());
    }

    #[tokio::test]
    async fn schema_preflight_failure_stops_the_run() {
        let provider = FakeProvider::default()
            .with("DEV", FakeSession::new().fail_query("sys.schemas"));
        let outcome = apply_script(
            &provider,
            &ApplyRequest {
                auto_create_schemas: true,
                ..request("CREATE TABLE sales.T (x int)")
            },
            None,
            &[],
        )
        .await
        .expect("outcome");
        assert!(!outcome.success);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|e| e.contains("Schema check/creation failed"))
        );
        assert!(provider.session("DEV").executed.is_empty());
    }
}
