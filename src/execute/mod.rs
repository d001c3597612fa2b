//! Batch executor: runs a GO-separated script against one session, either
//! for real or inside a transaction that is always rolled back.

mod apply;

pub use apply::{
    ApplyAction, ApplyOutcome, ApplyRequest, apply_script, extract_schema_names,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{BatchOutcome, ResultSet, RowsAffected, SqlSession};
use crate::ddl::split_batches;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Batch,
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// 1-based position in the script.
    pub index: usize,
    pub mode: ExecutionMode,
    pub rows_affected: RowsAffected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub batches: Vec<BatchReport>,
    pub total_rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ResultSet>,
}

impl ExecutionReport {
    fn record(&mut self, index: usize, mode: ExecutionMode, outcome: BatchOutcome) {
        self.total_rows_affected += outcome.rows_affected.total();
        if let Some(set) = outcome.result_sets.into_iter().rev().find(|s| !s.columns.is_empty()) {
            self.last_result = Some(set);
        }
        self.batches.push(BatchReport {
            index,
            mode,
            rows_affected: outcome.rows_affected,
        });
    }
}

/// Sends one batch, first in batch mode and then in query mode. Inside a dry
/// run the retry only happens while the transaction is still open.
async fn run_batch<S: SqlSession + ?Sized>(
    session: &mut S,
    batch: &str,
    dry_run: bool,
) -> anyhow::Result<(ExecutionMode, BatchOutcome)> {
    let batch_err = match session.execute_batch(batch).await {
        Ok(outcome) => return Ok((ExecutionMode::Batch, outcome)),
        Err(err) => err,
    };
    debug!(error = %batch_err, "batch mode failed; retrying in query mode");

    if dry_run && !session.in_transaction().await.unwrap_or(false) {
        return Err(batch_err.context("transaction was aborted; not retrying outside it"));
    }
    let outcome = session.execute_query(batch).await?;
    Ok((ExecutionMode::Query, outcome))
}

async fn abandon<S: SqlSession + ?Sized>(session: &mut S) {
    if let Err(err) = session.rollback_transaction().await {
        warn!(error = %err, "dry-run rollback failed");
    }
}

/// Runs every batch of `script` in order. A failure stops the run and
/// reports the failing batch with the work completed before it.
pub async fn execute_batches<S: SqlSession + ?Sized>(
    session: &mut S,
    script: &str,
    dry_run: bool,
) -> Result<ExecutionReport, EngineError> {
    let batches = split_batches(script);
    let mut report = ExecutionReport {
        dry_run,
        ..ExecutionReport::default()
    };

    if dry_run {
        session
            .begin_transaction()
            .await
            .map_err(|err| EngineError::Execution {
                batch: 0,
                message: format!("could not open dry-run transaction: {err}"),
                rows_affected: 0,
                completed_batches: 0,
                dry_run,
            })?;
    }

    for (idx, batch) in batches.iter().enumerate() {
        match run_batch(session, batch, dry_run).await {
            Ok((mode, outcome)) => report.record(idx + 1, mode, outcome),
            Err(err) => {
                if dry_run {
                    abandon(session).await;
                }
                warn!(batch = idx + 1, error = %err, "batch failed");
                return Err(EngineError::Execution {
                    batch: idx + 1,
                    message: format!("{err:#}"),
                    rows_affected: report.total_rows_affected,
                    completed_batches: idx,
                    dry_run,
                });
            }
        }
    }

    if dry_run {
        session
            .rollback_transaction()
            .await
            .map_err(|err| EngineError::Execution {
                batch: batches.len(),
                message: format!("dry-run rollback failed: {err}"),
                rows_affected: report.total_rows_affected,
                completed_batches: batches.len(),
                dry_run,
            })?;
    }

    info!(
        batches = report.batches.len(),
        rows = report.total_rows_affected,
        dry_run,
        "script executed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeSession;

    const SCRIPT: &str = "CREATE TABLE a (x int)\nGO\nINSERT INTO a VALUES (1)\nGO\nSELECT 1";

    #[tokio::test]
    async fn real_run_commits_each_batch() {
        let mut session = FakeSession::new();
        session.rows_per_batch = 2;
        let report = execute_batches(&mut session, SCRIPT, false).await.expect("report");
        assert_eq!(report.batches.len(), 3);
        assert_eq!(report.total_rows_affected, 6);
        assert!(report.batches.iter().all(|b| b.mode == ExecutionMode::Batch));
        assert_eq!(session.committed.len(), 3);
        assert_eq!(session.rollbacks, 0);
    }

    #[tokio::test]
    async fn dry_run_always_rolls_back() {
        let mut session = FakeSession::new();
        let report = execute_batches(&mut session, SCRIPT, true).await.expect("report");
        assert!(report.dry_run);
        assert_eq!(session.executed.len(), 3);
        assert!(session.committed.is_empty());
        assert_eq!(session.rollbacks, 1);
        assert_eq!(session.depth, 0);
    }

    #[tokio::test]
    async fn failure_reports_completed_work() {
        let mut session = FakeSession::new().fail_always("INSERT");
        let err = execute_batches(&mut session, SCRIPT, false)
            .await
            .expect_err("failure");
        match err {
            EngineError::Execution {
                batch,
                completed_batches,
                rows_affected,
                dry_run,
                ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(completed_batches, 1);
                assert_eq!(rows_affected, 1);
                assert!(!dry_run);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.committed, vec!["CREATE TABLE a (x int)".to_string()]);
    }

    #[tokio::test]
    async fn dry_run_failure_rolls_back_before_reporting() {
        let mut session = FakeSession::new().fail_always("INSERT");
        let err = execute_batches(&mut session, SCRIPT, true)
            .await
            .expect_err("failure");
        assert!(matches!(err, EngineError::Execution { batch: 2, dry_run: true, .. }));
        assert_eq!(session.rollbacks, 1);
        assert!(session.committed.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_query_mode() {
        let mut session = FakeSession::new().fail_batch_mode("SELECT");
        let report = execute_batches(&mut session, SCRIPT, false).await.expect("report");
        assert_eq!(report.batches[2].mode, ExecutionMode::Query);
        assert_eq!(report.batches[2].rows_affected, RowsAffected::Unknown);
        assert_eq!(report.total_rows_affected, 2);
        assert!(report.last_result.is_some());
    }

    #[tokio::test]
    async fn dry_run_does_not_retry_outside_an_aborted_transaction() {
        let mut session = FakeSession::new().fail_batch_mode("INSERT");
        session.abort_on_failure = true;
        let err = execute_batches(&mut session, SCRIPT, true)
            .await
            .expect_err("aborted transaction");
        match err {
            EngineError::Execution { batch, message, .. } => {
                assert_eq!(batch, 2);
                assert!(message.contains("transaction was aborted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(session.committed.is_empty());
        assert!(!session.executed.iter().any(|sql| sql.contains("INSERT")));
    }

    #[tokio::test]
    async fn dry_run_retries_while_transaction_is_open() {
        let mut session = FakeSession::new().fail_batch_mode("INSERT");
        let report = execute_batches(&mut session, SCRIPT, true).await.expect("report");
        assert_eq!(report.batches[1].mode, ExecutionMode::Query);
        assert!(session.committed.is_empty());
    }

    #[tokio::test]
    async fn empty_script_runs_nothing() {
        let mut session = FakeSession::new();
        let report = execute_batches(&mut session, "GO\n\nGO", false).await.expect("report");
        assert!(report.batches.is_empty());
        assert!(session.executed.is_empty());
    }
}
