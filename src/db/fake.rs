//! In-memory sessions for exercising the planner and executor without a server.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::db::registry::ConnectionProvider;
use crate::db::session::SqlSession;
use crate::db::types::{BatchOutcome, ResultSet, RowsAffected};

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    responses: Vec<(String, Vec<ResultSet>)>,
    failing_queries: Vec<String>,
    failing_batches: Vec<String>,
    failing_everywhere: Vec<String>,
    /// Rows reported per batch-mode statement.
    pub rows_per_batch: u64,
    /// A failing batch aborts the open transaction, like XACT_ABORT.
    pub abort_on_failure: bool,
    pub depth: i64,
    pub queries: Vec<(String, Vec<String>)>,
    /// Every batch text sent in either mode, in order.
    pub executed: Vec<String>,
    /// Batches whose effects survived: run outside any transaction.
    pub committed: Vec<String>,
    pending: Vec<String>,
    pub rollbacks: usize,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            rows_per_batch: 1,
            ..Self::default()
        }
    }

    /// Answers catalog queries whose text contains `pattern`.
    pub fn respond(mut self, pattern: &str, sets: Vec<ResultSet>) -> Self {
        self.responses.push((pattern.to_string(), sets));
        self
    }

    pub fn fail_query(mut self, pattern: &str) -> Self {
        self.failing_queries.push(pattern.to_string());
        self
    }

    /// Batch mode fails for matching text; query mode still succeeds.
    pub fn fail_batch_mode(mut self, pattern: &str) -> Self {
        self.failing_batches.push(pattern.to_string());
        self
    }

    /// Both execution modes fail for matching text.
    pub fn fail_always(mut self, pattern: &str) -> Self {
        self.failing_everywhere.push(pattern.to_string());
        self
    }

    fn record(&mut self, sql: &str) {
        self.executed.push(sql.to_string());
        if self.depth > 0 {
            self.pending.push(sql.to_string());
        } else {
            self.committed.push(sql.to_string());
        }
    }

    fn fail(&mut self, sql: &str) -> anyhow::Error {
        if self.abort_on_failure && self.depth > 0 {
            self.depth = 0;
            self.pending.clear();
        }
        anyhow!("simulated failure: {sql}")
    }
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<ResultSet>> {
        self.queries
            .push((sql.to_string(), params.iter().map(|p| p.to_string()).collect()));
        if sql.contains("@@TRANCOUNT") {
            return Ok(vec![ResultSet::new(
                &["depth"],
                vec![vec![crate::db::Value::Int(self.depth)]],
            )]);
        }
        if self.failing_queries.iter().any(|p| sql.contains(p.as_str())) {
            return Err(anyhow!("simulated query failure"));
        }
        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, sets)| sets.clone())
            .unwrap_or_default())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<BatchOutcome> {
        let failing = self
            .failing_batches
            .iter()
            .chain(self.failing_everywhere.iter())
            .any(|p| sql.contains(p.as_str()));
        if failing {
            return Err(self.fail(sql));
        }
        self.record(sql);
        Ok(BatchOutcome {
            result_sets: Vec::new(),
            rows_affected: RowsAffected::PerStatement(vec![self.rows_per_batch]),
        })
    }

    async fn execute_query(&mut self, sql: &str) -> Result<BatchOutcome> {
        if self.failing_everywhere.iter().any(|p| sql.contains(p.as_str())) {
            return Err(self.fail(sql));
        }
        self.record(sql);
        Ok(BatchOutcome {
            result_sets: vec![ResultSet::new(&["ok"], vec![vec![crate::db::Value::Int(1)]])],
            rows_affected: RowsAffected::Unknown,
        })
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.depth += 1;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        self.rollbacks += 1;
        self.depth = 0;
        self.pending.clear();
        Ok(())
    }
}

/// Provider over one [`FakeSession`] per environment.
#[derive(Default)]
pub struct FakeProvider {
    sessions: Mutex<HashMap<String, FakeSession>>,
    pub released: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn with(mut self, environment: &str, session: FakeSession) -> Self {
        if let Ok(sessions) = self.sessions.get_mut() {
            sessions.insert(environment.to_string(), session);
        }
        self
    }

    pub fn session(&self, environment: &str) -> FakeSession {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(environment).cloned())
            .unwrap_or_default()
    }

    pub fn release_count(&self) -> usize {
        self.released.lock().map(|r| r.len()).unwrap_or(0)
    }
}

pub struct FakeLease {
    environment: String,
    session: FakeSession,
}

#[async_trait]
impl SqlSession for FakeLease {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<ResultSet>> {
        self.session.query(sql, params).await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<BatchOutcome> {
        self.session.execute_batch(sql).await
    }

    async fn execute_query(&mut self, sql: &str) -> Result<BatchOutcome> {
        self.session.execute_query(sql).await
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.session.begin_transaction().await
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        self.session.rollback_transaction().await
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    type Session = FakeLease;

    fn contains(&self, environment: &str) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(environment))
            .unwrap_or(false)
    }

    async fn acquire(&self, environment: &str) -> Result<FakeLease> {
        let session = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .remove(environment)
            .ok_or_else(|| anyhow!("no fake session for {environment}"))?;
        Ok(FakeLease {
            environment: environment.to_string(),
            session,
        })
    }

    async fn release(&self, lease: FakeLease) {
        if let Ok(mut released) = self.released.lock() {
            released.push(lease.environment.clone());
        }
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(lease.environment, lease.session);
        }
    }
}
