use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::debug;

use crate::db::executor::{collect_result_sets, run_query};
use crate::db::types::{BatchOutcome, ResultSet, RowsAffected};
use crate::error::{AppError, ErrorKind};

pub type TdsClient = tiberius::Client<Compat<TcpStream>>;

/// A single live connection as seen by the planner and the executor.
///
/// `query` is the catalog read path and binds `params` as `@P1..@Pn`.
/// `execute_batch` and `execute_query` are the two execution modes a batch
/// can be sent in; the executor tries them in that order.
#[async_trait]
pub trait SqlSession: Send {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<ResultSet>>;

    /// Multi-statement execution that reports per-statement row counts.
    async fn execute_batch(&mut self, sql: &str) -> Result<BatchOutcome>;

    /// Plain batch text execution that returns recordsets.
    async fn execute_query(&mut self, sql: &str) -> Result<BatchOutcome>;

    async fn begin_transaction(&mut self) -> Result<()> {
        self.execute_query("BEGIN TRANSACTION").await.map(|_| ())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        self.execute_query("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await
            .map(|_| ())
    }

    /// Whether a transaction opened by `begin_transaction` is still active.
    async fn in_transaction(&mut self) -> Result<bool> {
        let sets = self.query("SELECT @@TRANCOUNT AS depth", &[]).await?;
        Ok(sets
            .first()
            .and_then(|set| set.rows.first().map(|row| set.reader().int(row, "depth")))
            .unwrap_or(0)
            > 0)
    }
}

/// [`SqlSession`] over a tiberius client.
pub struct TdsSession {
    client: TdsClient,
}

impl TdsSession {
    pub fn new(client: TdsClient) -> Self {
        Self { client }
    }

    pub async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|err| AppError::new(ErrorKind::Connection, err.to_string()).into())
    }
}

#[async_trait]
impl SqlSession for TdsSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<ResultSet>> {
        let mut query = tiberius::Query::new(sql.to_string());
        for param in params {
            query.bind(param.to_string());
        }
        run_query(query, &mut self.client).await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<BatchOutcome> {
        let result = self
            .client
            .execute(sql, &[])
            .await
            .map_err(|err| AppError::new(ErrorKind::Query, err.to_string()))?;
        let counts = result.rows_affected().to_vec();
        debug!(statements = counts.len(), "batch executed");
        Ok(BatchOutcome {
            result_sets: Vec::new(),
            rows_affected: RowsAffected::PerStatement(counts),
        })
    }

    async fn execute_query(&mut self, sql: &str) -> Result<BatchOutcome> {
        let stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|err| AppError::new(ErrorKind::Query, err.to_string()))?;
        let result_sets = collect_result_sets(stream).await?;
        Ok(BatchOutcome {
            result_sets,
            rows_affected: RowsAffected::Unknown,
        })
    }
}
