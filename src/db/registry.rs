use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{ConnectionSettings, ResolvedConfig, normalize_env_key};
use crate::db::client::connect;
use crate::db::session::{SqlSession, TdsSession};
use crate::db::types::{BatchOutcome, ResultSet};
use crate::error::EngineError;

/// Hands out sessions per named environment. Every `acquire` must be paired
/// with a `release`, on failure paths too.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Session: SqlSession;

    fn contains(&self, environment: &str) -> bool;

    async fn acquire(&self, environment: &str) -> Result<Self::Session>;

    async fn release(&self, session: Self::Session);
}

/// Fails with a configuration error before any I/O when an environment is unknown.
pub fn require_environment<P: ConnectionProvider + ?Sized>(
    provider: &P,
    environment: &str,
) -> std::result::Result<(), EngineError> {
    if provider.contains(environment) {
        Ok(())
    } else {
        Err(EngineError::unknown_environment(environment))
    }
}

/// Connection registry over the configured environments. With reuse enabled,
/// released sessions go back to an idle pool; otherwise they are closed.
pub struct ConnectionRegistry {
    environments: BTreeMap<String, ConnectionSettings>,
    reuse: bool,
    idle: Mutex<HashMap<String, Vec<TdsSession>>>,
}

impl ConnectionRegistry {
    pub fn new(environments: BTreeMap<String, ConnectionSettings>, reuse: bool) -> Self {
        let environments = environments
            .into_iter()
            .map(|(key, settings)| (normalize_env_key(&key), settings))
            .collect();
        Self {
            environments,
            reuse,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.environments.clone(), config.settings.reuse_connections)
    }

    pub fn environments(&self) -> impl Iterator<Item = (&String, &ConnectionSettings)> {
        self.environments.iter()
    }

    pub fn settings(&self, environment: &str) -> std::result::Result<&ConnectionSettings, EngineError> {
        self.environments
            .get(&normalize_env_key(environment))
            .ok_or_else(|| EngineError::unknown_environment(environment))
    }

    /// Closes every idle session.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Vec<TdsSession>)> = self.idle.lock().await.drain().collect();
        for (environment, sessions) in drained {
            for session in sessions {
                if let Err(err) = session.close().await {
                    warn!(%environment, error = %err, "failed to close idle connection");
                }
            }
        }
    }
}

/// A session checked out of [`ConnectionRegistry`].
pub struct Lease {
    environment: String,
    session: TdsSession,
    reused: bool,
}

impl Lease {
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn reused(&self) -> bool {
        self.reused
    }
}

#[async_trait]
impl SqlSession for Lease {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<ResultSet>> {
        self.session.query(sql, params).await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<BatchOutcome> {
        self.session.execute_batch(sql).await
    }

    async fn execute_query(&mut self, sql: &str) -> Result<BatchOutcome> {
        self.session.execute_query(sql).await
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionRegistry {
    type Session = Lease;

    fn contains(&self, environment: &str) -> bool {
        self.environments.contains_key(&normalize_env_key(environment))
    }

    async fn acquire(&self, environment: &str) -> Result<Lease> {
        let key = normalize_env_key(environment);
        let settings = self.settings(&key)?;

        if self.reuse {
            let pooled = self.idle.lock().await.get_mut(&key).and_then(Vec::pop);
            if let Some(session) = pooled {
                debug!(environment = %key, "reusing pooled connection");
                return Ok(Lease {
                    environment: key,
                    session,
                    reused: true,
                });
            }
        }

        let session = connect(settings).await?;
        debug!(environment = %key, "opened connection");
        Ok(Lease {
            environment: key,
            session,
            reused: false,
        })
    }

    async fn release(&self, lease: Lease) {
        if self.reuse {
            self.idle
                .lock()
                .await
                .entry(lease.environment)
                .or_default()
                .push(lease.session);
            return;
        }
        if let Err(err) = lease.session.close().await {
            warn!(environment = %lease.environment, error = %err, "failed to close connection");
        }
    }
}
