use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::db::connection::{build_config, describe_target};
use crate::db::session::TdsSession;
use crate::error::{AppError, ErrorKind};

/// Connect to SQL Server using resolved settings.
///
/// # Errors
///
/// Returns a `Connection` error if DNS resolution, TCP connect, or login
/// fails, or if the configured timeout elapses during connect or login.
/// Incomplete settings are reported as `Config`.
pub async fn connect(settings: &ConnectionSettings) -> Result<TdsSession> {
    let config =
        build_config(settings).map_err(|err| AppError::new(ErrorKind::Config, err.to_string()))?;
    let limit = (settings.timeout_ms > 0).then(|| Duration::from_millis(settings.timeout_ms));

    debug!(server = %describe_target(settings), "connecting");
    let tcp = within(limit, "Connection", TcpStream::connect(config.get_addr())).await??;
    tcp.set_nodelay(true)?;
    let client =
        within(limit, "Login", tiberius::Client::connect(config, tcp.compat_write())).await??;
    Ok(TdsSession::new(client))
}

/// Runs `fut` under the optional limit; the outer result reports the timeout.
async fn within<T, E, F>(limit: Option<Duration>, stage: &str, fut: F) -> Result<Result<T, AppError>>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let outcome = match limit {
        Some(duration) => timeout(duration, fut).await.map_err(|_| {
            AppError::new(
                ErrorKind::Connection,
                format!("{stage} timed out after {} ms", duration.as_millis()),
            )
        })?,
        None => fut.await,
    };
    Ok(outcome.map_err(|err| AppError::new(ErrorKind::Connection, err.to_string())))
}
