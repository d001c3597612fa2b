//! SQL Server connectivity: tiberius sessions, the connection registry and
//! the catalog queries the introspector issues.

pub mod client;
pub mod connection;
pub mod executor;
pub mod queries;
pub mod registry;
pub mod session;
pub mod types;

pub use registry::{ConnectionProvider, ConnectionRegistry, Lease, require_environment};
pub use session::{SqlSession, TdsSession};
pub use types::{BatchOutcome, Column, ResultSet, RowsAffected, Value};

#[cfg(test)]
pub(crate) mod fake;
