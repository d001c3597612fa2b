//! Schema diff engine: column diffs, definition diffs, DDL script planning
//! and environment-to-environment planning.

mod definition;
mod env;
mod script;
mod table;

pub use definition::{plan_definition, plan_index};
pub use env::plan_environment_diff;
pub use script::{ScriptPlan, plan_alter_table, plan_create_table, plan_script};
pub use table::{ChangeSet, SOURCE_TABLE_MISSING, diff_table, plan_table, plan_table_changes};

use crate::db::ConnectionProvider;
use crate::error::EngineError;

/// Acquires a session, reporting connectivity failures as introspection errors.
pub(crate) async fn acquire<P: ConnectionProvider + ?Sized>(
    provider: &P,
    environment: &str,
) -> Result<P::Session, EngineError> {
    provider
        .acquire(environment)
        .await
        .map_err(|err| match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(err) => EngineError::Introspection {
                object: format!("environment {environment}"),
                message: err.to_string(),
            },
        })
}
