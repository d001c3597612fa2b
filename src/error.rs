use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Query,
    Execution,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "Config",
            ErrorKind::Connection => "Connection",
            ErrorKind::Query => "Query",
            ErrorKind::Execution => "Execution",
            ErrorKind::Internal => "Internal",
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

/// Failures raised by the planning and execution engine.
///
/// Parse problems are not represented here: unrecognized DDL is returned as
/// [`crate::ddl::Parsed::Unrecognized`] and surfaces as a plan note.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("{0}")]
    Configuration(String),

    #[error("introspection of {object} failed: {message}")]
    Introspection { object: String, message: String },

    #[error("batch {batch} failed: {message}")]
    Execution {
        /// 1-based index of the failing batch.
        batch: usize,
        message: String,
        rows_affected: u64,
        completed_batches: usize,
        dry_run: bool,
    },
}

impl EngineError {
    pub fn unknown_environment(env: &str) -> Self {
        EngineError::Configuration(format!("Unknown environment '{env}'"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Config,
            EngineError::Introspection { .. } => ErrorKind::Query,
            EngineError::Execution { .. } => ErrorKind::Execution,
        }
    }
}

pub fn classify_error(err: &anyhow::Error) -> ErrorKind {
    if let Some(app) = err.downcast_ref::<AppError>() {
        return app.kind;
    }
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        return engine.kind();
    }
    ErrorKind::Internal
}
