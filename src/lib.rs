// Allow some clippy lints project-wide for code style consistency
#![allow(clippy::uninlined_format_args)]

pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod execute;
pub mod introspect;
pub mod model;
pub mod order;
pub mod output;
pub mod sinks;
