//! Where finished runs are recorded: the audit trail and the script archive.

pub mod archive;
pub mod audit;

pub use archive::{
    ArchiveMetadata, ArchiveReceipt, ArchivedScript, CommitDetails, CommitSummary, GitArchive,
    ScriptArchive, parse_commit_metadata,
};
pub use audit::{
    AuditEntry, AuditFilter, AuditSink, DbAuditSink, FileAuditSink, query_db_audit, read_recent,
    record_all, script_preview,
};
