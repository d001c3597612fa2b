//! Value types shared by the planner, the resolver and the executor.

pub mod column;
pub mod plan;

pub use column::{ColumnMetadata, ColumnSignature, qualified_name, quote_ident};
pub use plan::{
    AlteredColumn, ColumnChange, DiffSummary, NO_CHANGES, NO_DEFINITION_CHANGES, NO_DEFINITION_ROLLBACK,
    NO_ROLLBACK, ObjectPlan, ObjectRef, ObjectType, PLACEHOLDER, TableDiff, is_executable,
};
