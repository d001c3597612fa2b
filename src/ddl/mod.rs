//! DDL text handling: statement recognition, column clauses and GO batches.

pub mod batches;
mod lexer;
pub mod parser;

pub use batches::{split_batches, split_on_go};
pub use parser::{
    AlterKind, AlterTable, ColumnClause, CreateTable, Parsed, ParsedColumn, Statement, TableName,
    parse_alter_statements, parse_column_clause, parse_create_tables, parse_drop_names,
    parse_script, split_columns, split_qualified_name, unquote_ident,
};
