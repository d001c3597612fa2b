use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::column::{ColumnMetadata, ColumnSignature, qualified_name};

pub const NO_CHANGES: &str = "-- No changes required";
pub const NO_ROLLBACK: &str = "-- No rollback needed";
pub const NO_DEFINITION_CHANGES: &str = "-- No changes detected";
pub const NO_DEFINITION_ROLLBACK: &str = "-- No rollback generated";
pub const PLACEHOLDER: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Table,
    View,
    Procedure,
    Function,
    Trigger,
    Index,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Function => "FUNCTION",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Index => "INDEX",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TABLE" | "U" => Ok(ObjectType::Table),
            "VIEW" | "V" => Ok(ObjectType::View),
            "PROCEDURE" | "PROC" | "P" => Ok(ObjectType::Procedure),
            "FUNCTION" | "FN" => Ok(ObjectType::Function),
            "TRIGGER" | "TR" => Ok(ObjectType::Trigger),
            "INDEX" => Ok(ObjectType::Index),
            other => Err(format!("Unknown object type '{other}'")),
        }
    }
}

/// Identifies one database object. `table` is the parent table of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_type,
            schema: schema.into(),
            name: name.into(),
            table: None,
        }
    }

    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ObjectType::Table, schema, name)
    }

    pub fn index(schema: impl Into<String>, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::new(ObjectType::Index, schema, name)
        }
    }

    /// Node key used by the dependency resolver: `TYPE::schema::name`.
    pub fn node_key(&self) -> String {
        format!("{}::{}::{}", self.object_type, self.schema, self.name)
    }

    pub fn qualified(&self) -> String {
        qualified_name(&self.schema, &self.name)
    }

    /// Parses `[TYPE:]schema.name`, or `INDEX:schema.table.index`. Schema defaults to `dbo`.
    pub fn parse_spec(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (object_type, rest) = match spec.split_once(':') {
            Some((kind, rest)) => (kind.parse::<ObjectType>()?, rest),
            None => (ObjectType::Table, spec),
        };
        let parts: Vec<String> = rest
            .split('.')
            .map(|part| part.trim().trim_matches(|c| c == '[' || c == ']' || c == '"').to_string())
            .collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("Invalid object name '{spec}'"));
        }
        match (object_type, parts.as_slice()) {
            (ObjectType::Index, [schema, table, name]) => Ok(Self::index(schema, table, name)),
            (ObjectType::Index, [table, name]) => Ok(Self::index("dbo", table, name)),
            (ObjectType::Index, _) => Err(format!(
                "Index '{spec}' must be written as INDEX:schema.table.index"
            )),
            (kind, [name]) => Ok(Self::new(kind, "dbo", name)),
            (kind, [schema, name]) => Ok(Self::new(kind, schema, name)),
            _ => Err(format!("Invalid object name '{spec}'")),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{} {}.{}.{}", self.object_type, self.schema, table, self.name),
            None => write!(f, "{} {}.{}", self.object_type, self.schema, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlteredColumn {
    pub column: String,
    pub from_type: String,
    pub to_type: String,
    pub from_signature: ColumnSignature,
    pub to_signature: ColumnSignature,
}

/// A column present on both sides whose signature differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    pub desired: ColumnMetadata,
    pub actual: ColumnMetadata,
}

impl ColumnChange {
    pub fn summary(&self) -> AlteredColumn {
        AlteredColumn {
            column: self.desired.name.clone(),
            from_type: self.actual.type_description(),
            to_type: self.desired.type_description(),
            from_signature: self.actual.signature(),
            to_signature: self.desired.signature(),
        }
    }
}

/// Column-level difference between a desired and an actual table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub added: Vec<ColumnMetadata>,
    pub removed: Vec<ColumnMetadata>,
    pub altered: Vec<ColumnChange>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.altered.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffSummary {
    #[serde(rename_all = "camelCase")]
    Table {
        added: Vec<String>,
        removed: Vec<String>,
        altered: Vec<AlteredColumn>,
    },
    #[serde(rename_all = "camelCase")]
    Definition {
        exists_in_source: bool,
        exists_in_target: bool,
        changed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        unified_diff: Option<String>,
    },
}

impl DiffSummary {
    pub fn from_table_diff(diff: &TableDiff) -> Self {
        DiffSummary::Table {
            added: diff.added.iter().map(|c| c.name.clone()).collect(),
            removed: diff.removed.iter().map(|c| c.name.clone()).collect(),
            altered: diff.altered.iter().map(ColumnChange::summary).collect(),
        }
    }
}

/// Forward and rollback scripts for one object, with the reasoning behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPlan {
    pub object: ObjectRef,
    pub implementation: String,
    pub rollback: String,
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<DiffSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ObjectPlan {
    pub fn new(object: ObjectRef) -> Self {
        Self {
            object,
            implementation: PLACEHOLDER.to_string(),
            rollback: PLACEHOLDER.to_string(),
            notes: Vec::new(),
            diff_summary: None,
            error: None,
        }
    }

    /// Plan recorded for an object whose analysis failed; siblings still get planned.
    pub fn failed(object: ObjectRef, message: impl Into<String>) -> Self {
        let message = message.into();
        let label = if object.object_type == ObjectType::Table {
            "table"
        } else {
            "object"
        };
        Self {
            implementation: format!("-- Error analyzing {label}: {message}"),
            rollback: "-- Error during analysis".to_string(),
            notes: vec![format!("Error: {message}")],
            error: Some(message),
            ..Self::new(object)
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// True when the text contains something other than comments and whitespace.
pub fn is_executable(script: &str) -> bool {
    let mut in_block = false;
    for line in script.lines() {
        let mut rest = line.trim();
        loop {
            if in_block {
                match rest.find("*/") {
                    Some(end) => {
                        in_block = false;
                        rest = rest[end + 2..].trim();
                    }
                    None => break,
                }
            } else if rest.is_empty() || rest.starts_with("--") {
                break;
            } else if let Some(after) = rest.strip_prefix("/*") {
                in_block = true;
                rest = after;
            } else {
                return true;
            }
        }
    }
    false
}
