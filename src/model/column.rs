use std::fmt;

use serde::{Deserialize, Serialize};

/// One column as reported by the catalog, or as reconstructed from DDL text.
///
/// Lengths follow catalog units: `max_length` is in bytes (so `nvarchar(50)`
/// is 100) and `-1` means `MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub sql_type: String,
    pub max_length: i64,
    pub precision: i64,
    pub scale: i64,
    pub is_nullable: bool,
    pub default_definition: Option<String>,
    pub is_computed: bool,
    pub computed_definition: Option<String>,
    #[serde(default)]
    pub is_identity: bool,
}

const LENGTH_TYPES: [&str; 6] = ["varchar", "char", "nvarchar", "nchar", "varbinary", "binary"];
const PRECISION_TYPES: [&str; 2] = ["decimal", "numeric"];
const SCALE_TYPES: [&str; 3] = ["datetime2", "time", "datetimeoffset"];

fn is_unicode(sql_type: &str) -> bool {
    matches!(sql_type, "nvarchar" | "nchar")
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            default_definition: None,
            is_computed: false,
            computed_definition: None,
            is_identity: false,
        }
    }

    pub fn signature(&self) -> ColumnSignature {
        let sql_type = self.sql_type.trim().to_lowercase();
        let t = sql_type.as_str();
        let max_length = if LENGTH_TYPES.contains(&t) { self.max_length } else { 0 };
        let (precision, scale) = if PRECISION_TYPES.contains(&t) {
            (self.precision, self.scale)
        } else if SCALE_TYPES.contains(&t) {
            (0, self.scale)
        } else if t == "float" {
            (self.precision, 0)
        } else {
            (0, 0)
        };
        ColumnSignature {
            sql_type,
            max_length,
            precision,
            scale,
            is_nullable: self.is_nullable,
            is_computed: self.is_computed,
        }
    }

    /// Type with its size arguments, e.g. `nvarchar(50)` or `decimal(18,2)`.
    pub fn type_spec(&self) -> String {
        let dt = self.sql_type.trim().to_lowercase();
        if LENGTH_TYPES.contains(&dt.as_str()) {
            if self.max_length == -1 {
                return format!("{dt}(MAX)");
            }
            if self.max_length > 0 {
                let len = if is_unicode(&dt) {
                    self.max_length / 2
                } else {
                    self.max_length
                };
                return format!("{dt}({len})");
            }
            return dt;
        }
        if PRECISION_TYPES.contains(&dt.as_str()) {
            let precision = if self.precision > 0 { self.precision } else { 18 };
            return format!("{dt}({precision},{})", self.scale);
        }
        if SCALE_TYPES.contains(&dt.as_str()) {
            return format!("{dt}({})", self.scale);
        }
        if dt == "float" && self.precision > 0 {
            return format!("{dt}({})", self.precision);
        }
        dt
    }

    fn nullability(&self) -> &'static str {
        if self.is_nullable { "NULL" } else { "NOT NULL" }
    }

    /// Type plus nullability, as used by `ALTER COLUMN` and rollback re-adds.
    pub fn type_description(&self) -> String {
        if self.is_computed {
            return self.computed_clause();
        }
        format!("{} {}", self.type_spec(), self.nullability())
    }

    fn computed_clause(&self) -> String {
        let expr = self.computed_definition.as_deref().unwrap_or("").trim();
        if expr.starts_with('(') {
            format!("AS {expr}")
        } else {
            format!("AS ({expr})")
        }
    }

    /// Full column definition without the name.
    pub fn definition(&self) -> String {
        self.definition_with_default(true)
    }

    pub fn definition_with_default(&self, include_default: bool) -> String {
        if self.is_computed {
            return self.computed_clause();
        }
        let mut parts = vec![self.type_spec()];
        if self.is_identity {
            parts.push("IDENTITY".to_string());
        }
        parts.push(self.nullability().to_string());
        if include_default {
            if let Some(default) = self.default_definition.as_deref().filter(|d| !d.is_empty()) {
                parts.push(format!("DEFAULT {default}"));
            }
        }
        parts.join(" ")
    }
}

/// The comparable shape of a column. Components the type does not carry are
/// zeroed so catalog rows and parsed DDL compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSignature {
    pub sql_type: String,
    pub max_length: i64,
    pub precision: i64,
    pub scale: i64,
    pub is_nullable: bool,
    pub is_computed: bool,
}

impl fmt::Display for ColumnSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.sql_type,
            self.max_length,
            self.precision,
            self.scale,
            self.is_nullable,
            self.is_computed
        )
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(sql_type: &str, max_length: i64) -> ColumnMetadata {
        ColumnMetadata {
            max_length,
            ..ColumnMetadata::new("Name", sql_type)
        }
    }

    #[test]
    fn unicode_lengths_are_halved_and_max_is_rendered() {
        assert_eq!(column("nvarchar", 100).type_spec(), "nvarchar(50)");
        assert_eq!(column("varchar", 100).type_spec(), "varchar(100)");
        assert_eq!(column("nvarchar", -1).type_spec(), "nvarchar(MAX)");
        assert_eq!(column("varbinary", -1).type_spec(), "varbinary(MAX)");
    }

    #[test]
    fn precision_and_scale_types() {
        let mut dec = ColumnMetadata::new("Amount", "decimal");
        dec.precision = 18;
        dec.scale = 2;
        assert_eq!(dec.type_spec(), "decimal(18,2)");

        let mut dt = ColumnMetadata::new("At", "datetime2");
        dt.scale = 7;
        assert_eq!(dt.type_spec(), "datetime2(7)");

        let mut fl = ColumnMetadata::new("Ratio", "float");
        fl.precision = 53;
        assert_eq!(fl.type_spec(), "float(53)");
    }

    #[test]
    fn definition_includes_identity_nullability_and_default() {
        let mut col = ColumnMetadata::new("Id", "int");
        col.is_identity = true;
        col.is_nullable = false;
        assert_eq!(col.definition(), "int IDENTITY NOT NULL");

        let mut col = column("nvarchar", 100);
        col.default_definition = Some("(N'x')".to_string());
        assert_eq!(col.definition(), "nvarchar(50) NULL DEFAULT (N'x')");
        assert_eq!(col.type_description(), "nvarchar(50) NULL");
    }

    #[test]
    fn computed_columns_render_expression() {
        let mut col = ColumnMetadata::new("Total", "int");
        col.is_computed = true;
        col.computed_definition = Some("([A]+[B])".to_string());
        assert_eq!(col.definition(), "AS ([A]+[B])");
    }

    #[test]
    fn signature_ignores_components_the_type_does_not_carry() {
        let catalog = ColumnMetadata {
            max_length: 4,
            precision: 10,
            ..ColumnMetadata::new("Id", "int")
        };
        let parsed = ColumnMetadata::new("Id", "INT");
        assert_eq!(catalog.signature(), parsed.signature());
        assert_eq!(catalog.signature().to_string(), "int|0|0|0|true|false");
    }

    #[test]
    fn signature_detects_length_changes() {
        assert_ne!(column("nvarchar", 100).signature(), column("nvarchar", 200).signature());
    }

    #[test]
    fn quoting_escapes_closing_brackets() {
        assert_eq!(qualified_name("dbo", "Odd]Name"), "[dbo].[Odd]]Name]");
    }
}
