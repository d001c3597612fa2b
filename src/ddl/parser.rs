use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::batches::split_on_go;
use super::lexer::{mask, matching_paren, skip_delimited, statement_end, top_level_commas};
use crate::model::{ColumnMetadata, is_executable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTable {
    pub schema: String,
    pub table: String,
    /// Statement text as written.
    pub raw: String,
    /// Column and table-constraint clauses split at top level.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlterKind {
    Add,
    Drop,
    Alter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterTable {
    pub kind: AlterKind,
    pub schema: String,
    pub table: String,
    pub raw: String,
    /// Everything after `ADD`, `DROP COLUMN` or `ALTER COLUMN`.
    pub clause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "statement", rename_all = "camelCase")]
pub enum Statement {
    CreateTable(CreateTable),
    AlterTable(AlterTable),
}

/// One statement-sized piece of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Parsed {
    Recognized(Statement),
    /// Text outside the recognized shapes, passed through untouched.
    Unrecognized(String),
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bcreate\s+table\s+([\[\]"\w\.]+)\s*\("#).expect("valid create regex")
    })
}

fn alter_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\balter\s+table\s+([\[\]"\w\.]+)\s+(add|drop\s+column|alter\s+column)\b\s*"#)
            .expect("valid alter regex")
    })
}

fn table_constraint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(constraint|primary\s+key|foreign\s+key|unique|check|index|period)\b")
            .expect("valid constraint regex")
    })
}

/// Splits `[schema].[table]`, `"schema"."table"` or `table` into parts.
/// Only dots outside delimited identifiers separate parts. The schema
/// defaults to `dbo`, also when written empty as in `db..table`; a leading
/// database part is ignored.
pub fn split_qualified_name(raw: &str) -> TableName {
    let masked = mask(raw);
    let mut parts = Vec::new();
    let mut start = 0;
    for (dot, _) in masked.match_indices('.') {
        parts.push(unquote_ident(&raw[start..dot]));
        start = dot + 1;
    }
    parts.push(unquote_ident(&raw[start..]));

    let (schema, table) = match parts.as_slice() {
        [table] => (String::new(), table.clone()),
        [.., schema, table] => (schema.clone(), table.clone()),
        [] => (String::new(), String::new()),
    };
    TableName {
        schema: if schema.is_empty() { "dbo".to_string() } else { schema },
        table,
    }
}

/// Splits a column list on commas at parenthesis depth zero, ignoring
/// commas inside literals, comments and delimited identifiers.
pub fn split_columns(text: &str) -> Vec<String> {
    let masked = mask(text);
    let mut parts = Vec::new();
    let mut start = 0;
    for comma in top_level_commas(&masked) {
        parts.push(text[start..comma].trim().to_string());
        start = comma + 1;
    }
    parts.push(text[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

struct Located {
    start: usize,
    end: usize,
    statement: Statement,
}

fn locate_create_tables(text: &str, masked: &str, found: &mut Vec<Located>) {
    for caps in create_table_re().captures_iter(masked) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = matching_paren(masked, open) else {
            continue;
        };
        let end = statement_end(masked, close + 1);
        let name = split_qualified_name(&text[name.start()..name.end()]);
        found.push(Located {
            start: whole.start(),
            end,
            statement: Statement::CreateTable(CreateTable {
                schema: name.schema,
                table: name.table,
                raw: text[whole.start()..end].trim().to_string(),
                columns: split_columns(&text[open + 1..close]),
            }),
        });
    }
}

fn locate_alter_tables(text: &str, masked: &str, found: &mut Vec<Located>) {
    for caps in alter_table_re().captures_iter(masked) {
        let (Some(whole), Some(name), Some(action)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let kind = match action.as_str().to_ascii_lowercase().split_whitespace().next() {
            Some("add") => AlterKind::Add,
            Some("drop") => AlterKind::Drop,
            _ => AlterKind::Alter,
        };
        let end = statement_end(masked, whole.end());
        let mut clause = text[whole.end()..end].trim().trim_end_matches(';').trim();
        if kind == AlterKind::Add {
            if table_constraint_re().is_match(clause) {
                continue;
            }
            clause = strip_wrapping_parens(clause);
        }
        let name = split_qualified_name(&text[name.start()..name.end()]);
        found.push(Located {
            start: whole.start(),
            end,
            statement: Statement::AlterTable(AlterTable {
                kind,
                schema: name.schema,
                table: name.table,
                raw: text[whole.start()..end].trim().to_string(),
                clause: clause.to_string(),
            }),
        });
    }
}

fn strip_wrapping_parens(clause: &str) -> &str {
    if clause.starts_with('(') {
        let masked = mask(clause);
        if matching_paren(&masked, 0) == Some(clause.len() - 1) {
            return clause[1..clause.len() - 1].trim();
        }
    }
    clause
}

/// Classifies every statement-sized piece of `text`. Recognized shapes are
/// `CREATE TABLE` and `ALTER TABLE ... ADD | DROP COLUMN | ALTER COLUMN`;
/// everything else is returned as [`Parsed::Unrecognized`].
pub fn parse_script(text: &str) -> Vec<Parsed> {
    let masked = mask(text);
    let mut found = Vec::new();
    locate_create_tables(text, &masked, &mut found);
    locate_alter_tables(text, &masked, &mut found);
    found.sort_by_key(|l| l.start);

    let mut output = Vec::new();
    let mut cursor = 0;
    for located in found {
        if located.start < cursor {
            continue;
        }
        push_unrecognized(&text[cursor..located.start], &mut output);
        output.push(Parsed::Recognized(located.statement));
        cursor = located.end;
    }
    push_unrecognized(&text[cursor..], &mut output);
    output
}

fn push_unrecognized(gap: &str, output: &mut Vec<Parsed>) {
    for piece in split_on_go(gap) {
        if is_executable(&piece) {
            output.push(Parsed::Unrecognized(piece));
        }
    }
}

pub fn parse_create_tables(text: &str) -> Vec<CreateTable> {
    parse_script(text)
        .into_iter()
        .filter_map(|p| match p {
            Parsed::Recognized(Statement::CreateTable(create)) => Some(create),
            _ => None,
        })
        .collect()
}

pub fn parse_alter_statements(text: &str) -> Vec<AlterTable> {
    parse_script(text)
        .into_iter()
        .filter_map(|p| match p {
            Parsed::Recognized(Statement::AlterTable(alter)) => Some(alter),
            _ => None,
        })
        .collect()
}

/// A column clause reconstructed from DDL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedColumn {
    pub name: String,
    /// Everything after the name, as written.
    pub definition: String,
    pub metadata: ColumnMetadata,
    /// PRIMARY KEY, UNIQUE, REFERENCES or CHECK written inline.
    pub inline_constraints: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnClause {
    Column(ParsedColumn),
    TableConstraint(String),
    Unparsed(String),
}

fn column_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)^\s*(\[(?:[^\]]|\]\])+\]|"[^"]+"|[\w@#$]+)\s+(.+?)\s*$"#)
            .expect("valid column regex")
    })
}

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[?([A-Za-z_]\w*)\]?(?:\s*\(\s*([^)]*)\))?").expect("valid type regex")
    })
}

fn not_null_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNOT\s+NULL\b").expect("valid regex"))
}

fn null_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNULL\b").expect("valid regex"))
}

fn identity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bIDENTITY\b").expect("valid regex"))
}

fn primary_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").expect("valid regex"))
}

fn inline_constraint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(PRIMARY\s+KEY|UNIQUE|REFERENCES|CHECK)\b").expect("valid regex"))
}

fn default_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bDEFAULT\s+").expect("valid regex"))
}

fn computed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^AS\b\s*(.+?)(\s+PERSISTED\b.*)?$").expect("valid regex"))
}

pub fn unquote_ident(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        return raw[1..raw.len() - 1].replace("]]", "]");
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

/// Parses one element of a column list into name, definition and metadata.
pub fn parse_column_clause(raw: &str) -> ColumnClause {
    let raw = raw.trim();
    if raw.is_empty() {
        return ColumnClause::Unparsed(String::new());
    }
    if table_constraint_re().is_match(raw) {
        return ColumnClause::TableConstraint(raw.to_string());
    }
    let Some(caps) = column_name_re().captures(raw) else {
        return ColumnClause::Unparsed(raw.to_string());
    };
    let name = unquote_ident(&caps[1]);
    let definition = caps[2].to_string();

    if let Some(computed) = computed_re().captures(&definition) {
        let mut metadata = ColumnMetadata::new(name.clone(), "");
        metadata.is_computed = true;
        metadata.computed_definition = Some(computed[1].trim().to_string());
        return ColumnClause::Column(ParsedColumn {
            name,
            definition,
            metadata,
            inline_constraints: false,
        });
    }

    let Some(type_caps) = type_re().captures(&definition) else {
        return ColumnClause::Unparsed(raw.to_string());
    };
    let sql_type = type_caps[1].to_lowercase();
    let args: Vec<String> = type_caps
        .get(2)
        .map(|m| m.as_str().split(',').map(|a| a.trim().to_lowercase()).collect())
        .unwrap_or_default();
    let Some(mut metadata) = metadata_for_type(&name, &sql_type, &args) else {
        return ColumnClause::Unparsed(raw.to_string());
    };

    let rest = &definition[type_caps.get(0).map(|m| m.end()).unwrap_or(0)..];
    let masked_rest = mask(rest);
    metadata.is_identity = identity_re().is_match(&masked_rest);
    let primary_key = primary_key_re().is_match(&masked_rest);
    metadata.is_nullable = if not_null_re().is_match(&masked_rest) {
        false
    } else if null_re().is_match(&masked_rest) {
        true
    } else {
        !(metadata.is_identity || primary_key)
    };
    metadata.default_definition = default_re()
        .find(&masked_rest)
        .map(|m| default_expression(rest, &masked_rest, m.end()))
        .filter(|d| !d.is_empty());

    ColumnClause::Column(ParsedColumn {
        name,
        definition,
        metadata,
        inline_constraints: inline_constraint_re().is_match(&masked_rest),
    })
}

fn default_expression(rest: &str, masked: &str, start: usize) -> String {
    if masked[start..].starts_with('(') {
        if let Some(close) = matching_paren(masked, start) {
            return rest[start..=close].to_string();
        }
    }
    // Bare form: a literal, a call or a word, ending at the next top-level
    // whitespace, comma or closing paren.
    let bytes = rest.as_bytes();
    let mut depth = 0i32;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i = skip_delimited(bytes, i, b'\'');
                continue;
            }
            b'(' => depth += 1,
            b')' if depth == 0 => break,
            b')' => depth -= 1,
            b',' if depth == 0 => break,
            c if depth == 0 && c.is_ascii_whitespace() => break,
            _ => {}
        }
        i += 1;
    }
    rest[start..i].to_string()
}

fn parse_len(arg: &str) -> Option<i64> {
    arg.parse::<i64>().ok()
}

/// Catalog-unit metadata for a parsed type. Unknown argument shapes give `None`.
fn metadata_for_type(name: &str, sql_type: &str, args: &[String]) -> Option<ColumnMetadata> {
    let mut col = ColumnMetadata::new(name, sql_type);
    match sql_type {
        "varchar" | "char" | "varbinary" | "binary" | "nvarchar" | "nchar" => {
            let unit = if sql_type.starts_with('n') { 2 } else { 1 };
            col.max_length = match args.first().map(String::as_str) {
                None => unit,
                Some("max") => -1,
                Some(len) => parse_len(len)? * unit,
            };
        }
        "decimal" | "numeric" => {
            col.precision = args.first().map(|a| parse_len(a)).unwrap_or(Some(18))?;
            col.scale = args.get(1).map(|a| parse_len(a)).unwrap_or(Some(0))?;
        }
        "datetime2" | "time" | "datetimeoffset" => {
            col.scale = args.first().map(|a| parse_len(a)).unwrap_or(Some(7))?;
        }
        "float" => {
            let requested = args.first().map(|a| parse_len(a)).unwrap_or(Some(53))?;
            col.precision = if requested <= 24 { 24 } else { 53 };
        }
        _ => {}
    }
    Some(col)
}

/// Column names listed after `DROP COLUMN`, with an optional `IF EXISTS`.
pub fn parse_drop_names(clause: &str) -> Vec<String> {
    let trimmed = clause.trim();
    let without_guard = match trimmed.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("if exists") => &trimmed[9..],
        _ => trimmed,
    };
    split_columns(without_guard)
        .iter()
        .map(|name| unquote_ident(name))
        .filter(|name| !name.is_empty())
        .collect()
}
