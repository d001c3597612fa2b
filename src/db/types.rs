use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Null => "".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => format_number(*value),
            Value::Float(value) => value.to_string(),
            Value::Text(value) => value.clone(),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(t) => Some(t.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::Text(t) => t.trim().parse::<i64>().unwrap_or(0),
            Value::Null => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(t) => matches!(t.as_str(), "1" | "true" | "True" | "TRUE"),
            Value::Null => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl Column {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| Column::named(*c)).collect(),
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Row accessor that resolves column names once per result set.
    pub fn reader(&self) -> RowReader<'_> {
        RowReader { set: self }
    }
}

pub struct RowReader<'a> {
    set: &'a ResultSet,
}

impl RowReader<'_> {
    fn cell<'r>(&self, row: &'r [Value], column: &str) -> Option<&'r Value> {
        self.set.column_index(column).and_then(|idx| row.get(idx))
    }

    pub fn text(&self, row: &[Value], column: &str) -> Option<String> {
        self.cell(row, column).and_then(Value::as_text)
    }

    pub fn text_or_empty(&self, row: &[Value], column: &str) -> String {
        self.text(row, column).unwrap_or_default()
    }

    pub fn int(&self, row: &[Value], column: &str) -> i64 {
        self.cell(row, column).map(Value::as_int).unwrap_or(0)
    }

    pub fn bool(&self, row: &[Value], column: &str) -> bool {
        self.cell(row, column).map(Value::as_bool).unwrap_or(false)
    }
}

/// Row counts reported by the driver for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum RowsAffected {
    PerStatement(Vec<u64>),
    Total(u64),
    #[default]
    Unknown,
}

impl RowsAffected {
    pub fn total(&self) -> u64 {
        match self {
            RowsAffected::PerStatement(counts) => counts.iter().sum(),
            RowsAffected::Total(count) => *count,
            RowsAffected::Unknown => 0,
        }
    }
}

/// What a single batch returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchOutcome {
    pub result_sets: Vec<ResultSet>,
    pub rows_affected: RowsAffected,
}

fn format_number(value: i64) -> String {
    let digits = value.abs().to_string().chars().rev().collect::<Vec<_>>();
    let mut out = String::new();
    for (idx, ch) in digits.iter().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(*ch);
    }
    let mut out: String = out.chars().rev().collect();
    if value < 0 {
        out.insert(0, '-');
    }
    out
}
