use comfy_table::{ContentArrangement, Table, presets};

use crate::config::OutputFormat;
use crate::db::types::{ResultSet, Value};

const NULL_CELL: &str = "NULL";
const CLIPPED: &str = "…";

/// Width and length caps applied to every rendered table.
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub max_cell_width: usize,
    pub max_output_chars: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            max_cell_width: 140,
            max_output_chars: 25_000,
        }
    }
}

/// Renders pre-formatted cells under `headers`. Every other table in the
/// crate goes through here.
pub fn render_rows(
    headers: &[&str],
    rows: &[Vec<String>],
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let mut table = Table::new();
    table.load_preset(if matches!(format, OutputFormat::Markdown) {
        presets::ASCII_MARKDOWN
    } else {
        presets::UTF8_FULL
    });
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.to_vec());
    for row in rows {
        table.add_row(row.iter().map(|cell| clip(cell, options.max_cell_width)));
    }
    cap_length(table.to_string(), options.max_output_chars)
}

pub fn render_result_set_table(
    result_set: &ResultSet,
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let headers: Vec<&str> = result_set.columns.iter().map(|c| c.name.as_str()).collect();
    let rows: Vec<Vec<String>> = result_set
        .rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    render_rows(&headers, &rows, format, options)
}

/// Two-column table; `title` heads the key column.
pub fn render_key_value_table(
    title: &str,
    pairs: &[(String, String)],
    format: OutputFormat,
    options: &TableOptions,
) -> String {
    let rows: Vec<Vec<String>> = pairs
        .iter()
        .map(|(key, value)| vec![key.clone(), value.clone()])
        .collect();
    render_rows(&[title, "Value"], &rows, format, options)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => NULL_CELL.to_string(),
        other => other.as_display(),
    }
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    kept + CLIPPED
}

fn cap_length(rendered: String, limit: usize) -> String {
    if rendered.len() <= limit {
        return rendered;
    }
    let mut capped: String = rendered.chars().take(limit).collect();
    capped.push_str("\n[output truncated]");
    capped
}
