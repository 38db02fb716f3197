//! Row rendering for the command line.
//!
//! Turns a [`RowSet`] into an aligned text table, CSV with a header row, or
//! a pretty-printed JSON array of row objects.

use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use crate::error::Result;
use crate::models::{OutputFormat, RowSet};

/// Render rows in the requested format.
///
/// # Errors
///
/// Returns an error if CSV or JSON serialization fails.
pub fn render_rows(rows: &RowSet, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(rows)),
        OutputFormat::Csv => render_csv(rows),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&rows.rows)?),
    }
}

/// Text form of one cell. Strings are shown without quotes, NULL as empty.
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_table(rows: &RowSet) -> String {
    if rows.columns.is_empty() {
        return "(no columns)\n".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(rows.columns.iter().cloned());
    for row in &rows.rows {
        builder.push_record(rows.columns.iter().map(|c| cell_text(row.get(c))));
    }
    let table = builder.build().with(Style::psql()).to_string();

    let noun = if rows.row_count() == 1 { "row" } else { "rows" };
    let suffix = if rows.truncated { ", truncated" } else { "" };
    format!("{table}\n({} {noun}{suffix})\n", rows.row_count())
}

fn render_csv(rows: &RowSet) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&rows.columns)?;
    for row in &rows.rows {
        writer.write_record(rows.columns.iter().map(|c| cell_text(row.get(c))))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
