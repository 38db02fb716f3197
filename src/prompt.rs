//! Schema rendering for model prompts
//!
//! Turns a [`DatabaseSchema`] into the markdown description embedded in the
//! system instruction. Rendering is deterministic: tables and columns keep
//! their stored order and enum values keep their indexed (ascending) order.

use std::fmt::Write;

use crate::models::{ColumnInfo, DatabaseSchema, TableInfo};

/// Default number of enum literals shown per column
pub const DEFAULT_MAX_DISPLAY_VALUES: usize = 20;

/// Renders schemas into prompt text
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    title: String,
    max_display_values: usize,
}

impl Default for PromptCompiler {
    fn default() -> Self {
        Self {
            title: "SQLite database - full schema".to_string(),
            max_display_values: DEFAULT_MAX_DISPLAY_VALUES,
        }
    }
}

impl PromptCompiler {
    /// Override how many enum values are shown per column
    #[must_use]
    pub fn with_max_display_values(mut self, max: usize) -> Self {
        self.max_display_values = max;
        self
    }

    /// Render the whole schema.
    pub fn render(&self, schema: &DatabaseSchema) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "# {}\n", self.title);
        let _ = writeln!(out, "Indexed at: {}\n", schema.indexed_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "## Tables ({} tables)\n", schema.tables.len());

        for table in &schema.tables {
            self.render_table(&mut out, table);
        }

        out
    }

    fn render_table(&self, out: &mut String, table: &TableInfo) {
        let _ = writeln!(
            out,
            "### {} ({} rows)\n",
            table.qualified_name(),
            format_thousands(table.row_count)
        );
        out.push_str("| Column | Type | Nullable | PK | FK | Possible values |\n");
        out.push_str("|--------|------|----------|----|----|-----------------|\n");

        for col in &table.columns {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                table_cell(&col.name),
                table_cell(&col.data_type),
                flag(col.nullable),
                flag(col.is_primary_key),
                flag(col.is_foreign_key),
                self.possible_values(col)
            );
        }

        out.push('\n');
    }

    fn possible_values(&self, col: &ColumnInfo) -> String {
        match &col.enum_values {
            Some(values) if !values.is_empty() => values
                .iter()
                .take(self.max_display_values)
                .map(|v| table_cell(&sql_literal(v)))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "-".to_string(),
        }
    }
}

const fn flag(value: bool) -> &'static str {
    if value { "✓" } else { "✗" }
}

/// Quote a value as a SQL string literal.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Keep text on one markdown table row.
fn table_cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ").replace('|', "\\|")
}

/// `1234567` → `1,234,567`
#[must_use]
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
