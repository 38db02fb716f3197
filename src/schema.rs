//! Catalog query definitions
//!
//! SQL text used to introspect a SQLite database. Table and column names of
//! the user's database are never interpolated unquoted; see [`quote_ident`].

/// Attached databases (`main`, `temp`, and any `ATTACH`ed file)
pub const LIST_SCHEMAS: &str = "SELECT name FROM pragma_database_list ORDER BY name";

/// Schema that holds connection-local temporary objects, never indexed
pub const TEMP_SCHEMA: &str = "temp";

/// Base tables of one schema, internal `sqlite_` tables excluded
pub fn list_tables(schema: &str) -> String {
    format!(
        "SELECT name FROM {}.sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
        quote_ident(schema)
    )
}

/// Column metadata in ordinal order; `?1` is the table, `?2` the schema
pub const TABLE_COLUMNS: &str =
    "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1, ?2) ORDER BY cid";

/// Source columns of every foreign key; `?1` is the table, `?2` the schema
pub const FOREIGN_KEY_COLUMNS: &str = "SELECT \"from\" FROM pragma_foreign_key_list(?1, ?2)";

/// Row count of a table
pub fn count_rows(schema: &str, table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", qualified(schema, table))
}

/// Distinct non-null values in a column
pub fn count_distinct(schema: &str, table: &str, column: &str) -> String {
    let col = quote_ident(column);
    format!(
        "SELECT COUNT(DISTINCT {col}) FROM {} WHERE {col} IS NOT NULL",
        qualified(schema, table)
    )
}

/// Sorted distinct non-null values; `?1` is the row limit
pub fn distinct_values(schema: &str, table: &str, column: &str) -> String {
    let col = quote_ident(column);
    format!(
        "SELECT DISTINCT {col} FROM {} WHERE {col} IS NOT NULL ORDER BY {col} LIMIT ?1",
        qualified(schema, table)
    )
}

/// Double-quote an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}
