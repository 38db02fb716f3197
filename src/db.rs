use std::time::Duration;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, InterruptHandle, OpenFlags};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{QueryBridgeError, Result};
use crate::models::{ColumnInfo, RowSet};
use crate::schema;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// A base table located by schema and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Metadata queries the schema indexer needs from a live database.
///
/// Calls block; callers on an async runtime should run them on a blocking
/// thread.
pub trait CatalogSource: Send + Sync {
    /// All base tables, ordered by schema then name
    fn list_tables(&self) -> Result<Vec<TableRef>>;
    /// Columns in ordinal order, without enum values
    fn columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>>;
    fn row_count(&self, table: &TableRef) -> Result<u64>;
    /// Number of distinct non-null values
    fn distinct_count(&self, table: &TableRef, column: &str) -> Result<u64>;
    /// Up to `limit` distinct non-null values in ascending order
    fn distinct_values(&self, table: &TableRef, column: &str, limit: u64) -> Result<Vec<Value>>;
}

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// A result set, possibly with zero rows
    Rows(RowSet),
    /// The statement has no result columns at all
    NoResultSet,
}

/// Runs one SQL statement against the database.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: &str) -> Result<QueryOutcome>;
}

/// Read-only pooled access to a SQLite database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    max_rows: usize,
}

impl Database {
    /// Create a read-only connection pool.
    ///
    /// Connections are opened lazily, so an unreachable file is reported on
    /// first use rather than here.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(&config.path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| conn.execute_batch("PRAGMA query_only = ON;"));

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build_unchecked(manager);

        Ok(Self { pool, max_rows: config.max_result_rows })
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        self.pool.get().map_err(QueryBridgeError::from)
    }

    /// Round-trip a trivial query
    pub fn check_connection(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn query_count(&self, sql: &str) -> Result<u64> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl CatalogSource for Database {
    fn list_tables(&self) -> Result<Vec<TableRef>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(schema::LIST_SCHEMAS)?;
        let schemas = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = Vec::new();
        for schema_name in schemas.into_iter().filter(|s| s != schema::TEMP_SCHEMA) {
            let mut stmt = conn.prepare(&schema::list_tables(&schema_name))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tables.extend(names.into_iter().map(|name| TableRef::new(schema_name.clone(), name)));
        }

        tables.sort();
        Ok(tables)
    }

    fn columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let conn = self.get_connection()?;

        let mut fk_stmt = conn.prepare(schema::FOREIGN_KEY_COLUMNS)?;
        let fk_columns = fk_stmt
            .query_map(params![table.name, table.schema], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(schema::TABLE_COLUMNS)?;
        let columns = stmt
            .query_map(params![table.name, table.schema], |row| {
                let name: String = row.get(0)?;
                let declared: Option<String> = row.get(1)?;
                let not_null: i64 = row.get(2)?;
                let default_value: Option<String> = row.get(3)?;
                let pk: i64 = row.get(4)?;
                let (data_type, max_length) = parse_declared_type(declared.as_deref().unwrap_or(""));
                Ok(ColumnInfo {
                    is_foreign_key: fk_columns.contains(&name),
                    name,
                    data_type,
                    nullable: not_null == 0,
                    is_primary_key: pk > 0,
                    default_value,
                    max_length,
                    enum_values: None,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(columns)
    }

    fn row_count(&self, table: &TableRef) -> Result<u64> {
        self.query_count(&schema::count_rows(&table.schema, &table.name))
    }

    fn distinct_count(&self, table: &TableRef, column: &str) -> Result<u64> {
        self.query_count(&schema::count_distinct(&table.schema, &table.name, column))
    }

    fn distinct_values(&self, table: &TableRef, column: &str, limit: u64) -> Result<Vec<Value>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&schema::distinct_values(&table.schema, &table.name, column))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let values = stmt
            .query_map(params![limit], |row| Ok(value_to_json(row.get_ref(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }
}

/// Interrupts the running statement if the owning future is dropped early.
struct InterruptOnDrop {
    handle: InterruptHandle,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("Interrupting abandoned query");
            self.handle.interrupt();
        }
    }
}

#[async_trait]
impl QueryRunner for Database {
    async fn run(&self, sql: &str) -> Result<QueryOutcome> {
        let pool = self.pool.clone();
        let conn = tokio::task::spawn_blocking(move || pool.get()).await??;

        let mut guard = InterruptOnDrop { handle: conn.get_interrupt_handle(), armed: true };
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        let outcome = tokio::task::spawn_blocking(move || query_rows(&conn, &sql, max_rows)).await?;
        guard.armed = false;

        outcome
    }
}

/// Run one statement and collect its rows, stopping after `max_rows`.
pub fn query_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryOutcome> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        return Ok(QueryOutcome::NoResultSet);
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut result = RowSet { columns, rows: Vec::new(), truncated: false };

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if result.rows.len() == max_rows {
            result.truncated = true;
            break;
        }
        let mut map = Map::with_capacity(result.columns.len());
        for (idx, name) in result.columns.iter().enumerate() {
            map.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        result.rows.push(map);
    }

    Ok(QueryOutcome::Rows(result))
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

/// Split a declared SQL type into its lower-cased base name and length.
///
/// `NVARCHAR(20)` gives `("nvarchar", Some(20))`; precision/scale pairs and
/// non-numeric arguments give no length.
#[must_use]
pub fn parse_declared_type(declared: &str) -> (String, Option<u32>) {
    let declared = declared.trim();
    let base_name = |text: &str| text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let Some(open) = declared.find('(') else {
        return (base_name(declared), None);
    };

    let base = base_name(&declared[..open]);
    let args = declared[open + 1..].trim_end().trim_end_matches(')');
    let max_length = if args.contains(',') { None } else { args.trim().parse::<u32>().ok() };
    (base, max_length)
}
