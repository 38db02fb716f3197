//! Data models shared across the pipeline
//!
//! This module contains the indexed schema document, conversation turns,
//! safety verdicts and query result sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format version written into every indexed schema document
pub const SCHEMA_FORMAT_VERSION: &str = "1.0";

/// One column as seen by the indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Lower-cased base type (`varchar`, `integer`, ...)
    #[serde(rename = "type")]
    pub data_type: String,
    /// True if NULL is allowed
    pub nullable: bool,
    /// Part of the primary key
    pub is_primary_key: bool,
    /// Source column of a foreign key
    pub is_foreign_key: bool,
    /// Declared default expression
    pub default_value: Option<String>,
    /// Declared maximum length for bounded string types
    pub max_length: Option<u32>,
    /// Observed literal values when the column was classified as an enum
    pub enum_values: Option<Vec<String>>,
}

/// One base table as seen by the indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Schema (database) the table lives in
    pub schema_name: String,
    /// Table name
    pub table_name: String,
    /// Columns in catalog ordinal order
    pub columns: Vec<ColumnInfo>,
    /// Number of rows at index time, 0 if counting failed
    pub row_count: u64,
}

impl TableInfo {
    /// `schema.table`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// The indexed description of the whole database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchema {
    /// Tables ordered by schema then name
    pub tables: Vec<TableInfo>,
    /// When the index run finished
    pub indexed_at: DateTime<Utc>,
    /// Document format version
    pub version: String,
}

impl DatabaseSchema {
    /// Build a document stamped with the current time.
    #[must_use]
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self {
            tables,
            indexed_at: Utc::now(),
            version: SCHEMA_FORMAT_VERSION.to_string(),
        }
    }

    /// A schema without tables cannot drive a chat request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human asking questions
    User,
    /// The model
    Assistant,
}

/// One prior exchange, owned by the calling session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker
    pub role: Role,
    /// Text shown to the user
    pub content: String,
    /// SQL the assistant ran for this turn, if any
    #[serde(default)]
    pub sql: Option<String>,
}

impl ConversationTurn {
    /// A user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), sql: None }
    }

    /// An assistant turn, optionally carrying the SQL it produced
    #[must_use]
    pub fn assistant(content: impl Into<String>, sql: Option<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), sql }
    }
}

/// Result of the SQL safety gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum SafetyVerdict {
    /// Statement may run
    Allowed,
    /// Statement must not run
    Blocked {
        /// Human-readable reason
        reason: String,
    },
}

impl SafetyVerdict {
    /// True for [`SafetyVerdict::Allowed`]
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Rows returned by a successful query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSet {
    /// Column names in result order
    pub columns: Vec<String>,
    /// One ordered mapping per row
    pub rows: Vec<Map<String, Value>>,
    /// True when rows were dropped to respect the row cap
    pub truncated: bool,
}

impl RowSet {
    /// Number of rows held
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Rendering used by the CLI for result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text table
    Table,
    /// Comma-separated values format
    Csv,
    /// JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "txt" => Ok(Self::Table),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
