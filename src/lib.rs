//! querybridge - natural-language questions over a read-only database
//!
//! A library for asking plain-language questions of a relational database
//! through a language model, without ever letting generated SQL write.
//!
//! # Features
//!
//! - Schema indexing with enum-like column inference
//! - Compact schema prompts for the model
//! - Conversation replay that keeps the model's own past SQL in context
//! - Lexical read-only gate plus a read-only connection
//! - Execution failures classified into network denials and SQL errors
//! - CLI and HTTP API front ends

/// Configuration management
pub mod config;
/// System instruction and history replay
pub mod conversation;
/// Database access and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Statement execution and failure classification
pub mod executor;
/// Catalog scan and enum inference
pub mod indexer;
/// Model response parsing
pub mod interpreter;
/// Model completion client
pub mod llm;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Result rendering for the CLI
pub mod output;
/// Schema prompt rendering
pub mod prompt;
/// Read-only SQL gate
pub mod safety;
/// SQLite catalog queries
pub mod schema;
/// HTTP API
pub mod server;
/// Chat orchestration
pub mod service;
/// Schema document persistence
pub mod store;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{QueryBridgeError, Result};
pub use indexer::{EnumPolicy, SchemaIndexer};
pub use models::{ColumnInfo, ConversationTurn, DatabaseSchema, OutputFormat, RowSet, SafetyVerdict, TableInfo};
pub use safety::SqlSafetyGate;
pub use service::{ChatOutcome, ChatService};
