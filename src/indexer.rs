//! Schema indexing
//!
//! Walks the live catalog into a [`DatabaseSchema`], infers enum-like columns,
//! and replaces the stored document. A failure on one table or column
//! degrades that record and is logged; only an unreachable catalog aborts the
//! run.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{CatalogSource, TableRef};
use crate::error::{QueryBridgeError, Result};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{ColumnInfo, DatabaseSchema, TableInfo};
use crate::store::SchemaStore;

/// Tunable thresholds for enum inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumPolicy {
    /// Substrings that mark a column name as enum-like (matched lower-cased)
    pub name_hints: Vec<String>,
    /// Base types treated as bounded strings
    pub string_types: Vec<String>,
    /// Longest bounded string that is still a candidate without a name hint
    pub max_candidate_length: u32,
    /// Distinct-value ceiling for name-hinted columns
    pub max_hinted_distinct: u64,
    /// Distinct-value ceiling for columns without a name hint
    pub max_unhinted_distinct: u64,
    /// Exclusive upper bound on `distinct / row_count` without a name hint
    pub max_distinct_ratio: f64,
    /// Most literal values kept per column
    pub max_values: usize,
}

impl Default for EnumPolicy {
    fn default() -> Self {
        Self {
            name_hints: [
                "status", "type", "code", "state", "category", "level", "priority", "role", "gender",
                "country", "language",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            string_types: [
                "varchar",
                "nvarchar",
                "char",
                "nchar",
                "character",
                "character varying",
                "varying character",
                "native character",
                "national character",
            ]
                .into_iter()
                .map(String::from)
                .collect(),
            max_candidate_length: 50,
            max_hinted_distinct: 100,
            max_unhinted_distinct: 50,
            max_distinct_ratio: 0.05,
            max_values: 100,
        }
    }
}

impl EnumPolicy {
    /// True if the column name contains one of the hint substrings.
    #[must_use]
    pub fn has_name_hint(&self, column_name: &str) -> bool {
        let lowered = column_name.to_lowercase();
        self.name_hints.iter().any(|hint| lowered.contains(hint.as_str()))
    }

    /// Whether a column is worth a distinct-count query at all.
    #[must_use]
    pub fn is_candidate(&self, column_name: &str, data_type: &str, max_length: Option<u32>) -> bool {
        if self.has_name_hint(column_name) {
            return true;
        }
        let bounded_string = self.string_types.iter().any(|t| t.eq_ignore_ascii_case(data_type));
        bounded_string && max_length.is_some_and(|len| len <= self.max_candidate_length)
    }

    /// Enum decision from the observed distinct count.
    #[must_use]
    pub fn classify(&self, hinted: bool, distinct: u64, row_count: u64) -> bool {
        if hinted && distinct <= self.max_hinted_distinct {
            return true;
        }
        if distinct == 0 || row_count == 0 || distinct > self.max_unhinted_distinct {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = distinct as f64 / row_count as f64;
        ratio < self.max_distinct_ratio
    }
}

/// Builds and persists [`DatabaseSchema`] documents.
pub struct SchemaIndexer {
    catalog: Arc<dyn CatalogSource>,
    store: Arc<dyn SchemaStore>,
    policy: EnumPolicy,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl SchemaIndexer {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        store: Arc<dyn SchemaStore>,
        policy: EnumPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            policy,
            timeout,
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    /// Scan the database and replace the stored schema.
    pub async fn index(&self) -> Result<DatabaseSchema> {
        let timer = OperationTimer::new("schema_index");
        let catalog = Arc::clone(&self.catalog);
        let policy = self.policy.clone();
        let metrics = Arc::clone(&self.metrics);

        let scan = tokio::task::spawn_blocking(move || scan_catalog(catalog.as_ref(), &policy, &metrics));
        let result = match tokio::time::timeout(self.timeout, scan).await {
            Ok(joined) => joined.map_err(QueryBridgeError::from).and_then(|r| r),
            Err(_) => Err(QueryBridgeError::Timeout {
                operation: "schema indexing".to_string(),
                secs: self.timeout.as_secs(),
            }),
        };

        let schema = match result {
            Ok(schema) => schema,
            Err(e) => {
                self.metrics.record_index_run(timer.elapsed(), false);
                return Err(e);
            },
        };

        if let Err(e) = self.store.put(&schema).await {
            self.metrics.record_index_run(timer.elapsed(), false);
            return Err(e);
        }

        self.metrics.record_index_run(timer.elapsed(), true);
        info!(tables = schema.tables.len(), indexed_at = %schema.indexed_at, "Schema indexed");
        timer.finish();
        Ok(schema)
    }
}

/// Walk the catalog into a fresh schema document. Blocking.
pub fn scan_catalog(
    catalog: &dyn CatalogSource,
    policy: &EnumPolicy,
    metrics: &MetricsCollector,
) -> Result<DatabaseSchema> {
    let tables = catalog
        .list_tables()
        .map_err(|e| QueryBridgeError::Connectivity(e.raw_message()))?;
    info!(count = tables.len(), "Indexing tables");

    let tables = tables
        .iter()
        .map(|table| index_table(catalog, policy, metrics, table))
        .collect();

    Ok(DatabaseSchema::new(tables))
}

fn index_table(
    catalog: &dyn CatalogSource,
    policy: &EnumPolicy,
    metrics: &MetricsCollector,
    table: &TableRef,
) -> TableInfo {
    let mut columns = catalog.columns(table).unwrap_or_else(|e| {
        warn!(schema = %table.schema, table = %table.name, error = %e, "Column metadata unavailable");
        metrics.record_index_degradation("columns");
        Vec::new()
    });

    let row_count = catalog.row_count(table).unwrap_or_else(|e| {
        warn!(schema = %table.schema, table = %table.name, error = %e, "Row count failed, recording 0");
        metrics.record_index_degradation("row_count");
        0
    });

    if row_count > 0 {
        for column in &mut columns {
            match infer_enum(catalog, policy, table, column, row_count) {
                Ok(values) => column.enum_values = values,
                Err(e) => {
                    warn!(schema = %table.schema, table = %table.name, column = %column.name, error = %e, "Skipping enum inference");
                    metrics.record_index_degradation("enum_sampling");
                },
            }
        }
    }

    TableInfo {
        schema_name: table.schema.clone(),
        table_name: table.name.clone(),
        columns,
        row_count,
    }
}

fn infer_enum(
    catalog: &dyn CatalogSource,
    policy: &EnumPolicy,
    table: &TableRef,
    column: &ColumnInfo,
    row_count: u64,
) -> Result<Option<Vec<String>>> {
    if !policy.is_candidate(&column.name, &column.data_type, column.max_length) {
        return Ok(None);
    }

    let sampling_error = |e: QueryBridgeError| QueryBridgeError::EnumSampling {
        table: table.to_string(),
        column: column.name.clone(),
        message: e.raw_message(),
    };

    let distinct = catalog.distinct_count(table, &column.name).map_err(sampling_error)?;
    let hinted = policy.has_name_hint(&column.name);
    if distinct == 0 || !policy.classify(hinted, distinct, row_count) {
        return Ok(None);
    }

    let raw = catalog.distinct_values(table, &column.name, distinct).map_err(sampling_error)?;
    let mut values: Vec<String> = raw
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();
    values.sort();
    values.dedup();
    values.truncate(policy.max_values);

    Ok(if values.is_empty() { None } else { Some(values) })
}
