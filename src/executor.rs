//! Execution of vetted statements and failure classification
//!
//! A network-access denial (firewall, IP allow-list) needs an infrastructure
//! fix, anything else points at the generated statement. Callers render the
//! two differently, so failures are classified here.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{QueryOutcome, QueryRunner};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::RowSet;

/// Why a vetted statement produced no usable rows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    /// The database refused the connection at the network level
    #[error("database access blocked by network policy{}", .detected_ip.as_ref().map(|ip| format!(" (client IP {ip})")).unwrap_or_default())]
    ConnectivityBlocked { detected_ip: Option<String> },

    /// Any other database error
    #[error("SQL error: {raw_message}")]
    ExecutionFailed { raw_message: String },

    /// The call returned no result set at all
    #[error("the query did not return a result set")]
    EmptyResultAnomaly,
}

#[allow(clippy::expect_used)]
static QUOTED_IP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IP address '([^']+)'").expect("quoted IP pattern is valid"));

#[allow(clippy::expect_used)]
static BARE_IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 pattern is valid")
});

/// Sorts driver error text into [`ClassifiedError`] categories
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    signatures: Vec<String>,
}

impl ErrorClassifier {
    /// `signatures` are matched case-insensitively as substrings.
    pub fn new(signatures: Vec<String>) -> Self {
        Self {
            signatures: signatures.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, message: &str) -> ClassifiedError {
        let lowered = message.to_lowercase();
        if self.signatures.iter().any(|s| lowered.contains(s.as_str())) {
            return ClassifiedError::ConnectivityBlocked { detected_ip: extract_ip(message) };
        }
        ClassifiedError::ExecutionFailed { raw_message: message.to_string() }
    }
}

/// Pull a client IP out of an access-denied message.
pub fn extract_ip(message: &str) -> Option<String> {
    QUOTED_IP
        .captures(message)
        .and_then(|c| c.get(1))
        .or_else(|| BARE_IPV4.find(message))
        .map(|m| m.as_str().to_string())
}

/// Runs vetted statements with a time budget
pub struct StatementExecutor {
    runner: Arc<dyn QueryRunner>,
    classifier: ErrorClassifier,
    timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl StatementExecutor {
    pub fn new(runner: Arc<dyn QueryRunner>, classifier: ErrorClassifier, timeout: Duration) -> Self {
        Self {
            runner,
            classifier,
            timeout,
            metrics: Arc::new(MetricsCollector::default()),
        }
    }

    /// Execute a statement that already passed the safety gate.
    pub async fn execute(&self, statement: &str) -> Result<RowSet, ClassifiedError> {
        let timer = OperationTimer::new("query_execution");
        let outcome = tokio::time::timeout(self.timeout, self.runner.run(statement)).await;

        let result = match outcome {
            Err(_) => Err(ClassifiedError::ExecutionFailed {
                raw_message: format!("query timed out after {}s", self.timeout.as_secs()),
            }),
            Ok(Ok(QueryOutcome::Rows(rows))) => Ok(rows),
            Ok(Ok(QueryOutcome::NoResultSet)) => Err(ClassifiedError::EmptyResultAnomaly),
            Ok(Err(e)) => Err(self.classifier.classify(&e.raw_message())),
        };

        self.metrics.record_query(timer.elapsed(), result.is_ok());
        match &result {
            Ok(rows) => debug!(rows = rows.row_count(), truncated = rows.truncated, "Query returned"),
            Err(e) => warn!(error = %e, "Query failed"),
        }
        result
    }
}
