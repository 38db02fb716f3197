//! Metrics collection
//!
//! Thin wrapper over the `metrics` facade. The crate never installs a
//! recorder; without one every call here is a no-op.

use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names used by the pipeline
pub struct MetricsCollector {
    pub index_runs_total: &'static str,
    pub index_duration: &'static str,
    pub index_degraded_total: &'static str,
    pub chat_outcomes_total: &'static str,
    pub model_duration: &'static str,
    pub query_duration: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            index_runs_total: "querybridge_index_runs_total",
            index_duration: "querybridge_index_duration_seconds",
            index_degraded_total: "querybridge_index_degraded_total",
            chat_outcomes_total: "querybridge_chat_outcomes_total",
            model_duration: "querybridge_model_duration_seconds",
            query_duration: "querybridge_query_duration_seconds",
        }
    }
}

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

impl MetricsCollector {
    /// Record a finished index run
    pub fn record_index_run(&self, duration: Duration, success: bool) {
        counter!(self.index_runs_total, "status" => status_label(success)).increment(1);
        histogram!(self.index_duration).record(duration.as_secs_f64());
    }

    /// Record a table or column that was downgraded during indexing
    pub fn record_index_degradation(&self, kind: &'static str) {
        counter!(self.index_degraded_total, "kind" => kind).increment(1);
    }

    /// Record how a chat request ended
    pub fn record_chat_outcome(&self, outcome: &'static str) {
        counter!(self.chat_outcomes_total, "outcome" => outcome).increment(1);
    }

    /// Record a model completion round-trip
    pub fn record_model_call(&self, duration: Duration) {
        histogram!(self.model_duration).record(duration.as_secs_f64());
    }

    /// Record a vetted query execution
    pub fn record_query(&self, duration: Duration, success: bool) {
        histogram!(self.query_duration, "status" => status_label(success))
            .record(duration.as_secs_f64());
    }
}
