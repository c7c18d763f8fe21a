use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Counter names emitted while reconciling entries.
pub mod counters {
    pub const CREATE: &str = "entry.create";
    pub const THREAD: &str = "entry.thread";
    pub const ALTERNATE_EXISTS: &str = "entry.alternate_exists";
    pub const DUPLICATE: &str = "entry.duplicate";
    pub const UPDATE: &str = "entry.update";
    pub const NO_CHANGE: &str = "entry.no_change";
    pub const UPDATE_BIG: &str = "entry.update_big";
}

/// Fire-and-forget sink for failures worth a human look.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, category: &str, message: &str, context: Value);
}

/// Fire-and-forget counter sink.
pub trait Metrics: Send + Sync {
    fn increment(&self, name: &'static str);
}

/// Reports errors as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, category: &str, message: &str, context: Value) {
        tracing::error!(category, context = %context, "{}", message);
    }
}

/// Forwards to whatever recorder is installed for the `metrics` facade.
#[derive(Debug, Default)]
pub struct CounterMetrics;

impl Metrics for CounterMetrics {
    fn increment(&self, name: &'static str) {
        metrics::counter!(name).increment(1);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub category: String,
    pub message: String,
    pub context: Value,
}

/// Keeps every report in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, category: &str, message: &str, context: Value) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(Report {
                category: category.to_string(),
                message: message.to_string(),
                context,
            });
        }
    }
}

/// Counts increments per name in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl RecordingMetrics {
    pub fn count(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(name).copied())
            .unwrap_or(0)
    }
}

impl Metrics for RecordingMetrics {
    fn increment(&self, name: &'static str) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_metrics_counts_per_name() {
        let metrics = RecordingMetrics::default();
        metrics.increment(counters::CREATE);
        metrics.increment(counters::CREATE);
        metrics.increment(counters::THREAD);

        assert_eq!(metrics.count(counters::CREATE), 2);
        assert_eq!(metrics.count(counters::THREAD), 1);
        assert_eq!(metrics.count(counters::UPDATE), 0);
    }

    #[test]
    fn recording_reporter_keeps_context() {
        let reporter = RecordingReporter::default();
        reporter.report("receiver#create", "Entry create failed", json!({"feed_id": 1}));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context["feed_id"], 1);
    }

    #[test]
    fn facade_sinks_never_panic_without_recorder() {
        CounterMetrics.increment(counters::UPDATE);
        TracingReporter.report("receiver#update", "Entry update failed", Value::Null);
    }
}
