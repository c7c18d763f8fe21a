mod duplicate_cache;
mod reporting;
mod sanitizer;

pub use duplicate_cache::{DuplicateCache, MemoryDuplicateCache};
pub use reporting::{
    counters, CounterMetrics, ErrorReporter, Metrics, RecordingMetrics, RecordingReporter, Report,
    TracingReporter,
};
pub use sanitizer::{summary, HtmlSanitizer, Sanitizer};
