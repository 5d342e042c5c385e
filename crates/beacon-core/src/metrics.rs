//! Dispatch instrumentation.
//!
//! Uses the `metrics` facade; without an installed recorder these calls are
//! no-ops.

use metrics::counter;

/// Metric names.
pub mod names {
    pub const PUBLISH_TOTAL: &str = "beacon_publish_total";
    pub const HANDLERS_INVOKED_TOTAL: &str = "beacon_handlers_invoked_total";
    pub const FILTER_CACHE_MISSES_TOTAL: &str = "beacon_filter_cache_misses_total";
}

/// Describe all metrics to the installed recorder.
pub fn describe() {
    metrics::describe_counter!(names::PUBLISH_TOTAL, "Total number of publish calls");
    metrics::describe_counter!(
        names::HANDLERS_INVOKED_TOTAL,
        "Total number of subscription handlers invoked"
    );
    metrics::describe_counter!(
        names::FILTER_CACHE_MISSES_TOTAL,
        "Filter strings parsed because they were not cached"
    );
}

/// Record a publish and how many handlers it reached.
pub(crate) fn record_publish(scoped: bool, handlers: usize) {
    let scope = if scoped { "subtree" } else { "global" };
    counter!(names::PUBLISH_TOTAL, "scope" => scope).increment(1);
    counter!(names::HANDLERS_INVOKED_TOTAL).increment(handlers as u64);
}

/// Record a filter cache miss.
pub(crate) fn record_filter_miss() {
    counter!(names::FILTER_CACHE_MISSES_TOTAL).increment(1);
}
