//! Parsed filter cache, keyed by the literal filter string.

use crate::metrics;
use beacon_filter::ChannelFilter;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Cache of parsed channel filters.
///
/// Parsing is deterministic, so a full cache only costs re-parsing: filters
/// beyond `capacity` are parsed on every lookup and never stored.
#[derive(Debug)]
pub struct FilterCache {
    filters: DashMap<String, Arc<ChannelFilter>>,
    capacity: usize,
}

impl FilterCache {
    /// Create a cache holding at most `capacity` filters.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            filters: DashMap::new(),
            capacity,
        }
    }

    /// Get the parsed filter for a filter string.
    pub fn resolve(&self, raw: &str) -> Arc<ChannelFilter> {
        if let Some(filter) = self.filters.get(raw) {
            return Arc::clone(filter.value());
        }

        metrics::record_filter_miss();
        let filter = Arc::new(ChannelFilter::parse(raw));
        trace!(
            filter = %raw,
            channel = ?filter.channel(),
            signature = ?filter.signature(),
            "Parsed filter"
        );

        if self.filters.len() >= self.capacity {
            return filter;
        }
        let entry = self.filters.entry(raw.to_string()).or_insert(filter);
        Arc::clone(entry.value())
    }

    /// Number of cached filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Drop every cached filter.
    pub fn clear(&self) {
        self.filters.clear();
    }
}
