//! Dispatcher configuration.

use crate::marker::DEFAULT_MARKER;
use serde::{Deserialize, Serialize};

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Tracking marker placed on subscriber nodes.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Use the tree's live marker query when it offers one.
    #[serde(default = "default_true")]
    pub live_queries: bool,

    /// Maximum number of parsed filters kept in the cache.
    #[serde(default = "default_filter_cache_capacity")]
    pub filter_cache_capacity: usize,

    /// Notify direct listeners on global publishes.
    #[serde(default = "default_true")]
    pub notify_listeners: bool,
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_filter_cache_capacity() -> usize {
    4096
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            live_queries: true,
            filter_cache_capacity: default_filter_cache_capacity(),
            notify_listeners: true,
        }
    }
}
