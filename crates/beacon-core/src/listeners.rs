//! Direct listeners outside the component tree.
//!
//! Listeners hear global publishes on an exact channel name, after every tree
//! handler has run. Their return value is not awaited.

use crate::event::PublishEvent;
use beacon_filter::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A direct listener callback.
pub type Listener = Arc<dyn Fn(&PublishEvent, &[Value]) + Send + Sync>;

/// Handle returned by registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    channel: String,
    listener: Listener,
}

/// Registry of direct listeners, in registration order.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl Listeners {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `channel`.
    pub fn on(&self, channel: impl Into<String>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let channel = channel.into();
        trace!(channel = %channel, id = id.0, "Listener registered");
        self.entries.write().push(Entry {
            id,
            channel,
            listener,
        });
        id
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn count(&self, channel: &str) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.channel == channel)
            .count()
    }

    /// Total number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy the listeners currently registered on `channel`, in order.
    ///
    /// Listeners added or removed afterwards do not affect the copy.
    #[must_use]
    pub fn snapshot(&self, channel: &str) -> Vec<Listener> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.channel == channel)
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
