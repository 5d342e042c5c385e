//! Publish event and dispatch scope.

use beacon_filter::Value;

/// The event every invoked handler receives ahead of the raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishEvent {
    /// Published channel.
    pub channel: String,
    /// Published arguments.
    pub args: Vec<Value>,
    /// Whether the publish was limited to a subtree.
    pub scoped: bool,
}

impl PublishEvent {
    /// Create an event.
    #[must_use]
    pub fn new(channel: impl Into<String>, args: Vec<Value>, scoped: bool) -> Self {
        Self {
            channel: channel.into(),
            args,
            scoped,
        }
    }
}

/// Which subscriber nodes a publish may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope<N> {
    /// Every connected subscriber.
    Global,
    /// The given node and its descendants.
    Subtree(N),
}

impl<N> Scope<N> {
    /// Check if this is the global scope.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}
