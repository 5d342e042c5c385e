//! Component subscription declarations.
//!
//! A component declares its subscriptions as filter strings paired with its
//! own handler methods:
//!
//! ```rust
//! use tenvis_beacon_core::{Component, HandlerResult, PublishEvent, Subscriptions, Value};
//!
//! struct Badge;
//!
//! impl Badge {
//!     fn on_count(&self, _event: &PublishEvent, args: &[Value]) -> HandlerResult {
//!         Ok(args[0].clone().into())
//!     }
//! }
//!
//! impl Component for Badge {
//!     fn subscriptions(&self) -> Subscriptions<Self> {
//!         Subscriptions::new().on("count(number)", Self::on_count)
//!     }
//! }
//! ```
//!
//! Declarations are read when the component attaches and bound to the
//! instance through a weak reference, so the tree never keeps a component
//! alive.

use crate::completion::Reply;
use crate::error::HandlerError;
use crate::event::PublishEvent;
use beacon_filter::Value;
use std::fmt;
use std::sync::Arc;

/// What a handler returns.
pub type HandlerResult = Result<Reply, HandlerError>;

/// A handler method of component `C`.
pub type Method<C> = Arc<dyn Fn(&C, &PublishEvent, &[Value]) -> HandlerResult + Send + Sync>;

/// A UI component instance that can subscribe to channels.
pub trait Component: Send + Sync + Sized + 'static {
    /// Channel subscriptions, in invocation order.
    fn subscriptions(&self) -> Subscriptions<Self> {
        Subscriptions::new()
    }
}

/// Ordered mapping from filter string to handler method.
pub struct Subscriptions<C> {
    entries: Vec<(String, Method<C>)>,
}

impl<C> Subscriptions<C> {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Subscribe `method` to `filter`.
    ///
    /// Re-using a filter string replaces its method but keeps its position.
    #[must_use]
    pub fn on<F>(mut self, filter: impl Into<String>, method: F) -> Self
    where
        F: Fn(&C, &PublishEvent, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        let filter = filter.into();
        let method: Method<C> = Arc::new(method);
        match self.entries.iter_mut().find(|(raw, _)| *raw == filter) {
            Some(entry) => entry.1 = method,
            None => self.entries.push((filter, method)),
        }
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter strings in declaration order.
    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(raw, _)| raw.as_str())
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Method<C>)> {
        self.entries
    }
}

impl<C> Default for Subscriptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Subscriptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Witness;

    impl Witness {
        fn first(&self, _: &PublishEvent, _: &[Value]) -> HandlerResult {
            Ok(Value::from(1).into())
        }

        fn second(&self, _: &PublishEvent, _: &[Value]) -> HandlerResult {
            Ok(Value::from(2).into())
        }
    }

    impl Component for Witness {}

    #[test]
    fn test_default_subscriptions_are_empty() {
        assert!(Witness.subscriptions().is_empty());
    }

    #[test]
    fn test_declaration_order() {
        let subs = Subscriptions::<Witness>::new()
            .on("b", Witness::first)
            .on("a", Witness::second);
        assert_eq!(subs.filters().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(format!("{subs:?}"), r#"["b", "a"]"#);
    }

    #[test]
    fn test_duplicate_filter_replaces_in_place() {
        let subs = Subscriptions::<Witness>::new()
            .on("x", Witness::first)
            .on("y", Witness::first)
            .on("x", Witness::second);
        assert_eq!(subs.len(), 2);

        let entries = subs.into_entries();
        assert_eq!(entries[0].0, "x");
        let event = PublishEvent::new("x", Vec::new(), false);
        let Ok(Reply::Value(value)) = (entries[0].1)(&Witness, &event, &[]) else {
            panic!("expected a value reply");
        };
        assert_eq!(value, Value::from(2));
    }
}
