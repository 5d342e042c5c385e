//! Tree-membership tracking.
//!
//! Keeps the subscriber marker on tree nodes consistent with the components
//! attached to them. A node carries the marker exactly while a component with
//! at least one subscription is bound to it.

use crate::cache::FilterCache;
use crate::completion::Reply;
use crate::component::{Component, Subscriptions};
use crate::error::{DispatchError, HandlerError};
use crate::event::PublishEvent;
use crate::marker::Marker;
use crate::tree::Tree;
use beacon_filter::{ChannelFilter, Value};
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Handler bound to its instance. Yields `None` once the instance is gone.
pub(crate) type BoundHandler =
    Arc<dyn Fn(&PublishEvent, &[Value]) -> Option<Result<Reply, HandlerError>> + Send + Sync>;

/// Explicit attach/detach extension point for the host framework.
pub trait LifecycleHook<C: Component, N> {
    /// Called after `instance` is attached to `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is unknown to the tree.
    fn on_attach(&self, instance: &Arc<C>, node: N) -> Result<(), DispatchError>;

    /// Called when `instance` is detached from `node`.
    fn on_detach(&self, instance: &Arc<C>, node: N);
}

/// One resolved subscription entry.
pub(crate) struct BoundEntry {
    pub(crate) filter: Arc<ChannelFilter>,
    pub(crate) handler: BoundHandler,
}

/// A node's back-reference to its component and resolved subscriptions.
pub(crate) struct Binding {
    instance: Weak<dyn Any + Send + Sync>,
    entries: Vec<BoundEntry>,
}

impl Binding {
    pub(crate) fn is_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }

    pub(crate) fn entries(&self) -> &[BoundEntry] {
        &self.entries
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("alive", &self.is_alive())
            .field(
                "filters",
                &self.entries.iter().map(|e| e.filter.raw()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Identity of a component instance, by allocation address.
///
/// The tracker holds a `Weak` to every attached instance, so the address
/// cannot be reused by another allocation while the entry exists.
fn instance_key<C>(instance: &Arc<C>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

/// An attached instance, subscribed or not.
#[derive(Debug, Clone)]
struct Attached<N> {
    node: N,
    instance: Weak<dyn Any + Send + Sync>,
}

/// Node bookkeeping for attached components.
#[derive(Debug)]
pub struct Tracker<N: Eq + Hash> {
    /// Subscriber node -> binding.
    bindings: DashMap<N, Arc<Binding>>,
    /// Attached node -> instance key, for every attached instance.
    attached: DashMap<N, usize>,
    /// Instance key -> node, for scoped publishes from an instance.
    nodes: DashMap<usize, Attached<N>>,
}

impl<N: Copy + Eq + Hash + fmt::Debug> Tracker<N> {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            attached: DashMap::new(),
            nodes: DashMap::new(),
        }
    }

    /// Bind `instance` to `node` with its already-read `subscriptions`, and
    /// set or clear the marker.
    ///
    /// Returns `true` if the node is now marked as a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownNode`] if the tree does not know `node`.
    pub fn attach<C, T>(
        &self,
        tree: &mut T,
        marker: &Marker,
        filters: &FilterCache,
        instance: &Arc<C>,
        subscriptions: Subscriptions<C>,
        node: N,
    ) -> Result<bool, DispatchError>
    where
        C: Component,
        T: Tree<Node = N>,
    {
        if !tree.has_node(node) {
            return Err(DispatchError::UnknownNode(format!("{node:?}")));
        }
        self.prune(tree, marker);

        let key = instance_key(instance);
        if let Some(previous) = self.nodes.get(&key).map(|entry| entry.node) {
            if previous != node {
                debug!(from = ?previous, to = ?node, "Instance moved to a new node");
                self.detach(tree, marker, previous);
            }
        }
        if let Some(other) = self.attached.get(&node).map(|k| *k) {
            if other != key {
                self.nodes.remove(&other);
            }
        }

        let weak = Arc::downgrade(instance);
        let erased: Weak<dyn Any + Send + Sync> = weak.clone();
        self.attached.insert(node, key);
        self.nodes.insert(
            key,
            Attached {
                node,
                instance: erased.clone(),
            },
        );

        if subscriptions.is_empty() {
            self.bindings.remove(&node);
            tree.remove_marker(node, marker);
            debug!(node = ?node, "Attached without subscriptions");
            return Ok(false);
        }

        let entries = subscriptions
            .into_entries()
            .into_iter()
            .map(|(raw, method)| {
                let target = weak.clone();
                let handler: BoundHandler = Arc::new(move |event: &PublishEvent, args: &[Value]| {
                    target.upgrade().map(|this| method(&*this, event, args))
                });
                BoundEntry {
                    filter: filters.resolve(&raw),
                    handler,
                }
            })
            .collect::<Vec<_>>();

        let count = entries.len();
        self.bindings.insert(
            node,
            Arc::new(Binding {
                instance: erased,
                entries,
            }),
        );
        tree.add_marker(node, marker);

        debug!(node = ?node, subscriptions = count, "Subscriber attached");
        Ok(true)
    }

    /// Clear the binding and marker of `node`.
    ///
    /// Returns `true` if a component was attached.
    pub fn detach<T>(&self, tree: &mut T, marker: &Marker, node: N) -> bool
    where
        T: Tree<Node = N>,
    {
        let bound = self.bindings.remove(&node).is_some();
        tree.remove_marker(node, marker);

        let Some((_, key)) = self.attached.remove(&node) else {
            return bound;
        };
        self.nodes.remove_if(&key, |_, entry| entry.node == node);

        debug!(node = ?node, subscriber = bound, "Component detached");
        true
    }

    /// Detach every node whose instance was dropped without a detach.
    ///
    /// Returns the number of nodes released.
    pub fn prune<T>(&self, tree: &mut T, marker: &Marker) -> usize
    where
        T: Tree<Node = N>,
    {
        let dead: Vec<N> = self
            .nodes
            .iter()
            .filter(|entry| entry.instance.strong_count() == 0)
            .map(|entry| entry.node)
            .collect();

        for node in &dead {
            self.detach(tree, marker, *node);
        }
        if !dead.is_empty() {
            debug!(released = dead.len(), "Pruned dropped instances");
        }
        dead.len()
    }

    /// Move every bound node from one marker to another.
    pub fn remark<T>(&self, tree: &mut T, from: &Marker, to: &Marker)
    where
        T: Tree<Node = N>,
    {
        for entry in self.bindings.iter() {
            tree.remove_marker(*entry.key(), from);
            tree.add_marker(*entry.key(), to);
        }
    }

    /// Get the binding for a subscriber node.
    pub(crate) fn binding(&self, node: N) -> Option<Arc<Binding>> {
        self.bindings.get(&node).map(|b| Arc::clone(b.value()))
    }

    /// Get the node an instance is attached to.
    ///
    /// Only the attached instance itself is recognised; a dropped instance
    /// has no node.
    #[must_use]
    pub fn node_of<C>(&self, instance: &Arc<C>) -> Option<N> {
        let entry = self.nodes.get(&instance_key(instance))?;
        (entry.instance.strong_count() > 0).then_some(entry.node)
    }

    /// Check if a node has a subscriber binding.
    #[must_use]
    pub fn is_bound(&self, node: N) -> bool {
        self.bindings.contains_key(&node)
    }

    /// Number of subscriber bindings.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of attached instances, subscribed or not.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

impl<N: Copy + Eq + Hash + fmt::Debug> Default for Tracker<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::HandlerResult;
    use crate::tree::{ArenaTree, NodeId};

    struct Quiet;
    impl Component for Quiet {}

    struct Loud;
    impl Loud {
        fn hear(&self, _: &PublishEvent, _: &[Value]) -> HandlerResult {
            Ok(().into())
        }
    }
    impl Component for Loud {
        fn subscriptions(&self) -> Subscriptions<Self> {
            Subscriptions::new().on("ping", Self::hear)
        }
    }

    fn setup() -> (ArenaTree, Marker, FilterCache, Tracker<NodeId>) {
        (
            ArenaTree::new(),
            Marker::default(),
            FilterCache::new(8),
            Tracker::new(),
        )
    }

    fn bind<C: Component>(
        tracker: &Tracker<NodeId>,
        tree: &mut ArenaTree,
        marker: &Marker,
        filters: &FilterCache,
        instance: &Arc<C>,
        node: NodeId,
    ) -> Result<bool, DispatchError> {
        tracker.attach(tree, marker, filters, instance, instance.subscriptions(), node)
    }

    #[test]
    fn test_attach_marks_subscribers_only() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        let b = tree.append_child(tree.root()).unwrap();

        let loud = Arc::new(Loud);
        let quiet = Arc::new(Quiet);
        assert!(bind(&tracker, &mut tree, &marker, &filters, &loud, a).unwrap());
        assert!(!bind(&tracker, &mut tree, &marker, &filters, &quiet, b).unwrap());

        assert!(tree.has_marker(a, &marker));
        assert!(!tree.has_marker(b, &marker));
        assert!(tracker.is_bound(a));
        assert!(!tracker.is_bound(b));
        assert_eq!(tracker.bound_count(), 1);
        assert_eq!(tracker.attached_count(), 2);
        assert_eq!(tracker.node_of(&quiet), Some(b));
    }

    #[test]
    fn test_detach_clears_marker_and_backref() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        let loud = Arc::new(Loud);
        bind(&tracker, &mut tree, &marker, &filters, &loud, a).unwrap();

        assert!(tracker.detach(&mut tree, &marker, a));
        assert!(!tree.has_marker(a, &marker));
        assert!(tracker.binding(a).is_none());
        assert_eq!(tracker.node_of(&loud), None);
        assert!(!tracker.detach(&mut tree, &marker, a));
    }

    #[test]
    fn test_reattach_to_new_node_unmarks_old() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        let b = tree.append_child(tree.root()).unwrap();
        let loud = Arc::new(Loud);

        bind(&tracker, &mut tree, &marker, &filters, &loud, a).unwrap();
        bind(&tracker, &mut tree, &marker, &filters, &loud, b).unwrap();

        assert!(!tree.has_marker(a, &marker));
        assert!(tree.has_marker(b, &marker));
        assert_eq!(tracker.node_of(&loud), Some(b));
        assert_eq!(tracker.attached_count(), 1);
    }

    #[test]
    fn test_binding_goes_dead_with_instance() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        let loud = Arc::new(Loud);
        bind(&tracker, &mut tree, &marker, &filters, &loud, a).unwrap();

        let binding = tracker.binding(a).unwrap();
        assert!(binding.is_alive());
        drop(loud);
        assert!(!binding.is_alive());

        let event = PublishEvent::new("ping", Vec::new(), false);
        assert!((binding.entries()[0].handler)(&event, &[]).is_none());
    }

    #[test]
    fn test_unknown_node() {
        let (mut tree, marker, filters, tracker) = setup();
        let missing = {
            let mut other = ArenaTree::new();
            (0..5).map(|_| other.create_node()).last().unwrap()
        };
        assert!(matches!(
            bind(&tracker, &mut tree, &marker, &filters, &Arc::new(Loud), missing),
            Err(DispatchError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_remark() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        bind(&tracker, &mut tree, &marker, &filters, &Arc::new(Loud), a).unwrap();

        let next = Marker::new("listening").unwrap();
        tracker.remark(&mut tree, &marker, &next);
        assert!(!tree.has_marker(a, &marker));
        assert!(tree.has_marker(a, &next));
    }

    #[test]
    fn test_dropped_instance_identity_not_inherited() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();

        let quiet = Arc::new(Quiet);
        bind(&tracker, &mut tree, &marker, &filters, &quiet, a).unwrap();
        drop(quiet);

        for _ in 0..64 {
            let fresh = Arc::new(Quiet);
            assert_eq!(tracker.node_of(&fresh), None);
        }
    }

    #[test]
    fn test_prune_releases_dropped_instances() {
        let (mut tree, marker, filters, tracker) = setup();
        let a = tree.append_child(tree.root()).unwrap();
        let b = tree.append_child(tree.root()).unwrap();
        let c = tree.append_child(tree.root()).unwrap();

        let quiet = Arc::new(Quiet);
        let loud = Arc::new(Loud);
        bind(&tracker, &mut tree, &marker, &filters, &quiet, a).unwrap();
        bind(&tracker, &mut tree, &marker, &filters, &loud, b).unwrap();
        drop(quiet);
        drop(loud);
        assert_eq!(tracker.attached_count(), 2);

        let kept = Arc::new(Loud);
        bind(&tracker, &mut tree, &marker, &filters, &kept, c).unwrap();
        assert_eq!(tracker.attached_count(), 1);
        assert!(!tracker.is_bound(b));
        assert!(!tree.has_marker(b, &marker));
        assert_eq!(tracker.node_of(&kept), Some(c));
        assert_eq!(tracker.prune(&mut tree, &marker), 0);
    }
}
