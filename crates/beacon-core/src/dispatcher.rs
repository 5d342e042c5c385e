//! Publish/subscribe dispatch over a component tree.
//!
//! The dispatcher owns the tree handle, the filter cache, the membership
//! tracker and the subscriber index. It is cheap to clone: handlers capture a
//! clone to publish again or attach and detach components mid-dispatch.
//!
//! ## Publish
//!
//! ```text
//! publish ──► SubscriberIndex snapshot ──► filter + scope ──► targets
//!                                                               │
//!   AllCompletions ◄── CompletionUnit ◄── handler(event, args) ◄┘
//! ```
//!
//! The target set is fixed before the first handler runs. No tree lock is
//! held while handlers execute.

use crate::cache::FilterCache;
use crate::completion::{AllCompletions, CompletionUnit};
use crate::component::Component;
use crate::config::DispatchConfig;
use crate::error::{ConfigurationError, DispatchError};
use crate::event::{PublishEvent, Scope};
use crate::index::SubscriberIndex;
use crate::listeners::{ListenerId, Listeners};
use crate::marker::Marker;
use crate::metrics;
use crate::tracker::{BoundHandler, LifecycleHook, Tracker};
use crate::tree::Tree;
use beacon_filter::{ChannelFilter, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

struct Inner<T: Tree> {
    tree: RwLock<T>,
    marker: RwLock<Marker>,
    filters: FilterCache,
    tracker: Tracker<T::Node>,
    index: SubscriberIndex<T::Node>,
    listeners: Listeners,
    config: DispatchConfig,
}

/// The dispatch context.
///
/// Independent dispatchers share nothing; each has its own marker, cache and
/// tree.
pub struct Dispatcher<T: Tree> {
    inner: Arc<Inner<T>>,
}

impl<T: Tree> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Tree> Dispatcher<T> {
    /// Create a dispatcher with default configuration.
    #[must_use]
    pub fn new(tree: T) -> Self {
        Self::build(tree, Marker::default(), DispatchConfig::default())
    }

    /// Create a dispatcher with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured marker is invalid.
    pub fn with_config(tree: T, config: DispatchConfig) -> Result<Self, ConfigurationError> {
        let marker = Marker::new(&config.marker)?;
        Ok(Self::build(tree, marker, config))
    }

    fn build(tree: T, marker: Marker, config: DispatchConfig) -> Self {
        info!("Creating dispatcher with config: {:?}", config);
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(tree),
                marker: RwLock::new(marker),
                filters: FilterCache::new(config.filter_cache_capacity),
                tracker: Tracker::new(),
                index: SubscriberIndex::new(config.live_queries),
                listeners: Listeners::new(),
                config,
            }),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Read the tree.
    ///
    /// The tree is locked for the duration of `f`; do not publish from it.
    pub fn with_tree<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.tree.read())
    }

    /// Mutate the tree.
    ///
    /// The tree is locked for the duration of `f`; do not publish from it.
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.inner.tree.write())
    }

    /// Get the current tracking marker.
    #[must_use]
    pub fn tracking_marker(&self) -> Marker {
        self.inner.marker.read().clone()
    }

    /// Change the tracking marker.
    ///
    /// Nodes already marked are moved to the new marker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidMarker`] if `name` is invalid.
    pub fn set_tracking_marker(&self, name: &str) -> Result<(), ConfigurationError> {
        let next = Marker::new(name)?;
        let mut marker = self.inner.marker.write();
        if *marker == next {
            return Ok(());
        }

        let mut tree = self.inner.tree.write();
        self.inner.tracker.remark(&mut *tree, &marker, &next);
        self.inner.index.invalidate();
        info!(from = %*marker, to = %next, "Tracking marker changed");
        *marker = next;
        Ok(())
    }

    /// Attach `instance` to `node`.
    ///
    /// Marks the node as a subscriber when the instance declares subscriptions
    /// and clears the mark otherwise. Attaching an instance already attached
    /// elsewhere detaches it from its previous node first.
    ///
    /// Returns `true` if the node is now a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownNode`] if the tree does not know `node`.
    pub fn attach<C: Component>(
        &self,
        instance: &Arc<C>,
        node: T::Node,
    ) -> Result<bool, DispatchError> {
        // Read before locking: `subscriptions` may consult the dispatcher.
        let subscriptions = instance.subscriptions();
        let marker = self.inner.marker.read();
        let mut tree = self.inner.tree.write();
        self.inner.tracker.attach(
            &mut *tree,
            &marker,
            &self.inner.filters,
            instance,
            subscriptions,
            node,
        )
    }

    /// Re-read an attached instance's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotAttached`] if the instance is not attached.
    pub fn refresh<C: Component>(&self, instance: &Arc<C>) -> Result<bool, DispatchError> {
        let node = self.instance_node(instance).ok_or(DispatchError::NotAttached)?;
        self.attach(instance, node)
    }

    /// Detach whatever component is attached to `node`.
    ///
    /// Returns `true` if a component was attached.
    pub fn detach(&self, node: T::Node) -> bool {
        let marker = self.inner.marker.read();
        let mut tree = self.inner.tree.write();
        self.inner.tracker.detach(&mut *tree, &marker, node)
    }

    /// Get the node an instance is attached to.
    #[must_use]
    pub fn instance_node<C>(&self, instance: &Arc<C>) -> Option<T::Node> {
        self.inner.tracker.node_of(instance)
    }

    /// Get the current subscriber nodes.
    #[must_use]
    pub fn subscriber_nodes(&self) -> Vec<T::Node> {
        let marker = self.tracking_marker();
        let tree = self.inner.tree.read();
        self.inner.index.snapshot(&*tree, &marker)
    }

    /// Get the parsed filter for a filter string, from the cache.
    pub fn filter(&self, raw: &str) -> Arc<ChannelFilter> {
        self.inner.filters.resolve(raw)
    }

    /// Listen for global publishes on `channel` outside the component tree.
    pub fn on<F>(&self, channel: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&PublishEvent, &[Value]) + Send + Sync + 'static,
    {
        self.inner.listeners.on(channel, Arc::new(listener))
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.listeners.off(id)
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner.listeners.count(channel)
    }

    /// Publish to every subscriber in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] if a handler fails synchronously.
    /// Handlers after the failing one are not invoked.
    pub fn publish(
        &self,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<AllCompletions, DispatchError> {
        self.publish_scoped(Scope::Global, channel, args)
    }

    /// Publish to subscribers at or below `node`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownNode`] if `node` is unknown, or
    /// [`DispatchError::Handler`] if a handler fails synchronously.
    pub fn publish_within(
        &self,
        node: T::Node,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<AllCompletions, DispatchError> {
        self.publish_scoped(Scope::Subtree(node), channel, args)
    }

    /// Publish from a component: scoped to the subtree of its node.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotAttached`] if the instance is not attached,
    /// or [`DispatchError::Handler`] if a handler fails synchronously.
    pub fn publish_from<C>(
        &self,
        instance: &Arc<C>,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<AllCompletions, DispatchError> {
        let node = self.instance_node(instance).ok_or(DispatchError::NotAttached)?;
        self.publish_scoped(Scope::Subtree(node), channel, args)
    }

    /// Get a publisher scoped to `node`.
    #[must_use]
    pub fn scoped(&self, node: T::Node) -> ScopedPublisher<T> {
        ScopedPublisher {
            dispatcher: self.clone(),
            node,
        }
    }

    /// Publish with an explicit scope.
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish) and [`publish_within`](Self::publish_within).
    pub fn publish_scoped(
        &self,
        scope: Scope<T::Node>,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<AllCompletions, DispatchError> {
        let targets = self.collect_targets(scope, channel, &args)?;
        // Listeners registered by a handler only hear later publishes.
        let listeners = if scope.is_global() && self.inner.config.notify_listeners {
            self.inner.listeners.snapshot(channel)
        } else {
            Vec::new()
        };
        let event = PublishEvent::new(channel, args, !scope.is_global());

        let mut units = Vec::with_capacity(targets.len());
        for handler in &targets {
            match handler(&event, &event.args) {
                Some(Ok(reply)) => units.push(CompletionUnit::from_reply(reply)),
                Some(Err(source)) => {
                    debug!(channel = %channel, error = %source, "Handler failed, aborting publish");
                    return Err(DispatchError::Handler {
                        channel: channel.to_string(),
                        source,
                    });
                }
                None => trace!(channel = %channel, "Instance dropped before invocation"),
            }
        }

        for listener in &listeners {
            listener(&event, &event.args);
        }

        metrics::record_publish(!scope.is_global(), units.len());
        debug!(
            channel = %channel,
            scope = ?scope,
            handlers = units.len(),
            listeners = listeners.len(),
            "Published"
        );
        Ok(AllCompletions::new(units))
    }

    /// Resolve the handlers a publish reaches, before any of them runs.
    fn collect_targets(
        &self,
        scope: Scope<T::Node>,
        channel: &str,
        args: &[Value],
    ) -> Result<Vec<BoundHandler>, DispatchError> {
        let marker = self.tracking_marker();
        let tree = self.inner.tree.read();

        if let Scope::Subtree(root) = scope {
            if !tree.has_node(root) {
                return Err(DispatchError::UnknownNode(format!("{root:?}")));
            }
        }

        let mut targets = Vec::new();
        for node in self.inner.index.snapshot(&*tree, &marker) {
            let Some(binding) = self.inner.tracker.binding(node) else {
                trace!(node = ?node, "Marked node without a binding");
                continue;
            };
            if !binding.is_alive() {
                warn!(node = ?node, "Skipping subscriber whose component was dropped");
                continue;
            }
            if let Scope::Subtree(root) = scope {
                if !tree.contains(root, node) {
                    continue;
                }
            }
            for entry in binding.entries() {
                if entry.filter.matches(channel, args) {
                    trace!(node = ?node, filter = %entry.filter, "Subscriber matched");
                    targets.push(Arc::clone(&entry.handler));
                }
            }
        }
        Ok(targets)
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            attached: self.inner.tracker.attached_count(),
            subscribers: self.inner.tracker.bound_count(),
            connected_subscribers: self.subscriber_nodes().len(),
            cached_filters: self.inner.filters.len(),
            listeners: self.inner.listeners.len(),
        }
    }
}

impl<T: Tree> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("marker", &*self.inner.marker.read())
            .field("tracker", &self.inner.tracker)
            .field("listeners", &self.inner.listeners)
            .finish_non_exhaustive()
    }
}

impl<T: Tree, C: Component> LifecycleHook<C, T::Node> for Dispatcher<T> {
    fn on_attach(&self, instance: &Arc<C>, node: T::Node) -> Result<(), DispatchError> {
        self.attach(instance, node).map(|_| ())
    }

    fn on_detach(&self, _instance: &Arc<C>, node: T::Node) {
        self.detach(node);
    }
}

/// A publisher bound to one node's subtree.
///
/// The instance-method form of publish: a component holding one publishes to
/// itself and its descendants.
pub struct ScopedPublisher<T: Tree> {
    dispatcher: Dispatcher<T>,
    node: T::Node,
}

impl<T: Tree> ScopedPublisher<T> {
    /// The scope root.
    #[must_use]
    pub fn node(&self) -> T::Node {
        self.node
    }

    /// Publish within the scope.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::publish_within`].
    pub fn publish(
        &self,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<AllCompletions, DispatchError> {
        self.dispatcher.publish_within(self.node, channel, args)
    }
}

impl<T: Tree> Clone for ScopedPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            node: self.node,
        }
    }
}

impl<T: Tree> fmt::Debug for ScopedPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedPublisher")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// Dispatcher statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Attached component instances.
    pub attached: usize,
    /// Nodes bound to a subscribing component.
    pub subscribers: usize,
    /// Subscriber nodes currently connected to the tree.
    pub connected_subscribers: usize,
    /// Parsed filters in the cache.
    pub cached_filters: usize,
    /// Direct listeners.
    pub listeners: usize,
}
