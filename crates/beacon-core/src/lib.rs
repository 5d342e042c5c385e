//! # beacon-core
//!
//! Publish/subscribe dispatch for a tree of UI component instances.
//!
//! Components declare interest in channels through filter strings; a
//! publisher emits a channel with arguments; the dispatcher finds every live,
//! interested component in the current tree, optionally limited to one
//! component's subtree, invokes its handlers and joins their results.
//!
//! - **Tracker** - Keeps the subscriber marker on tree nodes in sync with attached components
//! - **SubscriberIndex** - Snapshot of marked nodes at publish time
//! - **Dispatcher** - Filter matching, scope containment, handler invocation
//! - **AllCompletions** - Joins plain and deferred handler results
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ attach ┌─────────────┐ marker ┌─────────────┐
//! │  Component  │───────▶│   Tracker   │───────▶│    Tree     │
//! └─────────────┘        └─────────────┘        └─────────────┘
//!                                                      │
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  Publisher  │───────▶│ Dispatcher  │◀───────│    Index    │
//! └─────────────┘        └─────────────┘        └─────────────┘
//!                               │
//!                               ▼
//!                       ┌──────────────┐
//!                       │AllCompletions│
//!                       └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tenvis_beacon_core::{
//!     args, ArenaTree, Component, Dispatcher, HandlerResult, PublishEvent, Subscriptions, Value,
//! };
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn on_hello(&self, _event: &PublishEvent, args: &[Value]) -> HandlerResult {
//!         Ok(Value::from(format!("hello, {}", args[0].as_str().unwrap_or("?"))).into())
//!     }
//! }
//!
//! impl Component for Greeter {
//!     fn subscriptions(&self) -> Subscriptions<Self> {
//!         Subscriptions::new().on("hello(string)", Self::on_hello)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(ArenaTree::new());
//! let node = dispatcher.with_tree_mut(|tree| tree.append_child(tree.root()))?;
//!
//! let greeter = Arc::new(Greeter);
//! dispatcher.attach(&greeter, node)?;
//!
//! let replies = dispatcher.publish("hello", args!["world"])?.await?;
//! assert_eq!(replies, vec![Value::from("hello, world")]);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod completion;
pub mod component;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod index;
pub mod listeners;
pub mod marker;
pub mod metrics;
pub mod tracker;
pub mod tree;

pub use beacon_filter::{args, Callable, ChannelFilter, TypeTag, Value, WILDCARD};
pub use cache::FilterCache;
pub use completion::{AllCompletions, CompletionUnit, Deferred, Reply, Resolver};
pub use component::{Component, HandlerResult, Method, Subscriptions};
pub use config::DispatchConfig;
pub use dispatcher::{DispatchStats, Dispatcher, ScopedPublisher};
pub use error::{CompletionError, ConfigurationError, DispatchError, HandlerError};
pub use event::{PublishEvent, Scope};
pub use index::SubscriberIndex;
pub use listeners::{Listener, ListenerId, Listeners};
pub use marker::{Marker, DEFAULT_MARKER};
pub use tracker::{LifecycleHook, Tracker};
pub use tree::{ArenaTree, NodeId, Tree, TreeError};
