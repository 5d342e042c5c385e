//! Shared fixtures for Beacon benchmarks.

use std::sync::Arc;
use tenvis_beacon_core::{
    ArenaTree, Component, DispatchConfig, Dispatcher, HandlerResult, NodeId, PublishEvent,
    Subscriptions, Value,
};

/// Subscriber that answers with its argument count.
pub struct Counter;

impl Counter {
    fn count(&self, _: &PublishEvent, args: &[Value]) -> HandlerResult {
        Ok(Value::from(args.len()).into())
    }
}

impl Component for Counter {
    fn subscriptions(&self) -> Subscriptions<Self> {
        Subscriptions::new()
            .on("tick", Self::count)
            .on("update(string,number)", Self::count)
            .on("other", Self::count)
    }
}

/// A populated dispatcher and the components keeping its bindings alive.
pub struct Fixture {
    pub dispatcher: Dispatcher<ArenaTree>,
    pub branches: Vec<NodeId>,
    pub components: Vec<Arc<Counter>>,
}

/// Build `branches` subtrees of `per_branch` subscribers each.
///
/// Only every other node gets a component, so half the tree is unmarked.
#[must_use]
pub fn fixture(branches: usize, per_branch: usize, live_queries: bool) -> Fixture {
    let tree = if live_queries {
        ArenaTree::new()
    } else {
        ArenaTree::without_live_queries()
    };
    let config = DispatchConfig {
        live_queries,
        ..DispatchConfig::default()
    };
    let dispatcher = Dispatcher::with_config(tree, config).expect("default marker is valid");

    let mut branch_roots = Vec::with_capacity(branches);
    let mut components = Vec::with_capacity(branches * per_branch);
    for _ in 0..branches {
        let branch = dispatcher
            .with_tree_mut(|tree| tree.append_child(tree.root()))
            .expect("root exists");
        branch_roots.push(branch);

        for _ in 0..per_branch * 2 {
            let node = dispatcher
                .with_tree_mut(|tree| tree.append_child(branch))
                .expect("branch exists");
            if node.index() % 2 == 0 {
                let counter = Arc::new(Counter);
                dispatcher.attach(&counter, node).expect("node exists");
                components.push(counter);
            }
        }
    }

    Fixture {
        dispatcher,
        branches: branch_roots,
        components,
    }
}
