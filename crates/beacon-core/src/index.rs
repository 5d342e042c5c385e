//! Subscriber index.
//!
//! Answers "which nodes currently carry the tracking marker" at publish time.
//! Every answer is an owned snapshot, so handlers that attach or detach
//! components cannot disturb an in-flight dispatch.

use crate::marker::Marker;
use crate::tree::Tree;
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug)]
struct Scan<N> {
    marker: Marker,
    revision: u64,
    nodes: Vec<N>,
}

/// Snapshot source for marked nodes.
///
/// Prefers the tree's live query. Without one, falls back to a full document
/// scan, reused while the tree's revision and the marker are unchanged.
#[derive(Debug)]
pub struct SubscriberIndex<N> {
    live_queries: bool,
    last_scan: Mutex<Option<Scan<N>>>,
}

impl<N: Copy> SubscriberIndex<N> {
    /// Create an index.
    #[must_use]
    pub fn new(live_queries: bool) -> Self {
        Self {
            live_queries,
            last_scan: Mutex::new(None),
        }
    }

    /// Get the marked, connected nodes as an owned snapshot.
    pub fn snapshot<T>(&self, tree: &T, marker: &Marker) -> Vec<N>
    where
        T: Tree<Node = N>,
    {
        if self.live_queries {
            if let Some(live) = tree.live_query(marker) {
                return live.collect();
            }
        }

        let Some(revision) = tree.revision() else {
            return scan(tree, marker);
        };

        let mut last_scan = self.last_scan.lock();
        if let Some(cached) = last_scan
            .as_ref()
            .filter(|cached| cached.revision == revision && cached.marker == *marker)
        {
            return cached.nodes.clone();
        }

        trace!(marker = %marker, revision, "Rescanning tree for subscribers");
        let nodes = scan(tree, marker);
        *last_scan = Some(Scan {
            marker: marker.clone(),
            revision,
            nodes: nodes.clone(),
        });
        nodes
    }

    /// Drop the cached fallback scan.
    pub fn invalidate(&self) {
        *self.last_scan.lock() = None;
    }
}

fn scan<T: Tree>(tree: &T, marker: &Marker) -> Vec<T::Node> {
    tree.nodes()
        .into_iter()
        .filter(|node| tree.has_marker(*node, marker))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ArenaTree, NodeId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A tree that counts full scans and has neither live queries nor revisions
    /// unless asked to.
    struct CountingTree {
        inner: ArenaTree,
        scans: AtomicUsize,
        track_revisions: bool,
    }

    impl Tree for CountingTree {
        type Node = NodeId;

        fn has_node(&self, node: NodeId) -> bool {
            self.inner.has_node(node)
        }
        fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
            self.inner.contains(ancestor, node)
        }
        fn is_connected(&self, node: NodeId) -> bool {
            self.inner.is_connected(node)
        }
        fn add_marker(&mut self, node: NodeId, marker: &Marker) -> bool {
            self.inner.add_marker(node, marker)
        }
        fn remove_marker(&mut self, node: NodeId, marker: &Marker) -> bool {
            self.inner.remove_marker(node, marker)
        }
        fn has_marker(&self, node: NodeId, marker: &Marker) -> bool {
            self.inner.has_marker(node, marker)
        }
        fn nodes(&self) -> Vec<NodeId> {
            self.scans.fetch_add(1, Ordering::Relaxed);
            self.inner.nodes()
        }
        fn revision(&self) -> Option<u64> {
            self.track_revisions.then(|| self.inner.revision().unwrap_or(0))
        }
    }

    fn counting(track_revisions: bool) -> (CountingTree, NodeId, NodeId) {
        let mut inner = ArenaTree::without_live_queries();
        let a = inner.append_child(inner.root()).unwrap();
        let b = inner.append_child(a).unwrap();
        inner.add_marker(b, &Marker::default());
        let tree = CountingTree {
            inner,
            scans: AtomicUsize::new(0),
            track_revisions,
        };
        (tree, a, b)
    }

    #[test]
    fn test_live_snapshot() {
        let mut tree = ArenaTree::new();
        let a = tree.append_child(tree.root()).unwrap();
        tree.add_marker(a, &Marker::default());

        let index = SubscriberIndex::new(true);
        assert_eq!(index.snapshot(&tree, &Marker::default()), vec![a]);

        tree.remove_marker(a, &Marker::default());
        assert!(index.snapshot(&tree, &Marker::default()).is_empty());
    }

    #[test]
    fn test_fallback_scan_is_reused_until_revision_changes() {
        let (mut tree, a, b) = counting(true);
        let index = SubscriberIndex::new(true);
        let marker = Marker::default();

        assert_eq!(index.snapshot(&tree, &marker), vec![b]);
        assert_eq!(index.snapshot(&tree, &marker), vec![b]);
        assert_eq!(tree.scans.load(Ordering::Relaxed), 1);

        tree.add_marker(a, &marker);
        assert_eq!(index.snapshot(&tree, &marker), vec![a, b]);
        assert_eq!(tree.scans.load(Ordering::Relaxed), 2);

        index.invalidate();
        index.snapshot(&tree, &marker);
        assert_eq!(tree.scans.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_fallback_without_revisions_always_scans() {
        let (tree, _, b) = counting(false);
        let index = SubscriberIndex::new(true);

        assert_eq!(index.snapshot(&tree, &Marker::default()), vec![b]);
        assert_eq!(index.snapshot(&tree, &Marker::default()), vec![b]);
        assert_eq!(tree.scans.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_marker_change_invalidates_scan() {
        let (tree, _, b) = counting(true);
        let index = SubscriberIndex::new(true);
        let other = Marker::new("other").unwrap();

        assert_eq!(index.snapshot(&tree, &Marker::default()), vec![b]);
        assert!(index.snapshot(&tree, &other).is_empty());
        assert_eq!(tree.scans.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_live_queries_disabled_uses_scan() {
        let mut tree = ArenaTree::new();
        let root = tree.root();
        let a = tree.append_child(root).unwrap();
        tree.add_marker(a, &Marker::default());
        tree.add_marker(root, &Marker::default());

        // Scan yields document order.
        let index = SubscriberIndex::new(false);
        assert_eq!(index.snapshot(&tree, &Marker::default()), vec![root, a]);
    }
}
