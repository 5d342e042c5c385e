//! Tree collaborator.
//!
//! Dispatch never owns the component tree. It reads it through [`Tree`]:
//! marker tagging, marker queries and subtree containment. [`ArenaTree`] is
//! the bundled in-memory implementation.

use crate::marker::Marker;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use thiserror::Error;
use tracing::trace;

/// Interface Beacon needs from the host's tree.
pub trait Tree: Send + Sync + 'static {
    /// Node handle.
    type Node: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Check if the node id is known to the tree (connected or not).
    fn has_node(&self, node: Self::Node) -> bool;

    /// Check if `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: Self::Node, node: Self::Node) -> bool;

    /// Check if the node is reachable from the root.
    fn is_connected(&self, node: Self::Node) -> bool;

    /// Tag a node. Returns `true` if the marker was newly added.
    fn add_marker(&mut self, node: Self::Node, marker: &Marker) -> bool;

    /// Untag a node. Returns `true` if the marker was present.
    fn remove_marker(&mut self, node: Self::Node, marker: &Marker) -> bool;

    /// Check if a node carries a marker.
    fn has_marker(&self, node: Self::Node, marker: &Marker) -> bool;

    /// All connected nodes in document order.
    fn nodes(&self) -> Vec<Self::Node>;

    /// Connected nodes carrying `marker`, served from an index the tree keeps
    /// up to date itself.
    ///
    /// Returns `None` when the tree has no such index.
    fn live_query(&self, _marker: &Marker) -> Option<Box<dyn Iterator<Item = Self::Node> + '_>> {
        None
    }

    /// Counter bumped on every structural or marker mutation.
    ///
    /// Returns `None` when the tree does not track revisions.
    fn revision(&self) -> Option<u64> {
        None
    }
}

/// Node handle for [`ArenaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Tree mutation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Node id unknown to the arena.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Node already has a parent.
    #[error("Node already attached: {0}")]
    AlreadyAttached(NodeId),

    /// Attaching would make a node its own ancestor.
    #[error("Attaching {node} under {parent} would create a cycle")]
    Cycle {
        /// Node being attached.
        node: NodeId,
        /// Intended parent.
        parent: NodeId,
    },

    /// The root cannot be detached or re-parented.
    #[error("The root node cannot be moved")]
    Root,
}

#[derive(Debug, Default)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    markers: HashSet<Marker>,
}

/// In-memory tree with a per-marker live index.
///
/// Detached nodes stay in the arena and can be re-attached. Like a document,
/// marker queries only report nodes connected to the root.
#[derive(Debug)]
pub struct ArenaTree {
    nodes: Vec<NodeData>,
    /// Marker -> tagged nodes. `None` when live queries are disabled.
    live: Option<HashMap<Marker, BTreeSet<NodeId>>>,
    revision: u64,
}

impl ArenaTree {
    /// Create a tree containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::default()],
            live: Some(HashMap::new()),
            revision: 0,
        }
    }

    /// Create a tree without a live marker index.
    ///
    /// Marker queries then fall back to a full document scan.
    #[must_use]
    pub fn without_live_queries() -> Self {
        Self {
            live: None,
            ..Self::new()
        }
    }

    /// Get the root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Total number of nodes in the arena, connected or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the arena only holds the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Create a node without a parent.
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::default());
        id
    }

    /// Create a node and append it under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is unknown.
    pub fn append_child(&mut self, parent: NodeId) -> Result<NodeId, TreeError> {
        self.data(parent)?;
        let id = self.create_node();
        self.attach(id, parent)?;
        Ok(id)
    }

    /// Attach a parentless node as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is unknown, `node` already has a parent
    /// or is the root, or `parent` lies inside `node`'s subtree.
    pub fn attach(&mut self, node: NodeId, parent: NodeId) -> Result<(), TreeError> {
        self.data(parent)?;
        if node == self.root() {
            return Err(TreeError::Root);
        }
        if self.data(node)?.parent.is_some() {
            return Err(TreeError::AlreadyAttached(node));
        }
        if self.contains(node, parent) {
            return Err(TreeError::Cycle { node, parent });
        }

        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
        self.revision += 1;
        trace!(%node, %parent, "Node attached");
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent.
    ///
    /// Returns `false` if the node had no parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or is the root.
    pub fn detach(&mut self, node: NodeId) -> Result<bool, TreeError> {
        if node == self.root() {
            return Err(TreeError::Root);
        }
        let Some(parent) = self.data(node)?.parent else {
            return Ok(false);
        };

        self.nodes[parent.0].children.retain(|child| *child != node);
        self.nodes[node.0].parent = None;
        self.revision += 1;
        trace!(%node, %parent, "Node detached");
        Ok(true)
    }

    /// Get a node's parent.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|data| data.parent)
    }

    /// Get a node's children in order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|data| data.children.as_slice())
            .unwrap_or_default()
    }

    /// Get `node` and its descendants in document order.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.nodes.get(node.0).is_none() {
            return out;
        }
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    fn data(&self, node: NodeId) -> Result<&NodeData, TreeError> {
        self.nodes.get(node.0).ok_or(TreeError::UnknownNode(node))
    }
}

impl Default for ArenaTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree for ArenaTree {
    type Node = NodeId;

    fn has_node(&self, node: NodeId) -> bool {
        node.0 < self.nodes.len()
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.has_node(ancestor) {
            return false;
        }
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root(), node)
    }

    fn add_marker(&mut self, node: NodeId, marker: &Marker) -> bool {
        let Some(data) = self.nodes.get_mut(node.0) else {
            return false;
        };
        if !data.markers.insert(marker.clone()) {
            return false;
        }
        if let Some(live) = &mut self.live {
            live.entry(marker.clone()).or_default().insert(node);
        }
        self.revision += 1;
        true
    }

    fn remove_marker(&mut self, node: NodeId, marker: &Marker) -> bool {
        let Some(data) = self.nodes.get_mut(node.0) else {
            return false;
        };
        if !data.markers.remove(marker) {
            return false;
        }
        if let Some(set) = self.live.as_mut().and_then(|live| live.get_mut(marker)) {
            set.remove(&node);
        }
        self.revision += 1;
        true
    }

    fn has_marker(&self, node: NodeId, marker: &Marker) -> bool {
        self.nodes
            .get(node.0)
            .is_some_and(|data| data.markers.contains(marker))
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.descendants(self.root())
    }

    fn live_query(&self, marker: &Marker) -> Option<Box<dyn Iterator<Item = NodeId> + '_>> {
        let live = self.live.as_ref()?;
        let iter: Box<dyn Iterator<Item = NodeId> + '_> = match live.get(marker) {
            Some(set) => Box::new(
                set.iter()
                    .copied()
                    .filter(move |node| self.is_connected(*node)),
            ),
            None => Box::new(std::iter::empty()),
        };
        Some(iter)
    }

    fn revision(&self) -> Option<u64> {
        Some(self.revision)
    }
}
