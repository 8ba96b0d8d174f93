#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` is a set of nodes of one parsed document, identified by
//! their `NodeId`. It carries the document subsets that same-document
//! references select and that the enveloped-signature transform narrows.

use std::collections::HashSet;

use roxmltree::{Document, Node, NodeId};

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes in the document, comments included (`#xpointer(/)`).
    pub fn all(doc: &Document<'_>) -> Self {
        Self::tree_with_comments(doc.root())
    }

    /// All nodes except comments. `URI=""` selects this.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self::tree_without_comments(doc.root())
    }

    /// The subtree rooted at `root`, without comments (`#id`).
    pub fn tree_without_comments(root: Node<'_, '_>) -> Self {
        Self {
            nodes: root
                .descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id().get_usize())
                .collect(),
        }
    }

    /// The subtree rooted at `root`, comments included.
    pub fn tree_with_comments(root: Node<'_, '_>) -> Self {
        Self {
            nodes: root.descendants().map(|n| n.id().get_usize()).collect(),
        }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: Node<'_, '_>) -> bool {
        self.contains_id(node.id())
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.contains(&id.get_usize())
    }

    /// Add a node to this set.
    pub fn insert(&mut self, node: Node<'_, '_>) {
        self.nodes.insert(node.id().get_usize());
    }

    /// Remove a node from this set.
    pub fn remove(&mut self, node: Node<'_, '_>) {
        self.nodes.remove(&node.id().get_usize());
    }

    /// Remove `root` and every node below it.
    pub fn remove_subtree(&mut self, root: Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&n.id().get_usize());
        }
    }

    /// Keep only comment-free nodes.
    pub fn without_comments(mut self, doc: &Document<'_>) -> Self {
        self.nodes.retain(|&idx| {
            doc.get_node(NodeId::from(idx))
                .is_some_and(|n| !n.is_comment())
        });
        self
    }

    /// Compute the intersection of two node sets.
    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    /// Compute self - other.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    /// Check if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
