//! The ratchet tree.
//!
//! A [`RatchetTree`] is an immutable snapshot: a flat array of optional
//! [`Node`] slots (`None` is blank) addressed by [`NodeIndex`]. Every
//! structural question is answered by [`math`]; hashing lives in [`hash`]
//! and validation in [`check`]. Committer-side edits return a new tree.
//!
//! The leaf count is always a power of two. Adding a member into a full
//! tree doubles it; removing members truncates the right half of the root
//! while that half is entirely blank. Keeping the shape full means a node's
//! subtree never changes shape while the node exists, which parent hashes
//! depend on.
//!
//! On the wire the tree is `optional<Node> nodes<V>` with trailing blank
//! slots dropped; decoding pads it back to full width.

pub mod check;
pub mod hash;
pub mod math;
pub mod node;

use canopy_codec::{varint, Codec, CodecError, Cursor};
use canopy_crypto::{CipherSuiteProvider, HpkePublicKey};

use crate::error::TreeError;

/// Largest leaf count whose node width still fits a `u32` index.
pub const MAX_LEAVES: u32 = 1 << 31;

pub use check::{check, LeafNodeValidator, SignatureLeafValidator};
pub use math::{LeafIndex, NodeIndex};
pub use node::{
    Capabilities, Credential, CredentialType, LeafNode, LeafNodeSource, Node, NodeType, ParentNode,
};

/// A snapshot of the ratchet tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatchetTree {
    nodes: Vec<Option<Node>>,
}

impl RatchetTree {
    /// A one-member tree.
    pub fn new(founder: LeafNode) -> Self {
        Self {
            nodes: vec![Some(Node::Leaf(founder))],
        }
    }

    /// Build a tree from raw slots, checking their shape.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidShape`] if the slot count is not `2L - 1`
    /// for a power of two `L`, or a leaf and parent sit in each other's slots.
    pub fn from_nodes(nodes: Vec<Option<Node>>) -> Result<Self, TreeError> {
        let width = u32::try_from(nodes.len())
            .map_err(|_| TreeError::InvalidShape(format!("{} slots", nodes.len())))?;
        let leaves = width / 2 + 1;
        if width % 2 == 0 || !leaves.is_power_of_two() {
            return Err(TreeError::InvalidShape(format!(
                "{width} slots is not a full tree"
            )));
        }
        for (i, slot) in nodes.iter().enumerate() {
            let misplaced = match slot {
                Some(Node::Leaf(_)) => i % 2 == 1,
                Some(Node::Parent(_)) => i % 2 == 0,
                None => false,
            };
            if misplaced {
                return Err(TreeError::InvalidShape(format!("misplaced node at {i}")));
            }
        }
        Ok(Self { nodes })
    }

    /// Number of node slots.
    pub fn width(&self) -> u32 {
        // Every constructor bounds the slot count by `node_width(MAX_LEAVES)`.
        u32::try_from(self.nodes.len()).unwrap_or(u32::MAX)
    }

    /// Slots paired with their node index.
    fn slots(&self) -> impl Iterator<Item = (NodeIndex, &Option<Node>)> + '_ {
        (0..self.width()).map(NodeIndex).zip(&self.nodes)
    }

    /// Number of leaf slots, blank or not.
    pub fn leaf_count(&self) -> u32 {
        self.width() / 2 + 1
    }

    pub fn root(&self) -> NodeIndex {
        math::root(self.width())
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Whether the slot is blank. Slots outside the tree count as blank.
    pub fn is_blank(&self, index: NodeIndex) -> bool {
        self.node(index).is_none()
    }

    pub fn leaf_node(&self, leaf: LeafIndex) -> Option<&LeafNode> {
        self.node(leaf.node_index()).and_then(Node::as_leaf)
    }

    pub fn parent_node(&self, index: NodeIndex) -> Option<&ParentNode> {
        self.node(index).and_then(Node::as_parent)
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        index.parent(self.width())
    }

    pub fn left_child(&self, index: NodeIndex) -> Option<NodeIndex> {
        index.left()
    }

    pub fn right_child(&self, index: NodeIndex) -> Option<NodeIndex> {
        index.right(self.width())
    }

    pub fn sibling(&self, index: NodeIndex) -> Option<NodeIndex> {
        index.sibling(self.width())
    }

    pub fn is_in_subtree_of(&self, index: NodeIndex, ancestor: NodeIndex) -> bool {
        index.is_in_subtree_of(ancestor)
    }

    /// Ancestors of `leaf` from its parent up to the root.
    pub fn direct_path(&self, leaf: LeafIndex) -> Vec<NodeIndex> {
        leaf.node_index().direct_path(self.width())
    }

    /// Non-blank leaves in index order.
    pub fn non_blank_leaves(&self) -> impl Iterator<Item = (LeafIndex, &LeafNode)> + '_ {
        self.slots().filter_map(|(index, slot)| match slot {
            Some(Node::Leaf(leaf)) => Some((LeafIndex(index.0 / 2), leaf)),
            _ => None,
        })
    }

    /// Non-blank parents in index order.
    pub fn non_blank_parents(&self) -> impl Iterator<Item = (NodeIndex, &ParentNode)> + '_ {
        self.slots().filter_map(|(index, slot)| match slot {
            Some(Node::Parent(parent)) => Some((index, parent)),
            _ => None,
        })
    }

    /// Every non-blank slot in index order.
    pub fn non_blank_nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.slots()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (index, node)))
    }

    /// Number of non-blank leaves.
    pub fn member_count(&self) -> usize {
        self.non_blank_leaves().count()
    }

    fn set(&mut self, index: NodeIndex, node: Option<Node>) {
        if let Some(slot) = self.nodes.get_mut(index.0 as usize) {
            *slot = node;
        }
    }

    fn check_leaf(&self, leaf: LeafIndex) -> Result<(), TreeError> {
        if leaf.0 >= self.leaf_count() {
            return Err(TreeError::LeafOutOfRange {
                leaf,
                leaf_count: self.leaf_count(),
            });
        }
        Ok(())
    }

    /// Place `leaf` in the leftmost blank leaf slot, doubling the tree if
    /// none is free.
    ///
    /// The new leaf is recorded as unmerged in every non-blank ancestor.
    /// Returns the new tree and the index the leaf landed at.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TooManyLeaves`] if the tree is full and already
    /// holds [`MAX_LEAVES`] leaf slots.
    pub fn add_leaf(&self, leaf: LeafNode) -> Result<(Self, LeafIndex), TreeError> {
        let mut tree = self.clone();
        let free = (0..tree.leaf_count())
            .map(LeafIndex)
            .find(|l| tree.is_blank(l.node_index()));
        let index = match free {
            Some(index) => index,
            None => {
                let leaves = doubled_leaf_count(tree.leaf_count())?;
                let index = LeafIndex(tree.leaf_count());
                tree.nodes.resize(math::node_width(leaves) as usize, None);
                index
            }
        };

        tree.set(index.node_index(), Some(Node::Leaf(leaf)));
        for ancestor in tree.direct_path(index) {
            if let Some(Some(Node::Parent(parent))) = tree.nodes.get_mut(ancestor.0 as usize) {
                if let Err(pos) = parent.unmerged_leaves.binary_search(&index) {
                    parent.unmerged_leaves.insert(pos, index);
                }
            }
        }

        tracing::debug!(leaf = index.0, width = tree.width(), "added leaf to ratchet tree");
        Ok((tree, index))
    }

    /// Blank `leaf` and its direct path, then truncate blank right halves.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::LeafOutOfRange`] or [`TreeError::BlankLeaf`] if
    /// there is no member at `leaf`.
    pub fn remove_leaf(&self, leaf: LeafIndex) -> Result<Self, TreeError> {
        self.check_leaf(leaf)?;
        if self.is_blank(leaf.node_index()) {
            return Err(TreeError::BlankLeaf(leaf));
        }

        let mut tree = self.clone();
        tree.set(leaf.node_index(), None);
        for ancestor in tree.direct_path(leaf) {
            tree.set(ancestor, None);
        }
        tree.truncate();

        tracing::debug!(leaf = leaf.0, width = tree.width(), "removed leaf from ratchet tree");
        Ok(tree)
    }

    fn truncate(&mut self) {
        while self.leaf_count() > 1 {
            let half = math::node_width(self.leaf_count() / 2) as usize;
            if self.nodes[half + 1..].iter().any(Option::is_some) {
                break;
            }
            self.nodes.truncate(half);
        }
    }

    /// Replace the leaf at `leaf` with `node`.
    pub fn with_leaf(&self, leaf: LeafIndex, node: LeafNode) -> Result<Self, TreeError> {
        self.check_leaf(leaf)?;
        let mut tree = self.clone();
        tree.set(leaf.node_index(), Some(Node::Leaf(node)));
        Ok(tree)
    }

    /// Install fresh parent nodes along the direct path of `sender`.
    ///
    /// `path_keys` holds one encryption key per direct-path node, lowest
    /// first. Parent hashes are chained top-down, so each installed node
    /// carries the parent hash of the node above it as seen from `sender`.
    /// Installed nodes have no unmerged leaves.
    ///
    /// Returns the new tree and the parent hash the sender's replacement
    /// leaf must carry; the caller signs that leaf and installs it with
    /// [`with_leaf`](Self::with_leaf).
    pub fn apply_update_path<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        sender: LeafIndex,
        path_keys: &[HpkePublicKey],
    ) -> Result<(Self, Vec<u8>), TreeError> {
        self.check_leaf(sender)?;
        let path = self.direct_path(sender);
        if path.len() != path_keys.len() {
            return Err(TreeError::PathLength {
                expected: path.len(),
                actual: path_keys.len(),
            });
        }

        let mut tree = self.clone();
        for (index, key) in path.iter().zip(path_keys) {
            tree.set(*index, Some(Node::Parent(ParentNode::new(key.clone()))));
        }

        // Root keeps an empty parent hash; walk down assigning each node the
        // hash of the one above it.
        let mut above_hash = Vec::new();
        for index in path.iter().rev() {
            if let Some(Some(Node::Parent(parent))) = tree.nodes.get_mut(index.0 as usize) {
                parent.parent_hash = above_hash;
            }
            above_hash = tree.parent_hash(cs, *index, sender)?;
        }

        tracing::debug!(
            sender = sender.0,
            path_len = path.len(),
            parent_hash = hex::encode(&above_hash),
            "applied update path"
        );
        Ok((tree, above_hash))
    }
}

/// Leaf count after doubling a full tree of `leaf_count` leaves.
fn doubled_leaf_count(leaf_count: u32) -> Result<u32, TreeError> {
    leaf_count
        .checked_mul(2)
        .filter(|leaves| *leaves <= MAX_LEAVES)
        .ok_or(TreeError::TooManyLeaves(leaf_count))
}

impl Codec for RatchetTree {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        let end = self
            .nodes
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);
        let mut body = Vec::new();
        for slot in &self.nodes[..end] {
            slot.encode(&mut body)?;
        }
        varint::write(buf, body.len())?;
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        let mut nodes: Vec<Option<Node>> = Vec::decode(cursor)?;
        if !matches!(nodes.last(), Some(Some(_))) {
            return Err(CodecError::InvalidValue {
                type_name: "ratchet tree trailing slot",
                value: nodes.len() as u64,
            });
        }
        let leaves = u32::try_from(nodes.len() / 2 + 1)
            .ok()
            .and_then(u32::checked_next_power_of_two)
            .filter(|leaves| *leaves <= MAX_LEAVES)
            .ok_or(CodecError::InvalidValue {
                type_name: "ratchet tree width",
                value: nodes.len() as u64,
            })?;
        nodes.resize(math::node_width(leaves) as usize, None);
        Self::from_nodes(nodes).map_err(|_| CodecError::InvalidValue {
            type_name: "ratchet tree shape",
            value: u64::from(leaves),
        })
    }
}
