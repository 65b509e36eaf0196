//! Index arithmetic for left-balanced binary trees stored in a flat array.
//!
//! A tree with `L` leaves occupies `2L - 1` slots. Leaves sit at even
//! indices (leaf `i` at node `2i`), parents at odd indices, and the level of
//! a node is the number of trailing one bits in its index. Every relation
//! below is closed-form arithmetic; nothing stores links.
//!
//! ```text
//!                 X
//!         X               X
//!     X       X       X       X
//!   X   X   X   X   X   X   X   X
//!   0 1 2 3 4 5 6 7 8 9 a b c d e
//! ```
//!
//! Functions that need the tree size take `width`, the number of node slots.

use canopy_codec::{Codec, Cursor};
use serde::{Deserialize, Serialize};

/// Position of a slot in the flat node array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

/// Position of a member among the leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafIndex(pub u32);

/// Number of node slots for `leaf_count` leaves.
pub fn node_width(leaf_count: u32) -> u32 {
    if leaf_count == 0 {
        0
    } else {
        2 * (leaf_count - 1) + 1
    }
}

/// Root of a tree with `width` node slots.
pub fn root(width: u32) -> NodeIndex {
    if width == 0 {
        return NodeIndex(0);
    }
    NodeIndex((1u32 << width.ilog2()) - 1)
}

impl NodeIndex {
    /// Height above the leaves: 0 for leaves.
    pub fn level(self) -> u32 {
        self.0.trailing_ones()
    }

    pub fn is_leaf(self) -> bool {
        self.0 % 2 == 0
    }

    /// The leaf this slot holds, if it is a leaf slot.
    pub fn leaf_index(self) -> Option<LeafIndex> {
        self.is_leaf().then_some(LeafIndex(self.0 / 2))
    }

    pub fn left(self) -> Option<NodeIndex> {
        let k = self.level();
        (k > 0).then(|| NodeIndex(self.0 ^ (1 << (k - 1))))
    }

    /// Right child, descending leftwards past slots beyond the tree edge.
    pub fn right(self, width: u32) -> Option<NodeIndex> {
        let k = self.level();
        if k == 0 {
            return None;
        }
        let mut r = NodeIndex(self.0 ^ (3 << (k - 1)));
        while r.0 >= width {
            r = r.left()?;
        }
        Some(r)
    }

    /// Parent in a complete (unbounded) tree.
    fn parent_step(self) -> NodeIndex {
        let k = self.level();
        let b = (self.0 >> (k + 1)) & 1;
        NodeIndex((self.0 | (1 << k)) ^ (b << (k + 1)))
    }

    /// Parent within a tree of `width` slots; `None` for the root.
    pub fn parent(self, width: u32) -> Option<NodeIndex> {
        if self == root(width) || self.0 >= width {
            return None;
        }
        let mut p = self.parent_step();
        while p.0 >= width {
            p = p.parent_step();
        }
        Some(p)
    }

    pub fn sibling(self, width: u32) -> Option<NodeIndex> {
        let p = self.parent(width)?;
        if self < p {
            p.right(width)
        } else {
            p.left()
        }
    }

    /// Whether `self` lies in the subtree rooted at `ancestor` (inclusive).
    pub fn is_in_subtree_of(self, ancestor: NodeIndex) -> bool {
        let span = (1u32 << ancestor.level()) - 1;
        let lo = ancestor.0.saturating_sub(span);
        let hi = ancestor.0.saturating_add(span);
        (lo..=hi).contains(&self.0)
    }

    /// Ancestors from the parent up to and including the root.
    pub fn direct_path(self, width: u32) -> Vec<NodeIndex> {
        let mut path = Vec::new();
        let mut current = self;
        while let Some(p) = current.parent(width) {
            path.push(p);
            current = p;
        }
        path
    }

    /// Lowest node whose subtree contains both `self` and `other`.
    pub fn common_ancestor(self, other: NodeIndex) -> NodeIndex {
        let (lx, ly) = (self.level() + 1, other.level() + 1);
        if lx <= ly && self.0 >> ly == other.0 >> ly {
            return other;
        }
        if ly <= lx && self.0 >> lx == other.0 >> lx {
            return self;
        }
        let (mut xn, mut yn, mut k) = (self.0, other.0, 0u32);
        while xn != yn {
            xn >>= 1;
            yn >>= 1;
            k += 1;
        }
        NodeIndex((xn << k) + (1 << (k - 1)) - 1)
    }
}

impl LeafIndex {
    pub fn node_index(self) -> NodeIndex {
        NodeIndex(self.0 * 2)
    }

    pub fn is_in_subtree_of(self, ancestor: NodeIndex) -> bool {
        self.node_index().is_in_subtree_of(ancestor)
    }
}

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl std::fmt::Display for LeafIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leaf {}", self.0)
    }
}

impl Codec for LeafIndex {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.0.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self(u32::decode(cursor)?))
    }
}
