//! Tree hash and parent hash.
//!
//! ```text
//! struct {
//!     NodeType node_type;
//!     select (node_type) {
//!         case leaf:   uint32 leaf_index; optional<LeafNode> leaf_node;
//!         case parent: optional<ParentNode> parent_node;
//!                      opaque left_hash<V>;
//!                      opaque right_hash<V>;
//!     };
//! } TreeHashInput;
//!
//! struct {
//!     HPKEPublicKey encryption_key;
//!     opaque parent_hash<V>;
//!     opaque original_sibling_tree_hash<V>;
//! } ParentHashInput;
//! ```
//!
//! The original sibling tree hash is the tree hash of the parent's child off
//! the path, computed as if every leaf in the parent's unmerged set were
//! blank and absent from all unmerged sets.

use canopy_codec::{write_opaque, Codec};
use canopy_crypto::CipherSuiteProvider;

use crate::error::TreeError;
use crate::tree::math::{LeafIndex, NodeIndex};
use crate::tree::node::{Node, NodeType, ParentNode};
use crate::tree::RatchetTree;

impl RatchetTree {
    /// Tree hash of the whole tree.
    pub fn tree_hash<C: CipherSuiteProvider>(&self, cs: &C) -> Result<Vec<u8>, TreeError> {
        self.subtree_hash(cs, self.root(), &[])
    }

    /// Tree hash of the subtree at `index`, treating `excluded` leaves as
    /// blank and removing them from unmerged sets.
    pub fn subtree_hash<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        index: NodeIndex,
        excluded: &[LeafIndex],
    ) -> Result<Vec<u8>, TreeError> {
        let mut input = Vec::new();
        match index.leaf_index() {
            Some(leaf_index) => {
                NodeType::Leaf.encode(&mut input)?;
                leaf_index.encode(&mut input)?;
                let leaf = self
                    .leaf_node(leaf_index)
                    .filter(|_| !excluded.contains(&leaf_index));
                match leaf {
                    Some(leaf) => {
                        input.push(1);
                        leaf.encode(&mut input)?;
                    }
                    None => input.push(0),
                }
            }
            None => {
                let left = index.left().ok_or(TreeError::BlankNode(index))?;
                let right = self.right_child(index).ok_or(TreeError::BlankNode(index))?;
                NodeType::Parent.encode(&mut input)?;
                match self.parent_node(index) {
                    Some(parent) if excluded.is_empty() => {
                        input.push(1);
                        parent.encode(&mut input)?;
                    }
                    Some(parent) => {
                        input.push(1);
                        ParentNode {
                            encryption_key: parent.encryption_key.clone(),
                            parent_hash: parent.parent_hash.clone(),
                            unmerged_leaves: parent
                                .unmerged_leaves
                                .iter()
                                .filter(|l| !excluded.contains(l))
                                .copied()
                                .collect(),
                        }
                        .encode(&mut input)?;
                    }
                    None => input.push(0),
                }
                write_opaque(&mut input, &self.subtree_hash(cs, left, excluded)?)?;
                write_opaque(&mut input, &self.subtree_hash(cs, right, excluded)?)?;
            }
        }
        Ok(cs.hash(&input))
    }

    /// Parent hash of `parent` as computed from below by `toward`.
    ///
    /// This is the value the child of `parent` on the path to `toward` (or
    /// the nearest non-blank node below it) stores as its parent hash.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::BlankNode`] if `parent` is blank or a leaf.
    pub fn parent_hash<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        parent: NodeIndex,
        toward: LeafIndex,
    ) -> Result<Vec<u8>, TreeError> {
        let node = self.parent_node(parent).ok_or(TreeError::BlankNode(parent))?;
        let left = parent.left().ok_or(TreeError::BlankNode(parent))?;
        let right = self.right_child(parent).ok_or(TreeError::BlankNode(parent))?;
        let sibling = if toward.is_in_subtree_of(left) { right } else { left };

        let sibling_hash = self.subtree_hash(cs, sibling, &node.unmerged_leaves)?;

        let mut input = Vec::new();
        node.encryption_key.encode(&mut input)?;
        write_opaque(&mut input, &node.parent_hash)?;
        write_opaque(&mut input, &sibling_hash)?;
        Ok(cs.hash(&input))
    }

    /// The stored parent hash of a non-blank node.
    pub(crate) fn stored_parent_hash(&self, index: NodeIndex) -> Option<&[u8]> {
        self.node(index).and_then(Node::parent_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GroupId;
    use crate::tree::tests::{commit, member, tree_of, CS};

    #[test]
    fn test_single_leaf_hash_shape() {
        let leaf = member("a").leaf;
        let tree = RatchetTree::new(leaf.clone());

        let mut input = vec![1, 0, 0, 0, 0, 1];
        leaf.encode(&mut input).expect("encode");
        assert_eq!(
            tree.tree_hash(&CS).expect("hash"),
            CS.hash(&input)
        );
    }

    #[test]
    fn test_tree_hash_depends_on_content() {
        let (tree, _) = tree_of(&["a", "b", "c"]);
        let (other, _) = tree_of(&["a", "b", "c"]);
        assert_ne!(
            tree.tree_hash(&CS).expect("hash"),
            other.tree_hash(&CS).expect("hash")
        );
        assert_eq!(
            tree.tree_hash(&CS).expect("hash"),
            tree.clone().tree_hash(&CS).expect("hash")
        );
    }

    #[test]
    fn test_tree_hash_survives_encoding() {
        let group_id = GroupId::generate();
        let (tree, mut members) = tree_of(&["a", "b", "c"]);
        let tree = commit(&tree, &group_id, LeafIndex(2), &mut members[2]);
        let decoded = RatchetTree::decode_exact(&tree.encode_to_vec().expect("encode"))
            .expect("decode");
        assert_eq!(
            decoded.tree_hash(&CS).expect("hash"),
            tree.tree_hash(&CS).expect("hash")
        );
    }

    #[test]
    fn test_parent_hash_of_blank_node() {
        let (tree, _) = tree_of(&["a", "b"]);
        assert!(matches!(
            tree.parent_hash(&CS, NodeIndex(1), LeafIndex(0)),
            Err(TreeError::BlankNode(NodeIndex(1)))
        ));
    }

    #[test]
    fn test_parent_hash_ignores_unmerged_leaves() {
        let group_id = GroupId::generate();
        let (tree, mut members) = tree_of(&["a", "b", "c"]);
        let tree = commit(&tree, &group_id, LeafIndex(0), &mut members[0]);
        let before = tree.parent_hash(&CS, NodeIndex(3), LeafIndex(0)).expect("hash");

        // Leaf 3 lands in the sibling subtree of the root and is recorded as
        // unmerged there, so the root's hash as seen from leaf 0 is unchanged.
        let (grown, index) = tree.add_leaf(member("d").leaf).expect("add");
        assert_eq!(index, LeafIndex(3));
        assert_eq!(
            grown.parent_node(NodeIndex(3)).map(|p| p.unmerged_leaves.clone()),
            Some(vec![LeafIndex(3)])
        );
        let after = grown.parent_hash(&CS, NodeIndex(3), LeafIndex(0)).expect("hash");
        assert_eq!(before, after);
        assert_ne!(
            grown.subtree_hash(&CS, NodeIndex(5), &[]).expect("hash"),
            tree.subtree_hash(&CS, NodeIndex(5), &[]).expect("hash")
        );
    }

    #[test]
    fn test_update_path_chains_parent_hashes() {
        let group_id = GroupId::generate();
        let (tree, mut members) = tree_of(&["a", "b", "c", "d"]);
        let tree = commit(&tree, &group_id, LeafIndex(3), &mut members[3]);

        let leaf_hash = tree.stored_parent_hash(LeafIndex(3).node_index()).map(<[u8]>::to_vec);
        assert_eq!(
            leaf_hash,
            Some(tree.parent_hash(&CS, NodeIndex(5), LeafIndex(3)).expect("hash"))
        );
        assert_eq!(
            tree.stored_parent_hash(NodeIndex(5)).map(<[u8]>::to_vec),
            Some(tree.parent_hash(&CS, NodeIndex(3), LeafIndex(3)).expect("hash"))
        );
        assert_eq!(tree.stored_parent_hash(NodeIndex(3)), Some(&[][..]));
    }
}
