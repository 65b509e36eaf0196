//! Tree integrity check.
//!
//! Validates a tree snapshot received from a peer (or about to be published)
//! against a group context. The checks run in a fixed order and the first
//! failure aborts:
//!
//! 1. tree hash equals `group_context.tree_hash`
//! 2. every non-blank parent is claimed by exactly one parent-hash chain
//! 3. unmerged-leaf references are consistent
//! 4. no two non-blank nodes share an encryption key
//! 5. every non-blank leaf passes the [`LeafNodeValidator`]
//!
//! A failed check is terminal for the snapshot; callers discard the tree.

use std::collections::HashMap;

use canopy_crypto::{CipherSuiteProvider, HpkePublicKey};

use crate::context::GroupContext;
use crate::error::{LeafNodeCheckError, TreeCheckError, UnmergedLeafReason};
use crate::tree::math::{LeafIndex, NodeIndex};
use crate::tree::node::{LeafNode, ParentNode};
use crate::tree::RatchetTree;

/// Per-leaf validation hook run as the last step of [`check`].
pub trait LeafNodeValidator {
    fn validate<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        leaf: &LeafNode,
        group_context: &GroupContext,
        leaf_index: LeafIndex,
    ) -> Result<(), LeafNodeCheckError>;
}

/// Checks leaf capabilities against the group and verifies the leaf
/// signature over `LeafNodeTBS`.
///
/// Credential trust is not evaluated.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureLeafValidator;

impl LeafNodeValidator for SignatureLeafValidator {
    fn validate<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        leaf: &LeafNode,
        group_context: &GroupContext,
        leaf_index: LeafIndex,
    ) -> Result<(), LeafNodeCheckError> {
        let capabilities = &leaf.capabilities;
        if !capabilities
            .cipher_suites
            .contains(&group_context.cipher_suite)
        {
            return Err(LeafNodeCheckError::UnsupportedCipherSuite(
                group_context.cipher_suite,
            ));
        }
        if !capabilities
            .versions
            .contains(&group_context.protocol_version)
        {
            return Err(LeafNodeCheckError::UnsupportedProtocolVersion);
        }
        let credential_type = leaf.credential.credential_type();
        if !capabilities.credentials.contains(&credential_type) {
            return Err(LeafNodeCheckError::UnsupportedCredential(credential_type.0));
        }
        leaf.verify_signature(cs, &group_context.group_id, leaf_index)?;
        Ok(())
    }
}

/// Validate `tree` against `group_context`.
///
/// # Arguments
///
/// * `tree` - The snapshot to validate.
/// * `cs` - Provider for the group's cipher suite.
/// * `group_context` - Context of the epoch the tree belongs to.
/// * `validator` - Per-leaf validation, run last.
pub fn check<C, V>(
    tree: &RatchetTree,
    cs: &C,
    group_context: &GroupContext,
    validator: &V,
) -> Result<(), TreeCheckError>
where
    C: CipherSuiteProvider,
    V: LeafNodeValidator,
{
    let tree_hash = tree.tree_hash(cs)?;
    if tree_hash != group_context.tree_hash {
        tracing::warn!(
            expected = hex::encode(&group_context.tree_hash),
            actual = hex::encode(&tree_hash),
            "tree check failed: bad tree hash"
        );
        return Err(TreeCheckError::BadTreeHash {
            expected: group_context.tree_hash.clone(),
            actual: tree_hash,
        });
    }

    check_parent_hash_coverage(tree, cs)?;

    for (index, parent) in tree.non_blank_parents() {
        check_unmerged_leaves(tree, index, parent)?;
    }

    check_duplicate_keys(tree)?;

    for (leaf_index, leaf) in tree.non_blank_leaves() {
        validator
            .validate(cs, leaf, group_context, leaf_index)
            .map_err(|source| {
                tracing::warn!(leaf = leaf_index.0, error = %source, "tree check failed: leaf");
                TreeCheckError::LeafNode {
                    leaf: leaf_index,
                    source,
                }
            })?;
    }

    tracing::debug!(
        group_id = %group_context.group_id,
        epoch = group_context.epoch,
        members = tree.member_count(),
        "tree check passed"
    );
    Ok(())
}

/// Walk from every non-blank leaf toward the root, claiming each ancestor
/// whose parent hash matches the current reference node.
///
/// Blank ancestors are skipped; the walk ends at the root or at the first
/// mismatch.
fn check_parent_hash_coverage<C: CipherSuiteProvider>(
    tree: &RatchetTree,
    cs: &C,
) -> Result<(), TreeCheckError> {
    let mut claims: HashMap<NodeIndex, u32> = HashMap::new();

    for (leaf_index, _) in tree.non_blank_leaves() {
        let mut reference = leaf_index.node_index();
        let mut current = reference;

        while let Some(parent) = tree.parent(current) {
            current = parent;
            if tree.is_blank(current) {
                continue;
            }

            let parent_hash = tree.parent_hash(cs, current, leaf_index)?;
            if tree.stored_parent_hash(reference) != Some(parent_hash.as_slice()) {
                break;
            }
            *claims.entry(current).or_default() += 1;
            reference = current;
        }
    }

    // Lowest level first: a corrupted node breaks the chains of its
    // ancestors too, and the corrupted node is the one to name.
    let mut parents: Vec<NodeIndex> = tree.non_blank_parents().map(|(i, _)| i).collect();
    parents.sort_by_key(|i| (i.level(), i.0));

    for index in parents {
        let count = claims.get(&index).copied().unwrap_or(0);
        if count != 1 {
            tracing::warn!(node = index.0, claims = count, "tree check failed: parent hash coverage");
            return Err(TreeCheckError::NotParentHashValid {
                node: index,
                claims: count,
            });
        }
    }
    Ok(())
}

fn check_unmerged_leaves(
    tree: &RatchetTree,
    index: NodeIndex,
    parent: &ParentNode,
) -> Result<(), TreeCheckError> {
    let bad = |leaf, reason| {
        tracing::warn!(node = index.0, leaf = %leaf, %reason, "tree check failed: unmerged leaf");
        TreeCheckError::BadUnmergedLeaf {
            parent: index,
            leaf,
            reason,
        }
    };

    for &leaf in &parent.unmerged_leaves {
        if tree.leaf_node(leaf).is_none() {
            return Err(bad(leaf, UnmergedLeafReason::Blank));
        }
        if !leaf.is_in_subtree_of(index) {
            return Err(bad(leaf, UnmergedLeafReason::NotDescendant));
        }

        let mut current = tree.parent(leaf.node_index());
        while let Some(intermediate) = current.filter(|n| *n != index) {
            let recorded = tree
                .parent_node(intermediate)
                .map_or(true, |p| p.unmerged_leaves.contains(&leaf));
            if !recorded {
                return Err(bad(
                    leaf,
                    UnmergedLeafReason::MissingFromIntermediate(intermediate),
                ));
            }
            current = tree.parent(intermediate);
        }
    }
    Ok(())
}

fn check_duplicate_keys(tree: &RatchetTree) -> Result<(), TreeCheckError> {
    let mut by_key: HashMap<&HpkePublicKey, Vec<NodeIndex>> = HashMap::new();
    for (index, node) in tree.non_blank_nodes() {
        by_key.entry(node.encryption_key()).or_default().push(index);
    }

    let mut nodes: Vec<NodeIndex> = by_key
        .into_values()
        .filter(|indices| indices.len() > 1)
        .flatten()
        .collect();
    if nodes.is_empty() {
        return Ok(());
    }
    nodes.sort();
    tracing::warn!(nodes = ?nodes, "tree check failed: duplicate encryption key");
    Err(TreeCheckError::DuplicateEncryptionKey { nodes })
}
