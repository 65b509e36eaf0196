//! Error types for the MLS core.
//!
//! Each operation family has its own enum so callers can match on the
//! failures that family can actually produce. Decode failures always surface
//! as a `Codec`/`Decode` variant, separate from authentication failures.

use canopy_codec::CodecError;
use canopy_crypto::{CipherSuite, CryptoError};

use crate::psk::{PreSharedKeyId, ResumptionPskUsage};
use crate::tree::{LeafIndex, NodeIndex};

/// Structural errors from ratchet tree queries and edits.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A leaf index beyond the tree's leaf slots.
    #[error("{leaf} is outside a tree of {leaf_count} leaves")]
    LeafOutOfRange { leaf: LeafIndex, leaf_count: u32 },

    /// An operation needed a member at a blank leaf.
    #[error("{0} is blank")]
    BlankLeaf(LeafIndex),

    /// An operation needed a parent node at a blank or leaf slot.
    #[error("{0} is not a parent node")]
    BlankNode(NodeIndex),

    /// An update path did not match the sender's direct path.
    #[error("update path has {actual} keys, direct path has {expected} nodes")]
    PathLength { expected: usize, actual: usize },

    /// Doubling the tree would overflow node indices.
    #[error("tree of {0} leaves cannot grow")]
    TooManyLeaves(u32),

    /// Node slots do not form a full left-balanced tree.
    #[error("invalid tree shape: {0}")]
    InvalidShape(String),

    /// Encoding a hash input failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Why an unmerged leaf reference is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnmergedLeafReason {
    #[error("leaf node is blank")]
    Blank,

    #[error("not a descendant")]
    NotDescendant,

    #[error("not in unmerged leaves of intermediate {0}")]
    MissingFromIntermediate(NodeIndex),
}

/// Failures of the tree integrity check, in the order they are checked.
#[derive(Debug, thiserror::Error)]
pub enum TreeCheckError {
    /// The recomputed tree hash differs from the group context.
    #[error("bad tree hash: expected {}, got {}", hex::encode(expected), hex::encode(actual))]
    BadTreeHash { expected: Vec<u8>, actual: Vec<u8> },

    /// A non-blank parent was claimed by zero or several parent-hash chains.
    #[error("{node} is not parent-hash valid ({claims} claims)")]
    NotParentHashValid { node: NodeIndex, claims: u32 },

    /// An unmerged leaf reference is inconsistent with the tree.
    #[error("bad unmerged {leaf} at {parent}: {reason}")]
    BadUnmergedLeaf {
        parent: NodeIndex,
        leaf: LeafIndex,
        reason: UnmergedLeafReason,
    },

    /// Two or more non-blank nodes share an encryption key.
    #[error("duplicate encryption key at nodes {nodes:?}")]
    DuplicateEncryptionKey { nodes: Vec<NodeIndex> },

    /// A leaf failed per-leaf validation.
    #[error("{leaf} failed validation: {source}")]
    LeafNode {
        leaf: LeafIndex,
        #[source]
        source: LeafNodeCheckError,
    },

    /// Hashing the tree failed.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
}

/// Failures of a single leaf's validation.
#[derive(Debug, thiserror::Error)]
pub enum LeafNodeCheckError {
    /// The leaf does not list the group's cipher suite.
    #[error("cipher suite {0:?} not supported by leaf")]
    UnsupportedCipherSuite(CipherSuite),

    /// The leaf does not list the group's protocol version.
    #[error("protocol version not supported by leaf")]
    UnsupportedProtocolVersion,

    /// The leaf's own credential type is missing from its capabilities.
    #[error("credential type {0} not supported by leaf")]
    UnsupportedCredential(u16),

    /// The leaf signature does not verify.
    #[error("bad leaf signature: {0}")]
    BadSignature(#[from] CryptoError),
}

/// PSK validation and resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum PskError {
    /// The lookup does not know this PSK.
    #[error("PSK not found: {0}")]
    PskNotFound(PreSharedKeyId),

    /// The PSK nonce length differs from the suite's hash length.
    #[error("bad PSK nonce: expected {expected} bytes, got {actual}")]
    BadPskNonce { expected: usize, actual: usize },

    /// A resumption PSK used outside the flow its usage allows.
    #[error("resumption PSK usage {0:?} is invalid here")]
    InvalidPskUsage(ResumptionPskUsage),

    /// More PSKs than a `PSKLabel` can count.
    #[error("too many PSKs: {0}")]
    TooManyPsks(usize),

    /// A PSK store failed for a reason other than not knowing the PSK.
    #[error("PSK store error: {0}")]
    Store(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// GroupInfo signing and verification errors.
#[derive(Debug, thiserror::Error)]
pub enum GroupInfoError {
    /// The signature does not verify under the signer's leaf key.
    #[error("GroupInfo signature verification failed")]
    BadSignature,

    /// The recorded signer has no leaf in the supplied tree.
    #[error("GroupInfo signer {0} is blank")]
    BlankSigner(LeafIndex),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors while processing a Welcome as a joiner.
#[derive(Debug, thiserror::Error)]
pub enum WelcomeJoinError {
    /// No encrypted group secrets are addressed to our key package.
    #[error("welcome is not for this key package")]
    WelcomeNotForYou,

    /// The Welcome uses a different cipher suite than the provider.
    #[error("welcome cipher suite {actual:?} does not match provider {expected:?}")]
    CipherSuiteMismatch {
        expected: CipherSuite,
        actual: CipherSuite,
    },

    /// Decrypted bytes did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// Decryption or key derivation failed.
    #[error("decrypt error: {0}")]
    Decrypt(#[from] CryptoError),
}

/// Errors building or advancing a group context.
#[derive(Debug, thiserror::Error)]
pub enum GroupContextError {
    /// Settings name a different cipher suite than the provider.
    #[error("settings cipher suite {actual:?} does not match provider {expected:?}")]
    CipherSuiteMismatch {
        expected: CipherSuite,
        actual: CipherSuite,
    },

    /// The epoch counter is exhausted.
    #[error("epoch {0} has no successor")]
    EpochOverflow(u64),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors loading group settings or PSK configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A hex-encoded field did not decode.
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    /// Two PSK entries share an id.
    #[error("duplicate PSK id {0}")]
    DuplicatePsk(String),
}
