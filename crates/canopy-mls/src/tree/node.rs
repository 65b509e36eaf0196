//! Leaf and parent node contents.
//!
//! ```text
//! struct {
//!     HPKEPublicKey encryption_key;
//!     SignaturePublicKey signature_key;
//!     Credential credential;
//!     Capabilities capabilities;
//!     LeafNodeSource leaf_node_source;
//!     select (leaf_node_source) {
//!         case key_package: struct {};
//!         case update:      struct {};
//!         case commit:      opaque parent_hash<V>;
//!     };
//!     Extension extensions<V>;
//!     opaque signature<V>;
//! } LeafNode;
//!
//! struct {
//!     HPKEPublicKey encryption_key;
//!     opaque parent_hash<V>;
//!     uint32 unmerged_leaves<V>;
//! } ParentNode;
//! ```
//!
//! A leaf signs `LeafNodeTBS`: every field except `signature`. Update and
//! commit leaves append the group id and their own leaf index; a key-package
//! leaf is signed before it has either.

use canopy_codec::{read_opaque, write_opaque, Codec, CodecError, Cursor};
use canopy_crypto::{
    CipherSuite, CipherSuiteProvider, CryptoError, HpkePublicKey, SignaturePrivateKey,
    SignaturePublicKey,
};
use serde::{Deserialize, Serialize};

use crate::context::{GroupId, ProtocolVersion};
use crate::extensions::Extension;
use crate::tree::math::LeafIndex;

/// Signature label for leaf nodes.
pub const LEAF_NODE_TBS_LABEL: &str = "LeafNodeTBS";

/// Credential type code points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialType(pub u16);

impl CredentialType {
    pub const BASIC: Self = Self(0x0001);
    pub const X509: Self = Self(0x0002);
}

impl Codec for CredentialType {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.0.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self(u16::decode(cursor)?))
    }
}

/// A member credential. Trust decisions about it belong to the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    /// A bare identity string.
    Basic(Vec<u8>),
    /// A DER certificate chain, leaf first.
    X509(Vec<Vec<u8>>),
}

impl Credential {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::Basic(_) => CredentialType::BASIC,
            Self::X509(_) => CredentialType::X509,
        }
    }
}

impl Codec for Credential {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.credential_type().encode(buf)?;
        match self {
            Self::Basic(identity) => write_opaque(buf, identity),
            Self::X509(certificates) => certificates.encode(buf),
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match CredentialType::decode(cursor)? {
            CredentialType::BASIC => Ok(Self::Basic(read_opaque(cursor)?)),
            CredentialType::X509 => Ok(Self::X509(Vec::decode(cursor)?)),
            CredentialType(other) => Err(CodecError::InvalidValue {
                type_name: "CredentialType",
                value: u64::from(other),
            }),
        }
    }
}

/// What a member's client supports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub versions: Vec<ProtocolVersion>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: Vec<u16>,
    pub credentials: Vec<CredentialType>,
}

impl Capabilities {
    /// MLS 1.0, one cipher suite and basic credentials.
    pub fn for_suite(cipher_suite: CipherSuite) -> Self {
        Self {
            versions: vec![ProtocolVersion::Mls10],
            cipher_suites: vec![cipher_suite],
            extensions: Vec::new(),
            credentials: vec![CredentialType::BASIC],
        }
    }
}

impl Codec for Capabilities {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.versions.encode(buf)?;
        self.cipher_suites.encode(buf)?;
        self.extensions.encode(buf)?;
        self.credentials.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            versions: Vec::decode(cursor)?,
            cipher_suites: Vec::decode(cursor)?,
            extensions: Vec::decode(cursor)?,
            credentials: Vec::decode(cursor)?,
        })
    }
}

/// Where a leaf node's content came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafNodeSource {
    /// Published in a key package, before the member joined any group.
    KeyPackage,
    /// Sent in an update proposal.
    Update,
    /// Sent in a commit's update path, carrying the parent hash of the
    /// lowest updated ancestor.
    Commit(Vec<u8>),
}

impl LeafNodeSource {
    pub fn code(&self) -> u8 {
        match self {
            Self::KeyPackage => 1,
            Self::Update => 2,
            Self::Commit(_) => 3,
        }
    }

    /// Whether a leaf from this source signs over its group and position.
    pub fn binds_position(&self) -> bool {
        !matches!(self, Self::KeyPackage)
    }
}

impl Codec for LeafNodeSource {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)?;
        match self {
            Self::Commit(parent_hash) => write_opaque(buf, parent_hash),
            Self::KeyPackage | Self::Update => Ok(()),
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u8::decode(cursor)? {
            1 => Ok(Self::KeyPackage),
            2 => Ok(Self::Update),
            3 => Ok(Self::Commit(read_opaque(cursor)?)),
            other => Err(CodecError::InvalidValue {
                type_name: "LeafNodeSource",
                value: u64::from(other),
            }),
        }
    }
}

/// A member slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    pub encryption_key: HpkePublicKey,
    pub signature_key: SignaturePublicKey,
    pub credential: Credential,
    pub capabilities: Capabilities,
    pub source: LeafNodeSource,
    pub extensions: Vec<Extension>,
    pub signature: Vec<u8>,
}

impl LeafNode {
    /// An unsigned key-package leaf with no extensions.
    pub fn new(
        encryption_key: HpkePublicKey,
        signature_key: SignaturePublicKey,
        credential: Credential,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            encryption_key,
            signature_key,
            credential,
            capabilities,
            source: LeafNodeSource::KeyPackage,
            extensions: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// The parent hash of a commit leaf.
    pub fn parent_hash(&self) -> Option<&[u8]> {
        match &self.source {
            LeafNodeSource::Commit(parent_hash) => Some(parent_hash),
            LeafNodeSource::KeyPackage | LeafNodeSource::Update => None,
        }
    }

    fn encode_content(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.encryption_key.encode(buf)?;
        self.signature_key.encode(buf)?;
        self.credential.encode(buf)?;
        self.capabilities.encode(buf)?;
        self.source.encode(buf)?;
        self.extensions.encode(buf)
    }

    /// Encode `LeafNodeTBS` for this leaf at `leaf_index` in `group_id`.
    ///
    /// The position is only encoded for update and commit leaves.
    pub fn to_be_signed(
        &self,
        group_id: &GroupId,
        leaf_index: LeafIndex,
    ) -> canopy_codec::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_content(&mut buf)?;
        if self.source.binds_position() {
            group_id.encode(&mut buf)?;
            leaf_index.encode(&mut buf)?;
        }
        Ok(buf)
    }

    /// Sign as a key-package leaf, outside any group.
    pub fn sign_key_package<C: CipherSuiteProvider>(
        mut self,
        cs: &C,
        signer: &SignaturePrivateKey,
    ) -> Result<Self, CryptoError> {
        self.source = LeafNodeSource::KeyPackage;
        let mut tbs = Vec::new();
        self.encode_content(&mut tbs)?;
        self.signature = cs.sign_with_label(signer, LEAF_NODE_TBS_LABEL, &tbs)?;
        Ok(self)
    }

    /// Replace the signature with one over the current content at
    /// `leaf_index` in `group_id`.
    pub fn sign<C: CipherSuiteProvider>(
        mut self,
        cs: &C,
        signer: &SignaturePrivateKey,
        group_id: &GroupId,
        leaf_index: LeafIndex,
    ) -> Result<Self, CryptoError> {
        let tbs = self.to_be_signed(group_id, leaf_index)?;
        self.signature = cs.sign_with_label(signer, LEAF_NODE_TBS_LABEL, &tbs)?;
        Ok(self)
    }

    /// Verify the leaf signature. `group_id` and `leaf_index` are ignored
    /// for a key-package leaf.
    pub fn verify_signature<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        group_id: &GroupId,
        leaf_index: LeafIndex,
    ) -> Result<(), CryptoError> {
        let tbs = self.to_be_signed(group_id, leaf_index)?;
        cs.verify_with_label(
            &self.signature_key,
            LEAF_NODE_TBS_LABEL,
            &tbs,
            &self.signature,
        )
    }
}

impl Codec for LeafNode {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.encode_content(buf)?;
        write_opaque(buf, &self.signature)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            encryption_key: HpkePublicKey::decode(cursor)?,
            signature_key: SignaturePublicKey::decode(cursor)?,
            credential: Credential::decode(cursor)?,
            capabilities: Capabilities::decode(cursor)?,
            source: LeafNodeSource::decode(cursor)?,
            extensions: Vec::decode(cursor)?,
            signature: read_opaque(cursor)?,
        })
    }
}

/// A shared-secret slot above the leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentNode {
    pub encryption_key: HpkePublicKey,
    pub parent_hash: Vec<u8>,
    /// Leaves below this node that do not hold its secret, in ascending order.
    pub unmerged_leaves: Vec<LeafIndex>,
}

impl ParentNode {
    pub fn new(encryption_key: HpkePublicKey) -> Self {
        Self {
            encryption_key,
            parent_hash: Vec::new(),
            unmerged_leaves: Vec::new(),
        }
    }
}

impl Codec for ParentNode {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.encryption_key.encode(buf)?;
        write_opaque(buf, &self.parent_hash)?;
        self.unmerged_leaves.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            encryption_key: HpkePublicKey::decode(cursor)?,
            parent_hash: read_opaque(cursor)?,
            unmerged_leaves: Vec::decode(cursor)?,
        })
    }
}

/// `NodeType` discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Leaf = 1,
    Parent = 2,
}

impl Codec for NodeType {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        (*self as u8).encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u8::decode(cursor)? {
            1 => Ok(Self::Leaf),
            2 => Ok(Self::Parent),
            other => Err(CodecError::InvalidValue {
                type_name: "NodeType",
                value: u64::from(other),
            }),
        }
    }
}

/// A non-blank tree slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Parent(ParentNode),
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Leaf(_) => NodeType::Leaf,
            Self::Parent(_) => NodeType::Parent,
        }
    }

    pub fn encryption_key(&self) -> &HpkePublicKey {
        match self {
            Self::Leaf(leaf) => &leaf.encryption_key,
            Self::Parent(parent) => &parent.encryption_key,
        }
    }

    /// The stored parent hash; `None` for a leaf that never committed a path.
    pub fn parent_hash(&self) -> Option<&[u8]> {
        match self {
            Self::Leaf(leaf) => leaf.parent_hash(),
            Self::Parent(parent) => Some(&parent.parent_hash),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Parent(_) => None,
        }
    }

    pub fn as_parent(&self) -> Option<&ParentNode> {
        match self {
            Self::Parent(parent) => Some(parent),
            Self::Leaf(_) => None,
        }
    }
}

impl Codec for Node {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.node_type().encode(buf)?;
        match self {
            Self::Leaf(leaf) => leaf.encode(buf),
            Self::Parent(parent) => parent.encode(buf),
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match NodeType::decode(cursor)? {
            NodeType::Leaf => Ok(Self::Leaf(LeafNode::decode(cursor)?)),
            NodeType::Parent => Ok(Self::Parent(ParentNode::decode(cursor)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_crypto::Curve25519ChaChaBlake3;

    const CS: Curve25519ChaChaBlake3 = Curve25519ChaChaBlake3;

    fn leaf() -> (LeafNode, SignaturePrivateKey) {
        let (sk, pk) = CS.generate_signature_key_pair();
        let leaf = LeafNode::new(
            CS.generate_hpke_key_pair().public_key,
            pk,
            Credential::Basic(b"alice".to_vec()),
            Capabilities::for_suite(CS.suite()),
        );
        (leaf, sk)
    }

    #[test]
    fn test_leaf_node_roundtrip() {
        let (leaf, _) = leaf();
        let mut leaf = leaf;
        leaf.source = LeafNodeSource::Commit(vec![7; 32]);
        let bytes = leaf.encode_to_vec().expect("encode");
        let decoded = LeafNode::decode_exact(&bytes).expect("decode");
        assert_eq!(decoded.parent_hash(), Some(&[7; 32][..]));
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn test_unknown_leaf_source_rejected() {
        assert!(matches!(
            LeafNodeSource::decode_exact(&[4]),
            Err(CodecError::InvalidValue {
                type_name: "LeafNodeSource",
                value: 4
            })
        ));
        assert_eq!(
            LeafNodeSource::Update.encode_to_vec().expect("encode"),
            vec![2]
        );
    }

    #[test]
    fn test_key_package_leaf_verifies_anywhere() {
        let (leaf, sk) = leaf();
        let leaf = leaf.sign_key_package(&CS, &sk).expect("sign");
        assert_eq!(leaf.parent_hash(), None);
        assert!(leaf
            .verify_signature(&CS, &GroupId::generate(), LeafIndex(0))
            .is_ok());
        assert!(leaf
            .verify_signature(&CS, &GroupId::generate(), LeafIndex(5))
            .is_ok());

        let mut tampered = leaf;
        tampered.credential = Credential::Basic(b"mallory".to_vec());
        assert!(tampered
            .verify_signature(&CS, &GroupId::generate(), LeafIndex(0))
            .is_err());
    }

    #[test]
    fn test_leaf_signature_binds_position() {
        let (leaf, sk) = leaf();
        let group_id = GroupId::generate();
        let mut leaf = leaf;
        leaf.source = LeafNodeSource::Update;
        let leaf = leaf
            .sign(&CS, &sk, &group_id, LeafIndex(3))
            .expect("sign");
        assert!(leaf.verify_signature(&CS, &group_id, LeafIndex(3)).is_ok());
        assert!(matches!(
            leaf.verify_signature(&CS, &group_id, LeafIndex(4)),
            Err(CryptoError::SignatureVerification)
        ));
        assert!(leaf
            .verify_signature(&CS, &GroupId::generate(), LeafIndex(3))
            .is_err());
    }

    #[test]
    fn test_unknown_credential_rejected() {
        let bytes = [0x00, 0x09, 0x00];
        assert!(matches!(
            Credential::decode_exact(&bytes),
            Err(CodecError::InvalidValue {
                type_name: "CredentialType",
                value: 9
            })
        ));
    }

    #[test]
    fn test_x509_credential_roundtrip() {
        let credential = Credential::X509(vec![vec![1, 2], vec![3]]);
        let bytes = credential.encode_to_vec().expect("encode");
        assert_eq!(bytes, vec![0x00, 0x02, 5, 2, 1, 2, 1, 3]);
        assert_eq!(Credential::decode_exact(&bytes).expect("decode"), credential);
    }

    #[test]
    fn test_node_type_tag() {
        let parent = Node::Parent(ParentNode::new(HpkePublicKey::new(vec![1; 32])));
        let bytes = parent.encode_to_vec().expect("encode");
        assert_eq!(bytes[0], 2);
        assert_eq!(Node::decode_exact(&bytes).expect("decode"), parent);
        assert!(Node::decode_exact(&[0]).is_err());
    }
}
