//! Per-epoch group context and the transcript hash chain.
//!
//! ```text
//! struct {
//!     ProtocolVersion version = mls10;   // uint8
//!     CipherSuite cipher_suite;
//!     opaque group_id<V>;
//!     uint64 epoch;
//!     opaque tree_hash<V>;
//!     opaque confirmed_transcript_hash<V>;
//!     Extension extensions<V>;
//! } GroupContext;
//! ```
//!
//! The interim transcript hash travels with the context in memory but is
//! not part of its encoding.
//!
//! ```text
//! confirmed(e+1) = H(interim(e) || ConfirmedTranscriptHashInput)
//! interim(e+1)   = H(confirmed(e+1) || InterimTranscriptHashInput)
//! ```

use std::fmt;

use canopy_codec::{read_opaque, write_opaque, Codec, CodecError, Cursor};
use canopy_crypto::{CipherSuite, CipherSuiteProvider, Secret};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GroupSettings;
use crate::error::GroupContextError;
use crate::extensions::Extension;
use crate::tree::RatchetTree;

/// Protocol version. Only MLS 1.0 is defined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    Mls10,
}

impl ProtocolVersion {
    pub fn code(&self) -> u8 {
        match self {
            Self::Mls10 => 1,
        }
    }
}

impl Codec for ProtocolVersion {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u8::decode(cursor)? {
            1 => Ok(Self::Mls10),
            other => Err(CodecError::InvalidValue {
                type_name: "ProtocolVersion",
                value: u64::from(other),
            }),
        }
    }
}

/// A group identifier: a UUIDv7, so ids sort by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// A fresh, time-ordered random id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Codec for GroupId {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        write_opaque(buf, self.as_bytes())
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        let bytes = read_opaque(cursor)?;
        let bytes: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CodecError::InvalidValue {
                type_name: "GroupId length",
                value: bytes.len() as u64,
            })?;
        Ok(Self::from_bytes(bytes))
    }
}

/// How a handshake message was framed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireFormat {
    PublicMessage,
    PrivateMessage,
    Welcome,
    GroupInfo,
    KeyPackage,
}

impl WireFormat {
    pub fn code(&self) -> u16 {
        match self {
            Self::PublicMessage => 1,
            Self::PrivateMessage => 2,
            Self::Welcome => 3,
            Self::GroupInfo => 4,
            Self::KeyPackage => 5,
        }
    }
}

impl Codec for WireFormat {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u16::decode(cursor)? {
            1 => Ok(Self::PublicMessage),
            2 => Ok(Self::PrivateMessage),
            3 => Ok(Self::Welcome),
            4 => Ok(Self::GroupInfo),
            5 => Ok(Self::KeyPackage),
            other => Err(CodecError::InvalidValue {
                type_name: "WireFormat",
                value: u64::from(other),
            }),
        }
    }
}

/// The slice of a commit folded into the confirmed transcript hash.
///
/// `content` is the already-encoded `FramedContent`; framing is owned by
/// the message layer, so it is carried here as raw bytes.
#[derive(Clone, Copy, Debug)]
pub struct ConfirmedTranscriptHashInput<'a> {
    pub wire_format: WireFormat,
    pub content: &'a [u8],
    pub signature: &'a [u8],
}

impl ConfirmedTranscriptHashInput<'_> {
    pub fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.wire_format.encode(buf)?;
        buf.extend_from_slice(self.content);
        write_opaque(buf, self.signature)
    }
}

/// `struct { MAC confirmation_tag; } InterimTranscriptHashInput`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterimTranscriptHashInput {
    pub confirmation_tag: Vec<u8>,
}

impl Codec for InterimTranscriptHashInput {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        write_opaque(buf, &self.confirmation_tag)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            confirmation_tag: read_opaque(cursor)?,
        })
    }
}

/// The two epoch secrets this crate consumes from the key schedule.
pub trait KeySchedule {
    fn confirmation_key(&self) -> &Secret;

    fn joiner_secret(&self) -> &Secret;
}

/// Persisted state of one epoch, enough to rebuild its context.
#[derive(Clone, Debug)]
pub struct EpochState {
    pub epoch: u64,
    pub tree: RatchetTree,
    pub confirmed_transcript_hash: Vec<u8>,
    pub interim_transcript_hash: Vec<u8>,
    pub extensions: Vec<Extension>,
}

/// Immutable per-epoch group state binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupContext {
    pub protocol_version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub group_id: GroupId,
    pub epoch: u64,
    pub tree_hash: Vec<u8>,
    pub confirmed_transcript_hash: Vec<u8>,
    pub extensions: Vec<Extension>,
    /// Not encoded.
    pub interim_transcript_hash: Vec<u8>,
}

impl GroupContext {
    /// Epoch 0 of a freshly created group.
    ///
    /// The confirmed transcript hash starts empty. The interim hash is
    /// seeded from `MAC(confirmation_key, "")`.
    pub fn new<C, K>(
        cs: &C,
        key_schedule: &K,
        tree: &RatchetTree,
        extensions: Vec<Extension>,
    ) -> Result<Self, GroupContextError>
    where
        C: CipherSuiteProvider,
        K: KeySchedule,
    {
        let confirmation_tag = cs.mac(key_schedule.confirmation_key(), &[]);
        let interim_input = InterimTranscriptHashInput { confirmation_tag }.encode_to_vec()?;

        let context = Self {
            protocol_version: ProtocolVersion::Mls10,
            cipher_suite: cs.suite(),
            group_id: GroupId::generate(),
            epoch: 0,
            tree_hash: tree.tree_hash(cs)?,
            confirmed_transcript_hash: Vec::new(),
            extensions,
            interim_transcript_hash: cs.hash(&interim_input),
        };

        tracing::debug!(
            group_id = %context.group_id,
            tree_hash = hex::encode(&context.tree_hash),
            "created group context"
        );
        Ok(context)
    }

    /// Rebuild a context from settings and persisted epoch state.
    ///
    /// # Errors
    ///
    /// Returns [`GroupContextError::CipherSuiteMismatch`] if the settings
    /// name a different suite than `cs`.
    pub fn create<C: CipherSuiteProvider>(
        cs: &C,
        settings: &GroupSettings,
        epoch: &EpochState,
    ) -> Result<Self, GroupContextError> {
        if settings.cipher_suite != cs.suite() {
            return Err(GroupContextError::CipherSuiteMismatch {
                expected: cs.suite(),
                actual: settings.cipher_suite,
            });
        }

        Ok(Self {
            protocol_version: settings.protocol_version,
            cipher_suite: settings.cipher_suite,
            group_id: settings.group_id,
            epoch: epoch.epoch,
            tree_hash: epoch.tree.tree_hash(cs)?,
            confirmed_transcript_hash: epoch.confirmed_transcript_hash.clone(),
            extensions: epoch.extensions.clone(),
            interim_transcript_hash: epoch.interim_transcript_hash.clone(),
        })
    }

    /// The next epoch's context for `tree`, transcript hashes unchanged.
    ///
    /// The transcript is advanced separately once the commit's signed
    /// content is known.
    ///
    /// # Errors
    ///
    /// Returns [`GroupContextError::EpochOverflow`] at epoch `u64::MAX`.
    pub fn provisional<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        tree: &RatchetTree,
    ) -> Result<Self, GroupContextError> {
        let epoch = self
            .epoch
            .checked_add(1)
            .ok_or(GroupContextError::EpochOverflow(self.epoch))?;
        Ok(Self {
            epoch,
            tree_hash: tree.tree_hash(cs)?,
            ..self.clone()
        })
    }

    pub fn with_extensions(&self, extensions: Vec<Extension>) -> Self {
        Self {
            extensions,
            ..self.clone()
        }
    }

    /// Fold a commit into the confirmed transcript hash.
    pub fn with_confirmed_transcript_hash<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        input: &ConfirmedTranscriptHashInput<'_>,
    ) -> Result<Self, GroupContextError> {
        let mut buf = self.interim_transcript_hash.clone();
        input.encode(&mut buf)?;
        Ok(Self {
            confirmed_transcript_hash: cs.hash(&buf),
            ..self.clone()
        })
    }

    /// Fold the commit's confirmation tag into the interim transcript hash.
    pub fn with_interim_transcript_hash<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        confirmation_tag: &[u8],
    ) -> Result<Self, GroupContextError> {
        let mut buf = self.confirmed_transcript_hash.clone();
        InterimTranscriptHashInput {
            confirmation_tag: confirmation_tag.to_vec(),
        }
        .encode(&mut buf)?;
        Ok(Self {
            interim_transcript_hash: cs.hash(&buf),
            ..self.clone()
        })
    }

    /// Settings to persist alongside this group's epochs.
    pub fn settings(&self, keep_past_epochs: u32, public: bool) -> GroupSettings {
        GroupSettings {
            protocol_version: self.protocol_version,
            cipher_suite: self.cipher_suite,
            group_id: self.group_id,
            keep_past_epochs,
            public,
        }
    }
}

impl Codec for GroupContext {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.protocol_version.encode(buf)?;
        self.cipher_suite.encode(buf)?;
        self.group_id.encode(buf)?;
        self.epoch.encode(buf)?;
        write_opaque(buf, &self.tree_hash)?;
        write_opaque(buf, &self.confirmed_transcript_hash)?;
        self.extensions.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            protocol_version: ProtocolVersion::decode(cursor)?,
            cipher_suite: CipherSuite::decode(cursor)?,
            group_id: GroupId::decode(cursor)?,
            epoch: u64::decode(cursor)?,
            tree_hash: read_opaque(cursor)?,
            confirmed_transcript_hash: read_opaque(cursor)?,
            extensions: Vec::decode(cursor)?,
            interim_transcript_hash: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionType;
    use crate::tree::tests::{commit, tree_of, CS};
    use crate::tree::{check, LeafIndex, SignatureLeafValidator};

    struct FixedSchedule {
        confirmation_key: Secret,
        joiner_secret: Secret,
    }

    impl KeySchedule for FixedSchedule {
        fn confirmation_key(&self) -> &Secret {
            &self.confirmation_key
        }

        fn joiner_secret(&self) -> &Secret {
            &self.joiner_secret
        }
    }

    fn schedule() -> FixedSchedule {
        FixedSchedule {
            confirmation_key: Secret::new(vec![7; 32]),
            joiner_secret: Secret::new(vec![9; 32]),
        }
    }

    #[test]
    fn test_new_seeds_interim_hash() {
        let (tree, _) = tree_of(&["a"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");

        assert_eq!(context.epoch, 0);
        assert!(context.confirmed_transcript_hash.is_empty());
        assert_eq!(context.tree_hash, tree.tree_hash(&CS).expect("hash"));

        let tag = CS.mac(&Secret::new(vec![7; 32]), &[]);
        let mut input = Vec::new();
        write_opaque(&mut input, &tag).expect("encode");
        assert_eq!(context.interim_transcript_hash, CS.hash(&input));
    }

    #[test]
    fn test_new_generates_distinct_group_ids() {
        let (tree, _) = tree_of(&["a"]);
        let a = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        let b = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        assert_ne!(a.group_id, b.group_id);
    }

    #[test]
    fn test_provisional_advances_epoch_and_tree_hash() {
        let (tree, mut members) = tree_of(&["a", "b"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");

        let next_tree = commit(&tree, &context.group_id, LeafIndex(0), &mut members[0]);
        let next = context.provisional(&CS, &next_tree).expect("provisional");

        assert_eq!(next.epoch, 1);
        assert_eq!(next.tree_hash, next_tree.tree_hash(&CS).expect("hash"));
        assert_eq!(next.confirmed_transcript_hash, context.confirmed_transcript_hash);
        assert_eq!(next.interim_transcript_hash, context.interim_transcript_hash);
        assert_eq!(next.group_id, context.group_id);
    }

    #[test]
    fn test_provisional_rejects_last_epoch() {
        let (tree, _) = tree_of(&["a"]);
        let context = GroupContext {
            epoch: u64::MAX,
            ..GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context")
        };
        assert!(matches!(
            context.provisional(&CS, &tree),
            Err(GroupContextError::EpochOverflow(u64::MAX))
        ));
    }

    #[test]
    fn test_new_context_passes_tree_check() {
        let (tree, mut members) = tree_of(&["a", "b"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        check(&tree, &CS, &context, &SignatureLeafValidator).expect("founding tree");

        let next_tree = commit(&tree, &context.group_id, LeafIndex(1), &mut members[1]);
        let next = context.provisional(&CS, &next_tree).expect("provisional");
        check(&next_tree, &CS, &next, &SignatureLeafValidator).expect("committed tree");
    }

    #[test]
    fn test_with_extensions_replaces_only_extensions() {
        let (tree, _) = tree_of(&["a"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        let extension = Extension::new(ExtensionType::APPLICATION_ID, b"app".to_vec());

        let updated = context.with_extensions(vec![extension.clone()]);
        assert_eq!(updated.extensions, vec![extension]);
        assert_eq!(updated.with_extensions(Vec::new()), context);
    }

    #[test]
    fn test_transcript_chain() {
        let (tree, _) = tree_of(&["a"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");

        let input = ConfirmedTranscriptHashInput {
            wire_format: WireFormat::PublicMessage,
            content: b"framed content",
            signature: b"signature",
        };
        let confirmed = context
            .with_confirmed_transcript_hash(&CS, &input)
            .expect("confirmed");

        let mut expected = context.interim_transcript_hash.clone();
        expected.extend_from_slice(&[0x00, 0x01]);
        expected.extend_from_slice(b"framed content");
        write_opaque(&mut expected, b"signature").expect("encode");
        assert_eq!(confirmed.confirmed_transcript_hash, CS.hash(&expected));

        let tag = vec![0xAB; 32];
        let interim = confirmed
            .with_interim_transcript_hash(&CS, &tag)
            .expect("interim");
        let mut expected = confirmed.confirmed_transcript_hash.clone();
        write_opaque(&mut expected, &tag).expect("encode");
        assert_eq!(interim.interim_transcript_hash, CS.hash(&expected));
        assert_eq!(
            interim.confirmed_transcript_hash,
            confirmed.confirmed_transcript_hash
        );
    }

    #[test]
    fn test_encoding_omits_interim_hash() {
        let (tree, _) = tree_of(&["a", "b"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");

        let bytes = context.encode_to_vec().expect("encode");
        assert_eq!(bytes[0], 1);
        let decoded = GroupContext::decode_exact(&bytes).expect("decode");
        assert!(decoded.interim_transcript_hash.is_empty());
        assert_eq!(
            GroupContext {
                interim_transcript_hash: Vec::new(),
                ..context
            },
            decoded
        );
    }

    #[test]
    fn test_decode_rejects_reserved_version() {
        let (tree, _) = tree_of(&["a"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        let mut bytes = context.encode_to_vec().expect("encode");
        bytes[0] = 0;
        assert!(matches!(
            GroupContext::decode_exact(&bytes),
            Err(CodecError::InvalidValue {
                type_name: "ProtocolVersion",
                value: 0
            })
        ));
    }

    #[test]
    fn test_group_id_length_checked() {
        let mut bytes = Vec::new();
        write_opaque(&mut bytes, &[1; 15]).expect("encode");
        assert!(matches!(
            GroupId::decode_exact(&bytes),
            Err(CodecError::InvalidValue {
                type_name: "GroupId length",
                value: 15
            })
        ));
    }

    #[test]
    fn test_create_from_settings_and_epoch() {
        let (tree, _) = tree_of(&["a", "b"]);
        let context = GroupContext::new(&CS, &schedule(), &tree, Vec::new()).expect("context");
        let settings = context.settings(5, false);

        let epoch = EpochState {
            epoch: context.epoch,
            tree: tree.clone(),
            confirmed_transcript_hash: context.confirmed_transcript_hash.clone(),
            interim_transcript_hash: context.interim_transcript_hash.clone(),
            extensions: context.extensions.clone(),
        };
        let rebuilt = GroupContext::create(&CS, &settings, &epoch).expect("create");
        assert_eq!(rebuilt, context);
    }
}
