//! Signed announcement of a group's current state.
//!
//! ```text
//! struct {
//!     GroupContext group_context;
//!     Extension extensions<V>;
//!     MAC confirmation_tag;
//!     uint32 signer;
//! } GroupInfoTBS;
//!
//! struct {
//!     GroupInfoTBS tbs;            // fields inlined
//!     opaque signature<V>;
//! } GroupInfo;
//! ```

use canopy_codec::{read_opaque, write_opaque, Codec, Cursor};
use canopy_crypto::{CipherSuiteProvider, CryptoError, SignaturePrivateKey};

use crate::context::GroupContext;
use crate::error::GroupInfoError;
use crate::extensions::Extension;
use crate::tree::{LeafIndex, RatchetTree};

/// Signature label for [`GroupInfo`].
pub const GROUP_INFO_TBS_LABEL: &str = "GroupInfoTBS";

/// A GroupInfo, immutable once signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_context: GroupContext,
    pub extensions: Vec<Extension>,
    pub confirmation_tag: Vec<u8>,
    pub signer: LeafIndex,
    pub signature: Vec<u8>,
}

impl GroupInfo {
    /// Sign a GroupInfo as `signer`.
    pub fn create<C: CipherSuiteProvider>(
        cs: &C,
        group_context: GroupContext,
        confirmation_tag: Vec<u8>,
        extensions: Vec<Extension>,
        signer: LeafIndex,
        signature_key: &SignaturePrivateKey,
    ) -> Result<Self, GroupInfoError> {
        let mut group_info = Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
            signature: Vec::new(),
        };
        let tbs = group_info.to_be_signed()?;
        group_info.signature = cs.sign_with_label(signature_key, GROUP_INFO_TBS_LABEL, &tbs)?;

        tracing::debug!(
            group_id = %group_info.group_context.group_id,
            epoch = group_info.group_context.epoch,
            signer = signer.0,
            "signed group info"
        );
        Ok(group_info)
    }

    /// Encode `GroupInfoTBS`.
    pub fn to_be_signed(&self) -> canopy_codec::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_tbs(&mut buf)?;
        Ok(buf)
    }

    fn encode_tbs(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.group_context.encode(buf)?;
        self.extensions.encode(buf)?;
        write_opaque(buf, &self.confirmation_tag)?;
        self.signer.encode(buf)
    }

    /// Verify the signature under the signature key of the signer's leaf in
    /// `tree`.
    ///
    /// # Errors
    ///
    /// - [`GroupInfoError::BlankSigner`] if `tree` has no leaf at `signer`
    /// - [`GroupInfoError::BadSignature`] if the signature does not verify
    pub fn verify_signature<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        tree: &RatchetTree,
    ) -> Result<(), GroupInfoError> {
        let leaf = tree
            .leaf_node(self.signer)
            .ok_or(GroupInfoError::BlankSigner(self.signer))?;
        let tbs = self.to_be_signed()?;

        cs.verify_with_label(&leaf.signature_key, GROUP_INFO_TBS_LABEL, &tbs, &self.signature)
            .map_err(|e| match e {
                CryptoError::SignatureVerification => {
                    tracing::warn!(
                        group_id = %self.group_context.group_id,
                        signer = self.signer.0,
                        "group info signature verification failed"
                    );
                    GroupInfoError::BadSignature
                }
                other => GroupInfoError::Crypto(other),
            })
    }
}

impl Codec for GroupInfo {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.encode_tbs(buf)?;
        write_opaque(buf, &self.signature)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            group_context: GroupContext::decode(cursor)?,
            extensions: Vec::decode(cursor)?,
            confirmation_tag: read_opaque(cursor)?,
            signer: LeafIndex::decode(cursor)?,
            signature: read_opaque(cursor)?,
        })
    }
}
