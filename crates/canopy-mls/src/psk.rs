//! Pre-shared keys: identifiers, validation, lookup and secret derivation.
//!
//! ```text
//! struct {
//!     PSKType psktype;                       // uint8, 1 = external, 2 = resumption
//!     select (psktype) {
//!         case external:   opaque psk_id<V>;
//!         case resumption: ResumptionPSKUsage usage;   // uint8
//!                          opaque psk_group_id<V>;
//!                          uint64 psk_epoch;
//!     };
//!     opaque psk_nonce<V>;
//! } PreSharedKeyID;
//!
//! struct { PreSharedKeyID id; uint16 index; uint16 count; } PSKLabel;
//! ```
//!
//! Secrets come from a [`PskLookup`]. Lookups compose with
//! [`PskLookup::delegating_to`]: the fallback is consulted only when the
//! primary reports [`PskError::PskNotFound`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use canopy_codec::{read_opaque, write_opaque, Codec, CodecError, Cursor};
use canopy_crypto::{CipherSuiteProvider, CryptoError, Nonce, Secret};

use crate::config::PskStoreConfig;
use crate::context::GroupId;
use crate::error::{ConfigError, PskError};

/// Label for expanding each extracted PSK into its chained input.
pub const DERIVED_PSK_LABEL: &str = "derived psk";

/// PSK type tag. `0` is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PskType {
    External,
    Resumption,
}

impl PskType {
    pub fn code(&self) -> u8 {
        match self {
            Self::External => 1,
            Self::Resumption => 2,
        }
    }
}

impl Codec for PskType {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u8::decode(cursor)? {
            1 => Ok(Self::External),
            2 => Ok(Self::Resumption),
            other => Err(CodecError::InvalidValue {
                type_name: "PskType",
                value: u64::from(other),
            }),
        }
    }
}

/// What a resumption PSK is used for. `0` is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResumptionPskUsage {
    Application,
    ReInit,
    Branch,
}

impl ResumptionPskUsage {
    pub fn code(&self) -> u8 {
        match self {
            Self::Application => 1,
            Self::ReInit => 2,
            Self::Branch => 3,
        }
    }
}

impl Codec for ResumptionPskUsage {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match u8::decode(cursor)? {
            1 => Ok(Self::Application),
            2 => Ok(Self::ReInit),
            3 => Ok(Self::Branch),
            other => Err(CodecError::InvalidValue {
                type_name: "ResumptionPskUsage",
                value: u64::from(other),
            }),
        }
    }
}

/// A PSK provisioned out of band.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalPskId {
    pub psk_id: Vec<u8>,
    pub psk_nonce: Nonce,
}

impl ExternalPskId {
    /// Reference `psk_id` with a fresh nonce of the suite's hash length.
    pub fn new<C: CipherSuiteProvider>(cs: &C, psk_id: Vec<u8>) -> Self {
        Self {
            psk_id,
            psk_nonce: cs.generate_nonce(cs.hash_len()),
        }
    }
}

/// A resumption secret exported by an earlier epoch of some group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResumptionPskId {
    pub usage: ResumptionPskUsage,
    pub psk_group_id: GroupId,
    pub psk_epoch: u64,
    pub psk_nonce: Nonce,
}

impl ResumptionPskId {
    fn fresh<C: CipherSuiteProvider>(
        cs: &C,
        usage: ResumptionPskUsage,
        group_id: GroupId,
        epoch: u64,
    ) -> Self {
        Self {
            usage,
            psk_group_id: group_id,
            psk_epoch: epoch,
            psk_nonce: cs.generate_nonce(cs.hash_len()),
        }
    }

    pub fn application<C: CipherSuiteProvider>(cs: &C, group_id: GroupId, epoch: u64) -> Self {
        Self::fresh(cs, ResumptionPskUsage::Application, group_id, epoch)
    }

    /// Resume the last epoch of a group being re-initialised.
    pub fn reinit<C: CipherSuiteProvider>(cs: &C, group_id: GroupId, epoch: u64) -> Self {
        Self::fresh(cs, ResumptionPskUsage::ReInit, group_id, epoch)
    }

    /// Resume `epoch` of the group a subgroup branches from.
    pub fn branch<C: CipherSuiteProvider>(cs: &C, group_id: GroupId, epoch: u64) -> Self {
        Self::fresh(cs, ResumptionPskUsage::Branch, group_id, epoch)
    }
}

/// Identifies one PSK injected into the key schedule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PreSharedKeyId {
    External(ExternalPskId),
    Resumption(ResumptionPskId),
}

impl PreSharedKeyId {
    pub fn psk_type(&self) -> PskType {
        match self {
            Self::External(_) => PskType::External,
            Self::Resumption(_) => PskType::Resumption,
        }
    }

    pub fn nonce(&self) -> &Nonce {
        match self {
            Self::External(id) => &id.psk_nonce,
            Self::Resumption(id) => &id.psk_nonce,
        }
    }

    /// Check the nonce length and, for resumption PSKs, that the usage
    /// fits the current flow.
    ///
    /// # Errors
    ///
    /// - [`PskError::BadPskNonce`] if the nonce is not `cs.hash_len()` bytes
    /// - [`PskError::InvalidPskUsage`] for a `ReInit` PSK outside a re-init
    ///   or a `Branch` PSK outside a branch
    pub fn validate<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        in_reinit: bool,
        in_branch: bool,
    ) -> Result<&Self, PskError> {
        let nonce_len = self.nonce().len();
        if nonce_len != cs.hash_len() {
            return Err(PskError::BadPskNonce {
                expected: cs.hash_len(),
                actual: nonce_len,
            });
        }

        if let Self::Resumption(id) = self {
            let allowed = match id.usage {
                ResumptionPskUsage::Application => true,
                ResumptionPskUsage::ReInit => in_reinit,
                ResumptionPskUsage::Branch => in_branch,
            };
            if !allowed {
                return Err(PskError::InvalidPskUsage(id.usage));
            }
        }
        Ok(self)
    }
}

impl fmt::Display for PreSharedKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(id) => write!(f, "external PSK {}", hex::encode(&id.psk_id)),
            Self::Resumption(id) => write!(
                f,
                "{:?} resumption PSK of {} epoch {}",
                id.usage, id.psk_group_id, id.psk_epoch
            ),
        }
    }
}

impl Codec for PreSharedKeyId {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.psk_type().encode(buf)?;
        match self {
            Self::External(id) => {
                write_opaque(buf, &id.psk_id)?;
                id.psk_nonce.encode(buf)
            }
            Self::Resumption(id) => {
                id.usage.encode(buf)?;
                id.psk_group_id.encode(buf)?;
                id.psk_epoch.encode(buf)?;
                id.psk_nonce.encode(buf)
            }
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        match PskType::decode(cursor)? {
            PskType::External => Ok(Self::External(ExternalPskId {
                psk_id: read_opaque(cursor)?,
                psk_nonce: Nonce::decode(cursor)?,
            })),
            PskType::Resumption => Ok(Self::Resumption(ResumptionPskId {
                usage: ResumptionPskUsage::decode(cursor)?,
                psk_group_id: GroupId::decode(cursor)?,
                psk_epoch: u64::decode(cursor)?,
                psk_nonce: Nonce::decode(cursor)?,
            })),
        }
    }
}

/// Position-tagged context for deriving one PSK's chained input.
#[derive(Clone, Copy, Debug)]
pub struct PskLabel<'a> {
    pub psk_id: &'a PreSharedKeyId,
    pub index: u16,
    pub count: u16,
}

impl PskLabel<'_> {
    pub fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.psk_id.encode(buf)?;
        self.index.encode(buf)?;
        self.count.encode(buf)
    }
}

/// A source of PSK secrets.
pub trait PskLookup: Send + Sync {
    /// Resolve `id` to its secret.
    ///
    /// Fails with [`PskError::PskNotFound`] when this lookup does not know
    /// `id`; any other error means the lookup knows it but cannot serve it.
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send;

    /// Try `self` first, then `fallback` if `self` does not know the PSK.
    fn delegating_to<F: PskLookup>(self, fallback: F) -> DelegatingLookup<Self, F>
    where
        Self: Sized,
    {
        DelegatingLookup {
            primary: self,
            fallback,
        }
    }
}

impl<T: PskLookup> PskLookup for &T {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        (**self).resolve(id)
    }
}

impl<T: PskLookup> PskLookup for Arc<T> {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        (**self).resolve(id)
    }
}

/// Knows no PSKs.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyPskLookup;

impl PskLookup for EmptyPskLookup {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        let id = id.clone();
        async move { Err(PskError::PskNotFound(id)) }
    }
}

/// Chain of two lookups; built by [`PskLookup::delegating_to`].
#[derive(Clone, Debug)]
pub struct DelegatingLookup<P, F> {
    primary: P,
    fallback: F,
}

impl<P: PskLookup, F: PskLookup> PskLookup for DelegatingLookup<P, F> {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        async move {
            match self.primary.resolve(id).await {
                Err(PskError::PskNotFound(_)) => {
                    tracing::debug!(psk = %id, "PSK not in primary lookup, trying fallback");
                    self.fallback.resolve(id).await
                }
                other => other,
            }
        }
    }
}

/// External PSKs loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredPsks {
    secrets: HashMap<Vec<u8>, Secret>,
}

impl ConfiguredPsks {
    pub fn from_config(config: &PskStoreConfig) -> Result<Self, ConfigError> {
        let secrets = config
            .entries()?
            .into_iter()
            .map(|(id, secret)| (id, Secret::new(secret)))
            .collect();
        Ok(Self { secrets })
    }

    pub fn insert(&mut self, psk_id: Vec<u8>, secret: Secret) {
        self.secrets.insert(psk_id, secret);
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl PskLookup for ConfiguredPsks {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        let found = match id {
            PreSharedKeyId::External(external) => self.secrets.get(&external.psk_id).cloned(),
            PreSharedKeyId::Resumption(_) => None,
        };
        let id = id.clone();
        async move { found.ok_or(PskError::PskNotFound(id)) }
    }
}

/// Resumption secrets of past epochs, keyed by group and epoch.
#[derive(Clone, Debug, Default)]
pub struct ResumptionPskStore {
    secrets: HashMap<(GroupId, u64), Secret>,
}

impl ResumptionPskStore {
    pub fn insert(&mut self, group_id: GroupId, epoch: u64, resumption_psk: Secret) {
        self.secrets.insert((group_id, epoch), resumption_psk);
    }

    /// Drop epochs of `group_id` older than `keep` before `current`.
    pub fn prune(&mut self, group_id: GroupId, current: u64, keep: u32) {
        let oldest = current.saturating_sub(u64::from(keep));
        self.secrets
            .retain(|(group, epoch), _| *group != group_id || *epoch >= oldest);
    }
}

impl PskLookup for ResumptionPskStore {
    fn resolve(&self, id: &PreSharedKeyId) -> impl Future<Output = Result<Secret, PskError>> + Send {
        let found = match id {
            PreSharedKeyId::Resumption(resumption) => self
                .secrets
                .get(&(resumption.psk_group_id, resumption.psk_epoch))
                .cloned(),
            PreSharedKeyId::External(_) => None,
        };
        let id = id.clone();
        async move { found.ok_or(PskError::PskNotFound(id)) }
    }
}

/// Combine resolved PSKs into the key schedule's `psk_secret`.
///
/// ```text
/// psk_extracted[i] = Extract(0, psk[i])
/// psk_input[i]     = ExpandWithLabel(psk_extracted[i], "derived psk", PSKLabel(i), Nh)
/// psk_secret[i+1]  = Extract(psk_input[i], psk_secret[i])
/// ```
///
/// Starts from the all-zero secret, which is also the result for no PSKs.
pub fn psk_secret<C: CipherSuiteProvider>(
    cs: &C,
    psks: &[(PreSharedKeyId, Secret)],
) -> Result<Secret, PskError> {
    let count = u16::try_from(psks.len()).map_err(|_| PskError::TooManyPsks(psks.len()))?;
    let hash_len = u16::try_from(cs.hash_len())
        .map_err(|_| CryptoError::InvalidInput("hash length exceeds u16".into()))?;
    let zero = Secret::zero(cs.hash_len());

    let mut secret = zero.clone();
    for (index, (id, psk)) in (0u16..).zip(psks) {
        let mut label = Vec::new();
        PskLabel {
            psk_id: id,
            index,
            count,
        }
        .encode(&mut label)?;

        let extracted = cs.extract(&zero, psk);
        let input = cs.expand_with_label(&extracted, DERIVED_PSK_LABEL, &label, hash_len)?;
        secret = cs.extract(&input, &secret);
    }
    Ok(secret)
}

/// Resolve every id through `lookup`, then derive the combined secret.
///
/// Lookups run concurrently. The first failure aborts before any
/// derivation happens.
pub async fn resolve_psk_secret<C, L>(
    cs: &C,
    lookup: &L,
    ids: &[PreSharedKeyId],
) -> Result<Secret, PskError>
where
    C: CipherSuiteProvider,
    L: PskLookup,
{
    let secrets = futures::future::try_join_all(ids.iter().map(|id| lookup.resolve(id))).await?;
    let psks: Vec<(PreSharedKeyId, Secret)> = ids.iter().cloned().zip(secrets).collect();
    psk_secret(cs, &psks)
}
