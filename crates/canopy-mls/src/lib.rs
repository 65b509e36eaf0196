//! # canopy-mls
//!
//! Membership and key-agreement core of an MLS-style group (RFC 9420).
//!
//! Everything here is an immutable value: editing a tree or advancing a
//! group context returns a new one, so snapshots can be hashed, checked and
//! shared across threads freely. Cryptography is reached only through a
//! [`CipherSuiteProvider`](canopy_crypto::CipherSuiteProvider) passed in by
//! the caller.
//!
//! ## Modules
//!
//! - [`tree`]: Ratchet tree, tree hash, parent hash and the integrity check.
//! - [`context`]: Per-epoch group context and the transcript hash chain.
//! - [`psk`]: Pre-shared key identifiers, lookups and secret derivation.
//! - [`messages`]: GroupInfo and Welcome.
//! - [`extensions`]: Extension containers.
//! - [`config`]: Group settings and PSK store configuration (TOML).
//! - [`error`]: Error types, one enum per operation family.
//!
//! ## Join flow
//!
//! A committer builds the new tree, advances the [`GroupContext`], runs
//! [`tree::check`] on its own result, then packages a signed [`GroupInfo`]
//! and a [`Welcome`]. A joiner opens its `GroupSecrets`, decrypts and
//! verifies the GroupInfo, and checks the tree it received against the
//! GroupInfo's context before trusting it.

pub mod config;
pub mod context;
pub mod error;
pub mod extensions;
pub mod messages;
pub mod psk;
pub mod tree;

pub use config::{GroupSettings, PskStoreConfig};
pub use context::{EpochState, GroupContext, GroupId, KeySchedule, ProtocolVersion, WireFormat};
pub use error::{
    ConfigError, GroupContextError, GroupInfoError, LeafNodeCheckError, PskError,
    TreeCheckError, TreeError, WelcomeJoinError,
};
pub use extensions::{Extension, ExtensionType};
pub use messages::{GroupInfo, GroupSecrets, KeyPackageRef, NewMember, Welcome};
pub use psk::{PreSharedKeyId, PskLookup};
pub use tree::{LeafIndex, NodeIndex, RatchetTree};
