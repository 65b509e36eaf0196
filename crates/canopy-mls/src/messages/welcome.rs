//! Welcome: the per-joiner secret bundle plus the shared encrypted GroupInfo.
//!
//! ```text
//! struct {
//!     opaque joiner_secret<V>;
//!     optional<PathSecret> path_secret;
//!     PreSharedKeyID psks<V>;
//! } GroupSecrets;
//!
//! struct {
//!     KeyPackageRef new_member;
//!     HPKECiphertext encrypted_group_secrets;
//! } EncryptedGroupSecrets;
//!
//! struct {
//!     CipherSuite cipher_suite;
//!     EncryptedGroupSecrets secrets<V>;
//!     opaque encrypted_group_info<V>;
//! } Welcome;
//! ```
//!
//! GroupSecrets are sealed with label `"Welcome"` and the encrypted GroupInfo
//! bytes as context, tying each bundle to that exact ciphertext. The GroupInfo
//! is encrypted once for everyone under a key derived from
//!
//! ```text
//! welcome_secret = DeriveSecret(Extract(joiner_secret, psk_secret), "welcome")
//! ```

use canopy_codec::{read_opaque, write_opaque, Codec, Cursor};
use canopy_crypto::{
    CipherSuite, CipherSuiteProvider, CryptoError, HpkeCiphertext, HpkeKeyPair, HpkePublicKey,
    Nonce, Secret,
};

use crate::error::WelcomeJoinError;
use crate::messages::group_info::GroupInfo;
use crate::psk::PreSharedKeyId;

pub const WELCOME_LABEL: &str = "Welcome";
pub const WELCOME_SECRET_LABEL: &str = "welcome";
pub const KEY_LABEL: &str = "key";
pub const NONCE_LABEL: &str = "nonce";
pub const KEY_PACKAGE_REF_LABEL: &str = "MLS 1.0 KeyPackage Reference";

/// Hash reference to a key package.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPackageRef(Vec<u8>);

impl KeyPackageRef {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// `RefHash("MLS 1.0 KeyPackage Reference", key_package)`.
    pub fn from_key_package_bytes<C: CipherSuiteProvider>(
        cs: &C,
        key_package: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Self(cs.ref_hash(KEY_PACKAGE_REF_LABEL, key_package)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Codec for KeyPackageRef {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        write_opaque(buf, &self.0)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self(read_opaque(cursor)?))
    }
}

/// Secrets one joiner needs to enter the epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSecrets {
    pub joiner_secret: Secret,
    pub path_secret: Option<Secret>,
    pub psks: Vec<PreSharedKeyId>,
}

impl GroupSecrets {
    /// Seal for the member behind `key_package_ref`, bound to
    /// `encrypted_group_info`.
    pub fn encrypt<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        key_package_ref: &KeyPackageRef,
        init_key: &HpkePublicKey,
        encrypted_group_info: &[u8],
    ) -> Result<EncryptedGroupSecrets, CryptoError> {
        let plaintext = self.encode_to_vec()?;
        let encrypted_group_secrets =
            cs.seal_with_label(init_key, WELCOME_LABEL, encrypted_group_info, &plaintext)?;
        Ok(EncryptedGroupSecrets {
            new_member: key_package_ref.clone(),
            encrypted_group_secrets,
        })
    }
}

impl Codec for GroupSecrets {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.joiner_secret.encode(buf)?;
        self.path_secret.encode(buf)?;
        self.psks.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            joiner_secret: Secret::decode(cursor)?,
            path_secret: Option::decode(cursor)?,
            psks: Vec::decode(cursor)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedGroupSecrets {
    pub new_member: KeyPackageRef,
    pub encrypted_group_secrets: HpkeCiphertext,
}

impl Codec for EncryptedGroupSecrets {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.new_member.encode(buf)?;
        self.encrypted_group_secrets.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            new_member: KeyPackageRef::decode(cursor)?,
            encrypted_group_secrets: HpkeCiphertext::decode(cursor)?,
        })
    }
}

/// A member being welcomed by a commit.
#[derive(Clone, Debug)]
pub struct NewMember {
    pub key_package_ref: KeyPackageRef,
    pub init_key: HpkePublicKey,
    /// Path secret of the lowest common ancestor with the committer, if
    /// the commit carried a path.
    pub path_secret: Option<Secret>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Welcome {
    pub cipher_suite: CipherSuite,
    pub secrets: Vec<EncryptedGroupSecrets>,
    pub encrypted_group_info: Vec<u8>,
}

impl Welcome {
    /// Build a Welcome for `new_members`: encrypt `group_info` once, then
    /// seal each member's GroupSecrets against that ciphertext.
    pub fn create<C: CipherSuiteProvider>(
        cs: &C,
        group_info: &GroupInfo,
        joiner_secret: &Secret,
        psk_secret: &Secret,
        psk_ids: &[PreSharedKeyId],
        new_members: &[NewMember],
    ) -> Result<Self, CryptoError> {
        let encrypted_group_info = encrypt_group_info(cs, group_info, joiner_secret, psk_secret)?;

        let secrets = new_members
            .iter()
            .map(|member| {
                GroupSecrets {
                    joiner_secret: joiner_secret.clone(),
                    path_secret: member.path_secret.clone(),
                    psks: psk_ids.to_vec(),
                }
                .encrypt(
                    cs,
                    &member.key_package_ref,
                    &member.init_key,
                    &encrypted_group_info,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            group_id = %group_info.group_context.group_id,
            epoch = group_info.group_context.epoch,
            new_members = secrets.len(),
            "created welcome"
        );
        Ok(Self {
            cipher_suite: cs.suite(),
            secrets,
            encrypted_group_info,
        })
    }

    fn check_suite<C: CipherSuiteProvider>(&self, cs: &C) -> Result<(), WelcomeJoinError> {
        if self.cipher_suite != cs.suite() {
            return Err(WelcomeJoinError::CipherSuiteMismatch {
                expected: cs.suite(),
                actual: self.cipher_suite,
            });
        }
        Ok(())
    }

    /// Open the GroupSecrets addressed to `key_package_ref`.
    ///
    /// # Errors
    ///
    /// - [`WelcomeJoinError::WelcomeNotForYou`] if no entry names our key package
    /// - [`WelcomeJoinError::Decrypt`] if the entry does not open under `init_key_pair`
    /// - [`WelcomeJoinError::Decode`] if the opened bytes are not GroupSecrets
    pub fn decrypt_group_secrets<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        key_package_ref: &KeyPackageRef,
        init_key_pair: &HpkeKeyPair,
    ) -> Result<GroupSecrets, WelcomeJoinError> {
        self.check_suite(cs)?;

        let entry = self
            .secrets
            .iter()
            .find(|s| s.new_member == *key_package_ref)
            .ok_or_else(|| {
                tracing::warn!(
                    key_package_ref = hex::encode(key_package_ref.as_bytes()),
                    entries = self.secrets.len(),
                    "welcome not for this key package"
                );
                WelcomeJoinError::WelcomeNotForYou
            })?;

        let plaintext = cs.open_with_label_key_pair(
            init_key_pair,
            WELCOME_LABEL,
            &self.encrypted_group_info,
            &entry.encrypted_group_secrets,
        )?;
        Ok(GroupSecrets::decode_exact(&plaintext)?)
    }

    /// Decrypt the shared GroupInfo. Its signature is not checked here.
    pub fn decrypt_group_info<C: CipherSuiteProvider>(
        &self,
        cs: &C,
        joiner_secret: &Secret,
        psk_secret: &Secret,
    ) -> Result<GroupInfo, WelcomeJoinError> {
        self.check_suite(cs)?;

        let (key, nonce) = welcome_key_nonce(cs, joiner_secret, psk_secret)?;
        let plaintext = cs.decrypt_aead(&key, &nonce, &[], &self.encrypted_group_info)?;
        Ok(GroupInfo::decode_exact(&plaintext)?)
    }
}

impl Codec for Welcome {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.cipher_suite.encode(buf)?;
        self.secrets.encode(buf)?;
        write_opaque(buf, &self.encrypted_group_info)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            cipher_suite: CipherSuite::decode(cursor)?,
            secrets: Vec::decode(cursor)?,
            encrypted_group_info: read_opaque(cursor)?,
        })
    }
}

fn length(len: usize) -> Result<u16, CryptoError> {
    u16::try_from(len).map_err(|_| CryptoError::InvalidInput(format!("length {len} exceeds u16")))
}

/// AEAD key and nonce protecting the GroupInfo in a Welcome.
pub fn welcome_key_nonce<C: CipherSuiteProvider>(
    cs: &C,
    joiner_secret: &Secret,
    psk_secret: &Secret,
) -> Result<(Secret, Nonce), CryptoError> {
    let extracted = cs.extract(joiner_secret, psk_secret);
    let welcome_secret = cs.derive_secret(&extracted, WELCOME_SECRET_LABEL)?;
    let key = cs.expand_with_label(&welcome_secret, KEY_LABEL, &[], length(cs.key_len())?)?;
    let nonce = cs.expand_with_label(&welcome_secret, NONCE_LABEL, &[], length(cs.nonce_len())?)?;
    Ok((key, Nonce::new(nonce.as_bytes().to_vec())))
}

/// Encrypt `group_info` under the welcome key, with empty AAD.
pub fn encrypt_group_info<C: CipherSuiteProvider>(
    cs: &C,
    group_info: &GroupInfo,
    joiner_secret: &Secret,
    psk_secret: &Secret,
) -> Result<Vec<u8>, CryptoError> {
    let (key, nonce) = welcome_key_nonce(cs, joiner_secret, psk_secret)?;
    cs.encrypt_aead(&key, &nonce, &[], &group_info.encode_to_vec()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GroupContext, GroupId, ProtocolVersion};
    use crate::psk::{ExternalPskId, ResumptionPskId};
    use crate::tree::tests::{tree_of, Member, CS};
    use crate::tree::LeafIndex;

    fn group_info() -> (GroupInfo, Vec<Member>) {
        let group_id = GroupId::generate();
        let (tree, members) = tree_of(&["a", "b"]);
        let context = GroupContext {
            protocol_version: ProtocolVersion::Mls10,
            cipher_suite: CS.suite(),
            group_id,
            epoch: 1,
            tree_hash: tree.tree_hash(&CS).expect("hash"),
            confirmed_transcript_hash: vec![3; 32],
            extensions: Vec::new(),
            interim_transcript_hash: Vec::new(),
        };
        let group_info = GroupInfo::create(
            &CS,
            context,
            vec![4; 32],
            Vec::new(),
            LeafIndex(0),
            &members[0].signer,
        )
        .expect("sign");
        (group_info, members)
    }

    fn joiner(name: &str) -> (KeyPackageRef, HpkeKeyPair) {
        let key_pair = CS.generate_hpke_key_pair();
        let key_package_ref =
            KeyPackageRef::from_key_package_bytes(&CS, name.as_bytes()).expect("ref");
        (key_package_ref, key_pair)
    }

    #[test]
    fn test_group_secrets_for_member() {
        let (m_ref, m_keys) = joiner("m");
        let (_, other_keys) = joiner("other");
        let secrets = GroupSecrets {
            joiner_secret: Secret::new(vec![0x5A; 32]),
            path_secret: None,
            psks: Vec::new(),
        };
        let encrypted_group_info = b"encrypted group info".to_vec();
        let welcome = Welcome {
            cipher_suite: CS.suite(),
            secrets: vec![secrets
                .encrypt(&CS, &m_ref, &m_keys.public_key, &encrypted_group_info)
                .expect("encrypt")],
            encrypted_group_info,
        };

        let opened = welcome
            .decrypt_group_secrets(&CS, &m_ref, &m_keys)
            .expect("decrypt");
        assert_eq!(opened.joiner_secret.as_bytes(), &[0x5A; 32]);

        let (other_ref, _) = joiner("other");
        assert!(matches!(
            welcome.decrypt_group_secrets(&CS, &other_ref, &other_keys),
            Err(WelcomeJoinError::WelcomeNotForYou)
        ));
        // Right entry, wrong key.
        assert!(matches!(
            welcome.decrypt_group_secrets(&CS, &m_ref, &other_keys),
            Err(WelcomeJoinError::Decrypt(_))
        ));
    }

    #[test]
    fn test_group_secrets_bound_to_group_info_ciphertext() {
        let (m_ref, m_keys) = joiner("m");
        let secrets = GroupSecrets {
            joiner_secret: Secret::new(vec![1; 32]),
            path_secret: Some(Secret::new(vec![2; 32])),
            psks: Vec::new(),
        };
        let entry = secrets
            .encrypt(&CS, &m_ref, &m_keys.public_key, b"original")
            .expect("encrypt");
        let swapped = Welcome {
            cipher_suite: CS.suite(),
            secrets: vec![entry],
            encrypted_group_info: b"swapped".to_vec(),
        };
        assert!(matches!(
            swapped.decrypt_group_secrets(&CS, &m_ref, &m_keys),
            Err(WelcomeJoinError::Decrypt(_))
        ));
    }

    #[test]
    fn test_group_info_roundtrip_with_empty_psk() {
        let (group_info, _) = group_info();
        let joiner_secret = Secret::new(vec![0x11; 32]);
        let psk_secret = Secret::zero(32);

        let welcome = Welcome {
            cipher_suite: CS.suite(),
            secrets: Vec::new(),
            encrypted_group_info: encrypt_group_info(&CS, &group_info, &joiner_secret, &psk_secret)
                .expect("encrypt"),
        };
        let decrypted = welcome
            .decrypt_group_info(&CS, &joiner_secret, &psk_secret)
            .expect("decrypt");
        assert_eq!(
            decrypted.encode_to_vec().expect("encode"),
            group_info.encode_to_vec().expect("encode")
        );

        assert!(matches!(
            welcome.decrypt_group_info(&CS, &Secret::new(vec![0x12; 32]), &psk_secret),
            Err(WelcomeJoinError::Decrypt(CryptoError::AeadDecryption))
        ));
    }

    #[test]
    fn test_welcome_key_nonce_derivation() {
        let joiner_secret = Secret::new(vec![0x11; 32]);
        let psk_secret = Secret::zero(32);
        let (key, nonce) = welcome_key_nonce(&CS, &joiner_secret, &psk_secret).expect("derive");

        let welcome_secret = CS
            .derive_secret(&CS.extract(&joiner_secret, &psk_secret), "welcome")
            .expect("derive");
        assert_eq!(
            key,
            CS.expand_with_label(&welcome_secret, "key", &[], 32).expect("key")
        );
        assert_eq!(nonce.len(), CS.nonce_len());
        assert_eq!(
            nonce.as_bytes(),
            CS.expand_with_label(&welcome_secret, "nonce", &[], 12)
                .expect("nonce")
                .as_bytes()
        );
    }

    #[test]
    fn test_create_for_several_members() {
        let (group_info, _) = group_info();
        let joiner_secret = Secret::new(vec![0x21; 32]);
        let psk_secret = Secret::new(vec![0x22; 32]);
        let psk_ids = vec![
            PreSharedKeyId::External(ExternalPskId::new(&CS, b"ext".to_vec())),
            PreSharedKeyId::Resumption(ResumptionPskId::application(
                &CS,
                group_info.group_context.group_id,
                0,
            )),
        ];
        let (a_ref, a_keys) = joiner("a");
        let (b_ref, b_keys) = joiner("b");
        let new_members = vec![
            NewMember {
                key_package_ref: a_ref.clone(),
                init_key: a_keys.public_key.clone(),
                path_secret: Some(Secret::new(vec![0x31; 32])),
            },
            NewMember {
                key_package_ref: b_ref.clone(),
                init_key: b_keys.public_key.clone(),
                path_secret: None,
            },
        ];

        let welcome = Welcome::create(
            &CS,
            &group_info,
            &joiner_secret,
            &psk_secret,
            &psk_ids,
            &new_members,
        )
        .expect("welcome");
        let welcome = Welcome::decode_exact(&welcome.encode_to_vec().expect("encode"))
            .expect("decode");

        let a = welcome.decrypt_group_secrets(&CS, &a_ref, &a_keys).expect("a");
        let b = welcome.decrypt_group_secrets(&CS, &b_ref, &b_keys).expect("b");
        assert_eq!(a.path_secret, Some(Secret::new(vec![0x31; 32])));
        assert_eq!(b.path_secret, None);
        assert_eq!(a.psks, psk_ids);
        assert_eq!(b.joiner_secret, joiner_secret);

        let decrypted = welcome
            .decrypt_group_info(&CS, &a.joiner_secret, &psk_secret)
            .expect("group info");
        assert_eq!(decrypted.to_be_signed().expect("tbs"), group_info.to_be_signed().expect("tbs"));
    }

    #[test]
    fn test_group_secrets_encoding_roundtrip() {
        let secrets = GroupSecrets {
            joiner_secret: Secret::new(vec![1; 32]),
            path_secret: Some(Secret::new(vec![2; 32])),
            psks: vec![PreSharedKeyId::External(ExternalPskId::new(&CS, b"x".to_vec()))],
        };
        assert_eq!(
            GroupSecrets::decode_exact(&secrets.encode_to_vec().expect("encode")).expect("decode"),
            secrets
        );
    }

    #[test]
    fn test_key_package_ref_label() {
        let reference = KeyPackageRef::from_key_package_bytes(&CS, b"kp").expect("ref");
        let mut input = Vec::new();
        write_opaque(&mut input, b"MLS 1.0 KeyPackage Reference").expect("encode");
        write_opaque(&mut input, b"kp").expect("encode");
        assert_eq!(reference.as_bytes(), CS.hash(&input).as_slice());
    }
}
