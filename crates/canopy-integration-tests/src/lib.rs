//! Integration test crate for Canopy.
//!
//! The library half is a small in-memory group driver shared by the tests
//! under `tests/`. It holds every member's private keys, so one test can
//! play committer and joiner alike without any transport.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p canopy-integration-tests
//! ```

use anyhow::Context;
use canopy_codec::Codec;
use canopy_crypto::{
    CipherSuiteProvider, Curve25519ChaChaBlake3, HpkeKeyPair, HpkePublicKey, Secret,
    SignaturePrivateKey,
};
use canopy_mls::context::ConfirmedTranscriptHashInput;
use canopy_mls::extensions::find_ratchet_tree;
use canopy_mls::psk::{psk_secret, resolve_psk_secret};
use canopy_mls::tree::{
    check, Capabilities, Credential, LeafNode, LeafNodeSource, SignatureLeafValidator,
};
use canopy_mls::{
    EpochState, Extension, GroupContext, GroupId, GroupInfo, GroupSettings, KeyPackageRef,
    KeySchedule, LeafIndex, NewMember, PreSharedKeyId, PskLookup, RatchetTree, TreeCheckError,
    Welcome, WireFormat,
};

pub const CS: Curve25519ChaChaBlake3 = Curve25519ChaChaBlake3;

/// Label the driver signs commit content under.
const COMMIT_CONTENT_LABEL: &str = "FramedContentTBS";

/// A participant with all of its private keys.
pub struct Member {
    pub signer: SignaturePrivateKey,
    pub init_key_pair: HpkeKeyPair,
    pub key_package_ref: KeyPackageRef,
    pub leaf: LeafNode,
}

impl Member {
    pub fn new(name: &str) -> Self {
        let (signer, signature_key) = CS.generate_signature_key_pair();
        let init_key_pair = CS.generate_hpke_key_pair();
        let leaf = LeafNode::new(
            CS.generate_hpke_key_pair().public_key,
            signature_key,
            Credential::Basic(name.as_bytes().to_vec()),
            Capabilities::for_suite(CS.suite()),
        )
        .sign_key_package(&CS, &signer)
        .expect("sign key package leaf");

        // The signed leaf plus init key stands in for a key package.
        let mut key_package = leaf.encode_to_vec().expect("encode leaf");
        init_key_pair
            .public_key
            .encode(&mut key_package)
            .expect("encode init key");
        let key_package_ref =
            KeyPackageRef::from_key_package_bytes(&CS, &key_package).expect("ref hash");

        Self {
            signer,
            init_key_pair,
            key_package_ref,
            leaf,
        }
    }

    fn sign_leaf(&mut self, group_id: &GroupId, index: LeafIndex) {
        self.leaf = self
            .leaf
            .clone()
            .sign(&CS, &self.signer, group_id, index)
            .expect("sign leaf");
    }
}

/// Random epoch secrets standing in for the key schedule.
pub struct RandomSchedule {
    confirmation_key: Secret,
    joiner_secret: Secret,
}

impl RandomSchedule {
    pub fn new() -> Self {
        Self {
            confirmation_key: Secret::new(CS.random_bytes(CS.hash_len())),
            joiner_secret: Secret::new(CS.random_bytes(CS.hash_len())),
        }
    }
}

impl Default for RandomSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySchedule for RandomSchedule {
    fn confirmation_key(&self) -> &Secret {
        &self.confirmation_key
    }

    fn joiner_secret(&self) -> &Secret {
        &self.joiner_secret
    }
}

/// One group as seen by an omniscient committer.
pub struct TestGroup {
    pub settings: GroupSettings,
    pub tree: RatchetTree,
    pub context: GroupContext,
    pub confirmation_tag: Vec<u8>,
    pub members: Vec<Option<Member>>,
}

impl TestGroup {
    /// Create a group at epoch 0 with `founder`'s key-package leaf at
    /// leaf 0.
    pub fn found(founder: Member) -> Self {
        let tree = RatchetTree::new(founder.leaf.clone());
        let context = GroupContext::new(&CS, &RandomSchedule::new(), &tree, Vec::new())
            .expect("group context");
        let settings = context.settings(5, false);

        Self {
            settings,
            tree,
            context,
            confirmation_tag: Vec::new(),
            members: vec![Some(founder)],
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.settings.group_id
    }

    pub fn member(&self, leaf: LeafIndex) -> &Member {
        self.members
            .get(leaf.0 as usize)
            .and_then(Option::as_ref)
            .expect("member at leaf")
    }

    /// Stage an add of `member`'s key-package leaf. Takes effect in the
    /// tree at once; the context follows at the next commit.
    pub fn add(&mut self, member: Member) -> LeafIndex {
        let (tree, index) = self.tree.add_leaf(member.leaf.clone()).expect("add leaf");
        self.tree = tree;

        let slot = index.0 as usize;
        if self.members.len() <= slot {
            self.members.resize_with(slot + 1, || None);
        }
        self.members[slot] = Some(member);
        index
    }

    /// Stage a removal.
    pub fn remove(&mut self, leaf: LeafIndex) -> Member {
        self.tree = self.tree.remove_leaf(leaf).expect("remove leaf");
        self.members
            .get_mut(leaf.0 as usize)
            .and_then(Option::take)
            .expect("removed member")
    }

    /// Commit with a fresh update path from `sender`.
    pub fn commit(&mut self, sender: LeafIndex) {
        let path_keys: Vec<HpkePublicKey> = self
            .tree
            .direct_path(sender)
            .iter()
            .map(|_| CS.generate_hpke_key_pair().public_key)
            .collect();
        let (tree, parent_hash) = self
            .tree
            .apply_update_path(&CS, sender, &path_keys)
            .expect("update path");

        let group_id = self.settings.group_id;
        let member = self
            .members
            .get_mut(sender.0 as usize)
            .and_then(Option::as_mut)
            .expect("sender");
        member.leaf.encryption_key = CS.generate_hpke_key_pair().public_key;
        member.leaf.source = LeafNodeSource::Commit(parent_hash);
        member.sign_leaf(&group_id, sender);
        self.tree = tree
            .with_leaf(sender, member.leaf.clone())
            .expect("install sender leaf");

        self.advance(sender);
    }

    /// Commit staged adds and removes without a path.
    pub fn commit_without_path(&mut self, sender: LeafIndex) {
        self.advance(sender);
    }

    fn advance(&mut self, sender: LeafIndex) {
        let provisional = self.context.provisional(&CS, &self.tree).expect("provisional");

        let mut content = provisional.epoch.to_be_bytes().to_vec();
        content.extend_from_slice(&provisional.tree_hash);
        let signature = CS
            .sign_with_label(&self.member(sender).signer, COMMIT_CONTENT_LABEL, &content)
            .expect("sign commit");

        let confirmed = provisional
            .with_confirmed_transcript_hash(
                &CS,
                &ConfirmedTranscriptHashInput {
                    wire_format: WireFormat::PublicMessage,
                    content: &content,
                    signature: &signature,
                },
            )
            .expect("confirmed transcript hash");

        let confirmation_key = Secret::new(CS.random_bytes(CS.hash_len()));
        let confirmation_tag = CS.mac(&confirmation_key, &confirmed.confirmed_transcript_hash);
        self.context = confirmed
            .with_interim_transcript_hash(&CS, &confirmation_tag)
            .expect("interim transcript hash");
        self.confirmation_tag = confirmation_tag;

        tracing::debug!(
            epoch = self.context.epoch,
            members = self.tree.member_count(),
            "test group advanced"
        );
    }

    pub fn check(&self) -> Result<(), TreeCheckError> {
        check(&self.tree, &CS, &self.context, &SignatureLeafValidator)
    }

    /// Snapshot of the current epoch for persistence.
    pub fn epoch_state(&self) -> EpochState {
        EpochState {
            epoch: self.context.epoch,
            tree: self.tree.clone(),
            confirmed_transcript_hash: self.context.confirmed_transcript_hash.clone(),
            interim_transcript_hash: self.context.interim_transcript_hash.clone(),
            extensions: self.context.extensions.clone(),
        }
    }

    /// A signed GroupInfo for the current epoch carrying `tree`.
    pub fn group_info_with_tree(&self, signer: LeafIndex, tree: &RatchetTree) -> GroupInfo {
        GroupInfo::create(
            &CS,
            self.context.clone(),
            self.confirmation_tag.clone(),
            vec![Extension::ratchet_tree(tree).expect("ratchet tree extension")],
            signer,
            &self.member(signer).signer,
        )
        .expect("sign group info")
    }

    /// Welcome the members at `joiners` into the current epoch.
    pub fn welcome(
        &self,
        signer: LeafIndex,
        joiners: &[LeafIndex],
        psks: &[(PreSharedKeyId, Secret)],
    ) -> Welcome {
        self.welcome_with_group_info(&self.group_info_with_tree(signer, &self.tree), joiners, psks)
    }

    pub fn welcome_with_group_info(
        &self,
        group_info: &GroupInfo,
        joiners: &[LeafIndex],
        psks: &[(PreSharedKeyId, Secret)],
    ) -> Welcome {
        let new_members: Vec<NewMember> = joiners
            .iter()
            .map(|leaf| {
                let member = self.member(*leaf);
                NewMember {
                    key_package_ref: member.key_package_ref.clone(),
                    init_key: member.init_key_pair.public_key.clone(),
                    path_secret: None,
                }
            })
            .collect();

        let joiner_secret = Secret::new(CS.random_bytes(CS.hash_len()));
        let psk_secret = psk_secret(&CS, psks).expect("psk secret");
        let psk_ids: Vec<PreSharedKeyId> = psks.iter().map(|(id, _)| id.clone()).collect();

        Welcome::create(
            &CS,
            group_info,
            &joiner_secret,
            &psk_secret,
            &psk_ids,
            &new_members,
        )
        .expect("create welcome")
    }
}

/// Process a Welcome as `joiner`: open the group secrets, resolve PSKs,
/// decrypt and verify the GroupInfo, then check the carried tree against
/// the GroupInfo's context.
pub async fn join<L: PskLookup>(
    welcome: &Welcome,
    joiner: &Member,
    psks: &L,
) -> anyhow::Result<(RatchetTree, GroupContext)> {
    let secrets = welcome.decrypt_group_secrets(&CS, &joiner.key_package_ref, &joiner.init_key_pair)?;
    let psk_secret = resolve_psk_secret(&CS, psks, &secrets.psks).await?;
    let group_info = welcome.decrypt_group_info(&CS, &secrets.joiner_secret, &psk_secret)?;

    let tree = find_ratchet_tree(&group_info.extensions)
        .context("group info carries no ratchet tree")??;
    group_info.verify_signature(&CS, &tree)?;
    check(&tree, &CS, &group_info.group_context, &SignatureLeafValidator)?;

    Ok((tree, group_info.group_context))
}
