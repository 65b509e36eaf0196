//! Integration test: pre-shared keys in a Welcome.
//!
//! The committer folds an external PSK (from a TOML store) and a
//! resumption PSK of an earlier epoch into the Welcome key schedule. The
//! joiner resolves both through a chained lookup and only gets in when
//! every PSK resolves to the same secret the committer used.

use canopy_crypto::{CipherSuiteProvider, Secret};
use canopy_integration_tests::{join, Member, TestGroup, CS};
use canopy_mls::psk::{
    ConfiguredPsks, EmptyPskLookup, ExternalPskId, ResumptionPskId, ResumptionPskStore,
};
use canopy_mls::{LeafIndex, PreSharedKeyId, PskError, PskLookup, PskStoreConfig};

const EXTERNAL_ID: &[u8] = b"ops-rotation-2026";

fn psk_config(secret: &[u8]) -> PskStoreConfig {
    let toml = format!(
        "[[psk]]\nid = \"{}\"\nsecret = \"{}\"\n",
        hex::encode(EXTERNAL_ID),
        hex::encode(secret)
    );
    PskStoreConfig::from_toml(&toml).expect("parse PSK store")
}

struct Setup {
    group: TestGroup,
    joiner: LeafIndex,
    psks: Vec<(PreSharedKeyId, Secret)>,
    external_secret: Vec<u8>,
    resumption_secret: Secret,
    resumption_epoch: u64,
}

fn setup() -> Setup {
    let mut group = TestGroup::found(Member::new("alice"));
    group.add(Member::new("bob"));
    group.commit(LeafIndex(0));
    let resumption_epoch = group.context.epoch;
    let resumption_secret = Secret::new(CS.random_bytes(CS.hash_len()));

    let joiner = group.add(Member::new("carol"));
    group.commit(LeafIndex(1));

    let external_secret = CS.random_bytes(CS.hash_len());
    let psks = vec![
        (
            PreSharedKeyId::External(ExternalPskId::new(&CS, EXTERNAL_ID.to_vec())),
            Secret::new(external_secret.clone()),
        ),
        (
            PreSharedKeyId::Resumption(ResumptionPskId::application(
                &CS,
                group.group_id(),
                resumption_epoch,
            )),
            resumption_secret.clone(),
        ),
    ];

    Setup {
        group,
        joiner,
        psks,
        external_secret,
        resumption_secret,
        resumption_epoch,
    }
}

#[tokio::test]
async fn join_with_chained_psk_lookup() {
    let s = setup();
    let welcome = s.group.welcome(LeafIndex(1), &[s.joiner], &s.psks);

    let configured = ConfiguredPsks::from_config(&psk_config(&s.external_secret)).expect("store");
    assert_eq!(configured.len(), 1);
    let mut resumption = ResumptionPskStore::default();
    resumption.insert(s.group.group_id(), s.resumption_epoch, s.resumption_secret.clone());

    let lookup = configured.delegating_to(resumption);
    let (tree, context) = join(&welcome, s.group.member(s.joiner), &lookup)
        .await
        .expect("join with PSKs");
    assert_eq!(tree, s.group.tree);
    assert_eq!(context.epoch, s.group.context.epoch);
}

#[tokio::test]
async fn missing_psk_blocks_join() {
    let s = setup();
    let welcome = s.group.welcome(LeafIndex(1), &[s.joiner], &s.psks);

    // Only the external store: the resumption PSK is unknown.
    let configured = ConfiguredPsks::from_config(&psk_config(&s.external_secret)).expect("store");
    let lookup = configured.delegating_to(EmptyPskLookup);
    let err = join(&welcome, s.group.member(s.joiner), &lookup)
        .await
        .expect_err("resumption PSK missing");
    assert!(matches!(
        err.downcast_ref::<PskError>(),
        Some(PskError::PskNotFound(PreSharedKeyId::Resumption(_)))
    ));
}

#[tokio::test]
async fn wrong_psk_secret_fails_group_info_decryption() {
    let s = setup();
    let welcome = s.group.welcome(LeafIndex(1), &[s.joiner], &s.psks);

    let mut wrong = s.external_secret.clone();
    wrong[0] ^= 0xFF;
    let configured = ConfiguredPsks::from_config(&psk_config(&wrong)).expect("store");
    let mut resumption = ResumptionPskStore::default();
    resumption.insert(s.group.group_id(), s.resumption_epoch, s.resumption_secret.clone());

    let err = join(
        &welcome,
        s.group.member(s.joiner),
        &configured.delegating_to(resumption),
    )
    .await
    .expect_err("wrong external secret");
    assert!(matches!(
        err.downcast_ref::<canopy_mls::WelcomeJoinError>(),
        Some(canopy_mls::WelcomeJoinError::Decrypt(_))
    ));
}

#[tokio::test]
async fn pruned_resumption_epoch_is_not_found() {
    let s = setup();
    let mut resumption = ResumptionPskStore::default();
    resumption.insert(s.group.group_id(), s.resumption_epoch, s.resumption_secret.clone());
    resumption.prune(s.group.group_id(), s.resumption_epoch + 10, 5);

    let (id, _) = &s.psks[1];
    assert!(matches!(
        resumption.resolve(id).await,
        Err(PskError::PskNotFound(_))
    ));
}
