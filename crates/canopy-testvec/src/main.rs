//! Test vector generator for Canopy.
//!
//! Generates `tests/fixtures/test_vectors.json` covering the tree hash,
//! parent hash chain, transcript hashes, PSK secret and Welcome key
//! schedule. All inputs are fixed, so every run reproduces the same
//! outputs; other implementations of the suite can check against them.
//!
//! Usage:
//!   canopy-testvec              # Generate test_vectors.json
//!   canopy-testvec --verify     # Verify test vectors match expected values

use std::collections::BTreeMap;

use anyhow::Context;
use canopy_codec::Codec;
use canopy_crypto::{
    CipherSuiteProvider, Curve25519ChaChaBlake3, HpkePublicKey, Nonce, Secret, SignaturePublicKey,
};
use canopy_mls::context::{ConfirmedTranscriptHashInput, GroupContext, GroupId, WireFormat};
use canopy_mls::messages::welcome_key_nonce;
use canopy_mls::psk::{psk_secret, ExternalPskId, PreSharedKeyId, ResumptionPskId, ResumptionPskUsage};
use canopy_mls::tree::{Capabilities, Credential, LeafIndex, LeafNode, NodeIndex, RatchetTree};
use canopy_mls::ProtocolVersion;
use serde::{Deserialize, Serialize};

const CS: Curve25519ChaChaBlake3 = Curve25519ChaChaBlake3;
const FIXTURE_PATH: &str = "tests/fixtures/test_vectors.json";

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    cipher_suite: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn fixed_group_id() -> GroupId {
    GroupId::from_bytes([0x01; 16])
}

/// A leaf with deterministic keys derived from `seed`. The signature is a
/// fixed placeholder; hashing does not verify it.
fn fixed_leaf(seed: u8) -> LeafNode {
    let mut leaf = LeafNode::new(
        HpkePublicKey::new(vec![seed; 32]),
        SignaturePublicKey::new(vec![seed ^ 0xFF; 32]),
        Credential::Basic(vec![b'm', seed]),
        Capabilities::for_suite(CS.suite()),
    );
    leaf.signature = vec![seed; 64];
    leaf
}

fn fixed_tree(members: u8) -> anyhow::Result<RatchetTree> {
    let mut tree = RatchetTree::new(fixed_leaf(0));
    for seed in 1..members {
        tree = tree.add_leaf(fixed_leaf(seed))?.0;
    }
    Ok(tree)
}

fn generate_tree_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    for members in [1u8, 3, 4] {
        let tree = fixed_tree(members)?;
        vectors.insert(
            format!("tree_hash_{members}_members"),
            TestVector {
                description: format!(
                    "TreeHash of {members} leaves, leaf i = (enc 0x<i>*32, sig 0x<i^ff>*32)"
                ),
                inputs: BTreeMap::from([(
                    "ratchet_tree".to_string(),
                    hex::encode(tree.encode_to_vec()?),
                )]),
                outputs: BTreeMap::from([(
                    "tree_hash".to_string(),
                    hex::encode(tree.tree_hash(&CS)?),
                )]),
            },
        );
    }

    // Update path from leaf 3 of a 4-member tree.
    let tree = fixed_tree(4)?;
    let path_keys = vec![
        HpkePublicKey::new(vec![0xA5; 32]),
        HpkePublicKey::new(vec![0xA3; 32]),
    ];
    let (committed, leaf_parent_hash) = tree.apply_update_path(&CS, LeafIndex(3), &path_keys)?;
    let node_5 = committed
        .parent_node(NodeIndex(5))
        .context("node 5 installed")?;
    vectors.insert(
        "parent_hash_update_path".to_string(),
        TestVector {
            description: "Parent hashes after leaf 3 of tree_hash_4_members commits keys 0xA5*32 (node 5), 0xA3*32 (node 3)"
                .to_string(),
            inputs: BTreeMap::from([
                ("ratchet_tree".to_string(), hex::encode(tree.encode_to_vec()?)),
                ("node_5_key".to_string(), hex::encode(path_keys[0].as_bytes())),
                ("node_3_key".to_string(), hex::encode(path_keys[1].as_bytes())),
            ]),
            outputs: BTreeMap::from([
                ("node_5_parent_hash".to_string(), hex::encode(&node_5.parent_hash)),
                ("leaf_3_parent_hash".to_string(), hex::encode(leaf_parent_hash)),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_transcript_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let context = GroupContext {
        protocol_version: ProtocolVersion::Mls10,
        cipher_suite: CS.suite(),
        group_id: fixed_group_id(),
        epoch: 0,
        tree_hash: vec![0x11; 32],
        confirmed_transcript_hash: Vec::new(),
        extensions: Vec::new(),
        interim_transcript_hash: vec![0x22; 32],
    };
    let content = b"framed commit content";
    let signature = [0x33u8; 64];
    let confirmation_tag = [0x44u8; 32];

    let confirmed = context.with_confirmed_transcript_hash(
        &CS,
        &ConfirmedTranscriptHashInput {
            wire_format: WireFormat::PublicMessage,
            content,
            signature: &signature,
        },
    )?;
    let interim = confirmed.with_interim_transcript_hash(&CS, &confirmation_tag)?;

    vectors.insert(
        "transcript_hashes".to_string(),
        TestVector {
            description: "Confirmed then interim transcript hash for a PublicMessage commit"
                .to_string(),
            inputs: BTreeMap::from([
                (
                    "interim_transcript_hash_before".to_string(),
                    hex::encode(&context.interim_transcript_hash),
                ),
                ("content".to_string(), hex::encode(content)),
                ("signature".to_string(), hex::encode(signature)),
                ("confirmation_tag".to_string(), hex::encode(confirmation_tag)),
            ]),
            outputs: BTreeMap::from([
                (
                    "confirmed_transcript_hash".to_string(),
                    hex::encode(&interim.confirmed_transcript_hash),
                ),
                (
                    "interim_transcript_hash".to_string(),
                    hex::encode(&interim.interim_transcript_hash),
                ),
                (
                    "group_context".to_string(),
                    hex::encode(interim.encode_to_vec()?),
                ),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_key_schedule_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let psks = vec![
        (
            PreSharedKeyId::External(ExternalPskId {
                psk_id: b"external".to_vec(),
                psk_nonce: Nonce::new(vec![0x55; 32]),
            }),
            Secret::new(vec![0x66; 32]),
        ),
        (
            PreSharedKeyId::Resumption(ResumptionPskId {
                usage: ResumptionPskUsage::Application,
                psk_group_id: fixed_group_id(),
                psk_epoch: 7,
                psk_nonce: Nonce::new(vec![0x77; 32]),
            }),
            Secret::new(vec![0x88; 32]),
        ),
    ];
    let combined = psk_secret(&CS, &psks)?;
    vectors.insert(
        "psk_secret_two_psks".to_string(),
        TestVector {
            description: "psk_secret over one external and one resumption PSK".to_string(),
            inputs: BTreeMap::from([
                (
                    "psk_id_0".to_string(),
                    hex::encode(psks[0].0.encode_to_vec()?),
                ),
                ("psk_0".to_string(), hex::encode(psks[0].1.as_bytes())),
                (
                    "psk_id_1".to_string(),
                    hex::encode(psks[1].0.encode_to_vec()?),
                ),
                ("psk_1".to_string(), hex::encode(psks[1].1.as_bytes())),
            ]),
            outputs: BTreeMap::from([("psk_secret".to_string(), hex::encode(combined.as_bytes()))]),
        },
    );

    let joiner_secret = Secret::new(vec![0x99; 32]);
    let empty_psk = Secret::zero(CS.hash_len());
    let (key, nonce) = welcome_key_nonce(&CS, &joiner_secret, &empty_psk)?;
    vectors.insert(
        "welcome_key_nonce".to_string(),
        TestVector {
            description: "Welcome AEAD key/nonce from joiner 0x99*32 and the all-zero PSK secret"
                .to_string(),
            inputs: BTreeMap::from([
                ("joiner_secret".to_string(), hex::encode(joiner_secret.as_bytes())),
                ("psk_secret".to_string(), hex::encode(empty_psk.as_bytes())),
            ]),
            outputs: BTreeMap::from([
                ("key".to_string(), hex::encode(key.as_bytes())),
                ("nonce".to_string(), hex::encode(nonce.as_bytes())),
            ]),
        },
    );

    Ok(vectors)
}

fn generate_all_vectors() -> anyhow::Result<TestVectors> {
    let mut all_vectors = BTreeMap::new();

    all_vectors.extend(generate_tree_vectors()?);
    all_vectors.extend(generate_transcript_vectors()?);
    all_vectors.extend(generate_key_schedule_vectors()?);

    Ok(TestVectors {
        version: "1.0".to_string(),
        generated_by: "canopy-testvec".to_string(),
        cipher_suite: format!("{:#06x}", CS.suite().code()),
        vectors: all_vectors,
    })
}

fn verify_vectors(vectors: &TestVectors) -> anyhow::Result<bool> {
    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => {
                tracing::info!(vector = %name, "PASS");
            }
            Some(actual) => {
                tracing::error!(
                    vector = %name,
                    expected = ?expected.outputs,
                    actual = ?actual.outputs,
                    "FAIL"
                );
                all_pass = false;
            }
            None => {
                tracing::error!(vector = %name, "MISSING");
                all_pass = false;
            }
        }
    }

    Ok(all_pass)
}

fn write_vectors(vectors: &TestVectors) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(vectors)?;
    if let Some(parent) = std::path::Path::new(FIXTURE_PATH).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(FIXTURE_PATH, json)
        .with_context(|| format!("writing {FIXTURE_PATH}"))?;
    tracing::info!(count = vectors.vectors.len(), path = FIXTURE_PATH, "generated test vectors");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("canopy=info".parse()?),
        )
        .init();

    let verify = std::env::args().any(|a| a == "--verify");

    let vectors = if verify {
        match std::fs::read_to_string(FIXTURE_PATH) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("parsing {FIXTURE_PATH}"))?,
            Err(_) => {
                tracing::warn!(path = FIXTURE_PATH, "no existing test vectors, generating");
                let vectors = generate_all_vectors()?;
                write_vectors(&vectors)?;
                vectors
            }
        }
    } else {
        let vectors = generate_all_vectors()?;
        write_vectors(&vectors)?;
        vectors
    };

    if verify_vectors(&vectors)? {
        tracing::info!("test vector verification passed");
        Ok(())
    } else {
        anyhow::bail!("test vector verification failed")
    }
}
