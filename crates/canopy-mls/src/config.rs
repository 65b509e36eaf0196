//! Group settings and PSK store configuration, loaded from TOML.
//!
//! ```toml
//! protocol_version = "Mls10"
//! cipher_suite = "X25519ChaCha20Poly1305Blake3Ed25519"
//! group_id = "01928f6e-5b9c-7d3e-8a41-0c2b9e7f1a23"
//! keep_past_epochs = 5
//! public = false
//! ```
//!
//! ```toml
//! [[psk]]
//! id = "65787465726e616c"
//! secret = "00112233445566778899aabbccddeeff"
//! ```

use std::path::Path;

use canopy_crypto::CipherSuite;
use serde::{Deserialize, Serialize};

use crate::context::{GroupId, ProtocolVersion};
use crate::error::ConfigError;

/// Per-group settings persisted alongside the group's epochs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub group_id: GroupId,
    /// How many past epochs an epoch cache keeps for late messages.
    #[serde(default = "default_keep_past_epochs")]
    pub keep_past_epochs: u32,
    /// Whether GroupInfo for this group may be published for external joins.
    #[serde(default)]
    pub public: bool,
}

fn default_keep_past_epochs() -> u32 {
    5
}

impl GroupSettings {
    pub fn new(cipher_suite: CipherSuite, group_id: GroupId) -> Self {
        Self {
            protocol_version: ProtocolVersion::Mls10,
            cipher_suite,
            group_id,
            keep_past_epochs: default_keep_past_epochs(),
            public: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

/// Externally configured PSKs, hex-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PskStoreConfig {
    #[serde(default)]
    pub psk: Vec<PskEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PskEntry {
    /// Hex-encoded PSK id.
    pub id: String,
    /// Hex-encoded secret.
    pub secret: String,
}

impl PskStoreConfig {
    /// Load from `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Decoded `(id, secret)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHex`] for a malformed entry and
    /// [`ConfigError::DuplicatePsk`] if two entries share an id.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConfigError> {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(self.psk.len());
        for entry in &self.psk {
            let id = hex::decode(&entry.id)
                .map_err(|source| ConfigError::InvalidHex { field: "id", source })?;
            let secret = hex::decode(&entry.secret)
                .map_err(|source| ConfigError::InvalidHex {
                    field: "secret",
                    source,
                })?;
            if entries.iter().any(|(existing, _)| *existing == id) {
                return Err(ConfigError::DuplicatePsk(entry.id.clone()));
            }
            entries.push((id, secret));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: CipherSuite = CipherSuite::X25519ChaCha20Poly1305Blake3Ed25519;

    #[test]
    fn test_settings_defaults() {
        let group_id = GroupId::generate();
        let content = format!(
            "cipher_suite = \"X25519ChaCha20Poly1305Blake3Ed25519\"\ngroup_id = \"{group_id}\"\n"
        );
        let settings = GroupSettings::from_toml(&content).expect("parse");
        assert_eq!(settings, GroupSettings::new(SUITE, group_id));
        assert_eq!(settings.keep_past_epochs, 5);
        assert!(!settings.public);
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = GroupSettings::new(SUITE, GroupId::generate());
        settings.public = true;
        settings.keep_past_epochs = 2;
        let toml_str = settings.to_toml().expect("serialize");
        assert_eq!(GroupSettings::from_toml(&toml_str).expect("parse"), settings);
    }

    #[test]
    fn test_settings_json_uses_uuid_string() {
        let settings = GroupSettings::new(SUITE, GroupId::generate());
        let json = serde_json::to_value(&settings).expect("serialize");
        assert_eq!(json["group_id"], settings.group_id.to_string());
        let restored: GroupSettings = serde_json::from_value(json).expect("deserialize");
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_settings_load_from_file() {
        let settings = GroupSettings::new(SUITE, GroupId::generate());
        let path = std::env::temp_dir().join(format!("canopy-settings-{}.toml", settings.group_id));
        std::fs::write(&path, settings.to_toml().expect("serialize")).expect("write");
        let loaded = GroupSettings::load(&path).expect("load");
        std::fs::remove_file(&path).expect("cleanup");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_settings_missing_field() {
        assert!(matches!(
            GroupSettings::from_toml("keep_past_epochs = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_psk_entries() {
        let config = PskStoreConfig::from_toml(
            "[[psk]]\nid = \"0102\"\nsecret = \"aabbcc\"\n\n[[psk]]\nid = \"03\"\nsecret = \"dd\"\n",
        )
        .expect("parse");
        assert_eq!(
            config.entries().expect("entries"),
            vec![
                (vec![1, 2], vec![0xaa, 0xbb, 0xcc]),
                (vec![3], vec![0xdd]),
            ]
        );
    }

    #[test]
    fn test_psk_entries_reject_bad_hex() {
        let config = PskStoreConfig {
            psk: vec![PskEntry {
                id: "01".into(),
                secret: "zz".into(),
            }],
        };
        assert!(matches!(
            config.entries(),
            Err(ConfigError::InvalidHex { field: "secret", .. })
        ));
    }

    #[test]
    fn test_psk_entries_reject_duplicates() {
        let entry = PskEntry {
            id: "01".into(),
            secret: "02".into(),
        };
        let config = PskStoreConfig {
            psk: vec![entry.clone(), entry],
        };
        assert!(matches!(config.entries(), Err(ConfigError::DuplicatePsk(id)) if id == "01"));
    }

    #[test]
    fn test_psk_store_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!("canopy-psks-{}.toml", GroupId::generate()));
        assert_eq!(PskStoreConfig::load(&path).expect("load"), PskStoreConfig::default());
    }
}
