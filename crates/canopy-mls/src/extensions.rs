//! Typed extension containers carried by leaves, group contexts and GroupInfo.
//!
//! ```text
//! struct {
//!     ExtensionType extension_type;   // uint16
//!     opaque extension_data<V>;
//! } Extension;
//! ```

use canopy_codec::{read_opaque, write_opaque, Codec, Cursor};
use serde::{Deserialize, Serialize};

use crate::tree::RatchetTree;

/// Registered extension type code points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const APPLICATION_ID: Self = Self(0x0001);
    pub const RATCHET_TREE: Self = Self(0x0002);
    pub const REQUIRED_CAPABILITIES: Self = Self(0x0003);
    pub const EXTERNAL_PUB: Self = Self(0x0004);
    pub const EXTERNAL_SENDERS: Self = Self(0x0005);
}

impl Codec for ExtensionType {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.0.encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self(u16::decode(cursor)?))
    }
}

/// A single extension: a type code and its opaque payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub extension_data: Vec<u8>,
}

impl Extension {
    pub fn new(extension_type: ExtensionType, extension_data: Vec<u8>) -> Self {
        Self {
            extension_type,
            extension_data,
        }
    }

    /// A `ratchet_tree` extension carrying the encoded tree, for GroupInfo.
    pub fn ratchet_tree(tree: &RatchetTree) -> canopy_codec::Result<Self> {
        Ok(Self::new(ExtensionType::RATCHET_TREE, tree.encode_to_vec()?))
    }
}

impl Codec for Extension {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.extension_type.encode(buf)?;
        write_opaque(buf, &self.extension_data)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            extension_type: ExtensionType::decode(cursor)?,
            extension_data: read_opaque(cursor)?,
        })
    }
}

/// First extension of the given type in `extensions`.
pub fn find(extensions: &[Extension], extension_type: ExtensionType) -> Option<&Extension> {
    extensions
        .iter()
        .find(|ext| ext.extension_type == extension_type)
}

/// Decode the ratchet tree carried in `extensions`, if one is present.
pub fn find_ratchet_tree(extensions: &[Extension]) -> Option<canopy_codec::Result<RatchetTree>> {
    find(extensions, ExtensionType::RATCHET_TREE)
        .map(|ext| RatchetTree::decode_exact(&ext.extension_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_encoding() {
        let ext = Extension::new(ExtensionType::APPLICATION_ID, b"app".to_vec());
        let bytes = ext.encode_to_vec().expect("encode");
        assert_eq!(bytes, vec![0x00, 0x01, 3, b'a', b'p', b'p']);
        assert_eq!(Extension::decode_exact(&bytes).expect("decode"), ext);
    }

    #[test]
    fn test_find_by_type() {
        let extensions = vec![
            Extension::new(ExtensionType::APPLICATION_ID, vec![1]),
            Extension::new(ExtensionType::EXTERNAL_PUB, vec![2]),
        ];
        assert_eq!(
            find(&extensions, ExtensionType::EXTERNAL_PUB).map(|e| e.extension_data.clone()),
            Some(vec![2])
        );
        assert!(find(&extensions, ExtensionType::RATCHET_TREE).is_none());
        assert!(find_ratchet_tree(&extensions).is_none());
    }
}
