//! Join-time messages: GroupInfo and Welcome.

pub mod group_info;
pub mod welcome;

pub use group_info::{GroupInfo, GROUP_INFO_TBS_LABEL};
pub use welcome::{
    encrypt_group_info, welcome_key_nonce, EncryptedGroupSecrets, GroupSecrets, KeyPackageRef,
    NewMember, Welcome,
};
