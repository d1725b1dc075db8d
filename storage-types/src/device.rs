// SPDX-License-Identifier: GPL-3.0-only

//! Device catalog model
//!
//! A `Device` is exclusively owned by the registry. Everything outside the
//! registry receives clones (snapshots), never a handle that can mutate the
//! catalog.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Vault,
    Block,
    NetworkShare,
    AppEntry,
}

impl DeviceKind {
    /// URL scheme used for device-entry URLs of this kind
    pub fn scheme(self) -> &'static str {
        match self {
            DeviceKind::Vault => "vault",
            DeviceKind::Block => "block",
            DeviceKind::NetworkShare => "network-share",
            DeviceKind::AppEntry => "app-entry",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    #[default]
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

impl MountState {
    pub fn is_transitional(self) -> bool {
        matches!(self, MountState::Mounting | MountState::Unmounting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    // === Identity ===
    pub id: String,
    pub kind: DeviceKind,

    /// Label or share name, before any user alias is applied
    pub label: String,

    /// Name to show: the user alias when one exists, else `label`
    pub display_name: String,

    // === Mount state ===
    pub mount_state: MountState,

    /// Present only while `mount_state` is `Mounted`
    pub mount_point: Option<String>,

    // === Block classification ===
    pub encrypted: bool,
    pub has_filesystem: bool,
    pub removable: bool,
    pub ejectable: bool,
    pub can_power_off: bool,
    pub uuid: String,
    pub fs_type: String,
    pub size: u64,
    pub device_path: Option<String>,
    pub bus_path: Option<String>,

    /// Id of the unlocked cleartext counterpart of an encrypted device
    pub cleartext_peer_id: Option<String>,

    /// Id of the locked shell device backing a cleartext device
    pub crypto_backing_id: Option<String>,

    // === Other kinds ===
    /// Share URI for network shares
    pub source: Option<String>,

    /// Launch command for app entries
    pub command: Option<String>,
}

impl Device {
    /// A device with every flag cleared; callers fill in what they know.
    pub fn new(id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: id.into(),
            kind,
            display_name: label.clone(),
            label,
            mount_state: MountState::Unmounted,
            mount_point: None,
            encrypted: false,
            has_filesystem: false,
            removable: false,
            ejectable: false,
            can_power_off: false,
            uuid: String::new(),
            fs_type: String::new(),
            size: 0,
            device_path: None,
            bus_path: None,
            cleartext_peer_id: None,
            crypto_backing_id: None,
            source: None,
            command: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_state == MountState::Mounted && self.mount_point.is_some()
    }

    /// Encrypted and not yet unlocked
    pub fn is_locked(&self) -> bool {
        self.encrypted && self.cleartext_peer_id.is_none()
    }

    /// A block device that neither carries a filesystem nor encryption and
    /// therefore needs formatting before it can be opened
    pub fn needs_format(&self) -> bool {
        self.kind == DeviceKind::Block && !self.has_filesystem && !self.encrypted
    }

    /// Set the mounted/unmounted state from a mount-table observation
    pub fn set_mounted_at(&mut self, mount_point: Option<String>) {
        match mount_point {
            Some(mp) => {
                self.mount_state = MountState::Mounted;
                self.mount_point = Some(mp);
            }
            None => {
                self.mount_state = MountState::Unmounted;
                self.mount_point = None;
            }
        }
    }
}

/// Summary shown by the properties action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub name: String,
    pub kind: DeviceKind,
    pub fs_type: String,
    pub device_path: Option<String>,
    pub mount_point: Option<String>,
    pub total_bytes: u64,
    pub free_bytes: u64,
}
