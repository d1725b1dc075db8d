// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// A block volume as reported by the device bus.
///
/// This is the raw observation; the registry turns it into a [`crate::Device`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVolumeInfo {
    /// Bus object path (e.g. `/org/freedesktop/UDisks2/block_devices/sdb1`)
    pub bus_path: String,

    /// Device node (e.g. `/dev/sdb1`)
    pub device_path: String,

    pub uuid: String,
    pub label: String,

    /// Probed content type (e.g. "ext4", "crypto_LUKS", empty when unknown)
    pub id_type: String,

    pub size: u64,

    // === Drive ===
    pub drive_serial: String,
    pub drive_model: String,
    pub partition_number: u32,
    pub removable: bool,
    pub ejectable: bool,
    pub can_power_off: bool,
    /// True for system-internal volumes the desktop should not manage
    pub hint_system: bool,

    // === Content ===
    pub has_filesystem: bool,
    pub encrypted: bool,

    /// For an unlocked encrypted volume, bus path of its cleartext block
    pub cleartext_bus_path: Option<String>,

    /// For a cleartext volume, bus path of the encrypted (shell) block
    pub crypto_backing_bus_path: Option<String>,

    /// Mount points as reported by the bus; informational only, the mount
    /// table is authoritative.
    pub mount_points: Vec<String>,
}

impl BlockVolumeInfo {
    /// Stable identity that survives a re-plug.
    ///
    /// Prefers the content UUID, then drive serial plus partition number, and
    /// only falls back to the bus path when the hardware exposes neither.
    pub fn stable_id(&self) -> String {
        if !self.uuid.is_empty() {
            return format!("uuid:{}", self.uuid);
        }
        if !self.drive_serial.is_empty() {
            return format!("serial:{}:{}", self.drive_serial, self.partition_number);
        }
        self.bus_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_prefers_uuid_over_serial_and_path() {
        let mut info = BlockVolumeInfo {
            bus_path: "/org/freedesktop/UDisks2/block_devices/sdb1".into(),
            uuid: "1234-ABCD".into(),
            drive_serial: "SN01".into(),
            partition_number: 1,
            ..Default::default()
        };
        assert_eq!(info.stable_id(), "uuid:1234-ABCD");

        info.uuid.clear();
        assert_eq!(info.stable_id(), "serial:SN01:1");

        info.drive_serial.clear();
        assert_eq!(
            info.stable_id(),
            "/org/freedesktop/UDisks2/block_devices/sdb1"
        );
    }
}
