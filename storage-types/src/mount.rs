// SPDX-License-Identifier: GPL-3.0-only

//! Mount requests, results and mount-table snapshots

use serde::{Deserialize, Serialize};

/// Options accepted by the privileged mount service.
///
/// Every field is optional; an empty set mounts the share as guest.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Connection timeout passed down to the filesystem driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

impl MountOptions {
    pub fn with_credentials(user: impl Into<String>, passwd: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            passwd: Some(passwd.into()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for MountOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountOptions")
            .field("user", &self.user)
            .field("passwd", &self.passwd.as_ref().map(|_| "******"))
            .field("domain", &self.domain)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Outcome of a mount call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResult {
    pub mount_point: String,
    pub result: bool,
    /// 0 on success, negative for a service error kind, positive for a raw errno
    pub error_code: i32,
    pub error_message: String,
}

impl MountResult {
    pub fn success(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            result: true,
            error_code: 0,
            error_message: String::new(),
        }
    }

    pub fn failure(error_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            mount_point: String::new(),
            result: false,
            error_code,
            error_message: error_message.into(),
        }
    }
}

/// Outcome of an unmount call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmountResult {
    pub result: bool,
    pub error_code: i32,
    pub error_message: String,
}

impl UnmountResult {
    pub fn success() -> Self {
        Self {
            result: true,
            error_code: 0,
            error_message: String::new(),
        }
    }

    pub fn failure(error_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            result: false,
            error_code,
            error_message: error_message.into(),
        }
    }
}

/// One row of the live mount table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fs_type: String,
    /// Per-mount and superblock options, comma separated in kernel order
    pub options: Vec<String>,
}

impl MountEntry {
    /// Value of a `key=value` option, if present
    pub fn option_value(&self, key: &str) -> Option<&str> {
        self.options.iter().find_map(|opt| {
            opt.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Snapshot of the system mount table in kernel order (oldest first)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Most recent entry mounted from `source`
    pub fn find_source(&self, source: &str) -> Option<&MountEntry> {
        self.entries.iter().rev().find(|e| e.source == source)
    }

    /// Most recent entry mounted on `target`
    pub fn find_target(&self, target: &str) -> Option<&MountEntry> {
        let target = target.trim_end_matches('/');
        self.entries
            .iter()
            .rev()
            .find(|e| e.target.trim_end_matches('/') == target)
    }

    /// Look a path up as a source first, then as a target
    pub fn find(&self, path: &str) -> Option<&MountEntry> {
        self.find_source(path).or_else(|| self.find_target(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, target: &str, fs_type: &str, options: &str) -> MountEntry {
        MountEntry {
            source: source.into(),
            target: target.into(),
            fs_type: fs_type.into(),
            options: options.split(',').map(str::to_string).collect(),
        }
    }

    #[test]
    fn debug_masks_password() {
        let options = MountOptions::with_credentials("alice", "hunter2");
        let printed = format!("{options:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn find_prefers_latest_entry_for_source() {
        let table = MountTable::new(vec![
            entry("//h/s", "/media/a/smbmounts/s on h", "cifs", "rw,uid=1000"),
            entry("//h/s", "/media/a/smbmounts/s on h_2", "cifs", "rw,uid=1001"),
        ]);

        let found = table.find("//h/s").expect("source should be found");
        assert_eq!(found.target, "/media/a/smbmounts/s on h_2");
        assert_eq!(found.option_value("uid"), Some("1001"));
    }

    #[test]
    fn find_falls_back_to_target_lookup() {
        let table = MountTable::new(vec![entry("/dev/sdb1", "/media/a/USB", "vfat", "rw")]);
        assert_eq!(
            table.find("/media/a/USB/").map(|e| e.source.as_str()),
            Some("/dev/sdb1")
        );
        assert!(table.find("/media/a/other").is_none());
    }

    #[test]
    fn mount_options_omit_unset_fields() {
        let json = serde_json::to_string(&MountOptions::with_credentials("a", "b"))
            .expect("serialize options");
        assert_eq!(json, r#"{"user":"a","passwd":"b"}"#);
        let parsed: MountOptions = serde_json::from_str("{}").expect("deserialize empty");
        assert_eq!(parsed, MountOptions::default());
    }
}
