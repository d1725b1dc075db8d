// SPDX-License-Identifier: GPL-3.0-only

//! On-disk layout and lifecycle of the per-user encrypted vault

use std::fs;
use std::path::{Path, PathBuf};

use storage_contracts::MountTableSource;
use storage_types::VaultState;

use crate::error::Result;

pub const ENCRYPTED_DIR: &str = "vault_encrypted";
pub const UNLOCKED_DIR: &str = "vault_unlocked";
pub const CONFIG_FILE: &str = "cryfs.config";
pub const VAULT_FS_TYPE: &str = "fuse.cryfs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn encrypted_dir(&self) -> PathBuf {
        self.root.join(ENCRYPTED_DIR)
    }

    pub fn unlocked_dir(&self) -> PathBuf {
        self.root.join(UNLOCKED_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.encrypted_dir().join(CONFIG_FILE)
    }

    /// Create both vault directories if missing. Existing content is never touched.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.encrypted_dir(), self.unlocked_dir()] {
            if !dir.is_dir() {
                fs::create_dir_all(&dir)?;
                tracing::info!("created vault directory {}", dir.display());
            }
        }
        Ok(())
    }

    /// Current vault state. Never fails: an unreadable mount table counts
    /// as locked.
    pub fn state(&self, mounts: &dyn MountTableSource) -> VaultState {
        if !self.config_file().exists() {
            return VaultState::NotExisted;
        }

        // The kernel records resolved targets; resolve the root rather than
        // the unlocked dir so a live FUSE mount is never stat'ed.
        let unlocked = self.unlocked_dir();
        let resolved = fs::canonicalize(&self.root)
            .map(|root| root.join(UNLOCKED_DIR))
            .unwrap_or_else(|_| unlocked.clone());
        match mounts.snapshot() {
            Ok(table) => {
                let entry = table
                    .find_target(&resolved.to_string_lossy())
                    .or_else(|| table.find_target(&unlocked.to_string_lossy()));
                match entry {
                    Some(entry) if entry.fs_type == VAULT_FS_TYPE => VaultState::Unlocked,
                    _ => VaultState::Encrypted,
                }
            }
            Err(e) => {
                tracing::warn!("mount table unavailable while checking vault: {e}");
                VaultState::Encrypted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_contracts::StorageError;
    use storage_types::{MountEntry, MountTable};

    struct StaticTable(Option<MountTable>);

    impl MountTableSource for StaticTable {
        fn snapshot(&self) -> std::result::Result<MountTable, StorageError> {
            self.0
                .clone()
                .ok_or_else(|| StorageError::internal("mountinfo unreadable"))
        }
    }

    fn mounted_at(target: &Path, fs_type: &str) -> StaticTable {
        StaticTable(Some(MountTable::new(vec![MountEntry {
            source: "cryfs@vault".into(),
            target: target.to_string_lossy().into_owned(),
            fs_type: fs_type.into(),
            options: vec![],
        }])))
    }

    #[test]
    fn missing_config_means_not_existed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = VaultLayout::new(dir.path());
        vault.ensure_layout().expect("layout");
        let table = mounted_at(&vault.unlocked_dir(), VAULT_FS_TYPE);
        assert_eq!(vault.state(&table), VaultState::NotExisted);
    }

    #[test]
    fn config_without_cryfs_mount_is_encrypted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = VaultLayout::new(dir.path());
        vault.ensure_layout().expect("layout");
        fs::write(vault.config_file(), b"cfg").expect("config");

        assert_eq!(vault.state(&StaticTable(Some(MountTable::default()))), VaultState::Encrypted);
        assert_eq!(vault.state(&mounted_at(&vault.unlocked_dir(), "tmpfs")), VaultState::Encrypted);
        assert_eq!(vault.state(&StaticTable(None)), VaultState::Encrypted);
    }

    #[test]
    fn cryfs_mount_on_unlocked_dir_is_unlocked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = VaultLayout::new(dir.path());
        vault.ensure_layout().expect("layout");
        fs::write(vault.config_file(), b"cfg").expect("config");

        let table = mounted_at(&vault.unlocked_dir(), VAULT_FS_TYPE);
        assert_eq!(vault.state(&table), VaultState::Unlocked);
    }

    #[test]
    fn symlinked_root_matches_the_resolved_mount_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real");
        fs::create_dir(&real).expect("real root");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let vault = VaultLayout::new(&link);
        vault.ensure_layout().expect("layout");
        fs::write(vault.config_file(), b"cfg").expect("config");

        let target = fs::canonicalize(&real).expect("canonical").join(UNLOCKED_DIR);
        assert_eq!(vault.state(&mounted_at(&target, VAULT_FS_TYPE)), VaultState::Unlocked);
        assert_eq!(vault.state(&mounted_at(&target, "tmpfs")), VaultState::Encrypted);
    }

    #[test]
    fn ensure_layout_keeps_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = VaultLayout::new(dir.path());
        vault.ensure_layout().expect("layout");
        let file = vault.unlocked_dir().join("note.txt");
        fs::write(&file, b"hello").expect("write");

        vault.ensure_layout().expect("layout again");
        assert_eq!(fs::read(&file).expect("read"), b"hello");
    }
}
