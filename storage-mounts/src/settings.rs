// SPDX-License-Identifier: GPL-3.0-only

//! TOML backed per-user settings

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use storage_contracts::{SettingsStore, StorageError};
use storage_types::{AliasEntry, AppEntryRegistration, NetworkShareRegistration};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    aliases: Vec<AliasEntry>,
    network_shares: Vec<NetworkShareRegistration>,
    app_entries: Vec<AppEntryRegistration>,
}

/// Settings kept in memory and written through to a TOML file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash never leaves a truncated file behind.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    state: RwLock<SettingsFile>,
}

impl FileSettingsStore {
    /// Open `path`; a missing file starts empty, a corrupt one is logged and ignored
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings {}: {e}", path.display());
                SettingsFile::default()
            }),
            Err(_) => SettingsFile::default(),
        };

        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SettingsFile> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, apply: impl FnOnce(&mut SettingsFile)) -> Result<(), StorageError> {
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            apply(&mut state);
            state.clone()
        };
        persist(&self.path, &snapshot)
    }
}

fn persist(path: &Path, settings: &SettingsFile) -> Result<(), StorageError> {
    let content = toml::to_string_pretty(settings)
        .map_err(|e| StorageError::internal(format!("serialize settings: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StorageError::internal(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| io_error(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    tracing::debug!("settings written to {}", path.display());
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::internal(format!("{}: {err}", path.display()))
}

impl SettingsStore for FileSettingsStore {
    fn aliases(&self) -> Vec<AliasEntry> {
        self.read().aliases.clone()
    }

    fn set_aliases(&self, aliases: Vec<AliasEntry>) -> Result<(), StorageError> {
        self.update(|state| state.aliases = aliases)
    }

    fn network_shares(&self) -> Vec<NetworkShareRegistration> {
        self.read().network_shares.clone()
    }

    fn set_network_shares(&self, shares: Vec<NetworkShareRegistration>) -> Result<(), StorageError> {
        self.update(|state| state.network_shares = shares)
    }

    fn app_entries(&self) -> Vec<AppEntryRegistration> {
        self.read().app_entries.clone()
    }
}
