// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{AliasEntry, AppEntryRegistration, NetworkShareRegistration};

use crate::StorageError;

/// Per-user persisted settings
pub trait SettingsStore: Send + Sync {
    fn aliases(&self) -> Vec<AliasEntry>;

    fn set_aliases(&self, aliases: Vec<AliasEntry>) -> Result<(), StorageError>;

    fn network_shares(&self) -> Vec<NetworkShareRegistration>;

    fn set_network_shares(&self, shares: Vec<NetworkShareRegistration>)
    -> Result<(), StorageError>;

    fn app_entries(&self) -> Vec<AppEntryRegistration>;
}
