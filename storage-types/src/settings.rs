// SPDX-License-Identifier: GPL-3.0-only

//! Records persisted in the per-user settings store

use serde::{Deserialize, Serialize};

/// Display alias for a non-removable volume, keyed by filesystem UUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub uuid: String,
    /// Name the volume had when the alias was set
    pub display_name: String,
    pub alias: String,
}

/// A network share the user asked to keep in the device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkShareRegistration {
    pub id: String,
    /// Source URI, e.g. `smb://10.0.0.5/share`
    pub uri: String,
    pub label: String,
}

/// A launcher entry shown next to devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntryRegistration {
    pub id: String,
    pub name: String,
    pub command: String,
}
