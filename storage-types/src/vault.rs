// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Lifecycle of the per-user encrypted vault.
///
/// Never stored; recomputed from the filesystem on every query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    #[default]
    NotExisted,
    Encrypted,
    Unlocked,
}

impl VaultState {
    pub fn is_unlocked(self) -> bool {
        matches!(self, VaultState::Unlocked)
    }
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultState::NotExisted => write!(f, "not-existed"),
            VaultState::Encrypted => write!(f, "encrypted"),
            VaultState::Unlocked => write!(f, "unlocked"),
        }
    }
}
