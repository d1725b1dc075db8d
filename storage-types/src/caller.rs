// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Identity of the D-Bus peer that invoked a privileged method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub uid: u32,
    pub gid: u32,
    pub username: Option<String>,
    /// Unique bus name of the caller (e.g. ":1.42")
    pub sender: String,
}

impl CallerInfo {
    pub fn new(uid: u32, gid: u32, username: Option<String>, sender: impl Into<String>) -> Self {
        Self {
            uid,
            gid,
            username,
            sender: sender.into(),
        }
    }
}
