// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::{Result, SysError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilesystemUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Size and space available to unprivileged users for the filesystem
/// containing `path`
pub fn filesystem_usage(path: &Path) -> Result<FilesystemUsage> {
    let stats = statvfs(path).map_err(|e| {
        SysError::OperationFailed(format!("statvfs failed for {}: {e}", path.display()))
    })?;

    let fragment_size = stats.fragment_size() as u64;
    Ok(FilesystemUsage {
        total_bytes: stats.blocks() as u64 * fragment_size,
        free_bytes: stats.blocks_available() as u64 * fragment_size,
    })
}
