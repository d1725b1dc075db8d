// SPDX-License-Identifier: GPL-3.0-only

//! Managed mount-point root for network shares.
//!
//! Layout is `<media>/<user>/<namespace>/<share> on <host>[_N]`. Name
//! selection and directory creation are guarded by an in-process
//! reservation set, and directories are created with create-exclusive
//! semantics so concurrent requests never share a mount point.

use std::collections::HashSet;
use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use storage_types::MountTable;

use crate::cifs::CifsShare;
use crate::error::{Result, SysError};

pub const DEFAULT_MEDIA_ROOT: &str = "/media";
pub const DEFAULT_NAMESPACE: &str = "smbmounts";

const MOUNT_DIR_MODE: u32 = 0o755;
const MAX_CREATE_ATTEMPTS: usize = 64;

type ReservedSet = Arc<Mutex<HashSet<PathBuf>>>;

#[derive(Debug, Clone)]
pub struct MountRoot {
    media_root: PathBuf,
    namespace: String,
    reserved: ReservedSet,
}

/// A mount-point name held for one in-flight request.
///
/// The name is released when the reservation is dropped; the directory
/// itself is left alone.
#[derive(Debug)]
pub struct MountPathReservation {
    path: PathBuf,
    reserved: ReservedSet,
}

impl MountPathReservation {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MountPathReservation {
    fn drop(&mut self) {
        lock(&self.reserved).remove(&self.path);
    }
}

fn lock(set: &ReservedSet) -> MutexGuard<'_, HashSet<PathBuf>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MountRoot {
    pub fn new(media_root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            media_root: media_root.into(),
            namespace: namespace.into(),
            reserved: Arc::default(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// `<media>/<user>/<namespace>`
    pub fn user_root(&self, username: &str) -> PathBuf {
        self.media_root.join(username).join(&self.namespace)
    }

    /// Whether `target` lives below any user's managed root
    pub fn is_managed(&self, target: &str) -> bool {
        let Ok(relative) = Path::new(target).strip_prefix(&self.media_root) else {
            return false;
        };

        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name),
                _ => None,
            })
            .collect();

        parts
            .iter()
            .enumerate()
            .any(|(i, part)| i >= 1 && i + 1 < parts.len() && *part == self.namespace.as_str())
    }

    /// Remove empty leftover directories below every user's managed root.
    ///
    /// Reserved names and current mount targets are skipped.
    pub fn sweep_empty(&self, table: &MountTable) {
        let Ok(users) = fs::read_dir(&self.media_root) else {
            return;
        };

        for user in users.flatten() {
            let namespace_dir = user.path().join(&self.namespace);
            let Ok(children) = fs::read_dir(&namespace_dir) else {
                continue;
            };

            for child in children.flatten() {
                let path = child.path();
                if !path.is_dir() || lock(&self.reserved).contains(&path) {
                    continue;
                }
                if table.find_target(&path.to_string_lossy()).is_some() {
                    continue;
                }
                if is_empty_dir(&path) {
                    match fs::remove_dir(&path) {
                        Ok(()) => tracing::debug!("cleaned leftover mount point {}", path.display()),
                        Err(e) => tracing::debug!("could not clean {}: {e}", path.display()),
                    }
                }
            }
        }
    }

    /// Pick and reserve a free mount-point name for `share`.
    ///
    /// Sweeps leftovers first and makes sure the user root exists. The
    /// returned path neither exists on disk nor is reserved by another
    /// request.
    pub fn generate_mount_path(
        &self,
        username: &str,
        share: &CifsShare,
        table: &MountTable,
    ) -> Result<MountPathReservation> {
        self.sweep_empty(table);

        let user_root = self.user_root(username);
        DirBuilder::new()
            .recursive(true)
            .mode(MOUNT_DIR_MODE)
            .create(&user_root)?;

        let base = user_root.join(share.dir_name());
        let mut reserved = lock(&self.reserved);
        let path = (1..=usize::MAX)
            .map(|n| suffixed(&base, n))
            .find(|candidate| !candidate.exists() && !reserved.contains(candidate))
            .ok_or_else(|| SysError::OperationFailed("mount point names exhausted".into()))?;
        reserved.insert(path.clone());

        Ok(MountPathReservation {
            path,
            reserved: Arc::clone(&self.reserved),
        })
    }

    /// Generate a name and create the directory exclusively, moving on to
    /// the next suffix whenever another process wins the race.
    pub fn create_mount_point(
        &self,
        username: &str,
        share: &CifsShare,
        table: &MountTable,
    ) -> Result<MountPathReservation> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let reservation = self.generate_mount_path(username, share, table)?;
            match DirBuilder::new().mode(MOUNT_DIR_MODE).create(reservation.path()) {
                Ok(()) => return Ok(reservation),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("{} appeared concurrently, retrying", reservation.path().display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SysError::OperationFailed(format!(
            "could not create a mount point for {}",
            share.source()
        )))
    }

    /// Remove a mount point left empty by a failed mount or an unmount
    pub fn remove_mount_point(&self, path: &Path) {
        if let Err(e) = fs::remove_dir(path) {
            tracing::warn!("failed to remove mount point {}: {e}", path.display());
        }
    }
}

impl Default for MountRoot {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_ROOT, DEFAULT_NAMESPACE)
    }
}

fn suffixed(base: &Path, n: usize) -> PathBuf {
    if n == 1 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("_{n}"));
    PathBuf::from(name)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
