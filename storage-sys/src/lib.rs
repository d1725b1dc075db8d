// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for mount management
//!
//! This crate talks to the kernel and the local filesystem directly:
//! - Reading the live mount table
//! - Managing the per-user mount-point root for network shares
//! - Building CIFS mount options and issuing mount(2)/umount(2)
//! - Inspecting the on-disk vault layout
//! - Resolving unix users and filesystem usage
//!
//! The mount syscalls require elevated privileges and are only called from
//! the privileged service.

pub mod cifs;
pub mod error;
pub mod mount_root;
pub mod mount_table;
pub mod unix_user;
pub mod usage;
pub mod vault;

pub use cifs::{CifsShare, MountSyscalls, NixMountSyscalls, build_cifs_options, mask_password};
pub use error::{Result, SysError};
pub use mount_root::{MountPathReservation, MountRoot};
pub use mount_table::{ProcMountTable, parse_mountinfo, read_mount_table};
pub use unix_user::{UnixUser, user_for_uid};
pub use usage::{FilesystemUsage, filesystem_usage};
pub use vault::VaultLayout;
