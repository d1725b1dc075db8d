// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for COSMIC Ext Mounts
//!
//! These types are shared by every layer of the stack:
//!
//! - **storage-udisks**: reports block volumes as `BlockVolumeInfo`
//! - **storage-service**: serializes `MountResult`/`UnmountResult` for D-Bus transport
//! - **storage-mounts**: owns the `Device` catalog and hands out snapshots
//!
//! Nothing in here performs I/O.

pub mod block;
pub mod caller;
pub mod common;
pub mod device;
pub mod mount;
pub mod settings;
pub mod vault;

pub use block::BlockVolumeInfo;
pub use caller::CallerInfo;
pub use common::bytes_to_pretty;
pub use device::{Device, DeviceKind, DeviceProperties, MountState};
pub use mount::{MountEntry, MountOptions, MountResult, MountTable, UnmountResult};
pub use settings::{AliasEntry, AppEntryRegistration, NetworkShareRegistration};
pub use vault::VaultState;
