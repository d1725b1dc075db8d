// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod id;
pub mod mount_error;

pub use error::{StorageError, StorageErrorKind};
pub use id::RequestId;
pub use mount_error::{MountError, MountErrorKind};
