// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_types::{MountOptions, MountResult, UnmountResult};

use crate::StorageError;

/// Mounts network shares through the privileged mount service.
///
/// `Err` is reserved for transport failures; refusals and OS errors come back
/// inside the result.
#[async_trait]
pub trait NetworkMounter: Send + Sync {
    async fn mount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<MountResult, StorageError>;

    async fn unmount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<UnmountResult, StorageError>;
}
