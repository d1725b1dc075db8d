// SPDX-License-Identifier: GPL-3.0-only

//! Build [`BlockVolumeInfo`] observations from UDisks2 block objects

use storage_types::BlockVolumeInfo;
use udisks2::{
    block::BlockProxy, drive::DriveProxy, encrypted::EncryptedProxy,
    filesystem::FilesystemProxy, partition::PartitionProxy,
    partitiontable::PartitionTableProxy,
};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::bytestring as bs;
use crate::error::DiskError;

const NO_OBJECT: &str = "/";

/// What `IdUsage` says about a block's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentKind {
    pub has_filesystem: bool,
    pub encrypted: bool,
}

pub(crate) fn classify_usage(id_usage: &str) -> ContentKind {
    ContentKind {
        has_filesystem: id_usage == "filesystem",
        encrypted: id_usage == "crypto",
    }
}

fn non_root(path: OwnedObjectPath) -> Option<OwnedObjectPath> {
    (path.as_str() != NO_OBJECT).then_some(path)
}

/// Read one block object.
///
/// Returns `None` for objects that are gone, ignored by UDisks2, carry a
/// partition table, or are not backed by a drive (loop and dm targets other
/// than LUKS cleartext).
pub async fn read_volume(
    connection: &Connection,
    path: &OwnedObjectPath,
) -> Result<Option<BlockVolumeInfo>, DiskError> {
    let block = BlockProxy::builder(connection).path(path)?.build().await?;

    let Ok(device_bytes) = block.preferred_device().await else {
        tracing::debug!("block object {} is gone", path.as_str());
        return Ok(None);
    };

    if block.hint_ignore().await.unwrap_or(false) {
        return Ok(None);
    }

    if let Ok(pt) = PartitionTableProxy::builder(connection).path(path)?.build().await
        && pt.type_().await.is_ok()
    {
        return Ok(None);
    }

    let crypto_backing = block.crypto_backing_device().await.ok().and_then(non_root);
    let drive_path = block.drive().await.ok().and_then(non_root);
    if drive_path.is_none() && crypto_backing.is_none() {
        return Ok(None);
    }

    let content = classify_usage(&block.id_usage().await.unwrap_or_default());

    let mut info = BlockVolumeInfo {
        bus_path: path.to_string(),
        device_path: bs::decode_c_string_bytes(&device_bytes),
        uuid: block.id_uuid().await.unwrap_or_default(),
        label: block.id_label().await.unwrap_or_default(),
        id_type: block.id_type().await.unwrap_or_default(),
        size: block.size().await.unwrap_or_default(),
        hint_system: block.hint_system().await.unwrap_or(false),
        has_filesystem: content.has_filesystem,
        encrypted: content.encrypted,
        crypto_backing_bus_path: crypto_backing.map(|p| p.to_string()),
        ..Default::default()
    };

    if let Some(drive_path) = drive_path {
        let drive = DriveProxy::builder(connection)
            .path(&drive_path)?
            .build()
            .await?;
        info.drive_serial = drive.serial().await.unwrap_or_default();
        info.drive_model = drive.model().await.unwrap_or_default();
        info.removable = drive.removable().await.unwrap_or(false);
        info.ejectable = drive.ejectable().await.unwrap_or(false);
        info.can_power_off = drive.can_power_off().await.unwrap_or(false);
    }

    if let Ok(partition) = PartitionProxy::builder(connection).path(path)?.build().await {
        info.partition_number = partition.number().await.unwrap_or(0);
    }

    if info.encrypted {
        let encrypted = EncryptedProxy::builder(connection).path(path)?.build().await?;
        info.cleartext_bus_path = encrypted
            .cleartext_device()
            .await
            .ok()
            .and_then(non_root)
            .map(|p| p.to_string());
    }

    if info.has_filesystem {
        let filesystem = FilesystemProxy::builder(connection).path(path)?.build().await?;
        info.mount_points = filesystem
            .mount_points()
            .await
            .map(bs::decode_mount_points)
            .unwrap_or_default();
    }

    Ok(Some(info))
}
