// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use async_trait::async_trait;
use storage_contracts::{BusEventStream, DeviceBus, StorageError};
use storage_types::BlockVolumeInfo;
use udisks2::{
    block::BlockProxy, drive::DriveProxy, encrypted::EncryptedProxy,
    filesystem::FilesystemProxy,
};
use zbus::{
    Connection,
    zvariant::{OwnedObjectPath, Value},
};

use crate::error::DiskError;
use crate::manager::{UDisks2ManagerProxy, device_event_stream};
use crate::volume::read_volume;

/// Device bus backed by the UDisks2 system service
#[derive(Debug, Clone)]
pub struct UDisksBus {
    connection: Connection,
}

fn object_path(bus_path: &str) -> Result<OwnedObjectPath, DiskError> {
    OwnedObjectPath::try_from(bus_path.to_string())
        .map_err(|_| DiskError::DeviceNotFound(bus_path.to_string()))
}

impl UDisksBus {
    pub async fn new() -> Result<Self, DiskError> {
        let connection = Connection::system()
            .await
            .map_err(|e| DiskError::ConnectionFailed(e.to_string()))?;
        Ok(Self { connection })
    }

    pub fn with_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn drive_path(&self, bus_path: &str) -> Result<OwnedObjectPath, DiskError> {
        let block = BlockProxy::builder(&self.connection)
            .path(object_path(bus_path)?)?
            .build()
            .await?;
        let drive = block.drive().await?;
        if drive.as_str() == "/" {
            return Err(DiskError::NotSupported(format!("{bus_path} has no drive")));
        }
        Ok(drive)
    }

    async fn list_volumes(&self) -> Result<Vec<BlockVolumeInfo>, DiskError> {
        let manager = UDisks2ManagerProxy::new(&self.connection).await?;
        let block_paths = manager.get_block_devices(HashMap::new()).await?;

        let mut volumes = Vec::new();
        for path in block_paths {
            match read_volume(&self.connection, &path).await {
                Ok(Some(info)) => volumes.push(info),
                Ok(None) => {}
                Err(e) => tracing::info!("Could not read block device {}: {}", path.as_str(), e),
            }
        }
        Ok(volumes)
    }
}

#[async_trait]
impl DeviceBus for UDisksBus {
    async fn enumerate(&self) -> Result<Vec<BlockVolumeInfo>, StorageError> {
        Ok(self.list_volumes().await?)
    }

    async fn volume(&self, bus_path: &str) -> Result<Option<BlockVolumeInfo>, StorageError> {
        let Ok(path) = object_path(bus_path) else {
            return Ok(None);
        };
        Ok(read_volume(&self.connection, &path).await?)
    }

    async fn events(&self) -> Result<BusEventStream, StorageError> {
        Ok(device_event_stream(&self.connection).await?)
    }

    async fn mount(&self, bus_path: &str) -> Result<String, StorageError> {
        let fs_proxy = FilesystemProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        let opts: HashMap<&str, Value<'_>> = HashMap::new();
        let mount_point = fs_proxy
            .mount(opts)
            .await
            .map_err(|e| DiskError::from_call("mount", bus_path, e))?;

        tracing::info!("mounted {} at {}", bus_path, mount_point);
        Ok(mount_point)
    }

    async fn unmount(&self, bus_path: &str, force: bool) -> Result<(), StorageError> {
        let fs_proxy = FilesystemProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        let mut opts: HashMap<&str, Value<'_>> = HashMap::new();
        if force {
            opts.insert("force", Value::from(true));
        }

        fs_proxy
            .unmount(opts)
            .await
            .map_err(|e| DiskError::from_call("unmount", bus_path, e))?;
        Ok(())
    }

    async fn unlock(&self, bus_path: &str, passphrase: &str) -> Result<String, StorageError> {
        let encrypted = EncryptedProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        let cleartext = encrypted
            .unlock(passphrase, HashMap::new())
            .await
            .map_err(|e| DiskError::from_call("unlock", bus_path, e))?;

        tracing::info!("unlocked {} as {}", bus_path, cleartext.as_str());
        Ok(cleartext.to_string())
    }

    async fn lock(&self, bus_path: &str) -> Result<(), StorageError> {
        let encrypted = EncryptedProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        encrypted
            .lock(HashMap::new())
            .await
            .map_err(|e| DiskError::from_call("lock", bus_path, e))?;
        Ok(())
    }

    async fn eject(&self, bus_path: &str) -> Result<(), StorageError> {
        let drive_path = self.drive_path(bus_path).await?;
        let drive = DriveProxy::builder(&self.connection)
            .path(&drive_path)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(DiskError::from)?;

        if !drive.ejectable().await.unwrap_or(false) {
            return Err(DiskError::NotSupported(format!("eject {bus_path}")).into());
        }

        drive
            .eject(HashMap::new())
            .await
            .map_err(|e| DiskError::from_call("eject", bus_path, e))?;
        Ok(())
    }

    async fn power_off(&self, bus_path: &str) -> Result<(), StorageError> {
        let drive_path = self.drive_path(bus_path).await?;
        let drive = DriveProxy::builder(&self.connection)
            .path(&drive_path)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(DiskError::from)?;

        if !drive.can_power_off().await.unwrap_or(false) {
            return Err(DiskError::NotSupported(format!("power off {bus_path}")).into());
        }

        drive
            .power_off(HashMap::new())
            .await
            .map_err(|e| DiskError::from_call("power off", bus_path, e))?;
        Ok(())
    }

    async fn set_label(&self, bus_path: &str, label: &str) -> Result<(), StorageError> {
        let fs_proxy = FilesystemProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        fs_proxy
            .set_label(label, HashMap::new())
            .await
            .map_err(|e| DiskError::from_call("set label on", bus_path, e))?;
        Ok(())
    }

    async fn format(&self, bus_path: &str, fs_type: &str, label: &str) -> Result<(), StorageError> {
        let block_proxy = BlockProxy::builder(&self.connection)
            .path(object_path(bus_path)?)
            .map_err(DiskError::from)?
            .build()
            .await
            .map_err(|e| DiskError::DBusError(e.to_string()))?;

        let mut format_opts: HashMap<&str, Value<'_>> = HashMap::new();
        if !label.is_empty() {
            format_opts.insert("label", Value::from(label));
        }

        block_proxy
            .format(fs_type, format_opts)
            .await
            .map_err(|e| DiskError::from_call("format", bus_path, e))?;

        tracing::info!("formatted {} as {}", bus_path, fs_type);
        Ok(())
    }
}
