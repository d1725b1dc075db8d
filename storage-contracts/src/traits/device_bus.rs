// SPDX-License-Identifier: GPL-3.0-only

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use storage_types::BlockVolumeInfo;

use crate::StorageError;

/// Raw notification from the platform device bus, keyed by bus object path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Added(String),
    Removed(String),
    Changed(String),
}

impl BusEvent {
    pub fn bus_path(&self) -> &str {
        match self {
            BusEvent::Added(p) | BusEvent::Removed(p) | BusEvent::Changed(p) => p,
        }
    }
}

pub type BusEventStream = Pin<Box<dyn Stream<Item = BusEvent> + Send>>;

/// Block device enumeration and actions on the platform device bus
#[async_trait]
pub trait DeviceBus: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<BlockVolumeInfo>, StorageError>;

    /// Re-read a single volume; `None` when the object is gone or not a volume
    async fn volume(&self, bus_path: &str) -> Result<Option<BlockVolumeInfo>, StorageError>;

    async fn events(&self) -> Result<BusEventStream, StorageError>;

    /// Mount the filesystem, returning the mount point chosen by the bus
    async fn mount(&self, bus_path: &str) -> Result<String, StorageError>;

    async fn unmount(&self, bus_path: &str, force: bool) -> Result<(), StorageError>;

    /// Unlock an encrypted volume, returning the cleartext volume's bus path
    async fn unlock(&self, bus_path: &str, passphrase: &str) -> Result<String, StorageError>;

    async fn lock(&self, bus_path: &str) -> Result<(), StorageError>;

    async fn eject(&self, bus_path: &str) -> Result<(), StorageError>;

    async fn power_off(&self, bus_path: &str) -> Result<(), StorageError>;

    async fn set_label(&self, bus_path: &str, label: &str) -> Result<(), StorageError>;

    async fn format(&self, bus_path: &str, fs_type: &str, label: &str)
    -> Result<(), StorageError>;
}
