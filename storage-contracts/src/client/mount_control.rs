// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_types::{MountOptions, MountResult, UnmountResult};
use zbus::proxy;

use crate::client::connection::shared_connection;
use crate::client::error::ClientError;
use crate::{NetworkMounter, StorageError};

/// D-Bus proxy for the privileged mount service
#[proxy(
    interface = "org.cosmic.ext.MountService.MountControl",
    default_service = "org.cosmic.ext.MountService",
    default_path = "/org/cosmic/ext/MountService"
)]
pub trait MountControlInterface {
    /// Mount a network share; returns a JSON `MountResult`
    async fn mount(&self, source_uri: &str, options_json: &str) -> zbus::Result<String>;

    /// Unmount a network share; returns a JSON `UnmountResult`
    async fn unmount(&self, source_uri: &str, options_json: &str) -> zbus::Result<String>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// Client for the privileged mount service
pub struct MountControlClient {
    proxy: MountControlInterfaceProxy<'static>,
}

impl MountControlClient {
    pub async fn new() -> Result<Self, ClientError> {
        let conn = shared_connection().await?;

        let proxy = MountControlInterfaceProxy::new(conn).await.map_err(|e| {
            ClientError::Connection(format!("Failed to create mount control proxy: {}", e))
        })?;

        Ok(Self { proxy })
    }

    pub async fn mount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<MountResult, ClientError> {
        let options_json = serde_json::to_string(options)?;
        let json = self.proxy.mount(source_uri, &options_json).await?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn unmount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<UnmountResult, ClientError> {
        let options_json = serde_json::to_string(options)?;
        let json = self.proxy.unmount(source_uri, &options_json).await?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        Ok(self.proxy.version().await?)
    }
}

#[async_trait]
impl NetworkMounter for MountControlClient {
    async fn mount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<MountResult, StorageError> {
        tracing::debug!("Requesting privileged mount of {}", source_uri);
        MountControlClient::mount(self, source_uri, options)
            .await
            .map_err(Into::into)
    }

    async fn unmount(
        &self,
        source_uri: &str,
        options: &MountOptions,
    ) -> Result<UnmountResult, StorageError> {
        tracing::debug!("Requesting privileged unmount of {}", source_uri);
        MountControlClient::unmount(self, source_uri, options)
            .await
            .map_err(Into::into)
    }
}
