// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use storage_contracts::{
    DeviceBus, MountTableSource, NetworkMounter, PromptProvider, SettingsStore, StorageError,
};
use storage_sys::{MountRoot, VaultLayout};
use storage_types::Device;
use tokio::task::JoinHandle;

use crate::backend::BackendDispatch;
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::registry::DeviceRegistry;
use crate::virtual_path::VaultPathTranslator;

/// Everything the file browser needs, wired together
pub struct Subsystem {
    config: Config,
    registry: Arc<DeviceRegistry>,
    orchestrator: Orchestrator,
    vault: VaultPathTranslator,
    dispatch: BackendDispatch,
    mount_root: MountRoot,
    watcher: Option<JoinHandle<()>>,
}

impl Subsystem {
    /// Prepare the vault layout, scan once and start the watcher
    pub async fn init(
        config: Config,
        bus: Arc<dyn DeviceBus>,
        mounts: Arc<dyn MountTableSource>,
        settings: Arc<dyn SettingsStore>,
        mounter: Arc<dyn NetworkMounter>,
        prompts: Arc<dyn PromptProvider>,
    ) -> Result<Self, StorageError> {
        let layout = VaultLayout::new(&config.data_dir);
        layout.ensure_layout()?;
        let vault = VaultPathTranslator::new(layout.unlocked_dir());

        let registry = Arc::new(DeviceRegistry::new(bus.clone(), mounts, settings, layout));
        registry.refresh().await;
        tracing::info!("{} devices after initial scan", registry.list_devices().len());

        let bus_events = match bus.events().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!("device events unavailable, polling only: {e}");
                None
            }
        };
        let watcher = tokio::spawn(
            Arc::clone(&registry).run(bus_events, config.rescan_interval()),
        );

        let orchestrator = Orchestrator::new(Arc::clone(&registry), bus, mounter, prompts);
        let dispatch = BackendDispatch::standard(vault.clone(), Arc::clone(&registry));
        let mount_root = MountRoot::new(&config.media_root, config.share_namespace.clone());

        Ok(Self {
            config,
            registry,
            orchestrator,
            vault,
            dispatch,
            mount_root,
            watcher: Some(watcher),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn vault(&self) -> &VaultPathTranslator {
        &self.vault
    }

    pub fn dispatch(&self) -> &BackendDispatch {
        &self.dispatch
    }

    /// Whether the device is mounted below the mount service's managed root
    pub fn is_managed_mount(&self, device: &Device) -> bool {
        device
            .mount_point
            .as_deref()
            .is_some_and(|mount_point| self.mount_root.is_managed(mount_point))
    }

    /// Stop the watcher; in-flight actions finish on their own
    pub fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
            tracing::info!("device watcher stopped");
        }
    }
}

impl Drop for Subsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
