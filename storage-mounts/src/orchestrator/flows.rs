// SPDX-License-Identifier: GPL-3.0-only

//! Per-action decision logic. Everything here runs on a device lane.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use storage_contracts::{BusEvent, MountErrorKind, StorageError, StorageErrorKind};
use storage_sys::filesystem_usage;
use storage_types::{
    AliasEntry, Device, DeviceKind, DeviceProperties, MountOptions, MountState, VaultState,
};

use super::Inner;
use super::action::{
    Action, ActionPhase, DEFAULT_FORMAT_FS, Failure, OrchestratorErrorKind, Success,
};
use super::Request;

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        let kind = match err.kind {
            StorageErrorKind::NotFound => OrchestratorErrorKind::NotFound,
            _ => OrchestratorErrorKind::DeviceBus,
        };
        Failure::new(kind, err.message)
    }
}

fn bus_path(device: &Device) -> Result<&str, Failure> {
    device.bus_path.as_deref().ok_or_else(|| {
        Failure::new(
            OrchestratorErrorKind::NotFound,
            format!("{} has no device bus object", device.id),
        )
    })
}

impl Inner {
    pub(super) async fn execute(&self, request: &Request) -> Result<Success, Failure> {
        let device = self.registry.get_device(&request.device_id).ok_or_else(|| {
            Failure::new(
                OrchestratorErrorKind::NotFound,
                format!("No device {}", request.device_id),
            )
        })?;

        match &request.action {
            Action::Open => self.open(request, &device).await,
            Action::Mount { options } => self.mount(request, &device, options).await,
            Action::Unmount => self.unmount(&device).await,
            Action::Format { fs_type } => self.format(&device, fs_type).await,
            Action::Eject => self.remove(&device, false).await,
            Action::SafelyRemove => self.remove(&device, true).await,
            Action::Rename { name } => self.rename(&device, name).await,
            Action::Properties => self.properties(&device).await,
            Action::ForgetShare => self.forget_share(&device).await,
        }
    }

    async fn open(&self, request: &Request, device: &Device) -> Result<Success, Failure> {
        match device.kind {
            DeviceKind::Vault => self.open_vault(),
            DeviceKind::AppEntry => self.launch(device),
            DeviceKind::Block | DeviceKind::NetworkShare => {
                if let Some(mount_point) = device.mount_point.as_deref().filter(|_| device.is_mounted()) {
                    return Ok(Success::mounted_at(mount_point));
                }

                if device.needs_format() {
                    self.phase(request, ActionPhase::Authorizing);
                    let confirmed = self.prompts.confirm_format(device).await;
                    self.phase(request, ActionPhase::Executing);
                    if !confirmed {
                        tracing::info!("format of {} declined", device.id);
                        return Err(Failure::cancelled());
                    }
                    return self.format(device, DEFAULT_FORMAT_FS).await;
                }

                self.mount(request, device, &MountOptions::default()).await
            }
        }
    }

    async fn mount(
        &self,
        request: &Request,
        device: &Device,
        options: &MountOptions,
    ) -> Result<Success, Failure> {
        if let Some(mount_point) = device.mount_point.as_deref().filter(|_| device.is_mounted()) {
            return Ok(Success::mounted_at(mount_point));
        }

        match device.kind {
            DeviceKind::Vault => self.open_vault(),
            DeviceKind::AppEntry => Err(Failure::not_supported("App entries cannot be mounted")),
            DeviceKind::NetworkShare => {
                self.transition(&device.id, MountState::Mounting, self.mount_share(device, options))
                    .await
            }
            DeviceKind::Block => {
                self.transition(&device.id, MountState::Mounting, self.mount_block(request, device))
                    .await
            }
        }
    }

    async fn mount_share(&self, device: &Device, options: &MountOptions) -> Result<Success, Failure> {
        let uri = device
            .source
            .as_deref()
            .ok_or_else(|| Failure::not_supported(format!("{} has no source", device.id)))?;

        let result = self.mounter.mount(uri, options).await?;
        if result.result {
            tracing::info!("mounted {} at {}", device.id, result.mount_point);
            Ok(Success::mounted_at(result.mount_point))
        } else {
            Err(Failure::new(
                OrchestratorErrorKind::from_service_code(result.error_code),
                result.error_message,
            ))
        }
    }

    async fn mount_block(&self, request: &Request, device: &Device) -> Result<Success, Failure> {
        if device.encrypted {
            let cleartext = match &device.cleartext_peer_id {
                Some(peer_id) => match self.registry.get_device(peer_id) {
                    Some(peer) => {
                        if let Some(mount_point) = peer.mount_point.as_deref().filter(|_| peer.is_mounted()) {
                            return Ok(Success::mounted_at(mount_point));
                        }
                        bus_path(&peer)?.to_string()
                    }
                    // Not cataloged yet; the peer id is its bus path.
                    None => peer_id.clone(),
                },
                None => self.unlock(request, device).await?,
            };
            return self.mount_bus_object(&cleartext).await;
        }

        if !device.has_filesystem {
            return Err(Failure::not_supported(format!("{} has no filesystem", device.id)));
        }
        self.mount_bus_object(bus_path(device)?).await
    }

    async fn mount_bus_object(&self, bus_path: &str) -> Result<Success, Failure> {
        let mount_point = self.bus.mount(bus_path).await?;
        tracing::info!("mounted {bus_path} at {mount_point}");
        self.registry
            .apply_bus_event(BusEvent::Changed(bus_path.to_string()))
            .await;
        Ok(Success::mounted_at(mount_point))
    }

    /// Ask for the passphrase and unlock; returns the cleartext bus path
    async fn unlock(&self, request: &Request, device: &Device) -> Result<String, Failure> {
        let shell = bus_path(device)?;

        self.phase(request, ActionPhase::Authorizing);
        let passphrase = self.prompts.ask_passphrase(device).await;
        self.phase(request, ActionPhase::Executing);
        if passphrase.is_empty() {
            tracing::info!("unlock of {} cancelled", device.id);
            return Err(Failure::cancelled());
        }

        let cleartext = self.bus.unlock(shell, &passphrase).await?;
        tracing::info!("unlocked {} as {cleartext}", device.id);

        self.registry
            .apply_bus_event(BusEvent::Changed(shell.to_string()))
            .await;
        self.registry
            .apply_bus_event(BusEvent::Added(cleartext.clone()))
            .await;
        Ok(cleartext)
    }

    async fn unmount(&self, device: &Device) -> Result<Success, Failure> {
        match device.kind {
            DeviceKind::Vault | DeviceKind::AppEntry => Err(Failure::not_supported(format!(
                "{} cannot be unmounted here",
                device.id
            ))),
            DeviceKind::NetworkShare => {
                self.transition(&device.id, MountState::Unmounting, self.unmount_share(device))
                    .await
            }
            DeviceKind::Block => {
                let unlocked = device.encrypted && !device.is_locked();
                if !device.is_mounted() && !unlocked {
                    return Ok(Success::default());
                }
                self.transition(&device.id, MountState::Unmounting, self.unmount_block(device))
                    .await
            }
        }
    }

    async fn unmount_share(&self, device: &Device) -> Result<Success, Failure> {
        let uri = device
            .source
            .as_deref()
            .ok_or_else(|| Failure::not_supported(format!("{} has no source", device.id)))?;

        let result = self.mounter.unmount(uri, &MountOptions::default()).await?;
        if result.result {
            tracing::info!("unmounted {}", device.id);
            Ok(Success::default())
        } else {
            Err(Failure::new(
                OrchestratorErrorKind::from_service_code(result.error_code),
                result.error_message,
            ))
        }
    }

    /// Unmount the filesystem; for an unlocked encrypted device also unmount
    /// the cleartext peer and lock the shell.
    async fn unmount_block(&self, device: &Device) -> Result<Success, Failure> {
        if device.encrypted {
            if let Some(peer_id) = &device.cleartext_peer_id {
                let peer = self.registry.get_device(peer_id);
                if let Some(mounted) = peer.as_ref().filter(|p| p.is_mounted()) {
                    self.bus.unmount(bus_path(mounted)?, false).await?;
                }
                let shell = bus_path(device)?;
                self.bus.lock(shell).await?;
                tracing::info!("locked {}", device.id);
                self.registry
                    .apply_bus_event(BusEvent::Changed(shell.to_string()))
                    .await;
                if let Some(cleartext) = peer.and_then(|p| p.bus_path) {
                    self.registry.apply_bus_event(BusEvent::Removed(cleartext)).await;
                }
            }
            return Ok(Success::default());
        }

        let path = bus_path(device)?;
        self.bus.unmount(path, false).await?;
        tracing::info!("unmounted {}", device.id);
        self.registry
            .apply_bus_event(BusEvent::Changed(path.to_string()))
            .await;
        Ok(Success::default())
    }

    /// Eject, optionally powering the drive off afterwards
    async fn remove(&self, device: &Device, power_off: bool) -> Result<Success, Failure> {
        match device.kind {
            DeviceKind::NetworkShare if power_off => self.unmount(device).await,
            DeviceKind::Block if device.removable => {
                self.unmount(device).await?;

                let path = bus_path(device)?;
                if device.ejectable {
                    self.bus.eject(path).await?;
                    tracing::info!("ejected {}", device.id);
                }
                if power_off && device.can_power_off {
                    self.bus.power_off(path).await?;
                    tracing::info!("powered off {}", device.id);
                }
                Ok(Success::default())
            }
            _ => {
                tracing::info!("{} is not removable, nothing to eject", device.id);
                Err(Failure::not_supported(format!("{} is not removable", device.display_name)))
            }
        }
    }

    async fn rename(&self, device: &Device, name: &str) -> Result<Success, Failure> {
        if device.kind != DeviceKind::Block {
            return Err(Failure::not_supported("Only block devices can be renamed"));
        }
        let name = name.trim();

        if device.removable {
            if device.is_mounted() {
                return Err(Failure::not_supported("Unmount the device before renaming it"));
            }
            let path = bus_path(device)?;
            self.bus.set_label(path, name).await?;
            tracing::info!("relabeled {} to {name}", device.id);
            self.registry
                .apply_bus_event(BusEvent::Changed(path.to_string()))
                .await;
            return Ok(Success::default());
        }

        if device.uuid.is_empty() {
            return Err(Failure::not_supported(format!(
                "{} has no UUID to attach a name to",
                device.id
            )));
        }

        let settings = self.registry.settings();
        let mut aliases = settings.aliases();
        match aliases.iter().position(|a| a.uuid == device.uuid) {
            Some(index) if name.is_empty() => {
                aliases.remove(index);
            }
            Some(index) => {
                aliases[index].alias = name.to_string();
                aliases[index].display_name = device.label.clone();
            }
            None if name.is_empty() => return Ok(Success::default()),
            None => aliases.push(AliasEntry {
                uuid: device.uuid.clone(),
                display_name: device.label.clone(),
                alias: name.to_string(),
            }),
        }
        settings.set_aliases(aliases)?;
        self.registry.reload().await;
        Ok(Success::default())
    }

    async fn properties(&self, device: &Device) -> Result<Success, Failure> {
        let mount_point = device.mount_point.clone().filter(|_| device.is_mounted());

        let (total_bytes, free_bytes) = match mount_point.clone() {
            Some(path) => {
                match tokio::task::spawn_blocking(move || filesystem_usage(Path::new(&path))).await {
                    Ok(Ok(usage)) => (usage.total_bytes, usage.free_bytes),
                    Ok(Err(e)) => {
                        tracing::warn!("usage of {} unavailable: {e}", device.id);
                        (device.size, 0)
                    }
                    Err(e) => {
                        tracing::warn!("usage task for {} failed: {e}", device.id);
                        (device.size, 0)
                    }
                }
            }
            None => (device.size, 0),
        };

        Ok(Success {
            mount_point: mount_point.clone(),
            properties: Some(DeviceProperties {
                name: device.display_name.clone(),
                kind: device.kind,
                fs_type: device.fs_type.clone(),
                device_path: device.device_path.clone(),
                mount_point,
                total_bytes,
                free_bytes,
            }),
        })
    }

    async fn format(&self, device: &Device, fs_type: &str) -> Result<Success, Failure> {
        if device.kind != DeviceKind::Block {
            return Err(Failure::not_supported("Only block devices can be formatted"));
        }
        if device.is_mounted() {
            return Err(Failure::not_supported("Unmount the device before formatting it"));
        }

        let fs_type = if fs_type.is_empty() { DEFAULT_FORMAT_FS } else { fs_type };
        let path = bus_path(device)?;
        self.bus.format(path, fs_type, &device.label).await?;
        tracing::info!("formatted {} as {fs_type}", device.id);
        self.registry
            .apply_bus_event(BusEvent::Changed(path.to_string()))
            .await;
        Ok(Success::default())
    }

    async fn forget_share(&self, device: &Device) -> Result<Success, Failure> {
        if device.kind != DeviceKind::NetworkShare {
            return Err(Failure::not_supported("Only network shares can be forgotten"));
        }
        if device.is_mounted() {
            self.unmount(device).await?;
        }
        self.registry.forget_share(&device.id).await?;
        Ok(Success::default())
    }

    fn open_vault(&self) -> Result<Success, Failure> {
        let vault = self.registry.vault();
        match vault.state(self.registry.mount_table()) {
            VaultState::Unlocked => Ok(Success::mounted_at(
                vault.unlocked_dir().to_string_lossy().into_owned(),
            )),
            VaultState::Encrypted => Err(Failure::new(
                OrchestratorErrorKind::VaultLocked,
                "The vault is locked",
            )),
            VaultState::NotExisted => Err(Failure::new(
                OrchestratorErrorKind::Mount(MountErrorKind::NotExist),
                "The vault has not been created",
            )),
        }
    }

    /// Start the app entry's command detached from the request
    fn launch(&self, device: &Device) -> Result<Success, Failure> {
        let command = device.command.as_deref().unwrap_or_default();
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Failure::not_supported(format!("{} has no command", device.id)))?;

        let mut child = tokio::process::Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Failure::new(
                    OrchestratorErrorKind::NotFound,
                    format!("Could not launch {program}: {e}"),
                )
            })?;
        tracing::info!("launched {program} for {}", device.id);

        self.runtime.spawn(async move {
            if let Err(e) = child.wait().await {
                tracing::warn!("waiting on launched app failed: {e}");
            }
        });
        Ok(Success::default())
    }

    /// Show `state` while `work` runs, then let the mount table decide again
    async fn transition<F>(&self, id: &str, state: MountState, work: F) -> Result<Success, Failure>
    where
        F: Future<Output = Result<Success, Failure>>,
    {
        self.registry.begin_transition(id, state);
        let result = work.await;
        self.registry.settle(id).await;
        result
    }
}
