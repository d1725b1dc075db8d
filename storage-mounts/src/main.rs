// SPDX-License-Identifier: GPL-3.0-only

//! Command line front-end for device discovery and mount actions

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use storage_contracts::client::MountControlClient;
use storage_contracts::{
    DeviceBus, MountTableSource, NetworkMounter, PromptProvider, SettingsStore, StorageError,
    StorageErrorKind,
};
use storage_mounts::backend::WatchEvent;
use storage_mounts::orchestrator::{Action, ActionOutcome, DEFAULT_FORMAT_FS};
use storage_mounts::registry::RegistryEvent;
use storage_mounts::virtual_path::VirtualUrl;
use storage_mounts::{Config, FileSettingsStore, Subsystem, logging};
use storage_sys::ProcMountTable;
use storage_types::{Device, MountOptions, MountResult, UnmountResult};
use storage_udisks::UDisksBus;

const PASSPHRASE_ENV: &str = "COSMIC_EXT_MOUNTS_PASSPHRASE";

/// Discover, mount and manage removable drives, network shares and the vault
#[derive(Parser)]
#[command(name = "cosmic-ext-mounts")]
#[command(about = "Manage mountable storage", long_about = None)]
struct Cli {
    /// Answer yes to format confirmations
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known devices
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Open a device, mounting or unlocking it when needed
    Open { id: String },
    /// Mount a device
    Mount {
        id: String,
        /// Share user name
        #[arg(long)]
        user: Option<String>,
        /// Share password
        #[arg(long)]
        password: Option<String>,
        /// Share domain
        #[arg(long)]
        domain: Option<String>,
        /// Connection timeout in seconds
        #[arg(long)]
        timeout: Option<u32>,
    },
    /// Unmount a device
    Unmount { id: String },
    /// Unmount and eject a removable device
    Eject { id: String },
    /// Unmount, eject and power off a removable device
    SafelyRemove { id: String },
    /// Rename a device; an empty name removes an alias
    Rename { id: String, name: String },
    /// Show device properties
    Properties { id: String },
    /// Format a block device
    Format {
        id: String,
        #[arg(long, default_value = DEFAULT_FORMAT_FS)]
        fs: String,
    },
    /// Remember a network share
    RegisterShare {
        /// Share URI, e.g. smb://server/share
        uri: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Forget a remembered network share
    ForgetShare { id: String },
    /// List a directory by virtual URL
    Ls { url: String },
    /// Print device events until interrupted
    Watch {
        /// Watch a directory by virtual URL instead of devices
        url: Option<String>,
    },
}

/// Prompts answered on the terminal
struct TerminalPrompts {
    assume_yes: bool,
}

fn read_line(prompt: String) -> String {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim_end_matches(['\r', '\n']).to_string()
}

async fn ask(prompt: String) -> String {
    tokio::task::spawn_blocking(move || read_line(prompt))
        .await
        .unwrap_or_default()
}

#[async_trait]
impl PromptProvider for TerminalPrompts {
    async fn confirm_format(&self, device: &Device) -> bool {
        if self.assume_yes {
            return true;
        }
        let answer = ask(format!(
            "{} has no filesystem. Format it as {DEFAULT_FORMAT_FS}? [y/N] ",
            device.display_name
        ))
        .await;
        matches!(answer.trim(), "y" | "Y" | "yes")
    }

    async fn ask_passphrase(&self, device: &Device) -> String {
        if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
            return passphrase;
        }
        ask(format!("Passphrase for {}: ", device.display_name)).await
    }

    async fn show_error(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}

/// Stand-in when the privileged mount service cannot be reached
struct UnavailableMounter(String);

impl UnavailableMounter {
    fn error(&self) -> StorageError {
        StorageError::new(StorageErrorKind::Unavailable, self.0.clone())
    }
}

#[async_trait]
impl NetworkMounter for UnavailableMounter {
    async fn mount(&self, _: &str, _: &MountOptions) -> Result<MountResult, StorageError> {
        Err(self.error())
    }

    async fn unmount(&self, _: &str, _: &MountOptions) -> Result<UnmountResult, StorageError> {
        Err(self.error())
    }
}

fn print_devices(subsystem: &Subsystem, devices: &[Device]) {
    for device in devices {
        let managed = if subsystem.is_managed_mount(device) { "*" } else { " " };
        println!(
            "{managed}{:<28} {:<14} {:<10} {:<24} {}",
            device.id,
            device.kind.scheme(),
            format!("{:?}", device.mount_state).to_lowercase(),
            device.display_name,
            device.mount_point.as_deref().unwrap_or("-"),
        );
    }
}

fn report(outcome: ActionOutcome) -> Result<()> {
    if !outcome.success {
        bail!(
            "{} failed ({}): {}",
            outcome.action,
            outcome.error_code,
            outcome.error_message
        );
    }
    if let Some(properties) = &outcome.properties {
        println!("{}", serde_json::to_string_pretty(properties)?);
    } else if let Some(mount_point) = &outcome.mount_point {
        println!("{mount_point}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    logging::init(&config);

    let bus: Arc<dyn DeviceBus> = Arc::new(
        UDisksBus::new()
            .await
            .context("Failed to connect to UDisks2")?,
    );
    let mounts: Arc<dyn MountTableSource> = Arc::new(ProcMountTable::new());
    let settings: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::open(config.settings_path()));
    let mounter: Arc<dyn NetworkMounter> = match MountControlClient::new().await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("mount service unavailable: {e}");
            Arc::new(UnavailableMounter(e.to_string()))
        }
    };
    let prompts = Arc::new(TerminalPrompts {
        assume_yes: cli.yes,
    });

    let mut subsystem = Subsystem::init(config, bus, mounts, settings, mounter, prompts).await?;
    let orchestrator = subsystem.orchestrator().clone();

    let result = match cli.command {
        Commands::List { json } => {
            let devices = subsystem.registry().list_devices();
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else {
                print_devices(&subsystem, &devices);
            }
            Ok(())
        }
        Commands::Open { id } => report(orchestrator.run(&id, Action::Open).await),
        Commands::Mount {
            id,
            user,
            password,
            domain,
            timeout,
        } => {
            let options = MountOptions {
                user,
                passwd: password,
                domain,
                timeout_seconds: timeout,
            };
            report(orchestrator.run(&id, Action::Mount { options }).await)
        }
        Commands::Unmount { id } => report(orchestrator.run(&id, Action::Unmount).await),
        Commands::Eject { id } => report(orchestrator.run(&id, Action::Eject).await),
        Commands::SafelyRemove { id } => report(orchestrator.run(&id, Action::SafelyRemove).await),
        Commands::Rename { id, name } => {
            report(orchestrator.run(&id, Action::Rename { name }).await)
        }
        Commands::Properties { id } => report(orchestrator.run(&id, Action::Properties).await),
        Commands::Format { id, fs } => {
            report(orchestrator.run(&id, Action::Format { fs_type: fs }).await)
        }
        Commands::RegisterShare { uri, label } => {
            let device = subsystem
                .registry()
                .register_share(&uri, label.as_deref())
                .await?;
            println!("{}", device.id);
            Ok(())
        }
        Commands::ForgetShare { id } => report(orchestrator.run(&id, Action::ForgetShare).await),
        Commands::Ls { url } => {
            let url: VirtualUrl = url.parse()?;
            for child in subsystem.dispatch().children(&url)? {
                let marker = if child.is_dir { "/" } else { "" };
                println!("{:>12}  {}{marker}", child.size, child.url);
            }
            Ok(())
        }
        Commands::Watch { url: Some(url) } => {
            let url: VirtualUrl = url.parse()?;
            let mut watcher = subsystem.dispatch().watch(&url)?;
            loop {
                tokio::select! {
                    event = watcher.recv() => match event {
                        Some(WatchEvent::Created(url)) => println!("created  {url}"),
                        Some(WatchEvent::Removed(url)) => println!("removed  {url}"),
                        Some(WatchEvent::Modified(url)) => println!("modified {url}"),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok(())
        }
        Commands::Watch { url: None } => {
            let mut events = subsystem.registry().subscribe();
            print_devices(&subsystem, &subsystem.registry().list_devices());
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(RegistryEvent::DeviceAdded { device }) => println!("added    {}", device.id),
                        Ok(RegistryEvent::DeviceRemoved { id }) => println!("removed  {id}"),
                        Ok(RegistryEvent::DeviceChanged { device }) => println!("changed  {}", device.id),
                        Ok(RegistryEvent::MountAdded { device }) => println!(
                            "mounted  {} at {}",
                            device.id,
                            device.mount_point.as_deref().unwrap_or_default()
                        ),
                        Ok(RegistryEvent::MountRemoved { id }) => println!("unmounted {id}"),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("skipped {n} device events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok(())
        }
    };

    subsystem.shutdown();
    result
}
