// SPDX-License-Identifier: GPL-3.0-only

//! COSMIC Ext Mount Service - privileged D-Bus service mounting network shares
//!
//! Mounts `smb://` shares below `<media>/<user>/smbmounts` on behalf of
//! unprivileged callers, with Polkit-based authorization.

use std::sync::Arc;

use anyhow::Result;
use storage_sys::mount_root::{DEFAULT_MEDIA_ROOT, DEFAULT_NAMESPACE};
use storage_sys::{MountRoot, NixMountSyscalls, ProcMountTable};
use tracing_subscriber::{EnvFilter, fmt};
use zbus::connection::Builder as ConnectionBuilder;

mod auth;
mod error;
mod executor;
mod handler;

use auth::PolkitAuthorizer;
use executor::CifsMountExecutor;
use handler::{MountControlHandler, OBJECT_PATH, SERVICE_NAME};

const MEDIA_ROOT_ENV: &str = "COSMIC_EXT_MOUNT_MEDIA_ROOT";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to journald/stderr
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("storage_service=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "Starting COSMIC Ext Mount Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("Mount service must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let media_root =
        std::env::var(MEDIA_ROOT_ENV).unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_string());
    tracing::info!("Managed mount root: {}/<user>/{}", media_root, DEFAULT_NAMESPACE);

    // The authorizer needs its own handle on the bus before the service name is taken
    let polkit_connection = zbus::Connection::system().await?;
    let executor = Arc::new(CifsMountExecutor::new(
        MountRoot::new(media_root, DEFAULT_NAMESPACE),
        Arc::new(ProcMountTable::new()),
        Arc::new(NixMountSyscalls),
        Arc::new(PolkitAuthorizer::new(polkit_connection)),
    ));

    let _connection = ConnectionBuilder::system()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, MountControlHandler::new(executor))?
        .build()
        .await?;

    tracing::info!("Service registered on D-Bus system bus");
    tracing::info!("  - {} at {}", SERVICE_NAME, OBJECT_PATH);

    // Keep service running until shutdown signal
    tracing::info!("Service ready, waiting for requests...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    tracing::info!("COSMIC Ext Mount Service shutting down");
    Ok(())
}
