// SPDX-License-Identifier: GPL-3.0-only

//! Shared D-Bus connection management
//!
//! A single system bus connection is cached and reused by every client.

use std::sync::OnceLock;

use zbus::Connection;

use super::error::ClientError;

static SYSTEM_CONNECTION: OnceLock<Connection> = OnceLock::new();

/// Get or create the shared system bus connection
pub async fn shared_connection() -> Result<&'static Connection, ClientError> {
    if let Some(conn) = SYSTEM_CONNECTION.get() {
        return Ok(conn);
    }

    // Two tasks may race here; OnceLock keeps the first and the other is dropped.
    let conn = Connection::system()
        .await
        .map_err(|e| ClientError::Connection(format!("Failed to connect to system bus: {}", e)))?;

    let _ = SYSTEM_CONNECTION.set(conn);

    SYSTEM_CONNECTION.get().ok_or_else(|| {
        ClientError::Connection("Failed to initialize shared system bus connection".to_string())
    })
}
