// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_types::CallerInfo;
use zbus::Connection;
use zbus_polkit::policykit1::{AuthorityProxy, CheckAuthorizationFlags, Subject};

use crate::error::{Result, ServiceError};

/// Polkit action guarding every mount request
pub const MOUNT_ACTION: &str = "org.cosmic.ext.mount-service.mount";

/// Polkit action for unmounting a share mounted by somebody else
pub const UNMOUNT_OTHER_ACTION: &str = "org.cosmic.ext.mount-service.unmount-other";

/// Decides whether a caller may perform a privileged action
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn check(&self, caller: &CallerInfo, action_id: &str) -> Result<bool>;
}

/// Asks polkit about the caller's process, allowing interactive authentication
pub struct PolkitAuthorizer {
    connection: Connection,
}

impl PolkitAuthorizer {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Authorizer for PolkitAuthorizer {
    async fn check(&self, caller: &CallerInfo, action_id: &str) -> Result<bool> {
        tracing::debug!(
            "Checking authorization for sender={} action={}",
            caller.sender,
            action_id
        );

        let authority = AuthorityProxy::new(&self.connection)
            .await
            .map_err(|e| ServiceError::DBus(format!("Failed to connect to Polkit: {e}")))?;

        let dbus_proxy = zbus::fdo::DBusProxy::new(&self.connection)
            .await
            .map_err(|e| ServiceError::DBus(format!("Failed to connect to D-Bus: {e}")))?;

        let bus_name: zbus::names::BusName = caller
            .sender
            .as_str()
            .try_into()
            .map_err(|e| ServiceError::DBus(format!("Invalid bus name: {e}")))?;

        let pid = dbus_proxy
            .get_connection_unix_process_id(bus_name)
            .await
            .map_err(|e| ServiceError::DBus(format!("Failed to get caller PID: {e}")))?;

        let subject = Subject::new_for_owner(pid, None, None).map_err(|e| {
            ServiceError::AuthorizationFailed(format!("Failed to create subject: {e}"))
        })?;

        let result = authority
            .check_authorization(
                &subject,
                action_id,
                &std::collections::HashMap::new(),
                CheckAuthorizationFlags::AllowUserInteraction.into(),
                "",
            )
            .await
            .map_err(|e| ServiceError::DBus(format!("Authorization check failed: {e}")))?;

        tracing::debug!(
            "Authorization result for {}: authorized={}, challenged={}",
            action_id,
            result.is_authorized,
            result.is_challenge
        );

        Ok(result.is_authorized)
    }
}
