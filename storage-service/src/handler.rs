// SPDX-License-Identifier: GPL-3.0-only

//! Mount control D-Bus interface
//!
//! Both methods take the logical share URI plus JSON encoded
//! `MountOptions` and answer with a JSON encoded result. Failures of the
//! mount itself travel inside the result; D-Bus errors are reserved for
//! malformed requests and unidentifiable callers.

use std::sync::Arc;

use storage_sys::user_for_uid;
use storage_types::{CallerInfo, MountOptions};
use zbus::message::Header as MessageHeader;
use zbus::{Connection, interface};

use crate::error::{Result, ServiceError};
use crate::executor::CifsMountExecutor;

pub const SERVICE_NAME: &str = "org.cosmic.ext.MountService";
pub const OBJECT_PATH: &str = "/org/cosmic/ext/MountService";

pub struct MountControlHandler {
    executor: Arc<CifsMountExecutor>,
}

impl MountControlHandler {
    pub fn new(executor: Arc<CifsMountExecutor>) -> Self {
        Self { executor }
    }
}

fn parse_options(options_json: &str) -> Result<MountOptions> {
    if options_json.trim().is_empty() {
        return Ok(MountOptions::default());
    }
    serde_json::from_str(options_json)
        .map_err(|e| ServiceError::InvalidArgument(format!("Invalid mount options: {e}")))
}

/// Identify the peer behind `header` by its unix uid and passwd entry
async fn resolve_caller(connection: &Connection, header: &MessageHeader<'_>) -> Result<CallerInfo> {
    let sender = header
        .sender()
        .ok_or_else(|| ServiceError::UnknownCaller("No sender in message header".to_string()))?
        .as_str()
        .to_string();

    let dbus_proxy = zbus::fdo::DBusProxy::new(connection).await?;
    let bus_name: zbus::names::BusName = sender
        .as_str()
        .try_into()
        .map_err(|e| ServiceError::UnknownCaller(format!("Invalid bus name: {e}")))?;

    let uid = dbus_proxy
        .get_connection_unix_user(bus_name)
        .await
        .map_err(|e| ServiceError::UnknownCaller(format!("Failed to get caller UID: {e}")))?;

    tracing::debug!("Caller {} has UID {}", sender, uid);

    match user_for_uid(uid) {
        Ok(user) => Ok(CallerInfo::new(uid, user.gid, Some(user.name), sender)),
        Err(e) => {
            tracing::warn!("no passwd entry for caller uid {}: {}", uid, e);
            Ok(CallerInfo::new(uid, uid, None, sender))
        }
    }
}

#[interface(name = "org.cosmic.ext.MountService.MountControl")]
impl MountControlHandler {
    /// Mount an `smb://host/share` URI for the calling user
    async fn mount(
        &self,
        source_uri: &str,
        options_json: &str,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] header: MessageHeader<'_>,
    ) -> zbus::fdo::Result<String> {
        let caller = resolve_caller(connection, &header).await?;
        let options = parse_options(options_json)?;
        tracing::info!("Mount request for {} (UID {})", source_uri, caller.uid);

        let result = self.executor.mount(&caller, source_uri, &options).await;
        serde_json::to_string(&result).map_err(|e| ServiceError::from(e).into())
    }

    /// Unmount a share previously mounted through this service
    async fn unmount(
        &self,
        source_uri: &str,
        options_json: &str,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] header: MessageHeader<'_>,
    ) -> zbus::fdo::Result<String> {
        let caller = resolve_caller(connection, &header).await?;
        let options = parse_options(options_json)?;
        tracing::info!("Unmount request for {} (UID {})", source_uri, caller.uid);

        let result = self.executor.unmount(&caller, source_uri, &options).await;
        serde_json::to_string(&result).map_err(|e| ServiceError::from(e).into())
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_mean_guest_defaults() {
        assert_eq!(parse_options("").expect("empty"), MountOptions::default());
        assert_eq!(parse_options("{}").expect("object"), MountOptions::default());
    }

    #[test]
    fn options_json_is_parsed() {
        let opts = parse_options(r#"{"user":"a","passwd":"b","timeout_seconds":3}"#)
            .expect("valid json");
        assert_eq!(opts.user.as_deref(), Some("a"));
        assert_eq!(opts.timeout_seconds, Some(3));
    }

    #[test]
    fn malformed_options_are_invalid_args() {
        let err = parse_options("{user").expect_err("malformed");
        assert!(matches!(
            zbus::fdo::Error::from(err),
            zbus::fdo::Error::InvalidArgs(_)
        ));
    }
}
