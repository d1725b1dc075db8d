// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 manager proxies and the signal-driven bus event stream

use std::collections::HashMap;

use futures::StreamExt;
use storage_contracts::{BusEvent, BusEventStream};
use tokio::sync::mpsc;
use tracing::warn;
use zbus::{
    Connection, MatchRule, MessageStream,
    message::Type as MessageType,
    zvariant::{self, Value},
};
use zbus_macros::proxy;

use crate::error::DiskError;

const UDISKS_SERVICE: &str = "org.freedesktop.UDisks2";
const UDISKS_ROOT: &str = "/org/freedesktop/UDisks2";
const BLOCK_IFACE: &str = "org.freedesktop.UDisks2.Block";

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2/Manager",
    interface = "org.freedesktop.UDisks2.Manager"
)]
pub trait UDisks2Manager {
    fn get_block_devices(
        &self,
        options: HashMap<String, Value<'_>>,
    ) -> zbus::Result<Vec<zvariant::OwnedObjectPath>>;
}

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2",
    interface = "org.freedesktop.DBus.ObjectManager"
)]
pub trait UDisks2ObjectManager {
    #[zbus(signal)]
    fn interfaces_added(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces_and_properties: HashMap<String, HashMap<String, zvariant::OwnedValue>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    fn interfaces_removed(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces: Vec<String>,
    ) -> zbus::Result<()>;
}

/// Merge UDisks2 signals into a single stream of [`BusEvent`]s.
///
/// `InterfacesAdded`/`InterfacesRemoved` touching the Block interface map to
/// `Added`/`Removed`; any `PropertiesChanged` below the UDisks2 root (block
/// or drive objects) maps to `Changed`. The forwarding task ends when the
/// receiver is dropped or the bus closes the streams.
pub async fn device_event_stream(connection: &Connection) -> Result<BusEventStream, DiskError> {
    let (sender, receiver) = mpsc::channel(32);

    let object_manager = UDisks2ObjectManagerProxy::new(connection).await?;
    let mut added_stream = object_manager.receive_interfaces_added().await?;
    let mut removed_stream = object_manager.receive_interfaces_removed().await?;

    let rule = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .sender(UDISKS_SERVICE)?
        .interface("org.freedesktop.DBus.Properties")?
        .member("PropertiesChanged")?
        .path_namespace(UDISKS_ROOT)?
        .build();
    let mut changed_stream = MessageStream::for_match_rule(rule, connection, Some(64)).await?;

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                maybe_added = added_stream.next() => {
                    let Some(signal) = maybe_added else {
                        break;
                    };
                    match signal.args() {
                        Ok(args) if args.interfaces_and_properties.contains_key(BLOCK_IFACE) => {
                            BusEvent::Added(args.object_path.to_string())
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Failed to parse InterfacesAdded signal args: {e}");
                            continue;
                        }
                    }
                }
                maybe_removed = removed_stream.next() => {
                    let Some(signal) = maybe_removed else {
                        break;
                    };
                    match signal.args() {
                        Ok(args) if args.interfaces.iter().any(|i| i == BLOCK_IFACE) => {
                            BusEvent::Removed(args.object_path.to_string())
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Failed to parse InterfacesRemoved signal args: {e}");
                            continue;
                        }
                    }
                }
                maybe_changed = changed_stream.next() => {
                    let Some(message) = maybe_changed else {
                        break;
                    };
                    let Ok(message) = message else {
                        continue;
                    };
                    let header = message.header();
                    let Some(path) = header.path() else {
                        continue;
                    };
                    BusEvent::Changed(path.to_string())
                }
            };

            if let Err(e) = sender.send(event).await {
                warn!("Device event receiver dropped: {e}");
                break;
            }
        }
    });

    Ok(Box::pin(receiver_stream(receiver)))
}

fn receiver_stream(
    mut receiver: mpsc::Receiver<BusEvent>,
) -> impl futures::Stream<Item = BusEvent> + Send {
    futures::stream::poll_fn(move |cx| receiver.poll_recv(cx))
}
