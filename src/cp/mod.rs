/*!
The control-point half of the core: discovering devices on the network,
tracking them in a [`device_list::DeviceList`], and fetching their
description documents before handing out a ready [`crate::device::DeviceHandle`].
*/
pub mod device_list;
pub mod fetch;
pub mod listener;

use crate::adapter::AdapterEvent;
use device_list::DeviceList;
use listener::Listener;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Drive a device list's lifecycle from adapter change events: tear it
/// down (emitting `Removed` for every entry) when its adapter disappears,
/// and kick off a fresh `refresh()` once an adapter becomes current again.
///
/// This is the glue between [`crate::adapter::AdapterService`] and a
/// per-adapter [`DeviceList`]/[`Listener`] pair; a control point with one
/// list per adapter spawns one of these per adapter it cares about.
pub fn spawn_adapter_watch(
    mut adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    list: DeviceList,
    listener: Arc<Listener>,
    mx: u8,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = adapter_events.recv().await {
            match event {
                AdapterEvent::CurrentChanged(None) | AdapterEvent::AdapterRemoved(_) => {
                    info!("adapter gone, tearing down device list");
                    list.teardown();
                }
                AdapterEvent::CurrentChanged(Some(_)) | AdapterEvent::AdapterAdded(_) => {
                    info!("adapter (re)appeared, refreshing device list");
                    list.refresh(&listener, mx).await;
                }
                AdapterEvent::SubnetListChanged(_) => {
                    debug!("subnet list changed, no device list action needed");
                }
            }
        }
    })
}
