/*!
The control point's SSDP listener: joins the multicast group on one
adapter, decodes every datagram that arrives (both unsolicited
`NOTIFY`s and unicast `M-SEARCH` responses), and dispatches matching
advertisements into every registered [`DeviceList`].
*/
use crate::config::Config;
use crate::cp::device_list::DeviceList;
use crate::error::Result;
use crate::wire::message::{build_search, parse_advertisement};
use crate::wire::protocol::{BUFFER_SIZE, MULTICAST_PORT};
use crate::wire::search_target::SearchTarget;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tracing::{trace, warn};

/// One adapter's SSDP listener socket, bound to the multicast port and
/// joined to the SSDP group on that adapter's interface address.
pub struct Listener {
    socket: Arc<UdpSocket>,
    lists: Arc<Mutex<Vec<DeviceList>>>,
}

impl Listener {
    pub async fn bind(interface: Ipv4Addr) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MULTICAST_PORT)).await?;
        socket.join_multicast_v4(Ipv4Addr::new(239, 255, 255, 250), interface)?;
        Ok(Listener {
            socket: Arc::new(socket),
            lists: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Register a device list to receive advertisements seen on this
    /// listener. A list may be registered on multiple listeners (one per
    /// adapter) when it isn't scoped to a single interface.
    pub fn register(&self, list: DeviceList) {
        self.lists.lock().unwrap().push(list);
    }

    /// Broadcast an `M-SEARCH` for `search_target` on this listener's
    /// socket and spend up to `mx` seconds collecting unicast responses,
    /// which are dispatched into the registered lists exactly like
    /// multicast traffic.
    pub async fn search(&self, search_target: &SearchTarget, mx: u8) -> Result<()> {
        let datagram = build_search(search_target, mx);
        let dest = SocketAddr::from((Ipv4Addr::new(239, 255, 255, 250), MULTICAST_PORT));
        self.socket.send_to(datagram.as_bytes(), dest).await?;
        Ok(())
    }

    /// Run the receive loop until the socket errors or the task is
    /// cancelled. Malformed datagrams are logged and discarded; they never
    /// bring the loop down.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let (len, _from) = self.socket.recv_from(&mut buf).await?;
            let datagram = match std::str::from_utf8(&buf[..len]) {
                Ok(s) => s,
                Err(_) => {
                    warn!("discarding non-utf8 SSDP datagram");
                    continue;
                }
            };
            match parse_advertisement(datagram) {
                Ok(ad) => {
                    trace!(udn = %ad.udn, "dispatching advertisement");
                    for list in self.lists.lock().unwrap().iter() {
                        list.handle_advertisement(ad.clone());
                    }
                }
                Err(e) => warn!(error = %e, "discarding malformed SSDP datagram"),
            }
        }
    }
}

/// Construct a search `M-SEARCH` burst across every adapter's listener,
/// using [`Config::default_mx`] unless `mx` is given.
pub async fn search_all(listeners: &[Arc<Listener>], search_target: &SearchTarget, config: &Config, mx: Option<u8>) -> Result<()> {
    let mx = mx.unwrap_or(config.default_mx);
    for listener in listeners {
        listener.search(search_target, mx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::device_list::DeviceListFilter;
    use crate::cp::fetch::MockFetcher;
    use std::sync::Arc;

    #[tokio::test]
    async fn register_accepts_a_list() {
        let list = DeviceList::new(DeviceListFilter::All, Config::default(), Arc::new(MockFetcher::failing()));
        // Binding a real multicast socket isn't guaranteed to work in every
        // sandbox; this only exercises the registration bookkeeping.
        if let Ok(listener) = Listener::bind(Ipv4Addr::UNSPECIFIED).await {
            listener.register(list);
            assert_eq!(listener.lists.lock().unwrap().len(), 1);
        }
    }
}
