/*!
The device-side SSDP listener: joins the multicast group on one adapter,
decodes incoming `M-SEARCH` requests, and answers on behalf of every
device registered on it via [`AnnouncementManager::respond_to_search`].

This is the device-side mirror of [`crate::cp::listener::Listener`]: where
that one dispatches advertisements into device lists, this one dispatches
search requests into served devices.
*/
use crate::adapter::Adapter;
use crate::dv::announce::{AnnouncementManager, Announcer, DeviceAnnouncement};
use crate::error::Result;
use crate::timer::Cancellation;
use crate::wire::message::parse_search_request;
use crate::wire::protocol::{BUFFER_SIZE, MULTICAST_PORT};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tracing::{trace, warn};

/// One served device, paired with the location URL a search response for
/// it should advertise on this adapter.
struct Served {
    device: DeviceAnnouncement,
    location: String,
}

/// One adapter's device-side SSDP listener, answering `M-SEARCH` requests
/// for every device registered on it.
pub struct SearchListener<A: Announcer> {
    socket: Arc<UdpSocket>,
    adapter: Adapter,
    manager: Arc<AnnouncementManager<A>>,
    served: Arc<Mutex<Vec<Served>>>,
}

impl<A: Announcer + 'static> SearchListener<A> {
    pub async fn bind(adapter: Adapter, manager: Arc<AnnouncementManager<A>>) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, MULTICAST_PORT)).await?;
        if let std::net::IpAddr::V4(interface) = adapter.ip_addr {
            socket.join_multicast_v4(Ipv4Addr::new(239, 255, 255, 250), interface)?;
        }
        Ok(SearchListener {
            socket: Arc::new(socket),
            adapter,
            manager,
            served: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Register a device (and the location URL its description is served
    /// from on this adapter) to answer `M-SEARCH` requests received here.
    pub fn register(&self, device: DeviceAnnouncement, location: String) {
        self.served.lock().unwrap().push(Served { device, location });
    }

    /// Run the receive loop until the socket errors or the task is
    /// cancelled. Each matching device answers on its own spawned task, so
    /// one slow response burst never delays the others.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let datagram = match std::str::from_utf8(&buf[..len]) {
                Ok(s) => s,
                Err(_) => {
                    warn!("discarding non-utf8 M-SEARCH datagram");
                    continue;
                }
            };
            let request = match parse_search_request(datagram) {
                Ok(r) => r,
                Err(_) => continue,
            };
            trace!(%from, st = %request.search_target, mx = request.mx, "dispatching M-SEARCH");

            let served: Vec<(DeviceAnnouncement, String)> = self
                .served
                .lock()
                .unwrap()
                .iter()
                .map(|s| (s.device.clone(), s.location.clone()))
                .collect();
            for (device, location) in served {
                let manager = self.manager.clone();
                let adapter = self.adapter.clone();
                let query = request.search_target.clone();
                let mx = request.mx;
                tokio::spawn(async move {
                    let cancel = Cancellation::new();
                    if let Err(e) = manager.respond_to_search(&device, &adapter, &location, &query, mx, &cancel).await {
                        warn!(udn = %device.udn, error = %e, "search response failed");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::description::TypeId;
    use crate::device::Udn;
    use async_trait::async_trait;
    use ipnetwork::IpNetwork;
    use std::net::IpAddr;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct NullAnnouncer;

    #[async_trait]
    impl Announcer for NullAnnouncer {
        async fn send(&self, _datagram: &str, _adapter: &Adapter) -> Result<()> {
            Ok(())
        }
    }

    fn loopback_adapter() -> Adapter {
        Adapter {
            name: "lo".to_string(),
            ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            subnet: IpNetwork::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8).unwrap(),
            loopback: true,
        }
    }

    fn device() -> DeviceAnnouncement {
        DeviceAnnouncement {
            udn: Udn("abc-123".to_string()),
            is_root: true,
            device_type: TypeId::device("Basic", "1"),
            service_types: vec![],
            max_age: Duration::from_secs(1800),
        }
    }

    #[tokio::test]
    async fn register_accepts_a_device() {
        let manager = Arc::new(AnnouncementManager::new(Arc::new(NullAnnouncer), Config::default(), Arc::new(AtomicU32::new(1))));
        // Binding a real multicast socket isn't guaranteed to work in every
        // sandbox; this only exercises the registration bookkeeping.
        if let Ok(listener) = SearchListener::bind(loopback_adapter(), manager).await {
            listener.register(device(), "http://127.0.0.1/desc.xml".to_string());
            assert_eq!(listener.served.lock().unwrap().len(), 1);
        }
    }
}
