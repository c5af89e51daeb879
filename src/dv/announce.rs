/*!
The device-side announcement scheduler: turns one enabled device into the
table of `ssdp:alive`/`ssdp:byebye`/`ssdp:update` messages the UDA requires
(`rootdevice` + `UUID` + `deviceType` + one per embedded service, 3 +
serviceCount for a root device and 2 + serviceCount for an embedded one),
and paces their transmission across a randomized burst window per adapter.

Sending is behind the [`Announcer`] trait so the scheduling logic can be
unit-tested without opening a socket.
*/
use crate::adapter::Adapter;
use crate::config::Config;
use crate::description::TypeId;
use crate::device::Udn;
use crate::error::Result;
use crate::timer::{next_slot_delay, Cancellation};
use crate::wire::message::{build_notify, build_search_response};
use crate::wire::protocol::{NTS_ALIVE, NTS_BYEBYE, NTS_UPDATE};
use crate::wire::search_target::SearchTarget;
use async_trait::async_trait;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything the scheduler needs to know about one device being
/// announced: its identity, type, embedded service types, and where its
/// description document can be fetched from on a given adapter.
#[derive(Clone, Debug)]
pub struct DeviceAnnouncement {
    pub udn: Udn,
    pub is_root: bool,
    pub device_type: TypeId,
    pub service_types: Vec<TypeId>,
    pub max_age: Duration,
}

impl DeviceAnnouncement {
    /// The ordered set of `(search-target)` lines a single announcement
    /// pass emits for this device: `rootdevice` first (root devices only),
    /// then the bare UUID, then the device type, then one line per
    /// embedded service type.
    pub fn targets(&self) -> Vec<SearchTarget> {
        let mut targets = Vec::with_capacity(2 + self.service_types.len() + self.is_root as usize);
        if self.is_root {
            targets.push(SearchTarget::RootDevice);
        }
        targets.push(SearchTarget::Uuid(self.udn.0.clone()));
        targets.push(SearchTarget::DeviceType(self.device_type.clone()));
        targets.extend(self.service_types.iter().cloned().map(SearchTarget::ServiceType));
        targets
    }

    /// Expected message count: `3 + serviceCount` for a root device,
    /// `2 + serviceCount` for an embedded one.
    pub fn expected_message_count(&self) -> usize {
        self.targets().len()
    }

    /// Which of this device's own advertisement targets should answer an
    /// incoming `M-SEARCH`'s `query`, in the same order `targets()` uses
    /// for an alive burst: `ssdp:all` answers with every target
    /// (`MsearchResponseAll`), anything more specific answers with at most
    /// the one matching target (`StartRoot`/`StartUuid`/`StartDeviceType`/
    /// `StartServiceType`).
    pub fn matching_targets(&self, query: &SearchTarget) -> Vec<SearchTarget> {
        match query {
            SearchTarget::All => self.targets(),
            SearchTarget::RootDevice => {
                if self.is_root {
                    vec![SearchTarget::RootDevice]
                } else {
                    vec![]
                }
            }
            SearchTarget::Uuid(udn) => {
                if &self.udn.0 == udn {
                    vec![SearchTarget::Uuid(udn.clone())]
                } else {
                    vec![]
                }
            }
            SearchTarget::DeviceType(t) => {
                if t == &self.device_type {
                    vec![SearchTarget::DeviceType(t.clone())]
                } else {
                    vec![]
                }
            }
            SearchTarget::ServiceType(t) => {
                if self.service_types.contains(t) {
                    vec![SearchTarget::ServiceType(t.clone())]
                } else {
                    vec![]
                }
            }
        }
    }
}

/// A stable identifier for a `(UDN, serviceType)` pair's configuration,
/// used as the `CONFIGID.UPNP.ORG` value. Stable across restarts as long as
/// the device's shape (UDN plus the ordered list of embedded service
/// types) doesn't change.
pub fn config_id(udn: &Udn, service_types: &[TypeId]) -> u32 {
    let mut hasher = DefaultHasher::new();
    udn.0.hash(&mut hasher);
    for st in service_types {
        st.to_string().hash(&mut hasher);
    }
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

/// Transmits one built datagram on one adapter. The default production
/// implementation opens a UDP socket per adapter with the configured TTL;
/// tests substitute an in-memory recorder.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn send(&self, datagram: &str, adapter: &Adapter) -> Result<()>;
}

/// Drives the burst schedule for one device across one or more adapters.
///
/// `boot_id` increments exactly once per process run of the announcer
/// subsystem (not per device, not per adapter) and is stamped onto every
/// message this scheduler sends.
pub struct AnnouncementManager<A: Announcer> {
    announcer: Arc<A>,
    config: Config,
    boot_id: Arc<AtomicU32>,
}

impl<A: Announcer> AnnouncementManager<A> {
    /// `boot_id` is owned by the announcer *subsystem*, not the process: a
    /// test harness (or a caller) that restarts just the announcement
    /// manager — without restarting the process — must observe BOOTID
    /// advance, so construction bumps the shared counter rather than
    /// reading it unchanged.
    pub fn new(announcer: Arc<A>, config: Config, boot_id: Arc<AtomicU32>) -> Self {
        boot_id.fetch_add(1, Ordering::SeqCst);
        AnnouncementManager { announcer, config, boot_id }
    }

    fn current_boot_id(&self) -> u32 {
        self.boot_id.load(Ordering::SeqCst)
    }

    /// Send one `ssdp:alive` burst for `device` on `adapter`, spacing
    /// messages across `window` with per-slot jitter.
    pub async fn announce_alive(
        &self,
        device: &DeviceAnnouncement,
        adapter: &Adapter,
        location: &str,
        window: Duration,
        cancel: &Cancellation,
    ) -> Result<()> {
        self.burst(device, adapter, location, NTS_ALIVE, device.max_age, window, cancel)
            .await
    }

    /// Send one `ssdp:byebye` burst; `max-age` is irrelevant for byebye so
    /// it's sent as zero.
    pub async fn announce_byebye(
        &self,
        device: &DeviceAnnouncement,
        adapter: &Adapter,
        location: &str,
        window: Duration,
        cancel: &Cancellation,
    ) -> Result<()> {
        self.burst(device, adapter, location, NTS_BYEBYE, Duration::ZERO, window, cancel)
            .await
    }

    /// Send one `ssdp:update` burst, announcing a `NEXTBOOTID` change.
    pub async fn announce_update(
        &self,
        device: &DeviceAnnouncement,
        adapter: &Adapter,
        location: &str,
        window: Duration,
        cancel: &Cancellation,
    ) -> Result<()> {
        self.burst(device, adapter, location, NTS_UPDATE, device.max_age, window, cancel)
            .await
    }

    /// Answer one incoming `M-SEARCH` for `device`: build a unicast
    /// `200 OK` for every target `query` matches and spread them across the
    /// requester's own `mx` window, the same jittered-slot pacing `burst`
    /// uses for multicast announcements. A `query` that matches nothing on
    /// this device sends no response at all.
    pub async fn respond_to_search(
        &self,
        device: &DeviceAnnouncement,
        adapter: &Adapter,
        location: &str,
        query: &SearchTarget,
        mx: u8,
        cancel: &Cancellation,
    ) -> Result<()> {
        let targets = device.matching_targets(query);
        let count = targets.len();
        if count == 0 {
            return Ok(());
        }
        let boot_id = self.current_boot_id();
        let config_id = config_id(&device.udn, &device.service_types);
        let window = Duration::from_secs(mx.max(1) as u64);

        for (i, target) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(udn = %device.udn, "search response burst cancelled mid-flight");
                return Ok(());
            }
            let datagram =
                build_search_response(&device.udn.0, &target, location, device.max_age, boot_id, config_id);
            self.announcer.send(&datagram, adapter).await?;

            let remaining = count - i - 1;
            if remaining > 0 {
                let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
                let delay = next_slot_delay(window, remaining, self.config.min_schedule_slot, jitter);
                if cancel.sleep_or_cancelled(delay).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn burst(
        &self,
        device: &DeviceAnnouncement,
        adapter: &Adapter,
        location: &str,
        nts: &str,
        max_age: Duration,
        window: Duration,
        cancel: &Cancellation,
    ) -> Result<()> {
        let targets = device.targets();
        let count = targets.len();
        let boot_id = self.current_boot_id();
        let config_id = config_id(&device.udn, &device.service_types);

        for (i, target) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(udn = %device.udn, "announcement burst cancelled mid-flight");
                return Ok(());
            }
            let datagram = build_notify(&device.udn.0, &target, location, max_age, nts, boot_id, config_id);
            self.announcer.send(&datagram, adapter).await?;

            let remaining = count - i - 1;
            if remaining > 0 {
                let jitter: f64 = rand::thread_rng().gen_range(0.5..1.0);
                let delay = next_slot_delay(window, remaining, self.config.min_schedule_slot, jitter);
                if cancel.sleep_or_cancelled(delay).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
