/*!
The control point's device list: a filtered view over every device
currently advertised on the network, kept current by `ssdp:alive`/
`ssdp:byebye`/`ssdp:update` traffic, each entry's own max-age expiry timer,
and periodic `refresh()` cycles driven by adapter changes or resume-from-
suspend.

A `DeviceList` is constructed with a [`DeviceListFilter`] narrowing which
advertisements it accepts, mirroring a control point that only cares about
one device or service type. A `refresh()` rebuilds the live map from
scratch behind a shadow snapshot of the previous one, so a diff at the end
can report exactly what appeared and disappeared across the cycle.
*/
use crate::config::Config;
use crate::cp::fetch::XmlFetcher;
use crate::cp::listener::Listener;
use crate::device::{DeviceHandle, ReadyState, Udn};
use crate::timer::Cancellation;
use crate::wire::message::{Advertisement, NotificationType};
use crate::wire::search_target::{SearchTarget, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Which advertisements a [`DeviceList`] accepts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceListFilter {
    All,
    DeviceType(TypeId),
    ServiceType(TypeId),
    Uuid(String),
}

impl DeviceListFilter {
    fn matches(&self, ad: &Advertisement) -> bool {
        match self {
            DeviceListFilter::All => true,
            DeviceListFilter::DeviceType(t) => {
                matches!(&ad.search_target, SearchTarget::DeviceType(st) if st == t)
            }
            DeviceListFilter::ServiceType(t) => {
                matches!(&ad.search_target, SearchTarget::ServiceType(st) if st == t)
            }
            DeviceListFilter::Uuid(udn) => &ad.udn == udn,
        }
    }

    /// The search target a `refresh()` cycle should broadcast to repopulate
    /// this list.
    fn search_target(&self) -> SearchTarget {
        match self {
            DeviceListFilter::All => SearchTarget::All,
            DeviceListFilter::DeviceType(t) => SearchTarget::DeviceType(t.clone()),
            DeviceListFilter::ServiceType(t) => SearchTarget::ServiceType(t.clone()),
            DeviceListFilter::Uuid(udn) => SearchTarget::Uuid(udn.clone()),
        }
    }
}

/// Observable changes a [`DeviceList`] reports to its subscribers.
#[derive(Clone, Debug)]
pub enum DeviceListEvent {
    Added(DeviceHandle),
    Removed(DeviceHandle),
    Refreshed(DeviceHandle),
}

struct Entry {
    handle: DeviceHandle,
    expiry: Cancellation,
    /// Absolute wall-clock deadline this entry's expiry timer is currently
    /// armed for; an `ssdp:alive`/`ssdp:update` only re-arms the timer when
    /// its new deadline is later than this one.
    deadline: Instant,
}

struct Shared {
    filter: DeviceListFilter,
    config: Config,
    fetcher: Arc<dyn XmlFetcher>,
    entries: Mutex<HashMap<Udn, Entry>>,
    observers: Mutex<Vec<mpsc::UnboundedSender<DeviceListEvent>>>,
    /// Set for the duration of a `refresh()` cycle: suppresses the normal
    /// per-fetch `Added` notification so the refresh's own diff-based
    /// notification at the end of the cycle is the single source of truth
    /// for devices that first appeared during it.
    refreshing: AtomicBool,
}

/// A live, filtered view onto the network's advertised devices.
#[derive(Clone)]
pub struct DeviceList {
    shared: Arc<Shared>,
}

impl DeviceList {
    pub fn new(filter: DeviceListFilter, config: Config, fetcher: Arc<dyn XmlFetcher>) -> Self {
        DeviceList {
            shared: Arc::new(Shared {
                filter,
                config,
                fetcher,
                entries: Mutex::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceListEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().unwrap().push(tx);
        rx
    }

    pub fn find(&self, udn: &Udn) -> Option<DeviceHandle> {
        self.shared.entries.lock().unwrap().get(udn).map(|e| e.handle.clone())
    }

    pub fn list(&self) -> Vec<DeviceHandle> {
        self.shared.entries.lock().unwrap().values().map(|e| e.handle.clone()).collect()
    }

    /// Test-only introspection over the live entry set, in the spirit of
    /// the original implementation's line-oriented debug console.
    #[cfg(test)]
    pub fn debug_snapshot(&self) -> Vec<Udn> {
        self.shared.entries.lock().unwrap().keys().cloned().collect()
    }

    fn notify(&self, event: DeviceListEvent) {
        self.shared.observers.lock().unwrap().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Feed one parsed advertisement into the list; a no-op if it doesn't
    /// match this list's filter.
    pub fn handle_advertisement(&self, ad: Advertisement) {
        if !self.shared.filter.matches(&ad) {
            return;
        }
        match ad.notification_type {
            NotificationType::ByeBye => self.handle_byebye(ad),
            NotificationType::Update => self.handle_update(ad),
            NotificationType::Alive | NotificationType::SearchResponse => self.handle_alive(ad),
        }
    }

    fn handle_alive(&self, ad: Advertisement) {
        let udn = Udn(ad.udn.clone());
        let already_present = self.shared.entries.lock().unwrap().contains_key(&udn);
        if already_present {
            self.refresh_expiry(&udn, ad.max_age);
            return;
        }

        let handle = DeviceHandle::new(udn.clone(), ad.search_target.clone(), ad.location.clone(), ad.boot_id);
        let expiry = Cancellation::new();
        self.shared.entries.lock().unwrap().insert(
            udn.clone(),
            Entry {
                handle: handle.clone(),
                expiry: expiry.clone(),
                deadline: Instant::now() + ad.max_age,
            },
        );
        self.spawn_expiry(udn.clone(), expiry, ad.max_age);
        self.spawn_fetch(handle);
        debug!(udn = %udn, "device list: alive, fetch queued");
    }

    fn handle_byebye(&self, ad: Advertisement) {
        let udn = Udn(ad.udn.clone());
        let removed = self.shared.entries.lock().unwrap().remove(&udn);
        if let Some(entry) = removed {
            entry.expiry.cancel();
            entry.handle.interrupt_xml_fetch();
            entry.handle.mark_expired();
            entry.handle.mark_removed();
            debug!(udn = %udn, "device list: byebye");
            self.notify(DeviceListEvent::Removed(entry.handle));
        }
    }

    fn handle_update(&self, ad: Advertisement) {
        let udn = Udn(ad.udn.clone());
        let present = {
            let entries = self.shared.entries.lock().unwrap();
            entries.get(&udn).map(|e| e.handle.clone())
        };
        match present {
            Some(handle) => {
                self.refresh_expiry(&udn, ad.max_age);
                trace!(udn = %udn, "device list: update");
                self.notify(DeviceListEvent::Refreshed(handle));
            }
            None => self.handle_alive(ad),
        }
    }

    /// Extend an entry's max-age deadline iff the advertised deadline is
    /// later than the one it currently holds. Existing devices never
    /// downgrade their deadline: a late-arriving `ssdp:alive` with a
    /// shorter `max-age` than the one already in force must not pull the
    /// expiry in.
    fn refresh_expiry(&self, udn: &Udn, max_age: Duration) {
        let new_deadline = Instant::now() + max_age;
        let current_deadline = match self.shared.entries.lock().unwrap().get(udn) {
            Some(e) => e.deadline,
            None => return,
        };
        if new_deadline <= current_deadline {
            return;
        }

        let rearmed = {
            let mut entries = self.shared.entries.lock().unwrap();
            entries.get_mut(udn).map(|e| {
                let old = e.expiry.clone();
                let new_cancel = Cancellation::new();
                e.expiry = new_cancel.clone();
                e.deadline = new_deadline;
                (old, new_cancel)
            })
        };
        if let Some((old, new_cancel)) = rearmed {
            old.cancel();
            self.spawn_expiry(udn.clone(), new_cancel, max_age);
        }
    }

    fn spawn_expiry(&self, udn: Udn, cancel: Cancellation, max_age: Duration) {
        let list = self.clone();
        tokio::spawn(async move {
            if cancel.sleep_or_cancelled(max_age).await {
                return;
            }
            let removed = list.shared.entries.lock().unwrap().remove(&udn);
            if let Some(entry) = removed {
                entry.handle.mark_expired();
                entry.handle.mark_removed();
                debug!(udn = %udn, "device list: expired");
                list.notify(DeviceListEvent::Removed(entry.handle));
            }
        });
    }

    /// Spawn the description fetch for a freshly-seen device. `Added` is
    /// only emitted from here, once the fetch actually wins the race to
    /// `Ready` — never at `ssdp:alive` time, and never for a fetch that
    /// fails, times out, or loses to a `byebye`/expiry.
    fn spawn_fetch(&self, handle: DeviceHandle) {
        let fetcher = self.shared.fetcher.clone();
        let timeout = self.shared.config.xml_fetch_timeout;
        let list = self.clone();
        tokio::spawn(async move {
            let became_ready = crate::cp::fetch::fetch_and_ready(&handle, fetcher.as_ref(), timeout).await;
            if became_ready && !list.shared.refreshing.load(Ordering::SeqCst) {
                debug!(udn = %handle.udn(), "device list: added");
                list.notify(DeviceListEvent::Added(handle));
            }
        });
    }

    /// Tear this list down: every current entry is removed, its timers and
    /// in-flight fetches are cancelled, and observers see one `Removed` per
    /// entry. Used when this list's adapter disappears entirely.
    pub fn teardown(&self) {
        let entries: Vec<Entry> = {
            let mut entries = self.shared.entries.lock().unwrap();
            entries.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            entry.expiry.cancel();
            entry.handle.interrupt_xml_fetch();
            entry.handle.mark_expired();
            entry.handle.mark_removed();
            self.notify(DeviceListEvent::Removed(entry.handle));
        }
    }

    /// Rebuild the live map from scratch: snapshot it as a shadow, clear
    /// it, broadcast a fresh `M-SEARCH` burst on `listener` and let
    /// responses repopulate it for `mx` seconds (plus configured slack),
    /// then diff shadow against the rebuilt map. Added-only UDNs get
    /// `Added`, shadow-only UDNs get `Removed`, and every surviving UDN
    /// gets an unconditional `Refreshed` at the end — this is the only
    /// path that emits `Refreshed` for devices nothing else changed about.
    pub async fn refresh(&self, listener: &Listener, mx: u8) {
        self.shared.refreshing.store(true, Ordering::SeqCst);

        let shadow: HashMap<Udn, Entry> = std::mem::take(&mut *self.shared.entries.lock().unwrap());
        for entry in shadow.values() {
            entry.expiry.cancel();
        }

        let search_target = self.shared.filter.search_target();
        if let Err(e) = listener.search(&search_target, mx).await {
            debug!(error = %e, "device list: refresh search failed");
        }
        tokio::time::sleep(self.shared.config.refresh_deadline(mx)).await;

        let shadow_udns: HashSet<Udn> = shadow.keys().cloned().collect();
        let current_udns: Vec<Udn> = self.shared.entries.lock().unwrap().keys().cloned().collect();
        let current_set: HashSet<Udn> = current_udns.iter().cloned().collect();

        for udn in current_set.difference(&shadow_udns) {
            if let Some(handle) = self.find(udn) {
                if handle.ready_state() == ReadyState::Ready {
                    self.notify(DeviceListEvent::Added(handle));
                }
            }
        }
        for udn in shadow_udns.difference(&current_set) {
            if let Some(entry) = shadow.get(udn) {
                entry.handle.interrupt_xml_fetch();
                entry.handle.mark_expired();
                entry.handle.mark_removed();
                self.notify(DeviceListEvent::Removed(entry.handle.clone()));
            }
        }
        for udn in &current_udns {
            if let Some(handle) = self.find(udn) {
                self.notify(DeviceListEvent::Refreshed(handle));
            }
        }

        self.shared.refreshing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::fetch::MockFetcher;
    use std::time::Duration;

    fn list() -> DeviceList {
        DeviceList::new(DeviceListFilter::All, Config::default(), Arc::new(MockFetcher::failing()))
    }

    fn ready_list() -> DeviceList {
        const MINIMAL_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<specVersion><major>1</major><minor>0</minor></specVersion>
<device>
<deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
<friendlyName>Test</friendlyName>
<manufacturer>Test</manufacturer>
<modelName>Test</modelName>
<UDN>uuid:abc</UDN>
</device>
</root>"#;
        DeviceList::new(
            DeviceListFilter::All,
            Config::default(),
            Arc::new(MockFetcher::succeeding(MINIMAL_XML.as_bytes().to_vec())),
        )
    }

    fn alive_ad(udn: &str) -> Advertisement {
        Advertisement {
            udn: udn.to_string(),
            search_target: SearchTarget::RootDevice,
            location: "http://192.168.1.2/desc.xml".to_string(),
            max_age: Duration::from_millis(50),
            notification_type: NotificationType::Alive,
            boot_id: Some(1),
            config_id: Some(1),
        }
    }

    #[tokio::test]
    async fn alive_does_not_notify_added_before_fetch_completes() {
        let list = list();
        let mut events = list.subscribe();
        list.handle_advertisement(alive_ad("abc"));
        // The failing mock fetcher drives the handle straight to Expired;
        // no `Added` should ever be observed for it.
        let event = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(event.is_err() || !matches!(event.unwrap(), Some(DeviceListEvent::Added(_))));
    }

    #[tokio::test]
    async fn alive_notifies_added_only_once_fetch_succeeds() {
        let list = ready_list();
        let mut events = list.subscribe();
        list.handle_advertisement(alive_ad("abc"));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DeviceListEvent::Added(_)));
        let handle = list.find(&Udn("abc".to_string())).unwrap();
        assert_eq!(handle.ready_state(), ReadyState::Ready);
    }

    #[tokio::test]
    async fn byebye_removes_entry() {
        let list = ready_list();
        let mut events = list.subscribe();
        list.handle_advertisement(alive_ad("abc"));
        events.recv().await.unwrap();

        let mut byebye = alive_ad("abc");
        byebye.notification_type = NotificationType::ByeBye;
        byebye.max_age = Duration::ZERO;
        list.handle_advertisement(byebye);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, DeviceListEvent::Removed(_)));
        assert!(list.find(&Udn("abc".to_string())).is_none());
    }

    #[tokio::test]
    async fn expiry_removes_entry_without_refresh() {
        let list = list();
        list.handle_advertisement(alive_ad("abc"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut events = list.subscribe();
        let event = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DeviceListEvent::Removed(_)));
    }

    #[tokio::test]
    async fn later_deadline_rearms_timer() {
        let list = list();
        list.handle_advertisement(alive_ad("abc"));
        let mut ad = alive_ad("abc");
        ad.max_age = Duration::from_secs(60);
        list.handle_advertisement(ad);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The original 50ms deadline would have fired by now; the extended
        // one should not have.
        assert!(list.find(&Udn("abc".to_string())).is_some());
    }

    #[tokio::test]
    async fn earlier_deadline_is_ignored() {
        let list = list();
        let mut first = alive_ad("abc");
        first.max_age = Duration::from_secs(60);
        list.handle_advertisement(first);

        let mut shorter = alive_ad("abc");
        shorter.max_age = Duration::from_millis(10);
        list.handle_advertisement(shorter);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The shorter deadline must not have downgraded the original 60s
        // one: the entry should still be present.
        assert!(list.find(&Udn("abc".to_string())).is_some());
    }

    #[tokio::test]
    async fn non_matching_filter_drops_advertisement() {
        let list = DeviceList::new(
            DeviceListFilter::Uuid("other".to_string()),
            Config::default(),
            Arc::new(MockFetcher::failing()),
        );
        list.handle_advertisement(alive_ad("abc"));
        assert!(list.find(&Udn("abc".to_string())).is_none());
    }

    #[tokio::test]
    async fn teardown_removes_every_entry_and_notifies() {
        let list = ready_list();
        let mut events = list.subscribe();
        list.handle_advertisement(alive_ad("abc"));
        events.recv().await.unwrap();

        list.teardown();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, DeviceListEvent::Removed(_)));
        assert!(list.list().is_empty());
    }
}
