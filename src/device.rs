/*!
The shared, reference-counted device handle.

A [`DeviceHandle`] is a cheap, cloneable `Arc` wrapper; holding one keeps
the underlying [`DeviceHandleInner`] alive. The control-point device list
holds the single strong owner; every other collaborator (the adapter
service's listeners, an in-flight description fetch, a caller's own
reference obtained via [`crate::cp::device_list::DeviceList::find`]) holds
either a clone of the `Arc` or a [`Weak`] that must be upgraded before use,
so a handle can never outlive the list entry that created it plus whatever
callers are still holding a clone.
*/
use crate::description::DeviceRoot;
use crate::wire::search_target::SearchTarget;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::Notify;

/// A device's unique device name, the stable identity carried in `USN`/`UDN`
/// across every advertisement and fetch for its lifetime in a device list.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Udn(pub String);

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The readiness state of a device entry, tracking the description fetch
/// that must complete before a handle is usable by callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadyState {
    /// `ssdp:alive` seen; description not yet fetched.
    Pending,
    /// Description fetched and parsed successfully.
    Ready,
    /// `ssdp:byebye` (or expiry) arrived before the fetch completed, or the
    /// fetch itself failed; the handle will never become `Ready`.
    Expired,
}

struct State {
    ready: ReadyState,
    description: Option<DeviceRoot>,
    removed: bool,
}

struct DeviceHandleInner {
    udn: Udn,
    search_target: SearchTarget,
    location: String,
    boot_id: Option<u32>,
    state: Mutex<State>,
    fetch_cancel: Notify,
    fetch_cancelled: std::sync::atomic::AtomicBool,
    user_data: OnceLock<Box<dyn Any + Send + Sync>>,
}

/// Cloneable, reference-counted handle onto one advertised device.
///
/// Cloning a handle is the supported way to extend its lifetime beyond the
/// device list entry that produced it; the entry being removed from the
/// list only drops the list's own strong reference.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceHandleInner>,
}

/// A non-owning reference, for collaborators (e.g. a subscription record)
/// that must not keep a device alive on their own.
#[derive(Clone)]
pub struct WeakDeviceHandle {
    inner: Weak<DeviceHandleInner>,
}

impl DeviceHandle {
    pub fn new(udn: Udn, search_target: SearchTarget, location: String, boot_id: Option<u32>) -> Self {
        DeviceHandle {
            inner: Arc::new(DeviceHandleInner {
                udn,
                search_target,
                location,
                boot_id,
                state: Mutex::new(State {
                    ready: ReadyState::Pending,
                    description: None,
                    removed: false,
                }),
                fetch_cancel: Notify::new(),
                fetch_cancelled: std::sync::atomic::AtomicBool::new(false),
                user_data: OnceLock::new(),
            }),
        }
    }

    pub fn udn(&self) -> &Udn {
        &self.inner.udn
    }

    pub fn search_target(&self) -> &SearchTarget {
        &self.inner.search_target
    }

    pub fn location(&self) -> &str {
        &self.inner.location
    }

    pub fn boot_id(&self) -> Option<u32> {
        self.inner.boot_id
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.lock().unwrap().ready
    }

    pub fn description(&self) -> Option<DeviceRoot> {
        self.inner.state.lock().unwrap().description.clone()
    }

    pub fn is_removed(&self) -> bool {
        self.inner.state.lock().unwrap().removed
    }

    /// Record a successful description fetch, transitioning `Pending ->
    /// Ready`. A no-op if the fetch lost the race against `mark_expired`.
    /// Returns whether the transition actually happened, so a caller (the
    /// device list) knows whether this fetch is the one that should notify
    /// observers of `Added` rather than one that lost the race.
    pub fn mark_ready(&self, description: DeviceRoot) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if state.ready == ReadyState::Pending {
            state.description = Some(description);
            state.ready = ReadyState::Ready;
            true
        } else {
            false
        }
    }

    /// Transition to `Expired`: `ssdp:byebye`, max-age expiry, or a failed
    /// fetch. Idempotent and terminal — `Ready` never reverts.
    pub fn mark_expired(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.ready != ReadyState::Ready {
            state.ready = ReadyState::Expired;
        }
    }

    pub fn mark_removed(&self) {
        self.inner.state.lock().unwrap().removed = true;
    }

    /// Cancel an in-flight description fetch for this device. Cooperative:
    /// the fetcher observes [`DeviceHandle::fetch_cancelled`] at its next
    /// await point and returns [`crate::error::Error::Cancelled`].
    pub fn interrupt_xml_fetch(&self) {
        self.inner
            .fetch_cancelled
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.fetch_cancel.notify_waiters();
    }

    pub fn fetch_cancelled(&self) -> bool {
        self.inner.fetch_cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Wait until either a cancellation arrives or the given future
    /// completes, whichever is first. Used by the fetcher to race the
    /// cancellation notification against the HTTP request.
    pub async fn cancelled(&self) {
        self.inner.fetch_cancel.notified().await;
    }

    /// Attach caller-defined user data to this handle. Succeeds only the
    /// first time; subsequent calls return the value unchanged, mirroring
    /// the "attach once at creation" pattern used by the owner of a device
    /// list entry.
    pub fn set_user_data<D: Any + Send + Sync>(&self, data: D) -> Result<(), D> {
        self.inner.user_data.set(Box::new(data)).map_err(|boxed| {
            *boxed
                .downcast::<D>()
                .unwrap_or_else(|_| unreachable!("user_data type mismatch on failed set"))
        })
    }

    pub fn user_data<D: Any + Send + Sync>(&self) -> Option<&D> {
        self.inner.user_data.get().and_then(|b| b.downcast_ref::<D>())
    }

    pub fn downgrade(&self) -> WeakDeviceHandle {
        WeakDeviceHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl WeakDeviceHandle {
    pub fn upgrade(&self) -> Option<DeviceHandle> {
        self.inner.upgrade().map(|inner| DeviceHandle { inner })
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("udn", &self.inner.udn)
            .field("search_target", &self.inner.search_target)
            .field("ready", &self.ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> DeviceHandle {
        DeviceHandle::new(
            Udn("abc-123".to_string()),
            SearchTarget::RootDevice,
            "http://192.168.1.2/desc.xml".to_string(),
            Some(1),
        )
    }

    #[test]
    fn starts_pending() {
        let h = handle();
        assert_eq!(h.ready_state(), ReadyState::Pending);
        assert!(h.description().is_none());
    }

    #[test]
    fn expired_is_terminal_over_ready() {
        let h = handle();
        h.mark_expired();
        h.mark_ready(crate::description::DeviceRoot {
            spec_version: crate::description::SpecVersion::V10,
            url_base: None,
            device: crate::description::Device {
                device_type: crate::description::TypeId::device("X", "1"),
                friendly_name: "x".to_string(),
                manufacturer: "x".to_string(),
                manufacturer_url: None,
                model_description: None,
                model_name: "x".to_string(),
                model_number: None,
                model_url: None,
                serial_number: None,
                unique_device_name: "abc-123".to_string(),
                upc: None,
                icon_list: vec![],
                service_list: vec![],
                device_list: vec![],
                presentation_url: None,
            },
        });
        assert_eq!(h.ready_state(), ReadyState::Expired);
    }

    #[test]
    fn weak_handle_does_not_keep_device_alive() {
        let h = handle();
        let weak = h.downgrade();
        drop(h);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn user_data_set_once() {
        let h = handle();
        assert!(h.set_user_data(42i32).is_ok());
        assert_eq!(h.user_data::<i32>(), Some(&42));
        assert!(h.set_user_data(7i32).is_err());
        assert_eq!(h.user_data::<i32>(), Some(&42));
    }

    #[tokio::test]
    async fn interrupt_wakes_cancelled_waiter() {
        let h = handle();
        let h2 = h.clone();
        let waiter = tokio::spawn(async move {
            h2.cancelled().await;
        });
        tokio::task::yield_now().await;
        h.interrupt_xml_fetch();
        waiter.await.unwrap();
        assert!(h.fetch_cancelled());
    }
}
