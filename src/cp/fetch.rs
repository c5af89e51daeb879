/*!
The description-fetch readiness gate: once a device's `ssdp:alive` has been
seen, its [`crate::device::DeviceHandle`] stays `Pending` until its
description document has been fetched and parsed, or the fetch is
abandoned (cancelled, timed out, or the device went `ssdp:byebye` first).

`XmlFetcher` is the external collaborator seam: production code uses
[`ReqwestFetcher`], tests can substitute an in-memory stand-in.
*/
use crate::description::read::parse_device_description;
use crate::device::DeviceHandle;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches the raw bytes of a device (or service) description document.
#[async_trait]
pub trait XmlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Default, `reqwest`-backed fetcher used outside of tests.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        ReqwestFetcher {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XmlFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Race a description fetch against the handle's cancellation and an
/// absolute timeout, then drive the handle to `Ready` or `Expired`.
///
/// Returns `true` only when this call is the one that won the race and
/// actually transitioned the handle to `Ready` — the caller (the device
/// list) uses that, not fetch success alone, to decide whether to notify
/// observers of `Added`. On parse failure, cancellation, or timeout the
/// handle is driven to `Expired` and `false` is returned; observers are
/// never told about a handle that never became ready.
pub async fn fetch_and_ready(handle: &DeviceHandle, fetcher: &dyn XmlFetcher, timeout: Duration) -> bool {
    let location = handle.location().to_string();
    let result = tokio::select! {
        result = tokio::time::timeout(timeout, fetcher.fetch(&location)) => {
            result.map_err(|_| Error::NetworkTimeout(timeout)).and_then(|r| r)
        }
        _ = handle.cancelled() => Err(Error::Cancelled),
    };

    match result {
        Ok(bytes) => match parse_device_description(&bytes) {
            Ok(description) => {
                let became_ready = handle.mark_ready(description);
                if became_ready {
                    debug!(udn = %handle.udn(), "description fetched and parsed");
                } else {
                    debug!(udn = %handle.udn(), "description fetched but handle already left pending");
                }
                became_ready
            }
            Err(e) => {
                warn!(udn = %handle.udn(), error = %e, "description parse failed");
                handle.mark_expired();
                false
            }
        },
        Err(e) => {
            warn!(udn = %handle.udn(), error = %e, "description fetch abandoned");
            handle.mark_expired();
            false
        }
    }
}

/// Test-only fetcher returning a fixed document or a fixed failure.
#[cfg(test)]
pub struct MockFetcher {
    response: std::sync::Mutex<Option<Result<Vec<u8>>>>,
}

#[cfg(test)]
impl MockFetcher {
    pub fn succeeding(xml: Vec<u8>) -> Self {
        MockFetcher {
            response: std::sync::Mutex::new(Some(Ok(xml))),
        }
    }

    pub fn failing() -> Self {
        MockFetcher {
            response: std::sync::Mutex::new(Some(Err(Error::parse(
                crate::error::ParseSource::DeviceDescriptionXml,
                "mock fetcher configured to fail",
            )))),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl XmlFetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Error::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Udn;
    use crate::wire::search_target::SearchTarget;

    const MINIMAL_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<specVersion><major>1</major><minor>0</minor></specVersion>
<device>
<deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
<friendlyName>Test</friendlyName>
<manufacturer>Test</manufacturer>
<modelName>Test</modelName>
<UDN>uuid:abc-123</UDN>
</device>
</root>"#;

    fn handle() -> DeviceHandle {
        DeviceHandle::new(
            Udn("abc-123".to_string()),
            SearchTarget::RootDevice,
            "http://192.168.1.2/desc.xml".to_string(),
            Some(1),
        )
    }

    #[tokio::test]
    async fn successful_fetch_marks_ready() {
        let h = handle();
        let fetcher = MockFetcher::succeeding(MINIMAL_XML.as_bytes().to_vec());
        let became_ready = fetch_and_ready(&h, &fetcher, Duration::from_secs(1)).await;
        assert!(became_ready);
        assert_eq!(h.ready_state(), crate::device::ReadyState::Ready);
    }

    #[tokio::test]
    async fn failed_fetch_marks_expired() {
        let h = handle();
        let fetcher = MockFetcher::failing();
        let became_ready = fetch_and_ready(&h, &fetcher, Duration::from_secs(1)).await;
        assert!(!became_ready);
        assert_eq!(h.ready_state(), crate::device::ReadyState::Expired);
    }

    #[tokio::test]
    async fn cancellation_marks_expired() {
        let h = handle();
        h.interrupt_xml_fetch();
        let fetcher = MockFetcher::succeeding(MINIMAL_XML.as_bytes().to_vec());
        let became_ready = fetch_and_ready(&h, &fetcher, Duration::from_secs(1)).await;
        assert!(!became_ready);
        assert_eq!(h.ready_state(), crate::device::ReadyState::Expired);
    }
}
