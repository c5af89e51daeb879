/*!
The common error type shared across discovery, announcement, and eventing.

Variants are grouped by the failure classification in the core's error
handling design: transient network failures the caller may retry,
peer-gone timeouts that terminate a subscription or abandon a fetch,
malformed wire data that is logged and discarded, and caller-visible
protocol failures (`SubscriptionExpired`, `ResourceExhausted`).
*/
use std::fmt;
use thiserror::Error;

/// Common error type across the discovery, announcement and eventing core.
#[derive(Debug, Error)]
pub enum Error {
    /// Transient I/O failure; the caller may retry. A publisher worker
    /// swallows this and waits for the next change event.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// The peer is assumed gone. Subscriptions are dropped, XML fetches are
    /// abandoned for the owning device.
    #[error("operation timed out after {0:?}")]
    NetworkTimeout(std::time::Duration),

    /// An HTTP request (description fetch, action invocation, GENA publish)
    /// failed at the transport/status level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A datagram or XML document could not be parsed. Logged and discarded;
    /// no state change results from it.
    #[error("parse error ({source}): {message}")]
    Parse {
        source: ParseSource,
        message: String,
    },

    /// `renew` was called for a SID whose subscription has already been
    /// removed (expired or explicitly unsubscribed).
    #[error("subscription expired or unknown")]
    SubscriptionExpired,

    /// Listener/socket creation failed because the process is out of
    /// descriptors or a requested port could not be bound. Propagates to the
    /// device-enable caller; the device cannot be enabled on that adapter.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The in-flight description fetch was interrupted by
    /// [`crate::device::DeviceHandle::interrupt_xml_fetch`].
    #[error("operation cancelled")]
    Cancelled,

    /// The requested operation is not supported in the current configuration
    /// or specification version.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Where a [`Error::Parse`] failure originated, for diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseSource {
    SsdpDatagram,
    DeviceDescriptionXml,
    ServiceDescriptionXml,
    Header,
}

impl fmt::Display for ParseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseSource::SsdpDatagram => "SSDP datagram",
            ParseSource::DeviceDescriptionXml => "device description XML",
            ParseSource::ServiceDescriptionXml => "service description XML",
            ParseSource::Header => "header",
        })
    }
}

impl Error {
    pub fn parse(source: ParseSource, message: impl Into<String>) -> Self {
        Error::Parse {
            source,
            message: message.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
