/*!
SSDP/GENA wire constants: the multicast rendezvous point, header names and
the handful of literal tokens (`NTS` values, `MAN` extension token) the rest
of the crate matches against.

Values and doc comments are carried over from the UDA 1.0/1.1 text the
teacher crate quoted verbatim in `syntax.rs`.
*/

/// Multicast channel and port reserved for SSDP by IANA.
pub const MULTICAST_ADDRESS: &str = "239.255.255.250:1900";
pub const MULTICAST_PORT: u16 = 1900;

pub const METHOD_NOTIFY: &str = "NOTIFY";
pub const METHOD_SEARCH: &str = "M-SEARCH";
pub const HTTP_VERSION: &str = "HTTP/1.1";
pub const MATCH_ANY_RESOURCE: &str = "*";

pub const HEAD_HOST: &str = "HOST";
pub const HEAD_CACHE_CONTROL: &str = "CACHE-CONTROL";
pub const HEAD_LOCATION: &str = "LOCATION";
pub const HEAD_NT: &str = "NT";
pub const HEAD_NTS: &str = "NTS";
pub const HEAD_SERVER: &str = "SERVER";
pub const HEAD_USN: &str = "USN";
pub const HEAD_BOOTID: &str = "BOOTID.UPNP.ORG";
pub const HEAD_CONFIGID: &str = "CONFIGID.UPNP.ORG";
pub const HEAD_NEXT_BOOTID: &str = "NEXTBOOTID.UPNP.ORG";
pub const HEAD_SEARCH_PORT: &str = "SEARCHPORT.UPNP.ORG";
pub const HEAD_DATE: &str = "DATE";
pub const HEAD_EXT: &str = "EXT";
pub const HEAD_MAN: &str = "MAN";
pub const HEAD_MX: &str = "MX";
pub const HEAD_ST: &str = "ST";
pub const HEAD_USER_AGENT: &str = "USER-AGENT";

pub const HTTP_EXTENSION: &str = "\"ssdp:discover\"";

pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";
pub const NTS_UPDATE: &str = "ssdp:update";

/// GENA eventing headers, used by `dv::subscribe` and `cp`'s (out-of-scope,
/// interface-only) event sink.
pub const HEAD_SID: &str = "SID";
pub const HEAD_SEQ: &str = "SEQ";
pub const HEAD_TIMEOUT: &str = "TIMEOUT";
pub const HEAD_CALLBACK: &str = "CALLBACK";
pub const HEAD_CONTENT_TYPE: &str = "CONTENT-TYPE";
pub const NT_EVENT: &str = "upnp:event";
pub const NTS_PROPCHANGE: &str = "upnp:propchange";

pub const BUFFER_SIZE: usize = 0x1000;
pub const DEFAULT_TIMEOUT: u64 = 2;
