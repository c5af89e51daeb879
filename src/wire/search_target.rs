/*!
`ST`/`NT` search and notification target values, and the `TypeId` (domain,
name, version) triple they carry for device and service types.
*/
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const UPNP_DOMAIN: &str = "schemas-upnp-org";

/// A `urn:{domain}:device:{name}:{version}` or
/// `urn:{domain}:service:{name}:{version}` identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeId {
    Device {
        domain: String,
        name: String,
        version: String,
    },
    Service {
        domain: String,
        name: String,
        version: String,
    },
}

impl TypeId {
    pub fn device(name: impl Into<String>, version: impl Into<String>) -> Self {
        TypeId::Device {
            domain: UPNP_DOMAIN.to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn service(name: impl Into<String>, version: impl Into<String>) -> Self {
        TypeId::Service {
            domain: UPNP_DOMAIN.to_string(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self, TypeId::Device { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, TypeId::Service { .. })
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeId::Device {
                domain,
                name,
                version,
            } => write!(f, "urn:{}:device:{}:{}", domain, name, version),
            TypeId::Service {
                domain,
                name,
                version,
            } => write!(f, "urn:{}:service:{}:{}", domain, name, version),
        }
    }
}

/// Corresponds to the set of values defined by the UDA `ST`/`NT` headers.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum SearchTarget {
    /// `ssdp:all`
    All,
    /// `upnp:rootdevice`
    RootDevice,
    /// `uuid:{device-UDN}`
    Uuid(String),
    /// `urn:{domain}:device:{name}:{version}`
    DeviceType(TypeId),
    /// `urn:{domain}:service:{name}:{version}`
    ServiceType(TypeId),
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTarget::All => write!(f, "ssdp:all"),
            SearchTarget::RootDevice => write!(f, "upnp:rootdevice"),
            SearchTarget::Uuid(udn) => write!(f, "uuid:{}", udn),
            SearchTarget::DeviceType(t) => write!(f, "{}", t),
            SearchTarget::ServiceType(t) => write!(f, "{}", t),
        }
    }
}

impl FromStr for SearchTarget {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref URN: Regex = Regex::new(r"^urn:([^:]+):(device|service):([^:]+):(.+)$").unwrap();
        }
        if s == "ssdp:all" {
            Ok(SearchTarget::All)
        } else if s == "upnp:rootdevice" {
            Ok(SearchTarget::RootDevice)
        } else if let Some(udn) = s.strip_prefix("uuid:") {
            Ok(SearchTarget::Uuid(udn.to_string()))
        } else if let Some(captures) = URN.captures(s) {
            let domain = captures[1].to_string();
            let name = captures[3].to_string();
            let version = captures[4].to_string();
            if &captures[2] == "device" {
                Ok(SearchTarget::DeviceType(TypeId::Device {
                    domain,
                    name,
                    version,
                }))
            } else {
                Ok(SearchTarget::ServiceType(TypeId::Service {
                    domain,
                    name,
                    version,
                }))
            }
        } else {
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_root_device() {
        let parsed: SearchTarget = "upnp:rootdevice".parse().unwrap();
        assert_eq!(parsed, SearchTarget::RootDevice);
        assert_eq!(parsed.to_string(), "upnp:rootdevice");
    }

    #[test]
    fn round_trip_device_type() {
        let st: SearchTarget = "urn:schemas-upnp-org:device:Basic:1".parse().unwrap();
        assert_eq!(
            st,
            SearchTarget::DeviceType(TypeId::device("Basic", "1"))
        );
        assert_eq!(st.to_string(), "urn:schemas-upnp-org:device:Basic:1");
    }

    #[test]
    fn round_trip_uuid() {
        let st: SearchTarget = "uuid:abc-123".parse().unwrap();
        assert_eq!(st, SearchTarget::Uuid("abc-123".to_string()));
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-target".parse::<SearchTarget>().is_err());
    }
}
