/*!
Asynchronous UPnP 1.0/1.1 discovery, announcement and eventing core.

This crate implements the network-facing plumbing shared by a UPnP
control point and a UPnP device: SSDP discovery and announcement over
multicast, GENA event subscription and delivery, adapter-change
notification, and the reference-counted device handles the rest of an
application builds on. SOAP action invocation and the service
control-point-side client are deliberately out of scope; a caller wires
its own control protocol on top of the handles and service description
this crate exposes.

More information:

* [UPnP Device Architecture 1.0](http://www.upnp.org/specs/arch/UPnP-arch-DeviceArchitecture-v1.0.pdf)
* [UPnP Device Architecture 1.1](http://upnp.org/specs/arch/UPnP-arch-DeviceArchitecture-v1.1.pdf)
*/

#![warn(missing_debug_implementations, unused_extern_crates, rust_2018_idioms)]

pub mod adapter;
pub mod config;
pub mod cp;
pub mod description;
pub mod device;
pub mod dv;
pub mod error;
pub mod timer;
pub mod utils;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
