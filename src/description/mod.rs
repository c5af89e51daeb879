/*!
The UPnP device/service description document tree: the `SpecVersion`
header every description carries, and the `Device`/`Service`/`Icon`/
`DeviceRoot` model serialized to and parsed from the XML body a
control point fetches from a device's `LOCATION` URL.

`TypeId` (the `deviceType`/`serviceType` value) is shared with the SSDP
wire layer and lives in [`crate::wire::search_target`].
*/
pub mod read;
pub mod write;

pub use crate::wire::search_target::TypeId;

/// The `<specVersion>` element: the UDA major/minor version this
/// description document was authored against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpecVersion {
    pub major: u8,
    pub minor: u8,
}

impl SpecVersion {
    pub const V10: SpecVersion = SpecVersion { major: 1, minor: 0 };
    pub const V11: SpecVersion = SpecVersion { major: 1, minor: 1 };
}

impl Default for SpecVersion {
    fn default() -> Self {
        SpecVersion::V10
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Icon {
    pub mime_type: String,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Service {
    pub service_type: TypeId,
    pub service_id: String,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub device_type: TypeId,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub unique_device_name: String,
    pub upc: Option<String>,
    pub icon_list: Vec<Icon>,
    pub service_list: Vec<Service>,
    pub device_list: Vec<Device>,
    pub presentation_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceRoot {
    pub spec_version: SpecVersion,
    pub url_base: Option<String>,
    pub device: Device,
}

impl DeviceRoot {
    /// Depth-first search for the service whose type matches, used by the
    /// readiness gate to confirm a root device actually embeds the service
    /// a control point asked about.
    pub fn find_service(&self, service_type: &TypeId) -> Option<&Service> {
        fn search<'a>(device: &'a Device, service_type: &TypeId) -> Option<&'a Service> {
            device
                .service_list
                .iter()
                .find(|s| &s.service_type == service_type)
                .or_else(|| device.device_list.iter().find_map(|d| search(d, service_type)))
        }
        search(&self.device, service_type)
    }
}
