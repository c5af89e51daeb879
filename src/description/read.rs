/*!
Parsing of a device description XML document into the [`super::DeviceRoot`]
tree. The control point's readiness gate needs this to confirm that a
fetched description actually contains the device/service the caller is
waiting on; it is a plain event-driven reader over `quick_xml`, not a
derive-based deserializer, to match the writer's hand-rolled style.
*/
use crate::description::{Device, DeviceRoot, Icon, Service, SpecVersion, TypeId};
use crate::error::{Error, ParseSource};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::str::FromStr;

type XResult<T> = Result<T, Error>;

fn parse_err(message: impl Into<String>) -> Error {
    Error::parse(ParseSource::DeviceDescriptionXml, message)
}

fn parse_type_id(kind_tag: &str, s: &str) -> XResult<TypeId> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 5 || parts[0] != "urn" || parts[2] != kind_tag {
        return Err(parse_err(format!("malformed {}: {}", kind_tag, s)));
    }
    let domain = parts[1].to_string();
    let name = parts[3].to_string();
    let version = parts[4].to_string();
    Ok(if kind_tag == "device" {
        TypeId::Device { domain, name, version }
    } else {
        TypeId::Service { domain, name, version }
    })
}

/// Minimal tag-scoped text/element reader built over `quick_xml::Reader`.
struct Cursor<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);
        Cursor { reader, buf: Vec::new() }
    }

    /// Read the next `Start`/`End`/`Eof` event, skipping text/decl/comment
    /// noise between elements.
    fn next_tag(&mut self) -> XResult<TagEvent> {
        loop {
            self.buf.clear();
            match self
                .reader
                .read_event(&mut self.buf)
                .map_err(|e| parse_err(e.to_string()))?
            {
                Event::Start(e) => return Ok(TagEvent::Start(e.name().to_vec())),
                Event::End(e) => return Ok(TagEvent::End(e.name().to_vec())),
                Event::Eof => return Ok(TagEvent::Eof),
                _ => continue,
            }
        }
    }

    /// Read the text content of the element just opened by a `Start` event,
    /// consuming through its matching `End`.
    fn read_text(&mut self) -> XResult<String> {
        let mut text = String::new();
        loop {
            self.buf.clear();
            match self
                .reader
                .read_event(&mut self.buf)
                .map_err(|e| parse_err(e.to_string()))?
            {
                Event::Text(e) => {
                    text.push_str(
                        &e.unescape_and_decode(&self.reader)
                            .map_err(|e| parse_err(e.to_string()))?,
                    );
                }
                Event::End(_) => break,
                Event::Eof => return Err(parse_err("unexpected eof reading text")),
                _ => continue,
            }
        }
        Ok(text)
    }

    /// Skip over an element's entire subtree (used for elements this reader
    /// doesn't model, keeping it forward-compatible with extra children).
    fn skip_subtree(&mut self, name: &[u8]) -> XResult<()> {
        let mut depth = 1;
        loop {
            self.buf.clear();
            match self
                .reader
                .read_event(&mut self.buf)
                .map_err(|e| parse_err(e.to_string()))?
            {
                Event::Start(e) if e.name() == name => depth += 1,
                Event::End(e) if e.name() == name => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => return Err(parse_err("unexpected eof skipping subtree")),
                _ => continue,
            }
        }
    }
}

enum TagEvent {
    Start(Vec<u8>),
    End(Vec<u8>),
    Eof,
}

/// Parse a complete `<root>` device description document.
pub fn parse_device_description(xml: &[u8]) -> XResult<DeviceRoot> {
    let mut cursor = Cursor::new(xml);
    let mut spec_version = SpecVersion::default();
    let mut url_base = None;
    let mut device = None;

    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) => match name.as_slice() {
                b"root" => continue,
                b"specVersion" => spec_version = parse_spec_version(&mut cursor)?,
                b"URLBase" => url_base = Some(cursor.read_text()?),
                b"device" => device = Some(parse_device(&mut cursor)?),
                other => cursor.skip_subtree(other)?,
            },
            TagEvent::End(name) if name == b"root" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => break,
        }
    }

    Ok(DeviceRoot {
        spec_version,
        url_base,
        device: device.ok_or_else(|| parse_err("missing <device>"))?,
    })
}

fn parse_spec_version(cursor: &mut Cursor) -> XResult<SpecVersion> {
    let mut major = 1u8;
    let mut minor = 0u8;
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) => match name.as_slice() {
                b"major" => {
                    major = cursor
                        .read_text()?
                        .parse()
                        .map_err(|_| parse_err("bad specVersion major"))?
                }
                b"minor" => {
                    minor = cursor
                        .read_text()?
                        .parse()
                        .map_err(|_| parse_err("bad specVersion minor"))?
                }
                other => cursor.skip_subtree(other)?,
            },
            TagEvent::End(name) if name == b"specVersion" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in specVersion")),
        }
    }
    Ok(SpecVersion { major, minor })
}

fn parse_device(cursor: &mut Cursor) -> XResult<Device> {
    let mut device_type = None;
    let mut friendly_name = None;
    let mut manufacturer = None;
    let mut manufacturer_url = None;
    let mut model_description = None;
    let mut model_name = None;
    let mut model_number = None;
    let mut model_url = None;
    let mut serial_number = None;
    let mut unique_device_name = None;
    let mut upc = None;
    let mut icon_list = Vec::new();
    let mut service_list = Vec::new();
    let mut device_list = Vec::new();
    let mut presentation_url = None;

    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) => match name.as_slice() {
                b"deviceType" => device_type = Some(parse_type_id("device", &cursor.read_text()?)?),
                b"friendlyName" => friendly_name = Some(cursor.read_text()?),
                b"manufacturer" => manufacturer = Some(cursor.read_text()?),
                b"manufacturerURL" => manufacturer_url = Some(cursor.read_text()?),
                b"modelDescription" => model_description = Some(cursor.read_text()?),
                b"modelName" => model_name = Some(cursor.read_text()?),
                b"modelNumber" => model_number = Some(cursor.read_text()?),
                b"modelURL" => model_url = Some(cursor.read_text()?),
                b"serialNumber" => serial_number = Some(cursor.read_text()?),
                b"UDN" => unique_device_name = Some(cursor.read_text()?),
                b"UPC" => upc = Some(cursor.read_text()?),
                b"presentationURL" => presentation_url = Some(cursor.read_text()?),
                b"iconList" => icon_list = parse_icon_list(cursor)?,
                b"serviceList" => service_list = parse_service_list(cursor)?,
                b"deviceList" => device_list = parse_device_list(cursor)?,
                other => cursor.skip_subtree(other)?,
            },
            TagEvent::End(name) if name == b"device" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in device")),
        }
    }

    Ok(Device {
        device_type: device_type.ok_or_else(|| parse_err("missing deviceType"))?,
        friendly_name: friendly_name.ok_or_else(|| parse_err("missing friendlyName"))?,
        manufacturer: manufacturer.ok_or_else(|| parse_err("missing manufacturer"))?,
        manufacturer_url,
        model_description,
        model_name: model_name.ok_or_else(|| parse_err("missing modelName"))?,
        model_number,
        model_url,
        serial_number,
        unique_device_name: unique_device_name.ok_or_else(|| parse_err("missing UDN"))?,
        upc,
        icon_list,
        service_list,
        device_list,
        presentation_url,
    })
}

fn parse_icon_list(cursor: &mut Cursor) -> XResult<Vec<Icon>> {
    let mut icons = Vec::new();
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) if name == b"icon" => icons.push(parse_icon(cursor)?),
            TagEvent::Start(other) => cursor.skip_subtree(&other)?,
            TagEvent::End(name) if name == b"iconList" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in iconList")),
        }
    }
    Ok(icons)
}

fn parse_icon(cursor: &mut Cursor) -> XResult<Icon> {
    let mut mime_type = None;
    let mut width = None;
    let mut height = None;
    let mut depth = None;
    let mut url = None;
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) => match name.as_slice() {
                b"mimetype" => mime_type = Some(cursor.read_text()?),
                b"width" => width = Some(cursor.read_text()?),
                b"height" => height = Some(cursor.read_text()?),
                b"depth" => depth = Some(cursor.read_text()?),
                b"url" => url = Some(cursor.read_text()?),
                other => cursor.skip_subtree(other)?,
            },
            TagEvent::End(name) if name == b"icon" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in icon")),
        }
    }
    Ok(Icon {
        mime_type: mime_type.ok_or_else(|| parse_err("missing icon mimetype"))?,
        width: width
            .ok_or_else(|| parse_err("missing icon width"))?
            .parse()
            .map_err(|_| parse_err("bad icon width"))?,
        height: height
            .ok_or_else(|| parse_err("missing icon height"))?
            .parse()
            .map_err(|_| parse_err("bad icon height"))?,
        depth: depth
            .ok_or_else(|| parse_err("missing icon depth"))?
            .parse()
            .map_err(|_| parse_err("bad icon depth"))?,
        url: url.ok_or_else(|| parse_err("missing icon url"))?,
    })
}

fn parse_service_list(cursor: &mut Cursor) -> XResult<Vec<Service>> {
    let mut services = Vec::new();
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) if name == b"service" => services.push(parse_service(cursor)?),
            TagEvent::Start(other) => cursor.skip_subtree(&other)?,
            TagEvent::End(name) if name == b"serviceList" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in serviceList")),
        }
    }
    Ok(services)
}

fn parse_service(cursor: &mut Cursor) -> XResult<Service> {
    let mut service_type = None;
    let mut service_id = None;
    let mut scpd_url = None;
    let mut control_url = None;
    let mut event_sub_url = None;
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) => match name.as_slice() {
                b"serviceType" => service_type = Some(parse_type_id("service", &cursor.read_text()?)?),
                b"serviceId" => service_id = Some(cursor.read_text()?),
                b"SCPDURL" => scpd_url = Some(cursor.read_text()?),
                b"controlURL" => control_url = Some(cursor.read_text()?),
                b"eventSubURL" => event_sub_url = Some(cursor.read_text()?),
                other => cursor.skip_subtree(other)?,
            },
            TagEvent::End(name) if name == b"service" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in service")),
        }
    }
    Ok(Service {
        service_type: service_type.ok_or_else(|| parse_err("missing serviceType"))?,
        service_id: service_id.ok_or_else(|| parse_err("missing serviceId"))?,
        scpd_url: scpd_url.ok_or_else(|| parse_err("missing SCPDURL"))?,
        control_url: control_url.ok_or_else(|| parse_err("missing controlURL"))?,
        event_sub_url: event_sub_url.ok_or_else(|| parse_err("missing eventSubURL"))?,
    })
}

fn parse_device_list(cursor: &mut Cursor) -> XResult<Vec<Device>> {
    let mut devices = Vec::new();
    loop {
        match cursor.next_tag()? {
            TagEvent::Start(name) if name == b"device" => devices.push(parse_device(cursor)?),
            TagEvent::Start(other) => cursor.skip_subtree(&other)?,
            TagEvent::End(name) if name == b"deviceList" => break,
            TagEvent::End(_) => continue,
            TagEvent::Eof => return Err(parse_err("unexpected eof in deviceList")),
        }
    }
    Ok(devices)
}

impl FromStr for TypeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(t) = parse_type_id("device", s) {
            Ok(t)
        } else {
            parse_type_id("service", s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AXIS_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
<specVersion>
<major>1</major>
<minor>0</minor>
</specVersion>
<device>
<deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
<friendlyName>AXIS P3301 - 00408CA45086</friendlyName>
<manufacturer>AXIS</manufacturer>
<manufacturerURL>http://www.axis.com/</manufacturerURL>
<modelDescription>AXIS P3301 Network Fixed Dome Camera</modelDescription>
<modelName>AXIS P3301</modelName>
<modelNumber>P3301</modelNumber>
<modelURL>http://www.axis.com/</modelURL>
<serialNumber>00408CA45086</serialNumber>
<UDN>uuid:Upnp-BasicDevice-1_0-00408CA45086</UDN>
<serviceList>
<service>
<serviceType>urn:axis-com:service:BasicService:1</serviceType>
<serviceId>urn:axis-com:serviceId:BasicServiceId</serviceId>
<controlURL>/upnp/control/BasicServiceId</controlURL>
<eventSubURL>/upnp/event/BasicServiceId</eventSubURL>
<SCPDURL>/scpd_basic.xml</SCPDURL>
</service>
</serviceList>
<presentationURL>http://10.59.104.28:80/</presentationURL>
</device>
<URLBase>http://10.59.104.28:49152/</URLBase>
</root>"#;

    #[test]
    fn parses_axis_description() {
        let root = parse_device_description(AXIS_XML.as_bytes()).unwrap();
        assert_eq!(root.spec_version, SpecVersion::V10);
        assert_eq!(root.url_base.as_deref(), Some("http://10.59.104.28:49152/"));
        assert_eq!(root.device.friendly_name, "AXIS P3301 - 00408CA45086");
        assert_eq!(root.device.service_list.len(), 1);
        assert_eq!(
            root.device.service_list[0].service_type,
            TypeId::Service {
                domain: "axis-com".to_string(),
                name: "BasicService".to_string(),
                version: "1".to_string(),
            }
        );
    }

    #[test]
    fn find_service_locates_nested_service() {
        let root = parse_device_description(AXIS_XML.as_bytes()).unwrap();
        let target = TypeId::Service {
            domain: "axis-com".to_string(),
            name: "BasicService".to_string(),
            version: "1".to_string(),
        };
        assert!(root.find_service(&target).is_some());
    }

    #[test]
    fn rejects_truncated_document() {
        assert!(parse_device_description(b"<root><device>").is_err());
    }
}
