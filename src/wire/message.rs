/*!
Parsing and building of the raw SSDP datagrams exchanged on the multicast
channel and over the unicast search-response socket.

Incoming `NOTIFY`/`M-SEARCH` response datagrams are reduced to the
`(Udn, SearchTarget, Location, MaxAge)` tuple the control-point device list
consumes; outgoing datagrams are built from a device's announced identity.
*/
use crate::error::{Error, ParseSource, Result};
use crate::wire::protocol::*;
use crate::wire::search_target::SearchTarget;
use std::collections::HashMap;
use std::time::Duration;

/// A datagram reduced to the fields the control-point device list cares
/// about, regardless of whether it arrived as `ssdp:alive`, a search
/// response, or `ssdp:update`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Advertisement {
    pub udn: String,
    pub search_target: SearchTarget,
    pub location: String,
    pub max_age: Duration,
    pub notification_type: NotificationType,
    pub boot_id: Option<u32>,
    pub config_id: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationType {
    Alive,
    ByeBye,
    Update,
    SearchResponse,
}

/// Split the USN header (`uuid:{UDN}::{ST}` or bare `uuid:{UDN}`) into its
/// UDN and, if present, search-target suffix.
fn split_usn(usn: &str) -> Result<(String, Option<String>)> {
    if let Some(rest) = usn.strip_prefix("uuid:") {
        match rest.split_once("::") {
            Some((udn, st)) => Ok((udn.to_string(), Some(st.to_string()))),
            None => Ok((rest.to_string(), None)),
        }
    } else {
        Err(Error::parse(
            ParseSource::SsdpDatagram,
            format!("USN missing uuid: prefix: {}", usn),
        ))
    }
}

/// Parse the `max-age=NNN` token out of a `CACHE-CONTROL` header value.
fn parse_max_age(value: &str) -> Result<Duration> {
    for directive in value.split(',') {
        let directive = directive.trim();
        if let Some(secs) = directive.strip_prefix("max-age=") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| Error::parse(ParseSource::Header, format!("bad max-age: {}", secs)))?;
            return Ok(Duration::from_secs(secs));
        }
    }
    Err(Error::parse(
        ParseSource::Header,
        format!("CACHE-CONTROL missing max-age: {}", value),
    ))
}

/// Case-insensitive header lookup; SSDP senders are inconsistent about case.
fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a raw HTTP-over-UDP datagram into its start line and header map.
///
/// SSDP datagrams carry no body; a blank line terminates the header block
/// and anything after it is ignored.
pub fn parse_headers(datagram: &str) -> Result<(String, HashMap<String, String>)> {
    let mut lines = datagram.split("\r\n");
    let start_line = lines
        .next()
        .ok_or_else(|| Error::parse(ParseSource::SsdpDatagram, "empty datagram"))?
        .to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            None => continue,
        }
    }
    Ok((start_line, headers))
}

/// Parse a `NOTIFY * HTTP/1.1` (`ssdp:alive`/`ssdp:byebye`/`ssdp:update`) or
/// `HTTP/1.1 200 OK` search-response datagram into an [`Advertisement`].
pub fn parse_advertisement(datagram: &str) -> Result<Advertisement> {
    let (start_line, headers) = parse_headers(datagram)?;

    let notification_type = if start_line.starts_with(METHOD_NOTIFY) {
        match header(&headers, HEAD_NTS) {
            Some(NTS_ALIVE) => NotificationType::Alive,
            Some(NTS_BYEBYE) => NotificationType::ByeBye,
            Some(NTS_UPDATE) => NotificationType::Update,
            other => {
                return Err(Error::parse(
                    ParseSource::SsdpDatagram,
                    format!("unrecognized NTS: {:?}", other),
                ))
            }
        }
    } else if start_line.starts_with("HTTP/1.1 200") {
        NotificationType::SearchResponse
    } else {
        return Err(Error::parse(
            ParseSource::SsdpDatagram,
            format!("unrecognized start line: {}", start_line),
        ));
    };

    let usn = header(&headers, HEAD_USN)
        .ok_or_else(|| Error::parse(ParseSource::SsdpDatagram, "missing USN"))?;
    let (udn, usn_st) = split_usn(usn)?;

    let st_header = header(&headers, HEAD_ST).or(header(&headers, HEAD_NT));
    let search_target = st_header
        .or(usn_st.as_deref())
        .ok_or_else(|| Error::parse(ParseSource::SsdpDatagram, "missing ST/NT"))?
        .parse::<SearchTarget>()
        .map_err(|_| Error::parse(ParseSource::SsdpDatagram, "unparseable ST/NT"))?;

    let location = header(&headers, HEAD_LOCATION)
        .ok_or_else(|| Error::parse(ParseSource::SsdpDatagram, "missing LOCATION"))?
        .to_string();

    let max_age = if notification_type == NotificationType::ByeBye {
        Duration::ZERO
    } else {
        header(&headers, HEAD_CACHE_CONTROL)
            .map(parse_max_age)
            .transpose()?
            .unwrap_or(Duration::ZERO)
    };

    let boot_id = header(&headers, HEAD_BOOTID).and_then(|v| v.parse().ok());
    let config_id = header(&headers, HEAD_CONFIGID).and_then(|v| v.parse().ok());

    Ok(Advertisement {
        udn,
        search_target,
        location,
        max_age,
        notification_type,
        boot_id,
        config_id,
    })
}

/// Build an outgoing `NOTIFY` datagram advertising one (UDN, search-target)
/// pair, as emitted once per line of the announcement burst table.
pub fn build_notify(
    udn: &str,
    search_target: &SearchTarget,
    location: &str,
    max_age: Duration,
    nts: &str,
    boot_id: u32,
    config_id: u32,
) -> String {
    let usn = match search_target {
        SearchTarget::Uuid(_) => format!("uuid:{}", udn),
        _ => format!("uuid:{}::{}", udn, search_target),
    };
    format!(
        "{method} * {version}\r\n\
         {h_host}: {host}\r\n\
         {h_cc}: max-age={max_age}\r\n\
         {h_location}: {location}\r\n\
         {h_nt}: {nt}\r\n\
         {h_nts}: {nts}\r\n\
         {h_usn}: {usn}\r\n\
         {h_bootid}: {boot_id}\r\n\
         {h_configid}: {config_id}\r\n\r\n",
        method = METHOD_NOTIFY,
        version = HTTP_VERSION,
        h_host = HEAD_HOST,
        host = MULTICAST_ADDRESS,
        h_cc = HEAD_CACHE_CONTROL,
        max_age = max_age.as_secs(),
        h_location = HEAD_LOCATION,
        location = location,
        h_nt = HEAD_NT,
        nt = search_target,
        h_nts = HEAD_NTS,
        nts = nts,
        h_usn = HEAD_USN,
        usn = usn,
        h_bootid = HEAD_BOOTID,
        boot_id = boot_id,
        h_configid = HEAD_CONFIGID,
        config_id = config_id,
    )
}

/// An incoming `M-SEARCH` request, reduced to the fields a device's search
/// responder needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchRequest {
    pub search_target: SearchTarget,
    pub mx: u8,
}

/// Parse an `M-SEARCH * HTTP/1.1` datagram. Per the UDA, a missing or
/// unparseable `MX` is treated as `1` rather than rejecting the request —
/// control points are not required to send one correctly for the search to
/// still be answerable.
pub fn parse_search_request(datagram: &str) -> Result<SearchRequest> {
    let (start_line, headers) = parse_headers(datagram)?;
    if !start_line.starts_with(METHOD_SEARCH) {
        return Err(Error::parse(
            ParseSource::SsdpDatagram,
            format!("not an M-SEARCH: {}", start_line),
        ));
    }
    let search_target = header(&headers, HEAD_ST)
        .ok_or_else(|| Error::parse(ParseSource::SsdpDatagram, "missing ST"))?
        .parse::<SearchTarget>()
        .map_err(|_| Error::parse(ParseSource::SsdpDatagram, "unparseable ST"))?;
    let mx = header(&headers, HEAD_MX).and_then(|v| v.parse().ok()).unwrap_or(1);
    Ok(SearchRequest { search_target, mx })
}

/// Build an outgoing unicast `200 OK` search response for one
/// `(UDN, search-target)` pair, as emitted by a device answering an
/// `M-SEARCH`.
pub fn build_search_response(
    udn: &str,
    search_target: &SearchTarget,
    location: &str,
    max_age: Duration,
    boot_id: u32,
    config_id: u32,
) -> String {
    let usn = match search_target {
        SearchTarget::Uuid(_) => format!("uuid:{}", udn),
        _ => format!("uuid:{}::{}", udn, search_target),
    };
    format!(
        "{version} 200 OK\r\n\
         {h_cc}: max-age={max_age}\r\n\
         {h_ext}:\r\n\
         {h_location}: {location}\r\n\
         {h_st}: {st}\r\n\
         {h_usn}: {usn}\r\n\
         {h_bootid}: {boot_id}\r\n\
         {h_configid}: {config_id}\r\n\r\n",
        version = HTTP_VERSION,
        h_cc = HEAD_CACHE_CONTROL,
        max_age = max_age.as_secs(),
        h_ext = HEAD_EXT,
        h_location = HEAD_LOCATION,
        location = location,
        h_st = HEAD_ST,
        st = search_target,
        h_usn = HEAD_USN,
        usn = usn,
        h_bootid = HEAD_BOOTID,
        boot_id = boot_id,
        h_configid = HEAD_CONFIGID,
        config_id = config_id,
    )
}

/// Build an outgoing `M-SEARCH` request.
pub fn build_search(search_target: &SearchTarget, mx: u8) -> String {
    format!(
        "{method} * {version}\r\n\
         {h_host}: {host}\r\n\
         {h_man}: {man}\r\n\
         {h_mx}: {mx}\r\n\
         {h_st}: {st}\r\n\r\n",
        method = METHOD_SEARCH,
        version = HTTP_VERSION,
        h_host = HEAD_HOST,
        host = MULTICAST_ADDRESS,
        h_man = HEAD_MAN,
        man = HTTP_EXTENSION,
        h_mx = HEAD_MX,
        mx = mx,
        h_st = HEAD_ST,
        st = search_target,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alive_notify() {
        let datagram = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            CACHE-CONTROL: max-age=1800\r\n\
            LOCATION: http://192.168.1.2:8080/desc.xml\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:alive\r\n\
            USN: uuid:abc-123::upnp:rootdevice\r\n\
            BOOTID.UPNP.ORG: 7\r\n\
            CONFIGID.UPNP.ORG: 1\r\n\r\n";
        let ad = parse_advertisement(datagram).unwrap();
        assert_eq!(ad.udn, "abc-123");
        assert_eq!(ad.search_target, SearchTarget::RootDevice);
        assert_eq!(ad.location, "http://192.168.1.2:8080/desc.xml");
        assert_eq!(ad.max_age, Duration::from_secs(1800));
        assert_eq!(ad.notification_type, NotificationType::Alive);
        assert_eq!(ad.boot_id, Some(7));
        assert_eq!(ad.config_id, Some(1));
    }

    #[test]
    fn byebye_has_zero_max_age_even_without_cache_control() {
        let datagram = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            NT: upnp:rootdevice\r\n\
            NTS: ssdp:byebye\r\n\
            USN: uuid:abc-123::upnp:rootdevice\r\n\
            LOCATION: http://192.168.1.2:8080/desc.xml\r\n\r\n";
        let ad = parse_advertisement(datagram).unwrap();
        assert_eq!(ad.max_age, Duration::ZERO);
        assert_eq!(ad.notification_type, NotificationType::ByeBye);
    }

    #[test]
    fn rejects_missing_usn() {
        let datagram = "NOTIFY * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            NTS: ssdp:alive\r\n\r\n";
        assert!(parse_advertisement(datagram).is_err());
    }

    #[test]
    fn parses_msearch_request() {
        let datagram = "M-SEARCH * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            MAN: \"ssdp:discover\"\r\n\
            MX: 3\r\n\
            ST: ssdp:all\r\n\r\n";
        let req = parse_search_request(datagram).unwrap();
        assert_eq!(req.search_target, SearchTarget::All);
        assert_eq!(req.mx, 3);
    }

    #[test]
    fn msearch_request_defaults_missing_mx_to_one() {
        let datagram = "M-SEARCH * HTTP/1.1\r\n\
            HOST: 239.255.255.250:1900\r\n\
            MAN: \"ssdp:discover\"\r\n\
            ST: upnp:rootdevice\r\n\r\n";
        let req = parse_search_request(datagram).unwrap();
        assert_eq!(req.mx, 1);
    }

    #[test]
    fn search_response_round_trips_through_parse() {
        let st = SearchTarget::RootDevice;
        let datagram = build_search_response("abc-123", &st, "http://192.168.1.2:8080/desc.xml", Duration::from_secs(1800), 1, 1);
        let ad = parse_advertisement(&datagram).unwrap();
        assert_eq!(ad.udn, "abc-123");
        assert_eq!(ad.search_target, st);
        assert_eq!(ad.notification_type, NotificationType::SearchResponse);
    }

    #[test]
    fn build_notify_round_trips_through_parse() {
        let st = SearchTarget::RootDevice;
        let datagram = build_notify(
            "abc-123",
            &st,
            "http://192.168.1.2:8080/desc.xml",
            Duration::from_secs(1800),
            NTS_ALIVE,
            1,
            1,
        );
        let ad = parse_advertisement(&datagram).unwrap();
        assert_eq!(ad.udn, "abc-123");
        assert_eq!(ad.search_target, st);
    }
}
