/*!
The SSDP/GENA wire format: protocol constants, datagram parsing and
construction, and the `SearchTarget`/`TypeId` value types carried in `ST`,
`NT` and `USN` headers.
*/
pub mod message;
pub mod protocol;
pub mod search_target;

pub use message::{
    build_notify, build_search, build_search_response, parse_advertisement, parse_search_request, Advertisement,
    NotificationType, SearchRequest,
};
pub use search_target::{SearchTarget, TypeId};
