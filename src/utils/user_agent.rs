/*!
The `SERVER`/`USER-AGENT` header value this crate identifies itself with,
built once and shared by every socket.
*/
use lazy_static::lazy_static;

lazy_static! {
    static ref USER_AGENT: String = format!(
        "{os}/0.0 UPnP/1.1 {name}/{version}",
        os = std::env::consts::OS,
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

/// The value to send in the `SERVER` header (device side) or `USER-AGENT`
/// header (control-point side).
pub fn user_agent_string() -> &'static str {
    &USER_AGENT
}
