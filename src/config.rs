/*!
Construction-time configuration for every subsystem in the core.

Per the design notes, there is no process-wide global configuration; each
subsystem (adapter service, announcement scheduler, device list, subscription
manager) receives the tunables it needs as constructor parameters via this
struct. Field names mirror the names used by the specification so that log
messages and doc comments can refer to them directly.
*/
use std::time::Duration;

/// Tunables shared by the control-point and device halves of the core.
#[derive(Clone, Debug)]
pub struct Config {
    /// `DvMaxUpdateTimeSecs`: the upper bound on any subscription duration
    /// grant and on announcement/update scheduling windows.
    pub dv_max_update_time_secs: u32,

    /// `DvNumPublisherThreads`: fixed size of the device-side event publisher
    /// pool.
    pub dv_num_publisher_threads: usize,

    /// Default `MX` (seconds) used when a control point issues an M-SEARCH
    /// and doesn't override it per-call.
    pub default_mx: u8,

    /// How long a refresh cycle is allowed to run before its deadline timer
    /// fires, expressed as a multiplier of `MX` plus fixed slack.
    pub refresh_mx_multiplier: u32,
    pub refresh_slack: Duration,

    /// Window during which a newly-appeared adapter gets repeated M-SEARCH
    /// bursts, since freshly-brought-up interfaces often miss the first one.
    pub new_adapter_search_retry_window: Duration,

    /// Minimum per-slot scheduling window; below this the announcement
    /// scheduler fires immediately instead of computing a random delay.
    pub min_schedule_slot: Duration,

    /// Timeout applied to description/service XML fetches.
    pub xml_fetch_timeout: Duration,

    /// IP TTL applied to outgoing SSDP multicast datagrams.
    pub packet_ttl: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dv_max_update_time_secs: 1800,
            dv_num_publisher_threads: 4,
            default_mx: 2,
            refresh_mx_multiplier: 2,
            refresh_slack: Duration::from_secs(2),
            new_adapter_search_retry_window: Duration::from_secs(60),
            min_schedule_slot: Duration::from_millis(10),
            xml_fetch_timeout: Duration::from_secs(10),
            packet_ttl: 4,
        }
    }
}

impl Config {
    /// `max-age` style deadline for a refresh cycle given a search `mx`.
    pub fn refresh_deadline(&self, mx: u8) -> Duration {
        Duration::from_secs(u64::from(mx) * u64::from(self.refresh_mx_multiplier))
            + self.refresh_slack
    }

    /// Clamp a GENA `TIMEOUT` duration hint into `(0, dv_max_update_time_secs]`;
    /// `0` or anything over the max means "use the max".
    pub fn clamp_subscription_duration(&self, hint_secs: u32) -> u32 {
        if hint_secs == 0 || hint_secs > self.dv_max_update_time_secs {
            self.dv_max_update_time_secs
        } else {
            hint_secs
        }
    }
}
