/*!
The scheduling substrate shared by the announcement scheduler, the device
list's expiry timers, and the subscription manager's renewal deadlines: a
cancellable single-shot timer, and the pure functions used to compute delay
and burst spacing so they can be unit-tested without a running clock.
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;

/// A single-shot cancellation signal. Cloning shares the same flag: any
/// clone can cancel, and every clone's [`Cancellation::cancelled`] observes
/// it.
#[derive(Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early with `true` if cancelled first.
    pub async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        tokio::select! {
            _ = sleep(duration) => false,
            _ = self.notify.notified() => true,
        }
    }
}

/// Compare two SSDP `BOOTID`/sequence-style wrapping counters, treating `a`
/// as "newer than" `b` unless the gap exceeds half the counter's range, in
/// which case a wraparound is assumed and the comparison inverts.
///
/// This is the textbook TCP sequence-number comparison, applied to the
/// `u32` BOOTID/CONFIGID counters the announcement scheduler bumps on
/// restart and the `SEQ` counter GENA subscriptions carry.
pub fn wrapping_is_newer(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < u32::MAX / 2
}

/// Advance a GENA `SEQ` counter, skipping `0` on wraparound: the initial
/// event of a subscription's lifetime is the only one ever allowed to carry
/// `SEQ=0`.
pub fn next_sequence(current: u32) -> u32 {
    let next = current.wrapping_add(1);
    if next == 0 {
        1
    } else {
        next
    }
}

/// Compute the delay before the next message of a randomized announcement
/// burst, per the scheduling discipline: spread `remaining` messages evenly
/// across `window`, jittered within each slot, but never below
/// `min_slot` — below that the scheduler just fires immediately instead of
/// computing a delay finer than its own timer resolution.
pub fn next_slot_delay(window: Duration, remaining: usize, min_slot: Duration, jitter: f64) -> Duration {
    debug_assert!((0.0..1.0).contains(&jitter));
    if remaining == 0 {
        return Duration::ZERO;
    }
    let slot = window / remaining as u32;
    if slot < min_slot {
        return Duration::ZERO;
    }
    slot.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_newer_simple_case() {
        assert!(wrapping_is_newer(5, 3));
        assert!(!wrapping_is_newer(3, 5));
    }

    #[test]
    fn wrapping_newer_handles_wraparound() {
        assert!(wrapping_is_newer(1, u32::MAX));
        assert!(!wrapping_is_newer(u32::MAX, 1));
    }

    #[test]
    fn wrapping_newer_equal_is_not_newer() {
        assert!(!wrapping_is_newer(5, 5));
    }

    #[test]
    fn sequence_skips_zero_on_wrap() {
        assert_eq!(next_sequence(u32::MAX), 1);
        assert_eq!(next_sequence(0), 1);
        assert_eq!(next_sequence(1), 2);
    }

    #[test]
    fn slot_delay_shrinks_to_zero_below_min() {
        let d = next_slot_delay(Duration::from_millis(5), 10, Duration::from_millis(10), 0.5);
        assert_eq!(d, Duration::ZERO);
    }

    #[test]
    fn slot_delay_zero_messages_is_zero() {
        assert_eq!(
            next_slot_delay(Duration::from_secs(1), 0, Duration::from_millis(10), 0.5),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_short_circuits_sleep() {
        let c = Cancellation::new();
        let c2 = c.clone();
        let handle = tokio::spawn(async move { c2.sleep_or_cancelled(Duration::from_secs(60)).await });
        tokio::task::yield_now().await;
        c.cancel();
        assert!(handle.await.unwrap());
    }
}
