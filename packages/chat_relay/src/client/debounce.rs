//! Client-side typing state machines.
//!
//! Both are pure: callers pass the current instant and act on the result.

use std::time::{Duration, Instant};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);
/// Half the relay's default typing TTL (`typing_ttl_ms = 5000`).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(2500);
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a stream of keystrokes into one `true` when a burst starts and one
/// `false` after the burst goes quiet.
///
/// A burst that outlasts `refresh_interval` re-announces `true` so the relay's
/// typing TTL and the peer's watchdog keep seeing it. The interval must stay
/// below the relay's `typing_ttl_ms`.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    quiet_period: Duration,
    refresh_interval: Duration,
    last_keystroke: Option<Instant>,
    last_announced: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD, DEFAULT_REFRESH_INTERVAL)
    }
}

impl TypingDebouncer {
    pub fn new(quiet_period: Duration, refresh_interval: Duration) -> Self {
        Self {
            quiet_period,
            refresh_interval,
            last_keystroke: None,
            last_announced: None,
        }
    }

    /// Returns `Some(true)` on the first keystroke of a burst, and again once
    /// `refresh_interval` has passed since the last announcement.
    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        self.last_keystroke = Some(now);
        match self.last_announced {
            Some(at) if now.saturating_duration_since(at) < self.refresh_interval => None,
            _ => {
                self.last_announced = Some(now);
                Some(true)
            }
        }
    }

    /// Returns `Some(false)` once the quiet period has elapsed since the last
    /// keystroke of an announced burst.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.reset();
                Some(false)
            }
            _ => None,
        }
    }

    /// A sent message always ends the burst; the caller emits the returned
    /// `false` unconditionally.
    pub fn message_sent(&mut self) -> bool {
        self.reset();
        false
    }

    /// When [`poll`](Self::poll) will next fire, if a burst is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_announced?;
        self.last_keystroke.map(|at| at + self.quiet_period)
    }

    fn reset(&mut self) {
        self.last_announced = None;
        self.last_keystroke = None;
    }
}

/// Receiver-side guard against a `false` that never arrives.
#[derive(Debug, Clone)]
pub struct PeerTypingWatchdog {
    timeout: Duration,
    typing_since: Option<Instant>,
}

impl Default for PeerTypingWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_TIMEOUT)
    }
}

impl PeerTypingWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            typing_since: None,
        }
    }

    pub fn observe(&mut self, is_typing: bool, now: Instant) {
        self.typing_since = is_typing.then_some(now);
    }

    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing_since
            .is_some_and(|since| now.duration_since(since) < self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_one_true_per_burst() {
        let mut debouncer = TypingDebouncer::default();
        let t0 = Instant::now();

        assert_eq!(debouncer.keystroke(t0), Some(true));
        assert_eq!(debouncer.keystroke(t0 + ms(200)), None);
        assert_eq!(debouncer.keystroke(t0 + ms(900)), None);
        assert_eq!(debouncer.deadline(), Some(t0 + ms(1900)));
    }

    #[test]
    fn test_false_after_quiet_period() {
        let mut debouncer = TypingDebouncer::default();
        let t0 = Instant::now();

        debouncer.keystroke(t0);
        debouncer.keystroke(t0 + ms(500));
        assert_eq!(debouncer.poll(t0 + ms(1400)), None);
        assert_eq!(debouncer.poll(t0 + ms(1500)), Some(false));
        // Fires once
        assert_eq!(debouncer.poll(t0 + ms(5000)), None);

        // Next burst announces again
        assert_eq!(debouncer.keystroke(t0 + ms(6000)), Some(true));
    }

    #[test]
    fn test_message_sent_always_false() {
        let mut debouncer = TypingDebouncer::default();
        let t0 = Instant::now();

        // Even with no burst open
        assert!(!debouncer.message_sent());

        debouncer.keystroke(t0);
        assert!(!debouncer.message_sent());
        assert!(debouncer.deadline().is_none());
        assert_eq!(debouncer.poll(t0 + ms(2000)), None);
    }

    #[test]
    fn test_long_burst_reannounces() {
        let mut debouncer = TypingDebouncer::new(ms(1000), ms(2500));
        let t0 = Instant::now();

        let announced: Vec<u64> = (0..=20u64)
            .map(|step| step * 400)
            .filter(|&at| debouncer.keystroke(t0 + ms(at)) == Some(true))
            .collect();
        assert_eq!(announced, vec![0, 2800, 5600]);

        // Still one burst: a single `false` once it goes quiet
        assert_eq!(debouncer.poll(t0 + ms(8999)), None);
        assert_eq!(debouncer.poll(t0 + ms(9000)), Some(false));
    }

    #[test]
    fn test_refresh_resets_with_burst() {
        let mut debouncer = TypingDebouncer::new(ms(1000), ms(2500));
        let t0 = Instant::now();

        debouncer.keystroke(t0);
        assert!(!debouncer.message_sent());
        assert_eq!(debouncer.keystroke(t0 + ms(100)), Some(true));
        assert_eq!(debouncer.keystroke(t0 + ms(2000)), None);
    }

    #[test]
    fn test_idle_poll_is_noop() {
        let mut debouncer = TypingDebouncer::new(ms(300), ms(2500));
        assert_eq!(debouncer.poll(Instant::now()), None);
    }

    #[test]
    fn test_watchdog_hides_stale_indicator() {
        let mut watchdog = PeerTypingWatchdog::default();
        let t0 = Instant::now();

        assert!(!watchdog.is_typing(t0));
        watchdog.observe(true, t0);
        assert!(watchdog.is_typing(t0 + Duration::from_secs(9)));
        assert!(!watchdog.is_typing(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_watchdog_refresh_and_stop() {
        let mut watchdog = PeerTypingWatchdog::new(Duration::from_secs(10));
        let t0 = Instant::now();

        watchdog.observe(true, t0);
        watchdog.observe(true, t0 + Duration::from_secs(8));
        assert!(watchdog.is_typing(t0 + Duration::from_secs(15)));

        watchdog.observe(false, t0 + Duration::from_secs(16));
        assert!(!watchdog.is_typing(t0 + Duration::from_secs(16)));
    }
}
