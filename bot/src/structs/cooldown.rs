use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Floor beneath which reposts are always denied no matter how short the
/// configured cooldown is.
pub const REPOST_FLOOR_MS: i64 = 5;

const DEFAULT_INTERVAL_SECS: u64 = 1;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GateDecision {
    Allowed,
    Denied,
}

#[derive(Debug, Copy, Clone)]
struct CooldownState {
    interval_secs: u64,
    last_sent: Option<DateTime<Utc>>,
}

impl CooldownState {
    const fn new(interval_secs: u64) -> CooldownState {
        CooldownState {
            interval_secs,
            last_sent: None,
        }
    }

    fn interval_ms(&self) -> i64 {
        i64::try_from(self.interval_secs).map_or(i64::MAX, |secs| secs.saturating_mul(1000))
    }
}

/// Per-channel repost throttle. Checking the gate and recording the send
/// time happen in one call, so two triggers racing for the same channel
/// cannot both pass.
#[derive(Debug, Default)]
pub struct CooldownGate {
    channels: HashMap<u64, CooldownState>,
}

impl CooldownGate {
    pub fn new() -> CooldownGate {
        CooldownGate {
            channels: HashMap::new(),
        }
    }

    pub fn from_intervals(intervals: &BTreeMap<u64, u64>) -> CooldownGate {
        CooldownGate {
            channels: intervals
                .iter()
                .map(|(channel, secs)| (*channel, CooldownState::new(*secs)))
                .collect(),
        }
    }

    /// Denies while the configured interval (or the floor) since the last
    /// recorded send has not elapsed, otherwise records `now` and allows.
    /// The caller that gets Allowed owns the repost that justifies it; if
    /// that repost fails the gate stays closed until the interval passes
    /// again.
    pub fn try_acquire(&mut self, channel: u64, now: DateTime<Utc>) -> GateDecision {
        let state = self
            .channels
            .entry(channel)
            .or_insert_with(|| CooldownState::new(DEFAULT_INTERVAL_SECS));

        if let Some(last) = state.last_sent {
            let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
            if elapsed_ms < state.interval_ms() || elapsed_ms < REPOST_FLOOR_MS {
                return GateDecision::Denied;
            }
        }

        state.last_sent = Some(now);
        GateDecision::Allowed
    }

    /// Installs a fresh cooldown for the channel. Attaching a sticky always
    /// goes through here, so re-attaching also clears the send tracking.
    pub fn configure(&mut self, channel: u64, interval_secs: u64) {
        self.channels.insert(channel, CooldownState::new(interval_secs));
    }

    pub fn remove(&mut self, channel: u64) {
        self.channels.remove(&channel);
    }

    /// Configured interval for listings, the default when the channel was
    /// never configured.
    pub fn interval_secs(&self, channel: u64) -> u64 {
        self.channels
            .get(&channel)
            .map_or(DEFAULT_INTERVAL_SECS, |state| state.interval_secs)
    }

    /// Snapshot of configured intervals, written under `sticky_cooldowns`.
    pub fn intervals(&self) -> BTreeMap<u64, u64> {
        self.channels
            .iter()
            .map(|(channel, state)| (*channel, state.interval_secs))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap()
    }

    fn plus_ms(ms: i64) -> DateTime<Utc> {
        base_time() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_denied_before_interval_allowed_after() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 5);

        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
        assert_eq!(gate.try_acquire(100, plus_ms(4_900)), GateDecision::Denied);
        assert_eq!(gate.try_acquire(100, plus_ms(5_100)), GateDecision::Allowed);
    }

    #[test]
    fn test_allowed_records_in_the_same_call() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 5);

        // two triggers carrying the same clock, only the first passes
        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Denied);
    }

    #[test]
    fn test_denial_does_not_push_the_window_out() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 5);

        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
        assert_eq!(gate.try_acquire(100, plus_ms(4_000)), GateDecision::Denied);
        assert_eq!(gate.try_acquire(100, plus_ms(5_001)), GateDecision::Allowed);
    }

    #[test]
    fn test_floor_applies_under_zero_interval() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 0);

        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
        assert_eq!(gate.try_acquire(100, plus_ms(2)), GateDecision::Denied);
        assert_eq!(gate.try_acquire(100, plus_ms(6)), GateDecision::Allowed);
    }

    #[test]
    fn test_unconfigured_channel_defaults_to_one_second() {
        let mut gate = CooldownGate::new();

        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
        assert_eq!(gate.try_acquire(100, plus_ms(500)), GateDecision::Denied);
        assert_eq!(gate.try_acquire(100, plus_ms(1_100)), GateDecision::Allowed);
        assert_eq!(gate.interval_secs(100), DEFAULT_INTERVAL_SECS);
    }

    #[test]
    fn test_first_acquire_after_configure_is_open() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 3_600);
        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);
    }

    #[test]
    fn test_configure_resets_send_tracking() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 5);
        assert_eq!(gate.try_acquire(100, base_time()), GateDecision::Allowed);

        gate.configure(100, 5);
        assert_eq!(gate.try_acquire(100, plus_ms(1)), GateDecision::Allowed);
    }

    #[test]
    fn test_intervals_snapshot() {
        let mut gate = CooldownGate::new();
        gate.configure(100, 5);
        gate.configure(101, 30);
        gate.remove(100);

        let intervals = gate.intervals();
        assert_eq!(intervals.get(&100), None);
        assert_eq!(intervals.get(&101), Some(&30));
    }
}
