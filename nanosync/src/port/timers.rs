//! The named event timers of a port, driven by a single scheduling source:
//! the caller hands the current time into the expiry checks and sleeps until
//! [`TimerSet::next_due`].

use crate::time::{Duration, Time};

/// Every timer the protocol engine arms, by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
#[allow(missing_docs)] // names track the protocol events directly
pub enum TimerId {
    PdelayReq,
    DelayReq,
    Sync,
    AnnounceReceipt,
    AnnounceInterval,
    SyncReceipt,
    DelayReceipt,
    UnicastGrant,
    OperatorMessages,
    LeapSecondPause,
    StatusFileUpdate,
    PanicMode,
    PeriodicInfo,
    StatisticsUpdate,
    AlarmUpdate,
    MasterNetRefresh,
    CalibrationDelay,
    ClockUpdate,
    TimingDomainUpdate,
}

impl TimerId {
    pub(crate) const COUNT: usize = 19;

    pub(crate) const ALL: [TimerId; Self::COUNT] = [
        TimerId::PdelayReq,
        TimerId::DelayReq,
        TimerId::Sync,
        TimerId::AnnounceReceipt,
        TimerId::AnnounceInterval,
        TimerId::SyncReceipt,
        TimerId::DelayReceipt,
        TimerId::UnicastGrant,
        TimerId::OperatorMessages,
        TimerId::LeapSecondPause,
        TimerId::StatusFileUpdate,
        TimerId::PanicMode,
        TimerId::PeriodicInfo,
        TimerId::StatisticsUpdate,
        TimerId::AlarmUpdate,
        TimerId::MasterNetRefresh,
        TimerId::CalibrationDelay,
        TimerId::ClockUpdate,
        TimerId::TimingDomainUpdate,
    ];
}

/// Shortest interval a timer accepts: 250 microseconds
const MIN_INTERVAL: Duration = Duration::from_bits(250_000i128 << 32);

/// Longest interval a timer accepts: one day. Keeps an absurd duration
/// advertised via unicast signaling from arming a timer years into the
/// future.
const MAX_INTERVAL: Duration = Duration::from_bits(86_400_000_000_000i128 << 32);

#[derive(Debug, Clone, Copy, Default)]
struct EventTimer {
    interval: Duration,
    due: Option<Time>,
}

impl EventTimer {
    fn start(&mut self, interval: Duration, now: Time) {
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        self.interval = interval;
        self.due = Some(now + interval);
    }

    fn stop(&mut self) {
        self.due = None;
    }

    fn running(&self) -> bool {
        self.due.is_some()
    }

    /// Consume an expiry edge: after returning true the timer re-arms for
    /// the next period and reports false until that one passes.
    fn expired(&mut self, now: Time) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// All event timers of one port
#[derive(Debug)]
pub(crate) struct TimerSet {
    timers: [EventTimer; TimerId::COUNT],
}

impl TimerSet {
    pub(crate) fn new() -> Self {
        Self {
            timers: [EventTimer::default(); TimerId::COUNT],
        }
    }

    /// (Re)arm a timer to fire `interval_secs` from `now`, then periodically
    pub(crate) fn start(&mut self, id: TimerId, interval_secs: f64, now: Time) {
        self.timers[id as usize].start(Duration::from_seconds(interval_secs), now);
    }

    /// Arm a timer from an exact duration
    pub(crate) fn start_duration(&mut self, id: TimerId, interval: Duration, now: Time) {
        self.timers[id as usize].start(interval, now);
    }

    pub(crate) fn stop(&mut self, id: TimerId) {
        self.timers[id as usize].stop();
    }

    pub(crate) fn running(&self, id: TimerId) -> bool {
        self.timers[id as usize].running()
    }

    /// Whether the timer has expired since the last check; consumes the edge
    pub(crate) fn expired(&mut self, id: TimerId, now: Time) -> bool {
        self.timers[id as usize].expired(now)
    }

    /// The earliest pending deadline across all running timers
    pub(crate) fn next_due(&self) -> Option<Time> {
        self.timers.iter().filter_map(|t| t.due).min()
    }

    /// Stop every timer, e.g. when the port goes down
    pub(crate) fn stop_all(&mut self) {
        for timer in &mut self.timers {
            timer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_consumes_the_edge() {
        let mut timers = TimerSet::new();
        let t0 = Time::from_secs(100);

        timers.start(TimerId::Sync, 1.0, t0);
        assert!(!timers.expired(TimerId::Sync, t0));
        assert!(timers.expired(TimerId::Sync, t0 + Duration::from_secs(1)));
        // Edge consumed, fires again a period later
        assert!(!timers.expired(TimerId::Sync, t0 + Duration::from_secs(1)));
        assert!(timers.expired(TimerId::Sync, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn stopped_timer_does_not_fire() {
        let mut timers = TimerSet::new();
        let t0 = Time::from_secs(100);

        timers.start(TimerId::AnnounceInterval, 1.0, t0);
        timers.stop(TimerId::AnnounceInterval);
        assert!(!timers.running(TimerId::AnnounceInterval));
        assert!(!timers.expired(TimerId::AnnounceInterval, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn intervals_are_clamped() {
        let mut timers = TimerSet::new();
        let t0 = Time::from_secs(0);

        // A week collapses to a day
        timers.start(TimerId::UnicastGrant, 604_800.0, t0);
        assert!(!timers.expired(TimerId::UnicastGrant, t0 + Duration::from_secs(86_399)));
        assert!(timers.expired(TimerId::UnicastGrant, t0 + Duration::from_secs(86_400)));

        // Zero floors at 250 microseconds
        timers.start(TimerId::DelayReq, 0.0, t0);
        assert!(!timers.expired(TimerId::DelayReq, t0 + Duration::from_micros(249)));
        assert!(timers.expired(TimerId::DelayReq, t0 + Duration::from_micros(250)));
    }

    #[test]
    fn next_due_is_the_earliest_deadline() {
        let mut timers = TimerSet::new();
        let t0 = Time::from_secs(0);

        assert!(timers.next_due().is_none());

        timers.start(TimerId::Sync, 4.0, t0);
        timers.start(TimerId::AnnounceInterval, 2.0, t0);

        assert_eq!(timers.next_due(), Some(t0 + Duration::from_secs(2)));
    }
}
