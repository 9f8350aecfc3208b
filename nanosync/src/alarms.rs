//! Alarm tracking: conditions are raised and cleared by the engine, state
//! transitions are paced by a minimum age so flapping conditions do not spam
//! operators.

use crate::time::Time;

/// The conditions this node raises alarms for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)] // names track the conditions directly
pub enum AlarmId {
    PortStateFault,
    OffsetThreshold,
    ClockStep,
    NoSync,
    NoDelay,
    MasterChange,
    NetworkFault,
    FastAdjustment,
    DomainMismatch,
}

impl AlarmId {
    const COUNT: usize = 9;

    const ALL: [AlarmId; Self::COUNT] = [
        AlarmId::PortStateFault,
        AlarmId::OffsetThreshold,
        AlarmId::ClockStep,
        AlarmId::NoSync,
        AlarmId::NoDelay,
        AlarmId::MasterChange,
        AlarmId::NetworkFault,
        AlarmId::FastAdjustment,
        AlarmId::DomainMismatch,
    ];

    fn name(&self) -> &'static str {
        match self {
            AlarmId::PortStateFault => "PORT_STATE",
            AlarmId::OffsetThreshold => "OFFSET_THRESHOLD",
            AlarmId::ClockStep => "CLOCK_STEP",
            AlarmId::NoSync => "NO_SYNC",
            AlarmId::NoDelay => "NO_DELAY",
            AlarmId::MasterChange => "MASTER_CHANGE",
            AlarmId::NetworkFault => "NETWORK_FAULT",
            AlarmId::FastAdjustment => "FAST_ADJ",
            AlarmId::DomainMismatch => "DOMAIN_MISMATCH",
        }
    }
}

/// Lifecycle of one alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlarmState {
    /// Idle
    #[default]
    Unset,
    /// The condition triggered
    Set,
    /// The condition went away; kept visible until the hold time passes
    Cleared,
}

/// One alarm with its state and transition times
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlarmEntry {
    /// The lifecycle state
    pub state: AlarmState,
    /// Whether the underlying condition currently holds
    pub condition: bool,
    /// When the alarm was last set
    pub time_set: Option<Time>,
    /// When the alarm was last cleared
    pub time_cleared: Option<Time>,
}

/// All alarms of a port
#[derive(Debug)]
pub struct AlarmSet {
    entries: [AlarmEntry; AlarmId::COUNT],
    /// Seconds an alarm must hold its state before it may transition again
    minimum_age: u32,
}

impl AlarmSet {
    pub(crate) fn new(minimum_age: u32) -> Self {
        Self {
            entries: [AlarmEntry::default(); AlarmId::COUNT],
            minimum_age,
        }
    }

    /// Report whether an alarm condition currently holds. The state machine
    /// catches up at the next [`tick`](`Self::tick`).
    pub(crate) fn set_condition(&mut self, id: AlarmId, condition: bool) {
        self.entries[id as usize].condition = condition;
    }

    /// Raise a one-shot condition that clears by itself
    pub(crate) fn trigger(&mut self, id: AlarmId, now: Time) {
        let entry = &mut self.entries[id as usize];
        if entry.state != AlarmState::Set {
            log::warn!("alarm {} set", id.name());
            entry.state = AlarmState::Set;
            entry.time_set = Some(now);
        }
        entry.condition = false;
    }

    /// Walk all alarm state machines; called on the alarm update timer
    pub(crate) fn tick(&mut self, now: Time) {
        for id in AlarmId::ALL {
            let minimum_age = self.minimum_age;
            let entry = &mut self.entries[id as usize];

            match entry.state {
                AlarmState::Unset | AlarmState::Cleared if entry.condition => {
                    log::warn!("alarm {} set", id.name());
                    entry.state = AlarmState::Set;
                    entry.time_set = Some(now);
                }
                AlarmState::Set if !entry.condition => {
                    // Hold the alarm for the minimum age to suppress flapping
                    let held_long_enough = entry
                        .time_set
                        .map(|set| (now - set).seconds() >= minimum_age as i64)
                        .unwrap_or(true);

                    if held_long_enough {
                        log::info!("alarm {} cleared", id.name());
                        entry.state = AlarmState::Cleared;
                        entry.time_cleared = Some(now);
                    }
                }
                AlarmState::Cleared if !entry.condition => {
                    let cleared_long_enough = entry
                        .time_cleared
                        .map(|cleared| (now - cleared).seconds() >= minimum_age as i64)
                        .unwrap_or(true);

                    if cleared_long_enough {
                        entry.state = AlarmState::Unset;
                    }
                }
                _ => {}
            }
        }
    }

    /// The state of one alarm
    pub fn entry(&self, id: AlarmId) -> AlarmEntry {
        self.entries[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    #[test]
    fn condition_sets_and_clears_with_hold_time() {
        let mut alarms = AlarmSet::new(5);
        let t0 = Time::from_secs(100);

        alarms.set_condition(AlarmId::NoSync, true);
        alarms.tick(t0);
        assert_eq!(alarms.entry(AlarmId::NoSync).state, AlarmState::Set);

        // Condition clears immediately, but the alarm holds for minimum_age
        alarms.set_condition(AlarmId::NoSync, false);
        alarms.tick(t0 + Duration::from_secs(1));
        assert_eq!(alarms.entry(AlarmId::NoSync).state, AlarmState::Set);

        alarms.tick(t0 + Duration::from_secs(6));
        assert_eq!(alarms.entry(AlarmId::NoSync).state, AlarmState::Cleared);

        alarms.tick(t0 + Duration::from_secs(12));
        assert_eq!(alarms.entry(AlarmId::NoSync).state, AlarmState::Unset);
    }

    #[test]
    fn one_shot_trigger() {
        let mut alarms = AlarmSet::new(0);
        let t0 = Time::from_secs(0);

        alarms.trigger(AlarmId::ClockStep, t0);
        assert_eq!(alarms.entry(AlarmId::ClockStep).state, AlarmState::Set);

        alarms.tick(t0 + Duration::from_secs(1));
        assert_eq!(alarms.entry(AlarmId::ClockStep).state, AlarmState::Cleared);
    }
}
