//! The Allan-deviation stability estimator and the clock discipline state
//! machine it drives.

use arrayvec::ArrayVec;

use crate::time::Time;

#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;

/// The discipline state of the local clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockState {
    /// No reference has been applied yet
    #[default]
    Freerun,
    /// Updates are flowing but the frequency has not settled
    Tracking,
    /// The frequency estimate is stable
    Locked,
    /// The reference disappeared; running on the last good frequency
    Holdover,
}

impl core::fmt::Display for ClockState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ClockState::Freerun => "FREERUN",
            ClockState::Tracking => "TRACKING",
            ClockState::Locked => "LOCKED",
            ClockState::Holdover => "HOLDOVER",
        };
        write!(f, "{name}")
    }
}

/// An estimator of the Allan deviation of the frequency adjustments over a
/// bounded observation window.
#[derive(Debug)]
pub(crate) struct AllanDeviationEstimator {
    samples: ArrayVec<f64, 64>,
    period_secs: u32,
    period_start: Option<Time>,
    last_adev: Option<f64>,
}

impl AllanDeviationEstimator {
    pub(crate) fn new(period_secs: u32) -> Self {
        Self {
            samples: ArrayVec::new(),
            period_secs: period_secs.max(1),
            period_start: None,
            last_adev: None,
        }
    }

    /// Feed one frequency sample (ppb). Returns a fresh deviation estimate
    /// once per observation period.
    pub(crate) fn feed(&mut self, frequency_ppb: f64, now: Time) -> Option<f64> {
        let start = *self.period_start.get_or_insert(now);

        if self.samples.is_full() {
            self.samples.remove(0);
        }
        self.samples.push(frequency_ppb);

        if (now - start).seconds() < self.period_secs as i64 {
            return None;
        }

        self.period_start = Some(now);

        if self.samples.len() < 2 {
            return None;
        }

        // Two-sample (Allan) variance of the frequency series
        let sum: f64 = self
            .samples
            .windows(2)
            .map(|pair| {
                let diff = pair[1] - pair[0];
                diff * diff
            })
            .sum();
        let adev = (sum / (2.0 * (self.samples.len() - 1) as f64)).sqrt();

        self.samples.clear();
        self.last_adev = Some(adev);
        Some(adev)
    }

    /// The most recent deviation estimate
    pub(crate) fn last(&self) -> Option<f64> {
        self.last_adev
    }

    pub(crate) fn reset(&mut self) {
        self.samples.clear();
        self.period_start = None;
        self.last_adev = None;
    }
}

/// Thresholds and ages of the discipline state machine
#[derive(Debug, Clone, Copy)]
pub struct DisciplineConfig {
    /// Seconds of one Allan deviation observation period
    pub adev_period: u32,
    /// Deviation below which the clock counts as stable (ppb)
    pub stable_adev: f64,
    /// Deviation above which a locked clock falls back to tracking (ppb)
    pub unstable_adev: f64,
    /// Seconds without updates before a locked or tracking clock enters
    /// holdover
    pub locked_age: u32,
    /// Seconds of holdover before the clock is considered freerunning
    pub holdover_age: u32,
}

impl Default for DisciplineConfig {
    fn default() -> Self {
        Self {
            adev_period: 10,
            stable_adev: 200.0,
            unstable_adev: 2000.0,
            locked_age: 10,
            holdover_age: 600,
        }
    }
}

/// The FREERUN / TRACKING / LOCKED / HOLDOVER state machine
#[derive(Debug)]
pub(crate) struct ClockDiscipline {
    config: DisciplineConfig,
    estimator: AllanDeviationEstimator,
    state: ClockState,
    last_update: Option<Time>,
    calibrated: bool,
}

impl ClockDiscipline {
    pub(crate) fn new(config: DisciplineConfig) -> Self {
        Self {
            config,
            estimator: AllanDeviationEstimator::new(config.adev_period),
            state: ClockState::Freerun,
            last_update: None,
            calibrated: false,
        }
    }

    pub(crate) fn state(&self) -> ClockState {
        self.state
    }

    pub(crate) fn last_adev(&self) -> Option<f64> {
        self.estimator.last()
    }

    /// The calibration delay has elapsed; LOCKED becomes reachable
    pub(crate) fn mark_calibrated(&mut self) {
        self.calibrated = true;
    }

    /// Absorb an applied frequency adjustment
    pub(crate) fn on_update(&mut self, frequency_ppb: f64, now: Time) {
        self.last_update = Some(now);

        if self.state == ClockState::Freerun || self.state == ClockState::Holdover {
            self.set_state(ClockState::Tracking);
        }

        if let Some(adev) = self.estimator.feed(frequency_ppb, now) {
            match self.state {
                ClockState::Tracking if adev < self.config.stable_adev && self.calibrated => {
                    self.set_state(ClockState::Locked)
                }
                ClockState::Locked if adev > self.config.unstable_adev => {
                    self.set_state(ClockState::Tracking)
                }
                _ => {}
            }
        }
    }

    /// Called periodically to detect reference starvation
    pub(crate) fn on_tick(&mut self, now: Time) {
        let Some(last_update) = self.last_update else {
            return;
        };
        let idle_secs = (now - last_update).seconds();

        match self.state {
            ClockState::Tracking | ClockState::Locked
                if idle_secs >= self.config.locked_age as i64 =>
            {
                self.set_state(ClockState::Holdover);
            }
            ClockState::Holdover
                if idle_secs >= (self.config.locked_age + self.config.holdover_age) as i64 =>
            {
                self.set_state(ClockState::Freerun);
                self.estimator.reset();
            }
            _ => {}
        }
    }

    pub(crate) fn reset(&mut self) {
        self.set_state(ClockState::Freerun);
        self.estimator.reset();
        self.last_update = None;
        self.calibrated = false;
    }

    fn set_state(&mut self, state: ClockState) {
        if self.state != state {
            log::info!("clock discipline: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    fn discipline() -> ClockDiscipline {
        ClockDiscipline::new(DisciplineConfig {
            adev_period: 1,
            stable_adev: 100.0,
            unstable_adev: 1000.0,
            locked_age: 10,
            holdover_age: 60,
        })
    }

    #[test]
    fn first_update_starts_tracking() {
        let mut discipline = discipline();
        assert_eq!(discipline.state(), ClockState::Freerun);

        discipline.on_update(100.0, Time::from_secs(0));
        assert_eq!(discipline.state(), ClockState::Tracking);
    }

    #[test]
    fn stable_frequency_locks_after_calibration() {
        let mut discipline = discipline();
        discipline.mark_calibrated();

        // Identical frequency samples, so the deviation is zero
        for i in 0..10 {
            discipline.on_update(500.0, Time::from_secs(i));
        }

        assert_eq!(discipline.state(), ClockState::Locked);
    }

    #[test]
    fn without_calibration_stays_tracking() {
        let mut discipline = discipline();

        for i in 0..10 {
            discipline.on_update(500.0, Time::from_secs(i));
        }

        assert_eq!(discipline.state(), ClockState::Tracking);
    }

    #[test]
    fn starvation_walks_to_holdover_and_freerun() {
        let mut discipline = discipline();
        discipline.on_update(100.0, Time::from_secs(0));

        discipline.on_tick(Time::from_secs(0) + Duration::from_secs(11));
        assert_eq!(discipline.state(), ClockState::Holdover);

        discipline.on_tick(Time::from_secs(0) + Duration::from_secs(100));
        assert_eq!(discipline.state(), ClockState::Freerun);
    }
}
