//! The clock servo: filters offset and delay samples, runs the PI
//! controller, tracks clock stability and decides between stepping and
//! slewing.

mod delay_filter;
mod outlier;
mod pi;
mod stability;

pub use outlier::OutlierFilterConfig;
pub use pi::DtMode;
pub use stability::{ClockState, DisciplineConfig};

use delay_filter::DelayFilter;
use outlier::{FilterDecision, OutlierFilter};
use pi::PiServo;
use stability::ClockDiscipline;

use crate::time::{Duration, Time};

/// Configuration of the servo and its filters
#[derive(Debug, Clone, Copy)]
pub struct ServoConfig {
    /// Proportional divisor of the PI controller
    pub kp: f64,
    /// Integral divisor of the PI controller
    pub ki: f64,
    /// How the controller scales for the time between updates
    pub dt_mode: DtMode,
    /// Hard ceiling of emitted frequency adjustments (ppb)
    pub max_ppb: f64,
    /// Maximum stiffness of the one-way-delay smoother
    pub delay_filter_stiffness: u8,
    /// Outlier rejection on offset samples
    pub offset_outlier_filter: OutlierFilterConfig,
    /// Outlier rejection on delay samples
    pub delay_outlier_filter: OutlierFilterConfig,
    /// Stability monitor thresholds
    pub discipline: DisciplineConfig,
    /// Offsets at or above this magnitude are stepped, not slewed
    pub step_threshold: Duration,
    /// Never step the clock, no matter the offset
    pub no_step: bool,
    /// Allow exactly one step on the first sync even when `no_step` is set
    pub step_once: bool,
    /// Permit steps that move the clock backwards
    pub allow_step_backwards: bool,
}

impl ServoConfig {
    /// Gains suited to software timestamping and its noisy measurements
    pub fn software() -> Self {
        Self {
            kp: 10.0,
            ki: 1000.0,
            dt_mode: DtMode::Measured,
            max_ppb: 512_000.0,
            delay_filter_stiffness: 6,
            offset_outlier_filter: OutlierFilterConfig::default(),
            delay_outlier_filter: OutlierFilterConfig::default(),
            discipline: DisciplineConfig::default(),
            step_threshold: Duration::from_secs(1),
            no_step: false,
            step_once: false,
            allow_step_backwards: true,
        }
    }

    /// Tighter gains for hardware timestamped measurements
    pub fn hardware() -> Self {
        Self {
            kp: 0.7,
            ki: 30.0,
            dt_mode: DtMode::Measured,
            ..Self::software()
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self::software()
    }
}

/// What the engine should do after feeding a sample to the servo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoDecision {
    /// Apply this frequency adjustment (ppb) to the clock
    Slew(f64),
    /// Step the clock by this amount
    Step(Duration),
    /// The sample was absorbed into statistics only; leave the clock alone
    Hold,
}

/// The complete servo
#[derive(Debug)]
pub struct Servo {
    config: ServoConfig,
    pi: PiServo,
    delay_smoother: DelayFilter,
    offset_outliers: OutlierFilter,
    delay_outliers: OutlierFilter,
    discipline: ClockDiscipline,
    stepped_once: bool,
}

impl Servo {
    /// Create a servo from its configuration
    pub fn new(config: ServoConfig) -> Self {
        Self {
            config,
            pi: PiServo::new(config.kp, config.ki, config.dt_mode, config.max_ppb),
            delay_smoother: DelayFilter::new(config.delay_filter_stiffness),
            offset_outliers: OutlierFilter::new(config.offset_outlier_filter),
            delay_outliers: OutlierFilter::new(config.delay_outlier_filter),
            discipline: ClockDiscipline::new(config.discipline),
            stepped_once: false,
        }
    }

    /// Seed the frequency estimate, e.g. from the persisted value of the
    /// previous run
    pub fn preload_frequency(&mut self, ppb: f64) {
        self.pi.preload(ppb);
        log::info!("servo: preloaded frequency estimate of {ppb:.3} ppb");
    }

    /// The current frequency estimate in parts per billion
    pub fn frequency_ppb(&self) -> f64 {
        self.pi.frequency_ppb()
    }

    /// The discipline state of the steered clock
    pub fn clock_state(&self) -> ClockState {
        self.discipline.state()
    }

    /// The most recent Allan deviation estimate, if one was computed
    pub fn last_adev(&self) -> Option<f64> {
        self.discipline.last_adev()
    }

    /// Tell the servo the post-parent-change calibration delay has elapsed
    pub fn mark_calibrated(&mut self) {
        self.discipline.mark_calibrated();
    }

    /// Filter a raw one-way-delay sample into the running estimate.
    /// Returns `None` when the sample was rejected.
    pub fn absorb_delay(&mut self, raw_delay: Duration) -> Option<Duration> {
        let sample = match self.delay_outliers.feed(raw_delay.nanos_lossy()) {
            FilterDecision::Accept(value) | FilterDecision::Replace(value) => {
                Duration::from_fixed_nanos(value)
            }
            FilterDecision::Discard | FilterDecision::Block => return None,
        };

        Some(self.delay_smoother.feed(sample))
    }

    /// The smoothed one-way delay estimate
    pub fn mean_delay(&self) -> Option<Duration> {
        self.delay_smoother.estimate()
    }

    /// Absorb one offset-from-master sample and decide what to do with the
    /// clock.
    pub fn absorb_offset(&mut self, offset: Duration, now: Time) -> ServoDecision {
        if offset.abs() >= self.config.step_threshold {
            return self.step_decision(offset);
        }

        let offset_ns = match self.offset_outliers.feed(offset.nanos_lossy()) {
            FilterDecision::Accept(value) | FilterDecision::Replace(value) => value,
            FilterDecision::Discard | FilterDecision::Block => return ServoDecision::Hold,
        };

        // A positive offset means we are ahead of the master, so the
        // adjustment slows the clock down
        let adjustment = -self.pi.update(offset_ns, now);
        self.discipline.on_update(self.pi.frequency_ppb(), now);

        ServoDecision::Slew(adjustment)
    }

    fn step_decision(&mut self, offset: Duration) -> ServoDecision {
        let first = !self.stepped_once;

        let may_step = if self.config.no_step {
            self.config.step_once && first
        } else {
            true
        };

        let backwards = offset > Duration::ZERO;
        if !may_step || (backwards && !self.config.allow_step_backwards && !first) {
            log::warn!("servo: offset {offset} requires a step the policy forbids");
            return ServoDecision::Hold;
        }

        self.stepped_once = true;
        ServoDecision::Step(-offset)
    }

    /// Periodic upkeep: starvation detection for the discipline states
    pub fn tick(&mut self, now: Time) {
        self.discipline.on_tick(now);
    }

    /// Reset all filter and controller state; keeps the frequency estimate
    /// because the oscillator did not change.
    pub fn reset(&mut self) {
        let frequency = self.pi.frequency_ppb();
        self.pi.reset();
        self.pi.preload(frequency);
        self.pi.reset_interval();
        self.delay_smoother.reset();
        self.offset_outliers.reset();
        self.delay_outliers.reset();
        self.discipline.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo() -> Servo {
        Servo::new(ServoConfig {
            dt_mode: DtMode::Unity,
            ..ServoConfig::software()
        })
    }

    #[test]
    fn small_offset_is_slewed() {
        let mut servo = servo();

        match servo.absorb_offset(Duration::from_micros(75), Time::from_secs(100)) {
            ServoDecision::Slew(ppb) => assert!(ppb < 0.0),
            other => panic!("expected slew, got {other:?}"),
        }
        assert_eq!(servo.clock_state(), ClockState::Tracking);
    }

    #[test]
    fn one_second_offset_is_stepped() {
        let mut servo = servo();

        let offset = Duration::from_millis(1200);
        match servo.absorb_offset(offset, Time::from_secs(100)) {
            ServoDecision::Step(step) => assert_eq!(step, -offset),
            other => panic!("expected step, got {other:?}"),
        }
    }

    #[test]
    fn no_step_holds_unless_step_once() {
        let mut config = ServoConfig::software();
        config.no_step = true;
        let mut servo = Servo::new(config);

        assert_eq!(
            servo.absorb_offset(Duration::from_secs(2), Time::from_secs(0)),
            ServoDecision::Hold
        );

        let mut config = ServoConfig::software();
        config.no_step = true;
        config.step_once = true;
        let mut servo = Servo::new(config);

        assert!(matches!(
            servo.absorb_offset(Duration::from_secs(2), Time::from_secs(0)),
            ServoDecision::Step(_)
        ));
        // Only the first sync may step
        assert_eq!(
            servo.absorb_offset(Duration::from_secs(2), Time::from_secs(1)),
            ServoDecision::Hold
        );
    }

    #[test]
    fn delay_filter_smooths() {
        let mut servo = servo();

        assert_eq!(
            servo.absorb_delay(Duration::from_micros(75)),
            Some(Duration::from_micros(75))
        );
        assert!(servo.mean_delay().is_some());
    }

    #[test]
    fn reset_keeps_frequency_estimate() {
        let mut servo = servo();
        servo.preload_frequency(250.0);
        servo.reset();
        assert_eq!(servo.frequency_ppb(), 250.0);
    }
}
