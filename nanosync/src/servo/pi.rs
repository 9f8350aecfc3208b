use crate::time::Time;

/// How the controller measures the time between two updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DtMode {
    /// Assume the target sync interval elapsed between updates
    Constant(f64),
    /// Measure the elapsed time between updates
    Measured,
    /// No interval scaling, `dt = 1`
    Unity,
}

/// The proportional-integral controller turning offset samples into a
/// frequency adjustment in parts per billion.
///
/// Per sample `k`:
/// ```text
/// integral_k   = integral_{k-1} + offset_k / (kI * dt_k)
/// adjustment_k = offset_k / kP + integral_k
/// ```
#[derive(Debug)]
pub(crate) struct PiServo {
    kp: f64,
    ki: f64,
    dt_mode: DtMode,
    max_ppb: f64,
    integral: f64,
    last_update: Option<Time>,
}

impl PiServo {
    pub(crate) fn new(kp: f64, ki: f64, dt_mode: DtMode, max_ppb: f64) -> Self {
        Self {
            kp,
            ki,
            dt_mode,
            max_ppb,
            integral: 0.0,
            last_update: None,
        }
    }

    /// Seed the integrator, e.g. from a stored frequency estimate
    pub(crate) fn preload(&mut self, ppb: f64) {
        self.integral = ppb.clamp(-self.max_ppb, self.max_ppb);
    }

    /// The accumulated frequency estimate in parts per billion
    pub(crate) fn frequency_ppb(&self) -> f64 {
        self.integral
    }

    /// Absorb one offset sample (nanoseconds, positive meaning the local
    /// clock is ahead) and return the frequency adjustment to apply.
    pub(crate) fn update(&mut self, offset: f64, now: Time) -> f64 {
        let dt = match self.dt_mode {
            DtMode::Constant(interval) => interval.max(f64::MIN_POSITIVE),
            DtMode::Measured => match self.last_update {
                Some(last) if now > last => (now - last).seconds_lossy(),
                _ => 1.0,
            },
            DtMode::Unity => 1.0,
        };

        self.last_update = Some(now);

        self.integral += offset / (self.ki * dt);
        self.integral = self.integral.clamp(-self.max_ppb, self.max_ppb);

        (offset / self.kp + self.integral).clamp(-self.max_ppb, self.max_ppb)
    }

    /// Forget the state but keep the frequency estimate; used when the
    /// parent changes
    pub(crate) fn reset_interval(&mut self) {
        self.last_update = None;
    }

    /// Forget everything, including the frequency estimate
    pub(crate) fn reset(&mut self) {
        self.integral = 0.0;
        self.last_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_accumulates() {
        let mut servo = PiServo::new(10.0, 1000.0, DtMode::Unity, 512_000.0);

        // offset 1000 ns: integral becomes 1, adjustment 100 + 1
        assert_eq!(servo.update(1000.0, Time::from_secs(0)), 101.0);
        // again: integral 2, adjustment 102
        assert_eq!(servo.update(1000.0, Time::from_secs(1)), 102.0);
        assert_eq!(servo.frequency_ppb(), 2.0);
    }

    #[test]
    fn adjustment_saturates() {
        let mut servo = PiServo::new(10.0, 1000.0, DtMode::Unity, 500.0);
        assert_eq!(servo.update(1e9, Time::from_secs(0)), 500.0);
        assert_eq!(servo.update(-1e9, Time::from_secs(1)), -500.0);
    }

    #[test]
    fn measured_dt_scales_the_integral() {
        let mut servo = PiServo::new(10.0, 1000.0, DtMode::Measured, 512_000.0);

        servo.update(1000.0, Time::from_secs(0));
        let first_integral = servo.frequency_ppb();

        // Twice the interval means half the integral gain
        servo.update(1000.0, Time::from_secs(2));
        assert_eq!(servo.frequency_ppb() - first_integral, first_integral / 2.0);
    }

    #[test]
    fn preload_seeds_the_estimate() {
        let mut servo = PiServo::new(10.0, 1000.0, DtMode::Unity, 512_000.0);
        servo.preload(-1500.0);
        assert_eq!(servo.frequency_ppb(), -1500.0);
    }
}
