#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;

/// A log2 representation of seconds used to describe message pacing in PTP
/// (the `logMessageInterval` family of fields).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Interval(i8);

impl core::fmt::Debug for Interval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interval")
            .field("seconds", &self.seconds())
            .field("log_base_2", &self.0)
            .finish()
    }
}

impl Interval {
    /// An Interval of one second
    pub const ONE_SECOND: Self = Self(0);

    /// An Interval of two seconds
    pub const TWO_SECONDS: Self = Self(1);

    /// Construct an [`Interval`] from log2 seconds
    pub const fn from_log_2(log_2: i8) -> Self {
        Self(log_2)
    }

    /// The number of seconds this interval spans, as [`f64`]
    pub fn seconds(self) -> f64 {
        2.0f64.powi(self.0 as i32)
    }

    /// Turn this into a [`crate::time::Duration`]
    pub fn as_duration(self) -> super::Duration {
        super::Duration::from_interval(self)
    }

    /// Turn this into a [`core::time::Duration`]
    pub fn as_core_duration(self) -> core::time::Duration {
        core::time::Duration::from_secs_f64(self.seconds())
    }

    /// Get the log2 of the number of seconds of this [`Interval`]
    pub const fn as_log_2(self) -> i8 {
        self.0
    }
}

impl From<i8> for Interval {
    fn from(value: i8) -> Self {
        Self::from_log_2(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds() {
        assert_eq!(Interval::ONE_SECOND.seconds(), 1.0);
        assert_eq!(Interval::TWO_SECONDS.seconds(), 2.0);
        assert_eq!(Interval::from_log_2(-2).seconds(), 0.25);
        assert_eq!(
            Interval::from_log_2(3).as_core_duration(),
            core::time::Duration::from_secs(8)
        );
    }
}
