use core::{
    fmt::Display,
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
};

use az::Cast;
use fixed::types::I96F32;

use super::Interval;
use crate::datastructures::common::TimeInterval;

#[allow(unused_imports)]
use crate::float_polyfill::FloatPolyfill;

/// A signed duration with sub-nanosecond resolution.
///
/// Stored as a 96.32 fixed-point number of nanoseconds, which comfortably
/// spans anything PTP can express on the wire while keeping the correction
/// field's 2^-16 ns resolution exactly representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Duration {
    /// Time in nanoseconds
    inner: I96F32,
}

impl Duration {
    /// A duration of zero length
    pub const ZERO: Duration = Duration {
        inner: I96F32::ZERO,
    };

    /// Create an instance with the given amount of seconds
    pub fn from_secs(secs: i64) -> Self {
        Self {
            inner: I96F32::from_num(secs as i128 * 1_000_000_000),
        }
    }

    /// Create an instance with the given amount of milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self {
            inner: I96F32::from_num(millis as i128 * 1_000_000),
        }
    }

    /// Create an instance with the given amount of microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self {
            inner: I96F32::from_num(micros as i128 * 1_000),
        }
    }

    /// Create an instance with the given amount of nanoseconds
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            inner: I96F32::from_num(nanos),
        }
    }

    /// Create an instance from a fixed-point or floating nanosecond count
    pub fn from_fixed_nanos<F: Cast<I96F32>>(nanos: F) -> Self {
        Self {
            inner: nanos.cast(),
        }
    }

    /// Create an instance from a number of seconds given as [`f64`]
    pub fn from_seconds(secs: f64) -> Self {
        Self {
            inner: (secs * 1e9).cast(),
        }
    }

    /// The duration of one message interval, `2^log_interval` seconds
    pub fn from_log_interval(log_interval: i8) -> Self {
        Self::from_interval(Interval::from_log_2(log_interval))
    }

    /// The duration of one [`Interval`]
    pub fn from_interval(interval: Interval) -> Self {
        Self::from_seconds(interval.seconds())
    }

    pub(crate) const fn from_bits(bits: i128) -> Self {
        Self {
            inner: I96F32::from_bits(bits),
        }
    }

    pub(crate) const fn to_bits(self) -> i128 {
        self.inner.to_bits()
    }

    /// Get the total amount of nanoseconds
    pub fn nanos(&self) -> I96F32 {
        self.inner
    }

    /// Get the total amount of nanoseconds, losing the sub-nanosecond part
    pub fn nanos_rounded(&self) -> i64 {
        self.whole_nanos() as i64
    }

    /// Get the total amount of nanoseconds as a float
    pub fn nanos_lossy(&self) -> f64 {
        self.inner.cast()
    }

    /// Get the total amount of seconds as a float
    pub fn seconds_lossy(&self) -> f64 {
        self.nanos_lossy() / 1e9
    }

    /// The whole-second component, truncated toward zero.
    ///
    /// Always carries the same sign as [`subsec_nanos`](`Self::subsec_nanos`)
    /// (or either is zero), the classic normalized seconds/nanoseconds split.
    pub fn seconds(&self) -> i64 {
        (self.whole_nanos() / 1_000_000_000) as i64
    }

    /// The sub-second component in nanoseconds, in `(-1e9, 1e9)` and with the
    /// same sign as [`seconds`](`Self::seconds`).
    pub fn subsec_nanos(&self) -> i32 {
        (self.whole_nanos() % 1_000_000_000) as i32
    }

    fn whole_nanos(&self) -> i128 {
        // The shift floors, so a fractional negative nanosecond count lands on
        // the next whole nanosecond below. The `/` and `%` in the accessors
        // both truncate toward zero, keeping the two components same-signed.
        self.inner.to_bits() >> 32
    }

    /// Absolute value
    pub fn abs(self) -> Duration {
        if self.inner.is_negative() {
            -self
        } else {
            self
        }
    }

    /// Halve the duration, the only division the protocol needs (round-trip
    /// to one-way conversion).
    pub fn halved(self) -> Duration {
        Self {
            inner: self.inner >> 1,
        }
    }

    /// Clamp the duration between `min` and `max`
    pub fn clamp(self, min: Duration, max: Duration) -> Duration {
        Ord::clamp(self, min, max)
    }
}

impl From<TimeInterval> for Duration {
    fn from(interval: TimeInterval) -> Self {
        // I48F16 scaled nanoseconds widen losslessly into I96F32
        Self {
            inner: I96F32::from_num(interval.0),
        }
    }
}

impl From<Duration> for core::time::Duration {
    fn from(value: Duration) -> Self {
        if value.inner.is_negative() {
            core::time::Duration::ZERO
        } else {
            core::time::Duration::from_nanos(value.nanos_rounded() as u64)
        }
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Self::Output {
        Self { inner: -self.inner }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Duration {
            inner: self.inner + rhs.inner,
        }
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        self.inner += rhs.inner;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        Duration {
            inner: self.inner - rhs.inner,
        }
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        self.inner -= rhs.inner;
    }
}

impl Mul<i32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i32) -> Self::Output {
        Duration {
            inner: self.inner * I96F32::from_num(rhs),
        }
    }
}

impl Div<i32> for Duration {
    type Output = Duration;

    fn div(self, rhs: i32) -> Self::Output {
        Duration {
            inner: self.inner / I96F32::from_num(rhs),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Duration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.nanos_lossy())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Duration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nanos: f64 = serde::Deserialize::deserialize(deserializer)?;
        Ok(Duration::from_fixed_nanos(nanos))
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ns", self.nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_split() {
        let cases = [
            (Duration::from_nanos(1_500_000_000), 1, 500_000_000),
            (Duration::from_nanos(-1_500_000_000), -1, -500_000_000),
            (Duration::from_nanos(999_999_999), 0, 999_999_999),
            (Duration::from_nanos(-999_999_999), 0, -999_999_999),
            (Duration::ZERO, 0, 0),
        ];

        for (duration, seconds, nanos) in cases {
            assert_eq!(duration.seconds(), seconds);
            assert_eq!(duration.subsec_nanos(), nanos);
            // Same sign, or one of the parts is zero
            assert!(
                duration.seconds().signum() as i32 * duration.subsec_nanos().signum() >= 0,
                "sign mismatch for {duration}"
            );
            assert!(duration.subsec_nanos().abs() < 1_000_000_000);
        }
    }

    #[test]
    fn addition_is_commutative() {
        let a = Duration::from_secs(i32::MAX as i64);
        let b = Duration::from_nanos(999_999_999);

        assert_eq!(a + b, b + a);
        assert_eq!((a + b).seconds(), i32::MAX as i64);
        assert_eq!((a + b).subsec_nanos(), 999_999_999);
    }

    #[test]
    fn halving() {
        assert_eq!(
            Duration::from_nanos(150_000).halved(),
            Duration::from_nanos(75_000)
        );
        assert_eq!(
            Duration::from_secs(3).halved(),
            Duration::from_millis(1_500)
        );
        assert_eq!(
            Duration::from_nanos(-1).halved(),
            Duration::from_fixed_nanos(-0.5f64)
        );
    }

    #[test]
    fn log_interval() {
        assert_eq!(Duration::from_log_interval(0), Duration::from_secs(1));
        assert_eq!(Duration::from_log_interval(3), Duration::from_secs(8));
        assert_eq!(Duration::from_log_interval(-2), Duration::from_millis(250));
    }

    #[test]
    fn interval_conversion_is_lossless() {
        // A correction field value survives the round trip through Duration
        let interval = TimeInterval(fixed::types::I48F16::from_num(2.5f64));
        let duration = Duration::from(interval);
        assert_eq!(TimeInterval::from(duration), interval);
    }
}
