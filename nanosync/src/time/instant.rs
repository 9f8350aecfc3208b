use core::{
    fmt::Display,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use az::Cast;
use fixed::types::{I48F16, U96F32};

use super::Duration;
use crate::datastructures::common::{TimeInterval, WireTimestamp};

/// A point in time on the clock's timescale.
///
/// Like [`Duration`] this is a fixed-point number of nanoseconds, but
/// unsigned: the PTP epoch is the zero point and wire timestamps are never
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Time {
    /// Time in nanoseconds since the epoch
    inner: U96F32,
}

impl Time {
    /// Create an instance with the given amount of seconds since the epoch
    pub fn from_secs(secs: u64) -> Self {
        Self {
            inner: U96F32::from_num(secs as u128 * 1_000_000_000),
        }
    }

    /// Create an instance with the given amount of milliseconds since the
    /// epoch
    pub fn from_millis(millis: u64) -> Self {
        Self {
            inner: U96F32::from_num(millis as u128 * 1_000_000),
        }
    }

    /// Create an instance with the given amount of microseconds since the
    /// epoch
    pub fn from_micros(micros: u64) -> Self {
        Self {
            inner: U96F32::from_num(micros as u128 * 1_000),
        }
    }

    /// Create an instance with the given amount of nanoseconds since the
    /// epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            inner: U96F32::from_num(nanos),
        }
    }

    /// Create an instance from a fixed-point nanosecond count
    pub fn from_fixed_nanos<F: Cast<U96F32>>(nanos: F) -> Self {
        Self {
            inner: nanos.cast(),
        }
    }

    /// The whole seconds since the epoch
    pub fn secs(&self) -> u64 {
        (self.inner.to_bits() >> 32) as u64 / 1_000_000_000
    }

    /// The nanoseconds into the current second
    pub fn subsec_nanos(&self) -> u32 {
        ((self.inner.to_bits() >> 32) as u64 % 1_000_000_000) as u32
    }

    /// Total nanoseconds since the epoch, truncating sub-nanoseconds
    pub fn nanos(&self) -> U96F32 {
        self.inner
    }

    /// The sub-nanosecond part, as a correction-field style [`TimeInterval`]
    pub fn subnano(&self) -> TimeInterval {
        let fraction = self.inner.frac().to_bits() as i64;
        // Truncate the 32 fractional bits down to the wire's 16
        TimeInterval(I48F16::from_bits(fraction >> 16))
    }

    /// Seconds until the next UTC midnight, given the TAI-UTC offset.
    ///
    /// Used to schedule the leap second pause window.
    pub fn seconds_to_midnight(&self, utc_offset: i64) -> f64 {
        let utc_secs = self.secs() as i64 - utc_offset;
        let to_midnight = 86_400 - utc_secs.rem_euclid(86_400);
        to_midnight as f64 - self.subsec_nanos() as f64 / 1e9
    }
}

impl From<WireTimestamp> for Time {
    fn from(ts: WireTimestamp) -> Self {
        Self::from_fixed_nanos(ts.seconds as i128 * 1_000_000_000i128 + ts.nanos as i128)
    }
}

impl From<Time> for WireTimestamp {
    fn from(time: Time) -> Self {
        WireTimestamp {
            seconds: time.secs(),
            nanos: time.subsec_nanos(),
        }
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        if rhs.nanos().is_negative() {
            let rhs_abs = (-rhs.nanos()).to_bits() as u128;
            Time {
                inner: U96F32::from_bits(self.inner.to_bits().saturating_sub(rhs_abs)),
            }
        } else {
            Time {
                inner: self.inner + U96F32::from_num(rhs.nanos()),
            }
        }
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Self::Output {
        self + -rhs
    }
}

impl SubAssign<Duration> for Time {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Time) -> Self::Output {
        Duration::from_bits(self.inner.to_bits() as i128 - rhs.inner.to_bits() as i128)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Time {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.secs() as f64 + self.subsec_nanos() as f64 / 1e9)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Time {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds: f64 = serde::Deserialize::deserialize(deserializer)?;
        Ok(Time::from_fixed_nanos(seconds * 1e9))
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:09}", self.secs(), self.subsec_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        // Values below 2^48 seconds survive the round trip bit for bit
        for ts in [
            WireTimestamp { seconds: 0, nanos: 0 },
            WireTimestamp {
                seconds: 425,
                nanos: 999_999_999,
            },
            WireTimestamp {
                seconds: (1u64 << 48) - 1,
                nanos: 1,
            },
        ] {
            assert_eq!(WireTimestamp::from(Time::from(ts)), ts);
        }
    }

    #[test]
    fn subtraction_is_signed() {
        let early = Time::from_secs(99);
        let late = Time::from_secs(100) + Duration::from_nanos(100_000);

        assert_eq!(late - early, Duration::from_nanos(1_000_100_000));
        assert_eq!(early - late, -Duration::from_nanos(1_000_100_000));
    }

    #[test]
    fn negative_offset_saturates_at_epoch() {
        let t = Time::from_nanos(5);
        assert_eq!(t + Duration::from_nanos(-10), Time::from_nanos(0));
    }

    #[test]
    fn subnano() {
        let t = Time::from_fixed_nanos(U96F32::from_num(1.5f64));
        assert_eq!(
            t.subnano(),
            TimeInterval(I48F16::from_num(0.5f64))
        );
    }

    #[test]
    fn midnight_distance() {
        let noon = Time::from_secs(86_400 * 10 + 43_200);
        assert_eq!(noon.seconds_to_midnight(0), 43_200.0);

        let just_before = Time::from_secs(86_400 * 10 + 86_399);
        assert_eq!(just_before.seconds_to_midnight(0), 1.0);
    }
}
