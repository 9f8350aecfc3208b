use crate::datastructures::common::{LeapIndicator, TimeSource};

/// The TimePropertiesDS, *IEEE1588-2008 section 8.2.4*: the properties of
/// the timescale currently being distributed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimePropertiesDS {
    /// TAI-UTC offset in seconds; `None` when not known to be valid
    pub current_utc_offset: Option<i16>,
    /// Pending leap second status
    pub leap_indicator: LeapIndicator,
    /// Whether the distributed time is traceable to a primary reference
    pub time_traceable: bool,
    /// Whether the distributed frequency is traceable to a primary reference
    pub frequency_traceable: bool,
    /// Whether the timescale is PTP (TAI) rather than arbitrary
    pub ptp_timescale: bool,
    /// The source the grandmaster derives its time from
    pub time_source: TimeSource,
}

impl TimePropertiesDS {
    /// A PTP (TAI) timescale description
    pub fn new_ptp_time(
        current_utc_offset: Option<i16>,
        leap_indicator: LeapIndicator,
        time_traceable: bool,
        frequency_traceable: bool,
        time_source: TimeSource,
    ) -> Self {
        TimePropertiesDS {
            current_utc_offset,
            leap_indicator,
            time_traceable,
            frequency_traceable,
            ptp_timescale: true,
            time_source,
        }
    }

    /// An arbitrary timescale description; leap seconds do not apply
    pub fn new_arbitrary_time(
        time_traceable: bool,
        frequency_traceable: bool,
        time_source: TimeSource,
    ) -> Self {
        TimePropertiesDS {
            current_utc_offset: None,
            leap_indicator: LeapIndicator::NoLeap,
            time_traceable,
            frequency_traceable,
            ptp_timescale: false,
            time_source,
        }
    }

    /// Whether the timescale is PTP (TAI)
    pub fn is_ptp(&self) -> bool {
        self.ptp_timescale
    }

    /// The pending leap second status
    pub fn leap_indicator(&self) -> LeapIndicator {
        self.leap_indicator
    }
}

impl Default for TimePropertiesDS {
    fn default() -> Self {
        Self::new_arbitrary_time(false, false, TimeSource::InternalOscillator)
    }
}
