//! Implementation of the abstract clock for the linux platform

use std::path::Path;

use clock_steering::{unix::UnixClock, Clock, TimeOffset};
use nanosync::{
    config::TimePropertiesDS,
    time::{Duration, Time},
};

/// The system clock or a PTP hardware clock, steered through
/// `clock-steering`.
#[derive(Debug, Clone)]
pub struct LinuxClock {
    clock: UnixClock,
    read_only: bool,
}

impl LinuxClock {
    /// The system realtime clock
    pub const CLOCK_REALTIME: Self = Self {
        clock: UnixClock::CLOCK_REALTIME,
        read_only: false,
    };

    /// Open a PTP hardware clock device, e.g. `/dev/ptp0`
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let clock = UnixClock::open(path)?;
        Ok(Self {
            clock,
            read_only: false,
        })
    }

    /// Mark the clock as monitored-only: it will be measured but never
    /// steered.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

fn time_from_timestamp(timestamp: clock_steering::Timestamp) -> Time {
    Time::from_fixed_nanos(
        timestamp.seconds as i128 * 1_000_000_000i128 + timestamp.nanos as i128,
    )
}

fn time_offset_from_duration(offset: Duration) -> TimeOffset {
    let mut seconds = offset.seconds();
    let mut nanos = offset.subsec_nanos();

    // The kernel interface wants a non-negative nanosecond part
    if nanos < 0 {
        seconds -= 1;
        nanos += 1_000_000_000;
    }

    TimeOffset {
        seconds,
        nanos: nanos as u32,
    }
}

impl nanosync::Clock for LinuxClock {
    type Error = clock_steering::unix::Error;

    fn now(&self) -> Time {
        let timestamp = self.clock.now().expect("could not read the clock");
        time_from_timestamp(timestamp)
    }

    fn set_time(&mut self, time: Time) -> Result<Time, Self::Error> {
        let offset = time - self.now();
        self.step_clock(offset)
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        let timestamp = self.clock.step_clock(time_offset_from_duration(offset))?;
        Ok(time_from_timestamp(timestamp))
    }

    fn set_frequency(&mut self, ppb: f64) -> Result<Time, Self::Error> {
        // clock-steering speaks ppm
        let timestamp = self.clock.set_frequency(ppb / 1e3)?;
        Ok(time_from_timestamp(timestamp))
    }

    fn set_properties(&mut self, _time_properties_ds: &TimePropertiesDS) -> Result<(), Self::Error> {
        // Leap second and UTC offset propagation to the kernel is left to
        // the system's NTP machinery for now
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}
