use crate::{
    datastructures::datasets::TimePropertiesDS,
    time::{Duration, Time},
};

/// Clock manipulation and querying interface
///
/// The clock driver can be a hardware device, the system clock, or a virtual
/// clock in tests. The engine decides *when* to step or slew; the driver only
/// executes. Errors from a driver suspend clock steering for a configured
/// hold-off, they never crash the engine.
pub trait Clock {
    /// The errors the clock can return
    type Error: core::fmt::Debug;

    /// Get the current time of the clock
    fn now(&self) -> Time;

    /// Set the clock to the given time, discarding the current value
    fn set_time(&mut self, time: Time) -> Result<Time, Self::Error>;

    /// Change the current time of the clock by offset. Returns the time at
    /// which the change was applied.
    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error>;

    /// Set the frequency offset of the clock in parts per billion. A
    /// positive value speeds the clock up. Implementations saturate at
    /// [`max_frequency_ppb`](`Clock::max_frequency_ppb`). Returns the time
    /// at which the change was applied.
    fn set_frequency(&mut self, ppb: f64) -> Result<Time, Self::Error>;

    /// Adjust the timescale properties of the clock, e.g. the upcoming leap
    /// second and UTC offset
    fn set_properties(&mut self, time_properties_ds: &TimePropertiesDS)
        -> Result<(), Self::Error>;

    /// The largest frequency adjustment this clock supports, in parts per
    /// billion. On platforms with a tick length knob the usable range
    /// extends well beyond the textbook 500 ppm.
    fn max_frequency_ppb(&self) -> f64 {
        500_000.0
    }

    /// A read-only clock is monitored (offset and stability statistics) but
    /// never stepped or slewed
    fn read_only(&self) -> bool {
        false
    }
}
