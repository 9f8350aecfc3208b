use crate::time::{Duration, Time};

/// A single completed offset measurement against the elected master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// The local receive time of the Sync that anchored this measurement
    pub event_time: Time,
    /// The measured offset from the master
    pub master_offset: Duration,
    /// The mean path delay used in the computation
    pub mean_delay: Duration,
}
