/// The announced leap second status of the timescale.
///
/// Modeling this as an enum makes the `leap59 && leap61` flag combination
/// unrepresentable inside the engine; parsing a header that carries both
/// bits is a protocol error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LeapIndicator {
    /// No leap second pending
    #[default]
    NoLeap,
    /// The last minute of the current UTC day contains 59 seconds
    Leap59,
    /// The last minute of the current UTC day contains 61 seconds
    Leap61,
}

impl LeapIndicator {
    /// Seconds the UTC offset changes by at the event (+1, -1 or 0)
    pub fn offset_change(self) -> i16 {
        match self {
            LeapIndicator::NoLeap => 0,
            LeapIndicator::Leap59 => -1,
            LeapIndicator::Leap61 => 1,
        }
    }
}
