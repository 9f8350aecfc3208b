use crate::time::Duration;

/// The CurrentDS, *IEEE1588-2008 section 8.2.2*: the live synchronization
/// numbers of the instance.
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentDS {
    /// Number of network hops between this instance and the grandmaster
    pub steps_removed: u16,
    /// The most recent offset to the elected master
    pub offset_from_master: Duration,
    /// The current estimate of the one-way network delay to the master
    pub mean_path_delay: Duration,
}
