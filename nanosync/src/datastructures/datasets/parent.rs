use super::DefaultDS;
use crate::datastructures::common::{ClockIdentity, ClockQuality, PortIdentity};

/// The ParentDS, *IEEE1588-2008 section 8.2.3*: who we are synchronized to,
/// and the grandmaster it leads to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParentDS {
    /// The identity of the port we listen to; our own port 0 when master
    pub parent_port_identity: PortIdentity,
    /// Whether the observed parent statistics below are being computed
    pub parent_stats: bool,
    /// Observed variance of the parent's phase, *section 8.2.3.4*
    pub observed_parent_offset_scaled_log_variance: u16,
    /// Observed phase change rate of the parent, *section 8.2.3.5*
    pub observed_parent_clock_phase_change_rate: u32,
    /// The identity of the elected grandmaster
    pub grandmaster_identity: ClockIdentity,
    /// The quality the grandmaster advertises
    pub grandmaster_clock_quality: ClockQuality,
    /// The grandmaster's first election priority
    pub grandmaster_priority_1: u8,
    /// The grandmaster's second election priority
    pub grandmaster_priority_2: u8,
}

impl ParentDS {
    /// The initial data set: we are our own parent and grandmaster
    pub fn new(default_ds: DefaultDS) -> Self {
        Self {
            parent_port_identity: PortIdentity {
                clock_identity: default_ds.clock_identity,
                port_number: 0,
            },
            parent_stats: false,
            observed_parent_offset_scaled_log_variance: 0xffff,
            observed_parent_clock_phase_change_rate: 0x7fff_ffff,
            grandmaster_identity: default_ds.clock_identity,
            grandmaster_clock_quality: default_ds.clock_quality,
            grandmaster_priority_1: default_ds.priority_1,
            grandmaster_priority_2: default_ds.priority_2,
        }
    }
}
