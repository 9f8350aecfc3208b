use crate::datastructures::common::{ClockIdentity, ClockQuality};

/// Instance wide configuration, the seed of the DefaultDS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceConfig {
    /// The identity of this clock; usually derived from a MAC address
    pub clock_identity: ClockIdentity,
    /// First master election priority, lower is better
    pub priority_1: u8,
    /// Second master election priority, lower is better
    pub priority_2: u8,
    /// The PTP domain to operate in
    pub domain_number: u8,
    /// Never become a master
    pub slave_only: bool,
    /// Timestamp events in two steps (Sync plus FollowUp)
    pub two_step: bool,
    /// The quality advertised for this clock
    pub clock_quality: ClockQuality,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            clock_identity: ClockIdentity::default(),
            priority_1: 128,
            priority_2: 128,
            domain_number: 0,
            slave_only: false,
            two_step: true,
            clock_quality: ClockQuality::default(),
        }
    }
}
