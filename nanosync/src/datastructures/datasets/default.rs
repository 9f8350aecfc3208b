use crate::{
    config::InstanceConfig,
    datastructures::common::{ClockIdentity, ClockQuality, SLAVE_ONLY_CLOCK_CLASS},
};

/// The DefaultDS, *IEEE1588-2008 section 8.2.1*: the static description of
/// this PTP instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefaultDS {
    /// Whether the instance timestamps events in two steps
    pub two_step: bool,
    /// The identity of this clock
    pub clock_identity: ClockIdentity,
    /// Number of ports of this instance; always 1 for an ordinary clock
    pub number_ports: u16,
    /// The quality advertised for this clock
    pub clock_quality: ClockQuality,
    /// First master-election priority
    pub priority_1: u8,
    /// Second master-election priority
    pub priority_2: u8,
    /// The PTP domain this instance operates in
    pub domain_number: u8,
    /// Whether this instance may only ever be a slave
    pub slave_only: bool,
}

impl DefaultDS {
    /// Build the data set of a single port ordinary clock
    pub fn new(config: InstanceConfig) -> Self {
        let clock_quality = if config.slave_only {
            ClockQuality {
                clock_class: SLAVE_ONLY_CLOCK_CLASS,
                ..config.clock_quality
            }
        } else {
            config.clock_quality
        };

        Self {
            two_step: config.two_step,
            clock_identity: config.clock_identity,
            number_ports: 1,
            clock_quality,
            priority_1: config.priority_1,
            priority_2: config.priority_2,
            domain_number: config.domain_number,
            slave_only: config.slave_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_only_forces_clock_class() {
        let config = InstanceConfig {
            clock_identity: ClockIdentity([1; 8]),
            slave_only: true,
            ..Default::default()
        };

        let default_ds = DefaultDS::new(config);
        assert_eq!(default_ds.clock_quality.clock_class, SLAVE_ONLY_CLOCK_CLASS);
        assert_eq!(default_ds.number_ports, 1);
    }
}
