use arrayvec::ArrayVec;
use rand::Rng;

use crate::{
    datastructures::common::TransportAddress,
    time::{Duration, Interval},
};

/// Which delay mechanism a port uses
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DelayMechanism {
    /// End to end delay measurement across potentially multiple hops.
    /// The interval corresponds to the PortDS logMinDelayReqInterval.
    E2E {
        /// Pacing of the DelayReq messages
        interval: Interval,
    },
    /// Peer to peer delay measurement to the directly attached neighbor.
    /// The interval corresponds to the PortDS logMinPdelayReqInterval.
    P2P {
        /// Pacing of the PdelayReq messages
        interval: Interval,
    },
}

impl DelayMechanism {
    /// The pacing interval of the delay measurement messages
    pub fn interval(&self) -> Interval {
        match self {
            DelayMechanism::E2E { interval } | DelayMechanism::P2P { interval } => *interval,
        }
    }
}

/// How the port addresses its peers
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TransportMode {
    /// Everything to the multicast groups
    #[default]
    Multicast,
    /// Announce and Sync multicast, the delay exchange unicast
    Hybrid,
    /// Everything unicast, paced by negotiated grants
    Unicast,
}

/// A master a unicast slave is configured to talk to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UnicastMaster {
    /// Where to reach the master
    pub address: TransportAddress,
    /// G.8265.1 local preference for the election; lower is better
    pub local_preference: u8,
}

/// What to do when a leap second event is announced by the parent
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum LeapAction {
    /// Pause clock updates around the event and step afterwards
    #[default]
    Step,
    /// Smear the second out over the configured period
    Smear {
        /// Seconds to spread the leap second over
        period: u32,
    },
}

/// Configuration items of the PTP PortDS dataset, plus the engine knobs that
/// pace this port. Dynamic fields live in [`crate::port::Port`].
#[derive(Debug, Clone)]
pub struct PortConfig<A> {
    /// Filter on masters this port may synchronize to
    pub acceptable_master_list: A,
    /// The delay mechanism and its pacing
    pub delay_mechanism: DelayMechanism,
    /// Pacing of announce messages when master
    pub announce_interval: Interval,
    /// Announce intervals without announce before the master is presumed
    /// gone
    pub announce_receipt_timeout: u8,
    /// Pacing of sync messages when master
    pub sync_interval: Interval,
    /// This port never becomes a slave
    pub master_only: bool,
    /// Correction for a known send/receive path asymmetry
    pub delay_asymmetry: Duration,
    /// Fixed receive path latency of the hardware
    pub ingress_latency: Duration,
    /// Fixed send path latency of the hardware
    pub egress_latency: Duration,
    /// Constant shift applied to every offset measurement
    pub offset_correction: Duration,
    /// How the port addresses its peers
    pub transport_mode: TransportMode,
    /// Negotiate unicast transmission grants via signaling
    pub unicast_negotiation: bool,
    /// Accept grants from masters outside [`Self::unicast_masters`]
    pub unicast_accept_any: bool,
    /// The masters a unicast slave requests grants from
    pub unicast_masters: ArrayVec<UnicastMaster, 16>,
    /// Seconds of grant duration requested from masters
    pub unicast_grant_duration: u32,
    /// Coarsest grant interval offered or requested
    pub unicast_log_max_interval: i8,
    /// Finest grant interval offered or requested
    pub unicast_log_min_interval: i8,
    /// Reject Sync messages that run backwards in sequence
    pub sync_sequence_checking: bool,
    /// Seconds without a clock update before the slave resets
    pub clock_update_timeout: u32,
    /// Seconds clock updates stay suppressed after a parent change
    pub calibration_delay: u32,
    /// Leap second handling
    pub leap_action: LeapAction,
    /// Seconds around the leap event during which updates pause
    pub leap_pause_period: u32,
    /// Suspend updates and hold for this long when the offset exceeds one
    /// second; zero disables panic mode
    pub panic_mode_duration: u32,
    /// Seconds to stay faulty before trying to reinitialize the transport
    pub transport_fault_timeout: u32,
    /// Seconds clock steering stays suspended after a clock driver error
    pub clock_fault_timeout: u32,
}

impl<A> PortConfig<A> {
    /// The pacing floor for delay requests
    pub fn min_delay_req_interval(&self) -> Interval {
        self.delay_mechanism.interval()
    }

    /// The announce receipt timeout interval, randomized within one announce
    /// interval so that simultaneously started nodes do not tie in the
    /// election.
    pub fn announce_duration(&self, rng: &mut impl Rng) -> core::time::Duration {
        // Timeout is at least one announce interval, plus a random extra of
        // up to one more interval
        let base = self.announce_interval.as_core_duration()
            * self.announce_receipt_timeout.max(1) as u32;
        base + self.announce_interval.as_core_duration().mul_f64(rng.gen::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::config::AcceptAnyMaster;

    #[test]
    fn announce_duration_is_randomized_within_one_interval() {
        let config = PortConfig {
            acceptable_master_list: AcceptAnyMaster,
            delay_mechanism: DelayMechanism::E2E {
                interval: Interval::ONE_SECOND,
            },
            announce_interval: Interval::TWO_SECONDS,
            announce_receipt_timeout: 3,
            sync_interval: Interval::ONE_SECOND,
            master_only: false,
            delay_asymmetry: Duration::ZERO,
            ingress_latency: Duration::ZERO,
            egress_latency: Duration::ZERO,
            offset_correction: Duration::ZERO,
            transport_mode: TransportMode::Multicast,
            unicast_negotiation: false,
            unicast_accept_any: false,
            unicast_masters: ArrayVec::new(),
            unicast_grant_duration: 300,
            unicast_log_max_interval: 4,
            unicast_log_min_interval: -4,
            sync_sequence_checking: true,
            clock_update_timeout: 60,
            calibration_delay: 0,
            leap_action: LeapAction::Step,
            leap_pause_period: 5,
            panic_mode_duration: 30,
            transport_fault_timeout: 10,
            clock_fault_timeout: 10,
        };

        let mut rng = StepRng::new(0, 0);
        let duration = config.announce_duration(&mut rng);

        assert!(duration >= core::time::Duration::from_secs(6));
        assert!(duration < core::time::Duration::from_secs(8));
    }
}
