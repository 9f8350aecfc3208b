use crate::{
    config::DelayMechanism,
    datastructures::common::PortIdentity,
    time::{Duration, Interval},
};

/// The PortDS, *IEEE1588-2008 section 8.2.5*, as exposed through management
/// and observability. The live copies of the dynamic members are owned by
/// the port engine; this snapshot is assembled on demand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDS {
    /// The identity of this port
    pub port_identity: PortIdentity,
    /// The protocol state, encoded per *table 8*
    pub port_state: u8,
    /// Pacing floor for delay requests
    pub log_min_delay_req_interval: i8,
    /// Latest peer delay measurement (P2P only)
    pub peer_mean_path_delay: Duration,
    /// Announce pacing of this port
    pub log_announce_interval: i8,
    /// Multiples of the announce interval without announce before the
    /// current master is presumed gone
    pub announce_receipt_timeout: u8,
    /// Sync pacing of this port when master
    pub log_sync_interval: i8,
    /// The delay measurement mechanism in use
    pub delay_mechanism: u8,
    /// Pacing floor for peer delay requests
    pub log_min_pdelay_req_interval: i8,
    /// The PTP version, always 2
    pub version_number: u8,
}

impl PortDS {
    /// Assemble a snapshot from the port's live configuration
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        port_identity: PortIdentity,
        port_state: u8,
        delay_mechanism: DelayMechanism,
        announce_interval: Interval,
        announce_receipt_timeout: u8,
        sync_interval: Interval,
        peer_mean_path_delay: Duration,
    ) -> Self {
        let (mechanism, delay_interval) = match delay_mechanism {
            DelayMechanism::E2E { interval } => (1, interval),
            DelayMechanism::P2P { interval } => (2, interval),
        };

        Self {
            port_identity,
            port_state,
            log_min_delay_req_interval: delay_interval.as_log_2(),
            peer_mean_path_delay,
            log_announce_interval: announce_interval.as_log_2(),
            announce_receipt_timeout,
            log_sync_interval: sync_interval.as_log_2(),
            delay_mechanism: mechanism,
            log_min_pdelay_req_interval: delay_interval.as_log_2(),
            version_number: 2,
        }
    }
}
