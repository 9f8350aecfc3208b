use crate::{
    datastructures::common::PortIdentity,
    time::{Duration, Time},
};

/// FollowUp messages arriving more than this many Sync sequence ids away
/// from the Sync under processing are dropped.
pub(crate) const MAX_FOLLOWUP_GAP: u16 = 3;

/// Out-of-order Syncs within this window are rejected when sync sequence
/// checking is on; anything further out is treated as a restart of the
/// master.
pub(crate) const SYNC_SEQUENCE_WINDOW: u16 = 50;

/// The protocol state of the port, *IEEE1588-2008 section 9.2.5*
#[derive(Debug)]
pub enum PortState {
    /// Data sets are being initialized; nothing is sent or received
    Initializing,
    /// A fault took the port down; a recovery timer will reinitialize it
    Faulty,
    /// Administratively disabled
    Disabled,
    /// Waiting to hear from a master before deciding what to be
    Listening,
    /// Won the election; waiting out the qualification period
    PreMaster,
    /// Serving time to the domain
    Master(MasterState),
    /// Lost the election but may not become a slave
    Passive,
    /// Following a master but the servo has not applied a first update
    Uncalibrated(SlaveState),
    /// Synchronized to the elected master
    Slave(SlaveState),
}

impl PortState {
    /// The wire encoding of the state, *table 8*
    pub fn to_primitive(&self) -> u8 {
        match self {
            PortState::Initializing => 0x01,
            PortState::Faulty => 0x02,
            PortState::Disabled => 0x03,
            PortState::Listening => 0x04,
            PortState::PreMaster => 0x05,
            PortState::Master(_) => 0x06,
            PortState::Passive => 0x07,
            PortState::Uncalibrated(_) => 0x08,
            PortState::Slave(_) => 0x09,
        }
    }
}

impl core::fmt::Display for PortState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PortState::Initializing => "INITIALIZING",
            PortState::Faulty => "FAULTY",
            PortState::Disabled => "DISABLED",
            PortState::Listening => "LISTENING",
            PortState::PreMaster => "PRE_MASTER",
            PortState::Master(_) => "MASTER",
            PortState::Passive => "PASSIVE",
            PortState::Uncalibrated(_) => "UNCALIBRATED",
            PortState::Slave(_) => "SLAVE",
        };
        write!(f, "{name}")
    }
}

/// State the port carries while it is the domain's master
#[derive(Debug, Default)]
pub struct MasterState {}

/// Progress of the current Sync / FollowUp pairing
#[derive(Debug, Clone, Copy)]
pub(crate) enum SyncState {
    /// Nothing in flight
    Initial,
    /// A two-step Sync arrived; its FollowUp is pending
    AfterSync {
        sync_id: u16,
        sync_recv_time: Time,
        sync_correction: Duration,
    },
    /// Send and receive time of the Sync are fully known
    AfterFollowUp {
        sync_recv_time: Time,
        sync_send_time: Time,
    },
}

/// Progress of the current DelayReq / DelayResp exchange
#[derive(Debug, Clone, Copy)]
pub(crate) enum DelayState {
    /// No request in flight
    Initial,
    /// A DelayReq was handed to the transport; its timestamp is pending
    Measuring {
        delay_id: u16,
        delay_send_time: Option<Time>,
        delay_recv_time: Option<Time>,
    },
}

/// Progress of the current peer delay exchange (P2P)
#[derive(Debug, Clone, Copy)]
pub(crate) enum PeerDelayState {
    /// No request in flight
    Initial,
    /// A PdelayReq was sent; responses and timestamps are trickling in
    Measuring {
        pdelay_id: u16,
        request_send_time: Option<Time>,
        request_recv_time: Option<Time>,
        response_send_time: Option<Time>,
        response_recv_time: Option<Time>,
    },
}

/// A FollowUp that arrived before its Sync, parked until the Sync shows up
/// or the gap limit kills it
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferedFollowUp {
    pub(crate) sequence_id: u16,
    pub(crate) correction: Duration,
    pub(crate) precise_origin: Time,
}

/// Everything a port tracks while UNCALIBRATED or SLAVE
#[derive(Debug)]
pub struct SlaveState {
    /// The master this port listens to
    pub(crate) remote_master: PortIdentity,

    pub(crate) sync_state: SyncState,
    pub(crate) delay_state: DelayState,
    pub(crate) peer_delay_state: PeerDelayState,

    /// A FollowUp that arrived before its Sync
    pub(crate) pending_followup: Option<BufferedFollowUp>,

    /// Highest Sync sequence id seen, for sync sequence checking
    pub(crate) last_sync_sequence_id: Option<u16>,
}

impl SlaveState {
    pub(crate) fn new(remote_master: PortIdentity) -> Self {
        Self {
            remote_master,
            sync_state: SyncState::Initial,
            delay_state: DelayState::Initial,
            peer_delay_state: PeerDelayState::Initial,
            pending_followup: None,
            last_sync_sequence_id: None,
        }
    }

    pub(crate) fn remote_master(&self) -> PortIdentity {
        self.remote_master
    }
}
