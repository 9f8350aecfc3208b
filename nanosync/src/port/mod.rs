//! The protocol engine of a single PTP port: the state machine, the message
//! exchanges, the timers and the glue between BMCA, unicast negotiation and
//! the clock servo.
//!
//! The [`Port`] is sans-IO at its boundary: the caller feeds it received
//! packets with their capture timestamps and executes the [`PortAction`]s it
//! returns (sends, transport refreshes, status updates). Transmit timestamps
//! flow back through [`Port::handle_send_timestamp`]. Everything else,
//! including the clock driver, is owned by the engine.

use arrayvec::ArrayVec;
use rand::Rng;

pub use actions::{PortAction, PortActionIterator, TimestampContext};
use actions::{TimestampContextInner, MAX_ACTIONS};
pub use counters::PortCounters;
pub use measurement::Measurement;
use sequence_id::SequenceIdGenerator;
use state::{
    BufferedFollowUp, DelayState, MasterState, PeerDelayState, SlaveState, SyncState,
    MAX_FOLLOWUP_GAP, SYNC_SEQUENCE_WINDOW,
};
pub use state::PortState;
pub use timers::TimerId;
use timers::TimerSet;

use crate::{
    alarms::{AlarmId, AlarmSet},
    bmc::{
        acceptable_master::AcceptableMasterList,
        bmca::{Bmca, RecommendedState},
        dataset_comparison::LOWEST_LOCAL_PREFERENCE,
    },
    clock::Clock,
    config::{DelayMechanism, InstanceConfig, LeapAction, PortConfig, TransportMode},
    datastructures::{
        common::{ClockIdentity, LeapIndicator, PortIdentity, TransportAddress},
        datasets::{CurrentDS, DefaultDS, ParentDS, TimePropertiesDS},
        messages::{
            AnnounceMessage, DelayRespMessage, Header, Message, MessageBody, MessageType,
            PDelayRespFollowUpMessage, PDelayRespMessage, PtpText, SignalingMessage,
            SignalingTlv, SyncMessage, MAX_DATA_LEN, MAX_SIGNALING_TLVS,
        },
        WireFormatError,
    },
    observability::{ObservableServoState, ObservableState},
    servo::{Servo, ServoConfig, ServoDecision},
    time::{Duration, Interval, Time},
    unicast::{
        GrantEvent, GrantType, UnicastGrantTable, GRANT_MIN_DURATION, GRANT_TIME_LEFT_GRACE,
    },
};

mod actions;
mod counters;
mod management;
mod measurement;
mod sequence_id;
mod state;
#[cfg(test)]
mod tests;
mod timers;

/// Announce intervals a PreMaster port waits before taking over as master
const QUALIFICATION_TIMEOUT: u8 = 2;

/// Sync or delay intervals without traffic before the receipt alarms fire
const MISSED_MESSAGES_MAX: u32 = 20;

/// Operator-facing warnings allowed per throttle window
const OPERATOR_MESSAGE_BUDGET: u8 = 5;

/// Port number marking a configured unicast master whose identity we have
/// not learned yet
const UNKNOWN_MASTER_PORT: u16 = 0xffff;

/// A single PTP port of an ordinary clock.
///
/// Created through [`Port::new`], brought up with [`Port::enable`], then
/// driven by the caller's main loop: packets go into
/// [`handle_event_receive`](`Port::handle_event_receive`) and
/// [`handle_general_receive`](`Port::handle_general_receive`), timer care
/// happens in [`handle_timers`](`Port::handle_timers`), and the sleep length
/// between turns comes from [`next_deadline`](`Port::next_deadline`).
#[derive(Debug)]
pub struct Port<A, C, R> {
    config: PortConfig<()>,
    port_identity: PortIdentity,

    default_ds: DefaultDS,
    current_ds: CurrentDS,
    parent_ds: ParentDS,
    time_properties_ds: TimePropertiesDS,

    port_state: PortState,
    bmca: Bmca<A>,
    unicast: UnicastGrantTable,
    servo: Servo,
    timers: TimerSet,
    counters: PortCounters,
    alarms: AlarmSet,
    clock: C,
    rng: R,

    announce_seq_ids: SequenceIdGenerator,
    sync_seq_ids: SequenceIdGenerator,
    delay_req_seq_ids: SequenceIdGenerator,
    pdelay_req_seq_ids: SequenceIdGenerator,
    signaling_seq_ids: SequenceIdGenerator,

    unicast_negotiation_enabled: bool,
    user_description: PtpText,
    last_packet_source: Option<TransportAddress>,

    premaster_intervals_left: u8,
    pending_step: Option<Duration>,
    panic_active: bool,
    steering_suspended_until: Option<Time>,
    leap_pause_active: bool,
    leap_smear_ppb: f64,
    operator_message_budget: u8,
}

impl<A: AcceptableMasterList, C: Clock, R: Rng> Port<A, C, R> {
    /// Create a port in the INITIALIZING state
    pub fn new(
        instance_config: InstanceConfig,
        config: PortConfig<A>,
        servo_config: ServoConfig,
        time_properties_ds: TimePropertiesDS,
        clock: C,
        rng: R,
    ) -> Self {
        let default_ds = DefaultDS::new(instance_config);
        let port_identity = PortIdentity {
            clock_identity: default_ds.clock_identity,
            port_number: 1,
        };

        let bmca = Bmca::new(
            config.acceptable_master_list,
            config.announce_interval,
            port_identity,
        );

        let mut user_description = PtpText::new();
        let _ = user_description.try_extend_from_slice(b"nanosync");

        let unicast_negotiation_enabled = config.unicast_negotiation;

        Port {
            config: PortConfig {
                acceptable_master_list: (),
                delay_mechanism: config.delay_mechanism,
                announce_interval: config.announce_interval,
                announce_receipt_timeout: config.announce_receipt_timeout,
                sync_interval: config.sync_interval,
                master_only: config.master_only,
                delay_asymmetry: config.delay_asymmetry,
                ingress_latency: config.ingress_latency,
                egress_latency: config.egress_latency,
                offset_correction: config.offset_correction,
                transport_mode: config.transport_mode,
                unicast_negotiation: config.unicast_negotiation,
                unicast_accept_any: config.unicast_accept_any,
                unicast_masters: config.unicast_masters,
                unicast_grant_duration: config.unicast_grant_duration,
                unicast_log_max_interval: config.unicast_log_max_interval,
                unicast_log_min_interval: config.unicast_log_min_interval,
                sync_sequence_checking: config.sync_sequence_checking,
                clock_update_timeout: config.clock_update_timeout,
                calibration_delay: config.calibration_delay,
                leap_action: config.leap_action,
                leap_pause_period: config.leap_pause_period,
                panic_mode_duration: config.panic_mode_duration,
                transport_fault_timeout: config.transport_fault_timeout,
                clock_fault_timeout: config.clock_fault_timeout,
            },
            port_identity,
            current_ds: CurrentDS::default(),
            parent_ds: ParentDS::new(default_ds),
            default_ds,
            time_properties_ds,
            port_state: PortState::Initializing,
            bmca,
            unicast: UnicastGrantTable::new(),
            servo: Servo::new(servo_config),
            timers: TimerSet::new(),
            counters: PortCounters::default(),
            alarms: AlarmSet::new(5),
            clock,
            rng,
            announce_seq_ids: SequenceIdGenerator::new(),
            sync_seq_ids: SequenceIdGenerator::new(),
            delay_req_seq_ids: SequenceIdGenerator::new(),
            pdelay_req_seq_ids: SequenceIdGenerator::new(),
            signaling_seq_ids: SequenceIdGenerator::new(),
            unicast_negotiation_enabled,
            user_description,
            last_packet_source: None,
            premaster_intervals_left: 0,
            pending_step: None,
            panic_active: false,
            steering_suspended_until: None,
            leap_pause_active: false,
            leap_smear_ppb: 0.0,
            operator_message_budget: OPERATOR_MESSAGE_BUDGET,
        }
    }

    /// Bring the port up: INITIALIZING becomes LISTENING and the
    /// housekeeping timers start.
    pub fn enable(&mut self) -> PortActionIterator {
        let now = self.clock.now();
        let mut actions = ArrayVec::new();

        self.reinitialize(now);

        // A unicast slave introduces itself to its configured masters
        if self.wants_unicast_grants() {
            self.seed_unicast_masters();
            self.send_grant_requests_to_all(&mut actions);
        }

        PortActionIterator::from(actions)
    }

    /// Take the port down administratively
    pub fn disable(&mut self) {
        let now = self.clock.now();
        self.timers.stop_all();
        self.set_state(PortState::Disabled, now);
    }

    /// The duration until the next timer wants attention; the caller may
    /// sleep this long when the transport stays quiet.
    pub fn next_deadline(&self) -> Option<core::time::Duration> {
        let now = self.clock.now();
        self.timers
            .next_due()
            .map(|due| core::time::Duration::from(due - now))
    }

    /// Whether the port currently serves time
    pub fn is_master(&self) -> bool {
        matches!(self.port_state, PortState::Master(_))
    }

    /// Whether the port currently steers its clock after a master
    pub fn is_steering(&self) -> bool {
        matches!(
            self.port_state,
            PortState::Slave(_) | PortState::Uncalibrated(_)
        )
    }

    /// The current protocol state
    pub fn state(&self) -> &PortState {
        &self.port_state
    }

    /// The message and error counters
    pub fn counters(&self) -> &PortCounters {
        &self.counters
    }

    /// The current servo frequency estimate in parts per billion
    pub fn frequency_ppb(&self) -> f64 {
        self.servo.frequency_ppb()
    }

    /// Preload the servo's frequency estimate, e.g. from the frequency file
    pub fn preload_frequency(&mut self, ppb: f64) {
        self.servo.preload_frequency(ppb);
    }

    /// A snapshot of the data sets, counters and servo state for observers
    pub fn observe(&self) -> ObservableState {
        ObservableState {
            default_ds: self.default_ds,
            current_ds: self.current_ds,
            parent_ds: self.parent_ds,
            time_properties_ds: self.time_properties_ds,
            port_state: self.port_state.to_primitive(),
            counters: self.counters,
            servo: ObservableServoState {
                clock_state: self.servo.clock_state(),
                frequency_ppb: self.servo.frequency_ppb(),
                allan_deviation: self.servo.last_adev(),
                offset_from_master_ns: self.current_ds.offset_from_master.nanos_lossy(),
                mean_path_delay_ns: self.current_ds.mean_path_delay.nanos_lossy(),
            },
        }
    }

    /// The transport failed to send; the port goes FAULTY and schedules a
    /// reinitialization.
    pub fn handle_send_error(&mut self) -> PortActionIterator {
        let now = self.clock.now();
        self.counters.send_errors += 1;

        if !matches!(self.port_state, PortState::Faulty) {
            log::error!("transport send failed, port goes faulty");
            self.alarms.trigger(AlarmId::NetworkFault, now);
            self.timers.stop_all();
            self.set_state(PortState::Faulty, now);
            // The announce receipt timer doubles as the recovery timer while
            // the port is faulty
            self.timers.start(
                TimerId::AnnounceReceipt,
                self.config.transport_fault_timeout as f64,
                now,
            );
            self.timers.start(TimerId::AlarmUpdate, 1.0, now);
        }

        PortActionIterator::empty()
    }

    /// Process a packet that arrived on the event (timestamped) channel
    pub fn handle_event_receive(
        &mut self,
        data: &[u8],
        timestamp: Time,
        source: Option<TransportAddress>,
    ) -> PortActionIterator {
        let mut actions = ArrayVec::new();

        let Some(message) = self.parse(data) else {
            return PortActionIterator::empty();
        };
        self.last_packet_source = source;

        let header = message.header;
        match message.body {
            MessageBody::Sync(body) => self.handle_sync(header, body, timestamp, &mut actions),
            MessageBody::DelayReq(_) => self.handle_delay_req(header, timestamp, &mut actions),
            MessageBody::PDelayReq(_) => self.handle_pdelay_req(header, timestamp, &mut actions),
            MessageBody::PDelayResp(body) => self.handle_pdelay_resp(header, body, timestamp),
            body => self.handle_general_body(header, body, &mut actions),
        }

        PortActionIterator::from(actions)
    }

    /// Process a packet that arrived on the general channel
    pub fn handle_general_receive(
        &mut self,
        data: &[u8],
        source: Option<TransportAddress>,
    ) -> PortActionIterator {
        let mut actions = ArrayVec::new();

        let Some(message) = self.parse(data) else {
            return PortActionIterator::empty();
        };
        self.last_packet_source = source;

        let header = message.header;
        let body = message.body;
        self.handle_general_body(header, body, &mut actions);

        PortActionIterator::from(actions)
    }

    /// A transmit timestamp became available for an earlier
    /// [`PortAction::SendEvent`]
    pub fn handle_send_timestamp(
        &mut self,
        context: TimestampContext,
        timestamp: Time,
    ) -> PortActionIterator {
        let mut actions = ArrayVec::new();

        match context.inner {
            TimestampContextInner::Sync { id, address } => {
                if self.default_ds.two_step {
                    let timestamp = timestamp + self.config.egress_latency;
                    let mut follow_up =
                        Message::follow_up(&self.default_ds, self.port_identity, id, timestamp);
                    follow_up.header.unicast_flag = address.is_some();
                    if self.push_general(follow_up, address, &mut actions) {
                        self.counters.follow_up_sent += 1;
                    }
                }
            }
            TimestampContextInner::DelayReq { id } => {
                if let PortState::Slave(slave) | PortState::Uncalibrated(slave) =
                    &mut self.port_state
                {
                    if let DelayState::Measuring {
                        delay_id,
                        delay_send_time,
                        ..
                    } = &mut slave.delay_state
                    {
                        if *delay_id == id {
                            *delay_send_time = Some(timestamp);
                        }
                    }
                }
                self.complete_measurement(&mut actions);
            }
            TimestampContextInner::PDelayReq { id } => {
                if let PortState::Slave(slave) | PortState::Uncalibrated(slave) =
                    &mut self.port_state
                {
                    if let PeerDelayState::Measuring {
                        pdelay_id,
                        request_send_time,
                        ..
                    } = &mut slave.peer_delay_state
                    {
                        if *pdelay_id == id {
                            *request_send_time = Some(timestamp);
                        }
                    }
                }
                self.complete_peer_delay();
            }
            TimestampContextInner::PDelayResp {
                id,
                requestor_identity,
                address,
            } => {
                let timestamp = timestamp + self.config.egress_latency;
                let header = Header {
                    source_port_identity: requestor_identity,
                    sequence_id: id,
                    domain_number: self.default_ds.domain_number,
                    ..Default::default()
                };
                let follow_up =
                    Message::pdelay_resp_follow_up(header, self.port_identity, timestamp);
                self.push_general(follow_up, address, &mut actions);
            }
        }

        PortActionIterator::from(actions)
    }

    /// Run the timer set and the BMCA; called once per main loop turn
    pub fn handle_timers(&mut self) -> PortActionIterator {
        let now = self.clock.now();
        let mut actions = ArrayVec::new();

        // The BMCA runs at most once per turn, and always before state
        // transition decisions
        if !matches!(
            self.port_state,
            PortState::Initializing | PortState::Disabled | PortState::Faulty
        ) {
            self.run_bmca(now);
        }

        self.check_announce_receipt(now, &mut actions);
        self.check_announce_interval(now, &mut actions);
        self.check_sync_interval(now, &mut actions);
        self.check_delay_req(now, &mut actions);
        self.check_pdelay_req(now, &mut actions);
        self.check_receipt_starvation(now);
        self.check_housekeeping(now, &mut actions);

        PortActionIterator::from(actions)
    }

    // ------------------------------------------------------------------
    // parsing and dispatch

    fn parse<'a>(&mut self, data: &'a [u8]) -> Option<Message<'a>> {
        let message = match Message::deserialize(data) {
            Ok(message) => message,
            Err(error) => {
                match error {
                    WireFormatError::UnsupportedVersion => {
                        self.counters.version_mismatch_errors += 1
                    }
                    WireFormatError::Invalid => self.counters.protocol_errors += 1,
                    _ => self.counters.format_errors += 1,
                }
                log::debug!("could not parse packet: {error:?}");
                return None;
            }
        };

        if message.header.domain_number != self.default_ds.domain_number {
            self.counters.domain_mismatch_errors += 1;
            self.alarms.set_condition(AlarmId::DomainMismatch, true);
            return None;
        }

        // Never process our own transmissions
        if message.header.source_port_identity.clock_identity == self.default_ds.clock_identity {
            return None;
        }

        Some(message)
    }

    fn handle_general_body(
        &mut self,
        header: Header,
        body: MessageBody,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        let now = self.clock.now();
        match body {
            MessageBody::Announce(announce) => self.handle_announce(header, announce, now),
            MessageBody::FollowUp(follow_up) => {
                let buffered = BufferedFollowUp {
                    sequence_id: header.sequence_id,
                    correction: Duration::from(header.correction_field),
                    precise_origin: Time::from(follow_up.precise_origin_timestamp),
                };
                self.handle_follow_up(header, buffered, actions)
            }
            MessageBody::DelayResp(delay_resp) => {
                self.handle_delay_resp(header, delay_resp, actions)
            }
            MessageBody::PDelayRespFollowUp(follow_up) => {
                self.handle_pdelay_resp_follow_up(header, follow_up)
            }
            MessageBody::Signaling(signaling) => self.handle_signaling(header, signaling, actions),
            MessageBody::Management(management) => {
                self.handle_management(header, management, now, actions)
            }
            MessageBody::Sync(_)
            | MessageBody::DelayReq(_)
            | MessageBody::PDelayReq(_)
            | MessageBody::PDelayResp(_) => {
                // Event messages without a capture timestamp are useless
                self.counters.discarded_messages += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // announce path

    fn handle_announce(&mut self, header: Header, announce: AnnounceMessage, now: Time) {
        self.counters.announce_received += 1;
        self.unicast
            .record_received(&header.source_port_identity, GrantType::Announce);

        let local_preference = match self.unicast.find(&header.source_port_identity) {
            Some(slot) => {
                let node = self.unicast.node(slot);
                if node.is_master {
                    node.local_preference
                } else {
                    LOWEST_LOCAL_PREFERENCE
                }
            }
            None => {
                // In negotiated unicast operation, announces from masters we
                // did not configure are only considered with accept-any; the
                // transport ACL has already run at this point
                if matches!(self.config.transport_mode, TransportMode::Unicast)
                    && self.unicast_negotiation_enabled
                    && !self.config.unicast_accept_any
                {
                    self.counters.discarded_messages += 1;
                    return;
                }
                LOWEST_LOCAL_PREFERENCE
            }
        };

        self.bmca
            .register_announce_message(&announce, local_preference, now);

        // Announces from the elected parent feed the data sets and re-arm
        // the receipt timeout
        let from_parent = matches!(
            &self.port_state,
            PortState::Slave(slave) | PortState::Uncalibrated(slave)
                if slave.remote_master() == header.source_port_identity
        );
        if from_parent {
            let duration = self.announce_receipt_secs();
            self.timers.start(TimerId::AnnounceReceipt, duration, now);
            self.apply_s1_updates(&announce, now);
        }
    }

    /// The S1 update of *IEEE1588-2008 table 16*: absorb the parent's
    /// announce content into the data sets.
    fn apply_s1_updates(&mut self, announce: &AnnounceMessage, now: Time) {
        self.current_ds.steps_removed = announce.steps_removed + 1;

        self.parent_ds.parent_port_identity = announce.header.source_port_identity;
        self.parent_ds.grandmaster_identity = announce.grandmaster_identity;
        self.parent_ds.grandmaster_clock_quality = announce.grandmaster_clock_quality;
        self.parent_ds.grandmaster_priority_1 = announce.grandmaster_priority_1;
        self.parent_ds.grandmaster_priority_2 = announce.grandmaster_priority_2;

        let leap_indicator = match (announce.header.leap59, announce.header.leap61) {
            (true, false) => LeapIndicator::Leap59,
            (false, true) => LeapIndicator::Leap61,
            _ => LeapIndicator::NoLeap,
        };

        self.time_properties_ds = TimePropertiesDS {
            current_utc_offset: announce
                .header
                .current_utc_offset_valid
                .then_some(announce.current_utc_offset),
            leap_indicator,
            time_traceable: announce.header.time_traceable,
            frequency_traceable: announce.header.frequency_traceable,
            ptp_timescale: announce.header.ptp_timescale,
            time_source: announce.time_source,
        };

        if let Err(error) = self.clock.set_properties(&self.time_properties_ds) {
            log::warn!("could not update clock properties: {error:?}");
        }

        self.arm_leap_second(now);
    }

    /// Arm the leap second pause (or smear) when the parent announced a leap
    /// and UTC midnight is close.
    fn arm_leap_second(&mut self, now: Time) {
        if !self.time_properties_ds.ptp_timescale
            || self.time_properties_ds.leap_indicator == LeapIndicator::NoLeap
            || self.leap_pause_active
            || self.timers.running(TimerId::LeapSecondPause)
        {
            return;
        }

        let utc_offset = self.time_properties_ds.current_utc_offset.unwrap_or(0) as i64;
        let to_midnight = now.seconds_to_midnight(utc_offset);

        match self.config.leap_action {
            LeapAction::Step => {
                let pause = self.config.leap_pause_period as f64;
                if to_midnight <= pause {
                    log::warn!("leap second event in {to_midnight:.0} s, pausing clock updates");
                    self.leap_pause_active = true;
                    self.timers
                        .start(TimerId::LeapSecondPause, to_midnight + pause, now);
                }
            }
            LeapAction::Smear { period } => {
                if period > 0 && to_midnight <= period as f64 {
                    let sign = self.time_properties_ds.leap_indicator.offset_change() as f64;
                    self.leap_smear_ppb = sign * 1e9 / period as f64;
                    log::warn!(
                        "leap second event in {to_midnight:.0} s, smearing at {:.0} ppb",
                        self.leap_smear_ppb
                    );
                    self.timers.start(TimerId::LeapSecondPause, to_midnight, now);
                }
            }
        }
    }

    fn finish_leap_second(&mut self) {
        let change = self.time_properties_ds.leap_indicator.offset_change();
        if let Some(offset) = self.time_properties_ds.current_utc_offset {
            self.time_properties_ds.current_utc_offset = Some(offset + change);
        }
        self.time_properties_ds.leap_indicator = LeapIndicator::NoLeap;

        if let Err(error) = self.clock.set_properties(&self.time_properties_ds) {
            log::warn!("could not update clock properties: {error:?}");
        }

        self.leap_pause_active = false;
        self.leap_smear_ppb = 0.0;
        self.timers.stop(TimerId::LeapSecondPause);
        log::info!("leap second event complete, clock updates resume");
    }

    // ------------------------------------------------------------------
    // slave path

    fn handle_sync(
        &mut self,
        header: Header,
        body: SyncMessage,
        timestamp: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.sync_received += 1;
        self.unicast
            .record_received(&header.source_port_identity, GrantType::Sync);

        let now = self.clock.now();
        let sync_sequence_checking = self.config.sync_sequence_checking;

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            self.counters.discarded_messages += 1;
            return;
        };
        if header.source_port_identity != slave.remote_master {
            self.counters.discarded_messages += 1;
            return;
        }

        // Reject Syncs running backwards within the window; anything further
        // out counts as a restart of the master
        if sync_sequence_checking {
            if let Some(last) = slave.last_sync_sequence_id {
                let behind = last.wrapping_sub(header.sequence_id);
                if behind > 0 && behind < SYNC_SEQUENCE_WINDOW {
                    self.counters.sequence_mismatch_errors += 1;
                    self.counters.discarded_messages += 1;
                    return;
                }
            }
        }
        slave.last_sync_sequence_id = Some(header.sequence_id);

        if header.two_step_flag {
            slave.sync_state = SyncState::AfterSync {
                sync_id: header.sequence_id,
                sync_recv_time: timestamp,
                sync_correction: Duration::from(header.correction_field),
            };

            match slave.pending_followup {
                // An early FollowUp was already waiting for this Sync
                Some(buffered) if buffered.sequence_id == header.sequence_id => {
                    slave.pending_followup = None;
                    absorb_follow_up(slave, buffered);
                }
                // A buffered FollowUp that fell too far behind dies here
                Some(buffered)
                    if header.sequence_id.wrapping_sub(buffered.sequence_id)
                        > MAX_FOLLOWUP_GAP =>
                {
                    slave.pending_followup = None;
                    self.counters.follow_up_mismatch_errors += 1;
                }
                _ => {}
            }
        } else {
            slave.sync_state = SyncState::AfterFollowUp {
                sync_recv_time: timestamp,
                sync_send_time: Time::from(body.origin_timestamp)
                    + Duration::from(header.correction_field),
            };
        }

        // Watch for sync starvation based on the master's announced pacing
        let interval = Interval::from_log_2(header.log_message_interval.clamp(-10, 10));
        self.timers.start(
            TimerId::SyncReceipt,
            MISSED_MESSAGES_MAX as f64 * interval.seconds(),
            now,
        );

        self.complete_measurement(actions);
    }

    fn handle_follow_up(
        &mut self,
        header: Header,
        buffered: BufferedFollowUp,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.follow_up_received += 1;

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };
        if header.source_port_identity != slave.remote_master {
            return;
        }

        match slave.sync_state {
            SyncState::AfterSync { sync_id, .. } if sync_id == header.sequence_id => {
                absorb_follow_up(slave, buffered);
                self.complete_measurement(actions);
            }
            SyncState::AfterSync { sync_id, .. } => {
                let ahead = header.sequence_id.wrapping_sub(sync_id);
                if ahead <= MAX_FOLLOWUP_GAP {
                    // Early: its Sync may still be in flight
                    slave.pending_followup = Some(buffered);
                } else {
                    self.counters.follow_up_mismatch_errors += 1;
                    self.counters.discarded_messages += 1;
                }
            }
            SyncState::Initial | SyncState::AfterFollowUp { .. } => {
                // Possibly ahead of its Sync; park it
                slave.pending_followup = Some(buffered);
            }
        }
    }

    fn handle_delay_resp(
        &mut self,
        header: Header,
        body: DelayRespMessage,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.delay_resp_received += 1;
        self.unicast
            .record_received(&header.source_port_identity, GrantType::DelayResp);

        let now = self.clock.now();
        let port_identity = self.port_identity;

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };
        if header.source_port_identity != slave.remote_master {
            self.counters.discarded_messages += 1;
            return;
        }

        // Matching is strict on both the sequence id and the requesting
        // port identity
        if body.requesting_port_identity != port_identity {
            return;
        }

        let DelayState::Measuring {
            delay_id,
            delay_recv_time,
            ..
        } = &mut slave.delay_state
        else {
            self.counters.sequence_mismatch_errors += 1;
            return;
        };

        if *delay_id != header.sequence_id {
            self.counters.sequence_mismatch_errors += 1;
            return;
        }

        *delay_recv_time =
            Some(Time::from(body.receive_timestamp) - Duration::from(header.correction_field));

        let interval = Interval::from_log_2(header.log_message_interval.clamp(-10, 10));
        self.timers.start(
            TimerId::DelayReceipt,
            MISSED_MESSAGES_MAX as f64 * interval.seconds(),
            now,
        );

        self.complete_measurement(actions);
    }

    /// When a Sync pair and a delay exchange are both complete, produce a
    /// measurement and feed the servo.
    fn complete_measurement(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let delay_asymmetry = self.config.delay_asymmetry;

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };

        let SyncState::AfterFollowUp {
            sync_recv_time,
            sync_send_time,
        } = slave.sync_state
        else {
            return;
        };

        // A fresh round trip updates the delay estimate first
        if let DelayState::Measuring {
            delay_send_time: Some(delay_send_time),
            delay_recv_time: Some(delay_recv_time),
            ..
        } = slave.delay_state
        {
            let raw_delay = ((sync_recv_time - sync_send_time)
                + (delay_recv_time - delay_send_time))
                .halved()
                - delay_asymmetry;
            slave.delay_state = DelayState::Initial;
            let _ = self.servo.absorb_delay(raw_delay);
        }

        let Some(mean_delay) = self.servo.mean_delay() else {
            return;
        };

        // offsetFromMaster = (t2 - t1) - meanPathDelay
        //                    - ingressLatency + egressLatency + shift
        let offset = (sync_recv_time - sync_send_time) - mean_delay
            - self.config.ingress_latency
            + self.config.egress_latency
            + self.config.offset_correction;

        slave.sync_state = SyncState::Initial;

        let measurement = Measurement {
            event_time: sync_recv_time,
            master_offset: offset,
            mean_delay,
        };

        self.apply_measurement(measurement, actions);
    }

    fn apply_measurement(
        &mut self,
        measurement: Measurement,
        _actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        let now = self.clock.now();

        self.current_ds.offset_from_master = measurement.master_offset;
        self.current_ds.mean_path_delay = measurement.mean_delay;

        log::debug!(
            "offset from master: {}, mean path delay: {}",
            measurement.master_offset,
            measurement.mean_delay
        );

        if self.clock_updates_suspended(now) {
            self.counters.clock_updates_suppressed += 1;
            if self.operator_message_budget > 0 {
                self.operator_message_budget -= 1;
                log::info!("clock update held back (calibration, pause or fault hold-off)");
            }
            return;
        }

        match self.servo.absorb_offset(measurement.master_offset, now) {
            ServoDecision::Slew(ppb) => {
                let adjustment = ppb + self.leap_smear_ppb;
                self.alarms.set_condition(
                    AlarmId::FastAdjustment,
                    adjustment.abs() > 0.9 * self.clock.max_frequency_ppb(),
                );
                match self.clock.set_frequency(adjustment) {
                    Ok(_) => self.clock_update_applied(now),
                    Err(error) => self.clock_fault(error, now),
                }
            }
            ServoDecision::Step(offset) => {
                if self.config.panic_mode_duration > 0 {
                    self.enter_panic_mode(offset, now);
                } else {
                    self.apply_step(offset, now);
                }
            }
            ServoDecision::Hold => {
                self.counters.clock_updates_suppressed += 1;
            }
        }
    }

    fn clock_updates_suspended(&mut self, now: Time) -> bool {
        if self.clock.read_only() {
            return true;
        }

        if self.panic_active || self.leap_pause_active {
            return true;
        }

        if self.timers.running(TimerId::CalibrationDelay) {
            return true;
        }

        if let Some(until) = self.steering_suspended_until {
            if now < until {
                return true;
            }
            self.steering_suspended_until = None;
        }

        false
    }

    fn clock_update_applied(&mut self, now: Time) {
        self.counters.clock_updates_applied += 1;
        self.timers.start(
            TimerId::ClockUpdate,
            self.config.clock_update_timeout as f64,
            now,
        );

        // The first applied update calibrates the port
        if matches!(self.port_state, PortState::Uncalibrated(_)) {
            let old = core::mem::replace(&mut self.port_state, PortState::Listening);
            if let PortState::Uncalibrated(slave) = old {
                log::info!(
                    "port {}: UNCALIBRATED -> SLAVE of {}",
                    self.port_identity,
                    slave.remote_master()
                );
                self.port_state = PortState::Slave(slave);
                self.counters.state_transitions += 1;
            }
        }
    }

    fn enter_panic_mode(&mut self, offset: Duration, now: Time) {
        self.pending_step = Some(offset);

        if !self.panic_active {
            self.panic_active = true;
            self.counters.panic_mode_entries += 1;
            self.alarms.trigger(AlarmId::OffsetThreshold, now);
            log::error!(
                "offset beyond panic threshold, suspending clock updates for {} s",
                self.config.panic_mode_duration
            );
            self.timers.start(
                TimerId::PanicMode,
                self.config.panic_mode_duration as f64,
                now,
            );
        }
    }

    fn apply_step(&mut self, offset: Duration, now: Time) {
        match self.clock.step_clock(offset) {
            Ok(_) => {
                self.counters.clock_steps += 1;
                self.alarms.trigger(AlarmId::ClockStep, now);
                log::warn!("stepped clock by {offset}");
                self.servo.reset();
                self.clock_update_applied(now);
            }
            Err(error) => self.clock_fault(error, now),
        }
    }

    fn clock_fault(&mut self, error: C::Error, now: Time) {
        log::error!("clock driver failure: {error:?}");
        self.steering_suspended_until =
            Some(now + Duration::from_secs(self.config.clock_fault_timeout as i64));
        self.counters.clock_updates_suppressed += 1;
    }

    // ------------------------------------------------------------------
    // master path

    fn handle_delay_req(
        &mut self,
        header: Header,
        timestamp: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.delay_req_received += 1;

        if !matches!(self.port_state, PortState::Master(_)) {
            self.counters.discarded_messages += 1;
            return;
        }

        let response = Message::delay_resp(
            header,
            self.port_identity,
            self.config.min_delay_req_interval(),
            timestamp,
        );
        let address = self.reply_address(&header);
        if self.push_general(response, address, actions) {
            self.counters.delay_resp_sent += 1;
        }
    }

    fn handle_pdelay_req(
        &mut self,
        header: Header,
        timestamp: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.pdelay_req_received += 1;

        if !matches!(self.config.delay_mechanism, DelayMechanism::P2P { .. }) {
            self.counters.discarded_messages += 1;
            return;
        }

        let address = self.reply_address(&header);
        let response = Message::pdelay_resp(header, self.port_identity, timestamp);
        let context = TimestampContext {
            inner: TimestampContextInner::PDelayResp {
                id: header.sequence_id,
                requestor_identity: header.source_port_identity,
                address,
            },
        };
        if self.push_event(response, address, context, actions) {
            self.counters.pdelay_resp_sent += 1;
        }
    }

    fn handle_pdelay_resp(&mut self, header: Header, body: PDelayRespMessage, timestamp: Time) {
        self.counters.pdelay_resp_received += 1;
        self.unicast
            .record_received(&header.source_port_identity, GrantType::PdelayResp);

        if body.requesting_port_identity != self.port_identity {
            return;
        }

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };

        let PeerDelayState::Measuring {
            pdelay_id,
            request_recv_time,
            response_recv_time,
            response_send_time,
            ..
        } = &mut slave.peer_delay_state
        else {
            self.counters.sequence_mismatch_errors += 1;
            return;
        };

        if *pdelay_id != header.sequence_id {
            self.counters.sequence_mismatch_errors += 1;
            return;
        }

        *request_recv_time = Some(
            Time::from(body.request_receive_timestamp) + Duration::from(header.correction_field),
        );
        *response_recv_time = Some(timestamp);

        if !header.two_step_flag {
            // One step: the turnaround is fully in the correction field
            *response_send_time = *request_recv_time;
        }

        self.complete_peer_delay();
    }

    fn handle_pdelay_resp_follow_up(&mut self, header: Header, body: PDelayRespFollowUpMessage) {
        self.counters.pdelay_resp_follow_up_received += 1;

        if body.requesting_port_identity != self.port_identity {
            return;
        }

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };

        let PeerDelayState::Measuring {
            pdelay_id,
            response_send_time,
            ..
        } = &mut slave.peer_delay_state
        else {
            self.counters.sequence_mismatch_errors += 1;
            return;
        };

        if *pdelay_id != header.sequence_id {
            self.counters.sequence_mismatch_errors += 1;
            return;
        }

        *response_send_time = Some(
            Time::from(body.response_origin_timestamp) + Duration::from(header.correction_field),
        );

        self.complete_peer_delay();
    }

    /// `meanPathDelay = ((t4 - t1) - (t3 - t2)) / 2` once all four peer
    /// delay timestamps are known.
    fn complete_peer_delay(&mut self) {
        let delay_asymmetry = self.config.delay_asymmetry;

        let (PortState::Slave(slave) | PortState::Uncalibrated(slave)) = &mut self.port_state
        else {
            return;
        };

        if let PeerDelayState::Measuring {
            request_send_time: Some(t1),
            request_recv_time: Some(t2),
            response_send_time: Some(t3),
            response_recv_time: Some(t4),
            ..
        } = slave.peer_delay_state
        {
            let raw_delay = ((t4 - t1) - (t3 - t2)).halved() - delay_asymmetry;
            slave.peer_delay_state = PeerDelayState::Initial;

            if let Some(delay) = self.servo.absorb_delay(raw_delay) {
                self.current_ds.mean_path_delay = delay;
            }
        }
    }

    // ------------------------------------------------------------------
    // timer driven work

    fn check_announce_receipt(
        &mut self,
        now: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        if !self.timers.expired(TimerId::AnnounceReceipt, now) {
            return;
        }

        if matches!(self.port_state, PortState::Faulty) {
            log::info!("fault timeout over, reinitializing port");
            self.reinitialize(now);
            push_action(actions, PortAction::RefreshTransport);
        } else if matches!(self.port_state, PortState::Listening) {
            // Nobody is announcing. Master-capable clocks take over;
            // everyone else keeps listening for a master to appear.
            if self.default_ds.clock_quality.is_master_only() || self.config.master_only {
                self.start_premaster(now);
            } else {
                let duration = self.announce_receipt_secs();
                self.timers.start(TimerId::AnnounceReceipt, duration, now);
            }
        } else if matches!(
            self.port_state,
            PortState::Slave(_) | PortState::Uncalibrated(_) | PortState::Passive
        ) {
            log::warn!("announce receipt timeout, the elected master went quiet");
            self.alarms.trigger(AlarmId::MasterChange, now);
            self.set_state(PortState::Listening, now);
        }
    }

    fn check_announce_interval(
        &mut self,
        now: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        if !self.timers.expired(TimerId::AnnounceInterval, now) {
            return;
        }

        if matches!(self.port_state, PortState::PreMaster) {
            self.premaster_intervals_left = self.premaster_intervals_left.saturating_sub(1);
            if self.premaster_intervals_left == 0 {
                self.set_state(PortState::Master(MasterState::default()), now);
                self.send_announce(actions);
                self.send_sync(actions);
            }
        } else if matches!(self.port_state, PortState::Master(_)) {
            self.send_announce(actions);
        }
    }

    fn check_sync_interval(&mut self, now: Time, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        if !self.timers.expired(TimerId::Sync, now) {
            return;
        }

        if matches!(self.port_state, PortState::Master(_)) {
            self.send_sync(actions);
        }
    }

    fn check_delay_req(&mut self, now: Time, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        if !self.timers.expired(TimerId::DelayReq, now) {
            return;
        }

        if matches!(
            self.port_state,
            PortState::Slave(_) | PortState::Uncalibrated(_)
        ) && matches!(self.config.delay_mechanism, DelayMechanism::E2E { .. })
        {
            self.send_delay_request(actions);
            // Randomize the next request within twice the minimum interval
            let interval = self.config.min_delay_req_interval().seconds();
            let randomized = interval * (2.0 * self.rng.gen::<f64>()).max(0.1);
            self.timers.start(TimerId::DelayReq, randomized, now);
        }
    }

    fn check_pdelay_req(&mut self, now: Time, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        if !self.timers.expired(TimerId::PdelayReq, now) {
            return;
        }

        if matches!(self.config.delay_mechanism, DelayMechanism::P2P { .. }) {
            self.send_pdelay_request(actions);
        }
    }

    fn check_receipt_starvation(&mut self, now: Time) {
        if self.timers.expired(TimerId::SyncReceipt, now) {
            self.alarms.trigger(AlarmId::NoSync, now);
            log::warn!("no sync messages received from the elected master");
        }

        if self.timers.expired(TimerId::DelayReceipt, now) {
            self.alarms.trigger(AlarmId::NoDelay, now);
            log::warn!("no delay responses received from the elected master");
        }
    }

    fn check_housekeeping(&mut self, now: Time, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        if self.timers.expired(TimerId::UnicastGrant, now) {
            self.refresh_unicast_grants(actions);
        }

        if self.timers.expired(TimerId::CalibrationDelay, now) {
            self.timers.stop(TimerId::CalibrationDelay);
            self.servo.mark_calibrated();
            log::info!("calibration delay elapsed, clock updates enabled");
        }

        if self.timers.expired(TimerId::ClockUpdate, now)
            && matches!(
                self.port_state,
                PortState::Slave(_) | PortState::Uncalibrated(_)
            )
        {
            log::warn!("no clock updates within the timeout, re-electing");
            self.servo.reset();
            self.set_state(PortState::Listening, now);
        }

        if self.timers.expired(TimerId::LeapSecondPause, now) {
            self.finish_leap_second();
        }

        if self.timers.expired(TimerId::PanicMode, now) {
            self.timers.stop(TimerId::PanicMode);
            self.panic_active = false;
            if let Some(offset) = self.pending_step.take() {
                log::warn!("panic mode window over");
                self.apply_step(offset, now);
            }
        }

        if self.timers.expired(TimerId::StatisticsUpdate, now) {
            self.servo.tick(now);
        }

        if self.timers.expired(TimerId::AlarmUpdate, now) {
            self.alarms.set_condition(
                AlarmId::PortStateFault,
                matches!(self.port_state, PortState::Faulty),
            );
            self.alarms.tick(now);
            // Domain mismatches are edge conditions; clear until seen again
            self.alarms.set_condition(AlarmId::DomainMismatch, false);
        }

        if self.timers.expired(TimerId::StatusFileUpdate, now) {
            push_action(actions, PortAction::UpdateStatus);
        }

        if self.timers.expired(TimerId::PeriodicInfo, now) {
            log::info!(
                "state {}, offset {}, delay {}, frequency {:.3} ppb, clock {}",
                self.port_state,
                self.current_ds.offset_from_master,
                self.current_ds.mean_path_delay,
                self.servo.frequency_ppb(),
                self.servo.clock_state(),
            );
        }

        if self.timers.expired(TimerId::OperatorMessages, now) {
            self.operator_message_budget = OPERATOR_MESSAGE_BUDGET;
        }

        if self.timers.expired(TimerId::MasterNetRefresh, now)
            && matches!(self.port_state, PortState::Master(_))
            && !matches!(self.config.transport_mode, TransportMode::Unicast)
        {
            push_action(actions, PortAction::RefreshTransport);
        }

        if self.timers.expired(TimerId::TimingDomainUpdate, now) {
            log::trace!("timing domain {} refresh", self.default_ds.domain_number);
        }
    }

    fn send_announce(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let message = Message::announce(
            &self.default_ds,
            &self.parent_ds,
            &self.current_ds,
            &self.time_properties_ds,
            self.port_identity,
            self.announce_seq_ids.generate(),
            self.config.announce_interval,
        );

        match self.config.transport_mode {
            TransportMode::Unicast => {
                let targets = self.granted_targets(GrantType::Announce);
                for (address, sequence_id) in targets {
                    let mut unicast_message = message.clone();
                    unicast_message.header.unicast_flag = true;
                    unicast_message.header.sequence_id = sequence_id;
                    if let MessageBody::Announce(announce) = &mut unicast_message.body {
                        announce.header = unicast_message.header;
                    }
                    if self.push_general(unicast_message, Some(address), actions) {
                        self.counters.announce_sent += 1;
                    }
                }
            }
            _ => {
                if self.push_general(message, None, actions) {
                    self.counters.announce_sent += 1;
                }
            }
        }
    }

    fn send_sync(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let sequence_id = self.sync_seq_ids.generate();
        let message = Message::sync(
            &self.default_ds,
            self.port_identity,
            sequence_id,
            self.config.sync_interval,
        );

        match self.config.transport_mode {
            TransportMode::Unicast => {
                // Each granted slave gets its own timestamped copy
                let targets = self.granted_targets(GrantType::Sync);
                for (address, sequence_id) in targets {
                    let mut unicast_message = message.clone();
                    unicast_message.header.unicast_flag = true;
                    unicast_message.header.sequence_id = sequence_id;
                    let context = TimestampContext {
                        inner: TimestampContextInner::Sync {
                            id: sequence_id,
                            address: Some(address),
                        },
                    };
                    if self.push_event(unicast_message, Some(address), context, actions) {
                        self.counters.sync_sent += 1;
                    }
                }
            }
            _ => {
                let context = TimestampContext {
                    inner: TimestampContextInner::Sync {
                        id: sequence_id,
                        address: None,
                    },
                };
                if self.push_event(message, None, context, actions) {
                    self.counters.sync_sent += 1;
                }
            }
        }
    }

    fn send_delay_request(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let sequence_id = self.delay_req_seq_ids.generate();
        let mut message = Message::delay_req(&self.default_ds, self.port_identity, sequence_id);

        let address = self.delay_exchange_address();
        message.header.unicast_flag = address.is_some();

        let context = TimestampContext {
            inner: TimestampContextInner::DelayReq { id: sequence_id },
        };

        if self.push_event(message, address, context, actions) {
            self.counters.delay_req_sent += 1;
            if let PortState::Slave(slave) | PortState::Uncalibrated(slave) =
                &mut self.port_state
            {
                slave.delay_state = DelayState::Measuring {
                    delay_id: sequence_id,
                    delay_send_time: None,
                    delay_recv_time: None,
                };
            }
        }
    }

    fn send_pdelay_request(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let sequence_id = self.pdelay_req_seq_ids.generate();
        let message = Message::pdelay_req(&self.default_ds, self.port_identity, sequence_id);

        let context = TimestampContext {
            inner: TimestampContextInner::PDelayReq { id: sequence_id },
        };

        if self.push_event(message, None, context, actions) {
            if let PortState::Slave(slave) | PortState::Uncalibrated(slave) =
                &mut self.port_state
            {
                slave.peer_delay_state = PeerDelayState::Measuring {
                    pdelay_id: sequence_id,
                    request_send_time: None,
                    request_recv_time: None,
                    response_send_time: None,
                    response_recv_time: None,
                };
            }
        }
    }

    /// The unicast delay exchange target: the elected master's address in
    /// unicast and hybrid modes.
    fn delay_exchange_address(&mut self) -> Option<TransportAddress> {
        match self.config.transport_mode {
            TransportMode::Multicast => None,
            TransportMode::Hybrid | TransportMode::Unicast => {
                let parent = self.parent_ds.parent_port_identity;
                self.unicast
                    .find(&parent)
                    .map(|slot| self.unicast.node(slot).address)
                    .filter(|address| !address.is_empty())
            }
        }
    }

    // ------------------------------------------------------------------
    // bmca and state transitions

    fn run_bmca(&mut self, now: Time) {
        let erbest = self.bmca.take_best_announce_message(now);
        let in_listening = matches!(self.port_state, PortState::Listening);

        let Some(recommended) =
            Bmca::<A>::calculate_recommended_state(&self.default_ds, erbest, in_listening)
        else {
            return;
        };

        match recommended {
            RecommendedState::M1(_) | RecommendedState::M2(_) => {
                if !matches!(
                    self.port_state,
                    PortState::Master(_) | PortState::PreMaster
                ) {
                    self.start_premaster(now);
                }
            }
            RecommendedState::P1(_) => {
                if !matches!(self.port_state, PortState::Passive) {
                    self.set_state(PortState::Passive, now);
                }
            }
            RecommendedState::S1(announce) => {
                if self.config.master_only {
                    if !matches!(self.port_state, PortState::Passive) {
                        self.set_state(PortState::Passive, now);
                    }
                    return;
                }

                let master = announce.header.source_port_identity;
                let already_following = matches!(
                    &self.port_state,
                    PortState::Slave(slave) | PortState::Uncalibrated(slave)
                        if slave.remote_master() == master
                );

                if !already_following {
                    let parent_changed = self.parent_ds.parent_port_identity != master;
                    if parent_changed {
                        self.counters.master_changes += 1;
                        self.alarms.trigger(AlarmId::MasterChange, now);
                    }

                    self.servo.reset();
                    self.set_state(PortState::Uncalibrated(SlaveState::new(master)), now);
                    self.apply_s1_updates(&announce, now);
                }
            }
        }
    }

    fn start_premaster(&mut self, now: Time) {
        self.premaster_intervals_left = QUALIFICATION_TIMEOUT;
        self.set_state(PortState::PreMaster, now);
    }

    fn set_state(&mut self, state: PortState, now: Time) {
        log::info!(
            "port {}: {} -> {}",
            self.port_identity,
            self.port_state,
            state
        );
        self.port_state = state;
        self.counters.state_transitions += 1;
        self.on_state_entry(now);
    }

    fn announce_receipt_secs(&mut self) -> f64 {
        self.config.announce_duration(&mut self.rng).as_secs_f64()
    }

    fn on_state_entry(&mut self, now: Time) {
        match &self.port_state {
            PortState::Listening => {
                self.timers.stop(TimerId::AnnounceInterval);
                self.timers.stop(TimerId::Sync);
                self.timers.stop(TimerId::DelayReq);
                self.timers.stop(TimerId::PdelayReq);
                self.timers.stop(TimerId::SyncReceipt);
                self.timers.stop(TimerId::DelayReceipt);
                self.timers.stop(TimerId::ClockUpdate);
                self.timers.stop(TimerId::CalibrationDelay);
                self.timers.stop(TimerId::MasterNetRefresh);

                let duration = self.announce_receipt_secs();
                self.timers.start(TimerId::AnnounceReceipt, duration, now);

                if matches!(self.config.delay_mechanism, DelayMechanism::P2P { .. }) {
                    self.timers.start_duration(
                        TimerId::PdelayReq,
                        self.config.min_delay_req_interval().as_duration(),
                        now,
                    );
                }
            }
            PortState::PreMaster => {
                self.timers.stop(TimerId::AnnounceReceipt);
                self.timers.start_duration(
                    TimerId::AnnounceInterval,
                    self.config.announce_interval.as_duration(),
                    now,
                );
            }
            PortState::Master(_) => {
                self.timers.stop(TimerId::AnnounceReceipt);
                self.timers.stop(TimerId::SyncReceipt);
                self.timers.stop(TimerId::DelayReceipt);
                self.timers.stop(TimerId::ClockUpdate);
                self.timers.start_duration(
                    TimerId::AnnounceInterval,
                    self.config.announce_interval.as_duration(),
                    now,
                );
                self.timers.start_duration(
                    TimerId::Sync,
                    self.config.sync_interval.as_duration(),
                    now,
                );
                if !matches!(self.config.transport_mode, TransportMode::Unicast) {
                    self.timers.start(TimerId::MasterNetRefresh, 60.0, now);
                }
            }
            PortState::Uncalibrated(_) => {
                self.timers.stop(TimerId::AnnounceInterval);
                self.timers.stop(TimerId::Sync);
                self.timers.stop(TimerId::MasterNetRefresh);

                let duration = self.announce_receipt_secs();
                self.timers.start(TimerId::AnnounceReceipt, duration, now);

                let sync_secs = self.config.sync_interval.seconds();
                self.timers.start(
                    TimerId::SyncReceipt,
                    MISSED_MESSAGES_MAX as f64 * sync_secs,
                    now,
                );
                self.timers.start(
                    TimerId::ClockUpdate,
                    self.config.clock_update_timeout as f64,
                    now,
                );

                match self.config.delay_mechanism {
                    DelayMechanism::E2E { interval } => {
                        self.timers.start(
                            TimerId::DelayReceipt,
                            MISSED_MESSAGES_MAX as f64 * interval.seconds(),
                            now,
                        );
                        self.timers
                            .start_duration(TimerId::DelayReq, interval.as_duration(), now);
                    }
                    DelayMechanism::P2P { interval } => {
                        self.timers
                            .start_duration(TimerId::PdelayReq, interval.as_duration(), now);
                    }
                }

                if self.config.calibration_delay > 0 {
                    self.timers.start(
                        TimerId::CalibrationDelay,
                        self.config.calibration_delay as f64,
                        now,
                    );
                } else {
                    self.servo.mark_calibrated();
                }
            }
            PortState::Slave(_)
            | PortState::Passive
            | PortState::Initializing
            | PortState::Faulty
            | PortState::Disabled => {}
        }
    }

    pub(crate) fn reinitialize(&mut self, now: Time) {
        self.timers.stop_all();
        self.port_state = PortState::Initializing;
        self.premaster_intervals_left = 0;
        self.panic_active = false;
        self.pending_step = None;
        self.leap_pause_active = false;
        self.leap_smear_ppb = 0.0;

        // Housekeeping cadence, state independent
        self.timers.start(TimerId::AlarmUpdate, 1.0, now);
        self.timers.start(TimerId::StatisticsUpdate, 1.0, now);
        self.timers.start(TimerId::StatusFileUpdate, 1.0, now);
        self.timers.start(TimerId::PeriodicInfo, 60.0, now);
        self.timers.start(TimerId::OperatorMessages, 300.0, now);
        self.timers.start(TimerId::TimingDomainUpdate, 60.0, now);
        if self.unicast_negotiation_enabled {
            self.timers.start(TimerId::UnicastGrant, 1.0, now);
        }

        self.set_state(PortState::Listening, now);
    }

    // ------------------------------------------------------------------
    // unicast negotiation

    fn wants_unicast_grants(&self) -> bool {
        self.unicast_negotiation_enabled
            && !self.config.master_only
            && !self.config.unicast_masters.is_empty()
    }

    /// A placeholder identity for a configured master we have not heard
    /// from: all-ones with the table position in the last octet.
    fn placeholder_identity(index: usize) -> PortIdentity {
        let mut identity = [0xff; 8];
        identity[7] = index as u8;
        PortIdentity {
            clock_identity: ClockIdentity(identity),
            port_number: UNKNOWN_MASTER_PORT,
        }
    }

    fn seed_unicast_masters(&mut self) {
        let masters = self.config.unicast_masters.clone();
        for (index, master) in masters.iter().enumerate() {
            let placeholder = Self::placeholder_identity(index);
            let Some(slot) = self
                .unicast
                .find_or_insert(&placeholder, master.address, true)
            else {
                continue;
            };

            let log_min = self.config.unicast_log_min_interval;
            let log_max = self.config.unicast_log_max_interval;
            let delay_grant_type = match self.config.delay_mechanism {
                DelayMechanism::E2E { .. } => GrantType::DelayResp,
                DelayMechanism::P2P { .. } => GrantType::PdelayResp,
            };

            let node = self.unicast.node_mut(slot);
            node.local_preference = master.local_preference;
            for grant_type in [GrantType::Announce, GrantType::Sync, delay_grant_type] {
                let grant = node.grant_mut(grant_type);
                grant.requestable = true;
                grant.log_min_interval = log_min;
                grant.log_max_interval = log_max;
            }
        }
    }

    fn send_grant_requests_to_all(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        for slot in 0..self.unicast.len() {
            if self.unicast.node(slot).is_master {
                self.send_grant_request(slot, None, actions);
            }
        }
    }

    /// Send REQUEST_UNICAST_TRANSMISSION to the node; `only` limits the
    /// request to one message type (renewals), otherwise everything
    /// requestable is requested.
    fn send_grant_request(
        &mut self,
        slot: usize,
        only: Option<GrantType>,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        let duration = self.config.unicast_grant_duration;
        let delay_grant_type = match self.config.delay_mechanism {
            DelayMechanism::E2E { .. } => GrantType::DelayResp,
            DelayMechanism::P2P { .. } => GrantType::PdelayResp,
        };
        let defaults = [
            (
                GrantType::Announce,
                self.config.announce_interval.as_log_2(),
            ),
            (GrantType::Sync, self.config.sync_interval.as_log_2()),
            (
                delay_grant_type,
                self.config.min_delay_req_interval().as_log_2(),
            ),
        ];

        let node = self.unicast.node_mut(slot);
        let address = node.address;
        let target = if node.port_identity.port_number == UNKNOWN_MASTER_PORT {
            PortIdentity::ALL_ONES
        } else {
            node.port_identity
        };

        let mut tlvs: ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS> = ArrayVec::new();
        for (grant_type, default_log_interval) in defaults {
            if let Some(only) = only {
                if only != grant_type {
                    continue;
                }
            }

            let grant = node.grant_mut(grant_type);
            if !grant.requestable {
                continue;
            }
            if !grant.requested && !grant.granted {
                grant.log_interval = default_log_interval;
            }
            grant.requested = true;
            grant.granted = false;
            grant.expired = false;

            tlvs.push(SignalingTlv::RequestUnicast {
                message_type: grant_type.message_type(),
                log_interval: grant.log_interval,
                duration,
            });
        }

        if tlvs.is_empty() {
            return;
        }

        let requested = tlvs.len() as u32;
        let message = Message::signaling(
            &self.default_ds,
            self.port_identity,
            target,
            self.signaling_seq_ids.generate(),
            tlvs,
        );

        if self.push_general(message, Some(address), actions) {
            self.counters.signaling_sent += 1;
            self.counters.unicast_grants_requested += requested;
        }
    }

    fn refresh_unicast_grants(&mut self, actions: &mut ArrayVec<PortAction, MAX_ACTIONS>) {
        let events = self.unicast.refresh();
        for event in events {
            match event {
                GrantEvent::Request { node, grant_type } => {
                    self.send_grant_request(node, Some(grant_type), actions);
                }
            }
        }
    }

    fn handle_signaling(
        &mut self,
        header: Header,
        message: SignalingMessage,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.signaling_received += 1;

        let target = message.target_port_identity;
        if !target.is_wildcard() && target != self.port_identity {
            return;
        }

        if !self.unicast_negotiation_enabled {
            self.counters.discarded_messages += 1;
            return;
        }

        for tlv in message.tlvs {
            match tlv {
                SignalingTlv::RequestUnicast {
                    message_type,
                    log_interval,
                    duration,
                } => {
                    self.handle_grant_request(header, message_type, log_interval, duration, actions)
                }
                SignalingTlv::GrantUnicast {
                    message_type,
                    log_interval,
                    duration,
                    ..
                } => self.handle_grant_granted(header, message_type, log_interval, duration),
                SignalingTlv::CancelUnicast { message_type } => {
                    self.handle_grant_cancel(header, message_type, actions)
                }
                SignalingTlv::AckCancelUnicast { message_type } => {
                    self.handle_grant_cancel_ack(header, message_type)
                }
            }
        }
    }

    /// A peer asks us, a (potential) master, for unicast service
    fn handle_grant_request(
        &mut self,
        header: Header,
        message_type: MessageType,
        log_interval: i8,
        duration: u32,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        let grant_type = GrantType::from_message_type(message_type);
        let source = self.last_packet_source.unwrap_or_default();

        let requestable = match (grant_type, self.config.delay_mechanism) {
            (Some(GrantType::Announce | GrantType::Sync), _) => true,
            (Some(GrantType::DelayResp), DelayMechanism::E2E { .. }) => true,
            (Some(GrantType::PdelayResp), DelayMechanism::P2P { .. }) => true,
            _ => false,
        };

        let mut granted_interval = log_interval;
        let mut granted_duration = 0u32;

        let slot = grant_type.and_then(|_| {
            self.unicast
                .find_or_insert(&header.source_port_identity, source, false)
        });

        self.counters.unicast_grants_requested += 1;

        if let (Some(slot), Some(grant_type)) = (slot, grant_type) {
            let max_duration = self.config.unicast_grant_duration;
            let log_min = self.config.unicast_log_min_interval;
            let log_max = self.config.unicast_log_max_interval;

            let grant = self.unicast.node_mut(slot).grant_mut(grant_type);
            grant.requestable = requestable;
            grant.requested = true;

            let granted = requestable && duration > 0 && log_interval >= log_min;

            if granted {
                // Offer the coarsest supported interval rather than denying
                granted_interval = log_interval.min(log_max);
                granted_duration =
                    duration.clamp(GRANT_MIN_DURATION, max_duration.max(GRANT_MIN_DURATION));

                if !grant.granted || grant.log_interval != granted_interval {
                    grant.interval_counter = 0;
                }

                grant.granted = true;
                grant.canceled = false;
                grant.cancel_count = 0;
                grant.log_interval = granted_interval;
                grant.duration = granted_duration;
                grant.time_left = (granted_duration + GRANT_TIME_LEFT_GRACE) as i32;
                grant.expired = false;

                self.counters.unicast_grants_granted += 1;
            } else {
                grant.granted = false;
                self.counters.unicast_grants_denied += 1;
            }
        } else {
            self.counters.unicast_grants_denied += 1;
        }

        let mut tlvs: ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS> = ArrayVec::new();
        tlvs.push(SignalingTlv::GrantUnicast {
            message_type,
            log_interval: granted_interval,
            duration: granted_duration,
            renewal_invited: granted_duration > 0,
        });

        let response = Message::signaling(
            &self.default_ds,
            self.port_identity,
            header.source_port_identity,
            self.signaling_seq_ids.generate(),
            tlvs,
        );

        if self.push_general(response, Some(source), actions) {
            self.counters.signaling_sent += 1;
        }
    }

    /// A master answered one of our requests
    fn handle_grant_granted(
        &mut self,
        header: Header,
        message_type: MessageType,
        log_interval: i8,
        duration: u32,
    ) {
        let Some(grant_type) = GrantType::from_message_type(message_type) else {
            return;
        };

        let source = self.last_packet_source.unwrap_or_default();

        // Configured masters were seeded under placeholder identities;
        // claim the node on first contact, matching by address
        let slot = match self.unicast.find(&header.source_port_identity) {
            Some(slot) => Some(slot),
            None => {
                let placeholder = (0..self.unicast.len()).find(|&slot| {
                    let node = self.unicast.node(slot);
                    node.is_master
                        && node.port_identity.port_number == UNKNOWN_MASTER_PORT
                        && node.address == source
                });
                match placeholder {
                    Some(slot) => {
                        self.unicast.node_mut(slot).port_identity = header.source_port_identity;
                        // Repairs the hashed index under the real identity
                        self.unicast.find(&header.source_port_identity)
                    }
                    None if self.config.unicast_accept_any => {
                        self.unicast
                            .find_or_insert(&header.source_port_identity, source, true)
                    }
                    None => None,
                }
            }
        };

        let Some(slot) = slot else {
            self.counters.discarded_messages += 1;
            return;
        };

        let log_min = self.config.unicast_log_min_interval;
        let log_max = self.config.unicast_log_max_interval;

        let node = self.unicast.node_mut(slot);
        if !node.is_master {
            self.counters.discarded_messages += 1;
            return;
        }

        let grant = node.grant_mut(grant_type);

        if !grant.requested {
            log::debug!("unsolicited unicast grant for {message_type:?}");
            return;
        }

        if duration == 0 {
            // Denied: back off to a coarser interval, wrapping to the floor
            self.counters.unicast_grants_denied += 1;
            grant.log_interval += 1;
            if grant.log_interval > log_max {
                grant.log_interval = log_min;
            }
            grant.requested = false;
            return;
        }

        grant.granted = true;
        grant.log_interval = log_interval;
        grant.duration = duration;
        grant.time_left = duration as i32;
        grant.expired = false;
        grant.canceled = false;
        grant.cancel_count = 0;
        self.counters.unicast_grants_granted += 1;

        log::debug!("unicast grant for {message_type:?}: interval 2^{log_interval}, {duration} s");
    }

    fn handle_grant_cancel(
        &mut self,
        header: Header,
        message_type: MessageType,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.unicast_grants_canceled += 1;

        if let Some(grant_type) = GrantType::from_message_type(message_type) {
            if let Some(slot) = self.unicast.find(&header.source_port_identity) {
                self.unicast.node_mut(slot).grant_mut(grant_type).clear();
            }
        }

        let mut tlvs: ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS> = ArrayVec::new();
        tlvs.push(SignalingTlv::AckCancelUnicast { message_type });

        let response = Message::signaling(
            &self.default_ds,
            self.port_identity,
            header.source_port_identity,
            self.signaling_seq_ids.generate(),
            tlvs,
        );

        let address = self.last_packet_source;
        if self.push_general(response, address, actions) {
            self.counters.signaling_sent += 1;
        }
    }

    fn handle_grant_cancel_ack(&mut self, header: Header, message_type: MessageType) {
        if let Some(grant_type) = GrantType::from_message_type(message_type) {
            if let Some(slot) = self.unicast.find(&header.source_port_identity) {
                self.unicast.node_mut(slot).grant_mut(grant_type).clear();
            }
        }
    }

    /// The unicast targets currently granted a message type, honoring the
    /// per-grant interval pacing. Returns the destination and the per-grant
    /// sequence id to use.
    fn granted_targets(&mut self, grant_type: GrantType) -> ArrayVec<(TransportAddress, u16), 8> {
        let base_interval = match grant_type {
            GrantType::Announce => self.config.announce_interval.seconds(),
            _ => self.config.sync_interval.seconds(),
        };

        let mut targets = ArrayVec::new();
        for slot in 0..self.unicast.len() {
            let node = self.unicast.node_mut(slot);
            if node.is_master {
                continue;
            }

            let address = node.address;
            let grant = node.grant_mut(grant_type);
            if !grant.granted || grant.expired || address.is_empty() {
                continue;
            }

            // Grants at coarser intervals than our tick only get every n-th
            // message
            let wanted = Interval::from_log_2(grant.log_interval).seconds();
            let ratio = (wanted / base_interval).max(1.0) as u32;
            grant.interval_counter = grant.interval_counter.wrapping_add(1);
            if grant.interval_counter % ratio != 0 {
                continue;
            }

            let seq = grant.sent_seq_id;
            grant.sent_seq_id = grant.sent_seq_id.wrapping_add(1);

            if targets.try_push((address, seq)).is_err() {
                log::debug!("unicast fanout truncated at {} targets", targets.len());
                break;
            }
        }

        targets
    }

    // ------------------------------------------------------------------
    // send helpers

    fn push_general(
        &mut self,
        message: Message,
        address: Option<TransportAddress>,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) -> bool {
        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = match message.serialize(&mut buffer) {
            Ok(len) => len,
            Err(error) => {
                log::error!("could not serialize message: {error:?}");
                return false;
            }
        };

        let mut data = ArrayVec::new();
        if data.try_extend_from_slice(&buffer[..len]).is_err() {
            return false;
        }

        push_action(actions, PortAction::SendGeneral { data, address })
    }

    fn push_event(
        &mut self,
        message: Message,
        address: Option<TransportAddress>,
        context: TimestampContext,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) -> bool {
        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = match message.serialize(&mut buffer) {
            Ok(len) => len,
            Err(error) => {
                log::error!("could not serialize message: {error:?}");
                return false;
            }
        };

        let mut data = ArrayVec::new();
        if data.try_extend_from_slice(&buffer[..len]).is_err() {
            return false;
        }

        push_action(
            actions,
            PortAction::SendEvent {
                context,
                data,
                address,
            },
        )
    }
}

/// Merge a FollowUp into the slave's sync state, turning an AfterSync into a
/// complete AfterFollowUp.
fn absorb_follow_up(slave: &mut SlaveState, follow_up: BufferedFollowUp) {
    if let SyncState::AfterSync {
        sync_id,
        sync_recv_time,
        sync_correction,
    } = slave.sync_state
    {
        if sync_id == follow_up.sequence_id {
            slave.sync_state = SyncState::AfterFollowUp {
                sync_recv_time,
                sync_send_time: follow_up.precise_origin
                    + follow_up.correction
                    + sync_correction,
            };
        }
    }
}

fn push_action(actions: &mut ArrayVec<PortAction, MAX_ACTIONS>, action: PortAction) -> bool {
    match actions.try_push(action) {
        Ok(()) => true,
        Err(_) => {
            log::warn!("action list full, dropping an action");
            false
        }
    }
}
