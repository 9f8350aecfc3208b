use std::{cell::RefCell, rc::Rc, vec::Vec};

use arrayvec::ArrayVec;
use rand::rngs::mock::StepRng;

use super::*;
use crate::{
    bmc::acceptable_master::AcceptAnyMaster,
    config::{InstanceConfig, UnicastMaster},
    datastructures::{
        common::ClockIdentity,
        datasets::{CurrentDS, ParentDS, TimePropertiesDS},
        messages::{ManagementAction, ManagementId, ManagementTlv, ManagementTlvData},
    },
    servo::{DtMode, ServoConfig},
};

#[derive(Debug, Default)]
struct TestClockInner {
    time: Time,
    frequency_calls: Vec<f64>,
    steps: Vec<Duration>,
}

/// A virtual clock the tests can move at will
#[derive(Debug, Clone, Default)]
struct TestClock {
    inner: Rc<RefCell<TestClockInner>>,
}

impl TestClock {
    fn at(secs: u64) -> Self {
        let clock = TestClock::default();
        clock.inner.borrow_mut().time = Time::from_secs(secs);
        clock
    }

    fn advance_to(&self, time: Time) {
        self.inner.borrow_mut().time = time;
    }

    fn advance(&self, duration: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.time = inner.time + duration;
    }
}

impl Clock for TestClock {
    type Error = core::convert::Infallible;

    fn now(&self) -> Time {
        self.inner.borrow().time
    }

    fn set_time(&mut self, time: Time) -> Result<Time, Self::Error> {
        self.inner.borrow_mut().time = time;
        Ok(time)
    }

    fn step_clock(&mut self, offset: Duration) -> Result<Time, Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.steps.push(offset);
        inner.time = inner.time + offset;
        Ok(inner.time)
    }

    fn set_frequency(&mut self, ppb: f64) -> Result<Time, Self::Error> {
        let mut inner = self.inner.borrow_mut();
        inner.frequency_calls.push(ppb);
        Ok(inner.time)
    }

    fn set_properties(&mut self, _: &TimePropertiesDS) -> Result<(), Self::Error> {
        Ok(())
    }
}

type TestPort = Port<AcceptAnyMaster, TestClock, StepRng>;

const MASTER_IDENTITY: ClockIdentity = ClockIdentity([0xaa, 0, 0, 0, 0, 0, 0, 0x01]);

fn master_default_ds() -> DefaultDS {
    DefaultDS::new(InstanceConfig {
        clock_identity: MASTER_IDENTITY,
        ..Default::default()
    })
}

fn master_port_identity() -> PortIdentity {
    PortIdentity {
        clock_identity: MASTER_IDENTITY,
        port_number: 1,
    }
}

fn test_port_config() -> PortConfig<AcceptAnyMaster> {
    PortConfig {
        acceptable_master_list: AcceptAnyMaster,
        delay_mechanism: DelayMechanism::E2E {
            interval: Interval::ONE_SECOND,
        },
        announce_interval: Interval::TWO_SECONDS,
        announce_receipt_timeout: 200,
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
        clock_update_timeout: 600,
        calibration_delay: 0,
        leap_action: LeapAction::Step,
        leap_pause_period: 5,
        panic_mode_duration: 30,
        transport_fault_timeout: 10,
        clock_fault_timeout: 10,
    }
}

fn test_port(clock: TestClock) -> TestPort {
    test_port_with(clock, test_port_config())
}

fn test_port_with(clock: TestClock, config: PortConfig<AcceptAnyMaster>) -> TestPort {
    let instance_config = InstanceConfig {
        clock_identity: ClockIdentity([0x01; 8]),
        ..Default::default()
    };

    let servo_config = ServoConfig {
        dt_mode: DtMode::Unity,
        ..ServoConfig::software()
    };

    let mut port = Port::new(
        instance_config,
        config,
        servo_config,
        TimePropertiesDS::default(),
        clock,
        StepRng::new(0, 0),
    );
    let _ = port.enable().count();
    port
}

fn serialize(message: Message) -> Vec<u8> {
    let mut buffer = [0u8; MAX_DATA_LEN];
    let len = message.serialize(&mut buffer).unwrap();
    buffer[..len].to_vec()
}

fn announce_bytes(sequence_id: u16) -> Vec<u8> {
    let default_ds = master_default_ds();
    let parent_ds = ParentDS::new(default_ds);

    serialize(Message::announce(
        &default_ds,
        &parent_ds,
        &CurrentDS::default(),
        &TimePropertiesDS::default(),
        master_port_identity(),
        sequence_id,
        Interval::TWO_SECONDS,
    ))
}

fn sync_bytes(sequence_id: u16) -> Vec<u8> {
    serialize(Message::sync(
        &master_default_ds(),
        master_port_identity(),
        sequence_id,
        Interval::ONE_SECOND,
    ))
}

fn follow_up_bytes(sequence_id: u16, timestamp: Time) -> Vec<u8> {
    serialize(Message::follow_up(
        &master_default_ds(),
        master_port_identity(),
        sequence_id,
        timestamp,
    ))
}

fn delay_resp_bytes(sequence_id: u16, slave: PortIdentity, timestamp: Time) -> Vec<u8> {
    let request_header = Header {
        sequence_id,
        source_port_identity: slave,
        domain_number: 0,
        ..Default::default()
    };

    serialize(Message::delay_resp(
        request_header,
        master_port_identity(),
        Interval::ONE_SECOND,
        timestamp,
    ))
}

/// Qualify the test master (two announces inside the window) and run the
/// BMCA so the port elects it.
fn elect_master(port: &mut TestPort, clock: &TestClock, announce_seq: &mut u16) {
    for _ in 0..2 {
        let bytes = announce_bytes(*announce_seq);
        *announce_seq += 1;
        let _ = port.handle_general_receive(&bytes, None).count();
        clock.advance(Duration::from_millis(500));
    }

    let _ = port.handle_timers().count();
}

fn find_event_context(actions: PortActionIterator) -> Option<TimestampContext> {
    for action in actions {
        if let PortAction::SendEvent { context, .. } = action {
            return Some(context);
        }
    }
    None
}

#[test]
fn slave_election_through_announce() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());
    let mut seq = 0;

    assert!(matches!(port.state(), PortState::Listening));

    elect_master(&mut port, &clock, &mut seq);

    assert!(port.is_steering());
    assert!(matches!(port.state(), PortState::Uncalibrated(_)));
    assert_eq!(port.counters().master_changes, 1);
}

#[test]
fn slave_sync_round_computes_offset_and_delay() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());
    let mut seq = 0;

    elect_master(&mut port, &clock, &mut seq);

    // Sync at t2, two step; its precise origin t1 arrives via FollowUp
    let t2 = Time::from_nanos(102_000_100_000);
    let t1 = Time::from_nanos(101_999_950_000);
    let _ = port.handle_event_receive(&sync_bytes(5), t2, None).count();
    let _ = port
        .handle_general_receive(&follow_up_bytes(5, t1), None)
        .count();

    // The delay request timer produces a DelayReq whose tx timestamp is t3
    clock.advance_to(Time::from_nanos(102_500_000_000));
    let context = find_event_context(port.handle_timers()).expect("a delay request is sent");

    let t3 = Time::from_nanos(102_500_150_000);
    let _ = port.handle_send_timestamp(context, t3).count();

    // The master answers with its receive time t4
    let t4 = Time::from_nanos(102_500_200_000);
    let slave_identity = PortIdentity {
        clock_identity: ClockIdentity([0x01; 8]),
        port_number: 1,
    };
    let _ = port
        .handle_general_receive(&delay_resp_bytes(0, slave_identity, t4), None)
        .count();

    // meanPathDelay = ((t2 - t1) + (t4 - t3)) / 2 = (150 us + 50 us) / 2
    // offsetFromMaster = (t2 - t1) - meanPathDelay = 50 us
    let observed = port.observe();
    assert_eq!(observed.servo.mean_path_delay_ns, 100_000.0);
    assert_eq!(observed.servo.offset_from_master_ns, 50_000.0);

    // The servo slewed the clock and the port calibrated
    assert!(!clock.inner.borrow().frequency_calls.is_empty());
    assert!(matches!(port.state(), PortState::Slave(_)));
    assert_eq!(port.counters().clock_updates_applied, 1);
}

#[test]
fn delay_resp_sequence_mismatch_is_counted() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());
    let mut seq = 0;

    elect_master(&mut port, &clock, &mut seq);

    let t2 = Time::from_nanos(102_000_100_000);
    let t1 = Time::from_nanos(101_999_950_000);
    let _ = port.handle_event_receive(&sync_bytes(5), t2, None).count();
    let _ = port
        .handle_general_receive(&follow_up_bytes(5, t1), None)
        .count();

    clock.advance_to(Time::from_nanos(102_500_000_000));
    let context = find_event_context(port.handle_timers()).expect("a delay request is sent");
    let _ = port
        .handle_send_timestamp(context, Time::from_nanos(102_500_150_000))
        .count();

    // The slave sent sequence id 0; a response for id 4 must not match
    let slave_identity = PortIdentity {
        clock_identity: ClockIdentity([0x01; 8]),
        port_number: 1,
    };
    let wrong_seq = delay_resp_bytes(4, slave_identity, Time::from_nanos(102_500_200_000));
    let _ = port.handle_general_receive(&wrong_seq, None).count();

    assert_eq!(port.counters().sequence_mismatch_errors, 1);
    assert_eq!(port.observe().servo.offset_from_master_ns, 0.0);
    assert_eq!(port.counters().clock_updates_applied, 0);
}

#[test]
fn late_follow_up_is_dropped_within_gap_matched() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());
    let mut seq = 0;

    elect_master(&mut port, &clock, &mut seq);

    // A FollowUp one sequence id ahead of its Sync is buffered and matched
    // when the Sync arrives
    let t1 = Time::from_nanos(101_999_950_000);
    let _ = port
        .handle_general_receive(&follow_up_bytes(8, t1), None)
        .count();
    let _ = port
        .handle_event_receive(&sync_bytes(8), Time::from_nanos(102_000_100_000), None)
        .count();
    assert_eq!(port.counters().follow_up_mismatch_errors, 0);

    // A buffered FollowUp four Syncs old dies at the gap limit
    let _ = port
        .handle_general_receive(&follow_up_bytes(9, t1), None)
        .count();
    let _ = port
        .handle_event_receive(&sync_bytes(13), Time::from_nanos(103_000_100_000), None)
        .count();
    assert_eq!(port.counters().follow_up_mismatch_errors, 1);
}

#[test]
fn panic_mode_suspends_then_steps() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());
    let mut seq = 0;

    elect_master(&mut port, &clock, &mut seq);

    // A first normal round gives the servo a delay estimate
    let t2 = Time::from_nanos(102_000_100_000);
    let t1 = Time::from_nanos(101_999_950_000);
    let _ = port.handle_event_receive(&sync_bytes(5), t2, None).count();
    let _ = port
        .handle_general_receive(&follow_up_bytes(5, t1), None)
        .count();
    clock.advance_to(Time::from_nanos(102_500_000_000));
    let context = find_event_context(port.handle_timers()).expect("a delay request is sent");
    let _ = port
        .handle_send_timestamp(context, Time::from_nanos(102_500_150_000))
        .count();
    let slave_identity = PortIdentity {
        clock_identity: ClockIdentity([0x01; 8]),
        port_number: 1,
    };
    let _ = port
        .handle_general_receive(
            &delay_resp_bytes(0, slave_identity, Time::from_nanos(102_500_200_000)),
            None,
        )
        .count();

    // Now a sample 1.2 s off: the port panics instead of stepping
    clock.advance_to(Time::from_secs(104));
    let t2 = Time::from_nanos(104_000_000_000);
    let t1 = Time::from_nanos(104_000_000_000 - 1_200_100_000);
    let _ = port.handle_event_receive(&sync_bytes(6), t2, None).count();
    let _ = port
        .handle_general_receive(&follow_up_bytes(6, t1), None)
        .count();

    assert_eq!(port.counters().panic_mode_entries, 1);
    assert!(clock.inner.borrow().steps.is_empty());

    // Keep the master alive over the panic window, then let it expire
    clock.advance_to(Time::from_secs(134));
    let _ = port
        .handle_general_receive(&announce_bytes(seq), None)
        .count();
    let _ = port
        .handle_general_receive(&announce_bytes(seq + 1), None)
        .count();

    clock.advance_to(Time::from_secs(136));
    let _ = port.handle_timers().count();

    let steps = clock.inner.borrow().steps.clone();
    assert_eq!(steps, std::vec![Duration::from_nanos(-1_200_000_000)]);
    assert_eq!(port.counters().clock_steps, 1);
}

#[test]
fn master_grants_and_slave_requests_unicast() {
    // Master side: a REQUEST_UNICAST_TRANSMISSION is answered with a grant
    let clock = TestClock::at(100);
    let mut config = test_port_config();
    config.unicast_negotiation = true;
    let mut port = test_port_with(clock.clone(), config);

    let requester = PortIdentity {
        clock_identity: ClockIdentity([0xbb; 8]),
        port_number: 1,
    };
    let mut tlvs: ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS> = ArrayVec::new();
    tlvs.push(SignalingTlv::RequestUnicast {
        message_type: MessageType::Sync,
        log_interval: 0,
        duration: 60,
    });
    let request = serialize(Message::signaling(
        &DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([0xbb; 8]),
            ..Default::default()
        }),
        requester,
        PortIdentity::ALL_ONES,
        0,
        tlvs,
    ));

    let source = crate::config::TransportAddress::from_ipv4([10, 0, 0, 2]);
    let mut response_bytes = None;
    for action in port.handle_general_receive(&request, Some(source)) {
        if let PortAction::SendGeneral { data, address } = action {
            assert_eq!(address, Some(source));
            response_bytes = Some(data);
        }
    }

    let response_bytes = response_bytes.expect("a grant response is sent");
    let response = Message::deserialize(&response_bytes).unwrap();
    let MessageBody::Signaling(signaling) = response.body else {
        panic!("expected a signaling response");
    };
    match signaling.tlvs.as_slice() {
        [SignalingTlv::GrantUnicast {
            message_type: MessageType::Sync,
            log_interval: 0,
            duration,
            renewal_invited: true,
        }] => {
            // Spec floor: grants last at least 30 seconds
            assert_eq!(*duration, 60);
        }
        other => panic!("expected a grant, got {other:?}"),
    }
    assert_eq!(port.counters().unicast_grants_granted, 1);
}

#[test]
fn slave_requests_grants_from_configured_masters() {
    let clock = TestClock::at(100);
    let mut config = test_port_config();
    config.transport_mode = TransportMode::Unicast;
    config.unicast_negotiation = true;
    config.unicast_masters.push(UnicastMaster {
        address: crate::config::TransportAddress::from_ipv4([10, 0, 0, 1]),
        local_preference: 10,
    });

    let instance_config = InstanceConfig {
        clock_identity: ClockIdentity([0x01; 8]),
        ..Default::default()
    };
    let mut port: TestPort = Port::new(
        instance_config,
        config,
        ServoConfig::software(),
        TimePropertiesDS::default(),
        clock,
        StepRng::new(0, 0),
    );

    let mut request_count = 0;
    for action in port.enable() {
        if let PortAction::SendGeneral { data, address } = action {
            assert_eq!(
                address,
                Some(crate::config::TransportAddress::from_ipv4([10, 0, 0, 1]))
            );
            let message = Message::deserialize(&data).unwrap();
            let MessageBody::Signaling(signaling) = message.body else {
                panic!("expected signaling");
            };
            request_count += signaling
                .tlvs
                .iter()
                .filter(|tlv| matches!(tlv, SignalingTlv::RequestUnicast { .. }))
                .count();
        }
    }

    // Announce, Sync and DelayResp are requested
    assert_eq!(request_count, 3);
    assert_eq!(port.counters().unicast_grants_requested, 3);
}

fn management_request_bytes(management_id: ManagementId) -> Vec<u8> {
    serialize(Message {
        header: Header {
            source_port_identity: master_port_identity(),
            sequence_id: 7,
            ..Default::default()
        },
        body: MessageBody::Management(crate::datastructures::messages::ManagementMessage {
            target_port_identity: PortIdentity::ALL_ONES,
            starting_boundary_hops: 1,
            boundary_hops: 1,
            action: ManagementAction::Get,
            management_tlv: ManagementTlv::Management {
                management_id,
                data: ManagementTlvData::Empty,
            },
        }),
        suffix: Default::default(),
    })
}

#[test]
fn management_get_default_data_set() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock);

    let request = management_request_bytes(ManagementId::DefaultDataSet);

    let mut response_bytes = None;
    for action in port.handle_general_receive(&request, None) {
        if let PortAction::SendGeneral { data, .. } = action {
            response_bytes = Some(data);
        }
    }

    let response = response_bytes.expect("a management response is sent");
    let message = Message::deserialize(&response).unwrap();
    let MessageBody::Management(management) = message.body else {
        panic!("expected a management response");
    };

    assert_eq!(management.action, ManagementAction::Response);
    match management.management_tlv {
        ManagementTlv::Management {
            management_id: ManagementId::DefaultDataSet,
            data:
                ManagementTlvData::DefaultDataSet {
                    clock_identity,
                    number_ports,
                    ..
                },
        } => {
            assert_eq!(clock_identity, ClockIdentity([0x01; 8]));
            assert_eq!(number_ports, 1);
        }
        other => panic!("unexpected response payload: {other:?}"),
    }
}

#[test]
fn unknown_management_id_yields_error_status() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock);

    // A GET for an id we do not implement
    let request = management_request_bytes(ManagementId::Unknown(0xc0de));

    let mut response_bytes = None;
    for action in port.handle_general_receive(&request, None) {
        if let PortAction::SendGeneral { data, .. } = action {
            response_bytes = Some(data);
        }
    }

    let response = response_bytes.expect("an error response is sent");
    let message = Message::deserialize(&response).unwrap();
    let MessageBody::Management(management) = message.body else {
        panic!("expected a management response");
    };

    assert!(matches!(
        management.management_tlv,
        ManagementTlv::ErrorStatus {
            error_id: crate::datastructures::messages::ManagementErrorId::NoSuchId,
            management_id: ManagementId::Unknown(0xc0de),
        }
    ));
}

#[test]
fn master_only_clock_takes_over_silent_domain() {
    let clock = TestClock::at(100);
    let mut config = test_port_config();
    config.announce_receipt_timeout = 3;

    let mut instance_config = InstanceConfig {
        clock_identity: ClockIdentity([0x01; 8]),
        ..Default::default()
    };
    instance_config.clock_quality.clock_class = 13;

    let mut port: TestPort = Port::new(
        instance_config,
        config,
        ServoConfig::software(),
        TimePropertiesDS::default(),
        clock.clone(),
        StepRng::new(0, 0),
    );
    let _ = port.enable().count();

    // Announce receipt timeout: 3 x 2 s, rng contributes zero extra
    clock.advance(Duration::from_secs(7));
    let _ = port.handle_timers().count();
    assert!(matches!(port.state(), PortState::PreMaster));

    // Two announce intervals of qualification, then the port is master and
    // emits its first announce and sync
    clock.advance(Duration::from_secs(2));
    let _ = port.handle_timers().count();
    clock.advance(Duration::from_secs(2));
    let actions: Vec<_> = port.handle_timers().collect();

    assert!(matches!(port.state(), PortState::Master(_)));
    assert!(actions
        .iter()
        .any(|action| matches!(action, PortAction::SendEvent { .. })));
    assert!(actions
        .iter()
        .any(|action| matches!(action, PortAction::SendGeneral { .. })));
    assert_eq!(port.counters().announce_sent, 1);
    assert_eq!(port.counters().sync_sent, 1);
}

#[test]
fn leap_second_pauses_and_applies_the_offset() {
    // Ten seconds before UTC midnight of an arbitrary day
    let clock = TestClock::at(86_390);
    let mut port = test_port(clock.clone());

    let leap_properties = TimePropertiesDS::new_ptp_time(
        Some(37),
        crate::config::LeapIndicator::Leap61,
        true,
        false,
        crate::config::TimeSource::Gps,
    );

    let leap_announce = |seq: u16| {
        let default_ds = master_default_ds();
        let parent_ds = ParentDS::new(default_ds);
        serialize(Message::announce(
            &default_ds,
            &parent_ds,
            &CurrentDS::default(),
            &leap_properties,
            master_port_identity(),
            seq,
            Interval::TWO_SECONDS,
        ))
    };

    // Elect the master; midnight is still too far away to arm the pause
    let _ = port.handle_general_receive(&leap_announce(0), None).count();
    clock.advance(Duration::from_millis(500));
    let _ = port.handle_general_receive(&leap_announce(1), None).count();
    clock.advance(Duration::from_millis(500));
    let _ = port.handle_timers().count();
    assert!(port.is_steering());
    assert_eq!(
        port.observe().time_properties_ds.current_utc_offset,
        Some(37)
    );

    // Four seconds out the pause window arms
    clock.advance_to(Time::from_secs(86_396));
    let _ = port.handle_general_receive(&leap_announce(2), None).count();

    // Once the window passed, the UTC offset has moved by the leap second
    // and clock updates resume
    clock.advance_to(Time::from_secs(86_406));
    let _ = port.handle_timers().count();

    let time_properties = port.observe().time_properties_ds;
    assert_eq!(time_properties.current_utc_offset, Some(38));
    assert_eq!(
        time_properties.leap_indicator,
        crate::config::LeapIndicator::NoLeap
    );
}

#[test]
fn send_failure_faults_and_recovers() {
    let clock = TestClock::at(100);
    let mut port = test_port(clock.clone());

    let _ = port.handle_send_error().count();
    assert!(matches!(port.state(), PortState::Faulty));

    // After the fault timeout the port reinitializes and asks for a
    // transport refresh
    clock.advance(Duration::from_secs(11));
    let actions: Vec<_> = port.handle_timers().collect();
    assert!(actions
        .iter()
        .any(|action| matches!(action, PortAction::RefreshTransport)));
    assert!(matches!(port.state(), PortState::Listening));
}
