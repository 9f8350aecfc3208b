//! Handling of management messages (clause 15): GET/SET/COMMAND over the
//! data sets and a curated set of configurables, with MANAGEMENT_ERROR_STATUS
//! answers for everything else.

use arrayvec::ArrayVec;

use super::{Port, PortAction, PortState, MAX_ACTIONS};
use crate::{
    bmc::acceptable_master::AcceptableMasterList,
    clock::Clock,
    config::DelayMechanism,
    datastructures::{
        common::{ClockAccuracy, LeapIndicator, PortIdentity, TimeInterval},
        datasets::PortDS,
        messages::{
            Header, ManagementAction, ManagementErrorId, ManagementId, ManagementMessage,
            ManagementTlv, ManagementTlvData, Message, PtpText,
        },
    },
    time::{Interval, Time},
};

impl<A: AcceptableMasterList, C: Clock, R: rand::Rng> Port<A, C, R> {
    pub(super) fn handle_management(
        &mut self,
        header: Header,
        message: ManagementMessage,
        now: Time,
        actions: &mut ArrayVec<PortAction, MAX_ACTIONS>,
    ) {
        self.counters.management_received += 1;

        let target = message.target_port_identity;
        if !target.is_wildcard() && target != self.port_identity {
            return;
        }

        let ManagementTlv::Management {
            management_id,
            ref data,
        } = message.management_tlv
        else {
            // Error status answers are never themselves answered
            return;
        };

        let reply = match message.action {
            ManagementAction::Get => self.management_get(management_id, now),
            ManagementAction::Set => self.management_set(management_id, data),
            ManagementAction::Command => self.management_command(management_id, now),
            // Responses and acknowledgements terminate here
            _ => return,
        };

        let (action, tlv) = match reply {
            Ok(answer) => answer,
            Err(error_id) => (
                ManagementAction::Response,
                ManagementTlv::ErrorStatus {
                    error_id,
                    management_id,
                },
            ),
        };

        let response =
            Message::management_response(header, self.port_identity, &message, action, tlv);
        let address = self.reply_address(&header);
        if self.push_general(response, address, actions) {
            self.counters.management_sent += 1;
        }
    }

    fn management_get(
        &mut self,
        management_id: ManagementId,
        now: Time,
    ) -> Result<(ManagementAction, ManagementTlv), ManagementErrorId> {
        let data = match management_id {
            ManagementId::NullManagement => ManagementTlvData::Empty,
            ManagementId::ClockDescription => self.clock_description(),
            ManagementId::UserDescription => {
                ManagementTlvData::UserDescription(self.user_description.clone())
            }
            ManagementId::DefaultDataSet => ManagementTlvData::DefaultDataSet {
                two_step: self.default_ds.two_step,
                slave_only: self.default_ds.slave_only,
                number_ports: self.default_ds.number_ports,
                priority_1: self.default_ds.priority_1,
                clock_quality: self.default_ds.clock_quality,
                priority_2: self.default_ds.priority_2,
                clock_identity: self.default_ds.clock_identity,
                domain_number: self.default_ds.domain_number,
            },
            ManagementId::CurrentDataSet => ManagementTlvData::CurrentDataSet {
                steps_removed: self.current_ds.steps_removed,
                offset_from_master: TimeInterval::from(self.current_ds.offset_from_master),
                mean_path_delay: TimeInterval::from(self.current_ds.mean_path_delay),
            },
            ManagementId::ParentDataSet => ManagementTlvData::ParentDataSet {
                parent_port_identity: self.parent_ds.parent_port_identity,
                parent_stats: self.parent_ds.parent_stats,
                observed_parent_offset_scaled_log_variance: self
                    .parent_ds
                    .observed_parent_offset_scaled_log_variance,
                observed_parent_clock_phase_change_rate: self
                    .parent_ds
                    .observed_parent_clock_phase_change_rate,
                grandmaster_priority_1: self.parent_ds.grandmaster_priority_1,
                grandmaster_clock_quality: self.parent_ds.grandmaster_clock_quality,
                grandmaster_priority_2: self.parent_ds.grandmaster_priority_2,
                grandmaster_identity: self.parent_ds.grandmaster_identity,
            },
            ManagementId::TimePropertiesDataSet => ManagementTlvData::TimePropertiesDataSet {
                current_utc_offset: self.time_properties_ds.current_utc_offset.unwrap_or_default(),
                leap61: self.time_properties_ds.leap_indicator == LeapIndicator::Leap61,
                leap59: self.time_properties_ds.leap_indicator == LeapIndicator::Leap59,
                current_utc_offset_valid: self.time_properties_ds.current_utc_offset.is_some(),
                ptp_timescale: self.time_properties_ds.ptp_timescale,
                time_traceable: self.time_properties_ds.time_traceable,
                frequency_traceable: self.time_properties_ds.frequency_traceable,
                time_source: self.time_properties_ds.time_source,
            },
            ManagementId::PortDataSet => ManagementTlvData::PortDataSet(PortDS::new(
                self.port_identity,
                self.port_state.to_primitive(),
                self.config.delay_mechanism,
                self.config.announce_interval,
                self.config.announce_receipt_timeout,
                self.config.sync_interval,
                self.current_ds.mean_path_delay,
            )),
            ManagementId::Priority1 => ManagementTlvData::Priority1(self.default_ds.priority_1),
            ManagementId::Priority2 => ManagementTlvData::Priority2(self.default_ds.priority_2),
            ManagementId::Domain => ManagementTlvData::Domain(self.default_ds.domain_number),
            ManagementId::SlaveOnly => ManagementTlvData::SlaveOnly(self.default_ds.slave_only),
            ManagementId::LogAnnounceInterval => {
                ManagementTlvData::LogAnnounceInterval(self.config.announce_interval.as_log_2())
            }
            ManagementId::AnnounceReceiptTimeout => {
                ManagementTlvData::AnnounceReceiptTimeout(self.config.announce_receipt_timeout)
            }
            ManagementId::LogSyncInterval => {
                ManagementTlvData::LogSyncInterval(self.config.sync_interval.as_log_2())
            }
            ManagementId::VersionNumber => ManagementTlvData::VersionNumber(2),
            ManagementId::Time => ManagementTlvData::Time(self.clock.now().into()),
            ManagementId::ClockAccuracy => ManagementTlvData::ClockAccuracy(
                self.default_ds.clock_quality.clock_accuracy.to_primitive(),
            ),
            ManagementId::UtcProperties => ManagementTlvData::UtcProperties {
                current_utc_offset: self.time_properties_ds.current_utc_offset.unwrap_or_default(),
                leap61: self.time_properties_ds.leap_indicator == LeapIndicator::Leap61,
                leap59: self.time_properties_ds.leap_indicator == LeapIndicator::Leap59,
                current_utc_offset_valid: self.time_properties_ds.current_utc_offset.is_some(),
            },
            ManagementId::TraceabilityProperties => ManagementTlvData::TraceabilityProperties {
                time_traceable: self.time_properties_ds.time_traceable,
                frequency_traceable: self.time_properties_ds.frequency_traceable,
            },
            ManagementId::TimescaleProperties => ManagementTlvData::TimescaleProperties {
                ptp_timescale: self.time_properties_ds.ptp_timescale,
                time_source: self.time_properties_ds.time_source,
            },
            ManagementId::UnicastNegotiationEnable => {
                ManagementTlvData::UnicastNegotiationEnable(self.unicast_negotiation_enabled)
            }
            ManagementId::DelayMechanism => {
                ManagementTlvData::DelayMechanism(match self.config.delay_mechanism {
                    DelayMechanism::E2E { .. } => 1,
                    DelayMechanism::P2P { .. } => 2,
                })
            }
            ManagementId::LogMinPdelayReqInterval => ManagementTlvData::LogMinPdelayReqInterval(
                self.config.delay_mechanism.interval().as_log_2(),
            ),
            ManagementId::Initialize | ManagementId::EnablePort | ManagementId::DisablePort => {
                return Err(ManagementErrorId::NotSupported)
            }
            ManagementId::Unknown(_) => return Err(ManagementErrorId::NoSuchId),
        };

        let _ = now;
        Ok((
            ManagementAction::Response,
            ManagementTlv::Management {
                management_id,
                data,
            },
        ))
    }

    fn management_set(
        &mut self,
        management_id: ManagementId,
        data: &ManagementTlvData,
    ) -> Result<(ManagementAction, ManagementTlv), ManagementErrorId> {
        match (management_id, data) {
            (ManagementId::Priority1, ManagementTlvData::Priority1(value)) => {
                self.default_ds.priority_1 = *value;
            }
            (ManagementId::Priority2, ManagementTlvData::Priority2(value)) => {
                self.default_ds.priority_2 = *value;
            }
            (ManagementId::Domain, ManagementTlvData::Domain(value)) => {
                self.default_ds.domain_number = *value;
            }
            (ManagementId::SlaveOnly, ManagementTlvData::SlaveOnly(value)) => {
                self.default_ds.slave_only = *value;
            }
            (
                ManagementId::LogAnnounceInterval,
                ManagementTlvData::LogAnnounceInterval(value),
            ) => {
                self.config.announce_interval = Interval::from_log_2(*value);
            }
            (
                ManagementId::AnnounceReceiptTimeout,
                ManagementTlvData::AnnounceReceiptTimeout(value),
            ) => {
                if *value < 2 {
                    return Err(ManagementErrorId::WrongValue);
                }
                self.config.announce_receipt_timeout = *value;
            }
            (ManagementId::LogSyncInterval, ManagementTlvData::LogSyncInterval(value)) => {
                self.config.sync_interval = Interval::from_log_2(*value);
            }
            (ManagementId::ClockAccuracy, ManagementTlvData::ClockAccuracy(value)) => {
                self.default_ds.clock_quality.clock_accuracy =
                    ClockAccuracy::from_primitive(*value);
            }
            (ManagementId::UserDescription, ManagementTlvData::UserDescription(text)) => {
                self.user_description = text.clone();
            }
            (
                ManagementId::UtcProperties,
                ManagementTlvData::UtcProperties {
                    current_utc_offset,
                    leap61,
                    leap59,
                    current_utc_offset_valid,
                },
            ) => {
                if *leap59 && *leap61 {
                    return Err(ManagementErrorId::WrongValue);
                }
                self.time_properties_ds.current_utc_offset =
                    current_utc_offset_valid.then_some(*current_utc_offset);
                self.time_properties_ds.leap_indicator = match (leap59, leap61) {
                    (true, false) => LeapIndicator::Leap59,
                    (false, true) => LeapIndicator::Leap61,
                    _ => LeapIndicator::NoLeap,
                };
            }
            (
                ManagementId::TraceabilityProperties,
                ManagementTlvData::TraceabilityProperties {
                    time_traceable,
                    frequency_traceable,
                },
            ) => {
                self.time_properties_ds.time_traceable = *time_traceable;
                self.time_properties_ds.frequency_traceable = *frequency_traceable;
            }
            (
                ManagementId::TimescaleProperties,
                ManagementTlvData::TimescaleProperties {
                    ptp_timescale,
                    time_source,
                },
            ) => {
                self.time_properties_ds.ptp_timescale = *ptp_timescale;
                self.time_properties_ds.time_source = *time_source;
            }
            (
                ManagementId::UnicastNegotiationEnable,
                ManagementTlvData::UnicastNegotiationEnable(value),
            ) => {
                self.unicast_negotiation_enabled = *value;
            }
            (ManagementId::Time, ManagementTlvData::Time(timestamp)) => {
                if self.clock.read_only() {
                    return Err(ManagementErrorId::NotSetable);
                }
                self.clock
                    .set_time(Time::from(*timestamp))
                    .map_err(|_| ManagementErrorId::GeneralError)?;
            }
            (ManagementId::Unknown(_), _) => return Err(ManagementErrorId::NoSuchId),
            // Recognized but either read-only or carrying a mismatched body
            (
                ManagementId::DefaultDataSet
                | ManagementId::CurrentDataSet
                | ManagementId::ParentDataSet
                | ManagementId::TimePropertiesDataSet
                | ManagementId::PortDataSet
                | ManagementId::ClockDescription
                | ManagementId::VersionNumber,
                _,
            ) => return Err(ManagementErrorId::NotSetable),
            _ => return Err(ManagementErrorId::NotSupported),
        }

        // A SET answers with the (new) current value
        self.management_get(management_id, Time::default())
    }

    fn management_command(
        &mut self,
        management_id: ManagementId,
        now: Time,
    ) -> Result<(ManagementAction, ManagementTlv), ManagementErrorId> {
        match management_id {
            ManagementId::NullManagement => {}
            ManagementId::EnablePort => {
                if matches!(self.port_state, PortState::Disabled) {
                    self.reinitialize(now);
                }
            }
            ManagementId::DisablePort => {
                self.set_state(PortState::Disabled, now);
                self.timers.stop_all();
            }
            ManagementId::Initialize => {
                self.reinitialize(now);
            }
            ManagementId::Unknown(_) => return Err(ManagementErrorId::NoSuchId),
            _ => return Err(ManagementErrorId::NotSupported),
        }

        Ok((
            ManagementAction::Acknowledge,
            ManagementTlv::Management {
                management_id,
                data: ManagementTlvData::Empty,
            },
        ))
    }

    fn clock_description(&self) -> ManagementTlvData {
        let mut product_description = PtpText::new();
        let _ = product_description.try_extend_from_slice(b"nanosync;2;ordinary clock");
        let mut revision_data = PtpText::new();
        let _ = revision_data.try_extend_from_slice(b";;2");
        let mut physical_layer_protocol = PtpText::new();
        let _ = physical_layer_protocol.try_extend_from_slice(b"IEEE 802.3");

        let mut physical_address = ArrayVec::new();
        let _ = physical_address.try_extend_from_slice(&self.default_ds.clock_identity.0[..6]);

        ManagementTlvData::ClockDescription {
            // Bit 0: an ordinary clock
            clock_type: 0x8000,
            physical_layer_protocol,
            physical_address: physical_address.clone(),
            // UDP/IPv4 by default; the daemon knows better but this is the
            // only honest value available here
            protocol_address_type: 1,
            protocol_address: physical_address,
            manufacturer_identity: [0xff, 0xff, 0xff],
            product_description,
            revision_data,
            user_description: self.user_description.clone(),
            profile_identity: [0x00, 0x1b, 0x19, 0x00, 0x01, 0x00],
        }
    }

    pub(super) fn reply_address(&self, header: &Header) -> Option<crate::config::TransportAddress> {
        if header.unicast_flag {
            self.last_packet_source
        } else {
            None
        }
    }
}
