//! PTP network messages and their wire codec

pub(crate) use announce::*;
pub(crate) use control_field::*;
pub(crate) use delay_req::*;
pub(crate) use delay_resp::*;
pub(crate) use follow_up::*;
pub use header::*;
pub use management::*;
pub(crate) use p_delay_req::*;
pub(crate) use p_delay_resp::*;
pub(crate) use p_delay_resp_follow_up::*;
pub use signaling::*;
pub(crate) use sync::*;

use super::{
    common::{PortIdentity, TimeInterval, TlvSet},
    datasets::{CurrentDS, DefaultDS, ParentDS, TimePropertiesDS},
    WireFormatError,
};
use crate::{
    datastructures::common::LeapIndicator,
    time::{Interval, Time},
};

mod announce;
mod control_field;
mod delay_req;
mod delay_resp;
mod follow_up;
mod header;
mod management;
mod p_delay_req;
mod p_delay_resp;
mod p_delay_resp_follow_up;
mod signaling;
mod sync;

/// Maximum length of a packet
///
/// Can be used to preallocate buffers that always fit messages sent by
/// `nanosync`.
pub const MAX_DATA_LEN: usize = 1024;

/// The PTP message types, *IEEE1588-2008 table 19*
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[allow(missing_docs)] // the names are the documentation
pub enum MessageType {
    Sync = 0x0,
    DelayReq = 0x1,
    PDelayReq = 0x2,
    PDelayResp = 0x3,
    FollowUp = 0x8,
    DelayResp = 0x9,
    PDelayRespFollowUp = 0xa,
    Announce = 0xb,
    Signaling = 0xc,
    Management = 0xd,
}

/// Error returned when a raw value falls outside an enumeration
pub struct EnumConversionError;

impl TryFrom<u8> for MessageType {
    type Error = EnumConversionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;

        match value {
            0x0 => Ok(Sync),
            0x1 => Ok(DelayReq),
            0x2 => Ok(PDelayReq),
            0x3 => Ok(PDelayResp),
            0x8 => Ok(FollowUp),
            0x9 => Ok(DelayResp),
            0xa => Ok(PDelayRespFollowUp),
            0xb => Ok(Announce),
            0xc => Ok(Signaling),
            0xd => Ok(Management),
            _ => Err(EnumConversionError),
        }
    }
}

/// A complete PTP message: common header, type specific body and the TLV
/// suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message<'a> {
    pub(crate) header: Header,
    pub(crate) body: MessageBody,
    pub(crate) suffix: TlvSet<'a>,
}

/// The type specific part of a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MessageBody {
    Sync(SyncMessage),
    DelayReq(DelayReqMessage),
    PDelayReq(PDelayReqMessage),
    PDelayResp(PDelayRespMessage),
    FollowUp(FollowUpMessage),
    DelayResp(DelayRespMessage),
    PDelayRespFollowUp(PDelayRespFollowUpMessage),
    Announce(AnnounceMessage),
    Signaling(SignalingMessage),
    Management(ManagementMessage),
}

impl MessageBody {
    pub(crate) fn wire_size(&self) -> usize {
        match &self {
            MessageBody::Sync(m) => m.content_size(),
            MessageBody::DelayReq(m) => m.content_size(),
            MessageBody::PDelayReq(m) => m.content_size(),
            MessageBody::PDelayResp(m) => m.content_size(),
            MessageBody::FollowUp(m) => m.content_size(),
            MessageBody::DelayResp(m) => m.content_size(),
            MessageBody::PDelayRespFollowUp(m) => m.content_size(),
            MessageBody::Announce(m) => m.content_size(),
            MessageBody::Signaling(m) => m.content_size(),
            MessageBody::Management(m) => m.content_size(),
        }
    }

    pub(crate) fn content_type(&self) -> MessageType {
        match self {
            MessageBody::Sync(_) => MessageType::Sync,
            MessageBody::DelayReq(_) => MessageType::DelayReq,
            MessageBody::PDelayReq(_) => MessageType::PDelayReq,
            MessageBody::PDelayResp(_) => MessageType::PDelayResp,
            MessageBody::FollowUp(_) => MessageType::FollowUp,
            MessageBody::DelayResp(_) => MessageType::DelayResp,
            MessageBody::PDelayRespFollowUp(_) => MessageType::PDelayRespFollowUp,
            MessageBody::Announce(_) => MessageType::Announce,
            MessageBody::Signaling(_) => MessageType::Signaling,
            MessageBody::Management(_) => MessageType::Management,
        }
    }

    pub(crate) fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        match &self {
            MessageBody::Sync(m) => m.serialize_content(buffer)?,
            MessageBody::DelayReq(m) => m.serialize_content(buffer)?,
            MessageBody::PDelayReq(m) => m.serialize_content(buffer)?,
            MessageBody::PDelayResp(m) => m.serialize_content(buffer)?,
            MessageBody::FollowUp(m) => m.serialize_content(buffer)?,
            MessageBody::DelayResp(m) => m.serialize_content(buffer)?,
            MessageBody::PDelayRespFollowUp(m) => m.serialize_content(buffer)?,
            MessageBody::Announce(m) => m.serialize_content(buffer)?,
            MessageBody::Signaling(m) => m.serialize_content(buffer)?,
            MessageBody::Management(m) => m.serialize_content(buffer)?,
        }

        Ok(self.wire_size())
    }

    pub(crate) fn deserialize(
        message_type: MessageType,
        header: &Header,
        buffer: &[u8],
    ) -> Result<Self, WireFormatError> {
        let body = match message_type {
            MessageType::Sync => MessageBody::Sync(SyncMessage::deserialize_content(buffer)?),
            MessageType::DelayReq => {
                MessageBody::DelayReq(DelayReqMessage::deserialize_content(buffer)?)
            }
            MessageType::PDelayReq => {
                MessageBody::PDelayReq(PDelayReqMessage::deserialize_content(buffer)?)
            }
            MessageType::PDelayResp => {
                MessageBody::PDelayResp(PDelayRespMessage::deserialize_content(buffer)?)
            }
            MessageType::FollowUp => {
                MessageBody::FollowUp(FollowUpMessage::deserialize_content(buffer)?)
            }
            MessageType::DelayResp => {
                MessageBody::DelayResp(DelayRespMessage::deserialize_content(buffer)?)
            }
            MessageType::PDelayRespFollowUp => MessageBody::PDelayRespFollowUp(
                PDelayRespFollowUpMessage::deserialize_content(buffer)?,
            ),
            MessageType::Announce => {
                MessageBody::Announce(AnnounceMessage::deserialize_content(*header, buffer)?)
            }
            MessageType::Signaling => {
                MessageBody::Signaling(SignalingMessage::deserialize_content(buffer)?)
            }
            MessageType::Management => {
                MessageBody::Management(ManagementMessage::deserialize_content(buffer)?)
            }
        };

        Ok(body)
    }
}

fn base_header(default_ds: &DefaultDS, port_identity: PortIdentity, sequence_id: u16) -> Header {
    Header {
        domain_number: default_ds.domain_number,
        source_port_identity: port_identity,
        sequence_id,
        ..Default::default()
    }
}

impl<'a> Message<'a> {
    pub(crate) fn is_event(&self) -> bool {
        use MessageBody::*;
        match self.body {
            Sync(_) | DelayReq(_) | PDelayReq(_) | PDelayResp(_) => true,
            FollowUp(_)
            | DelayResp(_)
            | PDelayRespFollowUp(_)
            | Announce(_)
            | Signaling(_)
            | Management(_) => false,
        }
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn sync(
        default_ds: &DefaultDS,
        port_identity: PortIdentity,
        sequence_id: u16,
        sync_interval: Interval,
    ) -> Self {
        let header = Header {
            two_step_flag: default_ds.two_step,
            log_message_interval: sync_interval.as_log_2(),
            ..base_header(default_ds, port_identity, sequence_id)
        };

        Message {
            header,
            body: MessageBody::Sync(SyncMessage {
                origin_timestamp: Default::default(),
            }),
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn follow_up(
        default_ds: &DefaultDS,
        port_identity: PortIdentity,
        sequence_id: u16,
        timestamp: Time,
    ) -> Self {
        let header = Header {
            correction_field: timestamp.subnano(),
            ..base_header(default_ds, port_identity, sequence_id)
        };

        Message {
            header,
            body: MessageBody::FollowUp(FollowUpMessage {
                precise_origin_timestamp: timestamp.into(),
            }),
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn announce(
        default_ds: &DefaultDS,
        parent_ds: &ParentDS,
        current_ds: &CurrentDS,
        time_properties_ds: &TimePropertiesDS,
        port_identity: PortIdentity,
        sequence_id: u16,
        announce_interval: Interval,
    ) -> Self {
        let header = Header {
            leap59: time_properties_ds.leap_indicator == LeapIndicator::Leap59,
            leap61: time_properties_ds.leap_indicator == LeapIndicator::Leap61,
            current_utc_offset_valid: time_properties_ds.current_utc_offset.is_some(),
            ptp_timescale: time_properties_ds.ptp_timescale,
            time_traceable: time_properties_ds.time_traceable,
            frequency_traceable: time_properties_ds.frequency_traceable,
            log_message_interval: announce_interval.as_log_2(),
            ..base_header(default_ds, port_identity, sequence_id)
        };

        let body = MessageBody::Announce(AnnounceMessage {
            header,
            origin_timestamp: Default::default(),
            current_utc_offset: time_properties_ds.current_utc_offset.unwrap_or_default(),
            grandmaster_priority_1: parent_ds.grandmaster_priority_1,
            grandmaster_clock_quality: parent_ds.grandmaster_clock_quality,
            grandmaster_priority_2: parent_ds.grandmaster_priority_2,
            grandmaster_identity: parent_ds.grandmaster_identity,
            steps_removed: current_ds.steps_removed,
            time_source: time_properties_ds.time_source,
        });

        Message {
            header,
            body,
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn delay_req(
        default_ds: &DefaultDS,
        port_identity: PortIdentity,
        sequence_id: u16,
    ) -> Self {
        let header = Header {
            log_message_interval: 0x7f,
            ..base_header(default_ds, port_identity, sequence_id)
        };

        Message {
            header,
            body: MessageBody::DelayReq(DelayReqMessage {
                origin_timestamp: Default::default(),
            }),
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn delay_resp(
        request_header: Header,
        port_identity: PortIdentity,
        min_delay_req_interval: Interval,
        timestamp: Time,
    ) -> Self {
        let header = Header {
            two_step_flag: false,
            source_port_identity: port_identity,
            correction_field: TimeInterval(
                request_header.correction_field.0 + timestamp.subnano().0,
            ),
            log_message_interval: min_delay_req_interval.as_log_2(),
            ..request_header
        };

        let body = MessageBody::DelayResp(DelayRespMessage {
            receive_timestamp: timestamp.into(),
            requesting_port_identity: request_header.source_port_identity,
        });

        Message {
            header,
            body,
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn pdelay_req(
        default_ds: &DefaultDS,
        port_identity: PortIdentity,
        sequence_id: u16,
    ) -> Self {
        let header = Header {
            log_message_interval: 0x7f,
            ..base_header(default_ds, port_identity, sequence_id)
        };

        Message {
            header,
            body: MessageBody::PDelayReq(PDelayReqMessage {
                origin_timestamp: Default::default(),
            }),
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn pdelay_resp(
        request_header: Header,
        port_identity: PortIdentity,
        timestamp: Time,
    ) -> Self {
        let header = Header {
            two_step_flag: true,
            source_port_identity: port_identity,
            correction_field: request_header.correction_field,
            log_message_interval: 0x7f,
            ..request_header
        };

        let body = MessageBody::PDelayResp(PDelayRespMessage {
            request_receive_timestamp: timestamp.into(),
            requesting_port_identity: request_header.source_port_identity,
        });

        Message {
            header,
            body,
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn pdelay_resp_follow_up(
        request_header: Header,
        port_identity: PortIdentity,
        timestamp: Time,
    ) -> Self {
        let header = Header {
            two_step_flag: false,
            source_port_identity: port_identity,
            correction_field: timestamp.subnano(),
            log_message_interval: 0x7f,
            ..request_header
        };

        let body = MessageBody::PDelayRespFollowUp(PDelayRespFollowUpMessage {
            response_origin_timestamp: timestamp.into(),
            requesting_port_identity: request_header.source_port_identity,
        });

        Message {
            header,
            body,
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn signaling(
        default_ds: &DefaultDS,
        port_identity: PortIdentity,
        target_port_identity: PortIdentity,
        sequence_id: u16,
        tlvs: arrayvec::ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS>,
    ) -> Self {
        let header = Header {
            unicast_flag: true,
            ..base_header(default_ds, port_identity, sequence_id)
        };

        Message {
            header,
            body: MessageBody::Signaling(SignalingMessage {
                target_port_identity,
                tlvs,
            }),
            suffix: TlvSet::default(),
        }
    }

    pub(crate) fn management_response(
        request_header: Header,
        port_identity: PortIdentity,
        request: &ManagementMessage,
        action: ManagementAction,
        management_tlv: ManagementTlv,
    ) -> Self {
        let header = Header {
            source_port_identity: port_identity,
            ..request_header
        };

        let body = MessageBody::Management(ManagementMessage {
            target_port_identity: request_header.source_port_identity,
            starting_boundary_hops: request.starting_boundary_hops,
            boundary_hops: request.starting_boundary_hops,
            action,
            management_tlv,
        });

        Message {
            header,
            body,
            suffix: TlvSet::default(),
        }
    }

    /// The byte size on the wire of this message
    pub(crate) fn wire_size(&self) -> usize {
        self.header.wire_size() + self.body.wire_size() + self.suffix.wire_size()
    }

    /// Serializes the message into the PTP wire format.
    ///
    /// Returns the used buffer length.
    pub(crate) fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        if buffer.len() < self.wire_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        let (header, rest) = buffer.split_at_mut(Header::WIRE_SIZE);
        let (body, tlv) = rest.split_at_mut(self.body.wire_size());

        self.header.serialize_header(
            self.body.content_type(),
            self.body.wire_size() + self.suffix.wire_size(),
            header,
        )?;
        self.body.serialize(body)?;
        self.suffix.serialize(tlv)?;

        Ok(self.wire_size())
    }

    /// Deserializes a message from the PTP wire format.
    pub(crate) fn deserialize(buffer: &'a [u8]) -> Result<Self, WireFormatError> {
        let header_data = Header::deserialize_header(buffer)?;

        if (header_data.message_length as usize) < Header::WIRE_SIZE {
            return Err(WireFormatError::Invalid);
        }

        // Check we have the whole message and ignore potential padding
        let content_buffer = buffer
            .get(Header::WIRE_SIZE..header_data.message_length as usize)
            .ok_or(WireFormatError::BufferTooShort)?;

        let body = MessageBody::deserialize(
            header_data.message_type,
            &header_data.header,
            content_buffer,
        )?;

        let tlv_buffer = content_buffer
            .get(body.wire_size()..)
            .ok_or(WireFormatError::BufferTooShort)?;
        let suffix = TlvSet::deserialize(tlv_buffer)?;

        Ok(Message {
            header: header_data.header,
            body,
            suffix,
        })
    }
}

#[cfg(test)]
mod tests {
    use arrayvec::ArrayVec;

    use super::*;
    use crate::{config::InstanceConfig, datastructures::common::ClockIdentity};

    fn test_default_ds() -> DefaultDS {
        DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([1, 2, 3, 4, 5, 6, 7, 8]),
            ..Default::default()
        })
    }

    fn round_trip(message: Message) {
        let mut buffer = [0; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();
        assert_eq!(len, message.wire_size());

        let parsed = Message::deserialize(&buffer[..len]).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn message_length_matches_packed_size() {
        let default_ds = test_default_ds();
        let message = Message::sync(&default_ds, Default::default(), 5, Interval::ONE_SECOND);

        let mut buffer = [0; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();
        let wire_length = u16::from_be_bytes(buffer[2..4].try_into().unwrap());
        assert_eq!(wire_length as usize, len);
    }

    #[test]
    fn every_message_type_round_trips() {
        let default_ds = test_default_ds();
        let parent_ds = ParentDS::new(default_ds);
        let port_identity = PortIdentity {
            clock_identity: default_ds.clock_identity,
            port_number: 1,
        };
        let timestamp = Time::from_secs(100) + crate::time::Duration::from_nanos(17);

        round_trip(Message::sync(
            &default_ds,
            port_identity,
            1,
            Interval::ONE_SECOND,
        ));
        round_trip(Message::follow_up(&default_ds, port_identity, 1, timestamp));
        round_trip(Message::announce(
            &default_ds,
            &parent_ds,
            &CurrentDS::default(),
            &TimePropertiesDS::default(),
            port_identity,
            2,
            Interval::TWO_SECONDS,
        ));
        round_trip(Message::delay_req(&default_ds, port_identity, 3));

        let request = Message::delay_req(&default_ds, port_identity, 3);
        round_trip(Message::delay_resp(
            *request.header(),
            port_identity,
            Interval::ONE_SECOND,
            timestamp,
        ));

        round_trip(Message::pdelay_req(&default_ds, port_identity, 4));
        let request = Message::pdelay_req(&default_ds, port_identity, 4);
        round_trip(Message::pdelay_resp(
            *request.header(),
            port_identity,
            timestamp,
        ));
        round_trip(Message::pdelay_resp_follow_up(
            *request.header(),
            port_identity,
            timestamp,
        ));

        let mut tlvs = ArrayVec::new();
        tlvs.push(SignalingTlv::RequestUnicast {
            message_type: MessageType::Announce,
            log_interval: 1,
            duration: 300,
        });
        round_trip(Message::signaling(
            &default_ds,
            port_identity,
            PortIdentity::ALL_ONES,
            5,
            tlvs,
        ));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let default_ds = test_default_ds();
        let message = Message::sync(&default_ds, Default::default(), 1, Interval::ONE_SECOND);

        let mut buffer = [0; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();

        assert!(Message::deserialize(&buffer[..len - 1]).is_err());
    }
}
