use super::{ControlField, MessageType};
use crate::datastructures::{
    common::{PortIdentity, TimeInterval},
    WireFormat, WireFormatError,
};

/// The common 34-octet header at the start of every PTP message,
/// *IEEE1588-2008 section 13.3*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The transportSpecific nibble sharing octet 0 with the message type
    pub transport_specific: u8,
    /// The domain this message belongs to
    pub domain_number: u8,
    /// The alternateMasterFlag
    pub alternate_master_flag: bool,
    /// Whether the sender sends separate FollowUp event timestamps
    pub two_step_flag: bool,
    /// Whether this message was sent to a unicast address
    pub unicast_flag: bool,
    /// Profile specific flag 1
    pub profile_specific_1: bool,
    /// Profile specific flag 2
    pub profile_specific_2: bool,
    /// Announced: last minute of the UTC day has 61 seconds
    pub leap61: bool,
    /// Announced: last minute of the UTC day has 59 seconds
    pub leap59: bool,
    /// Whether the announced UTC offset may be trusted
    pub current_utc_offset_valid: bool,
    /// Whether the timescale is PTP (TAI)
    pub ptp_timescale: bool,
    /// Whether time is traceable to a primary reference
    pub time_traceable: bool,
    /// Whether frequency is traceable to a primary reference
    pub frequency_traceable: bool,
    /// Residence/asymmetry correction in scaled nanoseconds
    pub correction_field: TimeInterval,
    /// Identity of the sending port
    pub source_port_identity: PortIdentity,
    /// Per message type sequence counter of the sender
    pub sequence_id: u16,
    /// The log2 pacing of this message type at the sender
    pub log_message_interval: i8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            transport_specific: 0,
            domain_number: 0,
            alternate_master_flag: false,
            two_step_flag: false,
            unicast_flag: false,
            profile_specific_1: false,
            profile_specific_2: false,
            leap61: false,
            leap59: false,
            current_utc_offset_valid: false,
            ptp_timescale: false,
            time_traceable: false,
            frequency_traceable: false,
            correction_field: TimeInterval::default(),
            source_port_identity: PortIdentity::default(),
            sequence_id: 0,
            log_message_interval: 0x7f,
        }
    }
}

/// The fields of a parsed header that do not live in [`Header`] itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeserializedHeader {
    pub(crate) header: Header,
    pub(crate) message_type: MessageType,
    pub(crate) message_length: u16,
}

impl Header {
    pub(crate) const WIRE_SIZE: usize = 34;

    pub(crate) fn wire_size(&self) -> usize {
        Self::WIRE_SIZE
    }

    pub(crate) fn serialize_header(
        &self,
        content_type: MessageType,
        content_length: usize,
        buffer: &mut [u8],
    ) -> Result<(), WireFormatError> {
        buffer[0] = (self.transport_specific << 4) | ((content_type as u8) & 0x0f);
        buffer[1] = 0x02;
        buffer[2..4].copy_from_slice(&((Self::WIRE_SIZE + content_length) as u16).to_be_bytes());
        buffer[4] = self.domain_number;
        buffer[5] = 0;
        buffer[6] = 0;
        buffer[7] = 0;

        if self.alternate_master_flag {
            buffer[6] |= 1 << 0;
        }
        if self.two_step_flag {
            buffer[6] |= 1 << 1;
        }
        if self.unicast_flag {
            buffer[6] |= 1 << 2;
        }
        if self.profile_specific_1 {
            buffer[6] |= 1 << 5;
        }
        if self.profile_specific_2 {
            buffer[6] |= 1 << 6;
        }
        if self.leap61 {
            buffer[7] |= 1 << 0;
        }
        if self.leap59 {
            buffer[7] |= 1 << 1;
        }
        if self.current_utc_offset_valid {
            buffer[7] |= 1 << 2;
        }
        if self.ptp_timescale {
            buffer[7] |= 1 << 3;
        }
        if self.time_traceable {
            buffer[7] |= 1 << 4;
        }
        if self.frequency_traceable {
            buffer[7] |= 1 << 5;
        }

        self.correction_field.serialize(&mut buffer[8..16])?;
        buffer[16..20].copy_from_slice(&[0, 0, 0, 0]);
        self.source_port_identity.serialize(&mut buffer[20..30])?;
        buffer[30..32].copy_from_slice(&self.sequence_id.to_be_bytes());
        buffer[32] = ControlField::from(content_type).to_primitive();
        buffer[33] = self.log_message_interval as u8;

        Ok(())
    }

    pub(crate) fn deserialize_header(buffer: &[u8]) -> Result<DeserializedHeader, WireFormatError> {
        if buffer.len() < Self::WIRE_SIZE {
            return Err(WireFormatError::BufferTooShort);
        }

        if buffer[1] & 0x0f != 2 {
            return Err(WireFormatError::UnsupportedVersion);
        }

        let leap61 = buffer[7] & (1 << 0) > 0;
        let leap59 = buffer[7] & (1 << 1) > 0;
        if leap59 && leap61 {
            // Mutually exclusive by definition
            return Err(WireFormatError::Invalid);
        }

        Ok(DeserializedHeader {
            header: Self {
                transport_specific: buffer[0] >> 4,
                domain_number: buffer[4],
                alternate_master_flag: buffer[6] & (1 << 0) > 0,
                two_step_flag: buffer[6] & (1 << 1) > 0,
                unicast_flag: buffer[6] & (1 << 2) > 0,
                profile_specific_1: buffer[6] & (1 << 5) > 0,
                profile_specific_2: buffer[6] & (1 << 6) > 0,
                leap61,
                leap59,
                current_utc_offset_valid: buffer[7] & (1 << 2) > 0,
                ptp_timescale: buffer[7] & (1 << 3) > 0,
                time_traceable: buffer[7] & (1 << 4) > 0,
                frequency_traceable: buffer[7] & (1 << 5) > 0,
                correction_field: TimeInterval::deserialize(&buffer[8..16])?,
                source_port_identity: PortIdentity::deserialize(&buffer[20..30])?,
                sequence_id: u16::from_be_bytes(buffer[30..32].try_into().unwrap()),
                log_message_interval: buffer[33] as i8,
            },
            message_type: MessageType::try_from(buffer[0] & 0x0f)
                .map_err(|_| WireFormatError::EnumConversionError)?,
            message_length: u16::from_be_bytes(buffer[2..4].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use fixed::types::I48F16;

    use super::*;
    use crate::datastructures::common::ClockIdentity;

    #[test]
    fn header_wireformat() {
        let mut representation = [0; 34];
        representation[0] = 0x59;
        representation[1] = 0x02;
        representation[2..4].copy_from_slice(&44u16.to_be_bytes());
        representation[4] = 0x01;
        representation[6] = 1 << 1;
        representation[7] = (1 << 1) | (1 << 3);
        representation[8..16].copy_from_slice(&[0, 0, 0, 0, 0, 1, 0x80, 0]);
        representation[20..30]
            .copy_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7, 0x15, 0xb3]);
        representation[30..32].copy_from_slice(&0x5555u16.to_be_bytes());
        representation[32] = 0x03;
        representation[33] = 0x05;

        let object_representation = Header {
            transport_specific: 5,
            domain_number: 1,
            two_step_flag: true,
            leap59: true,
            ptp_timescale: true,
            correction_field: TimeInterval(I48F16::from_num(1.5f64)),
            source_port_identity: PortIdentity {
                clock_identity: ClockIdentity([0, 1, 2, 3, 4, 5, 6, 7]),
                port_number: 5555,
            },
            sequence_id: 0x5555,
            log_message_interval: 5,
            ..Default::default()
        };

        let mut buffer = [0; 34];
        object_representation
            .serialize_header(MessageType::DelayResp, 10, &mut buffer)
            .unwrap();
        assert_eq!(buffer, representation);

        let parsed = Header::deserialize_header(&representation).unwrap();
        assert_eq!(parsed.header, object_representation);
        assert_eq!(parsed.message_type, MessageType::DelayResp);
        assert_eq!(parsed.message_length, 44);
    }

    #[test]
    fn version_check() {
        let mut buffer = [0; 34];
        Header::default()
            .serialize_header(MessageType::Sync, 10, &mut buffer)
            .unwrap();
        buffer[1] = 0x01;

        assert_eq!(
            Header::deserialize_header(&buffer).unwrap_err(),
            WireFormatError::UnsupportedVersion
        );
    }

    #[test]
    fn simultaneous_leap_flags_rejected() {
        let mut buffer = [0; 34];
        Header::default()
            .serialize_header(MessageType::Announce, 30, &mut buffer)
            .unwrap();
        buffer[7] |= 0b11;

        assert_eq!(
            Header::deserialize_header(&buffer).unwrap_err(),
            WireFormatError::Invalid
        );
    }
}
