use arrayvec::ArrayVec;

use super::MessageType;
use crate::datastructures::{
    common::{PortIdentity, TlvType},
    WireFormat, WireFormatError,
};

/// Upper bound of negotiation TLVs carried in one signaling message.
/// One request per negotiable message type fits comfortably.
pub(crate) const MAX_SIGNALING_TLVS: usize = 4;

/// A unicast negotiation TLV, *IEEE1588-2008 section 16.1*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingTlv {
    /// Ask a master to transmit `message_type` every `2^log_interval`
    /// seconds for `duration` seconds
    RequestUnicast {
        /// The negotiated message type
        message_type: MessageType,
        /// Log2 seconds between messages
        log_interval: i8,
        /// Seconds the grant should last
        duration: u32,
    },
    /// A master's answer; a zero duration denies the request
    GrantUnicast {
        /// The negotiated message type
        message_type: MessageType,
        /// Log2 seconds between messages
        log_interval: i8,
        /// Seconds the grant lasts; zero denies
        duration: u32,
        /// Whether the grantor is willing to renew
        renewal_invited: bool,
    },
    /// Stop transmission of `message_type` under an earlier grant
    CancelUnicast {
        /// The canceled message type
        message_type: MessageType,
    },
    /// Confirmation of a received cancel
    AckCancelUnicast {
        /// The canceled message type
        message_type: MessageType,
    },
}

impl SignalingTlv {
    fn wire_size(&self) -> usize {
        match self {
            SignalingTlv::RequestUnicast { .. } => 4 + 6,
            SignalingTlv::GrantUnicast { .. } => 4 + 8,
            SignalingTlv::CancelUnicast { .. } | SignalingTlv::AckCancelUnicast { .. } => 4 + 2,
        }
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.wire_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        let (tlv_type, length) = match self {
            SignalingTlv::RequestUnicast { .. } => (TlvType::RequestUnicastTransmission, 6u16),
            SignalingTlv::GrantUnicast { .. } => (TlvType::GrantUnicastTransmission, 8),
            SignalingTlv::CancelUnicast { .. } => (TlvType::CancelUnicastTransmission, 2),
            SignalingTlv::AckCancelUnicast { .. } => {
                (TlvType::AcknowledgeCancelUnicastTransmission, 2)
            }
        };

        buffer[0..2].copy_from_slice(&tlv_type.to_primitive().to_be_bytes());
        buffer[2..4].copy_from_slice(&length.to_be_bytes());

        match *self {
            SignalingTlv::RequestUnicast {
                message_type,
                log_interval,
                duration,
            } => {
                buffer[4] = (message_type as u8) << 4;
                buffer[5] = log_interval as u8;
                buffer[6..10].copy_from_slice(&duration.to_be_bytes());
            }
            SignalingTlv::GrantUnicast {
                message_type,
                log_interval,
                duration,
                renewal_invited,
            } => {
                buffer[4] = (message_type as u8) << 4;
                buffer[5] = log_interval as u8;
                buffer[6..10].copy_from_slice(&duration.to_be_bytes());
                buffer[10] = 0;
                buffer[11] = renewal_invited as u8;
            }
            SignalingTlv::CancelUnicast { message_type }
            | SignalingTlv::AckCancelUnicast { message_type } => {
                buffer[4] = (message_type as u8) << 4;
                buffer[5] = 0;
            }
        }

        Ok(())
    }

    fn message_type_from(raw: u8) -> Result<MessageType, WireFormatError> {
        MessageType::try_from(raw >> 4).map_err(|_| WireFormatError::EnumConversionError)
    }

    fn deserialize(tlv_type: TlvType, value: &[u8]) -> Result<Option<Self>, WireFormatError> {
        match tlv_type {
            TlvType::RequestUnicastTransmission => {
                if value.len() < 6 {
                    return Err(WireFormatError::BufferTooShort);
                }
                Ok(Some(SignalingTlv::RequestUnicast {
                    message_type: Self::message_type_from(value[0])?,
                    log_interval: value[1] as i8,
                    duration: u32::from_be_bytes(value[2..6].try_into().unwrap()),
                }))
            }
            TlvType::GrantUnicastTransmission => {
                if value.len() < 8 {
                    return Err(WireFormatError::BufferTooShort);
                }
                Ok(Some(SignalingTlv::GrantUnicast {
                    message_type: Self::message_type_from(value[0])?,
                    log_interval: value[1] as i8,
                    duration: u32::from_be_bytes(value[2..6].try_into().unwrap()),
                    renewal_invited: value[7] & 0x01 > 0,
                }))
            }
            TlvType::CancelUnicastTransmission => {
                if value.len() < 2 {
                    return Err(WireFormatError::BufferTooShort);
                }
                Ok(Some(SignalingTlv::CancelUnicast {
                    message_type: Self::message_type_from(value[0])?,
                }))
            }
            TlvType::AcknowledgeCancelUnicastTransmission => {
                if value.len() < 2 {
                    return Err(WireFormatError::BufferTooShort);
                }
                Ok(Some(SignalingTlv::AckCancelUnicast {
                    message_type: Self::message_type_from(value[0])?,
                }))
            }
            // Anything else is skipped over, not an error
            _ => Ok(None),
        }
    }
}

/// The body of a Signaling message, *IEEE1588-2008 section 13.12*: a target
/// port identity followed by negotiation TLVs. TLVs this implementation does
/// not interpret are skipped on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub(crate) target_port_identity: PortIdentity,
    pub(crate) tlvs: ArrayVec<SignalingTlv, MAX_SIGNALING_TLVS>,
}

impl SignalingMessage {
    pub(crate) fn content_size(&self) -> usize {
        10 + self.tlvs.iter().map(|t| t.wire_size()).sum::<usize>()
    }

    pub(crate) fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.content_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        self.target_port_identity.serialize(&mut buffer[0..10])?;

        let mut offset = 10;
        for tlv in &self.tlvs {
            tlv.serialize(&mut buffer[offset..])?;
            offset += tlv.wire_size();
        }

        Ok(())
    }

    pub(crate) fn deserialize_content(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 10 {
            return Err(WireFormatError::BufferTooShort);
        }

        let target_port_identity = PortIdentity::deserialize(&buffer[0..10])?;

        let mut tlvs = ArrayVec::new();
        let mut remaining = &buffer[10..];
        while remaining.len() >= 4 {
            let tlv_type =
                TlvType::from_primitive(u16::from_be_bytes(remaining[0..2].try_into().unwrap()));
            let length = u16::from_be_bytes(remaining[2..4].try_into().unwrap()) as usize;
            let value = remaining
                .get(4..4 + length)
                .ok_or(WireFormatError::BufferTooShort)?;

            if let Some(tlv) = SignalingTlv::deserialize(tlv_type, value)? {
                // Overlong TLV chains beyond our capacity are ignored
                let _ = tlvs.try_push(tlv);
            }

            remaining = &remaining[4 + length..];
        }

        Ok(Self {
            target_port_identity,
            tlvs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_grant_round_trip() {
        let mut tlvs = ArrayVec::new();
        tlvs.push(SignalingTlv::RequestUnicast {
            message_type: MessageType::Sync,
            log_interval: 0,
            duration: 60,
        });
        tlvs.push(SignalingTlv::GrantUnicast {
            message_type: MessageType::Announce,
            log_interval: 1,
            duration: 300,
            renewal_invited: true,
        });
        tlvs.push(SignalingTlv::CancelUnicast {
            message_type: MessageType::DelayResp,
        });
        tlvs.push(SignalingTlv::AckCancelUnicast {
            message_type: MessageType::DelayResp,
        });

        let message = SignalingMessage {
            target_port_identity: PortIdentity::ALL_ONES,
            tlvs,
        };

        let mut buffer = [0; 128];
        message.serialize_content(&mut buffer).unwrap();
        let parsed =
            SignalingMessage::deserialize_content(&buffer[..message.content_size()]).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn unknown_tlv_is_skipped() {
        let mut buffer = [0xff; 20];
        // wildcard target, then one unknown TLV of length 2
        buffer[10..14].copy_from_slice(&[0x7f, 0x00, 0x00, 0x02]);

        let parsed = SignalingMessage::deserialize_content(&buffer[..16]).unwrap();
        assert!(parsed.tlvs.is_empty());
    }

    #[test]
    fn truncated_tlv_is_rejected() {
        let mut buffer = [0u8; 15];
        buffer[10..14].copy_from_slice(&[0x00, 0x04, 0x00, 0x06]);

        assert_eq!(
            SignalingMessage::deserialize_content(&buffer).unwrap_err(),
            WireFormatError::BufferTooShort,
        );
    }
}
