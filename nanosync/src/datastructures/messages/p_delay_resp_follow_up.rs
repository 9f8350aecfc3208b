use crate::datastructures::{
    common::{PortIdentity, WireTimestamp},
    WireFormat, WireFormatError,
};

/// The body of a PdelayRespFollowUp message, *IEEE1588-2008 section 13.11*:
/// the precise egress timestamp of the matching two-step PdelayResp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PDelayRespFollowUpMessage {
    pub(crate) response_origin_timestamp: WireTimestamp,
    pub(crate) requesting_port_identity: PortIdentity,
}

impl PDelayRespFollowUpMessage {
    pub(crate) fn content_size(&self) -> usize {
        20
    }

    pub(crate) fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < 20 {
            return Err(WireFormatError::BufferTooShort);
        }

        self.response_origin_timestamp
            .serialize(&mut buffer[0..10])?;
        self.requesting_port_identity
            .serialize(&mut buffer[10..20])?;

        Ok(())
    }

    pub(crate) fn deserialize_content(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 20 {
            return Err(WireFormatError::BufferTooShort);
        }

        Ok(Self {
            response_origin_timestamp: WireTimestamp::deserialize(&buffer[0..10])?,
            requesting_port_identity: PortIdentity::deserialize(&buffer[10..20])?,
        })
    }
}
