use crate::datastructures::{common::WireTimestamp, WireFormat, WireFormatError};

/// The body of a DelayReq event message, *IEEE1588-2008 section 13.6*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayReqMessage {
    pub(crate) origin_timestamp: WireTimestamp,
}

impl DelayReqMessage {
    pub(crate) fn content_size(&self) -> usize {
        10
    }

    pub(crate) fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < 10 {
            return Err(WireFormatError::BufferTooShort);
        }

        self.origin_timestamp.serialize(&mut buffer[0..10])
    }

    pub(crate) fn deserialize_content(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self {
            origin_timestamp: WireTimestamp::deserialize(buffer)?,
        })
    }
}
