use crate::datastructures::{common::WireTimestamp, WireFormat, WireFormatError};

/// The body of a FollowUp message, *IEEE1588-2008 section 13.7*: the precise
/// egress timestamp of the matching two-step Sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpMessage {
    pub(crate) precise_origin_timestamp: WireTimestamp,
}

impl FollowUpMessage {
    pub(crate) fn content_size(&self) -> usize {
        10
    }

    pub(crate) fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < 10 {
            return Err(WireFormatError::BufferTooShort);
        }

        self.precise_origin_timestamp.serialize(&mut buffer[0..10])
    }

    pub(crate) fn deserialize_content(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self {
            precise_origin_timestamp: WireTimestamp::deserialize(buffer)?,
        })
    }
}
