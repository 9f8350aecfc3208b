use super::MessageType;

/// The legacy controlField of the common header, *IEEE1588-2008 table 23*.
/// Kept purely for hardware compatibility; receivers dispatch on the
/// message type nibble instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ControlField {
    Sync,
    DelayReq,
    FollowUp,
    DelayResp,
    Management,
    #[default]
    AllOthers,
}

impl ControlField {
    pub(crate) fn to_primitive(self) -> u8 {
        match self {
            ControlField::Sync => 0x00,
            ControlField::DelayReq => 0x01,
            ControlField::FollowUp => 0x02,
            ControlField::DelayResp => 0x03,
            ControlField::Management => 0x04,
            ControlField::AllOthers => 0x05,
        }
    }
}

impl From<MessageType> for ControlField {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Sync => ControlField::Sync,
            MessageType::DelayReq => ControlField::DelayReq,
            MessageType::FollowUp => ControlField::FollowUp,
            MessageType::DelayResp => ControlField::DelayResp,
            MessageType::Management => ControlField::Management,
            MessageType::PDelayReq
            | MessageType::PDelayResp
            | MessageType::PDelayRespFollowUp
            | MessageType::Announce
            | MessageType::Signaling => ControlField::AllOthers,
        }
    }
}
