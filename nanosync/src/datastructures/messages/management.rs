use arrayvec::ArrayVec;

use crate::datastructures::{
    common::{ClockIdentity, ClockQuality, PortIdentity, TimeInterval, TimeSource, TlvType,
        WireTimestamp},
    datasets::PortDS,
    WireFormat, WireFormatError,
};

/// The management actionField, *IEEE1588-2008 table 38*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementAction {
    /// Read a data set or member
    Get,
    /// Write a data set member
    Set,
    /// Answer to a Get or Set
    Response,
    /// Trigger an event
    Command,
    /// Answer to a Command
    Acknowledge,
    /// A reserved action value
    Reserved(u8),
}

impl ManagementAction {
    fn to_primitive(self) -> u8 {
        match self {
            Self::Get => 0,
            Self::Set => 1,
            Self::Response => 2,
            Self::Command => 3,
            Self::Acknowledge => 4,
            Self::Reserved(v) => v,
        }
    }

    fn from_primitive(value: u8) -> Self {
        match value {
            0 => Self::Get,
            1 => Self::Set,
            2 => Self::Response,
            3 => Self::Command,
            4 => Self::Acknowledge,
            v => Self::Reserved(v),
        }
    }
}

/// The managementErrorId of a MANAGEMENT_ERROR_STATUS TLV,
/// *IEEE1588-2008 table 72*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementErrorId {
    /// The response would not fit in a single message
    ResponseTooBig,
    /// The managementId is not recognized
    NoSuchId,
    /// The TLV length is wrong for the managementId
    WrongLength,
    /// The value is out of range or inconsistent
    WrongValue,
    /// The managementId may not be set
    NotSetable,
    /// The managementId is recognized but not supported
    NotSupported,
    /// Some other error
    GeneralError,
    /// A reserved error value
    Reserved(u16),
}

impl ManagementErrorId {
    fn to_primitive(self) -> u16 {
        match self {
            Self::ResponseTooBig => 0x0001,
            Self::NoSuchId => 0x0002,
            Self::WrongLength => 0x0003,
            Self::WrongValue => 0x0004,
            Self::NotSetable => 0x0005,
            Self::NotSupported => 0x0006,
            Self::GeneralError => 0xfffe,
            Self::Reserved(v) => v,
        }
    }

    fn from_primitive(value: u16) -> Self {
        match value {
            0x0001 => Self::ResponseTooBig,
            0x0002 => Self::NoSuchId,
            0x0003 => Self::WrongLength,
            0x0004 => Self::WrongValue,
            0x0005 => Self::NotSetable,
            0x0006 => Self::NotSupported,
            0xfffe => Self::GeneralError,
            v => Self::Reserved(v),
        }
    }
}

/// The managementId values this node understands,
/// *IEEE1588-2008 table 40*.
#[allow(missing_docs)] // names track table 40 directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementId {
    NullManagement,
    ClockDescription,
    UserDescription,
    Initialize,
    DefaultDataSet,
    CurrentDataSet,
    ParentDataSet,
    TimePropertiesDataSet,
    PortDataSet,
    Priority1,
    Priority2,
    Domain,
    SlaveOnly,
    LogAnnounceInterval,
    AnnounceReceiptTimeout,
    LogSyncInterval,
    VersionNumber,
    EnablePort,
    DisablePort,
    Time,
    ClockAccuracy,
    UtcProperties,
    TraceabilityProperties,
    TimescaleProperties,
    UnicastNegotiationEnable,
    DelayMechanism,
    LogMinPdelayReqInterval,
    /// Any id we do not interpret; answered with NO_SUCH_ID
    Unknown(u16),
}

impl ManagementId {
    /// The raw wire value
    pub fn to_primitive(self) -> u16 {
        match self {
            Self::NullManagement => 0x0000,
            Self::ClockDescription => 0x0001,
            Self::UserDescription => 0x0002,
            Self::Initialize => 0x0005,
            Self::DefaultDataSet => 0x2000,
            Self::CurrentDataSet => 0x2001,
            Self::ParentDataSet => 0x2002,
            Self::TimePropertiesDataSet => 0x2003,
            Self::PortDataSet => 0x2004,
            Self::Priority1 => 0x2005,
            Self::Priority2 => 0x2006,
            Self::Domain => 0x2007,
            Self::SlaveOnly => 0x2008,
            Self::LogAnnounceInterval => 0x2009,
            Self::AnnounceReceiptTimeout => 0x200a,
            Self::LogSyncInterval => 0x200b,
            Self::VersionNumber => 0x200c,
            Self::EnablePort => 0x200d,
            Self::DisablePort => 0x200e,
            Self::Time => 0x200f,
            Self::ClockAccuracy => 0x2010,
            Self::UtcProperties => 0x2011,
            Self::TraceabilityProperties => 0x2012,
            Self::TimescaleProperties => 0x2013,
            Self::UnicastNegotiationEnable => 0x2014,
            Self::DelayMechanism => 0x6000,
            Self::LogMinPdelayReqInterval => 0x6001,
            Self::Unknown(v) => v,
        }
    }

    /// Decode the raw wire value
    pub fn from_primitive(value: u16) -> Self {
        match value {
            0x0000 => Self::NullManagement,
            0x0001 => Self::ClockDescription,
            0x0002 => Self::UserDescription,
            0x0005 => Self::Initialize,
            0x2000 => Self::DefaultDataSet,
            0x2001 => Self::CurrentDataSet,
            0x2002 => Self::ParentDataSet,
            0x2003 => Self::TimePropertiesDataSet,
            0x2004 => Self::PortDataSet,
            0x2005 => Self::Priority1,
            0x2006 => Self::Priority2,
            0x2007 => Self::Domain,
            0x2008 => Self::SlaveOnly,
            0x2009 => Self::LogAnnounceInterval,
            0x200a => Self::AnnounceReceiptTimeout,
            0x200b => Self::LogSyncInterval,
            0x200c => Self::VersionNumber,
            0x200d => Self::EnablePort,
            0x200e => Self::DisablePort,
            0x200f => Self::Time,
            0x2010 => Self::ClockAccuracy,
            0x2011 => Self::UtcProperties,
            0x2012 => Self::TraceabilityProperties,
            0x2013 => Self::TimescaleProperties,
            0x2014 => Self::UnicastNegotiationEnable,
            0x6000 => Self::DelayMechanism,
            0x6001 => Self::LogMinPdelayReqInterval,
            v => Self::Unknown(v),
        }
    }
}

/// A length prefixed text field (PTPText, *section 5.3.10*), bounded to the
/// sizes this node produces and accepts.
pub type PtpText = ArrayVec<u8, 64>;

fn serialize_text(text: &PtpText, buffer: &mut [u8]) -> usize {
    buffer[0] = text.len() as u8;
    buffer[1..1 + text.len()].copy_from_slice(text);
    1 + text.len()
}

fn deserialize_text(buffer: &[u8]) -> Result<(PtpText, usize), WireFormatError> {
    let len = *buffer.first().ok_or(WireFormatError::BufferTooShort)? as usize;
    let text = buffer
        .get(1..1 + len)
        .ok_or(WireFormatError::BufferTooShort)?;
    let mut out = PtpText::new();
    out.try_extend_from_slice(text)
        .map_err(|_| WireFormatError::Invalid)?;
    Ok((out, 1 + len))
}

/// The typed dataField of a management TLV. `Empty` is used by GET requests
/// and by command acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)] // field sets mirror the referenced data sets
pub enum ManagementTlvData {
    Empty,
    ClockDescription {
        clock_type: u16,
        physical_layer_protocol: PtpText,
        physical_address: ArrayVec<u8, 16>,
        protocol_address_type: u16,
        protocol_address: ArrayVec<u8, 16>,
        manufacturer_identity: [u8; 3],
        product_description: PtpText,
        revision_data: PtpText,
        user_description: PtpText,
        profile_identity: [u8; 6],
    },
    UserDescription(PtpText),
    Initialize(u16),
    DefaultDataSet {
        two_step: bool,
        slave_only: bool,
        number_ports: u16,
        priority_1: u8,
        clock_quality: ClockQuality,
        priority_2: u8,
        clock_identity: ClockIdentity,
        domain_number: u8,
    },
    CurrentDataSet {
        steps_removed: u16,
        offset_from_master: TimeInterval,
        mean_path_delay: TimeInterval,
    },
    ParentDataSet {
        parent_port_identity: PortIdentity,
        parent_stats: bool,
        observed_parent_offset_scaled_log_variance: u16,
        observed_parent_clock_phase_change_rate: u32,
        grandmaster_priority_1: u8,
        grandmaster_clock_quality: ClockQuality,
        grandmaster_priority_2: u8,
        grandmaster_identity: ClockIdentity,
    },
    TimePropertiesDataSet {
        current_utc_offset: i16,
        leap61: bool,
        leap59: bool,
        current_utc_offset_valid: bool,
        ptp_timescale: bool,
        time_traceable: bool,
        frequency_traceable: bool,
        time_source: TimeSource,
    },
    PortDataSet(PortDS),
    Priority1(u8),
    Priority2(u8),
    Domain(u8),
    SlaveOnly(bool),
    LogAnnounceInterval(i8),
    AnnounceReceiptTimeout(u8),
    LogSyncInterval(i8),
    VersionNumber(u8),
    Time(WireTimestamp),
    ClockAccuracy(u8),
    UtcProperties {
        current_utc_offset: i16,
        leap61: bool,
        leap59: bool,
        current_utc_offset_valid: bool,
    },
    TraceabilityProperties {
        time_traceable: bool,
        frequency_traceable: bool,
    },
    TimescaleProperties {
        ptp_timescale: bool,
        time_source: TimeSource,
    },
    UnicastNegotiationEnable(bool),
    DelayMechanism(u8),
    LogMinPdelayReqInterval(i8),
    /// Raw payload of an id we do not interpret
    Raw(ArrayVec<u8, 64>),
}

impl ManagementTlvData {
    fn wire_size(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::ClockDescription {
                physical_layer_protocol,
                physical_address,
                protocol_address,
                product_description,
                revision_data,
                user_description,
                ..
            } => {
                2 + (1 + physical_layer_protocol.len())
                    + (2 + physical_address.len())
                    + (4 + protocol_address.len())
                    + 3
                    + 1
                    + (1 + product_description.len())
                    + (1 + revision_data.len())
                    + (1 + user_description.len())
                    + 6
            }
            Self::UserDescription(text) => 1 + text.len(),
            Self::Initialize(_) => 2,
            Self::DefaultDataSet { .. } => 20,
            Self::CurrentDataSet { .. } => 18,
            Self::ParentDataSet { .. } => 32,
            Self::TimePropertiesDataSet { .. } => 4,
            Self::PortDataSet(_) => 26,
            Self::Priority1(_)
            | Self::Priority2(_)
            | Self::Domain(_)
            | Self::SlaveOnly(_)
            | Self::LogAnnounceInterval(_)
            | Self::AnnounceReceiptTimeout(_)
            | Self::LogSyncInterval(_)
            | Self::VersionNumber(_)
            | Self::ClockAccuracy(_)
            | Self::TraceabilityProperties { .. }
            | Self::TimescaleProperties { .. }
            | Self::UnicastNegotiationEnable(_)
            | Self::DelayMechanism(_)
            | Self::LogMinPdelayReqInterval(_) => 2,
            Self::Time(_) => 10,
            Self::UtcProperties { .. } => 4,
            Self::Raw(data) => data.len(),
        }
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.wire_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        match self {
            Self::Empty => {}
            Self::ClockDescription {
                clock_type,
                physical_layer_protocol,
                physical_address,
                protocol_address_type,
                protocol_address,
                manufacturer_identity,
                product_description,
                revision_data,
                user_description,
                profile_identity,
            } => {
                let mut offset = 0;
                buffer[0..2].copy_from_slice(&clock_type.to_be_bytes());
                offset += 2;
                offset += serialize_text(physical_layer_protocol, &mut buffer[offset..]);
                buffer[offset..offset + 2]
                    .copy_from_slice(&(physical_address.len() as u16).to_be_bytes());
                buffer[offset + 2..offset + 2 + physical_address.len()]
                    .copy_from_slice(physical_address);
                offset += 2 + physical_address.len();
                buffer[offset..offset + 2].copy_from_slice(&protocol_address_type.to_be_bytes());
                buffer[offset + 2..offset + 4]
                    .copy_from_slice(&(protocol_address.len() as u16).to_be_bytes());
                buffer[offset + 4..offset + 4 + protocol_address.len()]
                    .copy_from_slice(protocol_address);
                offset += 4 + protocol_address.len();
                buffer[offset..offset + 3].copy_from_slice(manufacturer_identity);
                buffer[offset + 3] = 0;
                offset += 4;
                offset += serialize_text(product_description, &mut buffer[offset..]);
                offset += serialize_text(revision_data, &mut buffer[offset..]);
                offset += serialize_text(user_description, &mut buffer[offset..]);
                buffer[offset..offset + 6].copy_from_slice(profile_identity);
            }
            Self::UserDescription(text) => {
                serialize_text(text, buffer);
            }
            Self::Initialize(key) => buffer[0..2].copy_from_slice(&key.to_be_bytes()),
            Self::DefaultDataSet {
                two_step,
                slave_only,
                number_ports,
                priority_1,
                clock_quality,
                priority_2,
                clock_identity,
                domain_number,
            } => {
                buffer[0] = (*two_step as u8) << 1 | (*slave_only as u8);
                buffer[1] = 0;
                buffer[2..4].copy_from_slice(&number_ports.to_be_bytes());
                buffer[4] = *priority_1;
                clock_quality.serialize(&mut buffer[5..9])?;
                buffer[9] = *priority_2;
                clock_identity.serialize(&mut buffer[10..18])?;
                buffer[18] = *domain_number;
                buffer[19] = 0;
            }
            Self::CurrentDataSet {
                steps_removed,
                offset_from_master,
                mean_path_delay,
            } => {
                buffer[0..2].copy_from_slice(&steps_removed.to_be_bytes());
                offset_from_master.serialize(&mut buffer[2..10])?;
                mean_path_delay.serialize(&mut buffer[10..18])?;
            }
            Self::ParentDataSet {
                parent_port_identity,
                parent_stats,
                observed_parent_offset_scaled_log_variance,
                observed_parent_clock_phase_change_rate,
                grandmaster_priority_1,
                grandmaster_clock_quality,
                grandmaster_priority_2,
                grandmaster_identity,
            } => {
                parent_port_identity.serialize(&mut buffer[0..10])?;
                buffer[10] = *parent_stats as u8;
                buffer[11] = 0;
                buffer[12..14]
                    .copy_from_slice(&observed_parent_offset_scaled_log_variance.to_be_bytes());
                buffer[14..18]
                    .copy_from_slice(&observed_parent_clock_phase_change_rate.to_be_bytes());
                buffer[18] = *grandmaster_priority_1;
                grandmaster_clock_quality.serialize(&mut buffer[19..23])?;
                buffer[23] = *grandmaster_priority_2;
                grandmaster_identity.serialize(&mut buffer[24..32])?;
            }
            Self::TimePropertiesDataSet {
                current_utc_offset,
                leap61,
                leap59,
                current_utc_offset_valid,
                ptp_timescale,
                time_traceable,
                frequency_traceable,
                time_source,
            } => {
                buffer[0..2].copy_from_slice(&current_utc_offset.to_be_bytes());
                buffer[2] = *leap61 as u8
                    | (*leap59 as u8) << 1
                    | (*current_utc_offset_valid as u8) << 2
                    | (*ptp_timescale as u8) << 3
                    | (*time_traceable as u8) << 4
                    | (*frequency_traceable as u8) << 5;
                buffer[3] = time_source.to_primitive();
            }
            Self::PortDataSet(port_ds) => {
                port_ds.port_identity.serialize(&mut buffer[0..10])?;
                buffer[10] = port_ds.port_state;
                buffer[11] = port_ds.log_min_delay_req_interval as u8;
                TimeInterval::from(port_ds.peer_mean_path_delay)
                    .serialize(&mut buffer[12..20])?;
                buffer[20] = port_ds.log_announce_interval as u8;
                buffer[21] = port_ds.announce_receipt_timeout;
                buffer[22] = port_ds.log_sync_interval as u8;
                buffer[23] = port_ds.delay_mechanism;
                buffer[24] = port_ds.log_min_pdelay_req_interval as u8;
                buffer[25] = port_ds.version_number;
            }
            Self::Priority1(v) | Self::Priority2(v) | Self::Domain(v)
            | Self::AnnounceReceiptTimeout(v) | Self::VersionNumber(v)
            | Self::ClockAccuracy(v) | Self::DelayMechanism(v) => {
                buffer[0] = *v;
                buffer[1] = 0;
            }
            Self::SlaveOnly(v) | Self::UnicastNegotiationEnable(v) => {
                buffer[0] = *v as u8;
                buffer[1] = 0;
            }
            Self::LogAnnounceInterval(v)
            | Self::LogSyncInterval(v)
            | Self::LogMinPdelayReqInterval(v) => {
                buffer[0] = *v as u8;
                buffer[1] = 0;
            }
            Self::Time(timestamp) => timestamp.serialize(&mut buffer[0..10])?,
            Self::UtcProperties {
                current_utc_offset,
                leap61,
                leap59,
                current_utc_offset_valid,
            } => {
                buffer[0..2].copy_from_slice(&current_utc_offset.to_be_bytes());
                buffer[2] = *leap61 as u8
                    | (*leap59 as u8) << 1
                    | (*current_utc_offset_valid as u8) << 2;
                buffer[3] = 0;
            }
            Self::TraceabilityProperties {
                time_traceable,
                frequency_traceable,
            } => {
                buffer[0] = (*time_traceable as u8) << 4 | (*frequency_traceable as u8) << 5;
                buffer[1] = 0;
            }
            Self::TimescaleProperties {
                ptp_timescale,
                time_source,
            } => {
                buffer[0] = (*ptp_timescale as u8) << 3;
                buffer[1] = time_source.to_primitive();
            }
            Self::Raw(data) => buffer[..data.len()].copy_from_slice(data),
        }

        Ok(())
    }

    fn deserialize(id: ManagementId, buffer: &[u8]) -> Result<Self, WireFormatError> {
        let need = |n: usize| {
            if buffer.len() < n {
                Err(WireFormatError::BufferTooShort)
            } else {
                Ok(())
            }
        };

        // GET requests carry an empty dataField for every id
        if buffer.is_empty() {
            return Ok(Self::Empty);
        }

        Ok(match id {
            ManagementId::NullManagement | ManagementId::EnablePort | ManagementId::DisablePort => {
                Self::Empty
            }
            ManagementId::ClockDescription => {
                need(2)?;
                let clock_type = u16::from_be_bytes(buffer[0..2].try_into().unwrap());
                let mut offset = 2;
                let (physical_layer_protocol, used) = deserialize_text(&buffer[offset..])?;
                offset += used;
                need(offset + 2)?;
                let phys_len =
                    u16::from_be_bytes(buffer[offset..offset + 2].try_into().unwrap()) as usize;
                need(offset + 2 + phys_len)?;
                let mut physical_address = ArrayVec::new();
                physical_address
                    .try_extend_from_slice(&buffer[offset + 2..offset + 2 + phys_len])
                    .map_err(|_| WireFormatError::Invalid)?;
                offset += 2 + phys_len;
                need(offset + 4)?;
                let protocol_address_type =
                    u16::from_be_bytes(buffer[offset..offset + 2].try_into().unwrap());
                let proto_len =
                    u16::from_be_bytes(buffer[offset + 2..offset + 4].try_into().unwrap())
                        as usize;
                need(offset + 4 + proto_len)?;
                let mut protocol_address = ArrayVec::new();
                protocol_address
                    .try_extend_from_slice(&buffer[offset + 4..offset + 4 + proto_len])
                    .map_err(|_| WireFormatError::Invalid)?;
                offset += 4 + proto_len;
                need(offset + 4)?;
                let manufacturer_identity = buffer[offset..offset + 3].try_into().unwrap();
                offset += 4;
                let (product_description, used) = deserialize_text(&buffer[offset..])?;
                offset += used;
                let (revision_data, used) = deserialize_text(&buffer[offset..])?;
                offset += used;
                let (user_description, used) = deserialize_text(&buffer[offset..])?;
                offset += used;
                need(offset + 6)?;
                let profile_identity = buffer[offset..offset + 6].try_into().unwrap();

                Self::ClockDescription {
                    clock_type,
                    physical_layer_protocol,
                    physical_address,
                    protocol_address_type,
                    protocol_address,
                    manufacturer_identity,
                    product_description,
                    revision_data,
                    user_description,
                    profile_identity,
                }
            }
            ManagementId::UserDescription => Self::UserDescription(deserialize_text(buffer)?.0),
            ManagementId::Initialize => {
                need(2)?;
                Self::Initialize(u16::from_be_bytes(buffer[0..2].try_into().unwrap()))
            }
            ManagementId::DefaultDataSet => {
                need(20)?;
                Self::DefaultDataSet {
                    two_step: buffer[0] & 0x02 > 0,
                    slave_only: buffer[0] & 0x01 > 0,
                    number_ports: u16::from_be_bytes(buffer[2..4].try_into().unwrap()),
                    priority_1: buffer[4],
                    clock_quality: ClockQuality::deserialize(&buffer[5..9])?,
                    priority_2: buffer[9],
                    clock_identity: ClockIdentity::deserialize(&buffer[10..18])?,
                    domain_number: buffer[18],
                }
            }
            ManagementId::CurrentDataSet => {
                need(18)?;
                Self::CurrentDataSet {
                    steps_removed: u16::from_be_bytes(buffer[0..2].try_into().unwrap()),
                    offset_from_master: TimeInterval::deserialize(&buffer[2..10])?,
                    mean_path_delay: TimeInterval::deserialize(&buffer[10..18])?,
                }
            }
            ManagementId::ParentDataSet => {
                need(32)?;
                Self::ParentDataSet {
                    parent_port_identity: PortIdentity::deserialize(&buffer[0..10])?,
                    parent_stats: buffer[10] & 0x01 > 0,
                    observed_parent_offset_scaled_log_variance: u16::from_be_bytes(
                        buffer[12..14].try_into().unwrap(),
                    ),
                    observed_parent_clock_phase_change_rate: u32::from_be_bytes(
                        buffer[14..18].try_into().unwrap(),
                    ),
                    grandmaster_priority_1: buffer[18],
                    grandmaster_clock_quality: ClockQuality::deserialize(&buffer[19..23])?,
                    grandmaster_priority_2: buffer[23],
                    grandmaster_identity: ClockIdentity::deserialize(&buffer[24..32])?,
                }
            }
            ManagementId::TimePropertiesDataSet => {
                need(4)?;
                Self::TimePropertiesDataSet {
                    current_utc_offset: i16::from_be_bytes(buffer[0..2].try_into().unwrap()),
                    leap61: buffer[2] & 0x01 > 0,
                    leap59: buffer[2] & 0x02 > 0,
                    current_utc_offset_valid: buffer[2] & 0x04 > 0,
                    ptp_timescale: buffer[2] & 0x08 > 0,
                    time_traceable: buffer[2] & 0x10 > 0,
                    frequency_traceable: buffer[2] & 0x20 > 0,
                    time_source: TimeSource::from_primitive(buffer[3]),
                }
            }
            ManagementId::PortDataSet => {
                need(26)?;
                Self::PortDataSet(PortDS {
                    port_identity: PortIdentity::deserialize(&buffer[0..10])?,
                    port_state: buffer[10],
                    log_min_delay_req_interval: buffer[11] as i8,
                    peer_mean_path_delay: TimeInterval::deserialize(&buffer[12..20])?.into(),
                    log_announce_interval: buffer[20] as i8,
                    announce_receipt_timeout: buffer[21],
                    log_sync_interval: buffer[22] as i8,
                    delay_mechanism: buffer[23],
                    log_min_pdelay_req_interval: buffer[24] as i8,
                    version_number: buffer[25],
                })
            }
            ManagementId::Priority1 => {
                need(1)?;
                Self::Priority1(buffer[0])
            }
            ManagementId::Priority2 => {
                need(1)?;
                Self::Priority2(buffer[0])
            }
            ManagementId::Domain => {
                need(1)?;
                Self::Domain(buffer[0])
            }
            ManagementId::SlaveOnly => {
                need(1)?;
                Self::SlaveOnly(buffer[0] & 0x01 > 0)
            }
            ManagementId::LogAnnounceInterval => {
                need(1)?;
                Self::LogAnnounceInterval(buffer[0] as i8)
            }
            ManagementId::AnnounceReceiptTimeout => {
                need(1)?;
                Self::AnnounceReceiptTimeout(buffer[0])
            }
            ManagementId::LogSyncInterval => {
                need(1)?;
                Self::LogSyncInterval(buffer[0] as i8)
            }
            ManagementId::VersionNumber => {
                need(1)?;
                Self::VersionNumber(buffer[0])
            }
            ManagementId::Time => {
                need(10)?;
                Self::Time(WireTimestamp::deserialize(&buffer[0..10])?)
            }
            ManagementId::ClockAccuracy => {
                need(1)?;
                Self::ClockAccuracy(buffer[0])
            }
            ManagementId::UtcProperties => {
                need(4)?;
                Self::UtcProperties {
                    current_utc_offset: i16::from_be_bytes(buffer[0..2].try_into().unwrap()),
                    leap61: buffer[2] & 0x01 > 0,
                    leap59: buffer[2] & 0x02 > 0,
                    current_utc_offset_valid: buffer[2] & 0x04 > 0,
                }
            }
            ManagementId::TraceabilityProperties => {
                need(1)?;
                Self::TraceabilityProperties {
                    time_traceable: buffer[0] & 0x10 > 0,
                    frequency_traceable: buffer[0] & 0x20 > 0,
                }
            }
            ManagementId::TimescaleProperties => {
                need(2)?;
                Self::TimescaleProperties {
                    ptp_timescale: buffer[0] & 0x08 > 0,
                    time_source: TimeSource::from_primitive(buffer[1]),
                }
            }
            ManagementId::UnicastNegotiationEnable => {
                need(1)?;
                Self::UnicastNegotiationEnable(buffer[0] & 0x01 > 0)
            }
            ManagementId::DelayMechanism => {
                need(1)?;
                Self::DelayMechanism(buffer[0])
            }
            ManagementId::LogMinPdelayReqInterval => {
                need(1)?;
                Self::LogMinPdelayReqInterval(buffer[0] as i8)
            }
            ManagementId::Unknown(_) => {
                let mut data = ArrayVec::new();
                // Keep what fits; the payload is only echoed into logs
                let keep = buffer.len().min(data.capacity());
                data.try_extend_from_slice(&buffer[..keep]).unwrap();
                Self::Raw(data)
            }
        })
    }
}

/// The TLV carried by a management message: either a MANAGEMENT payload or a
/// MANAGEMENT_ERROR_STATUS answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementTlv {
    /// A management request or response payload
    Management {
        /// The id being read or written
        management_id: ManagementId,
        /// The typed payload
        data: ManagementTlvData,
    },
    /// An error answer to a management request
    ErrorStatus {
        /// What went wrong
        error_id: ManagementErrorId,
        /// The id of the request that failed
        management_id: ManagementId,
    },
}

impl ManagementTlv {
    fn wire_size(&self) -> usize {
        match self {
            Self::Management { data, .. } => 4 + 2 + data.wire_size(),
            Self::ErrorStatus { .. } => 4 + 8,
        }
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.wire_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        match self {
            Self::Management {
                management_id,
                data,
            } => {
                buffer[0..2]
                    .copy_from_slice(&TlvType::Management.to_primitive().to_be_bytes());
                buffer[2..4].copy_from_slice(&((2 + data.wire_size()) as u16).to_be_bytes());
                buffer[4..6].copy_from_slice(&management_id.to_primitive().to_be_bytes());
                data.serialize(&mut buffer[6..])?;
            }
            Self::ErrorStatus {
                error_id,
                management_id,
            } => {
                buffer[0..2].copy_from_slice(
                    &TlvType::ManagementErrorStatus.to_primitive().to_be_bytes(),
                );
                buffer[2..4].copy_from_slice(&8u16.to_be_bytes());
                buffer[4..6].copy_from_slice(&error_id.to_primitive().to_be_bytes());
                buffer[6..8].copy_from_slice(&management_id.to_primitive().to_be_bytes());
                buffer[8..12].fill(0);
            }
        }

        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 4 {
            return Err(WireFormatError::BufferTooShort);
        }

        let tlv_type = TlvType::from_primitive(u16::from_be_bytes(buffer[0..2].try_into().unwrap()));
        let length = u16::from_be_bytes(buffer[2..4].try_into().unwrap()) as usize;
        let value = buffer
            .get(4..4 + length)
            .ok_or(WireFormatError::BufferTooShort)?;

        match tlv_type {
            TlvType::Management => {
                if value.len() < 2 {
                    return Err(WireFormatError::BufferTooShort);
                }
                let management_id =
                    ManagementId::from_primitive(u16::from_be_bytes(value[0..2].try_into().unwrap()));
                Ok(Self::Management {
                    management_id,
                    data: ManagementTlvData::deserialize(management_id, &value[2..])?,
                })
            }
            TlvType::ManagementErrorStatus => {
                if value.len() < 8 {
                    return Err(WireFormatError::BufferTooShort);
                }
                Ok(Self::ErrorStatus {
                    error_id: ManagementErrorId::from_primitive(u16::from_be_bytes(
                        value[0..2].try_into().unwrap(),
                    )),
                    management_id: ManagementId::from_primitive(u16::from_be_bytes(
                        value[2..4].try_into().unwrap(),
                    )),
                })
            }
            _ => Err(WireFormatError::Invalid),
        }
    }
}

/// The body of a Management message, *IEEE1588-2008 section 13.12 and
/// clause 15*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementMessage {
    pub(crate) target_port_identity: PortIdentity,
    pub(crate) starting_boundary_hops: u8,
    pub(crate) boundary_hops: u8,
    pub(crate) action: ManagementAction,
    pub(crate) management_tlv: ManagementTlv,
}

impl ManagementMessage {
    pub(crate) fn content_size(&self) -> usize {
        14 + self.management_tlv.wire_size()
    }

    pub(crate) fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.content_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        self.target_port_identity.serialize(&mut buffer[0..10])?;
        buffer[10] = self.starting_boundary_hops;
        buffer[11] = self.boundary_hops;
        buffer[12] = self.action.to_primitive() & 0x0f;
        buffer[13] = 0;
        self.management_tlv.serialize(&mut buffer[14..])?;

        Ok(())
    }

    pub(crate) fn deserialize_content(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 14 {
            return Err(WireFormatError::BufferTooShort);
        }

        Ok(Self {
            target_port_identity: PortIdentity::deserialize(&buffer[0..10])?,
            starting_boundary_hops: buffer[10],
            boundary_hops: buffer[11],
            action: ManagementAction::from_primitive(buffer[12] & 0x0f),
            management_tlv: ManagementTlv::deserialize(&buffer[14..])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: ManagementMessage) {
        let mut buffer = [0; 256];
        message.serialize_content(&mut buffer).unwrap();
        let parsed =
            ManagementMessage::deserialize_content(&buffer[..message.content_size()]).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn get_request_round_trip() {
        round_trip(ManagementMessage {
            target_port_identity: PortIdentity::ALL_ONES,
            starting_boundary_hops: 1,
            boundary_hops: 1,
            action: ManagementAction::Get,
            management_tlv: ManagementTlv::Management {
                management_id: ManagementId::DefaultDataSet,
                data: ManagementTlvData::Empty,
            },
        });
    }

    #[test]
    fn dataset_response_round_trip() {
        round_trip(ManagementMessage {
            target_port_identity: PortIdentity::default(),
            starting_boundary_hops: 0,
            boundary_hops: 0,
            action: ManagementAction::Response,
            management_tlv: ManagementTlv::Management {
                management_id: ManagementId::DefaultDataSet,
                data: ManagementTlvData::DefaultDataSet {
                    two_step: true,
                    slave_only: false,
                    number_ports: 1,
                    priority_1: 128,
                    clock_quality: ClockQuality::default(),
                    priority_2: 128,
                    clock_identity: ClockIdentity([1, 2, 3, 4, 5, 6, 7, 8]),
                    domain_number: 0,
                },
            },
        });
    }

    #[test]
    fn scalar_set_round_trip() {
        round_trip(ManagementMessage {
            target_port_identity: PortIdentity::default(),
            starting_boundary_hops: 0,
            boundary_hops: 0,
            action: ManagementAction::Set,
            management_tlv: ManagementTlv::Management {
                management_id: ManagementId::Priority1,
                data: ManagementTlvData::Priority1(42),
            },
        });
    }

    #[test]
    fn error_status_round_trip() {
        round_trip(ManagementMessage {
            target_port_identity: PortIdentity::default(),
            starting_boundary_hops: 0,
            boundary_hops: 0,
            action: ManagementAction::Response,
            management_tlv: ManagementTlv::ErrorStatus {
                error_id: ManagementErrorId::NoSuchId,
                management_id: ManagementId::Unknown(0xc0de),
            },
        });
    }

    #[test]
    fn utc_properties_round_trip() {
        round_trip(ManagementMessage {
            target_port_identity: PortIdentity::default(),
            starting_boundary_hops: 0,
            boundary_hops: 0,
            action: ManagementAction::Set,
            management_tlv: ManagementTlv::Management {
                management_id: ManagementId::UtcProperties,
                data: ManagementTlvData::UtcProperties {
                    current_utc_offset: 37,
                    leap61: false,
                    leap59: true,
                    current_utc_offset_valid: true,
                },
            },
        });
    }
}
