//! General data structures as defined by the PTP specification

use core::fmt::Debug;

pub mod common;
pub mod datasets;
pub mod messages;

/// Errors raised by the wire codec while parsing a message.
///
/// Serialization into a [`messages::MAX_DATA_LEN`] sized buffer cannot fail;
/// only deserialization of network input produces these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum WireFormatError {
    /// A field carried a value outside its enumeration
    #[cfg_attr(feature = "std", error("enum conversion failed"))]
    EnumConversionError,
    /// The buffer ended before the advertised length
    #[cfg_attr(feature = "std", error("buffer too short"))]
    BufferTooShort,
    /// A length field or flag combination is inconsistent
    #[cfg_attr(feature = "std", error("invalid message"))]
    Invalid,
    /// The versionPTP field is not 2
    #[cfg_attr(feature = "std", error("unsupported ptp version"))]
    UnsupportedVersion,
}

pub(crate) trait WireFormat: Debug + Clone + Eq {
    /// Serializes the object into the PTP wire format.
    ///
    /// The caller must provide a large enough buffer.
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError>;

    /// Deserializes the object from the PTP wire format.
    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError>;
}
