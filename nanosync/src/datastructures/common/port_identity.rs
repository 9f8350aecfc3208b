use super::ClockIdentity;
use crate::datastructures::{WireFormat, WireFormatError};

/// Identity of a single port of a PTP instance, *IEEE1588-2008 section
/// 7.5.2.3*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortIdentity {
    /// The identity of the clock this port is part of
    pub clock_identity: ClockIdentity,
    /// 1-based index of the port within its clock
    pub port_number: u16,
}

impl PortIdentity {
    /// The all-ones wildcard identity, addressing any port
    pub const ALL_ONES: Self = Self {
        clock_identity: ClockIdentity([0xff; 8]),
        port_number: 0xffff,
    };

    /// Whether this is the wildcard identity
    pub fn is_wildcard(&self) -> bool {
        *self == Self::ALL_ONES
    }
}

impl WireFormat for PortIdentity {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        self.clock_identity.serialize(&mut buffer[0..8])?;
        buffer[8..10].copy_from_slice(&self.port_number.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 10 {
            return Err(WireFormatError::BufferTooShort);
        }
        Ok(Self {
            clock_identity: ClockIdentity::deserialize(&buffer[0..8])?,
            port_number: u16::from_be_bytes(buffer[8..10].try_into().unwrap()),
        })
    }
}

impl core::fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.clock_identity, self.port_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_identity_wireformat() {
        let representations = [
            (
                [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x15, 0xb3u8],
                PortIdentity {
                    clock_identity: ClockIdentity([0, 1, 2, 3, 4, 5, 6, 7]),
                    port_number: 5555,
                },
            ),
            (
                [0x40, 0x6b, 0x96, 0xae, 0x40, 0x82, 0xcd, 0x40, 0x00, 0x01u8],
                PortIdentity {
                    clock_identity: ClockIdentity([64, 107, 150, 174, 64, 130, 205, 64]),
                    port_number: 1,
                },
            ),
        ];

        for (byte_representation, object_representation) in representations {
            let mut serialization_buffer = [0; 10];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            let deserialized_data = PortIdentity::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }

    #[test]
    fn wildcard() {
        assert!(PortIdentity::ALL_ONES.is_wildcard());
        assert!(!PortIdentity::default().is_wildcard());
    }
}
