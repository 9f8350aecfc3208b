use crate::datastructures::{WireFormat, WireFormatError};

/// The on-wire timestamp format: a 48-bit seconds field followed by a 32-bit
/// nanoseconds field. See *IEEE1588-2008 section 5.3.3*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct WireTimestamp {
    /// The seconds field of the timestamp. 48-bit, must fit in a u48.
    pub seconds: u64,
    /// The nanoseconds field of the timestamp. Must be less than 10^9.
    pub nanos: u32,
}

impl WireFormat for WireTimestamp {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        buffer[0..6].copy_from_slice(&self.seconds.to_be_bytes()[2..8]);
        buffer[6..10].copy_from_slice(&self.nanos.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 10 {
            return Err(WireFormatError::BufferTooShort);
        }

        let mut seconds_buffer = [0; 8];
        seconds_buffer[2..8].copy_from_slice(&buffer[0..6]);

        Ok(Self {
            seconds: u64::from_be_bytes(seconds_buffer),
            nanos: u32::from_be_bytes(buffer[6..10].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_wireformat() {
        let representations = [
            (
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00u8],
                WireTimestamp {
                    seconds: 0,
                    nanos: 0,
                },
            ),
            (
                [0x00, 0x00, 0x00, 0x00, 0x02, 0x01, 0x00, 0x00, 0x00, 0x05u8],
                WireTimestamp {
                    seconds: 513,
                    nanos: 5,
                },
            ),
            (
                [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x3b, 0x9a, 0xc9, 0xffu8],
                WireTimestamp {
                    seconds: (1 << 48) - 1,
                    nanos: 999_999_999,
                },
            ),
        ];

        for (byte_representation, object_representation) in representations {
            let mut serialization_buffer = [0; 10];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            let deserialized_data = WireTimestamp::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }
}
