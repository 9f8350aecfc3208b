use super::ClockAccuracy;
use crate::datastructures::{WireFormat, WireFormatError};

/// A description of the accuracy and stability of a clock,
/// *IEEE1588-2008 section 7.6.2.4* and onward.
///
/// A `clock_class` below 128 marks a master-only clock, 255 a slave-only
/// clock; the range in between may fall back to slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockQuality {
    /// The PTP clock class, *section 7.6.2.4*
    pub clock_class: u8,
    /// The accuracy of the clock, *section 7.6.2.5*
    pub clock_accuracy: ClockAccuracy,
    /// 2-log of the variance (in seconds^2) of the clock when not
    /// synchronized, *section 7.6.3.3*
    pub offset_scaled_log_variance: u16,
}

/// The default clock class for a freerunning clock
pub const DEFAULT_CLOCK_CLASS: u8 = 248;
/// The clock class advertised by (and required of) slave-only clocks
pub const SLAVE_ONLY_CLOCK_CLASS: u8 = 255;

impl ClockQuality {
    /// Whether this quality describes a clock that may never become a slave
    pub fn is_master_only(&self) -> bool {
        (1..128).contains(&self.clock_class)
    }
}

impl Default for ClockQuality {
    fn default() -> Self {
        Self {
            clock_class: DEFAULT_CLOCK_CLASS,
            clock_accuracy: ClockAccuracy::default(),
            offset_scaled_log_variance: 0xffff,
        }
    }
}

impl WireFormat for ClockQuality {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        buffer[0] = self.clock_class;
        buffer[1] = self.clock_accuracy.to_primitive();
        buffer[2..4].copy_from_slice(&self.offset_scaled_log_variance.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 4 {
            return Err(WireFormatError::BufferTooShort);
        }
        Ok(Self {
            clock_class: buffer[0],
            clock_accuracy: ClockAccuracy::from_primitive(buffer[1]),
            offset_scaled_log_variance: u16::from_be_bytes(buffer[2..4].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_wireformat() {
        let representations = [(
            [0xf8, 0xfe, 0x43, 0x21u8],
            ClockQuality {
                clock_class: 248,
                clock_accuracy: ClockAccuracy::Unknown,
                offset_scaled_log_variance: 0x4321,
            },
        )];

        for (byte_representation, object_representation) in representations {
            let mut serialization_buffer = [0; 4];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            let deserialized_data = ClockQuality::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }

    #[test]
    fn master_only_classes() {
        let mut quality = ClockQuality::default();
        assert!(!quality.is_master_only());

        quality.clock_class = 13;
        assert!(quality.is_master_only());

        quality.clock_class = SLAVE_ONLY_CLOCK_CLASS;
        assert!(!quality.is_master_only());
    }
}
