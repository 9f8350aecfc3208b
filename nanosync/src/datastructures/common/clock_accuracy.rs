use core::cmp::Ordering;

/// How accurate a clock tracks its time source, *IEEE1588-2008 table 6*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockAccuracy {
    /// Accurate to within 25 ns
    NS25,
    /// Accurate to within 100 ns
    NS100,
    /// Accurate to within 250 ns
    NS250,
    /// Accurate to within 1 us
    US1,
    /// Accurate to within 2.5 us
    US2_5,
    /// Accurate to within 10 us
    US10,
    /// Accurate to within 25 us
    US25,
    /// Accurate to within 100 us
    US100,
    /// Accurate to within 250 us
    US250,
    /// Accurate to within 1 ms
    MS1,
    /// Accurate to within 2.5 ms
    MS2_5,
    /// Accurate to within 10 ms
    MS10,
    /// Accurate to within 25 ms
    MS25,
    /// Accurate to within 100 ms
    MS100,
    /// Accurate to within 250 ms
    MS250,
    /// Accurate to within 1 s
    S1,
    /// Accurate to within 10 s
    S10,
    /// Accurate to more than 10 s
    SGT10,
    /// Accuracy is unknown
    #[default]
    Unknown,
    /// Accuracy field carried a reserved or profile value
    Other(u8),
}

impl ClockAccuracy {
    /// The raw wire value
    pub fn to_primitive(self) -> u8 {
        match self {
            Self::NS25 => 0x20,
            Self::NS100 => 0x21,
            Self::NS250 => 0x22,
            Self::US1 => 0x23,
            Self::US2_5 => 0x24,
            Self::US10 => 0x25,
            Self::US25 => 0x26,
            Self::US100 => 0x27,
            Self::US250 => 0x28,
            Self::MS1 => 0x29,
            Self::MS2_5 => 0x2a,
            Self::MS10 => 0x2b,
            Self::MS25 => 0x2c,
            Self::MS100 => 0x2d,
            Self::MS250 => 0x2e,
            Self::S1 => 0x2f,
            Self::S10 => 0x30,
            Self::SGT10 => 0x31,
            Self::Unknown => 0xfe,
            Self::Other(v) => v,
        }
    }

    /// Decode the raw wire value
    pub fn from_primitive(value: u8) -> Self {
        match value {
            0x20 => Self::NS25,
            0x21 => Self::NS100,
            0x22 => Self::NS250,
            0x23 => Self::US1,
            0x24 => Self::US2_5,
            0x25 => Self::US10,
            0x26 => Self::US25,
            0x27 => Self::US100,
            0x28 => Self::US250,
            0x29 => Self::MS1,
            0x2a => Self::MS2_5,
            0x2b => Self::MS10,
            0x2c => Self::MS25,
            0x2d => Self::MS100,
            0x2e => Self::MS250,
            0x2f => Self::S1,
            0x30 => Self::S10,
            0x31 => Self::SGT10,
            0xfe => Self::Unknown,
            v => Self::Other(v),
        }
    }

    /// The dataset comparison algorithm compares accuracies numerically,
    /// which is the reverse of the semantic ordering (lower is better).
    pub fn cmp_numeric(&self, other: &Self) -> Ordering {
        self.to_primitive().cmp(&other.to_primitive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_values() {
        for i in 0..=u8::MAX {
            let accuracy = ClockAccuracy::from_primitive(i);
            assert_eq!(accuracy.to_primitive(), i);
        }
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(
            ClockAccuracy::NS25.cmp_numeric(&ClockAccuracy::S1),
            Ordering::Less
        );
        assert_eq!(
            ClockAccuracy::Unknown.cmp_numeric(&ClockAccuracy::MS1),
            Ordering::Greater
        );
    }
}
