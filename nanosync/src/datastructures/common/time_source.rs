/// The root source a clock derives its time from, *IEEE1588-2008 table 7*.
///
/// For a freerunning node the default
/// [`InternalOscillator`](`Self::InternalOscillator`) is the honest choice.
#[allow(missing_docs)] // the variants are self explaining
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeSource {
    AtomicClock,
    Gps,
    TerrestrialRadio,
    Ptp,
    Ntp,
    HandSet,
    Other,
    #[default]
    InternalOscillator,
    /// A value not defined by table 7; carried through untouched
    Unknown(u8),
}

impl TimeSource {
    /// Converts enum variants back to their raw wire values
    pub fn to_primitive(self) -> u8 {
        match self {
            Self::AtomicClock => 0x10,
            Self::Gps => 0x20,
            Self::TerrestrialRadio => 0x30,
            Self::Ptp => 0x40,
            Self::Ntp => 0x50,
            Self::HandSet => 0x60,
            Self::Other => 0x90,
            Self::InternalOscillator => 0xa0,
            Self::Unknown(v) => v,
        }
    }

    pub(crate) fn from_primitive(value: u8) -> Self {
        match value {
            0x10 => Self::AtomicClock,
            0x20 => Self::Gps,
            0x30 => Self::TerrestrialRadio,
            0x40 => Self::Ptp,
            0x50 => Self::Ntp,
            0x60 => Self::HandSet,
            0x90 => Self::Other,
            0xa0 => Self::InternalOscillator,
            v => Self::Unknown(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_source_values() {
        for i in 0..=u8::MAX {
            let source = TimeSource::from_primitive(i);
            assert_eq!(source.to_primitive(), i);
        }
    }
}
