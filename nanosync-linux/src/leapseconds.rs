//! Parser for the IETF `leap-seconds.list` file, used to seed the UTC
//! offset and announce upcoming leap seconds when this node distributes the
//! PTP timescale itself.

use std::{fs, path::Path};

use nanosync::config::LeapIndicator;

/// Seconds between the NTP era (1900) and the POSIX epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// How far ahead of the event a pending leap is reported
const LEAP_NOTICE_PERIOD_SECS: u64 = 12 * 60 * 60;

/// One entry of the list: at `effective_unix` the TAI-UTC offset becomes
/// `tai_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeapEntry {
    /// Unix time the offset takes effect
    pub effective_unix: u64,
    /// TAI-UTC in seconds from that moment on
    pub tai_offset: i16,
}

/// The parsed leap second list
#[derive(Debug, Clone, Default)]
pub struct LeapSecondsList {
    entries: Vec<LeapEntry>,
    /// Unix time the file stops being trustworthy
    pub expires_unix: Option<u64>,
}

impl LeapSecondsList {
    /// Parse the file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse the `leap-seconds.list` format: `#` starts a comment, `#@`
    /// carries the expiry stamp, data lines hold the NTP timestamp and the
    /// TAI offset. Malformed lines are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut list = LeapSecondsList::default();

        for line in contents.lines() {
            let line = line.trim();

            if let Some(expiry) = line.strip_prefix("#@") {
                if let Some(value) = expiry.split_whitespace().next() {
                    if let Ok(ntp) = value.parse::<u64>() {
                        list.expires_unix = Some(ntp.saturating_sub(NTP_UNIX_OFFSET));
                    }
                }
                continue;
            }

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(ntp), Some(offset)) = (fields.next(), fields.next()) else {
                continue;
            };
            let (Ok(ntp), Ok(offset)) = (ntp.parse::<u64>(), offset.parse::<i16>()) else {
                continue;
            };

            list.entries.push(LeapEntry {
                effective_unix: ntp.saturating_sub(NTP_UNIX_OFFSET),
                tai_offset: offset,
            });
        }

        list.entries.sort_by_key(|e| e.effective_unix);
        list
    }

    /// The TAI-UTC offset in force at the given unix time
    pub fn offset_at(&self, unix_secs: u64) -> Option<i16> {
        self.entries
            .iter()
            .take_while(|e| e.effective_unix <= unix_secs)
            .last()
            .map(|e| e.tai_offset)
    }

    /// A leap event inside the notice period, with its direction
    pub fn pending_leap(&self, unix_secs: u64) -> Option<LeapIndicator> {
        let current = self.offset_at(unix_secs)?;

        let upcoming = self
            .entries
            .iter()
            .find(|e| e.effective_unix > unix_secs)?;

        if upcoming.effective_unix - unix_secs > LEAP_NOTICE_PERIOD_SECS {
            return None;
        }

        match upcoming.tai_offset - current {
            1 => Some(LeapIndicator::Leap61),
            -1 => Some(LeapIndicator::Leap59),
            _ => None,
        }
    }

    /// Whether the list is past its expiry stamp
    pub fn is_expired(&self, unix_secs: u64) -> bool {
        matches!(self.expires_unix, Some(expiry) if unix_secs >= expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2017-01-01 leap second, as the real file encodes it
    const SAMPLE: &str = "\
# comment line
#$	 3676924800
#@	3896899200
3644697600	36	# 1 Jul 2015
3692217600	37	# 1 Jan 2017
";

    #[test]
    fn parses_offsets_and_expiry() {
        let list = LeapSecondsList::parse(SAMPLE);

        // 2016-06-01 is after the 2015 entry and before the 2017 one
        let mid_2016 = 1_464_739_200;
        assert_eq!(list.offset_at(mid_2016), Some(36));

        // After 2017-01-01 the offset is 37
        let early_2017 = 1_486_000_000;
        assert_eq!(list.offset_at(early_2017), Some(37));

        assert_eq!(list.expires_unix, Some(3_896_899_200 - NTP_UNIX_OFFSET));
    }

    #[test]
    fn announces_pending_leap_inside_notice_period() {
        let list = LeapSecondsList::parse(SAMPLE);

        // 2017-01-01 00:00:00 UTC as unix time
        let leap_instant = 3_692_217_600 - NTP_UNIX_OFFSET;

        // Six hours before: the insertion is announced
        assert_eq!(
            list.pending_leap(leap_instant - 6 * 3600),
            Some(LeapIndicator::Leap61)
        );

        // A week before: quiet
        assert_eq!(list.pending_leap(leap_instant - 7 * 86_400), None);

        // After the event: quiet
        assert_eq!(list.pending_leap(leap_instant + 3600), None);
    }
}
