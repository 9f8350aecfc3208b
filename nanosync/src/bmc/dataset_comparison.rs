//! The dataset comparison algorithm of *IEEE1588-2008 section 9.3.4*,
//! extended with the G.8265.1 local preference rung used for unicast
//! master tables.

use core::cmp::Ordering;

use crate::datastructures::{
    common::{ClockIdentity, ClockQuality, PortIdentity},
    datasets::DefaultDS,
    messages::AnnounceMessage,
};

/// The lowest (least preferred) local preference value; the default for
/// masters without an explicit preference.
pub(crate) const LOWEST_LOCAL_PREFERENCE: u8 = 255;

/// Data gathered from an announce message or from our own DefaultDS, in the
/// shape the pairwise comparison needs. Build two of these and
/// [`compare`](`ComparisonDataset::compare`) them to find the better master.
#[derive(Eq, PartialEq, Debug)]
pub(crate) struct ComparisonDataset {
    gm_priority_1: u8,
    gm_identity: ClockIdentity,
    gm_clock_quality: ClockQuality,
    gm_priority_2: u8,
    steps_removed: u16,
    identity_of_sender: ClockIdentity,
    identity_of_receiver: PortIdentity,
    local_preference: u8,
}

impl Default for ComparisonDataset {
    fn default() -> Self {
        Self {
            gm_priority_1: 0,
            gm_identity: ClockIdentity::default(),
            gm_clock_quality: ClockQuality {
                clock_class: 0,
                clock_accuracy: crate::datastructures::common::ClockAccuracy::Other(0),
                offset_scaled_log_variance: 0,
            },
            gm_priority_2: 0,
            steps_removed: 0,
            identity_of_sender: ClockIdentity::default(),
            identity_of_receiver: PortIdentity::default(),
            local_preference: LOWEST_LOCAL_PREFERENCE,
        }
    }
}

impl ComparisonDataset {
    /// Create a dataset from an announce message and the identity of the
    /// port that received it
    pub(crate) fn from_announce_message(
        message: &AnnounceMessage,
        port_receiver_identity: &PortIdentity,
        local_preference: u8,
    ) -> Self {
        Self {
            gm_priority_1: message.grandmaster_priority_1,
            gm_identity: message.grandmaster_identity,
            gm_clock_quality: message.grandmaster_clock_quality,
            gm_priority_2: message.grandmaster_priority_2,
            steps_removed: message.steps_removed,
            identity_of_sender: message.header.source_port_identity.clock_identity,
            identity_of_receiver: *port_receiver_identity,
            local_preference,
        }
    }

    /// Create the `D0` dataset from our own DefaultDS
    pub(crate) fn from_own_data(data: &DefaultDS) -> Self {
        Self {
            gm_priority_1: data.priority_1,
            gm_identity: data.clock_identity,
            gm_clock_quality: data.clock_quality,
            gm_priority_2: data.priority_2,
            steps_removed: 0,
            identity_of_sender: data.clock_identity,
            identity_of_receiver: PortIdentity {
                clock_identity: data.clock_identity,
                port_number: 0,
            },
            local_preference: LOWEST_LOCAL_PREFERENCE,
        }
    }

    /// Returns the ordering of `self` in comparison to `other`
    pub(crate) fn compare(&self, other: &Self) -> DatasetOrdering {
        if self.gm_identity == other.gm_identity {
            self.compare_same_identity(other)
        } else {
            self.compare_different_identity(other)
        }
    }

    /// The datasets lead to different grandmasters (figure 27)
    fn compare_different_identity(&self, other: &Self) -> DatasetOrdering {
        let self_quality = self.gm_clock_quality;
        let other_quality = other.gm_clock_quality;

        let ordering = (self.local_preference.cmp(&other.local_preference))
            .then_with(|| self.gm_priority_1.cmp(&other.gm_priority_1))
            .then_with(|| self_quality.clock_class.cmp(&other_quality.clock_class))
            // the standard compares the raw values, the reverse of the
            // semantic ordering
            .then_with(|| {
                self_quality
                    .clock_accuracy
                    .cmp_numeric(&other_quality.clock_accuracy)
            })
            .then_with(|| {
                self_quality
                    .offset_scaled_log_variance
                    .cmp(&other_quality.offset_scaled_log_variance)
            })
            .then_with(|| self.gm_priority_2.cmp(&other.gm_priority_2))
            .then_with(|| self.gm_identity.cmp(&other.gm_identity));

        match ordering {
            Ordering::Equal => unreachable!("gm_identity is guaranteed to differ"),
            Ordering::Greater => DatasetOrdering::Worse,
            Ordering::Less => DatasetOrdering::Better,
        }
    }

    /// The datasets may describe the same grandmaster (figure 28)
    fn compare_same_identity(&self, other: &Self) -> DatasetOrdering {
        let steps_removed_difference = self.steps_removed as i32 - other.steps_removed as i32;

        match steps_removed_difference {
            2..=i32::MAX => DatasetOrdering::Worse,
            i32::MIN..=-2 => DatasetOrdering::Better,
            1 => match Ord::cmp(
                &self.identity_of_receiver.clock_identity,
                &self.identity_of_sender,
            ) {
                Ordering::Less => DatasetOrdering::Worse,
                Ordering::Equal => DatasetOrdering::Error1,
                Ordering::Greater => DatasetOrdering::WorseByTopology,
            },
            -1 => match Ord::cmp(
                &other.identity_of_receiver.clock_identity,
                &other.identity_of_sender,
            ) {
                Ordering::Less => DatasetOrdering::Better,
                Ordering::Equal => DatasetOrdering::Error1,
                Ordering::Greater => DatasetOrdering::BetterByTopology,
            },
            0 => {
                let senders = self.identity_of_sender.cmp(&other.identity_of_sender);
                let receivers = Ord::cmp(
                    &self.identity_of_receiver.port_number,
                    &other.identity_of_receiver.port_number,
                );

                match senders.then(receivers) {
                    Ordering::Less => DatasetOrdering::BetterByTopology,
                    Ordering::Equal => DatasetOrdering::Error2,
                    Ordering::Greater => DatasetOrdering::WorseByTopology,
                }
            }
        }
    }
}

/// The outcome of the dataset comparison algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOrdering {
    /// The dataset is better than the one compared against
    Better,
    /// Equal quality, preferred because of the network topology
    BetterByTopology,
    /// Equal quality and topology
    Error1,
    /// Probably derived from the same set of data
    Error2,
    /// Equal quality, not preferred because of the network topology
    WorseByTopology,
    /// The dataset is worse than the one compared against
    Worse,
}

impl DatasetOrdering {
    /// Collapse onto a plain [`Ordering`]. The error cases mean either
    /// choice is valid, so they map to equality.
    pub const fn as_ordering(self) -> Ordering {
        match self {
            DatasetOrdering::Better | DatasetOrdering::BetterByTopology => Ordering::Greater,
            DatasetOrdering::Error1 | DatasetOrdering::Error2 => Ordering::Equal,
            DatasetOrdering::WorseByTopology | DatasetOrdering::Worse => Ordering::Less,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::common::ClockAccuracy;

    const IDENTITY_A: ClockIdentity = ClockIdentity([1, 1, 1, 1, 1, 1, 1, 1]);
    const IDENTITY_B: ClockIdentity = ClockIdentity([2, 2, 2, 2, 2, 2, 2, 2]);
    const IDENTITY_C: ClockIdentity = ClockIdentity([3, 3, 3, 3, 3, 3, 3, 3]);

    fn get_default_test_pair() -> (ComparisonDataset, ComparisonDataset) {
        Default::default()
    }

    #[test]
    fn different_identity_order() {
        // Start from two identical datasets and work bottom up; every step
        // flips which one wins so stale results cannot leak through
        let (mut a, mut b) = get_default_test_pair();

        a.gm_identity = IDENTITY_A;
        b.gm_identity = IDENTITY_B;

        assert_eq!(a.compare(&b), DatasetOrdering::Better);
        assert_eq!(b.compare(&a), DatasetOrdering::Worse);

        a.gm_priority_2 = 1;
        b.gm_priority_2 = 0;

        assert_eq!(a.compare(&b), DatasetOrdering::Worse);
        assert_eq!(b.compare(&a), DatasetOrdering::Better);

        a.gm_clock_quality.offset_scaled_log_variance = 0;
        b.gm_clock_quality.offset_scaled_log_variance = 1;

        assert_eq!(a.compare(&b), DatasetOrdering::Better);
        assert_eq!(b.compare(&a), DatasetOrdering::Worse);

        a.gm_clock_quality.clock_accuracy = ClockAccuracy::US1;
        b.gm_clock_quality.clock_accuracy = ClockAccuracy::NS25;

        assert_eq!(a.compare(&b), DatasetOrdering::Worse);
        assert_eq!(b.compare(&a), DatasetOrdering::Better);

        a.gm_clock_quality.clock_class = 0;
        b.gm_clock_quality.clock_class = 1;

        assert_eq!(a.compare(&b), DatasetOrdering::Better);
        assert_eq!(b.compare(&a), DatasetOrdering::Worse);

        a.gm_priority_1 = 1;
        b.gm_priority_1 = 0;

        assert_eq!(a.compare(&b), DatasetOrdering::Worse);
        assert_eq!(b.compare(&a), DatasetOrdering::Better);

        a.local_preference = 0;
        b.local_preference = 1;

        assert_eq!(a.compare(&b), DatasetOrdering::Better);
        assert_eq!(b.compare(&a), DatasetOrdering::Worse);
    }

    #[test]
    fn same_identity_topology() {
        let (mut a, mut b) = get_default_test_pair();

        assert_eq!(a.compare(&b), DatasetOrdering::Error2);
        assert_eq!(b.compare(&a), DatasetOrdering::Error2);

        a.identity_of_receiver.port_number = 1;
        b.identity_of_receiver.port_number = 0;

        assert_eq!(a.compare(&b), DatasetOrdering::WorseByTopology);
        assert_eq!(b.compare(&a), DatasetOrdering::BetterByTopology);

        a.identity_of_sender = IDENTITY_A;
        b.identity_of_sender = IDENTITY_B;

        assert_eq!(a.compare(&b), DatasetOrdering::BetterByTopology);
        assert_eq!(b.compare(&a), DatasetOrdering::WorseByTopology);

        a.steps_removed = 0;
        a.identity_of_receiver.clock_identity = IDENTITY_A;
        b.steps_removed = 1;
        b.identity_of_receiver.clock_identity = IDENTITY_B;

        assert_eq!(a.compare(&b), DatasetOrdering::Error1);
        assert_eq!(b.compare(&a), DatasetOrdering::Error1);

        a.identity_of_receiver.clock_identity = IDENTITY_B;
        b.identity_of_receiver.clock_identity = IDENTITY_C;

        assert_eq!(a.compare(&b), DatasetOrdering::BetterByTopology);
        assert_eq!(b.compare(&a), DatasetOrdering::WorseByTopology);

        a.steps_removed = 0;
        b.steps_removed = 2;

        assert_eq!(a.compare(&b), DatasetOrdering::Better);
        assert_eq!(b.compare(&a), DatasetOrdering::Worse);
    }

    #[test]
    fn comparison_is_antisymmetric() {
        let (mut a, mut b) = get_default_test_pair();
        a.gm_identity = IDENTITY_A;
        a.gm_priority_1 = 128;
        b.gm_identity = IDENTITY_B;
        b.gm_priority_1 = 127;

        // compare(a, b) == -compare(b, a), and compare(a, a) == 0
        assert_eq!(
            a.compare(&b).as_ordering(),
            b.compare(&a).as_ordering().reverse()
        );
        assert_eq!(a.compare(&a).as_ordering(), Ordering::Equal);
    }
}
