//! The best master clock algorithm driving master election

use core::cmp::Ordering;

use super::{
    acceptable_master::AcceptableMasterList,
    dataset_comparison::{ComparisonDataset, DatasetOrdering},
    foreign_master::ForeignMasterList,
};
use crate::{
    datastructures::{
        common::PortIdentity,
        datasets::DefaultDS,
        messages::AnnounceMessage,
    },
    time::{Interval, Time},
};

/// Per-port state of the best master clock algorithm.
///
/// - Every received announce message is registered with
///   [`Bmca::register_announce_message`].
/// - Once per main loop turn the engine takes the best qualified candidate
///   with [`Bmca::take_best_announce_message`] and feeds it to
///   [`Bmca::calculate_recommended_state`] to learn where the port should
///   transition.
#[derive(Debug)]
pub(crate) struct Bmca<A> {
    foreign_master_list: ForeignMasterList,
    own_port_identity: PortIdentity,
    acceptable_master_list: A,
}

impl<A: AcceptableMasterList> Bmca<A> {
    pub(crate) fn new(
        acceptable_master_list: A,
        own_announce_interval: Interval,
        own_port_identity: PortIdentity,
    ) -> Self {
        Self {
            foreign_master_list: ForeignMasterList::new(
                own_announce_interval,
                own_port_identity,
            ),
            own_port_identity,
            acceptable_master_list,
        }
    }

    /// Register a received announce message with the algorithm.
    ///
    /// Returns whether the message was taken into consideration.
    pub(crate) fn register_announce_message(
        &mut self,
        announce_message: &AnnounceMessage,
        local_preference: u8,
        now: Time,
    ) -> bool {
        if !self
            .acceptable_master_list
            .is_acceptable(announce_message.header.source_port_identity.clock_identity)
        {
            return false;
        }

        if announce_message.header.source_port_identity == self.own_port_identity {
            return false;
        }

        self.foreign_master_list
            .register_announce_message(announce_message, local_preference, now);
        true
    }

    /// The current Erbest: the best announce message among the qualified
    /// foreign masters of this port.
    pub(crate) fn take_best_announce_message(
        &mut self,
        now: Time,
    ) -> Option<BestAnnounceMessage> {
        let own_port_identity = self.own_port_identity;

        self.foreign_master_list
            .qualified_announce_messages(now)
            .map(|(message, local_preference)| BestAnnounceMessage {
                message,
                local_preference,
                identity: own_port_identity,
            })
            .max_by(BestAnnounceMessage::compare)
    }

    /// The state decision algorithm (*IEEE1588-2008 section 9.3.3*) for a
    /// single port ordinary clock, where Ebest and Erbest coincide.
    ///
    /// `None` means: stay in the current state.
    pub(crate) fn calculate_recommended_state(
        own_data: &DefaultDS,
        best_announce_message: Option<BestAnnounceMessage>,
        in_listening: bool,
    ) -> Option<RecommendedState> {
        if best_announce_message.is_none() && in_listening {
            return None;
        }

        if own_data.slave_only {
            return best_announce_message.map(|best| RecommendedState::S1(best.message));
        }

        let d0 = ComparisonDataset::from_own_data(own_data);

        Some(match best_announce_message {
            None => RecommendedState::M1(*own_data),
            Some(best) => {
                let erbest = ComparisonDataset::from_announce_message(
                    &best.message,
                    &best.identity,
                    best.local_preference,
                );

                match (d0.compare(&erbest).as_ordering(), own_data.clock_quality.is_master_only()) {
                    // A master-capable clock beaten by the best foreign
                    // master goes passive when it may not slave
                    (Ordering::Less, true) => RecommendedState::P1(best.message),
                    (Ordering::Less, false) => RecommendedState::S1(best.message),
                    (_, true) => RecommendedState::M1(*own_data),
                    (_, false) => RecommendedState::M2(*own_data),
                }
            }
        })
    }
}

/// The best qualified announce message seen by a port
#[derive(Copy, Clone, Debug)]
pub(crate) struct BestAnnounceMessage {
    pub(crate) message: AnnounceMessage,
    pub(crate) local_preference: u8,
    identity: PortIdentity,
}

impl BestAnnounceMessage {
    fn compare(&self, other: &Self) -> Ordering {
        self.compare_dataset(other).as_ordering()
    }

    fn compare_dataset(&self, other: &Self) -> DatasetOrdering {
        let data1 = ComparisonDataset::from_announce_message(
            &self.message,
            &self.identity,
            self.local_preference,
        );
        let data2 = ComparisonDataset::from_announce_message(
            &other.message,
            &other.identity,
            other.local_preference,
        );

        data1.compare(&data2)
    }
}

/// What the state decision algorithm recommends for the port
#[derive(Debug, Clone, Copy)]
pub(crate) enum RecommendedState {
    /// Become (or stay) master because of our clock class (decision M1/M2)
    M1(DefaultDS),
    /// Become (or stay) master after winning the comparison (decision M2)
    M2(DefaultDS),
    /// Go passive: a better master exists but we may not slave (decision P1)
    P1(AnnounceMessage),
    /// Synchronize to the given master (decision S1)
    S1(AnnounceMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bmc::acceptable_master::AcceptAnyMaster,
        config::InstanceConfig,
        datastructures::{
            common::ClockIdentity,
            datasets::{CurrentDS, ParentDS, TimePropertiesDS},
            messages::{Message, MessageBody},
        },
        time::Duration,
    };

    fn announce_with_priority1(identity_byte: u8, priority_1: u8, seq: u16) -> AnnounceMessage {
        let default_ds = DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([identity_byte; 8]),
            priority_1,
            ..Default::default()
        });
        let parent_ds = ParentDS::new(default_ds);

        let message = Message::announce(
            &default_ds,
            &parent_ds,
            &CurrentDS {
                steps_removed: 1,
                ..Default::default()
            },
            &TimePropertiesDS::default(),
            PortIdentity {
                clock_identity: default_ds.clock_identity,
                port_number: 1,
            },
            seq,
            Interval::ONE_SECOND,
        );

        match message.body {
            MessageBody::Announce(announce) => announce,
            _ => unreachable!(),
        }
    }

    fn own_identity() -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([0xaa; 8]),
            port_number: 1,
        }
    }

    fn qualify(bmca: &mut Bmca<AcceptAnyMaster>, announce: AnnounceMessage, t0: Time) {
        let mut second = announce;
        second.header.sequence_id = announce.header.sequence_id.wrapping_add(1);
        bmca.register_announce_message(&announce, 255, t0);
        bmca.register_announce_message(&second, 255, t0 + Duration::from_secs(1));
    }

    #[test]
    fn lower_priority1_wins_election() {
        let mut bmca = Bmca::new(AcceptAnyMaster, Interval::TWO_SECONDS, own_identity());
        let t0 = Time::from_secs(0);

        // A: grandmaster aa..01, priority1 128; B: grandmaster aa..02,
        // priority1 127. Both class 248, stepsRemoved 1.
        qualify(&mut bmca, announce_with_priority1(0x01, 128, 0), t0);
        qualify(&mut bmca, announce_with_priority1(0x02, 127, 0), t0);

        let best = bmca
            .take_best_announce_message(t0 + Duration::from_secs(1))
            .unwrap();
        assert_eq!(best.message.grandmaster_identity, ClockIdentity([0x02; 8]));
    }

    #[test]
    fn recommends_slave_when_beaten() {
        let own_data = DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([0xaa; 8]),
            ..Default::default()
        });

        let best = BestAnnounceMessage {
            message: announce_with_priority1(0x01, 1, 0),
            local_preference: 255,
            identity: own_identity(),
        };

        match Bmca::<AcceptAnyMaster>::calculate_recommended_state(&own_data, Some(best), false) {
            Some(RecommendedState::S1(message)) => {
                assert_eq!(message.grandmaster_identity, ClockIdentity([0x01; 8]));
            }
            other => panic!("expected S1, got {other:?}"),
        }
    }

    #[test]
    fn recommends_master_without_candidates() {
        let own_data = DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([0xaa; 8]),
            ..Default::default()
        });

        // While listening with no candidates the port stays put
        assert!(
            Bmca::<AcceptAnyMaster>::calculate_recommended_state(&own_data, None, true).is_none()
        );

        // Outside of listening the port is told to become master
        match Bmca::<AcceptAnyMaster>::calculate_recommended_state(&own_data, None, false) {
            Some(RecommendedState::M1(_)) => {}
            other => panic!("expected M1, got {other:?}"),
        }
    }

    #[test]
    fn slave_only_never_recommends_master() {
        let own_data = DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([0xaa; 8]),
            slave_only: true,
            ..Default::default()
        });

        let best = BestAnnounceMessage {
            message: announce_with_priority1(0x01, 200, 0),
            local_preference: 255,
            identity: own_identity(),
        };

        match Bmca::<AcceptAnyMaster>::calculate_recommended_state(&own_data, Some(best), false) {
            Some(RecommendedState::S1(_)) => {}
            other => panic!("expected S1, got {other:?}"),
        }
    }

    #[test]
    fn master_only_clock_goes_passive() {
        let mut config = InstanceConfig {
            clock_identity: ClockIdentity([0xaa; 8]),
            ..Default::default()
        };
        config.clock_quality.clock_class = 13;
        let own_data = DefaultDS::new(config);

        // A better master: lower clock class
        let mut message = announce_with_priority1(0x01, 128, 0);
        message.grandmaster_clock_quality.clock_class = 6;

        let best = BestAnnounceMessage {
            message,
            local_preference: 255,
            identity: own_identity(),
        };

        match Bmca::<AcceptAnyMaster>::calculate_recommended_state(&own_data, Some(best), false) {
            Some(RecommendedState::P1(_)) => {}
            other => panic!("expected P1, got {other:?}"),
        }
    }

    #[test]
    fn unacceptable_master_is_not_registered() {
        let acceptable: Option<std::vec::Vec<ClockIdentity>> =
            Some(std::vec![ClockIdentity([0x99; 8])]);
        let mut bmca = Bmca::new(acceptable, Interval::TWO_SECONDS, own_identity());
        let t0 = Time::from_secs(0);

        qualify_generic(&mut bmca, announce_with_priority1(0x01, 128, 0), t0);
        assert!(bmca
            .take_best_announce_message(t0 + Duration::from_secs(1))
            .is_none());
    }

    fn qualify_generic<A: AcceptableMasterList>(
        bmca: &mut Bmca<A>,
        announce: AnnounceMessage,
        t0: Time,
    ) {
        let mut second = announce;
        second.header.sequence_id = announce.header.sequence_id.wrapping_add(1);
        bmca.register_announce_message(&announce, 255, t0);
        bmca.register_announce_message(&second, 255, t0 + Duration::from_secs(1));
    }
}
