//! The bounded table of foreign masters currently advertising on the domain

use arrayvec::ArrayVec;

use crate::{
    datastructures::{common::PortIdentity, messages::AnnounceMessage},
    time::{Duration, Interval, Time},
};

/// Multiples of the announce interval that announce messages stay relevant
/// for. Together with [`FOREIGN_MASTER_THRESHOLD`] this forms the
/// qualification window.
pub(crate) const FOREIGN_MASTER_TIME_WINDOW: u32 = 4;

/// Number of announce messages that must arrive inside the time window for a
/// foreign master to be qualified
pub(crate) const FOREIGN_MASTER_THRESHOLD: usize = 2;

/// Announce messages retained per foreign master inside the window
const MAX_ANNOUNCE_MESSAGES: usize = 8;

/// Upper bound of foreign masters tracked at the same time
pub(crate) const MAX_FOREIGN_MASTERS: usize = 5;

#[derive(Debug)]
pub(crate) struct ForeignMaster {
    port_identity: PortIdentity,
    local_preference: u8,
    // Capacity must be at least FOREIGN_MASTER_THRESHOLD
    announce_messages: ArrayVec<(AnnounceMessage, Time), MAX_ANNOUNCE_MESSAGES>,
}

impl ForeignMaster {
    fn new(announce_message: AnnounceMessage, local_preference: u8, now: Time) -> Self {
        let mut messages = ArrayVec::new();
        messages.push((announce_message, now));

        Self {
            port_identity: announce_message.header.source_port_identity,
            local_preference,
            announce_messages: messages,
        }
    }

    pub(crate) fn local_preference(&self) -> u8 {
        self.local_preference
    }

    /// Drop messages older than the qualification window.
    ///
    /// Returns true when nothing relevant is left.
    fn purge_old_messages(&mut self, announce_interval: Interval, now: Time) -> bool {
        let cutoff =
            Duration::from_interval(announce_interval) * FOREIGN_MASTER_TIME_WINDOW as i32;
        self.announce_messages
            .retain(|(_, received_at)| now - *received_at < cutoff);

        self.announce_messages.is_empty()
    }

    fn register_announce_message(
        &mut self,
        announce_message: AnnounceMessage,
        announce_interval: Interval,
        now: Time,
    ) {
        self.purge_old_messages(announce_interval, now);

        // On overflow the oldest message makes room
        if let Err(e) = self.announce_messages.try_push((announce_message, now)) {
            self.announce_messages.remove(0);
            self.announce_messages.push(e.element());
        }
    }

    fn is_qualified(&self) -> bool {
        self.announce_messages.len() >= FOREIGN_MASTER_THRESHOLD
    }
}

/// The record of recent announce senders of one port, bounded to
/// [`MAX_FOREIGN_MASTERS`] entries.
#[derive(Debug)]
pub(crate) struct ForeignMasterList {
    foreign_masters: ArrayVec<ForeignMaster, MAX_FOREIGN_MASTERS>,
    own_announce_interval: Interval,
    own_port_identity: PortIdentity,
}

impl ForeignMasterList {
    /// - `own_announce_interval`: the interval derived from the port's
    ///   logAnnounceInterval
    /// - `own_port_identity`: the identity of the port owning this list
    pub(crate) fn new(own_announce_interval: Interval, own_port_identity: PortIdentity) -> Self {
        Self {
            foreign_masters: ArrayVec::new(),
            own_announce_interval,
            own_port_identity,
        }
    }

    /// Pull the newest announce message of every currently qualified foreign
    /// master, with its local preference.
    pub(crate) fn qualified_announce_messages(
        &mut self,
        now: Time,
    ) -> impl Iterator<Item = (AnnounceMessage, u8)> {
        let announce_interval = self.own_announce_interval;
        for i in (0..self.foreign_masters.len()).rev() {
            if self.foreign_masters[i].purge_old_messages(announce_interval, now) {
                self.foreign_masters.remove(i);
            }
        }

        let mut qualified = ArrayVec::<_, MAX_FOREIGN_MASTERS>::new();
        for master in &self.foreign_masters {
            if master.is_qualified() {
                if let Some((message, _)) = master.announce_messages.last() {
                    qualified.push((*message, master.local_preference));
                }
            }
        }

        qualified.into_iter()
    }

    pub(crate) fn register_announce_message(
        &mut self,
        announce_message: &AnnounceMessage,
        local_preference: u8,
        now: Time,
    ) {
        if !self.is_announce_message_usable(announce_message) {
            return;
        }

        let announce_interval = self.own_announce_interval;

        if let Some(foreign_master) =
            self.get_foreign_master_mut(announce_message.header.source_port_identity)
        {
            foreign_master.register_announce_message(*announce_message, announce_interval, now);
            return;
        }

        let record = ForeignMaster::new(*announce_message, local_preference, now);
        if let Err(e) = self.foreign_masters.try_push(record) {
            // Table full: the least qualified record is evicted; when every
            // record is qualified the newcomer is dropped instead
            if let Some(weakest) = self
                .foreign_masters
                .iter()
                .enumerate()
                .filter(|(_, fm)| !fm.is_qualified())
                .min_by_key(|(_, fm)| fm.announce_messages.len())
                .map(|(i, _)| i)
            {
                self.foreign_masters[weakest] = e.element();
            }
        }
    }

    fn get_foreign_master_mut(
        &mut self,
        port_identity: PortIdentity,
    ) -> Option<&mut ForeignMaster> {
        self.foreign_masters
            .iter_mut()
            .find(|fm| fm.port_identity == port_identity)
    }

    fn get_foreign_master(&self, port_identity: PortIdentity) -> Option<&ForeignMaster> {
        self.foreign_masters
            .iter()
            .find(|fm| fm.port_identity == port_identity)
    }

    fn is_announce_message_usable(&self, announce_message: &AnnounceMessage) -> bool {
        let source_identity = announce_message.header.source_port_identity;

        // 1. It must not come from our own instance; one clock per instance,
        // so comparing the clock identity suffices
        if source_identity.clock_identity == self.own_port_identity.clock_identity {
            return false;
        }

        // 2. It must be newer than the ones we already hold, modulo sequence
        // id rollover
        if let Some(foreign_master) = self.get_foreign_master(source_identity) {
            if let Some((last_announce, _)) = foreign_master.announce_messages.last() {
                let announce_sequence_id = announce_message.header.sequence_id;
                let last_sequence_id = last_announce.header.sequence_id;

                if announce_sequence_id.wrapping_sub(last_sequence_id) >= u16::MAX / 2 {
                    return false;
                }
            }
        }

        // 3. A stepsRemoved of 255 or greater disqualifies the sender
        if announce_message.steps_removed >= 255 {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::InstanceConfig,
        datastructures::{
            common::ClockIdentity,
            datasets::{CurrentDS, DefaultDS, ParentDS, TimePropertiesDS},
            messages::{Message, MessageBody},
        },
    };

    fn announce_from(identity: u8, sequence_id: u16) -> AnnounceMessage {
        let default_ds = DefaultDS::new(InstanceConfig {
            clock_identity: ClockIdentity([identity; 8]),
            ..Default::default()
        });
        let parent_ds = ParentDS::new(default_ds);

        let message = Message::announce(
            &default_ds,
            &parent_ds,
            &CurrentDS::default(),
            &TimePropertiesDS::default(),
            PortIdentity {
                clock_identity: default_ds.clock_identity,
                port_number: 1,
            },
            sequence_id,
            Interval::ONE_SECOND,
        );

        match message.body {
            MessageBody::Announce(announce) => announce,
            _ => unreachable!(),
        }
    }

    fn own_identity() -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([0; 8]),
            port_number: 1,
        }
    }

    #[test]
    fn qualification_needs_two_announces_in_window() {
        let mut list = ForeignMasterList::new(Interval::ONE_SECOND, own_identity());
        let t0 = Time::from_secs(10);

        list.register_announce_message(&announce_from(1, 0), 255, t0);
        assert_eq!(list.qualified_announce_messages(t0).count(), 0);

        list.register_announce_message(
            &announce_from(1, 1),
            255,
            t0 + Duration::from_secs(1),
        );
        assert_eq!(
            list.qualified_announce_messages(t0 + Duration::from_secs(1)).count(),
            1
        );
    }

    #[test]
    fn stale_records_disqualify() {
        let mut list = ForeignMasterList::new(Interval::ONE_SECOND, own_identity());
        let t0 = Time::from_secs(10);

        list.register_announce_message(&announce_from(1, 0), 255, t0);
        list.register_announce_message(&announce_from(1, 1), 255, t0 + Duration::from_secs(1));

        // Both messages fall outside the 4 second window
        let much_later = t0 + Duration::from_secs(30);
        assert_eq!(list.qualified_announce_messages(much_later).count(), 0);
    }

    #[test]
    fn own_messages_are_ignored() {
        let mut list = ForeignMasterList::new(Interval::ONE_SECOND, own_identity());
        let t0 = Time::from_secs(10);

        list.register_announce_message(&announce_from(0, 0), 255, t0);
        list.register_announce_message(&announce_from(0, 1), 255, t0);
        assert_eq!(list.qualified_announce_messages(t0).count(), 0);
    }

    #[test]
    fn out_of_order_announce_is_dropped() {
        let mut list = ForeignMasterList::new(Interval::ONE_SECOND, own_identity());
        let t0 = Time::from_secs(10);

        list.register_announce_message(&announce_from(1, 10), 255, t0);
        // An older sequence id does not count toward qualification
        list.register_announce_message(&announce_from(1, 9), 255, t0);
        assert_eq!(list.qualified_announce_messages(t0).count(), 0);
    }

    #[test]
    fn overflow_evicts_unqualified_record() {
        let mut list = ForeignMasterList::new(Interval::ONE_SECOND, own_identity());
        let t0 = Time::from_secs(10);

        for identity in 1..=MAX_FOREIGN_MASTERS as u8 {
            list.register_announce_message(&announce_from(identity, 0), 255, t0);
        }

        // The table is full of unqualified records; a new sender replaces one
        list.register_announce_message(&announce_from(42, 0), 255, t0);
        list.register_announce_message(&announce_from(42, 1), 255, t0);
        assert_eq!(list.qualified_announce_messages(t0).count(), 1);
    }
}
