//! The unicast transmission grant table and its refresh logic.
//!
//! Each peer occupies one node in a fixed-size table, found through an FNV-1
//! hashed index with a linear scan fallback on collision. A node carries one
//! grant record per negotiable message type; the engine turns the events this
//! module produces into REQUEST/GRANT/CANCEL signaling.

use arrayvec::ArrayVec;

use crate::datastructures::{
    common::{PortIdentity, TransportAddress},
    messages::MessageType,
};

/// Capacity of the grant table
pub(crate) const UNICAST_MAX_DESTINATIONS: usize = 256;

/// Cancels resent without acknowledgement before state is cleared
/// unilaterally
pub(crate) const GRANT_CANCEL_ACK_TIMEOUT: u8 = 3;

/// Every this many refresh ticks the keepalive check runs
pub(crate) const GRANT_KEEPALIVE_INTERVAL: u32 = 5;

/// Missed message intervals before a granted type is re-requested
pub(crate) const GRANT_MAX_MISSED: u32 = 10;

/// Extra seconds a grantor keeps a grant alive beyond its duration
pub(crate) const GRANT_TIME_LEFT_GRACE: u32 = 10;

/// Remaining seconds at which a grant counts as expiring and gets renewed
pub(crate) const GRANT_EXPIRY_MARGIN: i32 = 5;

/// Shortest grant duration a master hands out
pub(crate) const GRANT_MIN_DURATION: u32 = 30;

/// The message types subject to unicast negotiation, compacted into array
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum GrantType {
    Announce = 0,
    Sync = 1,
    DelayResp = 2,
    PdelayResp = 3,
    Signaling = 4,
}

impl GrantType {
    pub(crate) const COUNT: usize = 5;

    pub(crate) fn from_message_type(message_type: MessageType) -> Option<Self> {
        match message_type {
            MessageType::Announce => Some(GrantType::Announce),
            MessageType::Sync => Some(GrantType::Sync),
            MessageType::DelayResp => Some(GrantType::DelayResp),
            MessageType::PDelayResp => Some(GrantType::PdelayResp),
            MessageType::Signaling => Some(GrantType::Signaling),
            _ => None,
        }
    }

    pub(crate) fn message_type(self) -> MessageType {
        match self {
            GrantType::Announce => MessageType::Announce,
            GrantType::Sync => MessageType::Sync,
            GrantType::DelayResp => MessageType::DelayResp,
            GrantType::PdelayResp => MessageType::PDelayResp,
            GrantType::Signaling => MessageType::Signaling,
        }
    }
}

/// The grant state of one message type toward one peer
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnicastGrantData {
    /// A request is outstanding or in force
    pub(crate) requested: bool,
    /// The transmission is currently granted
    pub(crate) granted: bool,
    /// A cancel is in flight, awaiting acknowledgement
    pub(crate) canceled: bool,
    /// The grant ran down and needs renewal
    pub(crate) expired: bool,
    /// May this type be requested from or granted to the peer at all
    pub(crate) requestable: bool,
    /// The granted (or to be requested) log2 message interval
    pub(crate) log_interval: i8,
    /// Finest interval we offer or ask for
    pub(crate) log_min_interval: i8,
    /// Coarsest interval we offer or ask for
    pub(crate) log_max_interval: i8,
    /// Granted duration in seconds
    pub(crate) duration: u32,
    /// Seconds until the grant runs out
    pub(crate) time_left: i32,
    /// Sequence id of the next message sent under this grant
    pub(crate) sent_seq_id: u16,
    /// Interval bookkeeping for paced transmission
    pub(crate) interval_counter: u32,
    /// Messages of this type received since the last keepalive check
    pub(crate) receiving: u32,
    /// Keepalive rounds without any received message
    pub(crate) missed_keepalives: u32,
    /// Unacknowledged cancels sent so far
    pub(crate) cancel_count: u8,
}

impl UnicastGrantData {
    /// Wipe the grant after a cancel completed or timed out
    pub(crate) fn clear(&mut self) {
        let (requestable, log_min, log_max, log_interval) = (
            self.requestable,
            self.log_min_interval,
            self.log_max_interval,
            self.log_interval,
        );
        *self = UnicastGrantData {
            requestable,
            log_min_interval: log_min,
            log_max_interval: log_max,
            log_interval,
            ..Default::default()
        };
    }
}

/// One peer in the grant table
#[derive(Debug, Clone)]
pub(crate) struct GrantNode {
    /// The peer's port identity, the primary key
    pub(crate) port_identity: PortIdentity,
    /// The peer's transport address, the secondary key
    pub(crate) address: TransportAddress,
    /// Seconds until the whole node is considered free again
    pub(crate) time_left: i32,
    /// True when this node is a master we request grants from (rather than
    /// a slave we serve)
    pub(crate) is_master: bool,
    /// G.8265.1 local preference fed into the BMCA
    pub(crate) local_preference: u8,
    /// Per message type grant state
    pub(crate) grants: [UnicastGrantData; GrantType::COUNT],
}

impl GrantNode {
    fn empty() -> Self {
        Self {
            port_identity: PortIdentity::default(),
            address: TransportAddress::default(),
            time_left: 0,
            is_master: false,
            local_preference: 255,
            grants: [UnicastGrantData::default(); GrantType::COUNT],
        }
    }

    fn is_free(&self) -> bool {
        self.time_left <= 0 && self.grants.iter().all(|g| !g.requested && !g.granted)
    }

    pub(crate) fn grant(&self, grant_type: GrantType) -> &UnicastGrantData {
        &self.grants[grant_type as usize]
    }

    pub(crate) fn grant_mut(&mut self, grant_type: GrantType) -> &mut UnicastGrantData {
        &mut self.grants[grant_type as usize]
    }
}

/// FNV-1 32-bit hash, reduced modulo the table size
fn fnv1_hash(port_identity: &PortIdentity) -> usize {
    const PRIME: u32 = 16_777_619;
    const BASIS: u32 = 2_166_136_261;

    let mut hash = BASIS;
    for byte in port_identity.clock_identity.0 {
        hash = hash.wrapping_mul(PRIME);
        hash ^= byte as u32;
    }
    for byte in port_identity.port_number.to_be_bytes() {
        hash = hash.wrapping_mul(PRIME);
        hash ^= byte as u32;
    }

    hash as usize % UNICAST_MAX_DESTINATIONS
}

/// Renewal work the refresh tick wants the engine to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrantEvent {
    /// (Re)send a REQUEST_UNICAST_TRANSMISSION for this type
    Request {
        /// Index of the peer in the table
        node: usize,
        /// The message type to request
        grant_type: GrantType,
    },
}

/// The fixed-size table of unicast peers with its hashed index
pub(crate) struct UnicastGrantTable {
    nodes: ArrayVec<GrantNode, UNICAST_MAX_DESTINATIONS>,
    index: [Option<u16>; UNICAST_MAX_DESTINATIONS],
    keepalive_round: u32,
}

impl core::fmt::Debug for UnicastGrantTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnicastGrantTable")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl UnicastGrantTable {
    pub(crate) fn new() -> Self {
        Self {
            nodes: ArrayVec::new(),
            index: [None; UNICAST_MAX_DESTINATIONS],
            keepalive_round: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, index: usize) -> &GrantNode {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut GrantNode {
        &mut self.nodes[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &GrantNode> {
        self.nodes.iter()
    }

    /// Find the node of a peer. The hashed index answers most lookups; a
    /// collision falls back to the linear scan and repairs the index.
    pub(crate) fn find(&mut self, port_identity: &PortIdentity) -> Option<usize> {
        let hash = fnv1_hash(port_identity);

        if let Some(slot) = self.index[hash] {
            if let Some(node) = self.nodes.get(slot as usize) {
                if node.port_identity == *port_identity {
                    return Some(slot as usize);
                }
            }
        }

        let found = self
            .nodes
            .iter()
            .position(|node| node.port_identity == *port_identity);
        if let Some(slot) = found {
            self.index[hash] = Some(slot as u16);
        }
        found
    }

    /// Find a peer's node, inserting a fresh one when unknown. A non-empty
    /// address updates the stored one; configured master addresses are kept
    /// when the caller passes an empty address.
    pub(crate) fn find_or_insert(
        &mut self,
        port_identity: &PortIdentity,
        address: TransportAddress,
        is_master: bool,
    ) -> Option<usize> {
        if let Some(slot) = self.find(port_identity) {
            if !address.is_empty() {
                self.nodes[slot].address = address;
            }
            return Some(slot);
        }

        // Reuse a free slot before growing
        let slot = match self.nodes.iter().position(|node| node.is_free()) {
            Some(free) => {
                self.nodes[free] = GrantNode::empty();
                free
            }
            None => {
                if self.nodes.is_full() {
                    return None;
                }
                self.nodes.push(GrantNode::empty());
                self.nodes.len() - 1
            }
        };

        let node = &mut self.nodes[slot];
        node.port_identity = *port_identity;
        node.address = address;
        node.is_master = is_master;

        self.index[fnv1_hash(port_identity)] = Some(slot as u16);
        Some(slot)
    }

    /// Record a received message of a granted type, for the keepalive check
    pub(crate) fn record_received(&mut self, port_identity: &PortIdentity, grant_type: GrantType) {
        if let Some(slot) = self.find(port_identity) {
            let grant = self.nodes[slot].grant_mut(grant_type);
            grant.receiving = grant.receiving.saturating_add(1);
            grant.missed_keepalives = 0;
        }
    }

    /// The 1 Hz grant refresh: ages grants, expires them near the end of
    /// their duration and asks the engine to renew what this node depends
    /// on.
    pub(crate) fn refresh(&mut self) -> ArrayVec<GrantEvent, 16> {
        let mut events = ArrayVec::new();

        self.keepalive_round = (self.keepalive_round + 1) % GRANT_KEEPALIVE_INTERVAL;
        let keepalive_due = self.keepalive_round == GRANT_KEEPALIVE_INTERVAL - 1;

        for (slot, node) in self.nodes.iter_mut().enumerate() {
            let mut node_time_left = 0;

            for grant_type in [
                GrantType::Announce,
                GrantType::Sync,
                GrantType::DelayResp,
                GrantType::PdelayResp,
                GrantType::Signaling,
            ] {
                let is_master = node.is_master;
                let grant = node.grant_mut(grant_type);

                if grant.canceled && grant.cancel_count >= GRANT_CANCEL_ACK_TIMEOUT {
                    // The peer never acknowledged; clear unilaterally
                    log::debug!("unicast grant cancel unacknowledged, clearing locally");
                    grant.clear();
                    continue;
                }

                if grant.granted && !grant.expired {
                    if grant.time_left <= GRANT_EXPIRY_MARGIN {
                        // Renew early so service continues seamlessly
                        grant.expired = true;
                    } else {
                        grant.time_left -= 1;
                        node_time_left = node_time_left.max(grant.time_left);
                    }
                }

                let mut renew = is_master && grant.expired && grant.requestable;

                // Requested but never answered: ask again
                renew |= is_master && grant.requested && !grant.granted && grant.requestable;

                if keepalive_due && is_master && grant.granted && !grant.expired {
                    if grant.receiving == 0 {
                        grant.missed_keepalives += 1;
                        let silent_secs =
                            grant.missed_keepalives * GRANT_KEEPALIVE_INTERVAL;
                        let missed_limit = GRANT_MAX_MISSED as f64
                            * crate::time::Interval::from_log_2(grant.log_interval).seconds();
                        if silent_secs as f64 > missed_limit {
                            log::debug!(
                                "no messages under unicast grant for {silent_secs} s, renewing"
                            );
                            grant.missed_keepalives = 0;
                            renew = true;
                        }
                    }
                    grant.receiving = 0;
                }

                if renew && !events.is_full() {
                    events.push(GrantEvent::Request {
                        node: slot,
                        grant_type,
                    });
                }
            }

            node.time_left = node_time_left;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::common::ClockIdentity;

    fn identity(byte: u8) -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([byte; 8]),
            port_number: 1,
        }
    }

    #[test]
    fn insert_and_find_through_the_index() {
        let mut table = UnicastGrantTable::new();

        let a = table
            .find_or_insert(&identity(1), TransportAddress::from_ipv4([10, 0, 0, 1]), true)
            .unwrap();
        let b = table
            .find_or_insert(&identity(2), TransportAddress::from_ipv4([10, 0, 0, 2]), false)
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(table.find(&identity(1)), Some(a));
        assert_eq!(table.find(&identity(2)), Some(b));
        assert_eq!(table.find(&identity(3)), None);
    }

    #[test]
    fn empty_address_preserves_configured_one() {
        let mut table = UnicastGrantTable::new();
        let configured = TransportAddress::from_ipv4([10, 0, 0, 1]);

        let slot = table
            .find_or_insert(&identity(1), configured, true)
            .unwrap();
        table
            .find_or_insert(&identity(1), TransportAddress::default(), true)
            .unwrap();

        assert_eq!(table.node(slot).address, configured);
    }

    #[test]
    fn grant_expires_near_the_end_of_its_duration() {
        let mut table = UnicastGrantTable::new();
        let slot = table
            .find_or_insert(&identity(1), TransportAddress::from_ipv4([10, 0, 0, 1]), true)
            .unwrap();

        {
            let grant = table.node_mut(slot).grant_mut(GrantType::Sync);
            grant.requestable = true;
            grant.requested = true;
            grant.granted = true;
            grant.duration = 60;
            grant.time_left = 60;
        }

        // 55 seconds in, 5 seconds of lifetime remain and the grant is
        // still serviceable
        let mut renewals = 0;
        for _ in 0..55 {
            renewals += table.refresh().len();
        }
        assert!(!table.node(slot).grant(GrantType::Sync).expired);
        assert_eq!(renewals, 0);

        // One second later it counts as expiring and renewal is requested
        renewals += table.refresh().len();
        assert!(table.node(slot).grant(GrantType::Sync).expired);
        assert_eq!(renewals, 1);
    }

    #[test]
    fn unanswered_cancel_clears_after_retries() {
        let mut table = UnicastGrantTable::new();
        let slot = table
            .find_or_insert(&identity(1), TransportAddress::from_ipv4([10, 0, 0, 1]), true)
            .unwrap();

        {
            let grant = table.node_mut(slot).grant_mut(GrantType::Announce);
            grant.requestable = true;
            grant.granted = true;
            grant.canceled = true;
            grant.cancel_count = GRANT_CANCEL_ACK_TIMEOUT;
        }

        table.refresh();

        let grant = table.node(slot).grant(GrantType::Announce);
        assert!(!grant.granted);
        assert!(!grant.canceled);
        assert_eq!(grant.cancel_count, 0);
    }

    #[test]
    fn full_table_rejects_new_peers() {
        let mut table = UnicastGrantTable::new();

        for i in 0..UNICAST_MAX_DESTINATIONS {
            let identity = PortIdentity {
                clock_identity: ClockIdentity((i as u64).to_be_bytes()),
                port_number: 1,
            };
            let slot = table
                .find_or_insert(&identity, TransportAddress::from_ipv4([10, 0, 0, 1]), false)
                .unwrap();
            // Occupy the slot so it is not considered free
            table.node_mut(slot).time_left = 600;
        }

        assert_eq!(
            table.find_or_insert(&identity(0xfe), TransportAddress::default(), false),
            None
        );
    }
}
