use arrayvec::ArrayVec;

use crate::datastructures::{
    common::{PortIdentity, TransportAddress},
    messages::MAX_DATA_LEN,
};

/// Identification of an event packet awaiting its transmit timestamp.
///
/// The caller receives this from a [`PortAction::SendEvent`] and must return
/// it through [`Port::handle_send_timestamp`](`crate::port::Port::handle_send_timestamp`)
/// once the transmit timestamp is known. Non-copy and non-clone on purpose:
/// one timestamp per send.
#[derive(Debug)]
pub struct TimestampContext {
    pub(super) inner: TimestampContextInner,
}

#[derive(Debug)]
pub(super) enum TimestampContextInner {
    Sync {
        id: u16,
        address: Option<TransportAddress>,
    },
    DelayReq {
        id: u16,
    },
    PDelayReq {
        id: u16,
    },
    PDelayResp {
        id: u16,
        requestor_identity: PortIdentity,
        address: Option<TransportAddress>,
    },
}

/// An action the caller must perform for the [`Port`](`crate::port::Port`)
#[derive(Debug)]
#[must_use]
pub enum PortAction {
    /// Send a time critical packet and capture its transmit timestamp.
    ///
    /// Once the timestamp is known, hand the context back through
    /// [`Port::handle_send_timestamp`](`crate::port::Port::handle_send_timestamp`).
    SendEvent {
        /// The timestamp loopback handle
        context: TimestampContext,
        /// The packet bytes
        data: ArrayVec<u8, MAX_DATA_LEN>,
        /// Unicast destination; `None` means the multicast group
        address: Option<TransportAddress>,
    },
    /// Send a general packet; no timestamp capture needed
    SendGeneral {
        /// The packet bytes
        data: ArrayVec<u8, MAX_DATA_LEN>,
        /// Unicast destination; `None` means the multicast group
        address: Option<TransportAddress>,
    },
    /// Re-join multicast groups and refresh transport state, e.g. after the
    /// master network refresh interval or a fault recovery
    RefreshTransport,
    /// The status observation (status file, observers) should be refreshed
    UpdateStatus,
}

pub(super) const MAX_ACTIONS: usize = 16;

/// An iterator over the [`PortAction`]s produced by one engine call
#[derive(Debug)]
#[must_use]
pub struct PortActionIterator {
    internal: <ArrayVec<PortAction, MAX_ACTIONS> as IntoIterator>::IntoIter,
}

impl PortActionIterator {
    /// An empty iterator, handy as the default arm of chained handlers
    pub fn empty() -> Self {
        Self {
            internal: ArrayVec::new().into_iter(),
        }
    }

    pub(super) fn from(list: ArrayVec<PortAction, MAX_ACTIONS>) -> Self {
        Self {
            internal: list.into_iter(),
        }
    }
}

impl Iterator for PortActionIterator {
    type Item = PortAction;

    fn next(&mut self) -> Option<Self::Item> {
        self.internal.next()
    }
}
