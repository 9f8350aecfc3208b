/// The per-port message and error counters, exposed through the
/// observability snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)] // names say it all
pub struct PortCounters {
    // received messages
    pub sync_received: u32,
    pub follow_up_received: u32,
    pub delay_req_received: u32,
    pub delay_resp_received: u32,
    pub pdelay_req_received: u32,
    pub pdelay_resp_received: u32,
    pub pdelay_resp_follow_up_received: u32,
    pub announce_received: u32,
    pub signaling_received: u32,
    pub management_received: u32,

    // sent messages
    pub sync_sent: u32,
    pub follow_up_sent: u32,
    pub delay_req_sent: u32,
    pub delay_resp_sent: u32,
    pub pdelay_resp_sent: u32,
    pub announce_sent: u32,
    pub signaling_sent: u32,
    pub management_sent: u32,

    // errors and drops
    pub format_errors: u32,
    pub version_mismatch_errors: u32,
    pub domain_mismatch_errors: u32,
    pub sequence_mismatch_errors: u32,
    pub follow_up_mismatch_errors: u32,
    pub protocol_errors: u32,
    pub discarded_messages: u32,
    pub send_errors: u32,

    // unicast negotiation
    pub unicast_grants_requested: u32,
    pub unicast_grants_granted: u32,
    pub unicast_grants_denied: u32,
    pub unicast_grants_canceled: u32,

    // engine events
    pub state_transitions: u32,
    pub master_changes: u32,
    pub clock_steps: u32,
    pub panic_mode_entries: u32,
    pub clock_updates_applied: u32,
    pub clock_updates_suppressed: u32,
}
