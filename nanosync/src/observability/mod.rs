//! Serializable snapshots of the engine state for status files, unix socket
//! observers and metrics exporters.
//!
//! Snapshots are taken by [`Port::observe`](`crate::port::Port::observe`)
//! from within the main loop; observers never touch the live state.

use crate::{
    datastructures::datasets::{CurrentDS, DefaultDS, ParentDS, TimePropertiesDS},
    port::PortCounters,
    servo::ClockState,
};

/// The full observable state of the instance
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservableState {
    /// The static description of this instance
    pub default_ds: DefaultDS,
    /// The live synchronization numbers
    pub current_ds: CurrentDS,
    /// The elected parent and grandmaster
    pub parent_ds: ParentDS,
    /// The distributed timescale properties
    pub time_properties_ds: TimePropertiesDS,
    /// The protocol state of the port, encoded per *IEEE1588-2008 table 8*
    pub port_state: u8,
    /// Message and error counters
    pub counters: PortCounters,
    /// The clock servo's view of the world
    pub servo: ObservableServoState,
}

/// Observable servo state
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservableServoState {
    /// The clock discipline state
    pub clock_state: ClockState,
    /// The current frequency correction in parts per billion
    pub frequency_ppb: f64,
    /// The most recent Allan deviation estimate, when available
    pub allan_deviation: Option<f64>,
    /// Last measured offset from the master in nanoseconds
    pub offset_from_master_ns: f64,
    /// Current one-way delay estimate in nanoseconds
    pub mean_path_delay_ns: f64,
}
