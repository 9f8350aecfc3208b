//! Configuration structures handed to the engine by its caller
//!
//! # Instance
//! * [`InstanceConfig`]
//!
//! # Port
//! * [`PortConfig`]

mod instance;
mod port;

pub use instance::InstanceConfig;
pub use port::{DelayMechanism, LeapAction, PortConfig, TransportMode, UnicastMaster};

pub use crate::{
    bmc::acceptable_master::{AcceptAnyMaster, AcceptableMasterList},
    datastructures::{
        common::{
            ClockAccuracy, ClockIdentity, ClockQuality, LeapIndicator, TimeSource,
            TransportAddress,
        },
        datasets::TimePropertiesDS,
    },
    servo::ServoConfig,
};
