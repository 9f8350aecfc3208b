//! Common data structures that are used throughout the protocol

mod clock_accuracy;
mod clock_identity;
mod clock_quality;
mod leap_indicator;
mod port_identity;
mod time_interval;
mod time_source;
mod timestamp;
mod tlv;
mod transport_address;

pub use clock_accuracy::*;
pub use clock_identity::*;
pub use clock_quality::*;
pub use leap_indicator::*;
pub use port_identity::*;
pub use time_interval::*;
pub use time_source::*;
pub use timestamp::*;
pub use tlv::*;
pub use transport_address::*;
