//! Time primitives used throughout `nanosync`: a point in time ([`Time`]),
//! a signed span between two points ([`Duration`]), and the log2-seconds
//! message pacing value ([`Interval`]).
//!
//! These replace the [`core::time`] types because PTP needs sub-nanosecond
//! resolution and the exact signed normalization rules of the on-wire
//! formats.

mod duration;
mod instant;
mod interval;

pub use duration::Duration;
pub use instant::Time;
pub use interval::Interval;
