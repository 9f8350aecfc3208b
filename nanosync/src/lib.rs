//! `nanosync` is an implementation of PTP version 2 (IEEE 1588-2008) for a
//! single port ordinary clock: it can discipline a local clock to a network
//! grandmaster with sub-microsecond accuracy, or serve time to a domain as
//! the grandmaster itself.
//!
//! The crate is a sans-IO protocol core. It owns the data sets, the best
//! master clock algorithm, the unicast grant table, the event timers and the
//! clock servo, but it never opens a socket: the caller feeds received
//! packets (with their capture timestamps) into the [`port::Port`] and
//! executes the [`port::PortAction`]s it emits. The companion
//! `nanosync-linux` crate wires a port to timestamped UDP or Ethernet
//! sockets and the system or PTP hardware clock.
//!
//! Platform independence also extends to the clock: anything implementing
//! [`Clock`] can be disciplined, including virtual clocks in tests.

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod alarms;
pub mod bmc;
mod clock;
pub mod config;
pub mod datastructures;
mod float_polyfill;
pub mod observability;
pub mod port;
pub mod servo;
pub mod time;
pub(crate) mod unicast;

pub use clock::Clock;
