//! Arrow Native wire transport.
//!
//! Three layers, bottom up: length-prefixed frame I/O ([`framing`]), the pure
//! message codec ([`messages`]), and the blocking protocol state machine
//! ([`client`]).

pub mod client;
pub mod framing;
pub mod messages;

pub use client::{NativeClient, QueryOutcome};
pub use messages::{Message, DEFAULT_PORT, PROTOCOL_VERSION};
