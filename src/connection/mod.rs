//! Connection configuration.

pub mod params;

pub use params::{ConnectionBuilder, ConnectionMode, ConnectionParams};
