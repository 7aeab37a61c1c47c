//! ADBC Driver implementation.
//!
//! This module provides the `Driver` type which contains metadata about the
//! cubearrow-rs driver and serves as a factory for creating `Database`
//! instances.

use std::str::FromStr;

use crate::adbc::Database;
use crate::error::ConnectionError;

/// ADBC Driver for Cube's Arrow Native protocol.
///
/// The `Driver` type represents the cubearrow-rs driver and provides metadata
/// about the driver implementation. It serves as the entry point for creating
/// database connections.
///
/// # Example
///
/// ```
/// use cubearrow_rs::adbc::Driver;
///
/// let driver = Driver::new();
/// println!("Driver: {} v{}", driver.name(), driver.version());
/// ```
#[derive(Debug, Clone)]
pub struct Driver {
    /// Driver name
    name: String,
    /// Driver version
    version: String,
    /// Vendor name
    vendor: String,
}

impl Driver {
    /// Create a new Driver instance.
    pub fn new() -> Self {
        Self {
            name: "cubearrow-rs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            vendor: "Cube".to_string(),
        }
    }

    /// Get the driver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the driver version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get the vendor name.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Open a database connection factory.
    ///
    /// Parses the connection string and creates a `Database` instance that
    /// can be used to establish connections.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the connection string is invalid.
    pub fn open(&self, connection_string: &str) -> Result<Database, ConnectionError> {
        Database::from_str(connection_string)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}
