//! ADBC Database implementation.
//!
//! This module provides the `Database` type which acts as a factory for
//! creating database connections.

use std::str::FromStr;

use crate::adbc::Connection;
use crate::connection::ConnectionParams;
use crate::error::{ConnectionError, CubeError};

/// ADBC Database connection factory.
///
/// The `Database` type encapsulates validated connection parameters and
/// creates `Connection` instances on demand. Each connection owns its own
/// TCP socket; a `Database` can be shared and connected from multiple
/// threads.
///
/// # Example
///
/// ```no_run
/// use cubearrow_rs::adbc::Database;
/// use std::str::FromStr;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let database = Database::from_str("cube://token@localhost:4445")?;
/// let mut connection = database.connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// Validated connection parameters
    params: ConnectionParams,
}

impl Database {
    /// Create a new Database instance from connection parameters.
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    /// The validated connection parameters.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Establish a connection: TCP connect, protocol handshake, and token
    /// authentication.
    ///
    /// # Errors
    ///
    /// Returns `Io` on connect failure, `Protocol` on handshake mismatch,
    /// and `Unauthenticated` when the server rejects the token.
    pub fn connect(&self) -> Result<Connection, CubeError> {
        Connection::connect(&self.params)
    }
}

impl FromStr for Database {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(ConnectionParams::from_str(s)?))
    }
}
