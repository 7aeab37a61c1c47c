//! # cubearrow-rs
//!
//! ADBC-compatible driver for Cube's Arrow Native protocol with Apache Arrow
//! result sets.
//!
//! The driver speaks the binary Arrow Native protocol (default port 4445):
//! length-framed messages over TCP for handshake, token authentication and
//! query execution, with results returned as an Arrow IPC stream that is
//! decoded into `RecordBatch`es and exposed through the Arrow C Data
//! Interface.
//!
//! ## Example
//!
//! ```no_run
//! use cubearrow_rs::adbc::Driver;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Open a database and connect
//! let driver = Driver::new();
//! let database = driver.open("cube://my-token@localhost:4445/analytics")?;
//! let mut connection = database.connect()?;
//!
//! // Execute a query and stream Arrow record batches
//! let reader = connection.query("SELECT status, count FROM orders")?;
//! for batch in reader {
//!     println!("rows: {}", batch?.num_rows());
//! }
//!
//! connection.close();
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod adbc;
pub mod connection;
pub mod error;
pub mod ipc;
pub mod stream;
pub mod transport;
pub mod types;

// FFI module for C-compatible ADBC export (conditionally compiled)
#[cfg(feature = "ffi")]
pub mod adbc_ffi;

// Re-export public API
pub use adbc::{Connection, Database, Driver, Statement};
pub use connection::{ConnectionBuilder, ConnectionParams};
pub use error::{AdbcStatusCode, CubeError};
pub use ipc::IpcStreamReader;
pub use transport::{NativeClient, PROTOCOL_VERSION};

// Re-export FFI types when the ffi feature is enabled
#[cfg(feature = "ffi")]
pub use adbc_ffi::{FfiConnection, FfiDatabase, FfiDriver, FfiStatement};
