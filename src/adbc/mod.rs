//! ADBC (Arrow Database Connectivity) interface implementation.
//!
//! This module provides the high-level driver API: `Driver` creates
//! `Database` factories from connection strings, `Database` opens
//! authenticated `Connection`s, and connections execute SQL and hand back
//! Arrow batches or C Data Interface streams.
//!
//! # Example
//!
//! ```no_run
//! use cubearrow_rs::adbc::Driver;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = Driver::new();
//! let database = driver.open("cube://token@localhost:4445")?;
//! let mut connection = database.connect()?;
//!
//! for batch in connection.query("SELECT 1 AS test")? {
//!     println!("rows: {}", batch?.num_rows());
//! }
//!
//! connection.close();
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod database;
pub mod driver;
pub mod statement;

pub use connection::Connection;
pub use database::Database;
pub use driver::Driver;
pub use statement::Statement;
