//! ADBC Statement implementation.
//!
//! Statement is a thin SQL holder; execution happens on the `Connection`.

use crate::error::{ConnectionError, CubeError};
use crate::ipc::IpcStreamReader;

use super::Connection;

/// SQL statement bound to a connection.
#[derive(Debug)]
pub struct Statement<'conn> {
    connection: &'conn mut Connection,
    sql: Option<String>,
}

impl<'conn> Statement<'conn> {
    /// Create a statement on a connection.
    pub fn new(connection: &'conn mut Connection) -> Self {
        Self {
            connection,
            sql: None,
        }
    }

    /// Set the SQL text to execute.
    pub fn set_sql_query(&mut self, sql: &str) {
        self.sql = Some(sql.to_string());
    }

    /// Execute the statement and return a batch reader.
    ///
    /// # Errors
    ///
    /// `InvalidState` if no SQL was set; otherwise the connection's query
    /// errors.
    pub fn execute(&mut self) -> Result<IpcStreamReader, CubeError> {
        let sql = self
            .sql
            .as_ref()
            .ok_or_else(|| ConnectionError::InvalidState("SQL query not set".to_string()))?;
        self.connection.query(sql)
    }
}
