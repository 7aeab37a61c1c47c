//! ADBC Connection implementation.
//!
//! A `Connection` owns one authenticated `NativeClient` and turns query
//! results into Arrow readers or C Data Interface streams.

use arrow::ffi_stream::FFI_ArrowArrayStream;
use arrow_array::RecordBatch;

use crate::connection::ConnectionParams;
use crate::error::CubeError;
use crate::ipc::IpcStreamReader;
use crate::stream::export_reader;
use crate::transport::NativeClient;

/// Active connection to a Cube Arrow Native endpoint.
///
/// Queries on one connection are strictly serialized; for concurrent
/// queries open one connection per thread.
#[derive(Debug)]
pub struct Connection {
    client: NativeClient,
}

impl Connection {
    /// Connect, handshake, and authenticate in one step.
    pub fn connect(params: &ConnectionParams) -> Result<Self, CubeError> {
        let mut client = NativeClient::new();
        client.connect(&params.host, params.port, params.timeout)?;
        client.authenticate(params.token(), params.database.as_deref())?;
        Ok(Self { client })
    }

    /// Execute a query and return a streaming reader over its batches.
    ///
    /// The reader owns the result bytes; the connection is free for the
    /// next query as soon as this returns.
    pub fn query(&mut self, sql: &str) -> Result<IpcStreamReader, CubeError> {
        let outcome = self.client.execute_query(sql)?;
        Ok(IpcStreamReader::new(outcome.ipc_bytes)?)
    }

    /// Execute a query and collect every batch eagerly.
    pub fn query_batches(&mut self, sql: &str) -> Result<Vec<RecordBatch>, CubeError> {
        let mut reader = self.query(sql)?;
        let mut batches = Vec::new();
        while let Some(batch) = reader.next_batch()? {
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Execute a query and export the result through the Arrow C Data
    /// Interface. Ownership of the result transfers to the returned stream.
    pub fn query_stream(&mut self, sql: &str) -> Result<FFI_ArrowArrayStream, CubeError> {
        Ok(export_reader(self.query(sql)?))
    }

    /// Server software version reported in the handshake.
    pub fn server_version(&self) -> Option<&str> {
        self.client.server_version()
    }

    /// Session id assigned on authentication.
    pub fn session_id(&self) -> Option<&str> {
        self.client.session_id()
    }

    /// Whether the underlying client is authenticated and usable.
    pub fn is_open(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Close the connection. Idempotent.
    pub fn close(&mut self) {
        self.client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connect_failure_is_io() {
        let params = ConnectionParams::builder()
            .host("127.0.0.1")
            .port(1)
            .token("tok")
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        let err = Connection::connect(&params).unwrap_err();
        assert_eq!(
            err.to_adbc_code(),
            crate::error::AdbcStatusCode::Io
        );
    }
}
