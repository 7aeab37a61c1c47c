//! Blocking client for the Arrow Native protocol.
//!
//! `NativeClient` drives a single TCP connection through the protocol state
//! machine: connect and handshake, authenticate, then one query at a time.
//! All socket I/O is blocking; callers wanting concurrency allocate one
//! client per thread.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ConnectionError, CubeError, ProtocolError};
use crate::transport::framing;
use crate::transport::messages::{Message, PROTOCOL_VERSION};

/// Connection state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// No socket open
    Disconnected,
    /// Socket open, handshake complete
    Connected,
    /// Authenticated and ready for queries
    Authenticated,
    /// A protocol or I/O error occurred; only `close` is valid
    Faulted,
    /// Closed by the caller
    Closed,
}

/// Everything a completed query exchange produced.
///
/// `ipc_bytes` holds the concatenated batch-stream segments; the stand-alone
/// schema stream the server sends first is never part of it.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Raw bytes of the batch IPC stream
    pub ipc_bytes: Vec<u8>,
    /// Row count reported by `QueryComplete` (-1 when unknown)
    pub rows_affected: i64,
}

/// Blocking Arrow Native protocol client.
///
/// A client instance is not safe for concurrent queries; queries on one
/// client are strictly serialized by `&mut self`.
#[derive(Debug)]
pub struct NativeClient {
    stream: Option<TcpStream>,
    state: ConnectionState,
    server_version: Option<String>,
    session_id: Option<String>,
}

impl NativeClient {
    /// Create a new, disconnected client.
    pub fn new() -> Self {
        Self {
            stream: None,
            state: ConnectionState::Disconnected,
            server_version: None,
            session_id: None,
        }
    }

    /// Open the TCP connection and perform the protocol handshake.
    ///
    /// When `timeout` is set it bounds the TCP connect and is installed as
    /// the socket read/write deadline for every later exchange. Exceeding a
    /// deadline surfaces as an I/O error and faults the client.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the client is not freshly created, `Io` on
    /// connect/DNS failure, `Protocol` on a handshake version mismatch.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<(), CubeError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState("already connected".to_string()).into());
        }

        let result = self.do_connect(host, port, timeout);
        if result.is_err() {
            self.fault();
        }
        result
    }

    fn do_connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<(), CubeError> {
        let stream = open_socket(host, port, timeout).map_err(|e| {
            ConnectionError::ConnectionFailed {
                host: host.to_string(),
                port,
                message: e.to_string(),
            }
        })?;

        if let Some(t) = timeout {
            stream
                .set_read_timeout(Some(t))
                .and_then(|_| stream.set_write_timeout(Some(t)))
                .map_err(ProtocolError::from)?;
        }

        self.stream = Some(stream);

        self.send(&Message::HandshakeRequest {
            version: PROTOCOL_VERSION,
        })?;

        match self.recv()? {
            Message::HandshakeResponse {
                version,
                server_version,
            } => {
                if version != PROTOCOL_VERSION {
                    return Err(ProtocolError::VersionMismatch {
                        client: PROTOCOL_VERSION,
                        server: version,
                    }
                    .into());
                }
                debug!(host, port, %server_version, "handshake complete");
                self.server_version = Some(server_version);
            }
            other => {
                return Err(ProtocolError::UnexpectedMessageType(other.message_type()).into());
            }
        }

        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Authenticate with an opaque token and optional database name.
    ///
    /// On success the server-assigned session id is stored and queries
    /// become available.
    pub fn authenticate(&mut self, token: &str, database: Option<&str>) -> Result<(), CubeError> {
        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::Authenticated => {
                return Err(
                    ConnectionError::InvalidState("already authenticated".to_string()).into(),
                );
            }
            ConnectionState::Faulted => {
                return Err(ConnectionError::InvalidState(
                    "connection faulted; close it".to_string(),
                )
                .into());
            }
            _ => {
                return Err(ConnectionError::InvalidState(
                    "must connect before authenticating".to_string(),
                )
                .into());
            }
        }

        let result = self.do_authenticate(token, database);
        if result.is_err() {
            self.fault();
        }
        result
    }

    fn do_authenticate(&mut self, token: &str, database: Option<&str>) -> Result<(), CubeError> {
        self.send(&Message::AuthRequest {
            token: token.to_string(),
            database: database.unwrap_or_default().to_string(),
        })?;

        match self.recv()? {
            Message::AuthResponse {
                success,
                session_id,
            } => {
                if !success {
                    return Err(ConnectionError::AuthenticationFailed(
                        "server rejected token".to_string(),
                    )
                    .into());
                }
                debug!(%session_id, "authenticated");
                self.session_id = Some(session_id);
                self.state = ConnectionState::Authenticated;
                Ok(())
            }
            other => Err(ProtocolError::UnexpectedMessageType(other.message_type()).into()),
        }
    }

    /// Execute a SQL query and drain the response stream.
    ///
    /// The server first emits a stand-alone schema-only IPC stream, then the
    /// self-contained batch stream whose first message repeats the schema.
    /// Only the batch stream is accumulated; forwarding both would hand the
    /// reader two end-of-stream markers.
    ///
    /// # Errors
    ///
    /// `InvalidState` before authentication, `InvalidArgument` for empty
    /// SQL, `ServerError` when the server reports a failure (the partial
    /// accumulator is discarded), `Protocol`/`Io` on wire violations.
    pub fn execute_query(&mut self, sql: &str) -> Result<QueryOutcome, CubeError> {
        match self.state {
            ConnectionState::Authenticated => {}
            ConnectionState::Faulted => {
                return Err(ConnectionError::InvalidState(
                    "connection faulted; close it".to_string(),
                )
                .into());
            }
            _ => {
                return Err(ConnectionError::InvalidState(
                    "must authenticate before executing queries".to_string(),
                )
                .into());
            }
        }
        if sql.trim().is_empty() {
            return Err(ConnectionError::InvalidParameter {
                parameter: "sql".to_string(),
                message: "query text is empty".to_string(),
            }
            .into());
        }

        let result = self.do_execute_query(sql);
        if result.is_err() {
            self.fault();
        }
        result
    }

    fn do_execute_query(&mut self, sql: &str) -> Result<QueryOutcome, CubeError> {
        debug!(sql, "executing query");
        self.send(&Message::QueryRequest {
            sql: sql.to_string(),
        })?;

        let mut ipc_bytes = Vec::new();
        loop {
            match self.recv()? {
                Message::QueryResponseSchema { ipc_bytes: bytes } => {
                    // Stand-alone schema stream; the batch stream repeats it.
                    trace!(len = bytes.len(), "discarding schema-only IPC stream");
                }
                Message::QueryResponseBatch { ipc_bytes: bytes } => {
                    trace!(len = bytes.len(), "accumulating batch IPC segment");
                    ipc_bytes.extend_from_slice(&bytes);
                }
                Message::QueryComplete { rows_affected } => {
                    debug!(rows_affected, total = ipc_bytes.len(), "query complete");
                    return Ok(QueryOutcome {
                        ipc_bytes,
                        rows_affected,
                    });
                }
                Message::Error { code, message } => {
                    return Err(ProtocolError::ServerError { code, message }.into());
                }
                other => {
                    return Err(ProtocolError::UnexpectedMessageType(other.message_type()).into());
                }
            }
        }
    }

    /// Close the connection. Idempotent; always leaves the client closed.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.session_id = None;
        self.server_version = None;
        self.state = ConnectionState::Closed;
    }

    /// Whether the handshake has completed and the socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }

    /// Whether authentication has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Server software version reported in the handshake.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Session id assigned by the server on authentication.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn fault(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = ConnectionState::Faulted;
    }

    fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;
        framing::write_message(stream, &msg.encode())
    }

    fn recv(&mut self) -> Result<Message, ProtocolError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;
        let payload = framing::read_message(stream)?;
        Message::decode(&payload)
    }
}

impl Default for NativeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_socket(host: &str, port: u16, timeout: Option<Duration>) -> std::io::Result<TcpStream> {
    match timeout {
        Some(t) => {
            let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses resolved for {host}"),
                )
            })?;
            TcpStream::connect_timeout(&addr, t)
        }
        None => TcpStream::connect((host, port)),
    }
}
