//! Error types for cubearrow-rs.
//!
//! This module defines domain-specific error types organized by functional
//! area: connection setup, the Arrow Native wire protocol, and Arrow IPC
//! decoding. Every error maps onto an ADBC status code via `to_adbc_code`.

use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum CubeError {
    /// Connection setup and configuration errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Arrow Native wire protocol errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Arrow IPC decoding errors
    #[error(transparent)]
    Ipc(#[from] IpcError),
}

/// Errors related to connection configuration and lifecycle.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish a TCP connection to the server
    #[error("Failed to connect to {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// Invalid connection parameter
    #[error("Invalid connection parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Connection string parsing error
    #[error("Failed to parse connection string: {0}")]
    ParseError(String),

    /// Operation called in the wrong connection state
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// Server rejected the authentication token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Errors related to the Arrow Native wire protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(String),

    /// Peer closed the socket mid-frame
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Frame length prefix outside the accepted range
    #[error("Invalid message length: {0}")]
    InvalidFrameLength(u32),

    /// Message body shorter than its fields require
    #[error("Truncated message body: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A string field did not contain valid UTF-8
    #[error("Invalid UTF-8 in field '{field}'")]
    InvalidUtf8 { field: String },

    /// Message type byte not valid in the current protocol state
    #[error("Unexpected message type: 0x{0:02x}")]
    UnexpectedMessageType(u8),

    /// Handshake version disagreement
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch { client: u32, server: u32 },

    /// Server-reported query error, propagated verbatim
    #[error("Server error [{code}]: {message}")]
    ServerError { code: String, message: String },
}

/// Errors related to Arrow IPC stream decoding.
#[derive(Error, Debug)]
pub enum IpcError {
    /// The accumulated IPC buffer was empty
    #[error("Empty Arrow IPC buffer")]
    EmptyStream,

    /// Message boundary did not start with the 0xFFFFFFFF continuation marker
    #[error("Invalid continuation marker at offset {offset}")]
    InvalidContinuation { offset: usize },

    /// Metadata or body extends past the end of the buffer
    #[error("Truncated IPC stream at offset {offset}")]
    TruncatedStream { offset: usize },

    /// FlatBuffer metadata failed verification
    #[error("Invalid FlatBuffer message: {0}")]
    Flatbuffer(String),

    /// A second Schema message arrived on the same stream
    #[error("Duplicate schema message in IPC stream")]
    DuplicateSchema,

    /// A record batch arrived before any schema
    #[error("Record batch received before schema")]
    MissingSchema,

    /// Schema contains a type outside the supported set
    #[error("Unsupported Arrow type: {0}")]
    UnsupportedType(String),

    /// Record batch body is compressed
    #[error("Compressed IPC bodies are not supported")]
    CompressedBody,

    /// Buffer descriptor points outside the message body
    #[error(
        "Buffer {index} out of bounds: offset {offset} + length {length} > body length {body_len}"
    )]
    BufferOutOfBounds {
        index: usize,
        offset: usize,
        length: usize,
        body_len: usize,
    },

    /// Buffer offset is not 8-byte aligned
    #[error("Buffer {index} misaligned: offset {offset} is not 8-byte aligned")]
    UnalignedBuffer { index: usize, offset: usize },

    /// Variable-length offsets decreased
    #[error("Non-monotonic offsets in column '{field}'")]
    NonMonotonicOffsets { field: String },

    /// Final offset disagrees with the value buffer length
    #[error(
        "Offset mismatch in column '{field}': final offset {expected}, value buffer length {actual}"
    )]
    OffsetMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// Record batch metadata is internally inconsistent
    #[error("Malformed record batch: {0}")]
    MalformedBatch(String),

    /// Arrow array construction failed
    #[error("Arrow error: {0}")]
    Arrow(String),
}

/// ADBC-compatible status codes.
///
/// These map the error taxonomy onto the ADBC specification for driver
/// interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdbcStatusCode {
    /// Bad configuration or argument
    InvalidArgument,
    /// Operation called in the wrong state
    InvalidState,
    /// Authentication rejected by the server
    Unauthenticated,
    /// Transport failure
    Io,
    /// Wire or IPC framing violation
    Protocol,
    /// Schema contains an unimplemented type
    Unsupported,
    /// Error reported by the server
    ServerError,
}

impl fmt::Display for AdbcStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdbcStatusCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            AdbcStatusCode::InvalidState => write!(f, "INVALID_STATE"),
            AdbcStatusCode::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            AdbcStatusCode::Io => write!(f, "IO"),
            AdbcStatusCode::Protocol => write!(f, "PROTOCOL"),
            AdbcStatusCode::Unsupported => write!(f, "UNSUPPORTED"),
            AdbcStatusCode::ServerError => write!(f, "SERVER_ERROR"),
        }
    }
}

impl CubeError {
    /// Map to an ADBC status code.
    pub fn to_adbc_code(&self) -> AdbcStatusCode {
        match self {
            CubeError::Connection(e) => e.to_adbc_code(),
            CubeError::Protocol(e) => e.to_adbc_code(),
            CubeError::Ipc(e) => e.to_adbc_code(),
        }
    }
}

impl ConnectionError {
    /// Map to an ADBC status code.
    pub fn to_adbc_code(&self) -> AdbcStatusCode {
        match self {
            ConnectionError::ConnectionFailed { .. } => AdbcStatusCode::Io,
            ConnectionError::InvalidParameter { .. } | ConnectionError::ParseError(_) => {
                AdbcStatusCode::InvalidArgument
            }
            ConnectionError::InvalidState(_) => AdbcStatusCode::InvalidState,
            ConnectionError::AuthenticationFailed(_) => AdbcStatusCode::Unauthenticated,
        }
    }
}

impl ProtocolError {
    /// Map to an ADBC status code.
    pub fn to_adbc_code(&self) -> AdbcStatusCode {
        match self {
            ProtocolError::Io(_) | ProtocolError::ConnectionClosed => AdbcStatusCode::Io,
            ProtocolError::ServerError { .. } => AdbcStatusCode::ServerError,
            _ => AdbcStatusCode::Protocol,
        }
    }
}

impl IpcError {
    /// Map to an ADBC status code.
    pub fn to_adbc_code(&self) -> AdbcStatusCode {
        match self {
            IpcError::UnsupportedType(_) | IpcError::CompressedBody => AdbcStatusCode::Unsupported,
            _ => AdbcStatusCode::Protocol,
        }
    }
}

// Conversions from external error types

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}

impl From<arrow_schema::ArrowError> for IpcError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        IpcError::Arrow(err.to_string())
    }
}
