//! Message codec for the Arrow Native protocol.
//!
//! Every frame payload is `[type: u8][body]`. All integers in the envelope
//! are big-endian; strings and byte blobs are length-prefixed with a `u32`.
//! The codec is pure: it never touches the socket.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;

/// Protocol version sent in the handshake; mismatch with the server is fatal.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default TCP port of the Arrow Native endpoint.
pub const DEFAULT_PORT: u16 = 4445;

// Message type bytes
pub const MSG_HANDSHAKE_REQUEST: u8 = 0x01;
pub const MSG_HANDSHAKE_RESPONSE: u8 = 0x02;
pub const MSG_AUTH_REQUEST: u8 = 0x03;
pub const MSG_AUTH_RESPONSE: u8 = 0x04;
pub const MSG_QUERY_REQUEST: u8 = 0x05;
pub const MSG_QUERY_RESPONSE_SCHEMA: u8 = 0x06;
pub const MSG_QUERY_RESPONSE_BATCH: u8 = 0x07;
pub const MSG_QUERY_COMPLETE: u8 = 0x08;
pub const MSG_ERROR: u8 = 0xFF;

/// A decoded Arrow Native protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client opens the protocol exchange
    HandshakeRequest { version: u32 },
    /// Server replies with its protocol and software versions
    HandshakeResponse {
        version: u32,
        server_version: String,
    },
    /// Client authenticates with an opaque token
    AuthRequest { token: String, database: String },
    /// Server accepts or rejects authentication
    AuthResponse { success: bool, session_id: String },
    /// Client submits SQL text
    QueryRequest { sql: String },
    /// Stand-alone schema-only IPC stream (ignored by the client)
    QueryResponseSchema { ipc_bytes: Vec<u8> },
    /// Segment of the self-contained batch IPC stream
    QueryResponseBatch { ipc_bytes: Vec<u8> },
    /// Terminates a query exchange
    QueryComplete { rows_affected: i64 },
    /// Server-side failure
    Error { code: String, message: String },
}

impl Message {
    /// The wire type byte for this message.
    pub fn message_type(&self) -> u8 {
        match self {
            Message::HandshakeRequest { .. } => MSG_HANDSHAKE_REQUEST,
            Message::HandshakeResponse { .. } => MSG_HANDSHAKE_RESPONSE,
            Message::AuthRequest { .. } => MSG_AUTH_REQUEST,
            Message::AuthResponse { .. } => MSG_AUTH_RESPONSE,
            Message::QueryRequest { .. } => MSG_QUERY_REQUEST,
            Message::QueryResponseSchema { .. } => MSG_QUERY_RESPONSE_SCHEMA,
            Message::QueryResponseBatch { .. } => MSG_QUERY_RESPONSE_BATCH,
            Message::QueryComplete { .. } => MSG_QUERY_COMPLETE,
            Message::Error { .. } => MSG_ERROR,
        }
    }

    /// Encode into a frame payload (type byte + body).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(64);
        out.put_u8(self.message_type());
        match self {
            Message::HandshakeRequest { version } => {
                out.put_u32(*version);
            }
            Message::HandshakeResponse {
                version,
                server_version,
            } => {
                out.put_u32(*version);
                write_string(&mut out, server_version);
            }
            Message::AuthRequest { token, database } => {
                write_string(&mut out, token);
                write_string(&mut out, database);
            }
            Message::AuthResponse {
                success,
                session_id,
            } => {
                out.put_u8(u8::from(*success));
                write_string(&mut out, session_id);
            }
            Message::QueryRequest { sql } => {
                write_string(&mut out, sql);
            }
            Message::QueryResponseSchema { ipc_bytes } => {
                write_blob(&mut out, ipc_bytes);
            }
            Message::QueryResponseBatch { ipc_bytes } => {
                write_blob(&mut out, ipc_bytes);
            }
            Message::QueryComplete { rows_affected } => {
                out.put_i64(*rows_affected);
            }
            Message::Error { code, message } => {
                write_string(&mut out, code);
                write_string(&mut out, message);
            }
        }
        out.to_vec()
    }

    /// Decode a frame payload (type byte + body).
    pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
        let mut buf = payload;
        let msg_type = read_u8(&mut buf)?;

        match msg_type {
            MSG_HANDSHAKE_REQUEST => {
                let version = read_u32(&mut buf)?;
                Ok(Message::HandshakeRequest { version })
            }
            MSG_HANDSHAKE_RESPONSE => {
                let version = read_u32(&mut buf)?;
                let server_version = read_string(&mut buf, "server_version")?;
                Ok(Message::HandshakeResponse {
                    version,
                    server_version,
                })
            }
            MSG_AUTH_REQUEST => {
                let token = read_string(&mut buf, "token")?;
                let database = read_string(&mut buf, "database")?;
                Ok(Message::AuthRequest { token, database })
            }
            MSG_AUTH_RESPONSE => {
                let success = read_u8(&mut buf)? != 0;
                let session_id = read_string(&mut buf, "session_id")?;
                Ok(Message::AuthResponse {
                    success,
                    session_id,
                })
            }
            MSG_QUERY_REQUEST => {
                let sql = read_string(&mut buf, "sql")?;
                Ok(Message::QueryRequest { sql })
            }
            MSG_QUERY_RESPONSE_SCHEMA => {
                let ipc_bytes = read_blob(&mut buf)?;
                Ok(Message::QueryResponseSchema { ipc_bytes })
            }
            MSG_QUERY_RESPONSE_BATCH => {
                let ipc_bytes = read_blob(&mut buf)?;
                Ok(Message::QueryResponseBatch { ipc_bytes })
            }
            MSG_QUERY_COMPLETE => {
                let rows_affected = read_i64(&mut buf)?;
                Ok(Message::QueryComplete { rows_affected })
            }
            MSG_ERROR => {
                let code = read_string(&mut buf, "code")?;
                let message = read_string(&mut buf, "message")?;
                Ok(Message::Error { code, message })
            }
            other => Err(ProtocolError::UnexpectedMessageType(other)),
        }
    }
}

// Cursor-style read helpers over `&mut &[u8]`

fn ensure(buf: &[u8], need: usize) -> Result<(), ProtocolError> {
    if buf.len() < need {
        return Err(ProtocolError::Truncated {
            expected: need,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn read_u8(buf: &mut &[u8]) -> Result<u8, ProtocolError> {
    ensure(buf, 1)?;
    let v = buf[0];
    *buf = &buf[1..];
    Ok(v)
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, ProtocolError> {
    ensure(buf, 4)?;
    let v = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_i64(buf: &mut &[u8]) -> Result<i64, ProtocolError> {
    ensure(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(i64::from_be_bytes(arr))
}

fn read_blob(buf: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = read_u32(buf)? as usize;
    ensure(buf, len)?;
    let v = buf[..len].to_vec();
    *buf = &buf[len..];
    Ok(v)
}

fn read_string(buf: &mut &[u8], field: &str) -> Result<String, ProtocolError> {
    let bytes = read_blob(buf)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 {
        field: field.to_string(),
    })
}

fn write_string(out: &mut BytesMut, s: &str) {
    out.put_u32(s.len() as u32);
    out.put_slice(s.as_bytes());
}

fn write_blob(out: &mut BytesMut, b: &[u8]) {
    out.put_u32(b.len() as u32);
    out.put_slice(b);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &Message) -> Message {
        Message::decode(&msg.encode()).unwrap()
    }

    #[test]
    fn test_handshake_request_roundtrip() {
        let msg = Message::HandshakeRequest {
            version: PROTOCOL_VERSION,
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_handshake_response_roundtrip() {
        let msg = Message::HandshakeResponse {
            version: PROTOCOL_VERSION,
            server_version: "cube 1.3.0".into(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_auth_request_roundtrip() {
        let msg = Message::AuthRequest {
            token: "secret-token".into(),
            database: "analytics".into(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_auth_request_empty_database() {
        let msg = Message::AuthRequest {
            token: "t".into(),
            database: String::new(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_auth_response_roundtrip() {
        let msg = Message::AuthResponse {
            success: true,
            session_id: "sess-42".into(),
        };
        assert_eq!(roundtrip(&msg), msg);

        let msg = Message::AuthResponse {
            success: false,
            session_id: String::new(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_query_request_roundtrip() {
        let msg = Message::QueryRequest {
            sql: "SELECT 1 AS test".into(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_query_response_roundtrip() {
        let schema = Message::QueryResponseSchema {
            ipc_bytes: vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0],
        };
        assert_eq!(roundtrip(&schema), schema);

        let batch = Message::QueryResponseBatch {
            ipc_bytes: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(roundtrip(&batch), batch);
    }

    #[test]
    fn test_query_complete_roundtrip() {
        let msg = Message::QueryComplete { rows_affected: -1 };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_error_roundtrip() {
        let msg = Message::Error {
            code: "TABLE_NOT_FOUND".into(),
            message: "relation \"nope\" does not exist".into(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_golden_handshake_request() {
        let encoded = Message::HandshakeRequest { version: 1 }.encode();
        assert_eq!(encoded, vec![MSG_HANDSHAKE_REQUEST, 0, 0, 0, 1]);
    }

    #[test]
    fn test_golden_query_request() {
        let encoded = Message::QueryRequest { sql: "SELECT 1".into() }.encode();
        let mut expected = vec![MSG_QUERY_REQUEST, 0, 0, 0, 8];
        expected.extend_from_slice(b"SELECT 1");
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_golden_query_complete() {
        let encoded = Message::QueryComplete { rows_affected: 3 }.encode();
        assert_eq!(encoded, vec![MSG_QUERY_COMPLETE, 0, 0, 0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn test_strings_are_big_endian_length_prefixed() {
        let encoded = Message::AuthRequest {
            token: "abc".into(),
            database: String::new(),
        }
        .encode();
        // type, token length (u32 BE), token bytes, database length
        assert_eq!(
            encoded,
            vec![MSG_AUTH_REQUEST, 0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Message::decode(&[0x42]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessageType(0x42)));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let err = Message::decode(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_truncated_body_rejected() {
        // AuthResponse claims a 10-byte session id but carries only 2 bytes.
        let payload = [MSG_AUTH_RESPONSE, 1, 0, 0, 0, 10, b'a', b'b'];
        let err = Message::decode(&payload).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                expected: 10,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let payload = [MSG_QUERY_REQUEST, 0, 0, 0, 2, 0xC3, 0x28];
        let err = Message::decode(&payload).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_binary_ipc_payload_preserved() {
        // IPC bytes are opaque; NUL bytes and invalid UTF-8 must pass through.
        let ipc = vec![0x00, 0xFF, 0xC3, 0x28, 0x00];
        let msg = Message::QueryResponseBatch {
            ipc_bytes: ipc.clone(),
        };
        match roundtrip(&msg) {
            Message::QueryResponseBatch { ipc_bytes } => assert_eq!(ipc_bytes, ipc),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
