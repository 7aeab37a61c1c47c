//! Common test utilities for cubearrow-rs integration tests.
//!
//! The integration tests run against an in-process mock of the Cube Arrow
//! Native endpoint: a `TcpListener` on an ephemeral port served from a
//! background thread. The mock speaks the real framed protocol (handshake,
//! token auth, query exchange) and answers queries from a scripted queue, so
//! every scenario is fully self-contained.

use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use arrow_array::RecordBatch;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::SchemaRef;

use cubearrow_rs::connection::ConnectionParams;
use cubearrow_rs::transport::framing::{read_message, write_message};
use cubearrow_rs::transport::{Message, PROTOCOL_VERSION};

/// Token the mock accepts.
pub const TEST_TOKEN: &str = "test-token";
/// Session id the mock assigns.
pub const TEST_SESSION: &str = "mock-session-1";
/// Server version the mock reports.
pub const TEST_SERVER_VERSION: &str = "cube-mock 1.0.0";

/// Scripted answer for one query.
pub enum QueryScript {
    /// Send the schema-only IPC stream, then the batch stream (possibly in
    /// several `QueryResponseBatch` segments), then `QueryComplete`.
    Result {
        schema_ipc: Vec<u8>,
        batch_segments: Vec<Vec<u8>>,
        rows_affected: i64,
    },
    /// Send an `Error` message.
    Error { code: String, message: String },
}

/// In-process Arrow Native endpoint.
pub struct MockServer {
    port: u16,
}

impl MockServer {
    /// Spawn a mock speaking the current protocol version.
    pub fn spawn(scripts: Vec<QueryScript>) -> Self {
        Self::spawn_with_version(PROTOCOL_VERSION, scripts)
    }

    /// Spawn a mock that reports `handshake_version` in its handshake reply.
    pub fn spawn_with_version(handshake_version: u32, scripts: Vec<QueryScript>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let scripts = Arc::new(Mutex::new(VecDeque::from(scripts)));

        thread::spawn(move || {
            // Serve connections sequentially until the test process exits.
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let scripts = Arc::clone(&scripts);
                let _ = serve(&mut stream, handshake_version, &scripts);
            }
        });

        Self { port }
    }

    /// Port the mock listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection parameters pointing at the mock, with the accepted token.
    pub fn params(&self) -> ConnectionParams {
        ConnectionParams::builder()
            .host("127.0.0.1")
            .port(self.port)
            .token(TEST_TOKEN)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    /// Connection URI pointing at the mock.
    pub fn uri(&self) -> String {
        format!("cube://{TEST_TOKEN}@127.0.0.1:{}", self.port)
    }
}

fn serve(
    stream: &mut std::net::TcpStream,
    handshake_version: u32,
    scripts: &Mutex<VecDeque<QueryScript>>,
) -> Result<(), cubearrow_rs::error::ProtocolError> {
    loop {
        let payload = match read_message(stream) {
            Ok(p) => p,
            Err(_) => return Ok(()), // client went away
        };
        let message = Message::decode(&payload)?;

        match message {
            Message::HandshakeRequest { .. } => {
                send(
                    stream,
                    &Message::HandshakeResponse {
                        version: handshake_version,
                        server_version: TEST_SERVER_VERSION.to_string(),
                    },
                )?;
            }
            Message::AuthRequest { token, .. } => {
                let success = token == TEST_TOKEN;
                send(
                    stream,
                    &Message::AuthResponse {
                        success,
                        session_id: if success {
                            TEST_SESSION.to_string()
                        } else {
                            String::new()
                        },
                    },
                )?;
            }
            Message::QueryRequest { .. } => {
                let script = scripts.lock().unwrap().pop_front();
                match script {
                    Some(QueryScript::Result {
                        schema_ipc,
                        batch_segments,
                        rows_affected,
                    }) => {
                        send(
                            stream,
                            &Message::QueryResponseSchema {
                                ipc_bytes: schema_ipc,
                            },
                        )?;
                        for segment in batch_segments {
                            send(stream, &Message::QueryResponseBatch { ipc_bytes: segment })?;
                        }
                        send(stream, &Message::QueryComplete { rows_affected })?;
                    }
                    Some(QueryScript::Error { code, message }) => {
                        send(stream, &Message::Error { code, message })?;
                    }
                    None => {
                        send(
                            stream,
                            &Message::Error {
                                code: "MOCK_EXHAUSTED".to_string(),
                                message: "no scripted response left".to_string(),
                            },
                        )?;
                    }
                }
            }
            other => {
                send(
                    stream,
                    &Message::Error {
                        code: "MOCK_PROTOCOL".to_string(),
                        message: format!("unexpected message type 0x{:02x}", other.message_type()),
                    },
                )?;
            }
        }
    }
}

fn send(
    stream: &mut std::net::TcpStream,
    message: &Message,
) -> Result<(), cubearrow_rs::error::ProtocolError> {
    write_message(stream, &message.encode())
}

/// Serialize a complete IPC stream (schema, batches, end-of-stream marker).
pub fn ipc_stream(schema: &SchemaRef, batches: &[RecordBatch]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut writer = StreamWriter::try_new(&mut out, schema).expect("stream writer");
    for batch in batches {
        writer.write(batch).expect("write batch");
    }
    writer.finish().expect("finish stream");
    drop(writer);
    out
}

/// The schema-only stream the server sends ahead of the batch stream.
pub fn schema_only_stream(schema: &SchemaRef) -> Vec<u8> {
    ipc_stream(schema, &[])
}

/// Script a successful result carrying the given batches in one segment.
pub fn result_script(schema: &SchemaRef, batches: &[RecordBatch]) -> QueryScript {
    QueryScript::Result {
        schema_ipc: schema_only_stream(schema),
        batch_segments: vec![ipc_stream(schema, batches)],
        rows_affected: batches.iter().map(|b| b.num_rows() as i64).sum(),
    }
}

/// Script a successful result whose batch stream is split into two
/// `QueryResponseBatch` segments at an arbitrary byte boundary.
pub fn split_result_script(schema: &SchemaRef, batches: &[RecordBatch]) -> QueryScript {
    let bytes = ipc_stream(schema, batches);
    let mid = bytes.len() / 2;
    QueryScript::Result {
        schema_ipc: schema_only_stream(schema),
        batch_segments: vec![bytes[..mid].to_vec(), bytes[mid..].to_vec()],
        rows_affected: batches.iter().map(|b| b.num_rows() as i64).sum(),
    }
}
