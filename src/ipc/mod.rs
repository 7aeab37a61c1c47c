//! Arrow IPC stream decoding.
//!
//! The server returns query results as an Arrow IPC stream: FlatBuffer
//! metadata framing raw column buffers. [`reader::IpcStreamReader`] walks the
//! stream and materializes typed arrays; [`batch`] holds the per-batch body
//! decoding.

pub mod batch;
pub mod reader;

pub use reader::IpcStreamReader;
