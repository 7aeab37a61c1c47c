//! Length-prefixed frame I/O for the Arrow Native protocol.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by exactly
//! that many payload bytes. Frames are read and written over any blocking
//! `Read`/`Write` pair; the client owns the actual `TcpStream`.

use std::io::{Read, Write};

use crate::error::ProtocolError;

/// Upper bound on a single frame payload (100 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 100 * 1024 * 1024;

/// Read one frame and return its payload.
///
/// Reads the 4-byte big-endian length prefix, validates
/// `0 < length <= MAX_MESSAGE_SIZE`, then reads exactly `length` payload
/// bytes. `Read::read_exact` retries on `ErrorKind::Interrupted`; EOF
/// mid-frame surfaces as [`ProtocolError::ConnectionClosed`].
pub fn read_message<R: Read>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut length_buf = [0u8; 4];
    reader.read_exact(&mut length_buf)?;

    let length = u32::from_be_bytes(length_buf);
    if length == 0 || length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::InvalidFrameLength(length));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Write one frame: 4-byte big-endian length prefix followed by the payload.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.is_empty() || payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::InvalidFrameLength(payload.len() as u32));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}
