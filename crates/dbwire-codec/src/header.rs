use dbwire_types::{HEADER_SIZE, Header, OpCode};

use crate::error::FrameError;

/// Decode the fixed 16-byte message header from the start of `bytes`.
///
/// `bytes` may be longer than 16 bytes (the rest of the message); only the
/// first 16 are consulted. Returns an error if fewer than 16 bytes are
/// available or if the declared `total_length` is impossible.
pub fn decode_header(bytes: &[u8]) -> Result<Header, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::HeaderTooShort {
            need: HEADER_SIZE,
            got: bytes.len(),
        });
    }

    let total_length = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let request_id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let response_to = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let operation = i32::from_le_bytes(bytes[12..16].try_into().unwrap());

    if (total_length as usize) < HEADER_SIZE {
        return Err(FrameError::LengthBelowHeader(total_length));
    }

    Ok(Header {
        total_length,
        request_id,
        response_to,
        operation: OpCode::from_raw(operation),
    })
}
