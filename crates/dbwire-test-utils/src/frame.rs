use dbwire_types::HEADER_SIZE;

/// Build a complete wire-protocol frame: a 16-byte header followed by
/// `body`, with `total_length` filled in automatically.
pub fn wire_message(request_id: u32, response_to: u32, operation: i32, body: &[u8]) -> Vec<u8> {
    let total_length = (HEADER_SIZE + body.len()) as u32;
    let mut out = Vec::with_capacity(total_length as usize);
    out.extend_from_slice(&total_length.to_le_bytes());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.extend_from_slice(&response_to.to_le_bytes());
    out.extend_from_slice(&operation.to_le_bytes());
    out.extend_from_slice(body);
    out
}
