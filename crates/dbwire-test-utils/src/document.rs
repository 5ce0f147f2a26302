use dbwire_codec::{DocumentDecoder, DocumentError};

/// A fake document codec: a 4-byte little-endian length prefix (inclusive of
/// itself) followed by that many bytes of raw payload. Deterministic and
/// trivial to hand-encode, so codec tests never depend on the real `bson`
/// crate behind the `bson-document` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingDecoder;

impl DocumentDecoder for CountingDecoder {
    type Document = Vec<u8>;

    fn decode_one(&self, bytes: &[u8]) -> Result<(Vec<u8>, usize), DocumentError> {
        if bytes.len() < 4 {
            return Err(DocumentError::new("short document prefix"));
        }
        let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        if len < 4 || len > bytes.len() {
            return Err(DocumentError::new("document length out of bounds"));
        }
        Ok((bytes[4..len].to_vec(), len))
    }
}

/// Encode `payload` in the format [`CountingDecoder`] understands.
pub fn fake_document(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + 4) as u32;
    let mut out = len.to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}
