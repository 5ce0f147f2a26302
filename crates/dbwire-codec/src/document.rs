use crate::error::DocumentError;

/// Decodes a single embedded document starting at a document boundary.
///
/// The core decoder never interprets document contents itself — it only
/// needs to know how many bytes one document occupied so it can move on to
/// the next field or the next document. Implementations are expected to be
/// cheap to construct and share (the codec may call `decode_one` many times
/// per message).
///
/// `Document` is left abstract so a caller can plug in raw bytes, a parsed
/// map, or a real document library's native type — whichever representation
/// downstream listeners want to consume.
pub trait DocumentDecoder {
    type Document;

    /// Decode one document starting at `bytes[0]`.
    ///
    /// On success, returns the decoded document and the number of bytes it
    /// occupied (including its own length prefix, if the format has one).
    /// Implementations must not report having consumed more bytes than
    /// `bytes.len()`.
    fn decode_one(&self, bytes: &[u8]) -> Result<(Self::Document, usize), DocumentError>;
}

#[cfg(feature = "bson-document")]
mod bson_impl {
    use super::DocumentDecoder;
    use crate::error::DocumentError;

    /// Default [`DocumentDecoder`] backed by the `bson` crate.
    ///
    /// This is the concrete implementation a real deployment reaches for;
    /// the core stays decoupled from it so tests (and alternative document
    /// formats) can supply their own decoder instead.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BsonDocumentDecoder;

    impl DocumentDecoder for BsonDocumentDecoder {
        type Document = bson::Document;

        fn decode_one(&self, bytes: &[u8]) -> Result<(bson::Document, usize), DocumentError> {
            if bytes.len() < 4 {
                return Err(DocumentError::new(format!(
                    "need at least 4 bytes for a document length prefix, got {}",
                    bytes.len()
                )));
            }
            let declared_len = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
            if declared_len < 4 || declared_len as usize > bytes.len() {
                return Err(DocumentError::new(format!(
                    "document declares length {declared_len}, but only {} bytes remain",
                    bytes.len()
                )));
            }
            let declared_len = declared_len as usize;
            let mut cursor = std::io::Cursor::new(&bytes[..declared_len]);
            let document = bson::Document::from_reader(&mut cursor)
                .map_err(|e| DocumentError::new(e.to_string()))?;
            Ok((document, declared_len))
        }
    }
}

#[cfg(feature = "bson-document")]
pub use bson_impl::BsonDocumentDecoder;
