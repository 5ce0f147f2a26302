/// Errors raised while decoding a header or a message body.
///
/// Both the inline proxy and the offline sniffer handle this the same way
/// at their respective scopes: inline terminates the session, offline skips
/// the packet and keeps going.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("header too short: need {need} bytes, got {got}")]
    HeaderTooShort { need: usize, got: usize },

    #[error("declared total_length {0} is smaller than the header size")]
    LengthBelowHeader(u32),

    #[error("buffer too short for declared total_length: need {need}, got {got}")]
    BodyTooShort { need: usize, got: usize },

    #[error("namespace is missing its NUL terminator")]
    UnterminatedNamespace,

    #[error("namespace is not valid UTF-8")]
    InvalidNamespace,

    #[error("a fixed-size field at offset {offset} needs {need} bytes but only {got} remain")]
    FieldOutOfBounds {
        offset: usize,
        need: usize,
        got: usize,
    },

    #[error("expected at most {max} embedded documents, found a {found}th")]
    TooManyDocuments { max: usize, found: usize },

    #[error("reply declared {declared} documents but the body ran out after {found}")]
    ReplyDocumentCountMismatch { declared: u32, found: u32 },

    #[error("embedded document decode failed at offset {offset}: {source}")]
    Document {
        offset: usize,
        #[source]
        source: DocumentError,
    },
}

/// Error returned by a [`crate::document::DocumentDecoder`] implementation.
///
/// Kept as an opaque, owned string so the codec crate doesn't need to know
/// anything about whatever document format a particular decoder speaks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DocumentError(pub String);

impl DocumentError {
    pub fn new(message: impl Into<String>) -> DocumentError {
        DocumentError(message.into())
    }
}
