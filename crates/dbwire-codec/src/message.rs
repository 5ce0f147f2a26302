use dbwire_types::{Header, HEADER_SIZE, Namespace, OpCode};

use crate::document::DocumentDecoder;
use crate::error::FrameError;

/// A decoded message body, generic over whatever document representation
/// the caller's [`DocumentDecoder`] produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<D> {
    Query {
        namespace: Namespace,
        flags: u32,
        skip: u32,
        to_return: u32,
        selector: D,
        field_projection: Option<D>,
    },
    GetMore {
        namespace: Namespace,
        to_return: u32,
        cursor_id: u64,
    },
    Insert {
        flags: u32,
        namespace: Namespace,
        documents: Vec<D>,
    },
    Update {
        namespace: Namespace,
        flags: u32,
        selector: D,
        update: Option<D>,
    },
    Delete {
        namespace: Namespace,
        flags: u32,
        selector: D,
    },
    Reply {
        flags: u32,
        cursor_id: u64,
        starting_from: u32,
        number_returned: u32,
        documents: Vec<D>,
    },
    /// `Msg`, `Reserved`, `KillCursors`, or any unrecognized operation code:
    /// passed through untyped, exactly as received.
    Other { operation: OpCode, payload: Vec<u8> },
}

/// Decode a full message body, given its already-decoded header.
///
/// `bytes` must start at the beginning of the message (the header included)
/// and contain at least `header.total_length` bytes; anything beyond that
/// is ignored rather than consumed.
pub fn decode_message<Dec: DocumentDecoder>(
    header: &Header,
    bytes: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let total_length = header.total_length as usize;
    if bytes.len() < total_length {
        return Err(FrameError::BodyTooShort {
            need: total_length,
            got: bytes.len(),
        });
    }
    let body = &bytes[..total_length];

    match header.operation {
        OpCode::Query => decode_query(body, decoder),
        OpCode::GetMore => decode_get_more(body),
        OpCode::Insert => decode_insert(body, decoder),
        OpCode::Update => decode_update(body, decoder),
        OpCode::Delete => decode_delete(body, decoder),
        OpCode::Reply => decode_reply(header, body, decoder),
        other => Ok(Message::Other {
            operation: other,
            payload: body[HEADER_SIZE..].to_vec(),
        }),
    }
}

/// Read a little-endian u32 at `offset`, bounds-checked against `body`.
fn read_u32(body: &[u8], offset: usize) -> Result<u32, FrameError> {
    let end = offset + 4;
    let slice = body.get(offset..end).ok_or(FrameError::FieldOutOfBounds {
        offset,
        need: 4,
        got: body.len().saturating_sub(offset),
    })?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

/// Read a little-endian u64 at `offset`, bounds-checked against `body`.
fn read_u64(body: &[u8], offset: usize) -> Result<u64, FrameError> {
    let end = offset + 8;
    let slice = body.get(offset..end).ok_or(FrameError::FieldOutOfBounds {
        offset,
        need: 8,
        got: body.len().saturating_sub(offset),
    })?;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

/// Extract the NUL-terminated namespace starting at `offset`.
///
/// Returns the parsed namespace and the offset of the first byte after the
/// terminator.
fn read_namespace(body: &[u8], offset: usize) -> Result<(Namespace, usize), FrameError> {
    let rest = body.get(offset..).ok_or(FrameError::UnterminatedNamespace)?;
    let nul_offset = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(FrameError::UnterminatedNamespace)?;
    let raw = &body[offset..offset + nul_offset];
    let s = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidNamespace)?;
    Ok((Namespace::new(s.to_owned()), offset + nul_offset + 1))
}

/// Decode zero or more embedded documents from `offset` through the end of
/// `body`, stopping (without error) exactly at the end.
fn read_documents<Dec: DocumentDecoder>(
    body: &[u8],
    mut offset: usize,
    decoder: &Dec,
) -> Result<Vec<Dec::Document>, FrameError> {
    let mut documents = Vec::new();
    while offset < body.len() {
        let (doc, consumed) =
            decoder
                .decode_one(&body[offset..])
                .map_err(|source| FrameError::Document { offset, source })?;
        if consumed == 0 || offset + consumed > body.len() {
            return Err(FrameError::Document {
                offset,
                source: crate::error::DocumentError::new(
                    "decoder reported an impossible byte count",
                ),
            });
        }
        documents.push(doc);
        offset += consumed;
    }
    Ok(documents)
}

/// Decode at most `max` embedded documents, erroring if more remain.
fn read_at_most<Dec: DocumentDecoder>(
    body: &[u8],
    offset: usize,
    max: usize,
    decoder: &Dec,
) -> Result<Vec<Dec::Document>, FrameError> {
    let documents = read_documents(body, offset, decoder)?;
    if documents.len() > max {
        return Err(FrameError::TooManyDocuments {
            max,
            found: documents.len(),
        });
    }
    Ok(documents)
}

fn decode_query<Dec: DocumentDecoder>(
    body: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let flags = read_u32(body, 16)?;
    let (namespace, after_ns) = read_namespace(body, 20)?;
    let skip = read_u32(body, after_ns)?;
    let to_return = read_u32(body, after_ns + 4)?;

    let mut documents = read_at_most(body, after_ns + 8, 2, decoder)?;
    let field_projection = if documents.len() == 2 {
        Some(documents.pop().unwrap())
    } else {
        None
    };
    let selector = documents
        .pop()
        .ok_or(FrameError::ReplyDocumentCountMismatch {
            declared: 1,
            found: 0,
        })?;

    Ok(Message::Query {
        namespace,
        flags,
        skip,
        to_return,
        selector,
        field_projection,
    })
}

fn decode_get_more<D>(body: &[u8]) -> Result<Message<D>, FrameError> {
    let (namespace, after_ns) = read_namespace(body, 20)?;
    let to_return = read_u32(body, after_ns)?;
    let cursor_id = read_u64(body, after_ns + 4)?;
    Ok(Message::GetMore {
        namespace,
        to_return,
        cursor_id,
    })
}

fn decode_insert<Dec: DocumentDecoder>(
    body: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let flags = read_u32(body, 16)?;
    let (namespace, after_ns) = read_namespace(body, 20)?;
    let documents = read_documents(body, after_ns, decoder)?;
    Ok(Message::Insert {
        flags,
        namespace,
        documents,
    })
}

fn decode_update<Dec: DocumentDecoder>(
    body: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let (namespace, after_ns) = read_namespace(body, 20)?;
    let flags = read_u32(body, after_ns)?;

    let mut documents = read_at_most(body, after_ns + 4, 2, decoder)?;
    let update = if documents.len() == 2 {
        Some(documents.pop().unwrap())
    } else {
        None
    };
    let selector = documents
        .pop()
        .ok_or(FrameError::ReplyDocumentCountMismatch {
            declared: 1,
            found: 0,
        })?;

    Ok(Message::Update {
        namespace,
        flags,
        selector,
        update,
    })
}

fn decode_delete<Dec: DocumentDecoder>(
    body: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let (namespace, after_ns) = read_namespace(body, 20)?;
    let flags = read_u32(body, after_ns)?;
    let mut documents = read_at_most(body, after_ns + 4, 1, decoder)?;
    let selector = documents
        .pop()
        .ok_or(FrameError::ReplyDocumentCountMismatch {
            declared: 1,
            found: 0,
        })?;
    Ok(Message::Delete {
        namespace,
        flags,
        selector,
    })
}

fn decode_reply<Dec: DocumentDecoder>(
    header: &Header,
    body: &[u8],
    decoder: &Dec,
) -> Result<Message<Dec::Document>, FrameError> {
    let flags = read_u32(body, 16)?;
    let cursor_id = read_u64(body, 20)?;
    let starting_from = read_u32(body, 28)?;
    let number_returned = read_u32(body, 32)?;

    let documents = read_documents(body, 36, decoder)?;
    if documents.len() as u32 != number_returned {
        return Err(FrameError::ReplyDocumentCountMismatch {
            declared: number_returned,
            found: documents.len() as u32,
        });
    }
    let _ = header; // header kept for signature symmetry / future use

    Ok(Message::Reply {
        flags,
        cursor_id,
        starting_from,
        number_returned,
        documents,
    })
}
