//! Pure, allocation-light decoding of the legacy MongoDB wire protocol.
//!
//! This crate knows nothing about sockets, pcap, or reassembly — it only
//! turns bytes that are already known to hold one complete message into a
//! [`Header`](dbwire_types::Header) and a [`Message`]. Both the inline proxy
//! and the offline sniffer call into it the same way.

pub mod document;
pub mod envelope;
pub mod error;
pub mod header;
pub mod message;

pub use document::DocumentDecoder;
#[cfg(feature = "bson-document")]
pub use document::BsonDocumentDecoder;
pub use envelope::Envelope;
pub use error::{DocumentError, FrameError};
pub use header::decode_header;
pub use message::{decode_message, Message};
