//! Shared test doubles and fixture builders.
//!
//! Nothing here is used by non-test code; this crate exists purely so the
//! codec's unit tests, the reassembler's unit tests, and both services'
//! integration tests can draw on one fake document codec, one TCP loopback
//! harness, and one synthetic packet builder instead of each re-deriving
//! their own.

pub mod capture;
pub mod document;
pub mod frame;
pub mod tcp;

pub use document::{fake_document, CountingDecoder};
pub use frame::wire_message;
pub use tcp::loopback;
