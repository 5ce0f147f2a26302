//! A packet-capture consumer for the legacy wire protocol: reads frames
//! from a live device or a capture file, reassembles TCP payloads across
//! fragmentation, and emits the same observation events the inline proxy
//! does — without ever opening a socket of its own.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod link;
