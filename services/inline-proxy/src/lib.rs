//! A transparent TCP interceptor for the legacy wire protocol: accepts
//! client connections, opens a matching upstream connection per client,
//! and forwards bytes untouched while emitting structured observation
//! events through the shared listener bus.

pub mod cli;
pub mod config;
pub mod error;
pub mod session;
