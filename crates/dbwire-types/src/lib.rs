//! Wire constants and plain data types shared by the codec, reassembler,
//! correlator, and both services.
//!
//! Nothing in this crate knows how to read a socket or a packet; it only
//! describes the bytes once they've arrived.

use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

/// Size in bytes of the fixed message header.
pub const HEADER_SIZE: usize = 16;

/// Operation codes carried in `Header::operation`.
///
/// Bit-exact with the wire protocol; values are frozen and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Reply,
    Msg,
    Update,
    Insert,
    Reserved,
    Query,
    GetMore,
    Delete,
    KillCursors,
    /// Any operation code not in the table above. The raw value is kept so
    /// it can still be logged and forwarded opaquely.
    Other(i32),
}

impl OpCode {
    /// Decode a raw wire operation code.
    pub fn from_raw(value: i32) -> OpCode {
        match value {
            1 => OpCode::Reply,
            1000 => OpCode::Msg,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2003 => OpCode::Reserved,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            other => OpCode::Other(other),
        }
    }

    /// The raw wire value for this operation code.
    pub fn to_raw(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Msg => 1000,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Reserved => 2003,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Other(raw) => raw,
        }
    }

    /// Short uppercase name used in logs, matching the legacy operation
    /// names this protocol has always used.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Reply => "REPLY",
            OpCode::Msg => "MSG",
            OpCode::Update => "UPDATE",
            OpCode::Insert => "INSERT",
            OpCode::Reserved => "RESERVED",
            OpCode::Query => "QUERY",
            OpCode::GetMore => "GET_MORE",
            OpCode::Delete => "DELETE",
            OpCode::KillCursors => "KILL_CURSORS",
            OpCode::Other(_) => "OTHER",
        }
    }

    /// True for operations that the inline proxy expects a reply to
    /// (Query, GetMore). Insert/Update/Delete/KillCursors/Msg/Reserved/Other
    /// are forward-only at the wire level.
    pub fn expects_reply(self) -> bool {
        matches!(self, OpCode::Query | OpCode::GetMore)
    }

    /// True for operations the session summary tallies as a "read"
    /// (Query, GetMore, Reply). Used only for the read/write ratio in the
    /// session summary event; has no bearing on decoding or forwarding.
    pub fn is_read(self) -> bool {
        matches!(self, OpCode::Query | OpCode::GetMore | OpCode::Reply)
    }

    /// True for operations the session summary tallies as a "write"
    /// (Insert, Update, Delete).
    pub fn is_write(self) -> bool {
        matches!(self, OpCode::Insert | OpCode::Update | OpCode::Delete)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The fixed 16-byte message header, decoded from little-endian wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total length of the message, inclusive of this header.
    pub total_length: u32,
    pub request_id: u32,
    /// Zero when this message is not a reply to an earlier request.
    pub response_to: u32,
    pub operation: OpCode,
}

impl Header {
    /// Number of additional bytes the body is declared to contain, beyond
    /// the header itself. Saturates at zero rather than underflowing when
    /// `total_length` is (invalidly) smaller than the header size — callers
    /// that care about that case should check `total_length` directly.
    pub fn body_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Query flag bits (bit position, not mask).
pub mod query_flags {
    pub const TAILABLE: u32 = 1 << 0;
    pub const SLAVE_OK: u32 = 1 << 2;
    pub const OPLOG_REPLAY: u32 = 1 << 3;
    pub const NO_TIMEOUT: u32 = 1 << 4;
    pub const AWAIT: u32 = 1 << 5;
    pub const EXHAUST: u32 = 1 << 6;
    pub const PARTIAL: u32 = 1 << 7;
}

/// Reply flag bits.
pub mod reply_flags {
    pub const NOT_FOUND: u32 = 1 << 0;
    pub const FAILURE: u32 = 1 << 1;
    pub const CFG_STATE: u32 = 1 << 2;
    pub const AWAIT_CAPABLE: u32 = 1 << 3;
}

/// Insert flag bits.
pub mod insert_flags {
    pub const CONTINUE_ON_ERROR: u32 = 1 << 0;
}

/// Update flag bits.
pub mod update_flags {
    pub const UPSERT: u32 = 1 << 0;
    pub const MULTI: u32 = 1 << 1;
}

/// A fully-qualified `<db>.<collection>` namespace, split at the first dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    raw: String,
}

impl Namespace {
    pub fn new(raw: String) -> Namespace {
        Namespace { raw }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The part before the first `.`, or the whole string if there is none.
    pub fn database(&self) -> &str {
        match self.raw.find('.') {
            Some(idx) => &self.raw[..idx],
            None => &self.raw,
        }
    }

    /// The part after the first `.`, or empty if there is none.
    pub fn collection(&self) -> &str {
        match self.raw.find('.') {
            Some(idx) => &self.raw[idx + 1..],
            None => "",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An ordered pair of socket endpoints identifying one direction of traffic.
///
/// For the inline proxy this is the client/upstream socket pair; for the
/// offline sniffer it is the captured IP+TCP source/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointPair {
    pub source: SocketAddr,
    pub destination: SocketAddr,
}

impl EndpointPair {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> EndpointPair {
        EndpointPair { source, destination }
    }

    /// The pair with source and destination swapped — used to recognize a
    /// reply travelling the opposite direction of its originating request.
    pub fn reversed(&self) -> EndpointPair {
        EndpointPair {
            source: self.destination,
            destination: self.source,
        }
    }
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// When an envelope was observed: wall-clock for the inline proxy, capture
/// timestamp for the offline sniffer.
pub type ObservedAt = SystemTime;

/// Emitted once per inline-proxy session when it terminates, regardless of
/// cause (clean EOF, transport error, or frame error).
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub endpoint: EndpointPair,
    /// One entry per operation code actually observed this session, in the
    /// order first seen.
    pub operation_counts: Vec<(OpCode, u64)>,
    pub reads: u64,
    pub writes: u64,
    pub bytes_client_to_upstream: u64,
    pub bytes_upstream_to_client: u64,
    pub duration: std::time::Duration,
}
