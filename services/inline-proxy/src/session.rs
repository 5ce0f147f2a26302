//! One accepted client connection and its paired upstream connection.
//!
//! `run` drives the `ACCEPTED -> FORWARDING -> CLOSED` state machine from
//! the design doc: every iteration reads one complete frame from the
//! client, decodes it, dispatches the matching bus events, and forwards the
//! original bytes upstream unchanged. Query/GetMore additionally pump
//! exactly one reply back before the next client frame is read — this
//! proxy never pipelines more than the wire protocol itself allows.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dbwire_bus::Bus;
use dbwire_codec::{decode_header, decode_message, BsonDocumentDecoder, Envelope};
use dbwire_codec::Message;
use dbwire_types::{EndpointPair, Header, OpCode, SessionSummary, HEADER_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::SessionError;

/// The document representation this binary decodes with: the real `bson`
/// crate, enabled via dbwire-codec's `bson-document` feature. The shared
/// core never hard-codes this — a test build could swap in the fake
/// counting decoder instead.
type DbDocument = bson::Document;

pub struct Session {
    client: TcpStream,
    upstream: TcpStream,
    bus: Arc<Bus<DbDocument>>,
    endpoint: EndpointPair,
    idle_timeout: Option<Duration>,
    operation_counts: HashMap<OpCode, u64>,
    operation_order: Vec<OpCode>,
    bytes_client_to_upstream: u64,
    bytes_upstream_to_client: u64,
    started_at: Instant,
}

impl Session {
    pub fn new(
        client: TcpStream,
        upstream: TcpStream,
        bus: Arc<Bus<DbDocument>>,
        idle_timeout: Option<Duration>,
    ) -> std::io::Result<Session> {
        let endpoint = EndpointPair::new(client.peer_addr()?, upstream.peer_addr()?);
        Ok(Session {
            client,
            upstream,
            bus,
            endpoint,
            idle_timeout,
            operation_counts: HashMap::new(),
            operation_order: Vec::new(),
            bytes_client_to_upstream: 0,
            bytes_upstream_to_client: 0,
            started_at: Instant::now(),
        })
    }

    /// Runs the session to completion. Both sockets close when this
    /// returns, by ordinary drop of `self` — ownership is the RAII guard
    /// the concurrency model requires, not a manual cleanup call that
    /// could be skipped on an early return.
    pub async fn run(mut self) {
        self.bus.on_open(self.endpoint);

        if let Err(e) = self.forward_loop().await {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "session terminated");
        }

        self.bus.on_close(self.endpoint);
        let summary = self.summary();
        self.bus.on_summary(&summary);
    }

    async fn forward_loop(&mut self) -> Result<(), SessionError> {
        loop {
            let frame = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, read_frame(&mut self.client)).await {
                    Ok(result) => result?,
                    Err(_) => return Ok(()),
                },
                None => read_frame(&mut self.client).await?,
            };

            let (header, bytes) = match frame {
                Some(frame) => frame,
                None => return Ok(()),
            };
            self.bump(header.operation);

            let envelope = self.decode_envelope(&header, &bytes, self.endpoint.source, self.endpoint.destination)?;

            match &envelope.message {
                Message::Query { .. } => {
                    self.bus.before_query(&envelope);
                    self.bus.before_query_send(&envelope);
                    self.write_upstream(&bytes).await?;
                    self.bus.after_query_send(&envelope);
                    self.bus.before_query_reply(&envelope);
                    self.pump_reply().await?;
                    self.bus.after_query_reply(&envelope);
                }
                Message::GetMore { .. } => {
                    self.bus.before_more(&envelope);
                    self.bus.before_more_send(&envelope);
                    self.write_upstream(&bytes).await?;
                    self.bus.after_more_send(&envelope);
                    self.bus.before_more_reply(&envelope);
                    self.pump_reply().await?;
                    self.bus.after_more_reply(&envelope);
                }
                Message::Insert { .. } => {
                    self.bus.before_insert(&envelope);
                    self.write_upstream(&bytes).await?;
                    self.bus.after_insert(&envelope);
                }
                Message::Update { .. } => {
                    self.bus.before_update(&envelope);
                    self.write_upstream(&bytes).await?;
                    self.bus.after_update(&envelope);
                }
                Message::Delete { .. } => {
                    self.bus.before_delete(&envelope);
                    self.write_upstream(&bytes).await?;
                    self.bus.after_delete(&envelope);
                }
                Message::Reply { .. } | Message::Other { .. } => {
                    // KillCursors and anything else unrecognised: forwarded
                    // byte-for-byte, no specialised before/after event.
                    self.write_upstream(&bytes).await?;
                }
            }
        }
    }

    /// Reads exactly one reply frame from upstream and relays it to the
    /// client untouched, bracketed by `before_reply`/`after_reply`.
    async fn pump_reply(&mut self) -> Result<(), SessionError> {
        let frame = read_frame(&mut self.upstream).await?;
        let (header, bytes) = frame.ok_or_else(|| {
            SessionError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upstream closed while a reply was expected",
            ))
        })?;

        let reply_endpoint = self.endpoint.reversed();
        let envelope = self.decode_envelope(&header, &bytes, reply_endpoint.source, reply_endpoint.destination)?;

        self.bus.before_reply(&envelope);
        self.write_client(&bytes).await?;
        self.bus.after_reply(&envelope);
        Ok(())
    }

    fn decode_envelope(
        &self,
        header: &Header,
        bytes: &[u8],
        source: SocketAddr,
        destination: SocketAddr,
    ) -> Result<Envelope<DbDocument>, SessionError> {
        let message = decode_message(header, bytes, &BsonDocumentDecoder)?;
        Ok(Envelope::new(*header, message, source, destination, SystemTime::now()))
    }

    async fn write_upstream(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.upstream.write_all(bytes).await?;
        self.bytes_client_to_upstream += bytes.len() as u64;
        Ok(())
    }

    async fn write_client(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.client.write_all(bytes).await?;
        self.bytes_upstream_to_client += bytes.len() as u64;
        Ok(())
    }

    fn bump(&mut self, op: OpCode) {
        let count = self.operation_counts.entry(op).or_insert(0);
        if *count == 0 {
            self.operation_order.push(op);
        }
        *count += 1;
    }

    fn summary(&self) -> SessionSummary {
        let operation_counts: Vec<(OpCode, u64)> = self
            .operation_order
            .iter()
            .map(|op| (*op, self.operation_counts[op]))
            .collect();
        let reads = operation_counts
            .iter()
            .filter(|(op, _)| op.is_read())
            .map(|(_, count)| count)
            .sum();
        let writes = operation_counts
            .iter()
            .filter(|(op, _)| op.is_write())
            .map(|(_, count)| count)
            .sum();

        SessionSummary {
            endpoint: self.endpoint,
            operation_counts,
            reads,
            writes,
            bytes_client_to_upstream: self.bytes_client_to_upstream,
            bytes_upstream_to_client: self.bytes_upstream_to_client,
            duration: self.started_at.elapsed(),
        }
    }
}

/// Reads one complete frame: 16-byte header, then `total_length - 16`
/// body bytes. Returns `Ok(None)` only on a clean EOF at the very start of
/// a frame; an EOF mid-header or mid-body is a transport error, since the
/// peer has broken the protocol's framing contract.
async fn read_frame(stream: &mut TcpStream) -> Result<Option<(Header, Vec<u8>)>, SessionError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    let mut filled = 0;
    loop {
        let n = stream.read(&mut header_bytes[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(SessionError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-header",
            )));
        }
        filled += n;
        if filled == HEADER_SIZE {
            break;
        }
    }

    let header = decode_header(&header_bytes)?;
    let mut body = vec![0u8; header.body_len()];
    stream.read_exact(&mut body).await?;

    let mut full = Vec::with_capacity(HEADER_SIZE + body.len());
    full.extend_from_slice(&header_bytes);
    full.extend_from_slice(&body);
    Ok(Some((header, full)))
}
