//! Request/reply pairing and per-operation latency.
//!
//! The correlator is itself a [`Listener`](dbwire_bus::Listener): it
//! subscribes to the same bus as every other observer, remembers
//! client-originated requests, and on the matching reply emits a derived
//! [`LatencyEvent`] to its own sink. Keyed by `(EndpointPair, request_id)`
//! rather than `request_id` alone — a capture spanning several concurrent
//! client/server pairs on the same port must never pair a reply against a
//! request from a different pair that happens to reuse the same 32-bit id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbwire_bus::{Listener, ListenerResult};
use dbwire_codec::Envelope;
use dbwire_types::{EndpointPair, Header, ObservedAt};

/// A request envelope still awaiting its reply.
#[derive(Debug, Clone)]
struct Pending {
    header: Header,
    endpoints: EndpointPair,
    observed_at: ObservedAt,
}

/// A request successfully paired with its reply.
#[derive(Debug, Clone)]
pub struct LatencyEvent {
    pub request_header: Header,
    pub request_endpoints: EndpointPair,
    pub request_observed_at: ObservedAt,
    pub reply_header: Header,
    pub reply_observed_at: ObservedAt,
    pub elapsed: Duration,
}

/// A request that was still pending when its session or driver ended.
#[derive(Debug, Clone)]
pub struct UnmatchedEvent {
    pub request_header: Header,
    pub request_endpoints: EndpointPair,
    pub request_observed_at: ObservedAt,
}

/// Receives the events the correlator derives. Implemented by the log
/// listener and by anything else that wants paired latency data.
pub trait CorrelationListener: Send + Sync {
    fn on_latency(&self, event: &LatencyEvent) {
        let _ = event;
    }
    fn on_unmatched(&self, event: &UnmatchedEvent) {
        let _ = event;
    }
}

/// Maps `(source_endpoint_pair, request_id)` to the originating request,
/// pairing it off against the reply that travels the reversed endpoint
/// pair. One correlator per inline-proxy session or per offline-sniffer
/// driver run — state never crosses that boundary.
pub struct Correlator {
    pending: Mutex<HashMap<(EndpointPair, u32), Pending>>,
    sink: Arc<dyn CorrelationListener>,
}

impl Correlator {
    pub fn new(sink: Arc<dyn CorrelationListener>) -> Correlator {
        Correlator {
            pending: Mutex::new(HashMap::new()),
            sink,
        }
    }

    fn record_request<D>(&self, env: &Envelope<D>) {
        let key = (env.endpoints(), env.header.request_id);
        let entry = Pending {
            header: env.header,
            endpoints: env.endpoints(),
            observed_at: env.observed_at,
        };
        self.pending.lock().unwrap().insert(key, entry);
    }

    fn record_reply<D>(&self, env: &Envelope<D>) {
        let key = (env.endpoints().reversed(), env.header.response_to);
        let matched = self.pending.lock().unwrap().remove(&key);
        if let Some(request) = matched {
            let elapsed = env
                .observed_at
                .duration_since(request.observed_at)
                .unwrap_or_default();
            self.sink.on_latency(&LatencyEvent {
                request_header: request.header,
                request_endpoints: request.endpoints,
                request_observed_at: request.observed_at,
                reply_header: env.header,
                reply_observed_at: env.observed_at,
                elapsed,
            });
        }
    }

    /// Discards all pending entries, emitting an unmatched event for each.
    /// Called on inline-proxy session close and offline-sniffer driver
    /// shutdown — correlator state never survives past its owning scope.
    pub fn discard_pending(&self) {
        let drained: Vec<Pending> = self.pending.lock().unwrap().drain().map(|(_, v)| v).collect();
        for request in drained {
            self.sink.on_unmatched(&UnmatchedEvent {
                request_header: request.header,
                request_endpoints: request.endpoints,
                request_observed_at: request.observed_at,
            });
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl<D> Listener<D> for Correlator {
    fn name(&self) -> &str {
        "correlator"
    }

    fn on_close(&self, _endpoint: EndpointPair) -> ListenerResult {
        self.discard_pending();
        Ok(())
    }

    fn before_query(&self, env: &Envelope<D>) -> ListenerResult {
        self.record_request(env);
        Ok(())
    }

    fn before_more(&self, env: &Envelope<D>) -> ListenerResult {
        self.record_request(env);
        Ok(())
    }

    fn after_reply(&self, env: &Envelope<D>) -> ListenerResult {
        self.record_reply(env);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_codec::Message;
    use dbwire_types::OpCode;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, SystemTime};

    fn endpoints() -> (std::net::SocketAddr, std::net::SocketAddr) {
        ("127.0.0.1:40000".parse().unwrap(), "127.0.0.1:27017".parse().unwrap())
    }

    fn request_envelope(request_id: u32, at: SystemTime) -> Envelope<Vec<u8>> {
        let (client, upstream) = endpoints();
        Envelope::new(
            Header {
                total_length: 16,
                request_id,
                response_to: 0,
                operation: OpCode::Query,
            },
            Message::Other {
                operation: OpCode::Query,
                payload: Vec::new(),
            },
            client,
            upstream,
            at,
        )
    }

    fn reply_envelope(response_to: u32, at: SystemTime) -> Envelope<Vec<u8>> {
        let (client, upstream) = endpoints();
        Envelope::new(
            Header {
                total_length: 16,
                request_id: 999,
                response_to,
                operation: OpCode::Reply,
            },
            Message::Other {
                operation: OpCode::Reply,
                payload: Vec::new(),
            },
            upstream,
            client,
            at,
        )
    }

    #[derive(Default)]
    struct CollectingSink {
        latencies: StdMutex<Vec<LatencyEvent>>,
        unmatched: StdMutex<Vec<UnmatchedEvent>>,
    }

    impl CorrelationListener for CollectingSink {
        fn on_latency(&self, event: &LatencyEvent) {
            self.latencies.lock().unwrap().push(event.clone());
        }
        fn on_unmatched(&self, event: &UnmatchedEvent) {
            self.unmatched.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn query_then_reply_emits_one_latency_event() {
        let sink = Arc::new(CollectingSink::default());
        let correlator = Correlator::new(sink.clone());

        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_millis(200);

        Listener::<Vec<u8>>::before_query(&correlator, &request_envelope(42, t0)).unwrap();
        Listener::<Vec<u8>>::after_reply(&correlator, &reply_envelope(42, t1)).unwrap();

        let latencies = sink.latencies.lock().unwrap();
        assert_eq!(latencies.len(), 1);
        assert!(latencies[0].elapsed >= Duration::from_millis(200));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn reply_with_no_matching_request_is_not_paired() {
        let sink = Arc::new(CollectingSink::default());
        let correlator = Correlator::new(sink.clone());

        Listener::<Vec<u8>>::after_reply(&correlator, &reply_envelope(7, SystemTime::UNIX_EPOCH)).unwrap();

        assert!(sink.latencies.lock().unwrap().is_empty());
    }

    #[test]
    fn session_close_drains_pending_as_unmatched() {
        let sink = Arc::new(CollectingSink::default());
        let correlator = Correlator::new(sink.clone());

        Listener::<Vec<u8>>::before_query(&correlator, &request_envelope(1, SystemTime::UNIX_EPOCH)).unwrap();
        correlator.discard_pending();

        assert_eq!(sink.unmatched.lock().unwrap().len(), 1);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn requests_from_different_endpoint_pairs_never_cross_pair() {
        let sink = Arc::new(CollectingSink::default());
        let correlator = Correlator::new(sink.clone());

        let client_a: std::net::SocketAddr = "127.0.0.1:50001".parse().unwrap();
        let client_b: std::net::SocketAddr = "127.0.0.1:50002".parse().unwrap();
        let upstream: std::net::SocketAddr = "127.0.0.1:27017".parse().unwrap();

        let req_a = Envelope::new(
            Header { total_length: 16, request_id: 5, response_to: 0, operation: OpCode::Query },
            Message::Other { operation: OpCode::Query, payload: Vec::new() },
            client_a,
            upstream,
            SystemTime::UNIX_EPOCH,
        );
        Listener::<Vec<u8>>::before_query(&correlator, &req_a).unwrap();

        let reply_for_b = Envelope::new(
            Header { total_length: 16, request_id: 999, response_to: 5, operation: OpCode::Reply },
            Message::Other { operation: OpCode::Reply, payload: Vec::new() },
            upstream,
            client_b,
            SystemTime::UNIX_EPOCH,
        );
        Listener::<Vec<u8>>::after_reply(&correlator, &reply_for_b).unwrap();

        assert!(sink.latencies.lock().unwrap().is_empty());
        assert_eq!(correlator.pending_len(), 1);
    }
}
