//! The default, always-registered structured-logging listener.
//!
//! Implemented purely in terms of the public [`Listener`] and
//! [`CorrelationListener`] contracts — exactly as a third-party listener
//! would be — so it can be disabled or swapped out without touching the
//! core crates. Per-message events log at `debug`; connection lifecycle,
//! the session summary, and correlated latency log at `info`.

use dbwire_bus::{Listener, ListenerResult};
use dbwire_codec::Envelope;
use dbwire_correlate::{CorrelationListener, LatencyEvent, UnmatchedEvent};
use dbwire_types::{EndpointPair, SessionSummary};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl LogListener {
    pub fn new() -> LogListener {
        LogListener
    }
}

macro_rules! log_envelope {
    ($name:ident) => {
        fn $name(&self, env: &Envelope<D>) -> ListenerResult {
            debug!(
                event = stringify!($name),
                operation = env.header.operation.name(),
                request_id = env.header.request_id,
                response_to = env.header.response_to,
                source = %env.source,
                destination = %env.destination,
                "dbwire message event"
            );
            Ok(())
        }
    };
}

impl<D> Listener<D> for LogListener {
    fn name(&self) -> &str {
        "log-listener"
    }

    fn on_open(&self, endpoint: EndpointPair) -> ListenerResult {
        info!(%endpoint, "session opened");
        Ok(())
    }

    fn on_close(&self, endpoint: EndpointPair) -> ListenerResult {
        info!(%endpoint, "session closed");
        Ok(())
    }

    fn on_summary(&self, summary: &SessionSummary) -> ListenerResult {
        info!(
            endpoint = %summary.endpoint,
            reads = summary.reads,
            writes = summary.writes,
            bytes_client_to_upstream = summary.bytes_client_to_upstream,
            bytes_upstream_to_client = summary.bytes_upstream_to_client,
            duration_ms = summary.duration.as_millis() as u64,
            "session summary"
        );
        Ok(())
    }

    log_envelope!(before_query);
    log_envelope!(after_query);
    log_envelope!(before_insert);
    log_envelope!(after_insert);
    log_envelope!(before_update);
    log_envelope!(after_update);
    log_envelope!(before_delete);
    log_envelope!(after_delete);
    log_envelope!(before_more);
    log_envelope!(after_more);
    log_envelope!(before_reply);
    log_envelope!(after_reply);
    log_envelope!(before_query_send);
    log_envelope!(after_query_send);
    log_envelope!(before_query_reply);
    log_envelope!(after_query_reply);
    log_envelope!(before_more_send);
    log_envelope!(after_more_send);
    log_envelope!(before_more_reply);
    log_envelope!(after_more_reply);
}

impl CorrelationListener for LogListener {
    fn on_latency(&self, event: &LatencyEvent) {
        info!(
            operation = event.request_header.operation.name(),
            request_id = event.request_header.request_id,
            endpoint = %event.request_endpoints,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "request completed"
        );
    }

    fn on_unmatched(&self, event: &UnmatchedEvent) {
        info!(
            operation = event.request_header.operation.name(),
            request_id = event.request_header.request_id,
            endpoint = %event.request_endpoints,
            "request never received a reply"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_codec::Message;
    use dbwire_types::{Header, OpCode};
    use std::time::SystemTime;

    #[test]
    fn logging_a_message_event_never_errors() {
        let listener = LogListener::new();
        let env: Envelope<Vec<u8>> = Envelope::new(
            Header {
                total_length: 16,
                request_id: 1,
                response_to: 0,
                operation: OpCode::Query,
            },
            Message::Other {
                operation: OpCode::Query,
                payload: Vec::new(),
            },
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
            SystemTime::now(),
        );

        assert!(Listener::<Vec<u8>>::before_query(&listener, &env).is_ok());
        assert!(Listener::<Vec<u8>>::on_open(&listener, env.endpoints()).is_ok());
    }
}
