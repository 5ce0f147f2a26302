//! Fan-out of lifecycle and per-message events to registered observers.
//!
//! Both the inline proxy and the offline sniffer drive the same [`Bus`]: a
//! session or driver decodes a message, builds an [`Envelope`], and calls the
//! matching `before_*`/`after_*` method. A listener that fails (returns
//! `Err`) never aborts the dispatch — the bus logs a warning and keeps going,
//! exactly as the legacy tool's try/except-per-listener did.

use std::fmt;
use std::sync::Arc;

use dbwire_codec::Envelope;
use dbwire_types::{EndpointPair, SessionSummary};
use tracing::warn;

/// Error returned by a listener callback. Opaque on purpose — the bus only
/// needs something `Display`-able to log, not a typed error hierarchy.
#[derive(Debug)]
pub struct ListenerError(Box<dyn std::error::Error + Send + Sync>);

impl ListenerError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> ListenerError {
        ListenerError(error.into())
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

/// A capability set of named callbacks, one per bus event.
///
/// Every method defaults to a no-op, so a listener only overrides the
/// handful of events it actually cares about — the bus dispatches to every
/// registered listener regardless, and the default implementation makes
/// "not interested in this event" free.
#[allow(unused_variables)]
pub trait Listener<D>: Send + Sync {
    /// Name used only in warning logs when this listener fails.
    fn name(&self) -> &str {
        "listener"
    }

    fn on_open(&self, endpoint: EndpointPair) -> ListenerResult {
        Ok(())
    }
    fn on_close(&self, endpoint: EndpointPair) -> ListenerResult {
        Ok(())
    }
    fn on_summary(&self, summary: &SessionSummary) -> ListenerResult {
        Ok(())
    }

    fn before_query(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_query(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_insert(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_insert(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_update(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_update(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_delete(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_delete(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_more(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_more(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }

    /// Inline-proxy-only: fired around the raw write of a Query to upstream.
    fn before_query_send(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_query_send(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    /// Inline-proxy-only: brackets the reply pump triggered by a Query.
    fn before_query_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_query_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_more_send(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_more_send(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn before_more_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
    fn after_more_reply(&self, env: &Envelope<D>) -> ListenerResult {
        Ok(())
    }
}

/// Registers listeners at startup and dispatches events to them in
/// registration order. Registration is not exposed as mutable after
/// construction in the services that use this crate — see
/// [`BusBuilder`] — which keeps the "established at startup, not mutated
/// during operation" guarantee from the concurrency model without needing a
/// lock around the listener list itself.
pub struct Bus<D> {
    listeners: Vec<Arc<dyn Listener<D>>>,
}

/// Builds a [`Bus`] by registering listeners, then freezes it.
#[derive(Default)]
pub struct BusBuilder<D> {
    listeners: Vec<Arc<dyn Listener<D>>>,
}

impl<D> BusBuilder<D> {
    pub fn new() -> BusBuilder<D> {
        BusBuilder {
            listeners: Vec::new(),
        }
    }

    pub fn register(mut self, listener: Arc<dyn Listener<D>>) -> BusBuilder<D> {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Bus<D> {
        Bus {
            listeners: self.listeners,
        }
    }
}

macro_rules! dispatch_endpoint {
    ($name:ident, $arg:ty) => {
        pub fn $name(&self, arg: $arg) {
            for listener in &self.listeners {
                if let Err(e) = listener.$name(arg) {
                    warn!(
                        listener = listener.name(),
                        event = stringify!($name),
                        error = %e,
                        "listener failed"
                    );
                }
            }
        }
    };
}

macro_rules! dispatch_envelope {
    ($name:ident) => {
        pub fn $name(&self, env: &Envelope<D>) {
            for listener in &self.listeners {
                if let Err(e) = listener.$name(env) {
                    warn!(
                        listener = listener.name(),
                        event = stringify!($name),
                        request_id = env.header.request_id,
                        response_to = env.header.response_to,
                        error = %e,
                        "listener failed"
                    );
                }
            }
        }
    };
}

impl<D> Bus<D> {
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    dispatch_endpoint!(on_open, EndpointPair);
    dispatch_endpoint!(on_close, EndpointPair);

    pub fn on_summary(&self, summary: &SessionSummary) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_summary(summary) {
                warn!(listener = listener.name(), error = %e, "listener failed on_summary");
            }
        }
    }

    dispatch_envelope!(before_query);
    dispatch_envelope!(after_query);
    dispatch_envelope!(before_insert);
    dispatch_envelope!(after_insert);
    dispatch_envelope!(before_update);
    dispatch_envelope!(after_update);
    dispatch_envelope!(before_delete);
    dispatch_envelope!(after_delete);
    dispatch_envelope!(before_more);
    dispatch_envelope!(after_more);
    dispatch_envelope!(before_reply);
    dispatch_envelope!(after_reply);
    dispatch_envelope!(before_query_send);
    dispatch_envelope!(after_query_send);
    dispatch_envelope!(before_query_reply);
    dispatch_envelope!(after_query_reply);
    dispatch_envelope!(before_more_send);
    dispatch_envelope!(after_more_send);
    dispatch_envelope!(before_more_reply);
    dispatch_envelope!(after_more_reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_types::{Header, OpCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn env(request_id: u32) -> Envelope<Vec<u8>> {
        Envelope::new(
            Header {
                total_length: 16,
                request_id,
                response_to: 0,
                operation: OpCode::Query,
            },
            dbwire_codec::Message::Other {
                operation: OpCode::Query,
                payload: Vec::new(),
            },
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
            std::time::SystemTime::now(),
        )
    }

    struct FailingListener;
    impl Listener<Vec<u8>> for FailingListener {
        fn name(&self) -> &str {
            "failing"
        }
        fn before_query(&self, _env: &Envelope<Vec<u8>>) -> ListenerResult {
            Err(ListenerError::new("boom"))
        }
    }

    struct CountingListener(Arc<AtomicUsize>);
    impl Listener<Vec<u8>> for CountingListener {
        fn before_query(&self, _env: &Envelope<Vec<u8>>) -> ListenerResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn a_failing_listener_does_not_block_later_listeners() {
        let count = Arc::new(AtomicUsize::new(0));
        let bus: Bus<Vec<u8>> = BusBuilder::new()
            .register(Arc::new(FailingListener))
            .register(Arc::new(CountingListener(count.clone())))
            .build();

        bus.before_query(&env(1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_are_invoked_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Tagging(&'static str, Arc<std::sync::Mutex<Vec<&'static str>>>);
        impl Listener<Vec<u8>> for Tagging {
            fn before_query(&self, _env: &Envelope<Vec<u8>>) -> ListenerResult {
                self.1.lock().unwrap().push(self.0);
                Ok(())
            }
        }

        let bus: Bus<Vec<u8>> = BusBuilder::new()
            .register(Arc::new(Tagging("a", order.clone())))
            .register(Arc::new(Tagging("b", order.clone())))
            .build();

        bus.before_query(&env(1));

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }
}
