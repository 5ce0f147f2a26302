use std::net::SocketAddr;

use dbwire_types::{EndpointPair, Header, ObservedAt};

use crate::message::Message;

/// What a listener actually receives: a decoded message plus everything
/// needed to log or correlate it, without re-reading the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<D> {
    pub header: Header,
    pub message: Message<D>,
    /// For the inline proxy, the socket the bytes were read from. For the
    /// offline sniffer, the captured IP+TCP source.
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub observed_at: ObservedAt,
}

impl<D> Envelope<D> {
    pub fn new(
        header: Header,
        message: Message<D>,
        source: SocketAddr,
        destination: SocketAddr,
        observed_at: ObservedAt,
    ) -> Envelope<D> {
        Envelope {
            header,
            message,
            source,
            destination,
            observed_at,
        }
    }

    pub fn endpoints(&self) -> EndpointPair {
        EndpointPair::new(self.source, self.destination)
    }
}
