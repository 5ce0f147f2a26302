//! The offline-sniffer consumer loop: pulls frames from a capture source,
//! reassembles them into complete wire messages, and dispatches the same
//! listener-bus events the inline proxy does.
//!
//! Generic over [`DocumentDecoder`] for the same reason the codec is: the
//! driver itself never depends on a concrete document format, only the
//! binary that constructs it does.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dbwire_bus::Bus;
use dbwire_codec::{decode_header, decode_message, DocumentDecoder, Envelope, Message};
use dbwire_reassembly::Reassembler;
use pcap::{Activated, Capture};
use tracing::warn;

use crate::config::{CaptureSource, SnifferConfig};
use crate::error::DriverError;
use crate::link;

/// Maximum fragments held per source endpoint before the oldest is
/// discarded and a gap event logged. See [`Reassembler`].
pub const DEFAULT_REASSEMBLY_WATERMARK: usize = 64;

/// Owns the per-endpoint reassembly state for one capture run. One driver
/// per process invocation; its reassembler and the correlator it feeds
/// through the bus never survive past that run.
pub struct Driver<Dec: DocumentDecoder> {
    bus: Arc<Bus<Dec::Document>>,
    decoder: Dec,
    reassembler: Reassembler,
}

impl<Dec: DocumentDecoder> Driver<Dec> {
    pub fn new(bus: Arc<Bus<Dec::Document>>, decoder: Dec) -> Driver<Dec> {
        Driver::with_watermark(bus, decoder, DEFAULT_REASSEMBLY_WATERMARK)
    }

    pub fn with_watermark(bus: Arc<Bus<Dec::Document>>, decoder: Dec, watermark: usize) -> Driver<Dec> {
        Driver {
            bus,
            decoder,
            reassembler: Reassembler::new(watermark),
        }
    }

    /// Opens the configured capture source, applies the port filter, and
    /// drains it to completion.
    ///
    /// Returns `Ok(())` on a clean end-of-file — only reachable with a
    /// capture file, since a live device's packet stream never ends on its
    /// own. A live device only returns via [`DriverError::Capture`].
    pub fn run(&mut self, config: &SnifferConfig) -> Result<(), DriverError> {
        let mut capture = open_capture(&config.source, config.port)?;
        let datalink = capture.get_datalink();
        loop {
            match capture.next_packet() {
                Ok(packet) => {
                    let observed_at = packet_timestamp(packet.header);
                    self.handle_frame(datalink, packet.data, observed_at);
                }
                Err(pcap::Error::NoMorePackets) => return Ok(()),
                Err(e) => return Err(DriverError::Capture(e)),
            }
        }
    }

    /// Feeds one captured link-layer frame through reassembly and, for
    /// each message that completes as a result, through the codec and bus.
    ///
    /// Public so the driver's dispatch logic can be exercised with
    /// synthetic frames in tests, without needing a real capture device or
    /// `.pcap` file.
    pub fn handle_frame(&mut self, datalink: pcap::Linktype, frame: &[u8], observed_at: SystemTime) {
        let Some(segment) = link::parse_tcp_segment(datalink, frame) else {
            return;
        };

        let completed = self
            .reassembler
            .ingest(segment.source, segment.ip_identifier, segment.payload);

        for gap in self.reassembler.take_gaps() {
            warn!(
                source = %gap.source,
                discarded_identifier = gap.discarded_identifier,
                pending_len = gap.pending_len,
                "reassembly watermark exceeded, dropping oldest fragment"
            );
        }

        for message_bytes in completed {
            self.dispatch_message(&message_bytes, segment.source, segment.destination, observed_at);
        }
    }

    fn dispatch_message(&self, bytes: &[u8], source: SocketAddr, destination: SocketAddr, observed_at: SystemTime) {
        let header = match decode_header(bytes) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, %source, "dropping unparsable frame header");
                return;
            }
        };

        let message = match decode_message(&header, bytes, &self.decoder) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    error = %e,
                    %source,
                    request_id = header.request_id,
                    "dropping unparsable message body"
                );
                return;
            }
        };

        let envelope = Envelope::new(header, message, source, destination, observed_at);

        // Both before_* and after_* fire back-to-back: the sniffer never
        // terminates the flow it's observing, so there's nothing to
        // interpose between the two the way the inline proxy's reply pump
        // does.
        match &envelope.message {
            Message::Query { .. } => {
                self.bus.before_query(&envelope);
                self.bus.after_query(&envelope);
            }
            Message::GetMore { .. } => {
                self.bus.before_more(&envelope);
                self.bus.after_more(&envelope);
            }
            Message::Insert { .. } => {
                self.bus.before_insert(&envelope);
                self.bus.after_insert(&envelope);
            }
            Message::Update { .. } => {
                self.bus.before_update(&envelope);
                self.bus.after_update(&envelope);
            }
            Message::Delete { .. } => {
                self.bus.before_delete(&envelope);
                self.bus.after_delete(&envelope);
            }
            Message::Reply { .. } => {
                self.bus.before_reply(&envelope);
                self.bus.after_reply(&envelope);
                self.bus.after_query(&envelope);
            }
            Message::Other { .. } => {
                // KillCursors and anything else unrecognised: no
                // specialised event exists for it, same as the inline
                // proxy's opaque forward-only path.
            }
        }
    }
}

fn open_capture(source: &CaptureSource, port: u16) -> Result<Capture<dyn Activated>, pcap::Error> {
    let mut capture: Capture<dyn Activated> = match source {
        CaptureSource::Device(name) => {
            let device = pcap::Device::list()?
                .into_iter()
                .find(|d| &d.name == name)
                .ok_or_else(|| pcap::Error::PcapError(format!("no such capture device: {name}")))?;
            Capture::from_device(device)?.promisc(true).snaplen(65535).open()?.into()
        }
        CaptureSource::File(path) => Capture::from_file(path)?.into(),
    };
    capture.filter(&format!("tcp port {port}"), true)?;
    Ok(capture)
}

/// Convert a capture timestamp (seconds + microseconds since the Unix
/// epoch) into the same `SystemTime` representation the inline proxy uses
/// for its OS-clock timestamps.
fn packet_timestamp(header: &pcap::PacketHeader) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::new(header.ts.tv_sec as u64, (header.ts.tv_usec as u32) * 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_bus::{BusBuilder, Listener, ListenerResult};
    use dbwire_test_utils::capture::ethernet_ipv4_tcp_frame;
    use dbwire_test_utils::{fake_document, wire_message, CountingDecoder};
    use dbwire_types::EndpointPair;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        before_insert: Mutex<Vec<EndpointPair>>,
        after_insert: Mutex<Vec<EndpointPair>>,
    }

    impl Listener<Vec<u8>> for Recording {
        fn before_insert(&self, env: &Envelope<Vec<u8>>) -> ListenerResult {
            self.before_insert.lock().unwrap().push(env.endpoints());
            Ok(())
        }
        fn after_insert(&self, env: &Envelope<Vec<u8>>) -> ListenerResult {
            self.after_insert.lock().unwrap().push(env.endpoints());
            Ok(())
        }
    }

    fn insert_message_bytes() -> Vec<u8> {
        let doc = fake_document(b"_id:1");
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(b"t.c\0");
        body.extend_from_slice(&doc);
        wire_message(1, 0, 2002, &body)
    }

    #[test]
    fn a_single_frame_already_forming_one_message_dispatches_before_and_after() {
        let recording = Arc::new(Recording::default());
        let bus: Arc<Bus<Vec<u8>>> = Arc::new(BusBuilder::new().register(recording.clone()).build());
        let mut driver = Driver::new(bus, CountingDecoder);

        let frame = ethernet_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            34567,
            Ipv4Addr::new(10, 0, 0, 2),
            27017,
            1,
            &insert_message_bytes(),
        );

        driver.handle_frame(pcap::Linktype::ETHERNET, &frame, SystemTime::now());

        assert_eq!(recording.before_insert.lock().unwrap().len(), 1);
        assert_eq!(recording.after_insert.lock().unwrap().len(), 1);
    }

    #[test]
    fn a_message_split_across_two_fragments_only_dispatches_once_complete() {
        let recording = Arc::new(Recording::default());
        let bus: Arc<Bus<Vec<u8>>> = Arc::new(BusBuilder::new().register(recording.clone()).build());
        let mut driver = Driver::new(bus, CountingDecoder);

        let message = insert_message_bytes();
        let (first, second) = message.split_at(20);

        let frame_a = ethernet_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            34567,
            Ipv4Addr::new(10, 0, 0, 2),
            27017,
            10,
            first,
        );
        let frame_b = ethernet_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            34567,
            Ipv4Addr::new(10, 0, 0, 2),
            27017,
            11,
            second,
        );

        driver.handle_frame(pcap::Linktype::ETHERNET, &frame_a, SystemTime::now());
        assert!(recording.after_insert.lock().unwrap().is_empty());

        driver.handle_frame(pcap::Linktype::ETHERNET, &frame_b, SystemTime::now());
        assert_eq!(recording.after_insert.lock().unwrap().len(), 1);
    }

    #[test]
    fn a_frame_that_is_not_ip_or_tcp_is_silently_dropped() {
        let recording = Arc::new(Recording::default());
        let bus: Arc<Bus<Vec<u8>>> = Arc::new(BusBuilder::new().register(recording.clone()).build());
        let mut driver = Driver::new(bus, CountingDecoder);

        driver.handle_frame(pcap::Linktype::ETHERNET, b"not a real ethernet frame", SystemTime::now());

        assert!(recording.before_insert.lock().unwrap().is_empty());
    }
}
