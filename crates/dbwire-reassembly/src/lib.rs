//! Reassembles captured, possibly out-of-order payload fragments back into
//! complete wire messages, for the offline sniffer only.
//!
//! The inline proxy never needs this: it reads from a live `TcpStream`,
//! which already delivers bytes in order. A pcap capture can hand back
//! fragments out of sequence, so each per-source endpoint gets its own
//! pending list, kept sorted by the fragment's IP identifier.

use std::collections::HashMap;
use std::net::SocketAddr;

use dbwire_codec::decode_header;

/// Emitted when the pending list for a source endpoint grows past the
/// configured watermark and the oldest fragment is dropped to make room.
///
/// Not fatal: reassembly for that source simply loses whatever message the
/// discarded fragment would have contributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapEvent {
    pub source: SocketAddr,
    pub discarded_identifier: u32,
    pub pending_len: usize,
}

/// Per-source-endpoint reassembly state and the watermark that bounds it.
pub struct Reassembler {
    pending: HashMap<SocketAddr, Vec<(u32, Vec<u8>)>>,
    watermark: usize,
    gaps: Vec<GapEvent>,
}

impl Reassembler {
    /// `watermark` is the maximum number of fragments held per source
    /// endpoint before the oldest is discarded.
    pub fn new(watermark: usize) -> Reassembler {
        Reassembler {
            pending: HashMap::new(),
            watermark,
            gaps: Vec::new(),
        }
    }

    /// Feed one captured fragment for `source`, identified by its IP
    /// identifier, and return zero or more complete message byte buffers
    /// that could be peeled off as a result.
    pub fn ingest(&mut self, source: SocketAddr, ip_identifier: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        let list = self.pending.entry(source).or_default();
        insert_sorted(list, ip_identifier, payload);
        enforce_watermark(list, source, self.watermark, &mut self.gaps);

        let mut completed = Vec::new();
        loop {
            let list = self.pending.get_mut(&source).expect("just inserted above");
            if list.is_empty() {
                break;
            }
            let before_len = list.len();

            let mut run_end = 0;
            while run_end + 1 < list.len() && list[run_end + 1].0 == list[run_end].0.wrapping_add(1) {
                run_end += 1;
            }
            let run: Vec<(u32, Vec<u8>)> = list.drain(0..=run_end).collect();
            let lowest_id = run[0].0;
            let mut buf = Vec::new();
            for (_, chunk) in run {
                buf.extend_from_slice(&chunk);
            }

            peel_complete_messages(&mut buf, &mut completed);

            if !buf.is_empty() {
                list.insert(0, (lowest_id, buf));
            }

            if list.len() == before_len {
                break;
            }
        }

        completed
    }

    /// Drain and return any gap events recorded since the last call.
    pub fn take_gaps(&mut self) -> Vec<GapEvent> {
        std::mem::take(&mut self.gaps)
    }
}

fn insert_sorted(list: &mut Vec<(u32, Vec<u8>)>, ip_identifier: u32, payload: Vec<u8>) {
    let pos = list.partition_point(|(id, _)| *id < ip_identifier);
    list.insert(pos, (ip_identifier, payload));
}

fn enforce_watermark(
    list: &mut Vec<(u32, Vec<u8>)>,
    source: SocketAddr,
    watermark: usize,
    gaps: &mut Vec<GapEvent>,
) {
    while list.len() > watermark {
        let (discarded_identifier, _) = list.remove(0);
        gaps.push(GapEvent {
            source,
            discarded_identifier,
            pending_len: list.len(),
        });
    }
}

/// Peel as many complete messages as `buf` currently contains, appending
/// each to `completed` and leaving any trailing partial message in `buf`.
fn peel_complete_messages(buf: &mut Vec<u8>, completed: &mut Vec<Vec<u8>>) {
    loop {
        if buf.len() < 16 {
            return;
        }
        let header = match decode_header(buf) {
            Ok(header) => header,
            Err(_) => return,
        };
        let total_length = header.total_length as usize;
        if buf.len() < total_length {
            return;
        }
        completed.push(buf[..total_length].to_vec());
        buf.drain(0..total_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:27017".parse().unwrap()
    }

    fn message(total_length: u32, request_id: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&total_length.to_le_bytes());
        buf.extend_from_slice(&request_id.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&2002i32.to_le_bytes());
        buf.resize(total_length as usize, 0xAB);
        buf
    }

    #[test]
    fn single_fragment_already_complete_is_emitted_immediately() {
        let mut r = Reassembler::new(16);
        let msg = message(20, 1);
        let out = r.ingest(addr(), 0, msg.clone());
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn two_fragments_in_order_reassemble_into_one_message() {
        let mut r = Reassembler::new(16);
        let msg = message(40, 1);
        let (first, second) = msg.split_at(20);

        assert!(r.ingest(addr(), 0, first.to_vec()).is_empty());
        let out = r.ingest(addr(), 1, second.to_vec());
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn out_of_order_fragments_still_reassemble() {
        let mut r = Reassembler::new(16);
        let msg = message(40, 7);
        let (first, second) = msg.split_at(20);

        assert!(r.ingest(addr(), 5, second.to_vec()).is_empty());
        let out = r.ingest(addr(), 4, first.to_vec());
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn non_contiguous_fragment_is_held_until_the_gap_fills_in() {
        let mut r = Reassembler::new(16);
        let msg = message(48, 3);
        let (first, rest) = msg.split_at(16);
        let (second, third) = rest.split_at(16);

        assert!(r.ingest(addr(), 0, first.to_vec()).is_empty());
        // identifier 2 leaves a gap at 1: nothing should reassemble yet.
        assert!(r.ingest(addr(), 2, third.to_vec()).is_empty());
        let out = r.ingest(addr(), 1, second.to_vec());
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn trailing_bytes_after_a_full_message_are_requeued() {
        let mut r = Reassembler::new(16);
        let first_msg = message(20, 1);
        let second_msg = message(20, 2);
        let mut combined = first_msg.clone();
        combined.extend_from_slice(&second_msg[..10]);

        let out = r.ingest(addr(), 0, combined);
        assert_eq!(out, vec![first_msg]);

        let out = r.ingest(addr(), 1, second_msg[10..].to_vec());
        assert_eq!(out, vec![second_msg]);
    }

    #[test]
    fn exceeding_the_watermark_drops_the_oldest_fragment_and_reports_a_gap() {
        let mut r = Reassembler::new(2);
        r.ingest(addr(), 0, vec![1, 2, 3]);
        r.ingest(addr(), 1, vec![4, 5, 6]);
        r.ingest(addr(), 2, vec![7, 8, 9]);

        let gaps = r.take_gaps();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].discarded_identifier, 0);
        assert_eq!(gaps[0].source, addr());
    }

    #[test]
    fn independent_sources_do_not_interfere() {
        let mut r = Reassembler::new(16);
        let other: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let msg_a = message(20, 1);
        let msg_b = message(20, 2);

        let out_a = r.ingest(addr(), 0, msg_a.clone());
        let out_b = r.ingest(other, 0, msg_b.clone());
        assert_eq!(out_a, vec![msg_a]);
        assert_eq!(out_b, vec![msg_b]);
    }
}
