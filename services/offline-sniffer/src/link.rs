//! Strips link/IP/TCP headers off a captured frame, leaving the raw TCP
//! payload and the addressing the reassembler and envelope need.
//!
//! Two datalink families are handled, chosen by the capture's own
//! [`pcap::Linktype`]: standard Ethernet, and Linux "cooked" capture (`any`
//! device captures, which have no real link layer to report). Anything
//! else is treated as undecodable and skipped by the driver, the same way
//! a malformed packet is.

use std::net::{IpAddr, SocketAddr};

use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::Packet;

/// 16-byte Linux cooked-capture (SLL) header length, preceding the
/// ethertype-tagged payload.
const LINUX_SLL_HEADER_LEN: usize = 16;

/// A decoded TCP segment, addressed and still carrying its IP identifier
/// for the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub ip_identifier: u32,
    pub payload: Vec<u8>,
}

/// Strip link, IP, and TCP headers from one captured frame.
///
/// Returns `None` for anything this driver doesn't need to understand:
/// non-IPv4 traffic, non-TCP traffic, or a frame too short for its own
/// declared headers. None of these are errors worth logging individually —
/// a capture filtered to `tcp port N` should never produce them, but a
/// promiscuous or unfiltered capture might.
pub fn parse_tcp_segment(datalink: pcap::Linktype, frame: &[u8]) -> Option<Segment> {
    let ip_bytes = strip_link_header(datalink, frame)?;
    let ip_packet = Ipv4Packet::new(ip_bytes)?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    let ip_identifier = u32::from(ip_packet.get_identification());
    let source_ip = IpAddr::V4(ip_packet.get_source());
    let destination_ip = IpAddr::V4(ip_packet.get_destination());

    let tcp_packet = TcpPacket::new(ip_packet.payload())?;
    let source = SocketAddr::new(source_ip, tcp_packet.get_source());
    let destination = SocketAddr::new(destination_ip, tcp_packet.get_destination());
    let payload = tcp_packet.payload().to_vec();

    Some(Segment {
        source,
        destination,
        ip_identifier,
        payload,
    })
}

/// Returns the IPv4 datagram that follows the link-layer header, or `None`
/// if the datalink is unsupported or the frame is too short to contain
/// that header, or if the link-layer payload isn't IPv4.
fn strip_link_header(datalink: pcap::Linktype, frame: &[u8]) -> Option<&[u8]> {
    if datalink == pcap::Linktype::ETHERNET {
        let ethernet = EthernetPacket::new(frame)?;
        if ethernet.get_ethertype() != EtherTypes::Ipv4 {
            return None;
        }
        Some(&frame[EthernetPacket::minimum_packet_size()..])
    } else if datalink == pcap::Linktype::LINUX_SLL {
        if frame.len() < LINUX_SLL_HEADER_LEN {
            return None;
        }
        let ethertype = u16::from_be_bytes([frame[14], frame[15]]);
        if ethertype != EtherTypes::Ipv4.0 {
            return None;
        }
        Some(&frame[LINUX_SLL_HEADER_LEN..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_test_utils::capture::{ethernet_ipv4_tcp_frame, linux_cooked_ipv4_tcp_frame};
    use std::net::Ipv4Addr;

    #[test]
    fn decodes_an_ethernet_framed_segment() {
        let frame = ethernet_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            34567,
            Ipv4Addr::new(10, 0, 0, 2),
            27017,
            100,
            b"payload-bytes",
        );

        let segment = parse_tcp_segment(pcap::Linktype::ETHERNET, &frame).unwrap();
        assert_eq!(segment.source, "10.0.0.1:34567".parse().unwrap());
        assert_eq!(segment.destination, "10.0.0.2:27017".parse().unwrap());
        assert_eq!(segment.ip_identifier, 100);
        assert_eq!(segment.payload, b"payload-bytes");
    }

    #[test]
    fn decodes_a_linux_cooked_framed_segment() {
        let frame = linux_cooked_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            34567,
            Ipv4Addr::new(10, 0, 0, 2),
            27017,
            101,
            b"more-bytes",
        );

        let segment = parse_tcp_segment(pcap::Linktype::LINUX_SLL, &frame).unwrap();
        assert_eq!(segment.source, "10.0.0.1:34567".parse().unwrap());
        assert_eq!(segment.ip_identifier, 101);
        assert_eq!(segment.payload, b"more-bytes");
    }

    #[test]
    fn unsupported_datalink_is_skipped_not_panicked() {
        let frame = ethernet_ipv4_tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            1,
            Ipv4Addr::new(10, 0, 0, 2),
            2,
            0,
            b"x",
        );
        assert!(parse_tcp_segment(pcap::Linktype(999), &frame).is_none());
    }
}
