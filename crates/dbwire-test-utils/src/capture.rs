//! Synthetic link/IP/TCP frame builders.
//!
//! Lets the offline-sniffer driver's tests exercise both datalink families
//! it has to handle (Ethernet and Linux cooked capture) without a real NIC
//! or a `.pcap` fixture file on disk.

use std::net::Ipv4Addr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
const PROTO_TCP: u8 = 6;

fn ipv4_header(src: Ipv4Addr, dst: Ipv4Addr, identifier: u16, payload_len: usize) -> Vec<u8> {
    let total_len = (20 + 20 + payload_len) as u16;
    let mut header = Vec::with_capacity(20);
    header.push(0x45); // version 4, IHL 5 (no options)
    header.push(0x00); // DSCP/ECN
    header.extend_from_slice(&total_len.to_be_bytes());
    header.extend_from_slice(&identifier.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes()); // flags/fragment offset: unfragmented
    header.push(64); // TTL
    header.push(PROTO_TCP);
    header.extend_from_slice(&0u16.to_be_bytes()); // checksum, unchecked by the driver
    header.extend_from_slice(&src.octets());
    header.extend_from_slice(&dst.octets());
    header
}

fn tcp_header(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut header = Vec::with_capacity(20);
    header.extend_from_slice(&src_port.to_be_bytes());
    header.extend_from_slice(&dst_port.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes()); // sequence number
    header.extend_from_slice(&0u32.to_be_bytes()); // ack number
    header.push(0x50); // data offset: 5 words, no options
    header.push(0x18); // flags: PSH, ACK
    header.extend_from_slice(&65535u16.to_be_bytes()); // window
    header.extend_from_slice(&0u16.to_be_bytes()); // checksum, unchecked by the driver
    header.extend_from_slice(&0u16.to_be_bytes()); // urgent pointer
    header
}

/// Build one IPv4/TCP segment carrying `payload`, preceded by a 14-byte
/// Ethernet header (src/dst MAC are fixed dummies; only the ethertype
/// matters to the driver).
pub fn ethernet_ipv4_tcp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    ip_identifier: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0xaa; 6]); // destination MAC
    frame.extend_from_slice(&[0xbb; 6]); // source MAC
    frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    frame.extend_from_slice(&ipv4_header(src, dst, ip_identifier, payload.len()));
    frame.extend_from_slice(&tcp_header(src_port, dst_port));
    frame.extend_from_slice(payload);
    frame
}

/// Same segment, preceded by a 16-byte Linux cooked capture (SLL) header
/// instead of an Ethernet header — the format `any`-device captures use.
pub fn linux_cooked_ipv4_tcp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    ip_identifier: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&0u16.to_be_bytes()); // packet type: incoming
    frame.extend_from_slice(&[0x00, 0x01]); // ARPHRD type: ethernet
    frame.extend_from_slice(&6u16.to_be_bytes()); // link-layer address length
    frame.extend_from_slice(&[0; 8]); // link-layer address, padded
    frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    frame.extend_from_slice(&ipv4_header(src, dst, ip_identifier, payload.len()));
    frame.extend_from_slice(&tcp_header(src_port, dst_port));
    frame.extend_from_slice(payload);
    frame
}
