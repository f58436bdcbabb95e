//! IPv4 protocol - RFC 791

use super::internet_checksum;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Fixed IPv4 header size (no options)
pub const MIN_HEADER_SIZE: usize = 20;

/// IPv4 protocol numbers the dataplane distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IpProto {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl IpProto {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(IpProto::Icmp),
            6 => Some(IpProto::Tcp),
            17 => Some(IpProto::Udp),
            _ => None,
        }
    }
}

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
    datagram_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let header_len = ((buffer[0] & 0x0F) as usize) * 4;
        if header_len < MIN_HEADER_SIZE || buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        let total_length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        if total_length < header_len {
            return Err(Error::Parse("IPv4 total length below header length".into()));
        }

        // Ethernet padding may extend the buffer past the datagram
        let datagram_len = total_length.min(buffer.len());

        Ok(Self {
            buffer,
            header_len,
            datagram_len,
        })
    }

    pub fn tos(&self) -> u8 {
        self.buffer[1]
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Raw header bytes
    pub fn header_bytes(&self) -> &'a [u8] {
        &self.buffer[..self.header_len]
    }

    /// Datagram payload, bounded by the total-length field
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..self.datagram_len]
    }

    pub fn validate_checksum(&self) -> bool {
        internet_checksum(&self.buffer[..self.header_len]) == 0
    }
}

/// Owned, mutable IPv4 packet for forwarding rewrites
#[derive(Debug)]
pub struct Ipv4Packet {
    buffer: Vec<u8>,
    header_len: usize,
}

impl Ipv4Packet {
    /// Create from raw bytes (copies the data)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = Ipv4Header::parse(data)?;
        let header_len = header.header_len();
        Ok(Self {
            buffer: data.to_vec(),
            header_len,
        })
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    /// Decrement TTL by one and recompute the header checksum.
    /// Returns false if the TTL is already exhausted (<= 1).
    pub fn decrement_ttl(&mut self) -> bool {
        if self.buffer[8] <= 1 {
            return false;
        }
        self.buffer[8] -= 1;
        self.update_checksum();
        true
    }

    /// Recompute the header-only checksum with the field zeroed first
    pub fn update_checksum(&mut self) {
        self.buffer[10] = 0;
        self.buffer[11] = 0;
        let sum = internet_checksum(&self.buffer[..self.header_len]);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Builder for synthesized IPv4 datagrams (ICMP replies and errors).
///
/// The identification and flags/fragment-offset words are always zero;
/// this router never originates fragments.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    tos: u8,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            tos: 0,
            ttl: 64,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = (MIN_HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];

        buffer[0] = 0x45; // version 4, ihl 5
        buffer[1] = self.tos;
        buffer[2..4].copy_from_slice(&total_length.to_be_bytes());
        // identification, flags and fragment offset stay zero
        buffer[8] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = internet_checksum(&buffer[..MIN_HEADER_SIZE]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(ttl: u8) -> Vec<u8> {
        Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(192, 168, 1, 1))
            .dst_addr(Ipv4Addr::new(192, 168, 1, 2))
            .ttl(ttl)
            .protocol(IpProto::Icmp as u8)
            .payload(&[0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01])
            .build()
    }

    #[test]
    fn test_parse_header() {
        let data = make_packet(64);
        let hdr = Ipv4Header::parse(&data).unwrap();

        assert_eq!(hdr.header_len(), 20);
        assert_eq!(hdr.total_length(), 28);
        assert_eq!(hdr.identification(), 0);
        assert_eq!(hdr.ttl(), 64);
        assert_eq!(hdr.protocol(), 1);
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hdr.dst_addr(), Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(hdr.payload().len(), 8);
        assert!(hdr.validate_checksum());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Ipv4Header::parse(&[0u8; 19]).is_err());

        let mut v6 = make_packet(64);
        v6[0] = 0x65;
        assert!(Ipv4Header::parse(&v6).is_err());

        let mut truncated = make_packet(64);
        truncated[0] = 0x4F; // ihl 15, buffer shorter than 60
        assert!(Ipv4Header::parse(&truncated).is_err());
    }

    #[test]
    fn test_payload_ignores_ethernet_padding() {
        let mut data = make_packet(64);
        data.extend_from_slice(&[0u8; 18]); // pad to minimum frame size
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload().len(), 8);
    }

    #[test]
    fn test_decrement_ttl() {
        let mut pkt = Ipv4Packet::from_bytes(&make_packet(64)).unwrap();
        assert!(pkt.decrement_ttl());
        assert_eq!(pkt.ttl(), 63);

        let hdr = Ipv4Header::parse(pkt.as_bytes()).unwrap();
        assert!(hdr.validate_checksum());
    }

    #[test]
    fn test_decrement_ttl_exhausted() {
        let mut pkt = Ipv4Packet::from_bytes(&make_packet(1)).unwrap();
        assert!(!pkt.decrement_ttl());
        assert_eq!(pkt.ttl(), 1);
    }

    #[test]
    fn test_builder_zeroes_fragment_word() {
        let data = make_packet(64);
        assert_eq!(&data[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_ip_proto_from_u8() {
        assert_eq!(IpProto::from_u8(1), Some(IpProto::Icmp));
        assert_eq!(IpProto::from_u8(6), Some(IpProto::Tcp));
        assert_eq!(IpProto::from_u8(17), Some(IpProto::Udp));
        assert_eq!(IpProto::from_u8(89), None);
    }
}
