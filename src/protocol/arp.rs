//! ARP packet parsing and construction (Ethernet/IPv4 only)

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Fixed size of an Ethernet/IPv4 ARP packet
pub const PACKET_SIZE: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const HLEN_ETHERNET: u8 = 6;
const PLEN_IPV4: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// Decoded ARP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 {
            return Err(Error::Parse("unsupported ARP hardware/protocol type".into()));
        }
        if buffer[4] != HLEN_ETHERNET || buffer[5] != PLEN_IPV4 {
            return Err(Error::Parse("unsupported ARP address lengths".into()));
        }

        let op = u16::from_be_bytes([buffer[6], buffer[7]]);
        let operation = ArpOp::from_u16(op)
            .ok_or_else(|| Error::Parse(format!("unknown ARP operation {op}")))?;

        Ok(Self {
            operation,
            sender_mac: MacAddr(buffer[8..14].try_into().unwrap()),
            sender_ip: Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]),
            target_mac: MacAddr(buffer[18..24].try_into().unwrap()),
            target_ip: Ipv4Addr::new(buffer[24], buffer[25], buffer[26], buffer[27]),
        })
    }

    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut buffer = [0u8; PACKET_SIZE];
        buffer[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buffer[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        buffer[4] = HLEN_ETHERNET;
        buffer[5] = PLEN_IPV4;
        buffer[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buffer[8..14].copy_from_slice(&self.sender_mac.0);
        buffer[14..18].copy_from_slice(&self.sender_ip.octets());
        buffer[18..24].copy_from_slice(&self.target_mac.0);
        buffer[24..28].copy_from_slice(&self.target_ip.octets());
        buffer
    }

    /// Build a who-has request; the target MAC is zero until resolved.
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Build a reply answering `request` with our MAC/IP pair.
    pub fn reply(request: &ArpPacket, our_mac: MacAddr, our_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac: our_mac,
            sender_ip: our_ip,
            target_mac: request.sender_mac,
            target_ip: request.sender_ip,
        }
    }
}
