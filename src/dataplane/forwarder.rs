//! Datagram forwarding: TTL decrement, checksum rewrite and L2 re-framing

use crate::protocol::ethernet::FrameBuilder;
use crate::protocol::ipv4::Ipv4Packet;
use crate::protocol::{EtherType, MacAddr};
use crate::{Error, Result};

/// Rewrite `datagram` for its next hop and wrap it in a fresh Ethernet
/// frame. Fails with `InvalidPacket` if the TTL is already exhausted;
/// the caller decides whether that turns into an ICMP error.
pub fn forward(datagram: &[u8], egress_mac: MacAddr, next_hop_mac: MacAddr) -> Result<Vec<u8>> {
    let mut packet = Ipv4Packet::from_bytes(datagram)?;
    if !packet.decrement_ttl() {
        return Err(Error::InvalidPacket("TTL exhausted".into()));
    }

    Ok(FrameBuilder::new()
        .dst_mac(next_hop_mac)
        .src_mac(egress_mac)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(packet.as_bytes())
        .build())
}
