//! ICMP message synthesis: echo replies and error frames, already
//! wrapped in IP and Ethernet headers for the ingress interface.

use crate::dataplane::router::Iface;
use crate::protocol::ethernet::FrameBuilder;
use crate::protocol::ipv4::{Ipv4Builder, Ipv4Header};
use crate::protocol::{icmp, EtherType, MacAddr};
use crate::Result;

const IPPROTO_ICMP: u8 = 1;

/// Wrap an ICMP message for transmission back to the original sender
/// out the interface the offending frame arrived on.
fn wrap(iface: &Iface, orig_src_mac: MacAddr, dst_ip: std::net::Ipv4Addr, icmp: &[u8]) -> Vec<u8> {
    let datagram = Ipv4Builder::new()
        .protocol(IPPROTO_ICMP)
        .src_addr(iface.ip)
        .dst_addr(dst_ip)
        .payload(icmp)
        .build();

    FrameBuilder::new()
        .dst_mac(orig_src_mac)
        .src_mac(iface.mac)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&datagram)
        .build()
}

/// Build an echo-reply frame answering the echo request in `icmp_bytes`.
pub fn echo_reply(
    iface: &Iface,
    orig_src_mac: MacAddr,
    orig_header: &Ipv4Header<'_>,
    icmp_bytes: &[u8],
) -> Result<Vec<u8>> {
    let reply = icmp::build_echo_reply(icmp_bytes)?;
    Ok(wrap(iface, orig_src_mac, orig_header.src_addr(), &reply))
}

/// Build an ICMP error frame (destination unreachable or time exceeded)
/// quoting the offending datagram.
pub fn error_frame(
    iface: &Iface,
    orig_src_mac: MacAddr,
    orig_header: &Ipv4Header<'_>,
    icmp_type: u8,
    code: u8,
) -> Vec<u8> {
    let message = icmp::build_error_message(
        icmp_type,
        code,
        orig_header.header_bytes(),
        orig_header.payload(),
    );
    wrap(iface, orig_src_mac, orig_header.src_addr(), &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::Frame;
    use crate::protocol::icmp::IcmpPacket;
    use std::net::Ipv4Addr;

    const HOST_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x09]);

    fn iface() -> Iface {
        Iface {
            name: "eth0".to_string(),
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ip: Ipv4Addr::new(10, 0, 1, 1),
        }
    }

    fn offending_datagram() -> Vec<u8> {
        Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(10, 0, 1, 2))
            .dst_addr(Ipv4Addr::new(10, 0, 2, 9))
            .ttl(1)
            .protocol(17)
            .payload(&[0xabu8; 32])
            .build()
    }

    #[test]
    fn test_error_frame_addressing() {
        let datagram = offending_datagram();
        let header = Ipv4Header::parse(&datagram).unwrap();
        let frame = error_frame(
            &iface(),
            HOST_MAC,
            &header,
            icmp::TIME_EXCEEDED,
            icmp::time_exceeded::TTL_IN_TRANSIT,
        );

        let eth = Frame::parse(&frame).unwrap();
        assert_eq!(eth.dst_mac(), HOST_MAC);
        assert_eq!(eth.src_mac(), iface().mac);

        let ip = Ipv4Header::parse(eth.payload()).unwrap();
        assert_eq!(ip.src_addr(), Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(ip.dst_addr(), Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(ip.ttl(), 64);
        assert_eq!(ip.protocol(), IPPROTO_ICMP);
        assert!(ip.validate_checksum());

        let icmp_pkt = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(icmp_pkt.icmp_type(), icmp::TIME_EXCEEDED);
        assert!(icmp_pkt.validate_checksum());

        // quoted header plus first 8 payload bytes of the offender
        assert_eq!(&icmp_pkt.payload()[..20], header.header_bytes());
        assert_eq!(&icmp_pkt.payload()[20..], &[0xabu8; 8]);
    }

    #[test]
    fn test_echo_reply_frame() {
        let mut icmp_bytes = vec![icmp::ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0x00, 0x07];
        icmp_bytes.extend_from_slice(b"payload");
        let sum = crate::protocol::internet_checksum(&icmp_bytes);
        icmp_bytes[2..4].copy_from_slice(&sum.to_be_bytes());

        let datagram = Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(10, 0, 1, 2))
            .dst_addr(Ipv4Addr::new(10, 0, 1, 1))
            .protocol(IPPROTO_ICMP)
            .payload(&icmp_bytes)
            .build();
        let header = Ipv4Header::parse(&datagram).unwrap();

        let frame = echo_reply(&iface(), HOST_MAC, &header, &icmp_bytes).unwrap();
        let eth = Frame::parse(&frame).unwrap();
        let ip = Ipv4Header::parse(eth.payload()).unwrap();
        assert_eq!(ip.src_addr(), Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(ip.dst_addr(), Ipv4Addr::new(10, 0, 1, 2));

        let reply = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(reply.icmp_type(), icmp::ECHO_REPLY);
        assert_eq!(reply.identifier(), 0x1234);
        assert_eq!(reply.sequence(), 7);
        assert_eq!(reply.payload(), b"payload");
    }
}
