//! Per-frame processing pipeline.
//!
//! `Router::process_frame` classifies one inbound Ethernet frame and
//! returns the frames to transmit in response, tagged with their egress
//! interface. It never touches sockets; transmission belongs to the
//! caller. All mutable state lives behind a single mutex, so the router
//! itself is shared by reference.

use crate::dataplane::arp::{ArpResolver, SweepAction, WithheldFrame};
use crate::dataplane::routing::{RouteEntry, RoutingTable};
use crate::dataplane::{forwarder, icmp_synth};
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::icmp::{self, IcmpKind, IcmpPacket};
use crate::protocol::ipv4::{IpProto, Ipv4Header};
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::metrics::MetricsRegistry;
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// A router-attached network interface
#[derive(Debug, Clone)]
pub struct Iface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// Frames to transmit, tagged with their egress interface name
pub type Output = Vec<(String, Vec<u8>)>;

pub struct Router {
    interfaces: HashMap<String, Iface>,
    routes: RoutingTable,
    resolver: Mutex<ArpResolver>,
    metrics: Arc<MetricsRegistry>,
}

impl Router {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            interfaces: HashMap::new(),
            routes: RoutingTable::new(),
            resolver: Mutex::new(ArpResolver::new()),
            metrics,
        }
    }

    pub fn add_interface(&mut self, iface: Iface) {
        self.metrics.register_interface(&iface.name);
        self.interfaces.insert(iface.name.clone(), iface);
    }

    pub fn add_route(&mut self, entry: RouteEntry) -> Result<()> {
        if !self.interfaces.contains_key(&entry.interface) {
            return Err(Error::InterfaceNotFound {
                name: entry.interface,
            });
        }
        self.routes.add(entry);
        Ok(())
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    fn iface(&self, name: &str) -> Result<&Iface> {
        self.interfaces
            .get(name)
            .ok_or_else(|| Error::Fatal(format!("frame from unregistered interface {name}")))
    }

    fn egress_iface(&self, name: &str) -> Result<&Iface> {
        self.interfaces
            .get(name)
            .ok_or_else(|| Error::Fatal(format!("route points at unregistered interface {name}")))
    }

    fn resolver(&self) -> Result<std::sync::MutexGuard<'_, ArpResolver>> {
        self.resolver
            .lock()
            .map_err(|_| Error::Fatal("ARP resolver lock poisoned".into()))
    }

    /// Process one inbound frame. `Ok` covers every handled outcome,
    /// policy drops included; recoverable errors mean the frame was
    /// discarded; `Error::Fatal` means the router must be torn down.
    pub fn process_frame(&self, ingress: &str, data: &[u8]) -> Result<Output> {
        let iface = self.iface(ingress)?;
        self.metrics.record_rx(ingress, data.len());

        let frame = Frame::parse(data).map_err(|e| {
            self.metrics.parse_errors.inc();
            e
        })?;

        match EtherType::from_u16(frame.ethertype()) {
            Some(EtherType::Arp) => self.process_arp(iface, &frame),
            Some(EtherType::Ipv4) => self.process_ipv4(iface, &frame, data),
            _ => {
                trace!(ingress, ethertype = frame.ethertype(), "ignoring frame");
                Ok(Vec::new())
            }
        }
    }

    fn process_ipv4(&self, iface: &Iface, frame: &Frame<'_>, raw: &[u8]) -> Result<Output> {
        let header = Ipv4Header::parse(frame.payload()).map_err(|e| {
            self.metrics.parse_errors.inc();
            e
        })?;
        let dst = header.dst_addr();

        if dst == iface.ip {
            return self.deliver_local(iface, frame.src_mac(), &header);
        }

        // addressed to another of our interfaces: reachable only by
        // routing through us, which we refuse
        if self.interfaces.values().any(|other| other.ip == dst) {
            debug!(%dst, ingress = %iface.name, "datagram for non-ingress router address");
            return self.icmp_error(
                iface,
                frame.src_mac(),
                &header,
                icmp::DEST_UNREACHABLE,
                icmp::unreachable::HOST,
            );
        }

        let route = match self.routes.lookup(dst) {
            Some(route) => route,
            None => {
                debug!(%dst, "no route");
                return self.icmp_error(
                    iface,
                    frame.src_mac(),
                    &header,
                    icmp::DEST_UNREACHABLE,
                    icmp::unreachable::NET,
                );
            }
        };
        let egress = self.egress_iface(&route.interface)?;
        let next_hop = route.gateway.unwrap_or(dst);

        let mut resolver = self.resolver()?;
        if let Some(mac) = resolver.lookup_cache(next_hop) {
            drop(resolver);

            if header.ttl() <= 1 {
                return self.icmp_error(
                    iface,
                    frame.src_mac(),
                    &header,
                    icmp::TIME_EXCEEDED,
                    icmp::time_exceeded::TTL_IN_TRANSIT,
                );
            }

            let out = forwarder::forward(frame.payload(), egress.mac, mac)?;
            self.metrics.packets_forwarded.inc();
            self.metrics.record_tx(&egress.name, out.len());
            return Ok(vec![(egress.name.clone(), out)]);
        }

        // unresolved next hop: withhold the whole frame and make sure
        // exactly one request is in flight
        let withheld = WithheldFrame {
            data: raw.to_vec(),
            ingress: iface.name.clone(),
        };
        let request = resolver.request_or_enqueue(
            next_hop,
            &egress.name,
            egress.mac,
            egress.ip,
            withheld,
            Instant::now(),
        );
        drop(resolver);
        self.metrics.frames_withheld.inc();

        match request {
            Some(packet) => {
                debug!(%next_hop, egress = %egress.name, "sending ARP request");
                self.metrics.arp_requests_sent.inc();
                let out = arp_frame(MacAddr::BROADCAST, egress.mac, &packet);
                self.metrics.record_tx(&egress.name, out.len());
                Ok(vec![(egress.name.clone(), out)])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Datagram addressed to the ingress interface itself.
    fn deliver_local(
        &self,
        iface: &Iface,
        src_mac: MacAddr,
        header: &Ipv4Header<'_>,
    ) -> Result<Output> {
        match IpProto::from_u8(header.protocol()) {
            Some(IpProto::Tcp) | Some(IpProto::Udp) => {
                return self.icmp_error(
                    iface,
                    src_mac,
                    header,
                    icmp::DEST_UNREACHABLE,
                    icmp::unreachable::PORT,
                );
            }
            _ => {}
        }

        if header.ttl() <= 1 {
            return self.icmp_error(
                iface,
                src_mac,
                header,
                icmp::TIME_EXCEEDED,
                icmp::time_exceeded::TTL_IN_TRANSIT,
            );
        }

        if IpProto::from_u8(header.protocol()) == Some(IpProto::Icmp) {
            let message = IcmpPacket::parse(header.payload()).map_err(|e| {
                self.metrics.parse_errors.inc();
                e
            })?;
            if message.kind() == IcmpKind::EchoRequest {
                let out = icmp_synth::echo_reply(iface, src_mac, header, message.as_bytes())?;
                self.metrics.icmp_echo_replies.inc();
                self.metrics.record_tx(&iface.name, out.len());
                return Ok(vec![(iface.name.clone(), out)]);
            }
            // other ICMP to us is consumed without an answer
            trace!(kind = ?message.kind(), "consuming ICMP message");
            return Ok(Vec::new());
        }

        self.icmp_error(
            iface,
            src_mac,
            header,
            icmp::DEST_UNREACHABLE,
            icmp::unreachable::PROTOCOL,
        )
    }

    fn process_arp(&self, iface: &Iface, frame: &Frame<'_>) -> Result<Output> {
        let packet = ArpPacket::parse(frame.payload()).map_err(|e| {
            self.metrics.parse_errors.inc();
            e
        })?;

        // only ARP aimed at the ingress interface's address concerns us
        if packet.target_ip != iface.ip {
            trace!(target = %packet.target_ip, ingress = %iface.name, "ignoring ARP");
            return Ok(Vec::new());
        }

        match packet.operation {
            ArpOp::Request => {
                let mut resolver = self.resolver()?;
                resolver.learn(packet.sender_ip, packet.sender_mac, Instant::now());
                drop(resolver);

                let reply = ArpPacket::reply(&packet, iface.mac, iface.ip);
                let out = arp_frame(packet.sender_mac, iface.mac, &reply);
                self.metrics.arp_replies_sent.inc();
                self.metrics.record_tx(&iface.name, out.len());
                Ok(vec![(iface.name.clone(), out)])
            }
            ArpOp::Reply => {
                let drained = self
                    .resolver()?
                    .on_reply(packet.sender_ip, packet.sender_mac, Instant::now());
                self.drain(iface, packet.sender_mac, drained)
            }
        }
    }

    /// Release frames that were waiting on a resolution. TTL is checked
    /// again per frame; time spent in the queue may have been its last.
    fn drain(
        &self,
        egress: &Iface,
        next_hop_mac: MacAddr,
        frames: Vec<WithheldFrame>,
    ) -> Result<Output> {
        let mut output = Vec::with_capacity(frames.len());

        for withheld in frames {
            // withheld frames were parsed on arrival, so failure here is
            // state corruption rather than peer misbehavior
            let frame = Frame::parse(&withheld.data)
                .map_err(|e| Error::Fatal(format!("corrupt withheld frame: {e}")))?;
            let header = Ipv4Header::parse(frame.payload())
                .map_err(|e| Error::Fatal(format!("corrupt withheld datagram: {e}")))?;

            if header.ttl() <= 1 {
                let ingress = self.iface(&withheld.ingress)?;
                let out = icmp_synth::error_frame(
                    ingress,
                    frame.src_mac(),
                    &header,
                    icmp::TIME_EXCEEDED,
                    icmp::time_exceeded::TTL_IN_TRANSIT,
                );
                self.metrics.icmp_errors_sent.inc();
                self.metrics.record_tx(&ingress.name, out.len());
                output.push((ingress.name.clone(), out));
                continue;
            }

            let out = forwarder::forward(frame.payload(), egress.mac, next_hop_mac)?;
            self.metrics.packets_forwarded.inc();
            self.metrics.record_tx(&egress.name, out.len());
            output.push((egress.name.clone(), out));
        }

        Ok(output)
    }

    fn icmp_error(
        &self,
        iface: &Iface,
        orig_src_mac: MacAddr,
        header: &Ipv4Header<'_>,
        icmp_type: u8,
        code: u8,
    ) -> Result<Output> {
        let out = icmp_synth::error_frame(iface, orig_src_mac, header, icmp_type, code);
        self.metrics.icmp_errors_sent.inc();
        self.metrics.record_tx(&iface.name, out.len());
        Ok(vec![(iface.name.clone(), out)])
    }

    /// Periodic upkeep: retransmit unanswered ARP requests, abandon
    /// exhausted resolutions (answering each withheld frame with an ICMP
    /// host-unreachable error) and evict stale cache entries.
    pub fn run_maintenance(&self) -> Result<Output> {
        self.maintain_at(Instant::now())
    }

    pub fn maintain_at(&self, now: Instant) -> Result<Output> {
        let actions = {
            let mut resolver = self.resolver()?;
            resolver.expire_cache(now);
            resolver.sweep(now)
        };

        let mut output = Vec::new();
        for action in actions {
            match action {
                SweepAction::Retransmit { request, egress } => {
                    let iface = self.egress_iface(&egress)?;
                    self.metrics.arp_requests_sent.inc();
                    let out = arp_frame(MacAddr::BROADCAST, iface.mac, &request);
                    self.metrics.record_tx(&iface.name, out.len());
                    output.push((iface.name.clone(), out));
                }
                SweepAction::Expired { target, frames } => {
                    warn!(%target, frames = frames.len(), "ARP resolution failed");
                    for withheld in frames {
                        self.metrics.withheld_expired.inc();
                        let frame = Frame::parse(&withheld.data)
                            .map_err(|e| Error::Fatal(format!("corrupt withheld frame: {e}")))?;
                        let header = Ipv4Header::parse(frame.payload())
                            .map_err(|e| Error::Fatal(format!("corrupt withheld datagram: {e}")))?;
                        let ingress = self.iface(&withheld.ingress)?;
                        let out = icmp_synth::error_frame(
                            ingress,
                            frame.src_mac(),
                            &header,
                            icmp::DEST_UNREACHABLE,
                            icmp::unreachable::HOST,
                        );
                        self.metrics.icmp_errors_sent.inc();
                        self.metrics.record_tx(&ingress.name, out.len());
                        output.push((ingress.name.clone(), out));
                    }
                }
            }
        }
        Ok(output)
    }
}

fn arp_frame(dst_mac: MacAddr, src_mac: MacAddr, packet: &ArpPacket) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(dst_mac)
        .src_mac(src_mac)
        .ethertype(EtherType::Arp as u16)
        .payload(&packet.to_bytes())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ipv4::Ipv4Builder;

    const HOST_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x09]);

    fn router() -> Router {
        let mut router = Router::new(Arc::new(MetricsRegistry::new()));
        router.add_interface(Iface {
            name: "eth0".to_string(),
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ip: Ipv4Addr::new(10, 0, 1, 1),
        });
        router.add_interface(Iface {
            name: "eth1".to_string(),
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]),
            ip: Ipv4Addr::new(10, 0, 2, 1),
        });
        router
            .add_route(RouteEntry {
                network: Ipv4Addr::new(10, 0, 2, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: None,
                interface: "eth1".to_string(),
            })
            .unwrap();
        router
    }

    fn udp_frame(dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
        let datagram = Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(10, 0, 1, 2))
            .dst_addr(dst)
            .ttl(ttl)
            .protocol(IpProto::Udp as u8)
            .payload(&[0u8; 16])
            .build();
        FrameBuilder::new()
            .dst_mac(MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]))
            .src_mac(HOST_MAC)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&datagram)
            .build()
    }

    #[test]
    fn test_unknown_ingress_is_fatal() {
        let router = router();
        let err = router
            .process_frame("eth9", &udp_frame(Ipv4Addr::new(10, 0, 2, 9), 64))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_frame_is_recoverable() {
        let router = router();
        let err = router.process_frame("eth0", &[0u8; 10]).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_route_to_missing_interface_rejected() {
        let mut router = router();
        let err = router
            .add_route(RouteEntry {
                network: Ipv4Addr::new(10, 0, 3, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: None,
                interface: "eth9".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InterfaceNotFound { .. }));
    }

    #[test]
    fn test_cache_miss_emits_single_request() {
        let router = router();

        let out = router
            .process_frame("eth0", &udp_frame(Ipv4Addr::new(10, 0, 2, 9), 64))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "eth1");

        let frame = Frame::parse(&out[0].1).unwrap();
        assert!(frame.dst_mac().is_broadcast());
        assert_eq!(frame.ethertype(), EtherType::Arp as u16);
        let request = ArpPacket::parse(frame.payload()).unwrap();
        assert_eq!(request.operation, ArpOp::Request);
        assert_eq!(request.target_ip, Ipv4Addr::new(10, 0, 2, 9));

        // second frame for the same next hop is withheld silently
        let out = router
            .process_frame("eth0", &udp_frame(Ipv4Addr::new(10, 0, 2, 9), 64))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_udp_to_router_gets_port_unreachable() {
        let router = router();
        let out = router
            .process_frame("eth0", &udp_frame(Ipv4Addr::new(10, 0, 1, 1), 64))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "eth0");

        let frame = Frame::parse(&out[0].1).unwrap();
        assert_eq!(frame.dst_mac(), HOST_MAC);
        let ip = Ipv4Header::parse(frame.payload()).unwrap();
        let message = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(
            message.kind(),
            IcmpKind::DestUnreachable(icmp::unreachable::PORT)
        );
    }

    #[test]
    fn test_other_interface_address_gets_host_unreachable() {
        let router = router();
        let out = router
            .process_frame("eth0", &udp_frame(Ipv4Addr::new(10, 0, 2, 1), 64))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "eth0");

        let frame = Frame::parse(&out[0].1).unwrap();
        let ip = Ipv4Header::parse(frame.payload()).unwrap();
        let message = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(
            message.kind(),
            IcmpKind::DestUnreachable(icmp::unreachable::HOST)
        );
    }

    #[test]
    fn test_no_route_gets_net_unreachable() {
        let router = router();
        let out = router
            .process_frame("eth0", &udp_frame(Ipv4Addr::new(192, 168, 50, 1), 64))
            .unwrap();
        assert_eq!(out.len(), 1);

        let frame = Frame::parse(&out[0].1).unwrap();
        let ip = Ipv4Header::parse(frame.payload()).unwrap();
        let message = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(
            message.kind(),
            IcmpKind::DestUnreachable(icmp::unreachable::NET)
        );
    }

    #[test]
    fn test_ipv6_frame_dropped() {
        let router = router();
        let frame = FrameBuilder::new()
            .dst_mac(MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]))
            .src_mac(HOST_MAC)
            .ethertype(EtherType::Ipv6 as u16)
            .payload(&[0u8; 40])
            .build();
        assert!(router.process_frame("eth0", &frame).unwrap().is_empty());
    }
}
