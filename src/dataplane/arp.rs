//! ARP resolution state: the neighbor cache and the queue of frames
//! withheld while a resolution is outstanding.

use crate::protocol::arp::ArpPacket;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Interval between retransmissions of an unanswered request
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Total sends (initial plus retries) before a resolution is abandoned
pub const MAX_ATTEMPTS: u32 = 5;
/// How long a learned mapping stays valid
pub const CACHE_LIFETIME: Duration = Duration::from_secs(120);

/// A frame held back until its next hop resolves. Keeps the full
/// Ethernet frame plus the interface it arrived on, so an ICMP error
/// can still be routed back if resolution fails.
#[derive(Debug, Clone)]
pub struct WithheldFrame {
    pub data: Vec<u8>,
    pub ingress: String,
}

#[derive(Debug)]
struct CacheEntry {
    mac: MacAddr,
    learned_at: Instant,
}

#[derive(Debug)]
struct PendingRequest {
    /// Interface the request goes out of
    egress: String,
    /// Sends so far, the initial request included
    attempts: u32,
    last_sent: Instant,
    /// The request packet, kept for retransmission
    request: ArpPacket,
    /// FIFO of frames waiting on this resolution
    frames: Vec<WithheldFrame>,
}

/// Outcome of a maintenance sweep for one unresolved address
#[derive(Debug)]
pub enum SweepAction {
    /// Retransmit the request out `egress`
    Retransmit { request: ArpPacket, egress: String },
    /// Resolution abandoned; the caller answers each frame with an
    /// ICMP host-unreachable error
    Expired {
        target: Ipv4Addr,
        frames: Vec<WithheldFrame>,
    },
}

/// Neighbor cache plus pending-resolution bookkeeping. All mutation goes
/// through `&mut self`, so a caller holding this behind a mutex gets
/// atomic check-and-update semantics.
#[derive(Debug, Default)]
pub struct ArpResolver {
    cache: HashMap<Ipv4Addr, CacheEntry>,
    pending: HashMap<Ipv4Addr, PendingRequest>,
}

impl ArpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_cache(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.cache.get(&ip).map(|entry| entry.mac)
    }

    /// Insert or refresh a mapping.
    pub fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) {
        debug!(%ip, %mac, "learned ARP mapping");
        self.cache.insert(ip, CacheEntry { mac, learned_at: now });
    }

    /// Withhold `frame` until `target` resolves. Returns the request to
    /// transmit if this is the first frame waiting on `target`; `None`
    /// means a request is already outstanding and only the queue grew.
    pub fn request_or_enqueue(
        &mut self,
        target: Ipv4Addr,
        egress: &str,
        egress_mac: MacAddr,
        egress_ip: Ipv4Addr,
        frame: WithheldFrame,
        now: Instant,
    ) -> Option<ArpPacket> {
        if let Some(pending) = self.pending.get_mut(&target) {
            pending.frames.push(frame);
            return None;
        }

        let request = ArpPacket::request(egress_mac, egress_ip, target);
        self.pending.insert(
            target,
            PendingRequest {
                egress: egress.to_string(),
                attempts: 1,
                last_sent: now,
                request,
                frames: vec![frame],
            },
        );
        Some(request)
    }

    /// Record a resolved mapping and take every frame waiting on it,
    /// oldest first. A reply with no pending request still populates
    /// the cache and returns an empty queue.
    pub fn on_reply(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> Vec<WithheldFrame> {
        self.learn(ip, mac, now);
        match self.pending.remove(&ip) {
            Some(pending) => pending.frames,
            None => Vec::new(),
        }
    }

    /// Walk pending resolutions: retransmit those due for another
    /// attempt, abandon those out of attempts.
    pub fn sweep(&mut self, now: Instant) -> Vec<SweepAction> {
        let mut actions = Vec::new();
        let mut expired = Vec::new();

        for (&target, pending) in self.pending.iter_mut() {
            if now.duration_since(pending.last_sent) < RETRY_INTERVAL {
                continue;
            }
            if pending.attempts >= MAX_ATTEMPTS {
                expired.push(target);
                continue;
            }
            pending.attempts += 1;
            pending.last_sent = now;
            actions.push(SweepAction::Retransmit {
                request: pending.request,
                egress: pending.egress.clone(),
            });
        }

        for target in expired {
            if let Some(pending) = self.pending.remove(&target) {
                debug!(%target, frames = pending.frames.len(), "ARP resolution abandoned");
                actions.push(SweepAction::Expired {
                    target,
                    frames: pending.frames,
                });
            }
        }

        actions
    }

    /// Evict cache entries past their lifetime.
    pub fn expire_cache(&mut self, now: Instant) {
        self.cache
            .retain(|_, entry| now.duration_since(entry.learned_at) < CACHE_LIFETIME);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const PEER_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

    fn target() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 2, 9)
    }

    fn frame(tag: u8) -> WithheldFrame {
        WithheldFrame {
            data: vec![tag; 64],
            ingress: "eth0".to_string(),
        }
    }

    fn enqueue(resolver: &mut ArpResolver, tag: u8, now: Instant) -> Option<ArpPacket> {
        resolver.request_or_enqueue(
            target(),
            "eth1",
            MAC,
            Ipv4Addr::new(10, 0, 2, 1),
            frame(tag),
            now,
        )
    }

    #[test]
    fn test_single_request_per_target() {
        let mut resolver = ArpResolver::new();
        let now = Instant::now();

        let first = enqueue(&mut resolver, 1, now);
        assert!(first.is_some());
        assert_eq!(first.unwrap().target_ip, target());

        // second frame for the same target only queues
        assert!(enqueue(&mut resolver, 2, now).is_none());
        assert_eq!(resolver.pending_count(), 1);
    }

    #[test]
    fn test_reply_drains_fifo() {
        let mut resolver = ArpResolver::new();
        let now = Instant::now();

        enqueue(&mut resolver, 1, now);
        enqueue(&mut resolver, 2, now);
        enqueue(&mut resolver, 3, now);

        let drained = resolver.on_reply(target(), PEER_MAC, now);
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].data[0], 1);
        assert_eq!(drained[1].data[0], 2);
        assert_eq!(drained[2].data[0], 3);

        assert_eq!(resolver.lookup_cache(target()), Some(PEER_MAC));
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_reply_is_harmless() {
        let mut resolver = ArpResolver::new();
        let now = Instant::now();

        enqueue(&mut resolver, 1, now);
        assert_eq!(resolver.on_reply(target(), PEER_MAC, now).len(), 1);
        assert!(resolver.on_reply(target(), PEER_MAC, now).is_empty());
    }

    #[test]
    fn test_sweep_retransmits_then_expires() {
        let mut resolver = ArpResolver::new();
        let t0 = Instant::now();

        enqueue(&mut resolver, 1, t0);
        enqueue(&mut resolver, 2, t0);

        // attempts 2 through 5
        for i in 1..=4u64 {
            let actions = resolver.sweep(t0 + Duration::from_secs(i));
            assert_eq!(actions.len(), 1);
            assert!(matches!(actions[0], SweepAction::Retransmit { .. }));
        }

        // fifth sweep abandons the resolution
        let actions = resolver.sweep(t0 + Duration::from_secs(5));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            SweepAction::Expired { target: t, frames } => {
                assert_eq!(*t, target());
                assert_eq!(frames.len(), 2);
            }
            other => panic!("expected expiry, got {other:?}"),
        }
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_sweep_respects_retry_interval() {
        let mut resolver = ArpResolver::new();
        let t0 = Instant::now();

        enqueue(&mut resolver, 1, t0);
        assert!(resolver.sweep(t0 + Duration::from_millis(500)).is_empty());
    }

    #[test]
    fn test_cache_expiry() {
        let mut resolver = ArpResolver::new();
        let t0 = Instant::now();

        resolver.learn(target(), PEER_MAC, t0);
        resolver.expire_cache(t0 + Duration::from_secs(119));
        assert_eq!(resolver.lookup_cache(target()), Some(PEER_MAC));

        resolver.expire_cache(t0 + CACHE_LIFETIME);
        assert_eq!(resolver.lookup_cache(target()), None);
    }
}
