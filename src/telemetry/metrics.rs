//! Lock-free packet counters, global and per interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Monotonic event counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface traffic counters
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
}

/// Dataplane-wide counter registry. Interface entries are registered
/// once at startup; recording against an unknown name is a no-op.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    pub frames_received: Counter,
    pub parse_errors: Counter,
    pub packets_forwarded: Counter,
    pub arp_requests_sent: Counter,
    pub arp_replies_sent: Counter,
    pub icmp_echo_replies: Counter,
    pub icmp_errors_sent: Counter,
    pub frames_withheld: Counter,
    pub withheld_expired: Counter,
    interfaces: RwLock<HashMap<String, Arc<InterfaceStats>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_interface(&self, name: &str) {
        if let Ok(mut interfaces) = self.interfaces.write() {
            interfaces
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InterfaceStats::default()));
        }
    }

    pub fn interface(&self, name: &str) -> Option<Arc<InterfaceStats>> {
        self.interfaces.read().ok()?.get(name).cloned()
    }

    pub fn record_rx(&self, name: &str, bytes: usize) {
        self.frames_received.inc();
        if let Some(stats) = self.interface(name) {
            stats.rx_packets.inc();
            stats.rx_bytes.add(bytes as u64);
        }
    }

    pub fn record_tx(&self, name: &str, bytes: usize) {
        if let Some(stats) = self.interface(name) {
            stats.tx_packets.inc();
            stats.tx_bytes.add(bytes as u64);
        }
    }
}
