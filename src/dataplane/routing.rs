//! Static routing table with longest-prefix-match lookup

use std::net::Ipv4Addr;

/// A single static route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub interface: String,
}

impl RouteEntry {
    fn matches(&self, dst: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        (u32::from(dst) & mask) == (u32::from(self.network) & mask)
    }
}

/// Ordered list of routes; lookup picks the longest matching prefix and,
/// among equal-length prefixes, the earliest-inserted one.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in &self.entries {
            if !entry.matches(dst) {
                continue;
            }
            // strictly-greater keeps the earliest entry on mask ties
            match best {
                Some(current) if u32::from(entry.mask) <= u32::from(current.mask) => {}
                _ => best = Some(entry),
            }
        }
        best
    }
}
