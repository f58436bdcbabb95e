//! Forwarding-plane logic: routing, ARP resolution, ICMP synthesis and
//! the per-frame processing pipeline.

pub mod arp;
pub mod forwarder;
pub mod icmp_synth;
pub mod router;
pub mod routing;

pub use arp::ArpResolver;
pub use router::{Iface, Router};
pub use routing::{RouteEntry, RoutingTable};
