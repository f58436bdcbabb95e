//! fwdplane - forwarding-plane core of a software IP router
//!
//! Given an inbound Ethernet frame, the dataplane classifies it, resolves
//! next-hop link addresses via ARP, forwards or drops IP datagrams, and
//! synthesizes ARP/ICMP control traffic. L2/L3 protocols are implemented
//! from scratch in userspace.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
