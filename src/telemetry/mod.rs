//! Operational visibility: structured logging setup and packet counters.

pub mod logging;
pub mod metrics;
