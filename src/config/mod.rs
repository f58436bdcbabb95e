//! TOML configuration: interfaces, static routes and logging.
//!
//! ```toml
//! [log]
//! level = "debug"
//! format = "pretty"
//!
//! [[interface]]
//! name = "eth0"
//! address = "10.0.1.1"
//!
//! [[route]]
//! network = "10.0.2.0"
//! mask = "255.255.255.0"
//! interface = "eth1"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub interface: Vec<InterfaceConfig>,
    #[serde(default)]
    pub route: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub name: String,
    pub address: Ipv4Addr,
    /// Override the MAC discovered from the device
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub interface: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::Config("at least one interface is required".into()));
        }

        let mut names = HashSet::new();
        for iface in &self.interface {
            if !names.insert(iface.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate interface {}",
                    iface.name
                )));
            }
            if let Some(mac) = &iface.mac {
                mac.parse::<crate::protocol::MacAddr>().map_err(|_| {
                    Error::Config(format!("interface {}: invalid MAC {mac}", iface.name))
                })?;
            }
        }

        for route in &self.route {
            if !names.contains(route.interface.as_str()) {
                return Err(Error::Config(format!(
                    "route {}/{} references unknown interface {}",
                    route.network, route.mask, route.interface
                )));
            }
            if !is_contiguous_mask(route.mask) {
                return Err(Error::Config(format!(
                    "route {}: non-contiguous netmask {}",
                    route.network, route.mask
                )));
            }
        }
        Ok(())
    }
}

fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    // inverted mask plus one must be a power of two
    bits == 0 || (!bits).wrapping_add(1) & !bits == 0
}
