//! Wire-format protocol implementations

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;

use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError;

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address")
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Parse a colon- or hyphen-separated MAC address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut result = [0u8; 6];
        let mut count = 0;

        for part in s.split(sep) {
            if count == 6 || part.len() != 2 {
                return Err(ParseMacAddrError);
            }
            result[count] = u8::from_str_radix(part, 16).map_err(|_| ParseMacAddrError)?;
            count += 1;
        }

        if count != 6 {
            return Err(ParseMacAddrError);
        }
        Ok(MacAddr(result))
    }
}

/// EtherType values the dataplane classifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }
}

/// RFC 1071 internet checksum, used by both the IPv4 header checksum and
/// the ICMP message checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for chunk in data.chunks(2) {
        let word = if chunk.len() == 2 {
            u16::from_be_bytes([chunk[0], chunk[1]])
        } else {
            u16::from_be_bytes([chunk[0], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(format!("{}", mac), "00:11:22:33:44:55");
    }

    #[test]
    fn test_mac_addr_parse() {
        let mac: MacAddr = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac, MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));

        let mac: MacAddr = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(mac, MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
    }

    #[test]
    fn test_mac_addr_parse_uppercase() {
        let mac: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac, MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
    }

    #[test]
    fn test_mac_addr_parse_invalid() {
        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:gg".parse::<MacAddr>().is_err());
        assert!("001122334455".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_addr_broadcast() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(!MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]).is_broadcast());
    }

    #[test]
    fn test_ethertype_from_u16() {
        assert_eq!(EtherType::from_u16(0x0800), Some(EtherType::Ipv4));
        assert_eq!(EtherType::from_u16(0x0806), Some(EtherType::Arp));
        assert_eq!(EtherType::from_u16(0x86DD), Some(EtherType::Ipv6));
        assert_eq!(EtherType::from_u16(0x8100), None);
        assert_eq!(EtherType::from_u16(0x1234), None);
    }

    #[test]
    fn test_internet_checksum_odd_length() {
        // Must not panic on odd-length input
        let _ = internet_checksum(&[0x45, 0x00, 0x00]);
    }

    #[test]
    fn test_internet_checksum_verifies_to_zero() {
        let mut header = vec![
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00, 0x40, 0x01, 0x00, 0x00, 192, 168, 1,
            1, 192, 168, 1, 2,
        ];
        let sum = internet_checksum(&header);
        header[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&header), 0);
    }
}
