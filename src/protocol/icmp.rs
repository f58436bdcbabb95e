//! ICMP message parsing and synthesis (RFC 792)

use super::internet_checksum;
use crate::{Error, Result};

/// Minimum ICMP message size (type, code, checksum, rest-of-header)
pub const HEADER_SIZE: usize = 8;

pub const ECHO_REPLY: u8 = 0;
pub const DEST_UNREACHABLE: u8 = 3;
pub const ECHO_REQUEST: u8 = 8;
pub const TIME_EXCEEDED: u8 = 11;

/// Destination-unreachable codes
pub mod unreachable {
    pub const NET: u8 = 0;
    pub const HOST: u8 = 1;
    pub const PROTOCOL: u8 = 2;
    pub const PORT: u8 = 3;
}

/// Time-exceeded codes
pub mod time_exceeded {
    pub const TTL_IN_TRANSIT: u8 = 0;
}

/// How many bytes of the offending datagram's payload an error message
/// carries, after the quoted IP header.
const ERROR_PAYLOAD_QUOTE: usize = 8;

/// Message classification after parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoReply,
    EchoRequest,
    DestUnreachable(u8),
    TimeExceeded(u8),
    Other { icmp_type: u8, code: u8 },
}

/// Parsed ICMP message (zero-copy reference)
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("ICMP message too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Identifier field of an echo message
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Sequence-number field of an echo message
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn kind(&self) -> IcmpKind {
        match (self.icmp_type(), self.code()) {
            (ECHO_REPLY, 0) => IcmpKind::EchoReply,
            (ECHO_REQUEST, 0) => IcmpKind::EchoRequest,
            (DEST_UNREACHABLE, code) => IcmpKind::DestUnreachable(code),
            (TIME_EXCEEDED, code) => IcmpKind::TimeExceeded(code),
            (icmp_type, code) => IcmpKind::Other { icmp_type, code },
        }
    }

    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.buffer) == 0
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }
}

/// Build an echo reply mirroring `request` (identifier, sequence and
/// payload are copied verbatim).
pub fn build_echo_reply(request: &[u8]) -> Result<Vec<u8>> {
    let req = IcmpPacket::parse(request)?;
    if req.kind() != IcmpKind::EchoRequest {
        return Err(Error::InvalidPacket("not an echo request".into()));
    }

    let mut message = request.to_vec();
    message[0] = ECHO_REPLY;
    message[1] = 0;
    message[2] = 0;
    message[3] = 0;
    let sum = internet_checksum(&message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    Ok(message)
}

/// Build an ICMP error message (destination unreachable or time exceeded)
/// quoting the offending datagram's IP header plus its first payload bytes.
pub fn build_error_message(
    icmp_type: u8,
    code: u8,
    original_header: &[u8],
    original_payload: &[u8],
) -> Vec<u8> {
    let quote = original_payload.len().min(ERROR_PAYLOAD_QUOTE);
    let mut message = Vec::with_capacity(HEADER_SIZE + original_header.len() + quote);

    message.push(icmp_type);
    message.push(code);
    message.extend_from_slice(&[0, 0]); // checksum placeholder
    message.extend_from_slice(&[0, 0, 0, 0]); // unused
    message.extend_from_slice(original_header);
    message.extend_from_slice(&original_payload[..quote]);

    let sum = internet_checksum(&message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    message
}
