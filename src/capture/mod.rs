//! Raw packet I/O. AF_PACKET is the only backend; it needs no special
//! kernel setup beyond CAP_NET_RAW.

mod af_packet;

pub use af_packet::AfPacketSocket;
