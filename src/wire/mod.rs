//! Wire-format parsers and assemblers.
//!
//! Parsers are constructed over an immutable byte slice and validate bounds
//! and checksums eagerly; any violation surfaces as a [`ParseError`] with a
//! human-readable reason and the packet is dropped by the caller. Assemblers
//! mirror the parsers and are the only way the stack produces wire bytes.
//! Every assembler carries a [`Tracker`](crate::tracker::Tracker) so replies
//! can be correlated with the inbound packet that caused them.

pub mod arp;
pub mod checksum;
pub mod ether;
pub mod icmp4;
pub mod icmp6;
pub mod ip4;
pub mod ip6;
pub mod tcp;
pub mod udp;

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::tracker::Tracker;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("ethernet: {0}")]
    Ether(&'static str),
    #[error("arp: {0}")]
    Arp(&'static str),
    #[error("ipv4: {0}")]
    Ip4(&'static str),
    #[error("ipv6: {0}")]
    Ip6(&'static str),
    #[error("ipv6 fragment extension: {0}")]
    Ip6ExtFrag(&'static str),
    #[error("icmpv4: {0}")]
    Icmp4(&'static str),
    #[error("icmpv6: {0}")]
    Icmp6(&'static str),
    #[error("udp: {0}")]
    Udp(&'static str),
    #[error("tcp: {0}")]
    Tcp(&'static str),
}

/// IP protocol / next-header numbers the stack dispatches on.
pub const IP_PROTO_ICMP4: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMP6: u8 = 58;
/// Opaque payload with no transport header, used by tests and diagnostics.
pub const IP_PROTO_RAW: u8 = 255;

pub const IP6_EXT_HOP_BY_HOP: u8 = 0;
pub const IP6_EXT_ROUTING: u8 = 43;
pub const IP6_EXT_FRAG: u8 = 44;
pub const IP6_EXT_DEST_OPTS: u8 = 60;

/// Transport payload handed to the IP assembly path. Checksums that cover a
/// pseudo-header are computed at emit time, once the final source address is
/// known.
pub enum IpPayload {
    Udp(udp::UdpAssembler),
    Tcp(tcp::TcpAssembler),
    Icmp4(icmp4::Icmp4Assembler),
    Icmp6(icmp6::Icmp6Assembler),
    Raw(RawAssembler),
}

impl IpPayload {
    pub fn proto(&self) -> u8 {
        match self {
            IpPayload::Udp(_) => IP_PROTO_UDP,
            IpPayload::Tcp(_) => IP_PROTO_TCP,
            IpPayload::Icmp4(_) => IP_PROTO_ICMP4,
            IpPayload::Icmp6(_) => IP_PROTO_ICMP6,
            IpPayload::Raw(_) => IP_PROTO_RAW,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IpPayload::Udp(udp) => udp.len(),
            IpPayload::Tcp(tcp) => tcp.len(),
            IpPayload::Icmp4(icmp) => icmp.len(),
            IpPayload::Icmp6(icmp) => icmp.len(),
            IpPayload::Raw(raw) => raw.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tracker(&self) -> &Tracker {
        match self {
            IpPayload::Udp(udp) => &udp.tracker,
            IpPayload::Tcp(tcp) => &tcp.tracker,
            IpPayload::Icmp4(icmp) => &icmp.tracker,
            IpPayload::Icmp6(icmp) => &icmp.tracker,
            IpPayload::Raw(raw) => &raw.tracker,
        }
    }

    /// Emit with an IPv4 pseudo-header where the protocol requires one.
    pub fn emit_v4(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        match self {
            IpPayload::Udp(udp) => udp.emit_v4(src, dst),
            IpPayload::Tcp(tcp) => tcp.emit_v4(src, dst),
            IpPayload::Icmp4(icmp) => icmp.emit(),
            // ICMPv6 never rides in IPv4; emit with a zero checksum so the
            // mistake is visible on the wire instead of panicking.
            IpPayload::Icmp6(icmp) => icmp.emit_unchecksummed(),
            IpPayload::Raw(raw) => raw.data.clone(),
        }
    }

    /// Emit with an IPv6 pseudo-header where the protocol requires one.
    pub fn emit_v6(&self, src: Ipv6Addr, dst: Ipv6Addr) -> Vec<u8> {
        match self {
            IpPayload::Udp(udp) => udp.emit_v6(src, dst),
            IpPayload::Tcp(tcp) => tcp.emit_v6(src, dst),
            IpPayload::Icmp4(icmp) => icmp.emit(),
            IpPayload::Icmp6(icmp) => icmp.emit(src, dst),
            IpPayload::Raw(raw) => raw.data.clone(),
        }
    }
}

/// Payload bytes passed through the IP layer untouched.
pub struct RawAssembler {
    pub data: Vec<u8>,
    pub tracker: Tracker,
}

impl RawAssembler {
    pub fn new(data: Vec<u8>, tracker: Tracker) -> Self {
        RawAssembler { data, tracker }
    }
}
