//! ICMPv6 (RFC 4443) and Neighbor Discovery (RFC 4861) messages with their
//! option TLVs. Checksums cover the IPv6 pseudo-header, so parsing and
//! assembly both need the enclosing source and destination addresses.

use std::net::Ipv6Addr;

use smallvec::SmallVec;

use crate::addr::MacAddr;
use crate::tracker::Tracker;

use super::{checksum, ParseError};

pub const ICMP6_HEADER_LEN: usize = 4;

pub const ICMP6_UNREACHABLE: u8 = 1;
pub const ICMP6_PACKET_TOO_BIG: u8 = 2;
pub const ICMP6_ECHO_REQUEST: u8 = 128;
pub const ICMP6_ECHO_REPLY: u8 = 129;
pub const ICMP6_ND_ROUTER_SOLICITATION: u8 = 133;
pub const ICMP6_ND_ROUTER_ADVERTISEMENT: u8 = 134;
pub const ICMP6_ND_NEIGHBOR_SOLICITATION: u8 = 135;
pub const ICMP6_ND_NEIGHBOR_ADVERTISEMENT: u8 = 136;
pub const ICMP6_ND_REDIRECT: u8 = 137;

pub const ICMP6_UNREACHABLE_PORT: u8 = 4;

const ND_OPT_SLLA: u8 = 1;
const ND_OPT_TLLA: u8 = 2;
const ND_OPT_PREFIX_INFO: u8 = 3;
const ND_OPT_MTU: u8 = 5;

/// Neighbor Discovery option TLV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NdOption {
    SourceLinkLayerAddress(MacAddr),
    TargetLinkLayerAddress(MacAddr),
    PrefixInfo {
        prefix_len: u8,
        flag_l: bool,
        flag_a: bool,
        valid_lifetime: u32,
        preferred_lifetime: u32,
        prefix: Ipv6Addr,
    },
    Mtu(u32),
    Unknown {
        kind: u8,
    },
}

pub type NdOptions = SmallVec<[NdOption; 2]>;

fn parse_nd_options(mut bytes: &[u8]) -> Result<NdOptions, ParseError> {
    let mut options = NdOptions::new();
    while !bytes.is_empty() {
        if bytes.len() < 2 {
            return Err(ParseError::Icmp6("nd option truncated"));
        }
        let kind = bytes[0];
        let len = usize::from(bytes[1]) * 8;
        if len == 0 {
            return Err(ParseError::Icmp6("nd option with zero length"));
        }
        if bytes.len() < len {
            return Err(ParseError::Icmp6("nd option length exceeds message"));
        }
        let body = &bytes[2..len];
        let option = match kind {
            ND_OPT_SLLA | ND_OPT_TLLA => {
                if body.len() != 6 {
                    return Err(ParseError::Icmp6("link-layer option not 6 bytes"));
                }
                let mut octets = [0u8; 6];
                octets.copy_from_slice(body);
                if kind == ND_OPT_SLLA {
                    NdOption::SourceLinkLayerAddress(MacAddr(octets))
                } else {
                    NdOption::TargetLinkLayerAddress(MacAddr(octets))
                }
            }
            ND_OPT_PREFIX_INFO => {
                if body.len() != 30 {
                    return Err(ParseError::Icmp6("prefix info option malformed"));
                }
                let mut prefix = [0u8; 16];
                prefix.copy_from_slice(&body[14..30]);
                NdOption::PrefixInfo {
                    prefix_len: body[0],
                    flag_l: body[1] & 0x80 != 0,
                    flag_a: body[1] & 0x40 != 0,
                    valid_lifetime: u32::from_be_bytes([body[2], body[3], body[4], body[5]]),
                    preferred_lifetime: u32::from_be_bytes([body[6], body[7], body[8], body[9]]),
                    prefix: Ipv6Addr::from(prefix),
                }
            }
            ND_OPT_MTU => {
                if body.len() != 6 {
                    return Err(ParseError::Icmp6("mtu option malformed"));
                }
                NdOption::Mtu(u32::from_be_bytes([body[2], body[3], body[4], body[5]]))
            }
            _ => NdOption::Unknown { kind },
        };
        options.push(option);
        bytes = &bytes[len..];
    }
    Ok(options)
}

fn emit_nd_options(options: &[NdOption], out: &mut Vec<u8>) {
    for option in options {
        match option {
            NdOption::SourceLinkLayerAddress(mac) => {
                out.push(ND_OPT_SLLA);
                out.push(1);
                out.extend_from_slice(&mac.octets());
            }
            NdOption::TargetLinkLayerAddress(mac) => {
                out.push(ND_OPT_TLLA);
                out.push(1);
                out.extend_from_slice(&mac.octets());
            }
            NdOption::PrefixInfo {
                prefix_len,
                flag_l,
                flag_a,
                valid_lifetime,
                preferred_lifetime,
                prefix,
            } => {
                out.push(ND_OPT_PREFIX_INFO);
                out.push(4);
                out.push(*prefix_len);
                let mut flags = 0u8;
                if *flag_l {
                    flags |= 0x80;
                }
                if *flag_a {
                    flags |= 0x40;
                }
                out.push(flags);
                out.extend_from_slice(&valid_lifetime.to_be_bytes());
                out.extend_from_slice(&preferred_lifetime.to_be_bytes());
                out.extend_from_slice(&[0u8; 4]); // reserved
                out.extend_from_slice(&prefix.octets());
            }
            NdOption::Mtu(mtu) => {
                out.push(ND_OPT_MTU);
                out.push(1);
                out.extend_from_slice(&[0u8; 2]); // reserved
                out.extend_from_slice(&mtu.to_be_bytes());
            }
            NdOption::Unknown { .. } => {}
        }
    }
}

fn nd_options_len(options: &[NdOption]) -> usize {
    options
        .iter()
        .map(|option| match option {
            NdOption::SourceLinkLayerAddress(_) | NdOption::TargetLinkLayerAddress(_) => 8,
            NdOption::PrefixInfo { .. } => 32,
            NdOption::Mtu(_) => 8,
            NdOption::Unknown { .. } => 0,
        })
        .sum()
}

#[derive(Debug, PartialEq, Eq)]
pub enum Icmp6Message<'a> {
    EchoRequest {
        id: u16,
        seq: u16,
        data: &'a [u8],
    },
    EchoReply {
        id: u16,
        seq: u16,
        data: &'a [u8],
    },
    /// `data` is the quoted original datagram.
    Unreachable {
        code: u8,
        data: &'a [u8],
    },
    RouterSolicitation {
        options: NdOptions,
    },
    RouterAdvertisement {
        hop: u8,
        flag_m: bool,
        flag_o: bool,
        router_lifetime: u16,
        options: NdOptions,
    },
    NeighborSolicitation {
        target: Ipv6Addr,
        options: NdOptions,
    },
    NeighborAdvertisement {
        flag_r: bool,
        flag_s: bool,
        flag_o: bool,
        target: Ipv6Addr,
        options: NdOptions,
    },
    Redirect {
        target: Ipv6Addr,
        destination: Ipv6Addr,
        options: NdOptions,
    },
    Other {
        kind: u8,
        code: u8,
    },
}

#[derive(Debug)]
pub struct Icmp6Packet<'a> {
    message: Icmp6Message<'a>,
}

fn read_addr(bytes: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes[..16]);
    Ipv6Addr::from(octets)
}

impl<'a> Icmp6Packet<'a> {
    pub fn parse(bytes: &'a [u8], src: Ipv6Addr, dst: Ipv6Addr) -> Result<Self, ParseError> {
        if bytes.len() < ICMP6_HEADER_LEN {
            return Err(ParseError::Icmp6("message shorter than header"));
        }
        if checksum::icmpv6(src, dst, bytes) != 0 {
            return Err(ParseError::Icmp6("checksum mismatch"));
        }
        let kind = bytes[0];
        let code = bytes[1];
        let message = match kind {
            ICMP6_ECHO_REQUEST | ICMP6_ECHO_REPLY => {
                if bytes.len() < 8 {
                    return Err(ParseError::Icmp6("echo message truncated"));
                }
                let id = u16::from_be_bytes([bytes[4], bytes[5]]);
                let seq = u16::from_be_bytes([bytes[6], bytes[7]]);
                let data = &bytes[8..];
                if kind == ICMP6_ECHO_REQUEST {
                    Icmp6Message::EchoRequest { id, seq, data }
                } else {
                    Icmp6Message::EchoReply { id, seq, data }
                }
            }
            ICMP6_UNREACHABLE => {
                if bytes.len() < 8 {
                    return Err(ParseError::Icmp6("unreachable message truncated"));
                }
                Icmp6Message::Unreachable {
                    code,
                    data: &bytes[8..],
                }
            }
            ICMP6_ND_ROUTER_SOLICITATION => {
                if bytes.len() < 8 {
                    return Err(ParseError::Icmp6("router solicitation truncated"));
                }
                Icmp6Message::RouterSolicitation {
                    options: parse_nd_options(&bytes[8..])?,
                }
            }
            ICMP6_ND_ROUTER_ADVERTISEMENT => {
                if bytes.len() < 16 {
                    return Err(ParseError::Icmp6("router advertisement truncated"));
                }
                Icmp6Message::RouterAdvertisement {
                    hop: bytes[4],
                    flag_m: bytes[5] & 0x80 != 0,
                    flag_o: bytes[5] & 0x40 != 0,
                    router_lifetime: u16::from_be_bytes([bytes[6], bytes[7]]),
                    options: parse_nd_options(&bytes[16..])?,
                }
            }
            ICMP6_ND_NEIGHBOR_SOLICITATION => {
                if bytes.len() < 24 {
                    return Err(ParseError::Icmp6("neighbor solicitation truncated"));
                }
                Icmp6Message::NeighborSolicitation {
                    target: read_addr(&bytes[8..24]),
                    options: parse_nd_options(&bytes[24..])?,
                }
            }
            ICMP6_ND_NEIGHBOR_ADVERTISEMENT => {
                if bytes.len() < 24 {
                    return Err(ParseError::Icmp6("neighbor advertisement truncated"));
                }
                Icmp6Message::NeighborAdvertisement {
                    flag_r: bytes[4] & 0x80 != 0,
                    flag_s: bytes[4] & 0x40 != 0,
                    flag_o: bytes[4] & 0x20 != 0,
                    target: read_addr(&bytes[8..24]),
                    options: parse_nd_options(&bytes[24..])?,
                }
            }
            ICMP6_ND_REDIRECT => {
                if bytes.len() < 40 {
                    return Err(ParseError::Icmp6("redirect truncated"));
                }
                Icmp6Message::Redirect {
                    target: read_addr(&bytes[8..24]),
                    destination: read_addr(&bytes[24..40]),
                    options: parse_nd_options(&bytes[40..])?,
                }
            }
            _ => Icmp6Message::Other { kind, code },
        };
        Ok(Icmp6Packet { message })
    }

    pub fn message(&self) -> &Icmp6Message<'a> {
        &self.message
    }
}

pub enum Icmp6TxMessage {
    EchoRequest {
        id: u16,
        seq: u16,
        data: Vec<u8>,
    },
    EchoReply {
        id: u16,
        seq: u16,
        data: Vec<u8>,
    },
    Unreachable {
        code: u8,
        data: Vec<u8>,
    },
    NeighborSolicitation {
        target: Ipv6Addr,
        options: Vec<NdOption>,
    },
    NeighborAdvertisement {
        flag_r: bool,
        flag_s: bool,
        flag_o: bool,
        target: Ipv6Addr,
        options: Vec<NdOption>,
    },
}

pub struct Icmp6Assembler {
    pub message: Icmp6TxMessage,
    pub tracker: Tracker,
}

impl Icmp6Assembler {
    pub fn len(&self) -> usize {
        match &self.message {
            Icmp6TxMessage::EchoRequest { data, .. } => 8 + data.len(),
            Icmp6TxMessage::EchoReply { data, .. } => 8 + data.len(),
            Icmp6TxMessage::Unreachable { data, .. } => 8 + data.len(),
            Icmp6TxMessage::NeighborSolicitation { options, .. } => 24 + nd_options_len(options),
            Icmp6TxMessage::NeighborAdvertisement { options, .. } => 24 + nd_options_len(options),
        }
    }

    /// Message bytes with the checksum field left zero. The pseudo-header
    /// checksum is filled in by [`Icmp6Assembler::emit`].
    pub fn emit_unchecksummed(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.len());
        match &self.message {
            Icmp6TxMessage::EchoRequest { id, seq, data } => {
                message.push(ICMP6_ECHO_REQUEST);
                message.push(0);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&id.to_be_bytes());
                message.extend_from_slice(&seq.to_be_bytes());
                message.extend_from_slice(data);
            }
            Icmp6TxMessage::EchoReply { id, seq, data } => {
                message.push(ICMP6_ECHO_REPLY);
                message.push(0);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&id.to_be_bytes());
                message.extend_from_slice(&seq.to_be_bytes());
                message.extend_from_slice(data);
            }
            Icmp6TxMessage::Unreachable { code, data } => {
                message.push(ICMP6_UNREACHABLE);
                message.push(*code);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&[0, 0, 0, 0]); // unused
                message.extend_from_slice(data);
            }
            Icmp6TxMessage::NeighborSolicitation { target, options } => {
                message.push(ICMP6_ND_NEIGHBOR_SOLICITATION);
                message.push(0);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&[0, 0, 0, 0]); // reserved
                message.extend_from_slice(&target.octets());
                emit_nd_options(options, &mut message);
            }
            Icmp6TxMessage::NeighborAdvertisement {
                flag_r,
                flag_s,
                flag_o,
                target,
                options,
            } => {
                message.push(ICMP6_ND_NEIGHBOR_ADVERTISEMENT);
                message.push(0);
                message.extend_from_slice(&[0, 0]);
                let mut flags = 0u8;
                if *flag_r {
                    flags |= 0x80;
                }
                if *flag_s {
                    flags |= 0x40;
                }
                if *flag_o {
                    flags |= 0x20;
                }
                message.push(flags);
                message.extend_from_slice(&[0, 0, 0]); // reserved
                message.extend_from_slice(&target.octets());
                emit_nd_options(options, &mut message);
            }
        }
        message
    }

    pub fn emit(&self, src: Ipv6Addr, dst: Ipv6Addr) -> Vec<u8> {
        let mut message = self.emit_unchecksummed();
        let cksum = checksum::icmpv6(src, dst, &message);
        message[2..4].copy_from_slice(&cksum.to_be_bytes());
        message
    }
}
