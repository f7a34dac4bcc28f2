//! ARP for IPv4 over Ethernet (RFC 826).

use std::net::Ipv4Addr;

use crate::addr::MacAddr;
use crate::tracker::Tracker;

use super::ParseError;

pub const ARP_PACKET_LEN: usize = 28;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArpOperation {
    Request,
    Reply,
}

impl ArpOperation {
    fn code(self) -> u16 {
        match self {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
        }
    }
}

/// Parsed view over one ARP packet. Only the Ethernet/IPv4 combination is
/// accepted; anything else is a parse failure.
#[derive(Debug)]
pub struct ArpPacket<'a> {
    bytes: &'a [u8],
    oper: ArpOperation,
}

impl<'a> ArpPacket<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < ARP_PACKET_LEN {
            return Err(ParseError::Arp("packet shorter than header"));
        }
        if u16::from_be_bytes([bytes[0], bytes[1]]) != 1 {
            return Err(ParseError::Arp("hardware type not ethernet"));
        }
        if u16::from_be_bytes([bytes[2], bytes[3]]) != 0x0800 {
            return Err(ParseError::Arp("protocol type not ipv4"));
        }
        if bytes[4] != 6 {
            return Err(ParseError::Arp("hardware address length not 6"));
        }
        if bytes[5] != 4 {
            return Err(ParseError::Arp("protocol address length not 4"));
        }
        let oper = match u16::from_be_bytes([bytes[6], bytes[7]]) {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            _ => return Err(ParseError::Arp("unknown operation")),
        };
        Ok(ArpPacket { bytes, oper })
    }

    pub fn oper(&self) -> ArpOperation {
        self.oper
    }

    pub fn sha(&self) -> MacAddr {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.bytes[8..14]);
        MacAddr(octets)
    }

    pub fn spa(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[14], self.bytes[15], self.bytes[16], self.bytes[17])
    }

    pub fn tha(&self) -> MacAddr {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.bytes[18..24]);
        MacAddr(octets)
    }

    pub fn tpa(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[24], self.bytes[25], self.bytes[26], self.bytes[27])
    }
}

pub struct ArpAssembler {
    pub oper: ArpOperation,
    pub sha: MacAddr,
    pub spa: Ipv4Addr,
    pub tha: MacAddr,
    pub tpa: Ipv4Addr,
    pub tracker: Tracker,
}

impl ArpAssembler {
    pub fn len(&self) -> usize {
        ARP_PACKET_LEN
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ARP_PACKET_LEN);
        packet.extend_from_slice(&1u16.to_be_bytes()); // htype ethernet
        packet.extend_from_slice(&0x0800u16.to_be_bytes()); // ptype ipv4
        packet.push(6);
        packet.push(4);
        packet.extend_from_slice(&self.oper.code().to_be_bytes());
        packet.extend_from_slice(&self.sha.octets());
        packet.extend_from_slice(&self.spa.octets());
        packet.extend_from_slice(&self.tha.octets());
        packet.extend_from_slice(&self.tpa.octets());
        packet
    }
}
