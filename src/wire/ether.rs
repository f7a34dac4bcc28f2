//! Ethernet II framing.

use crate::addr::MacAddr;
use crate::tracker::Tracker;

use super::ParseError;

pub const ETHER_HEADER_LEN: usize = 14;

pub const ETHER_TYPE_IP4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;
pub const ETHER_TYPE_IP6: u16 = 0x86DD;

/// Parsed view over one Ethernet II frame.
#[derive(Debug)]
pub struct EtherFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> EtherFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < ETHER_HEADER_LEN {
            return Err(ParseError::Ether("frame shorter than header"));
        }
        Ok(EtherFrame { bytes })
    }

    pub fn dst(&self) -> MacAddr {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.bytes[0..6]);
        MacAddr(octets)
    }

    pub fn src(&self) -> MacAddr {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.bytes[6..12]);
        MacAddr(octets)
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.bytes[12], self.bytes[13]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[ETHER_HEADER_LEN..]
    }
}

/// Builds one Ethernet II frame around an already-assembled payload.
pub struct EtherAssembler {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
    pub tracker: Tracker,
}

impl EtherAssembler {
    pub fn len(&self) -> usize {
        ETHER_HEADER_LEN + self.payload.len()
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.len());
        frame.extend_from_slice(&self.dst.octets());
        frame.extend_from_slice(&self.src.octets());
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}
