//! ICMPv4 subset: Echo Request/Reply and Destination Unreachable (RFC 792).

use crate::tracker::Tracker;

use super::{checksum, ParseError};

pub const ICMP4_HEADER_LEN: usize = 4;
pub const ICMP4_ECHO_REPLY: u8 = 0;
pub const ICMP4_UNREACHABLE: u8 = 3;
pub const ICMP4_ECHO_REQUEST: u8 = 8;

pub const ICMP4_UNREACHABLE_PORT: u8 = 3;
pub const ICMP4_UNREACHABLE_PROTOCOL: u8 = 2;

#[derive(Debug, PartialEq, Eq)]
pub enum Icmp4Message<'a> {
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
    /// `data` is the quoted original datagram (IP header + leading bytes).
    Unreachable {
        code: u8,
        data: &'a [u8],
    },
    Other {
        kind: u8,
        code: u8,
    },
}

#[derive(Debug)]
pub struct Icmp4Packet<'a> {
    message: Icmp4Message<'a>,
}

impl<'a> Icmp4Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        if bytes.len() < ICMP4_HEADER_LEN {
            return Err(ParseError::Icmp4("message shorter than header"));
        }
        if checksum::ones_complement(0, bytes) != 0 {
            return Err(ParseError::Icmp4("checksum mismatch"));
        }
        let kind = bytes[0];
        let code = bytes[1];
        let message = match kind {
            ICMP4_ECHO_REQUEST | ICMP4_ECHO_REPLY => {
                if bytes.len() < 8 {
                    return Err(ParseError::Icmp4("echo message truncated"));
                }
                let id = u16::from_be_bytes([bytes[4], bytes[5]]);
                let seq = u16::from_be_bytes([bytes[6], bytes[7]]);
                let data = &bytes[8..];
                if kind == ICMP4_ECHO_REQUEST {
                    Icmp4Message::EchoRequest { id, seq, data }
                } else {
                    Icmp4Message::EchoReply { id, seq, data }
                }
            }
            ICMP4_UNREACHABLE => {
                if bytes.len() < 8 {
                    return Err(ParseError::Icmp4("unreachable message truncated"));
                }
                Icmp4Message::Unreachable {
                    code,
                    data: &bytes[8..],
                }
            }
            _ => Icmp4Message::Other { kind, code },
        };
        Ok(Icmp4Packet { message })
    }

    pub fn message(&self) -> &Icmp4Message<'a> {
        &self.message
    }
}

pub enum Icmp4TxMessage {
    EchoRequest { id: u16, seq: u16, data: Vec<u8> },
    EchoReply { id: u16, seq: u16, data: Vec<u8> },
    Unreachable { code: u8, data: Vec<u8> },
}

pub struct Icmp4Assembler {
    pub message: Icmp4TxMessage,
    pub tracker: Tracker,
}

impl Icmp4Assembler {
    pub fn len(&self) -> usize {
        match &self.message {
            Icmp4TxMessage::EchoRequest { data, .. } => 8 + data.len(),
            Icmp4TxMessage::EchoReply { data, .. } => 8 + data.len(),
            Icmp4TxMessage::Unreachable { data, .. } => 8 + data.len(),
        }
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.len());
        match &self.message {
            Icmp4TxMessage::EchoRequest { id, seq, data } => {
                message.push(ICMP4_ECHO_REQUEST);
                message.push(0);
                message.extend_from_slice(&[0, 0]); // checksum placeholder
                message.extend_from_slice(&id.to_be_bytes());
                message.extend_from_slice(&seq.to_be_bytes());
                message.extend_from_slice(data);
            }
            Icmp4TxMessage::EchoReply { id, seq, data } => {
                message.push(ICMP4_ECHO_REPLY);
                message.push(0);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&id.to_be_bytes());
                message.extend_from_slice(&seq.to_be_bytes());
                message.extend_from_slice(data);
            }
            Icmp4TxMessage::Unreachable { code, data } => {
                message.push(ICMP4_UNREACHABLE);
                message.push(*code);
                message.extend_from_slice(&[0, 0]);
                message.extend_from_slice(&[0, 0, 0, 0]); // unused
                message.extend_from_slice(data);
            }
        }
        let cksum = checksum::icmpv4(&message);
        message[2..4].copy_from_slice(&cksum.to_be_bytes());
        message
    }
}
