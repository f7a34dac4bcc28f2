//! Socket-lookup index: binds connection-key patterns to delivery
//! endpoints. UDP and TCP share the keying scheme but live in disjoint
//! tables. Delivery is by channel; the owner of a socket holds the
//! receiving end and the dispatcher clones the sender on match.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::wire::tcp::TcpFlags;

pub const PORT_ANY: u16 = 0;

/// Connection key. Unspecified addresses and port 0 act as wildcards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SocketKey {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
}

impl SocketKey {
    pub fn new(local_ip: IpAddr, local_port: u16, remote_ip: IpAddr, remote_port: u16) -> Self {
        SocketKey {
            local_ip,
            local_port,
            remote_ip,
            remote_port,
        }
    }

    /// Listener key: any remote, wildcard local address of `family`.
    pub fn listener_v4(local_port: u16) -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        SocketKey::new(any, local_port, any, PORT_ANY)
    }

    pub fn listener_v6(local_port: u16) -> Self {
        let any = IpAddr::V6(Ipv6Addr::UNSPECIFIED);
        SocketKey::new(any, local_port, any, PORT_ANY)
    }
}

fn unspecified_like(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

/// Candidate keys for an arriving packet, most specific first: full
/// 4-tuple, wildcard remote, wildcard local address, fully-wildcard
/// listener.
pub fn candidate_keys(
    local_ip: IpAddr,
    local_port: u16,
    remote_ip: IpAddr,
    remote_port: u16,
) -> [SocketKey; 4] {
    let any_local = unspecified_like(local_ip);
    let any_remote = unspecified_like(remote_ip);
    [
        SocketKey::new(local_ip, local_port, remote_ip, remote_port),
        SocketKey::new(local_ip, local_port, any_remote, PORT_ANY),
        SocketKey::new(any_local, local_port, remote_ip, remote_port),
        SocketKey::new(any_local, local_port, any_remote, PORT_ANY),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UdpEvent {
    Datagram {
        local_ip: IpAddr,
        local_port: u16,
        remote_ip: IpAddr,
        remote_port: u16,
        payload: Vec<u8>,
    },
    /// An ICMP message reported the remote endpoint unreachable.
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TcpEvent {
    Segment {
        local_ip: IpAddr,
        local_port: u16,
        remote_ip: IpAddr,
        remote_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        win: u16,
        payload: Vec<u8>,
    },
    Unreachable,
}

/// Both protocol tables behind one lock each.
pub struct SocketTable {
    udp: Mutex<FxHashMap<SocketKey, Sender<UdpEvent>>>,
    tcp: Mutex<FxHashMap<SocketKey, Sender<TcpEvent>>>,
}

impl SocketTable {
    pub fn new() -> SocketTable {
        SocketTable {
            udp: Mutex::new(FxHashMap::default()),
            tcp: Mutex::new(FxHashMap::default()),
        }
    }

    /// Bind a UDP delivery endpoint. Replaces any previous binding for the
    /// same key.
    pub fn bind_udp(&self, key: SocketKey) -> Receiver<UdpEvent> {
        let (sender, receiver) = unbounded();
        self.udp.lock().insert(key, sender);
        debug!(?key, "udp socket bound");
        receiver
    }

    pub fn unbind_udp(&self, key: &SocketKey) {
        self.udp.lock().remove(key);
    }

    pub fn bind_tcp(&self, key: SocketKey) -> Receiver<TcpEvent> {
        let (sender, receiver) = unbounded();
        self.tcp.lock().insert(key, sender);
        debug!(?key, "tcp socket bound");
        receiver
    }

    pub fn unbind_tcp(&self, key: &SocketKey) {
        self.tcp.lock().remove(key);
    }

    pub fn lookup_udp(
        &self,
        local_ip: IpAddr,
        local_port: u16,
        remote_ip: IpAddr,
        remote_port: u16,
    ) -> Option<Sender<UdpEvent>> {
        let table = self.udp.lock();
        candidate_keys(local_ip, local_port, remote_ip, remote_port)
            .iter()
            .find_map(|key| table.get(key).cloned())
    }

    pub fn lookup_tcp(
        &self,
        local_ip: IpAddr,
        local_port: u16,
        remote_ip: IpAddr,
        remote_port: u16,
    ) -> Option<Sender<TcpEvent>> {
        let table = self.tcp.lock();
        candidate_keys(local_ip, local_port, remote_ip, remote_port)
            .iter()
            .find_map(|key| table.get(key).cloned())
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        SocketTable::new()
    }
}
