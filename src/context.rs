//! Identity shared across subsystems: the stack's MAC, its address
//! assignments, and its multicast memberships. Handed around as an
//! `Arc<StackContext>` so caches and the packet handler see one copy.

use std::net::{Ipv4Addr, Ipv6Addr};

use parking_lot::RwLock;

use crate::addr::{Ip4Host, Ip6Host, Ip6AddrExt, MacAddr};

pub struct StackContext {
    pub mac_unicast: MacAddr,
    pub ip4_host: RwLock<Vec<Ip4Host>>,
    pub ip6_host: RwLock<Vec<Ip6Host>>,
    pub ip4_multicast: RwLock<Vec<Ipv4Addr>>,
    pub ip6_multicast: RwLock<Vec<Ipv6Addr>>,
}

impl StackContext {
    pub fn new(mac_unicast: MacAddr, ip4_host: Vec<Ip4Host>, ip6_host: Vec<Ip6Host>) -> Self {
        // All-systems / all-nodes membership plus the solicited-node group
        // of every owned IPv6 address.
        let ip4_multicast = vec![Ipv4Addr::new(224, 0, 0, 1)];
        let mut ip6_multicast = vec![Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1)];
        for host in &ip6_host {
            let group = host.address.solicited_node_multicast();
            if !ip6_multicast.contains(&group) {
                ip6_multicast.push(group);
            }
        }
        StackContext {
            mac_unicast,
            ip4_host: RwLock::new(ip4_host),
            ip6_host: RwLock::new(ip6_host),
            ip4_multicast: RwLock::new(ip4_multicast),
            ip6_multicast: RwLock::new(ip6_multicast),
        }
    }

    /// An address is owned iff it equals some host's address.
    pub fn owns_ip4(&self, addr: Ipv4Addr) -> bool {
        self.ip4_host.read().iter().any(|host| host.address == addr)
    }

    pub fn owns_ip6(&self, addr: Ipv6Addr) -> bool {
        self.ip6_host.read().iter().any(|host| host.address == addr)
    }

    pub fn joined_ip4_multicast(&self, group: Ipv4Addr) -> bool {
        self.ip4_multicast.read().contains(&group)
    }

    pub fn joined_ip6_multicast(&self, group: Ipv6Addr) -> bool {
        self.ip6_multicast.read().contains(&group)
    }

    /// The MAC addresses the ethernet layer accepts as multicast
    /// destinations, derived from current memberships.
    pub fn multicast_macs(&self) -> Vec<MacAddr> {
        let mut macs: Vec<MacAddr> = self
            .ip4_multicast
            .read()
            .iter()
            .map(|group| MacAddr::from_multicast_ip4(*group))
            .collect();
        for group in self.ip6_multicast.read().iter() {
            let mac = MacAddr::from_multicast_ip6(*group);
            if !macs.contains(&mac) {
                macs.push(mac);
            }
        }
        macs
    }
}
