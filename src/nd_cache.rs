//! Neighbor Discovery cache: IPv6 → MAC resolution with aging and
//! proactive refresh, mirroring the ARP cache shape. A lookup miss sends a
//! Neighbor Solicitation to the target's solicited-node multicast group;
//! the refresh probe goes unicast to the cached MAC. Both are written
//! straight to the TX ring so resolution never recurses into itself.

use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::addr::{Ip6AddrExt, MacAddr};
use crate::context::StackContext;
use crate::device::TxRing;
use crate::tracker::{Direction, Tracker};
use crate::wire::ether::{EtherAssembler, ETHER_TYPE_IP6};
use crate::wire::icmp6::{Icmp6Assembler, Icmp6TxMessage, NdOption};
use crate::wire::ip6::Ip6Assembler;
use crate::wire::IP_PROTO_ICMP6;

const ND_HOP_LIMIT: u8 = 255;

struct CacheEntry {
    mac: MacAddr,
    permanent: bool,
    created: Instant,
    hit_count: u64,
}

pub struct NdCache {
    entries: Mutex<FxHashMap<Ipv6Addr, CacheEntry>>,
    max_age: Duration,
    refresh_time: Duration,
    ctx: Arc<StackContext>,
    ring: TxRing,
}

impl NdCache {
    pub fn new(
        ctx: Arc<StackContext>,
        ring: TxRing,
        max_age: Duration,
        refresh_time: Duration,
    ) -> NdCache {
        NdCache {
            entries: Mutex::new(FxHashMap::default()),
            max_age,
            refresh_time,
            ctx,
            ring,
        }
    }

    pub fn insert(&self, addr: Ipv6Addr, mac: MacAddr) {
        self.insert_entry(addr, mac, false);
    }

    pub fn insert_permanent(&self, addr: Ipv6Addr, mac: MacAddr) {
        self.insert_entry(addr, mac, true);
    }

    fn insert_entry(&self, addr: Ipv6Addr, mac: MacAddr, permanent: bool) {
        debug!(%addr, %mac, "nd cache entry added/refreshed");
        self.entries.lock().insert(
            addr,
            CacheEntry {
                mac,
                permanent,
                created: Instant::now(),
                hit_count: 0,
            },
        );
    }

    pub fn remove(&self, addr: Ipv6Addr) {
        self.entries.lock().remove(&addr);
    }

    /// Resolve `addr`. A miss solicits the neighbor and returns nothing.
    pub fn find(&self, addr: Ipv6Addr) -> Option<MacAddr> {
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&addr) {
                entry.hit_count += 1;
                trace!(%addr, mac = %entry.mac, hit_count = entry.hit_count, "nd cache hit");
                return Some(entry.mac);
            }
        }
        trace!(%addr, "nd cache miss, soliciting");
        self.send_solicitation(addr, None);
        None
    }

    pub fn hit_count(&self, addr: Ipv6Addr) -> Option<u64> {
        self.entries.lock().get(&addr).map(|entry| entry.hit_count)
    }

    /// Periodic upkeep, same policy as the ARP cache.
    pub fn maintain(&self) {
        let now = Instant::now();
        let mut probes: Vec<(Ipv6Addr, MacAddr)> = Vec::new();
        {
            let mut entries = self.entries.lock();
            entries.retain(|addr, entry| {
                if entry.permanent {
                    return true;
                }
                let age = now.duration_since(entry.created);
                if age > self.max_age {
                    debug!(%addr, mac = %entry.mac, "expired nd cache entry discarded");
                    return false;
                }
                if age > self.max_age.saturating_sub(self.refresh_time) && entry.hit_count > 0 {
                    entry.hit_count = 0;
                    probes.push((*addr, entry.mac));
                }
                true
            });
        }
        for (addr, mac) in probes {
            debug!(%addr, %mac, "refreshing expiring nd cache entry");
            self.send_solicitation(addr, Some(mac));
        }
    }

    /// Fire-and-forget Neighbor Solicitation. With `unicast_to` the probe
    /// goes straight to the cached MAC; otherwise it targets the
    /// solicited-node multicast group.
    fn send_solicitation(&self, target: Ipv6Addr, unicast_to: Option<MacAddr>) {
        let src = self
            .ctx
            .ip6_host
            .read()
            .iter()
            .find(|host| host.network.contains(target))
            .map(|host| host.address)
            .unwrap_or(Ipv6Addr::UNSPECIFIED);

        let (ip6_dst, ether_dst) = match unicast_to {
            Some(mac) => (target, mac),
            None => {
                let group = target.solicited_node_multicast();
                (group, MacAddr::from_multicast_ip6(group))
            }
        };

        let tracker = Tracker::new(Direction::Tx);
        let solicitation = Icmp6Assembler {
            message: Icmp6TxMessage::NeighborSolicitation {
                target,
                options: vec![NdOption::SourceLinkLayerAddress(self.ctx.mac_unicast)],
            },
            tracker: tracker.clone(),
        };
        let datagram = Ip6Assembler {
            next: IP_PROTO_ICMP6,
            hop: ND_HOP_LIMIT,
            src,
            dst: ip6_dst,
            payload: solicitation.emit(src, ip6_dst),
            tracker: tracker.clone(),
        };
        let frame = EtherAssembler {
            dst: ether_dst,
            src: self.ctx.mac_unicast,
            ethertype: ETHER_TYPE_IP6,
            payload: datagram.emit(),
            tracker,
        };
        self.ring.push(frame.emit());
    }
}
