//! ARP cache: IPv4 → MAC resolution with aging and proactive refresh.
//!
//! Entry lifecycle: a lookup miss solicits the address (the entry stays
//! absent until the reply lands), a reply inserts the entry, crossing the
//! refresh threshold with a non-zero hit count emits a unicast probe, and
//! crossing the maximum age removes the entry. Solicitations are built
//! directly against the TX ring with the broadcast destination MAC, so
//! resolution can never recurse into itself.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::addr::MacAddr;
use crate::context::StackContext;
use crate::device::TxRing;
use crate::tracker::{Direction, Tracker};
use crate::wire::arp::{ArpAssembler, ArpOperation};
use crate::wire::ether::{EtherAssembler, ETHER_TYPE_ARP};

struct CacheEntry {
    mac: MacAddr,
    permanent: bool,
    created: Instant,
    hit_count: u64,
}

pub struct ArpCache {
    entries: Mutex<FxHashMap<Ipv4Addr, CacheEntry>>,
    max_age: Duration,
    refresh_time: Duration,
    ctx: Arc<StackContext>,
    ring: TxRing,
}

impl ArpCache {
    pub fn new(
        ctx: Arc<StackContext>,
        ring: TxRing,
        max_age: Duration,
        refresh_time: Duration,
    ) -> ArpCache {
        ArpCache {
            entries: Mutex::new(FxHashMap::default()),
            max_age,
            refresh_time,
            ctx,
            ring,
        }
    }

    /// Add or refresh an entry.
    pub fn insert(&self, addr: Ipv4Addr, mac: MacAddr) {
        self.insert_entry(addr, mac, false);
    }

    pub fn insert_permanent(&self, addr: Ipv4Addr, mac: MacAddr) {
        self.insert_entry(addr, mac, true);
    }

    fn insert_entry(&self, addr: Ipv4Addr, mac: MacAddr, permanent: bool) {
        debug!(%addr, %mac, "arp cache entry added/refreshed");
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

    pub fn remove(&self, addr: Ipv4Addr) {
        self.entries.lock().remove(&addr);
    }

    /// Resolve `addr`. On a miss an ARP request is broadcast and the caller
    /// gets nothing; a later reply populates the entry.
    pub fn find(&self, addr: Ipv4Addr) -> Option<MacAddr> {
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&addr) {
                entry.hit_count += 1;
                trace!(%addr, mac = %entry.mac, hit_count = entry.hit_count, "arp cache hit");
                return Some(entry.mac);
            }
        }
        trace!(%addr, "arp cache miss, soliciting");
        self.send_request(addr, MacAddr::BROADCAST);
        None
    }

    /// Current hit count of an entry, if present.
    pub fn hit_count(&self, addr: Ipv4Addr) -> Option<u64> {
        self.entries.lock().get(&addr).map(|entry| entry.hit_count)
    }

    /// Periodic upkeep: discard expired entries, probe expiring ones that
    /// have been used since the last refresh.
    pub fn maintain(&self) {
        let now = Instant::now();
        let mut probes: Vec<(Ipv4Addr, MacAddr)> = Vec::new();
        {
            let mut entries = self.entries.lock();
            entries.retain(|addr, entry| {
                if entry.permanent {
                    return true;
                }
                let age = now.duration_since(entry.created);
                if age > self.max_age {
                    debug!(%addr, mac = %entry.mac, "expired arp cache entry discarded");
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
            debug!(%addr, %mac, "refreshing expiring arp cache entry");
            self.send_request(addr, mac);
        }
    }

    /// Fire-and-forget ARP request, written straight to the TX ring with a
    /// known destination MAC.
    fn send_request(&self, tpa: Ipv4Addr, ether_dst: MacAddr) {
        let spa = self
            .ctx
            .ip4_host
            .read()
            .iter()
            .find(|host| host.network.contains(tpa))
            .map(|host| host.address)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let tracker = Tracker::new(Direction::Tx);
        let request = ArpAssembler {
            oper: ArpOperation::Request,
            sha: self.ctx.mac_unicast,
            spa,
            tha: MacAddr::UNSPECIFIED,
            tpa,
            tracker: tracker.clone(),
        };
        let frame = EtherAssembler {
            dst: ether_dst,
            src: self.ctx.mac_unicast,
            ethertype: ETHER_TYPE_ARP,
            payload: request.emit(),
            tracker,
        };
        self.ring.push(frame.emit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Ip4Host;
    use crate::wire::arp::ArpPacket;
    use crate::wire::ether::EtherFrame;
    use crossbeam_channel::Receiver;
    use pretty_assertions::assert_eq;

    fn cache(max_age: Duration, refresh: Duration) -> (ArpCache, Receiver<Vec<u8>>) {
        let ctx = Arc::new(StackContext::new(
            "02:00:00:77:77:77".parse().unwrap(),
            vec![Ip4Host::new(
                Ipv4Addr::new(192, 168, 9, 7),
                24,
                Some(Ipv4Addr::new(192, 168, 9, 1)),
            )],
            vec![],
        ));
        let (ring, receiver) = TxRing::new();
        (ArpCache::new(ctx, ring, max_age, refresh), receiver)
    }

    #[test]
    fn insert_then_find_returns_mac_and_counts_hit() {
        let (cache, _rx) = cache(Duration::from_secs(3600), Duration::from_secs(300));
        let addr = Ipv4Addr::new(192, 168, 9, 102);
        let mac: MacAddr = "52:54:00:70:7b:2b".parse().unwrap();
        cache.insert(addr, mac);
        assert_eq!(cache.hit_count(addr), Some(0));
        assert_eq!(cache.find(addr), Some(mac));
        assert_eq!(cache.hit_count(addr), Some(1));
    }

    #[test]
    fn miss_broadcasts_request_with_matching_source() {
        let (cache, rx) = cache(Duration::from_secs(3600), Duration::from_secs(300));
        let target = Ipv4Addr::new(192, 168, 9, 102);
        assert_eq!(cache.find(target), None);

        let frame_bytes = rx.try_recv().expect("request frame enqueued");
        let frame = EtherFrame::parse(&frame_bytes).unwrap();
        assert!(frame.dst().is_broadcast());
        assert_eq!(frame.ethertype(), ETHER_TYPE_ARP);
        let request = ArpPacket::parse(frame.payload()).unwrap();
        assert_eq!(request.oper(), ArpOperation::Request);
        assert_eq!(request.spa(), Ipv4Addr::new(192, 168, 9, 7));
        assert_eq!(request.tpa(), target);
        assert_eq!(request.tha(), MacAddr::UNSPECIFIED);
    }

    #[test]
    fn maintain_discards_expired_entries() {
        let (cache, _rx) = cache(Duration::from_millis(0), Duration::from_millis(0));
        let addr = Ipv4Addr::new(192, 168, 9, 102);
        cache.insert(addr, "52:54:00:70:7b:2b".parse().unwrap());
        std::thread::sleep(Duration::from_millis(5));
        cache.maintain();
        assert_eq!(cache.hit_count(addr), None);
    }

    #[test]
    fn maintain_keeps_permanent_entries() {
        let (cache, _rx) = cache(Duration::from_millis(0), Duration::from_millis(0));
        let addr = Ipv4Addr::new(192, 168, 9, 1);
        cache.insert_permanent(addr, "52:54:00:11:22:33".parse().unwrap());
        std::thread::sleep(Duration::from_millis(5));
        cache.maintain();
        assert_eq!(cache.hit_count(addr), Some(0));
    }

    #[test]
    fn maintain_probes_used_expiring_entries_unicast() {
        // max_age 10s with refresh window 10s puts every entry inside the
        // refresh window immediately.
        let (cache, rx) = cache(Duration::from_secs(10), Duration::from_secs(10));
        let addr = Ipv4Addr::new(192, 168, 9, 102);
        let mac: MacAddr = "52:54:00:70:7b:2b".parse().unwrap();
        cache.insert(addr, mac);
        cache.find(addr);
        std::thread::sleep(Duration::from_millis(5));
        cache.maintain();

        let frame_bytes = rx.try_recv().expect("probe frame enqueued");
        let frame = EtherFrame::parse(&frame_bytes).unwrap();
        assert_eq!(frame.dst(), mac);
        // Hit count resets after the probe; a second maintain stays quiet.
        assert_eq!(cache.hit_count(addr), Some(0));
        cache.maintain();
        assert!(rx.try_recv().is_err());
    }
}
