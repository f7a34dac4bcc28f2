//! The packet handler: inbound dispatch and outbound assembly around one
//! layer-2 device.
//!
//! Shared tables each sit behind their own lock. Lock order, outermost
//! first: stats < socket index < {arp cache, nd cache} < fragment table.
//! No lock is ever held across device I/O; the TX ring decouples assembly
//! from the writer thread.

mod rx;
mod rx4;
mod rx6;
mod tx;
mod tx4;
mod tx6;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arp_cache::ArpCache;
use crate::config::StackConfig;
use crate::context::StackContext;
use crate::device::TxRing;
use crate::nd_cache::NdCache;
use crate::reassembly::Reassembler;
use crate::sockets::SocketTable;
use crate::stats::{PacketStatsRx, PacketStatsTx};
use crate::tracker::Tracker;
use crate::wire::arp::ArpAssembler;
use crate::wire::ether::{ETHER_TYPE_ARP, ETHER_TYPE_IP4, ETHER_TYPE_IP6};
use crate::wire::ip4::Ip4Assembler;
use crate::wire::ip6::Ip6Assembler;

pub struct PacketHandler {
    pub(crate) ip4_support: bool,
    pub(crate) ip6_support: bool,
    pub(crate) mtu: usize,
    pub(crate) ctx: Arc<StackContext>,
    pub(crate) stats_rx: Mutex<PacketStatsRx>,
    pub(crate) stats_tx: Mutex<PacketStatsTx>,
    pub(crate) sockets: SocketTable,
    pub(crate) arp_cache: ArpCache,
    pub(crate) nd_cache: NdCache,
    pub(crate) reassembly: Reassembler,
    pub(crate) ring: TxRing,
    ip4_id: AtomicU16,
    ip6_frag_id: AtomicU32,
}

impl PacketHandler {
    pub fn new(config: &StackConfig, ring: TxRing) -> PacketHandler {
        let ctx = Arc::new(StackContext::new(
            config.mac_address,
            config.ip4_host.clone(),
            config.ip6_host.clone(),
        ));
        PacketHandler {
            ip4_support: config.ip4_support,
            ip6_support: config.ip6_support,
            mtu: config.mtu,
            arp_cache: ArpCache::new(
                Arc::clone(&ctx),
                ring.clone(),
                config.arp_cache_entry_max_age,
                config.arp_cache_entry_refresh_time,
            ),
            nd_cache: NdCache::new(
                Arc::clone(&ctx),
                ring.clone(),
                config.nd_cache_entry_max_age,
                config.nd_cache_entry_refresh_time,
            ),
            ctx,
            stats_rx: Mutex::new(PacketStatsRx::default()),
            stats_tx: Mutex::new(PacketStatsTx::default()),
            sockets: SocketTable::new(),
            reassembly: Reassembler::new(config.fragment_timeout),
            ring,
            ip4_id: AtomicU16::new(0),
            ip6_frag_id: AtomicU32::new(0),
        }
    }

    pub fn ctx(&self) -> &Arc<StackContext> {
        &self.ctx
    }

    pub fn sockets(&self) -> &SocketTable {
        &self.sockets
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn nd_cache(&self) -> &NdCache {
        &self.nd_cache
    }

    pub fn reassembly(&self) -> &Reassembler {
        &self.reassembly
    }

    pub fn stats_rx(&self) -> PacketStatsRx {
        self.stats_rx.lock().clone()
    }

    pub fn stats_tx(&self) -> PacketStatsTx {
        self.stats_tx.lock().clone()
    }

    /// Shared identification for one fragmented IPv4 datagram.
    pub(crate) fn next_ip4_id(&self) -> u16 {
        self.ip4_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Fresh 32-bit identification for one IPv6 fragment train.
    pub(crate) fn next_ip6_frag_id(&self) -> u32 {
        self.ip6_frag_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }
}

/// Carried packet handed to the ethernet assembly step. The variant decides
/// the EtherType and, for IP, drives next-hop resolution.
pub(crate) enum EtherPayload {
    Arp(ArpAssembler),
    Ip4(Ip4Assembler),
    Ip6(Ip6Assembler),
}

impl EtherPayload {
    pub(crate) fn ethertype(&self) -> u16 {
        match self {
            EtherPayload::Arp(_) => ETHER_TYPE_ARP,
            EtherPayload::Ip4(_) => ETHER_TYPE_IP4,
            EtherPayload::Ip6(_) => ETHER_TYPE_IP6,
        }
    }

    pub(crate) fn tracker(&self) -> &Tracker {
        match self {
            EtherPayload::Arp(arp) => &arp.tracker,
            EtherPayload::Ip4(ip4) => &ip4.tracker,
            EtherPayload::Ip6(ip6) => &ip6.tracker,
        }
    }

    pub(crate) fn emit(&self) -> Vec<u8> {
        match self {
            EtherPayload::Arp(arp) => arp.emit(),
            EtherPayload::Ip4(ip4) => ip4.emit(),
            EtherPayload::Ip6(ip6) => ip6.emit(),
        }
    }
}
