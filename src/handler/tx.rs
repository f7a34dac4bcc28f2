//! Outbound entry points and the ethernet assembly step shared by every
//! protocol: fill the source MAC, resolve the next-hop MAC, enqueue the
//! frame on the TX ring.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::{debug, warn};

use crate::addr::{Ip4AddrExt, MacAddr};
use crate::status::TxStatus;
use crate::tracker::{Direction, Tracker};
use crate::wire::arp::{ArpAssembler, ArpOperation};
use crate::wire::ether::EtherAssembler;
use crate::wire::icmp4::{Icmp4Assembler, Icmp4TxMessage};
use crate::wire::icmp6::{Icmp6Assembler, Icmp6TxMessage};
use crate::wire::tcp::{TcpAssembler, TcpFlags};
use crate::wire::udp::UdpAssembler;
use crate::wire::IpPayload;

use super::{EtherPayload, PacketHandler};

fn fresh_tracker(echo_tracker: Option<&Tracker>) -> Tracker {
    match echo_tracker {
        Some(parent) => Tracker::with_echo(Direction::Tx, parent),
        None => Tracker::new(Direction::Tx),
    }
}

impl PacketHandler {
    /// Assemble and send one ARP packet.
    #[allow(clippy::too_many_arguments)]
    pub fn send_arp(
        &self,
        ether_src: MacAddr,
        ether_dst: MacAddr,
        oper: ArpOperation,
        sha: MacAddr,
        spa: Ipv4Addr,
        tha: MacAddr,
        tpa: Ipv4Addr,
        echo_tracker: Option<&Tracker>,
    ) -> TxStatus {
        self.stats_tx.lock().arp__pre_assemble += 1;
        if !self.ip4_support {
            self.stats_tx.lock().arp__no_proto_support__drop += 1;
            return TxStatus::DropedArpNoProtocolSupport;
        }
        match oper {
            ArpOperation::Request => self.stats_tx.lock().arp__op_request__send += 1,
            ArpOperation::Reply => self.stats_tx.lock().arp__op_reply__send += 1,
        }
        let tracker = fresh_tracker(echo_tracker);
        debug!(%tracker, %spa, %tpa, ?oper, "arp packet assembled");
        let packet = ArpAssembler {
            oper,
            sha,
            spa,
            tha,
            tpa,
            tracker,
        };
        self.tx_ether(ether_src, ether_dst, EtherPayload::Arp(packet))
    }

    /// Assemble and send one UDP datagram.
    pub fn send_udp(
        &self,
        src: IpAddr,
        dst: IpAddr,
        sport: u16,
        dport: u16,
        payload: Vec<u8>,
        echo_tracker: Option<&Tracker>,
    ) -> TxStatus {
        self.stats_tx.lock().udp__pre_assemble += 1;
        let tracker = fresh_tracker(echo_tracker);
        debug!(%tracker, sport, dport, len = payload.len(), "udp datagram assembled");
        let datagram = UdpAssembler {
            sport,
            dport,
            payload,
            tracker,
        };
        self.stats_tx.lock().udp__send += 1;
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                self.tx_ip4(src, dst, IpPayload::Udp(datagram), false)
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => self.tx_ip6(src, dst, IpPayload::Udp(datagram)),
            _ => {
                warn!("udp send with mismatched address families");
                TxStatus::DropedEtherDstResolutionFail
            }
        }
    }

    /// Assemble and send one TCP segment.
    #[allow(clippy::too_many_arguments)]
    pub fn send_tcp(
        &self,
        src: IpAddr,
        dst: IpAddr,
        sport: u16,
        dport: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        win: u16,
        payload: Vec<u8>,
        echo_tracker: Option<&Tracker>,
    ) -> TxStatus {
        self.stats_tx.lock().tcp__pre_assemble += 1;
        let tracker = fresh_tracker(echo_tracker);
        debug!(%tracker, sport, dport, ?flags, "tcp segment assembled");
        let segment = TcpAssembler {
            sport,
            dport,
            seq,
            ack,
            flags,
            win,
            options: Vec::new(),
            payload,
            tracker,
        };
        self.stats_tx.lock().tcp__send += 1;
        match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                self.tx_ip4(src, dst, IpPayload::Tcp(segment), false)
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => self.tx_ip6(src, dst, IpPayload::Tcp(segment)),
            _ => {
                warn!("tcp send with mismatched address families");
                TxStatus::DropedEtherDstResolutionFail
            }
        }
    }

    /// Assemble and send one ICMPv4 message.
    pub fn send_icmp4(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        message: Icmp4TxMessage,
        echo_tracker: Option<&Tracker>,
    ) -> TxStatus {
        {
            let mut stats = self.stats_tx.lock();
            stats.icmp4__pre_assemble += 1;
            match &message {
                Icmp4TxMessage::EchoRequest { .. } => stats.icmp4__echo_request__send += 1,
                Icmp4TxMessage::EchoReply { .. } => stats.icmp4__echo_reply__send += 1,
                Icmp4TxMessage::Unreachable { .. } => stats.icmp4__unreachable__send += 1,
            }
        }
        let tracker = fresh_tracker(echo_tracker);
        debug!(%tracker, "icmpv4 message assembled");
        let packet = Icmp4Assembler { message, tracker };
        self.tx_ip4(src, dst, IpPayload::Icmp4(packet), false)
    }

    /// Assemble and send one ICMPv6 message. ND messages pass hop limit 255.
    pub fn send_icmp6(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        hop: u8,
        message: Icmp6TxMessage,
        echo_tracker: Option<&Tracker>,
    ) -> TxStatus {
        {
            let mut stats = self.stats_tx.lock();
            stats.icmp6__pre_assemble += 1;
            match &message {
                Icmp6TxMessage::EchoRequest { .. } => stats.icmp6__echo_request__send += 1,
                Icmp6TxMessage::EchoReply { .. } => stats.icmp6__echo_reply__send += 1,
                Icmp6TxMessage::Unreachable { .. } => stats.icmp6__unreachable__send += 1,
                Icmp6TxMessage::NeighborSolicitation { .. } => {
                    stats.icmp6__nd_neighbor_solicitation__send += 1
                }
                Icmp6TxMessage::NeighborAdvertisement { .. } => {
                    stats.icmp6__nd_neighbor_advertisement__send += 1
                }
            }
        }
        let tracker = fresh_tracker(echo_tracker);
        debug!(%tracker, "icmpv6 message assembled");
        let packet = Icmp6Assembler { message, tracker };
        self.tx_ip6_with_hop(src, dst, hop, IpPayload::Icmp6(packet))
    }

    /// Ethernet assembly: fill in the source MAC, resolve the destination
    /// MAC, and hand the frame to the TX ring.
    pub(crate) fn tx_ether(
        &self,
        ether_src: MacAddr,
        ether_dst: MacAddr,
        payload: EtherPayload,
    ) -> TxStatus {
        self.stats_tx.lock().ether__pre_assemble += 1;

        let src = if ether_src.is_unspecified() {
            self.stats_tx.lock().ether__src_unspec__fill += 1;
            self.ctx.mac_unicast
        } else if ether_src == self.ctx.mac_unicast {
            self.stats_tx.lock().ether__src_spec += 1;
            ether_src
        } else {
            self.stats_tx.lock().ether__src_not_owned__drop += 1;
            return TxStatus::DropedEtherSrcNotOwned;
        };

        let dst = if !ether_dst.is_unspecified() {
            self.stats_tx.lock().ether__dst_spec__send += 1;
            ether_dst
        } else {
            match &payload {
                EtherPayload::Ip4(ip4) => match self.resolve_ip4_next_hop(ip4.src, ip4.dst) {
                    Some(mac) => mac,
                    None => return TxStatus::DropedEtherDstResolutionFail,
                },
                EtherPayload::Ip6(ip6) => match self.resolve_ip6_next_hop(ip6.src, ip6.dst) {
                    Some(mac) => mac,
                    None => return TxStatus::DropedEtherDstResolutionFail,
                },
                EtherPayload::Arp(_) => {
                    self.stats_tx.lock().ether__dst_unspec__drop += 1;
                    return TxStatus::DropedEtherDstResolutionFail;
                }
            }
        };

        let frame = EtherAssembler {
            dst,
            src,
            ethertype: payload.ethertype(),
            payload: payload.emit(),
            tracker: payload.tracker().clone(),
        };
        debug!(tracker = %frame.tracker, %dst, %src, "frame passed to tx ring");
        self.ring.push(frame.emit());
        TxStatus::PassedEtherToTxRing
    }

    /// Next-hop MAC for an IPv4 destination: deterministic mapping for
    /// multicast and broadcast, ARP cache for unicast, via the gateway of
    /// the selected source's prefix off-link.
    fn resolve_ip4_next_hop(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<MacAddr> {
        self.stats_tx.lock().ether__dst_unspec__ip4_lookup += 1;

        if dst.is_multicast() {
            self.stats_tx
                .lock()
                .ether__dst_unspec__ip4_lookup__multicast__send += 1;
            return Some(MacAddr::from_multicast_ip4(dst));
        }
        if dst.is_limited_broadcast() {
            self.stats_tx
                .lock()
                .ether__dst_unspec__ip4_lookup__limited_broadcast__send += 1;
            return Some(MacAddr::BROADCAST);
        }
        let hosts = self.ctx.ip4_host.read().clone();
        if hosts
            .iter()
            .any(|host| host.network.broadcast() == dst)
        {
            self.stats_tx
                .lock()
                .ether__dst_unspec__ip4_lookup__network_broadcast__send += 1;
            return Some(MacAddr::BROADCAST);
        }
        if hosts.iter().any(|host| host.network.contains(dst)) {
            return match self.arp_cache.find(dst) {
                Some(mac) => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip4_lookup__locnet__arp_cache_hit__send += 1;
                    Some(mac)
                }
                None => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip4_lookup__locnet__arp_cache_miss__drop += 1;
                    debug!(%dst, "no arp resolution for on-link destination");
                    None
                }
            };
        }
        let gateway = hosts
            .iter()
            .find(|host| host.address == src)
            .and_then(|host| host.gateway);
        match gateway {
            Some(gateway) => match self.arp_cache.find(gateway) {
                Some(mac) => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip4_lookup__extnet__gw_arp_cache_hit__send += 1;
                    Some(mac)
                }
                None => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip4_lookup__extnet__gw_arp_cache_miss__drop += 1;
                    debug!(%dst, %gateway, "no arp resolution for gateway");
                    None
                }
            },
            None => {
                self.stats_tx
                    .lock()
                    .ether__dst_unspec__ip4_lookup__extnet__no_gw__drop += 1;
                debug!(%dst, "no gateway towards off-link destination");
                None
            }
        }
    }

    fn resolve_ip6_next_hop(&self, src: Ipv6Addr, dst: Ipv6Addr) -> Option<MacAddr> {
        self.stats_tx.lock().ether__dst_unspec__ip6_lookup += 1;

        if dst.is_multicast() {
            self.stats_tx
                .lock()
                .ether__dst_unspec__ip6_lookup__multicast__send += 1;
            return Some(MacAddr::from_multicast_ip6(dst));
        }
        let hosts = self.ctx.ip6_host.read().clone();
        if hosts.iter().any(|host| host.network.contains(dst)) {
            return match self.nd_cache.find(dst) {
                Some(mac) => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip6_lookup__locnet__nd_cache_hit__send += 1;
                    Some(mac)
                }
                None => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip6_lookup__locnet__nd_cache_miss__drop += 1;
                    debug!(%dst, "no nd resolution for on-link destination");
                    None
                }
            };
        }
        let gateway = hosts
            .iter()
            .find(|host| host.address == src)
            .and_then(|host| host.gateway);
        match gateway {
            Some(gateway) => match self.nd_cache.find(gateway) {
                Some(mac) => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip6_lookup__extnet__gw_nd_cache_hit__send += 1;
                    Some(mac)
                }
                None => {
                    self.stats_tx
                        .lock()
                        .ether__dst_unspec__ip6_lookup__extnet__gw_nd_cache_miss__drop += 1;
                    debug!(%dst, %gateway, "no nd resolution for gateway");
                    None
                }
            },
            None => {
                self.stats_tx
                    .lock()
                    .ether__dst_unspec__ip6_lookup__extnet__no_gw__drop += 1;
                debug!(%dst, "no gateway towards off-link destination");
                None
            }
        }
    }
}
