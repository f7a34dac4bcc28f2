//! Inbound IPv6: ownership checks, extension-header walk, reassembly, and
//! dispatch to ICMPv6 (including Neighbor Discovery), UDP, or TCP.

use std::net::{IpAddr, Ipv6Addr};

use tracing::debug;

use crate::reassembly::{FlowKey, FragmentOutcome};
use crate::sockets::{TcpEvent, UdpEvent};
use crate::tracker::Tracker;
use crate::wire::icmp6::{
    Icmp6Message, Icmp6Packet, Icmp6TxMessage, NdOption, ICMP6_UNREACHABLE_PORT,
};
use crate::wire::ip6::{skip_ext_headers, Ip6ExtFrag, Ip6Packet, IP6_HEADER_LEN};
use crate::wire::tcp::{TcpFlags, TcpPacket};
use crate::wire::udp::{UdpPacket, UDP_HEADER_LEN};
use crate::wire::{IP6_EXT_FRAG, IP_PROTO_ICMP6, IP_PROTO_TCP, IP_PROTO_UDP};

use super::PacketHandler;

const ND_HOP_LIMIT: u8 = 255;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Ip6DstClass {
    Unicast,
    Multicast,
}

impl PacketHandler {
    pub(super) fn rx_ip6(&self, payload: &[u8], tracker: &Tracker) {
        self.stats_rx.lock().ip6__pre_parse += 1;
        let ip6 = match Ip6Packet::parse(payload) {
            Ok(ip6) => ip6,
            Err(reason) => {
                debug!(%tracker, %reason, "ipv6 parse failed");
                self.stats_rx.lock().ip6__failed_parse__drop += 1;
                return;
            }
        };

        let dst = ip6.dst();
        let class = if self.ctx.owns_ip6(dst) {
            self.stats_rx.lock().ip6__dst_unicast += 1;
            Ip6DstClass::Unicast
        } else if dst.is_multicast() && self.ctx.joined_ip6_multicast(dst) {
            self.stats_rx.lock().ip6__dst_multicast += 1;
            Ip6DstClass::Multicast
        } else {
            debug!(%tracker, %dst, "ipv6 datagram for foreign destination dropped");
            self.stats_rx.lock().ip6__dst_unknown__drop += 1;
            return;
        };

        let (next, offset) = match skip_ext_headers(ip6.next(), ip6.payload()) {
            Ok(walk) => walk,
            Err(reason) => {
                debug!(%tracker, %reason, "ipv6 extension walk failed");
                self.stats_rx.lock().ip6__failed_parse__drop += 1;
                return;
            }
        };

        if next == IP6_EXT_FRAG {
            self.rx_ip6_ext_frag(&ip6, &ip6.payload()[offset..], class, tracker);
            return;
        }

        // Quote for ICMP responses: the received headers plus the leading
        // eight payload bytes.
        let quote_len = (IP6_HEADER_LEN + ip6.plen()).min(IP6_HEADER_LEN + offset + 8);
        let quote = &payload[..quote_len];
        self.dispatch_ip6(
            ip6.src(),
            dst,
            next,
            &ip6.payload()[offset..],
            Some(quote),
            class,
            tracker,
        );
    }

    fn rx_ip6_ext_frag(
        &self,
        ip6: &Ip6Packet<'_>,
        bytes: &[u8],
        class: Ip6DstClass,
        tracker: &Tracker,
    ) {
        self.stats_rx.lock().ip6_ext_frag__pre_parse += 1;
        let frag = match Ip6ExtFrag::parse(bytes) {
            Ok(frag) => frag,
            Err(reason) => {
                debug!(%tracker, %reason, "ipv6 fragment extension parse failed");
                self.stats_rx.lock().ip6_ext_frag__failed_parse__drop += 1;
                return;
            }
        };

        let key = FlowKey {
            src: IpAddr::V6(ip6.src()),
            dst: IpAddr::V6(ip6.dst()),
            id: frag.id(),
            next_proto: frag.next(),
        };
        match self
            .reassembly
            .push(key, frag.offset(), frag.payload(), !frag.flag_mf())
        {
            FragmentOutcome::Complete(datagram) => {
                self.stats_rx.lock().ip6_ext_frag__defrag += 1;
                self.dispatch_ip6(
                    ip6.src(),
                    ip6.dst(),
                    frag.next(),
                    &datagram,
                    None,
                    class,
                    tracker,
                );
            }
            FragmentOutcome::Pending | FragmentOutcome::Rejected => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_ip6(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        next: u8,
        payload: &[u8],
        quote: Option<&[u8]>,
        class: Ip6DstClass,
        tracker: &Tracker,
    ) {
        match next {
            IP_PROTO_ICMP6 => self.rx_icmp6(src, dst, payload, tracker),
            IP_PROTO_UDP => self.rx_udp6(src, dst, payload, quote, class, tracker),
            IP_PROTO_TCP => self.rx_tcp6(src, dst, payload, class, tracker),
            next => {
                debug!(%tracker, next, "unknown next header dropped");
                self.stats_rx.lock().ip6__ext_unknown__drop += 1;
            }
        }
    }

    fn rx_icmp6(&self, src: Ipv6Addr, dst: Ipv6Addr, payload: &[u8], tracker: &Tracker) {
        self.stats_rx.lock().icmp6__pre_parse += 1;
        let icmp6 = match Icmp6Packet::parse(payload, src, dst) {
            Ok(icmp6) => icmp6,
            Err(reason) => {
                debug!(%tracker, %reason, "icmpv6 parse failed");
                self.stats_rx.lock().icmp6__failed_parse__drop += 1;
                return;
            }
        };

        match icmp6.message() {
            Icmp6Message::EchoRequest { id, seq, data } => {
                debug!(%tracker, %src, id, seq, "echo request, responding");
                self.stats_rx.lock().icmp6__echo_request__respond_echo_reply += 1;
                self.send_icmp6(
                    dst,
                    src,
                    64,
                    Icmp6TxMessage::EchoReply {
                        id: *id,
                        seq: *seq,
                        data: data.to_vec(),
                    },
                    Some(tracker),
                );
            }
            Icmp6Message::EchoReply { .. } => {
                self.stats_rx.lock().icmp6__echo_reply += 1;
            }
            Icmp6Message::Unreachable { code, data } => {
                debug!(%tracker, %src, code, "unreachable, matching embedded header");
                self.stats_rx.lock().icmp6__unreachable += 1;
                self.notify_udp6_unreachable(data);
            }
            Icmp6Message::RouterSolicitation { options } => {
                self.stats_rx.lock().icmp6__nd_router_solicitation += 1;
                self.learn_nd_source(src, options);
            }
            Icmp6Message::RouterAdvertisement { options, .. } => {
                self.stats_rx.lock().icmp6__nd_router_advertisement += 1;
                self.learn_nd_source(src, options);
            }
            Icmp6Message::NeighborSolicitation { target, options } => {
                self.stats_rx.lock().icmp6__nd_neighbor_solicitation += 1;
                if !src.is_unspecified() {
                    if let Some(mac) = slla_of(options) {
                        self.nd_cache.insert(src, mac);
                        self.stats_rx
                            .lock()
                            .icmp6__nd_neighbor_solicitation__update_cache += 1;
                    }
                }
                if self.ctx.owns_ip6(*target) {
                    debug!(%tracker, %src, %target, "neighbor solicitation for owned address, advertising");
                    self.stats_rx
                        .lock()
                        .icmp6__nd_neighbor_solicitation__target_stack__respond += 1;
                    // A solicitation from the unspecified address (duplicate
                    // address detection) is answered to all-nodes.
                    let (reply_dst, solicited) = if src.is_unspecified() {
                        (Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1), false)
                    } else {
                        (src, true)
                    };
                    self.send_icmp6(
                        *target,
                        reply_dst,
                        ND_HOP_LIMIT,
                        Icmp6TxMessage::NeighborAdvertisement {
                            flag_r: false,
                            flag_s: solicited,
                            flag_o: true,
                            target: *target,
                            options: vec![NdOption::TargetLinkLayerAddress(self.ctx.mac_unicast)],
                        },
                        Some(tracker),
                    );
                }
            }
            Icmp6Message::NeighborAdvertisement {
                target, options, ..
            } => {
                self.stats_rx.lock().icmp6__nd_neighbor_advertisement += 1;
                if let Some(mac) = tlla_of(options) {
                    self.nd_cache.insert(*target, mac);
                    self.stats_rx
                        .lock()
                        .icmp6__nd_neighbor_advertisement__update_cache += 1;
                }
            }
            Icmp6Message::Redirect { .. } => {
                self.stats_rx.lock().icmp6__nd_redirect += 1;
            }
            Icmp6Message::Other { kind, code } => {
                debug!(%tracker, kind, code, "unhandled icmpv6 type");
                self.stats_rx.lock().icmp6__unknown__drop += 1;
            }
        }
    }

    fn learn_nd_source(&self, src: Ipv6Addr, options: &[NdOption]) {
        if src.is_unspecified() {
            return;
        }
        if let Some(mac) = slla_of(options) {
            self.nd_cache.insert(src, mac);
        }
    }

    fn notify_udp6_unreachable(&self, data: &[u8]) {
        if data.len() < IP6_HEADER_LEN + UDP_HEADER_LEN || data[0] >> 4 != 6 {
            return;
        }
        if data[6] != IP_PROTO_UDP {
            return;
        }
        let mut local = [0u8; 16];
        local.copy_from_slice(&data[8..24]);
        let mut remote = [0u8; 16];
        remote.copy_from_slice(&data[24..40]);
        let local_ip = IpAddr::V6(Ipv6Addr::from(local));
        let remote_ip = IpAddr::V6(Ipv6Addr::from(remote));
        let local_port = u16::from_be_bytes([data[IP6_HEADER_LEN], data[IP6_HEADER_LEN + 1]]);
        let remote_port = u16::from_be_bytes([data[IP6_HEADER_LEN + 2], data[IP6_HEADER_LEN + 3]]);

        if let Some(socket) = self
            .sockets
            .lookup_udp(local_ip, local_port, remote_ip, remote_port)
        {
            debug!(%local_ip, local_port, %remote_ip, remote_port, "notifying udp socket unreachable");
            let _ = socket.send(UdpEvent::Unreachable);
        }
    }

    fn rx_udp6(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        payload: &[u8],
        quote: Option<&[u8]>,
        class: Ip6DstClass,
        tracker: &Tracker,
    ) {
        self.stats_rx.lock().udp__pre_parse += 1;
        let udp = match UdpPacket::parse_v6(payload, src, dst) {
            Ok(udp) => udp,
            Err(reason) => {
                debug!(%tracker, %reason, "udp parse failed");
                self.stats_rx.lock().udp__failed_parse__drop += 1;
                return;
            }
        };

        if let Some(socket) = self.sockets.lookup_udp(
            IpAddr::V6(dst),
            udp.dport(),
            IpAddr::V6(src),
            udp.sport(),
        ) {
            self.stats_rx.lock().udp__socket_match += 1;
            let _ = socket.send(UdpEvent::Datagram {
                local_ip: IpAddr::V6(dst),
                local_port: udp.dport(),
                remote_ip: IpAddr::V6(src),
                remote_port: udp.sport(),
                payload: udp.payload().to_vec(),
            });
            return;
        }

        if class == Ip6DstClass::Unicast {
            if let Some(quote) = quote {
                debug!(%tracker, dport = udp.dport(), "no udp socket, responding port unreachable");
                self.stats_rx.lock().udp__no_socket_match__respond_unreachable += 1;
                self.send_icmp6(
                    dst,
                    src,
                    64,
                    Icmp6TxMessage::Unreachable {
                        code: ICMP6_UNREACHABLE_PORT,
                        data: quote.to_vec(),
                    },
                    Some(tracker),
                );
                return;
            }
        }
        debug!(%tracker, dport = udp.dport(), "no udp socket, dropping");
        self.stats_rx.lock().udp__no_socket_match__drop += 1;
    }

    fn rx_tcp6(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        payload: &[u8],
        class: Ip6DstClass,
        tracker: &Tracker,
    ) {
        self.stats_rx.lock().tcp__pre_parse += 1;
        let tcp = match TcpPacket::parse_v6(payload, src, dst) {
            Ok(tcp) => tcp,
            Err(reason) => {
                debug!(%tracker, %reason, "tcp parse failed");
                self.stats_rx.lock().tcp__failed_parse__drop += 1;
                return;
            }
        };

        if let Some(socket) = self.sockets.lookup_tcp(
            IpAddr::V6(dst),
            tcp.dport(),
            IpAddr::V6(src),
            tcp.sport(),
        ) {
            self.stats_rx.lock().tcp__socket_match += 1;
            let _ = socket.send(TcpEvent::Segment {
                local_ip: IpAddr::V6(dst),
                local_port: tcp.dport(),
                remote_ip: IpAddr::V6(src),
                remote_port: tcp.sport(),
                seq: tcp.seq(),
                ack: tcp.ack(),
                flags: tcp.flags(),
                win: tcp.win(),
                payload: tcp.payload().to_vec(),
            });
            return;
        }

        if !tcp.flags().contains(TcpFlags::RST) && class == Ip6DstClass::Unicast {
            debug!(%tracker, dport = tcp.dport(), "no tcp socket, responding rst");
            self.stats_rx.lock().tcp__no_socket_match__respond_rst += 1;
            let (seq, flags) = if tcp.flags().contains(TcpFlags::ACK) {
                (tcp.ack(), TcpFlags::RST)
            } else {
                (0, TcpFlags::RST | TcpFlags::ACK)
            };
            let ack = tcp
                .seq()
                .wrapping_add(tcp.payload().len() as u32)
                .wrapping_add(u32::from(tcp.flags().contains(TcpFlags::SYN)))
                .wrapping_add(u32::from(tcp.flags().contains(TcpFlags::FIN)));
            self.send_tcp(
                IpAddr::V6(dst),
                IpAddr::V6(src),
                tcp.dport(),
                tcp.sport(),
                seq,
                ack,
                flags,
                0,
                Vec::new(),
                Some(tracker),
            );
            return;
        }
        self.stats_rx.lock().tcp__no_socket_match__drop += 1;
    }
}

fn slla_of(options: &[NdOption]) -> Option<crate::addr::MacAddr> {
    options.iter().find_map(|option| match option {
        NdOption::SourceLinkLayerAddress(mac) => Some(*mac),
        _ => None,
    })
}

fn tlla_of(options: &[NdOption]) -> Option<crate::addr::MacAddr> {
    options.iter().find_map(|option| match option {
        NdOption::TargetLinkLayerAddress(mac) => Some(*mac),
        _ => None,
    })
}
