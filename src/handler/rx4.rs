//! Inbound IPv4: ownership checks, reassembly handoff, and dispatch to
//! ICMPv4, UDP, or TCP.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::addr::Ip4AddrExt;
use crate::reassembly::{FlowKey, FragmentOutcome};
use crate::sockets::{TcpEvent, UdpEvent};
use crate::tracker::Tracker;
use crate::wire::icmp4::{
    Icmp4Message, Icmp4Packet, Icmp4TxMessage, ICMP4_UNREACHABLE_PORT, ICMP4_UNREACHABLE_PROTOCOL,
};
use crate::wire::ip4::{Ip4Packet, IP4_HEADER_LEN};
use crate::wire::tcp::{TcpFlags, TcpPacket};
use crate::wire::udp::{UdpPacket, UDP_HEADER_LEN};
use crate::wire::{IP_PROTO_ICMP4, IP_PROTO_TCP, IP_PROTO_UDP};

use super::PacketHandler;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Ip4DstClass {
    Unicast,
    Broadcast,
    Multicast,
}

impl PacketHandler {
    pub(super) fn rx_ip4(&self, payload: &[u8], tracker: &Tracker) {
        self.stats_rx.lock().ip4__pre_parse += 1;
        let ip4 = match Ip4Packet::parse(payload) {
            Ok(ip4) => ip4,
            Err(reason) => {
                debug!(%tracker, %reason, "ipv4 parse failed");
                self.stats_rx.lock().ip4__failed_parse__drop += 1;
                return;
            }
        };

        let dst = ip4.dst();
        let class = if self.ctx.owns_ip4(dst) {
            self.stats_rx.lock().ip4__dst_unicast += 1;
            Ip4DstClass::Unicast
        } else if dst.is_limited_broadcast()
            || self
                .ctx
                .ip4_host
                .read()
                .iter()
                .any(|host| host.network.broadcast() == dst)
        {
            self.stats_rx.lock().ip4__dst_broadcast += 1;
            Ip4DstClass::Broadcast
        } else if dst.is_multicast() && self.ctx.joined_ip4_multicast(dst) {
            self.stats_rx.lock().ip4__dst_multicast += 1;
            Ip4DstClass::Multicast
        } else {
            debug!(%tracker, %dst, "ipv4 datagram for foreign destination dropped");
            self.stats_rx.lock().ip4__dst_unknown__drop += 1;
            return;
        };

        if ip4.flag_mf() || ip4.offset() > 0 {
            self.stats_rx.lock().ip4__frag += 1;
            let key = FlowKey {
                src: IpAddr::V4(ip4.src()),
                dst: IpAddr::V4(dst),
                id: u32::from(ip4.id()),
                next_proto: ip4.proto(),
            };
            match self
                .reassembly
                .push(key, ip4.offset(), ip4.payload(), !ip4.flag_mf())
            {
                FragmentOutcome::Complete(datagram) => {
                    self.stats_rx.lock().ip4__defrag += 1;
                    self.dispatch_ip4(
                        ip4.src(),
                        dst,
                        ip4.proto(),
                        &datagram,
                        None,
                        class,
                        tracker,
                    );
                }
                FragmentOutcome::Pending | FragmentOutcome::Rejected => {}
            }
            return;
        }

        // Quote for ICMP responses: the received header plus the leading
        // eight payload bytes.
        let quote_len = ip4.hlen() + ip4.payload().len().min(8);
        let quote = &payload[..quote_len];
        self.dispatch_ip4(
            ip4.src(),
            dst,
            ip4.proto(),
            ip4.payload(),
            Some(quote),
            class,
            tracker,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_ip4(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        proto: u8,
        payload: &[u8],
        quote: Option<&[u8]>,
        class: Ip4DstClass,
        tracker: &Tracker,
    ) {
        match proto {
            IP_PROTO_ICMP4 => self.rx_icmp4(src, dst, payload, tracker),
            IP_PROTO_UDP => self.rx_udp4(src, dst, payload, quote, class, tracker),
            IP_PROTO_TCP => self.rx_tcp4(src, dst, payload, class, tracker),
            proto => {
                if class == Ip4DstClass::Unicast {
                    if let Some(quote) = quote {
                        debug!(%tracker, proto, "unknown protocol, responding unreachable");
                        self.stats_rx.lock().ip4__proto_unknown__respond_unreachable += 1;
                        self.send_icmp4(
                            dst,
                            src,
                            Icmp4TxMessage::Unreachable {
                                code: ICMP4_UNREACHABLE_PROTOCOL,
                                data: quote.to_vec(),
                            },
                            Some(tracker),
                        );
                        return;
                    }
                }
                debug!(%tracker, proto, "unknown protocol dropped");
                self.stats_rx.lock().ip4__proto_unknown__drop += 1;
            }
        }
    }

    fn rx_icmp4(&self, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8], tracker: &Tracker) {
        self.stats_rx.lock().icmp4__pre_parse += 1;
        let icmp4 = match Icmp4Packet::parse(payload) {
            Ok(icmp4) => icmp4,
            Err(reason) => {
                debug!(%tracker, %reason, "icmpv4 parse failed");
                self.stats_rx.lock().icmp4__failed_parse__drop += 1;
                return;
            }
        };

        match icmp4.message() {
            Icmp4Message::EchoRequest { id, seq, data } => {
                debug!(%tracker, %src, id, seq, "echo request, responding");
                self.stats_rx.lock().icmp4__echo_request__respond_echo_reply += 1;
                self.send_icmp4(
                    dst,
                    src,
                    Icmp4TxMessage::EchoReply {
                        id: *id,
                        seq: *seq,
                        data: data.to_vec(),
                    },
                    Some(tracker),
                );
            }
            Icmp4Message::EchoReply { .. } => {
                self.stats_rx.lock().icmp4__echo_reply += 1;
            }
            Icmp4Message::Unreachable { code, data } => {
                debug!(%tracker, %src, code, "unreachable, matching embedded header");
                self.stats_rx.lock().icmp4__unreachable += 1;
                self.notify_udp4_unreachable(data);
            }
            Icmp4Message::Other { kind, code } => {
                debug!(%tracker, kind, code, "unhandled icmpv4 type");
                self.stats_rx.lock().icmp4__unknown__drop += 1;
            }
        }
    }

    /// The quoted datagram inside an Unreachable message is one this stack
    /// sent: its source is the local address, its destination the remote.
    /// Validate the embedded IPv4 + UDP headers and notify the socket.
    fn notify_udp4_unreachable(&self, data: &[u8]) {
        if data.len() < IP4_HEADER_LEN || data[0] >> 4 != 4 {
            return;
        }
        let hlen = usize::from(data[0] & 0x0f) * 4;
        if hlen < IP4_HEADER_LEN || data.len() < hlen + UDP_HEADER_LEN {
            return;
        }
        if data[9] != IP_PROTO_UDP {
            return;
        }
        let local_ip = IpAddr::V4(Ipv4Addr::new(data[12], data[13], data[14], data[15]));
        let remote_ip = IpAddr::V4(Ipv4Addr::new(data[16], data[17], data[18], data[19]));
        let local_port = u16::from_be_bytes([data[hlen], data[hlen + 1]]);
        let remote_port = u16::from_be_bytes([data[hlen + 2], data[hlen + 3]]);

        if let Some(socket) = self
            .sockets
            .lookup_udp(local_ip, local_port, remote_ip, remote_port)
        {
            debug!(%local_ip, local_port, %remote_ip, remote_port, "notifying udp socket unreachable");
            let _ = socket.send(UdpEvent::Unreachable);
        }
    }

    fn rx_udp4(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        payload: &[u8],
        quote: Option<&[u8]>,
        class: Ip4DstClass,
        tracker: &Tracker,
    ) {
        self.stats_rx.lock().udp__pre_parse += 1;
        let udp = match UdpPacket::parse_v4(payload, src, dst) {
            Ok(udp) => udp,
            Err(reason) => {
                debug!(%tracker, %reason, "udp parse failed");
                self.stats_rx.lock().udp__failed_parse__drop += 1;
                return;
            }
        };

        if let Some(socket) = self.sockets.lookup_udp(
            IpAddr::V4(dst),
            udp.dport(),
            IpAddr::V4(src),
            udp.sport(),
        ) {
            self.stats_rx.lock().udp__socket_match += 1;
            let _ = socket.send(UdpEvent::Datagram {
                local_ip: IpAddr::V4(dst),
                local_port: udp.dport(),
                remote_ip: IpAddr::V4(src),
                remote_port: udp.sport(),
                payload: udp.payload().to_vec(),
            });
            return;
        }

        if class == Ip4DstClass::Unicast {
            if let Some(quote) = quote {
                debug!(%tracker, dport = udp.dport(), "no udp socket, responding port unreachable");
                self.stats_rx.lock().udp__no_socket_match__respond_unreachable += 1;
                self.send_icmp4(
                    dst,
                    src,
                    Icmp4TxMessage::Unreachable {
                        code: ICMP4_UNREACHABLE_PORT,
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

    fn rx_tcp4(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        payload: &[u8],
        class: Ip4DstClass,
        tracker: &Tracker,
    ) {
        self.stats_rx.lock().tcp__pre_parse += 1;
        let tcp = match TcpPacket::parse_v4(payload, src, dst) {
            Ok(tcp) => tcp,
            Err(reason) => {
                debug!(%tracker, %reason, "tcp parse failed");
                self.stats_rx.lock().tcp__failed_parse__drop += 1;
                return;
            }
        };

        if let Some(socket) = self.sockets.lookup_tcp(
            IpAddr::V4(dst),
            tcp.dport(),
            IpAddr::V4(src),
            tcp.sport(),
        ) {
            self.stats_rx.lock().tcp__socket_match += 1;
            let _ = socket.send(TcpEvent::Segment {
                local_ip: IpAddr::V4(dst),
                local_port: tcp.dport(),
                remote_ip: IpAddr::V4(src),
                remote_port: tcp.sport(),
                seq: tcp.seq(),
                ack: tcp.ack(),
                flags: tcp.flags(),
                win: tcp.win(),
                payload: tcp.payload().to_vec(),
            });
            return;
        }

        if !tcp.flags().contains(TcpFlags::RST) && class == Ip4DstClass::Unicast {
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
                IpAddr::V4(dst),
                IpAddr::V4(src),
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
