//! End-to-end tests for the packet handler over a fixed mock network.
//!
//! The mock network: the stack owns 192.168.9.7/24 (gateway 192.168.9.1)
//! and 2001:db8:0:96::7/64 (gateway fe80::1) plus a link-local address.
//! Host A lives on-link for both families and is pre-resolved in the
//! caches, as is the gateway. Host B is an on-link address the stack does
//! not own; host C is off-link behind the gateway.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crossbeam_channel::Receiver;
use pretty_assertions::assert_eq;

use crate::addr::{Ip4Host, Ip6Host, MacAddr};
use crate::config::StackConfig;
use crate::device::TxRing;
use crate::sockets::{SocketKey, TcpEvent, UdpEvent};
use crate::stats::{PacketStatsRx, PacketStatsTx};
use crate::status::TxStatus;
use crate::tracker::{Direction, Tracker};
use crate::wire::arp::{ArpAssembler, ArpOperation, ArpPacket};
use crate::wire::ether::{EtherAssembler, EtherFrame, ETHER_TYPE_ARP, ETHER_TYPE_IP4, ETHER_TYPE_IP6};
use crate::wire::icmp4::{Icmp4Assembler, Icmp4Message, Icmp4Packet, Icmp4TxMessage};
use crate::wire::icmp6::{Icmp6Assembler, Icmp6Message, Icmp6Packet, Icmp6TxMessage, NdOption};
use crate::wire::ip4::{Ip4Assembler, Ip4Packet, IP4_DEFAULT_TTL, IP4_HEADER_LEN};
use crate::wire::ip6::{Ip6Assembler, Ip6ExtFrag, Ip6Packet};
use crate::wire::tcp::{TcpAssembler, TcpFlags, TcpPacket};
use crate::wire::udp::UdpAssembler;
use crate::wire::{
    IpPayload, RawAssembler, IP6_EXT_FRAG, IP_PROTO_ICMP4, IP_PROTO_RAW, IP_PROTO_TCP,
    IP_PROTO_UDP,
};

use super::PacketHandler;

struct MockNet {
    handler: PacketHandler,
    frames: Receiver<Vec<u8>>,
    stack_mac: MacAddr,
    host_a_mac: MacAddr,
    gateway_mac: MacAddr,
    stack_ip4: Ipv4Addr,
    host_a_ip4: Ipv4Addr,
    host_b_ip4: Ipv4Addr,
    host_c_ip4: Ipv4Addr,
    gateway_ip4: Ipv4Addr,
    stack_ip6: Ipv6Addr,
    host_a_ip6: Ipv6Addr,
    host_b_ip6: Ipv6Addr,
    host_c_ip6: Ipv6Addr,
    gateway_ip6: Ipv6Addr,
}

fn mns() -> MockNet {
    let stack_mac: MacAddr = "02:00:00:77:77:77".parse().unwrap();
    let host_a_mac: MacAddr = "52:54:00:70:7b:2b".parse().unwrap();
    let gateway_mac: MacAddr = "52:54:00:11:22:33".parse().unwrap();

    let stack_ip4 = Ipv4Addr::new(192, 168, 9, 7);
    let gateway_ip4 = Ipv4Addr::new(192, 168, 9, 1);
    let stack_ip6: Ipv6Addr = "2001:db8:0:96::7".parse().unwrap();
    let gateway_ip6: Ipv6Addr = "fe80::1".parse().unwrap();

    let config = StackConfig {
        mac_address: stack_mac,
        ip4_host: vec![Ip4Host::new(stack_ip4, 24, Some(gateway_ip4))],
        ip6_host: vec![
            Ip6Host::new(stack_ip6, 64, Some(gateway_ip6)),
            Ip6Host::new("fe80::7".parse().unwrap(), 64, None),
        ],
        ..Default::default()
    };

    let (ring, frames) = TxRing::new();
    let handler = PacketHandler::new(&config, ring);

    let net = MockNet {
        handler,
        frames,
        stack_mac,
        host_a_mac,
        gateway_mac,
        stack_ip4,
        host_a_ip4: Ipv4Addr::new(192, 168, 9, 102),
        host_b_ip4: Ipv4Addr::new(192, 168, 9, 103),
        host_c_ip4: Ipv4Addr::new(10, 0, 45, 91),
        gateway_ip4,
        stack_ip6,
        host_a_ip6: "2001:db8:0:96::102".parse().unwrap(),
        host_b_ip6: "2001:db8:0:96::103".parse().unwrap(),
        host_c_ip6: "2001:db8:0:56::91".parse().unwrap(),
        gateway_ip6,
    };

    net.handler.arp_cache().insert(net.host_a_ip4, host_a_mac);
    net.handler.arp_cache().insert(net.gateway_ip4, gateway_mac);
    net.handler.nd_cache().insert(net.host_a_ip6, host_a_mac);
    net.handler.nd_cache().insert(net.gateway_ip6, gateway_mac);
    net
}

fn raw_payload(data: &[u8]) -> IpPayload {
    IpPayload::Raw(RawAssembler::new(
        data.to_vec(),
        Tracker::new(Direction::Tx),
    ))
}

#[test]
fn ip4_to_unicast_on_local_network_with_valid_source() {
    let mns = mns();
    let status = mns
        .handler
        .tx_ip4(mns.stack_ip4, mns.host_a_ip4, raw_payload(&[]), false);

    assert_eq!(status, TxStatus::PassedEtherToTxRing);
    assert_eq!(status.to_string(), "PASSED__ETHER__TO_TX_RING");
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__mtu_ok__send: 1,
            ether__pre_assemble: 1,
            ether__src_unspec__fill: 1,
            ether__dst_unspec__ip4_lookup: 1,
            ether__dst_unspec__ip4_lookup__locnet__arp_cache_hit__send: 1,
            ..Default::default()
        }
    );

    let frame = mns.frames.try_recv().unwrap();
    let expected: Vec<u8> = vec![
        // ethernet: host A <- stack, ipv4
        0x52, 0x54, 0x00, 0x70, 0x7b, 0x2b, 0x02, 0x00, 0x00, 0x77, 0x77, 0x77, 0x08, 0x00,
        // ipv4: 192.168.9.7 -> 192.168.9.102, raw, empty payload
        0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0xff, 0xda, 0x2d, 0xc0, 0xa8,
        0x09, 0x07, 0xc0, 0xa8, 0x09, 0x66,
    ];
    assert_eq!(frame, expected);
}

#[test]
fn ip4_source_not_owned_is_dropped() {
    let mns = mns();
    let status = mns
        .handler
        .tx_ip4(mns.host_b_ip4, mns.host_a_ip4, raw_payload(&[]), false);

    assert_eq!(status, TxStatus::DropedIp4SrcNotOwned);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__src_not_owned__drop: 1,
            ..Default::default()
        }
    );
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn ip4_multicast_source_is_replaced() {
    let mns = mns();
    let status = mns.handler.tx_ip4(
        Ipv4Addr::new(224, 0, 0, 1),
        mns.host_a_ip4,
        raw_payload(&[]),
        false,
    );

    assert_eq!(status, TxStatus::PassedEtherToTxRing);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__src_multicast__replace: 1,
            ip4__mtu_ok__send: 1,
            ether__pre_assemble: 1,
            ether__src_unspec__fill: 1,
            ether__dst_unspec__ip4_lookup: 1,
            ether__dst_unspec__ip4_lookup__locnet__arp_cache_hit__send: 1,
            ..Default::default()
        }
    );
    let frame = mns.frames.try_recv().unwrap();
    let ip4 = Ip4Packet::parse(&frame[14..]).unwrap();
    assert_eq!(ip4.src(), mns.stack_ip4);
}

#[test]
fn ip4_limited_broadcast_source_drop_without_hosts() {
    let mns = mns();
    mns.handler.ctx().ip4_host.write().clear();
    let status = mns.handler.tx_ip4(
        Ipv4Addr::new(255, 255, 255, 255),
        mns.host_a_ip4,
        raw_payload(&[]),
        false,
    );

    assert_eq!(status, TxStatus::DropedIp4SrcLimitedBroadcast);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__src_limited_broadcast__drop: 1,
            ..Default::default()
        }
    );
}

#[test]
fn ip4_arp_cache_miss_drops_and_solicits() {
    let mns = mns();
    let status = mns
        .handler
        .tx_ip4(mns.stack_ip4, mns.host_b_ip4, raw_payload(&[]), false);

    assert_eq!(status, TxStatus::DropedEtherDstResolutionFail);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__mtu_ok__send: 1,
            ether__pre_assemble: 1,
            ether__src_unspec__fill: 1,
            ether__dst_unspec__ip4_lookup: 1,
            ether__dst_unspec__ip4_lookup__locnet__arp_cache_miss__drop: 1,
            ..Default::default()
        }
    );
    // The dropped packet still produced a solicitation on a distinct path.
    let frame = mns.frames.try_recv().unwrap();
    let ether = EtherFrame::parse(&frame).unwrap();
    assert_eq!(ether.ethertype(), ETHER_TYPE_ARP);
    assert!(ether.dst().is_broadcast());
    let arp = ArpPacket::parse(ether.payload()).unwrap();
    assert_eq!(arp.tpa(), mns.host_b_ip4);
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn ip6_nd_cache_miss_drops_and_solicits() {
    let mns = mns();
    let status = mns
        .handler
        .tx_ip6(mns.stack_ip6, mns.host_b_ip6, raw_payload(&[]));

    assert_eq!(status, TxStatus::DropedEtherDstResolutionFail);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip6__pre_assemble: 1,
            ip6__mtu_ok__send: 1,
            ether__pre_assemble: 1,
            ether__src_unspec__fill: 1,
            ether__dst_unspec__ip6_lookup: 1,
            ether__dst_unspec__ip6_lookup__locnet__nd_cache_miss__drop: 1,
            ..Default::default()
        }
    );
    // A neighbor solicitation went out on the direct path.
    let frame = mns.frames.try_recv().unwrap();
    let ether = EtherFrame::parse(&frame).unwrap();
    assert_eq!(ether.ethertype(), ETHER_TYPE_IP6);
    let ip6 = Ip6Packet::parse(ether.payload()).unwrap();
    let icmp = Icmp6Packet::parse(ip6.payload(), ip6.src(), ip6.dst()).unwrap();
    match icmp.message() {
        Icmp6Message::NeighborSolicitation { target, .. } => {
            assert_eq!(*target, mns.host_b_ip6);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn ip6_unspecified_source_replaced_external_via_gateway() {
    let mns = mns();
    let status = mns.handler.tx_ip6(
        Ipv6Addr::UNSPECIFIED,
        mns.host_c_ip6,
        raw_payload(&[]),
    );

    assert_eq!(status, TxStatus::PassedEtherToTxRing);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip6__pre_assemble: 1,
            ip6__src_network_unspecified__replace_external: 1,
            ip6__mtu_ok__send: 1,
            ether__pre_assemble: 1,
            ether__src_unspec__fill: 1,
            ether__dst_unspec__ip6_lookup: 1,
            ether__dst_unspec__ip6_lookup__extnet__gw_nd_cache_hit__send: 1,
            ..Default::default()
        }
    );
    let frame = mns.frames.try_recv().unwrap();
    let ether = EtherFrame::parse(&frame).unwrap();
    assert_eq!(ether.dst(), mns.gateway_mac);
    let ip6 = Ip6Packet::parse(ether.payload()).unwrap();
    assert_eq!(ip6.src(), mns.stack_ip6);
}

#[test]
fn ip6_unspecified_source_without_gateway_is_dropped() {
    let mns = mns();
    for host in mns.handler.ctx().ip6_host.write().iter_mut() {
        host.gateway = None;
    }
    let status = mns.handler.tx_ip6(
        Ipv6Addr::UNSPECIFIED,
        mns.host_c_ip6,
        raw_payload(&[]),
    );

    assert_eq!(status, TxStatus::DropedIp6SrcUnspecified);
    assert_eq!(status.to_string(), "DROPED__IP6__SRC_UNSPECIFIED");
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip6__pre_assemble: 1,
            ip6__src_unspecified__drop: 1,
            ..Default::default()
        }
    );
}

#[test]
fn ip6_unspecified_destination_is_dropped() {
    let mns = mns();
    let status = mns
        .handler
        .tx_ip6(mns.stack_ip6, Ipv6Addr::UNSPECIFIED, raw_payload(&[]));

    assert_eq!(status, TxStatus::DropedIp6DstUnspecified);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip6__pre_assemble: 1,
            ip6__dst_unspecified__drop: 1,
            ..Default::default()
        }
    );
}

#[test]
fn ip6_oversized_datagram_fragments_into_five_pieces() {
    let mns = mns();
    let payload: Vec<u8> = b"01234567890ABCDEF".repeat(400);
    assert_eq!(payload.len(), 6800);

    let status = mns
        .handler
        .tx_ip6(mns.stack_ip6, mns.host_a_ip6, raw_payload(&payload));

    assert_eq!(status, TxStatus::PassedEtherToTxRing);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip6__pre_assemble: 6, // the original datagram plus 5 fragments
            ip6__mtu_exceed__frag: 1,
            ip6__mtu_ok__send: 5,
            ip6_ext_frag__pre_assemble: 1,
            ip6_ext_frag__send: 5,
            ether__pre_assemble: 5,
            ether__src_unspec__fill: 5,
            ether__dst_unspec__ip6_lookup: 5,
            ether__dst_unspec__ip6_lookup__locnet__nd_cache_hit__send: 5,
            ..Default::default()
        }
    );

    // MTU 1500 leaves 1452 bytes past the base + fragment headers, rounded
    // down to 1448 on the 8-byte boundary.
    let expected_offsets = [0usize, 1448, 2896, 4344, 5792];
    let mut reassembled = vec![0u8; payload.len()];
    let mut shared_id = None;
    for (index, expected_offset) in expected_offsets.iter().enumerate() {
        let frame = mns.frames.try_recv().expect("fragment frame");
        let ether = EtherFrame::parse(&frame).unwrap();
        assert_eq!(ether.dst(), mns.host_a_mac);
        assert_eq!(ether.src(), mns.stack_mac);
        assert_eq!(ether.ethertype(), ETHER_TYPE_IP6);

        let ip6 = Ip6Packet::parse(ether.payload()).unwrap();
        assert_eq!(ip6.next(), IP6_EXT_FRAG);
        assert_eq!(ip6.src(), mns.stack_ip6);
        assert_eq!(ip6.dst(), mns.host_a_ip6);

        let frag = Ip6ExtFrag::parse(ip6.payload()).unwrap();
        assert_eq!(frag.next(), IP_PROTO_RAW);
        assert_eq!(frag.offset(), *expected_offset);
        assert_eq!(frag.flag_mf(), index != 4);
        match shared_id {
            None => shared_id = Some(frag.id()),
            Some(id) => assert_eq!(frag.id(), id),
        }
        let data = frag.payload();
        assert_eq!(data.len(), if index != 4 { 1448 } else { 1008 });
        reassembled[*expected_offset..*expected_offset + data.len()].copy_from_slice(data);
    }
    assert_eq!(reassembled, payload);
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn ip4_oversized_datagram_fragments_and_counts_each_piece() {
    let mns = mns();
    let payload: Vec<u8> = b"01234567890ABCDEF".repeat(400);

    let status = mns
        .handler
        .tx_ip4(mns.stack_ip4, mns.host_a_ip4, raw_payload(&payload), false);

    assert_eq!(status, TxStatus::PassedEtherToTxRing);
    // MTU 1500 minus the 20-byte header leaves 1480 per fragment:
    // 4 * 1480 + 880 = 6800.
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 6,
            ip4__mtu_exceed__frag: 1,
            ip4__mtu_ok__send: 5,
            ether__pre_assemble: 5,
            ether__src_unspec__fill: 5,
            ether__dst_unspec__ip4_lookup: 5,
            ether__dst_unspec__ip4_lookup__locnet__arp_cache_hit__send: 5,
            ..Default::default()
        }
    );

    let mut reassembled = vec![0u8; payload.len()];
    let mut shared_id = None;
    let mut last_seen = false;
    while let Ok(frame) = mns.frames.try_recv() {
        let ip4 = Ip4Packet::parse(&frame[14..]).unwrap();
        match shared_id {
            None => shared_id = Some(ip4.id()),
            Some(id) => assert_eq!(ip4.id(), id),
        }
        if !ip4.flag_mf() {
            last_seen = true;
        }
        let offset = ip4.offset();
        reassembled[offset..offset + ip4.payload().len()].copy_from_slice(ip4.payload());
    }
    assert!(last_seen);
    assert_eq!(reassembled, payload);
}

#[test]
fn ip4_df_set_oversized_datagram_is_dropped() {
    let mns = mns();
    let payload = vec![0u8; 2000];
    let status = mns
        .handler
        .tx_ip4(mns.stack_ip4, mns.host_a_ip4, raw_payload(&payload), true);

    assert_eq!(status, TxStatus::DropedIp4MtuExceeded);
    assert_eq!(
        mns.handler.stats_tx(),
        PacketStatsTx {
            ip4__pre_assemble: 1,
            ip4__mtu_exceed_df_set__drop: 1,
            ..Default::default()
        }
    );
    assert!(mns.frames.try_recv().is_err());
}

fn echo_request_frame(mns: &MockNet, id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let tracker = Tracker::new(Direction::Tx);
    let icmp = Icmp4Assembler {
        message: Icmp4TxMessage::EchoRequest {
            id,
            seq,
            data: data.to_vec(),
        },
        tracker: tracker.clone(),
    };
    let ip4 = Ip4Assembler {
        id: 0x2000,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_ICMP4,
        src: mns.host_a_ip4,
        dst: mns.stack_ip4,
        payload: icmp.emit(),
        tracker: tracker.clone(),
    };
    EtherAssembler {
        dst: mns.stack_mac,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP4,
        payload: ip4.emit(),
        tracker,
    }
    .emit()
}

#[test]
fn inbound_echo_request_produces_echo_reply() {
    let mns = mns();
    let frame = echo_request_frame(&mns, 0xbeef, 7, b"hello stack");
    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            icmp4__pre_parse: 1,
            icmp4__echo_request__respond_echo_reply: 1,
            ..Default::default()
        }
    );

    let reply = mns.frames.try_recv().expect("echo reply frame");
    let ether = EtherFrame::parse(&reply).unwrap();
    assert_eq!(ether.dst(), mns.host_a_mac);
    let ip4 = Ip4Packet::parse(ether.payload()).unwrap();
    assert_eq!(ip4.src(), mns.stack_ip4);
    assert_eq!(ip4.dst(), mns.host_a_ip4);
    let icmp = Icmp4Packet::parse(ip4.payload()).unwrap();
    assert_eq!(
        *icmp.message(),
        Icmp4Message::EchoReply {
            id: 0xbeef,
            seq: 7,
            data: b"hello stack",
        }
    );
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn inbound_unreachable_notifies_matching_udp_socket() {
    let mns = mns();
    let local_port = 33_445;
    let remote_port = 65_000;
    let events = mns.handler.sockets().bind_udp(SocketKey::new(
        IpAddr::V4(mns.stack_ip4),
        local_port,
        IpAddr::V4(mns.host_c_ip4),
        remote_port,
    ));

    // The quoted datagram is one the stack sent towards host C.
    let tracker = Tracker::new(Direction::Tx);
    let udp = UdpAssembler {
        sport: local_port,
        dport: remote_port,
        payload: b"probe".to_vec(),
        tracker: tracker.clone(),
    };
    let embedded = Ip4Assembler {
        id: 0,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_UDP,
        src: mns.stack_ip4,
        dst: mns.host_c_ip4,
        payload: udp.emit_v4(mns.stack_ip4, mns.host_c_ip4),
        tracker: tracker.clone(),
    }
    .emit();

    let icmp = Icmp4Assembler {
        message: Icmp4TxMessage::Unreachable {
            code: 3,
            data: embedded[..IP4_HEADER_LEN + 8].to_vec(),
        },
        tracker: tracker.clone(),
    };
    let ip4 = Ip4Assembler {
        id: 0x2001,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_ICMP4,
        src: mns.gateway_ip4,
        dst: mns.stack_ip4,
        payload: icmp.emit(),
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: mns.stack_mac,
        src: mns.gateway_mac,
        ethertype: ETHER_TYPE_IP4,
        payload: ip4.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(events.try_recv().unwrap(), UdpEvent::Unreachable);
    assert!(mns.frames.try_recv().is_err(), "no frame is emitted");
    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            icmp4__pre_parse: 1,
            icmp4__unreachable: 1,
            ..Default::default()
        }
    );
}

#[test]
fn inbound_arp_request_for_owned_address_is_answered() {
    let mns = mns();
    let tracker = Tracker::new(Direction::Tx);
    let request = ArpAssembler {
        oper: ArpOperation::Request,
        sha: mns.host_a_mac,
        spa: mns.host_a_ip4,
        tha: MacAddr::UNSPECIFIED,
        tpa: mns.stack_ip4,
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: MacAddr::BROADCAST,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_ARP,
        payload: request.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_broadcast: 1,
            arp__pre_parse: 1,
            arp__op_request: 1,
            arp__op_request__update_cache: 1,
            arp__op_request__tpa_stack__respond: 1,
            ..Default::default()
        }
    );

    let reply = mns.frames.try_recv().expect("arp reply frame");
    let ether = EtherFrame::parse(&reply).unwrap();
    assert_eq!(ether.dst(), mns.host_a_mac);
    assert_eq!(ether.src(), mns.stack_mac);
    let arp = ArpPacket::parse(ether.payload()).unwrap();
    assert_eq!(arp.oper(), ArpOperation::Reply);
    assert_eq!(arp.sha(), mns.stack_mac);
    assert_eq!(arp.spa(), mns.stack_ip4);
    assert_eq!(arp.tha(), mns.host_a_mac);
    assert_eq!(arp.tpa(), mns.host_a_ip4);
}

#[test]
fn inbound_arp_probe_is_ignored() {
    let mns = mns();
    let tracker = Tracker::new(Direction::Tx);
    let probe = ArpAssembler {
        oper: ArpOperation::Request,
        sha: mns.host_a_mac,
        spa: Ipv4Addr::UNSPECIFIED,
        tha: MacAddr::UNSPECIFIED,
        tpa: mns.stack_ip4,
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: MacAddr::BROADCAST,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_ARP,
        payload: probe.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_broadcast: 1,
            arp__pre_parse: 1,
            arp__op_request: 1,
            arp__op_request__probe__drop: 1,
            ..Default::default()
        }
    );
    assert!(mns.frames.try_recv().is_err());
    // Nothing was learned from the probe.
    assert_eq!(mns.handler.arp_cache().hit_count(Ipv4Addr::UNSPECIFIED), None);
}

#[test]
fn inbound_neighbor_solicitation_is_answered_and_learned() {
    let mns = mns();
    let tracker = Tracker::new(Direction::Tx);
    let solicited = crate::addr::Ip6AddrExt::solicited_node_multicast(&mns.stack_ip6);
    let ns = Icmp6Assembler {
        message: Icmp6TxMessage::NeighborSolicitation {
            target: mns.stack_ip6,
            options: vec![NdOption::SourceLinkLayerAddress(mns.host_a_mac)],
        },
        tracker: tracker.clone(),
    };
    let ip6 = Ip6Assembler {
        next: crate::wire::IP_PROTO_ICMP6,
        hop: 255,
        src: mns.host_a_ip6,
        dst: solicited,
        payload: ns.emit(mns.host_a_ip6, solicited),
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: MacAddr::from_multicast_ip6(solicited),
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP6,
        payload: ip6.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_multicast: 1,
            ip6__pre_parse: 1,
            ip6__dst_multicast: 1,
            icmp6__pre_parse: 1,
            icmp6__nd_neighbor_solicitation: 1,
            icmp6__nd_neighbor_solicitation__update_cache: 1,
            icmp6__nd_neighbor_solicitation__target_stack__respond: 1,
            ..Default::default()
        }
    );

    let reply = mns.frames.try_recv().expect("neighbor advertisement frame");
    let ether = EtherFrame::parse(&reply).unwrap();
    assert_eq!(ether.dst(), mns.host_a_mac);
    let ip6 = Ip6Packet::parse(ether.payload()).unwrap();
    assert_eq!(ip6.hop(), 255);
    assert_eq!(ip6.src(), mns.stack_ip6);
    assert_eq!(ip6.dst(), mns.host_a_ip6);
    let icmp = Icmp6Packet::parse(ip6.payload(), ip6.src(), ip6.dst()).unwrap();
    match icmp.message() {
        Icmp6Message::NeighborAdvertisement {
            flag_s,
            flag_o,
            target,
            options,
            ..
        } => {
            assert!(*flag_s);
            assert!(*flag_o);
            assert_eq!(*target, mns.stack_ip6);
            assert_eq!(
                options[0],
                NdOption::TargetLinkLayerAddress(mns.stack_mac)
            );
        }
        other => panic!("unexpected message {other:?}"),
    }
    // The solicitation's SLLA landed in the cache.
    assert_eq!(mns.handler.nd_cache().find(mns.host_a_ip6), Some(mns.host_a_mac));
}

#[test]
fn inbound_udp_without_socket_answers_port_unreachable() {
    let mns = mns();
    let tracker = Tracker::new(Direction::Tx);
    let udp = UdpAssembler {
        sport: 40_000,
        dport: 9,
        payload: b"discard?".to_vec(),
        tracker: tracker.clone(),
    };
    let ip4 = Ip4Assembler {
        id: 0x2002,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_UDP,
        src: mns.host_a_ip4,
        dst: mns.stack_ip4,
        payload: udp.emit_v4(mns.host_a_ip4, mns.stack_ip4),
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: mns.stack_mac,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP4,
        payload: ip4.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            udp__pre_parse: 1,
            udp__no_socket_match__respond_unreachable: 1,
            ..Default::default()
        }
    );

    let reply = mns.frames.try_recv().expect("port unreachable frame");
    let ip4 = Ip4Packet::parse(&reply[14..]).unwrap();
    assert_eq!(ip4.proto(), IP_PROTO_ICMP4);
    assert_eq!(ip4.dst(), mns.host_a_ip4);
    let icmp = Icmp4Packet::parse(ip4.payload()).unwrap();
    match icmp.message() {
        Icmp4Message::Unreachable { code, data } => {
            assert_eq!(*code, 3);
            // The quote echoes the offending datagram's header.
            assert_eq!(data[0] >> 4, 4);
            assert_eq!(&data[12..16], &mns.host_a_ip4.octets());
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn inbound_udp_delivers_to_bound_socket() {
    let mns = mns();
    let events = mns
        .handler
        .sockets()
        .bind_udp(SocketKey::listener_v4(7));

    let tracker = Tracker::new(Direction::Tx);
    let udp = UdpAssembler {
        sport: 9000,
        dport: 7,
        payload: b"ping payload".to_vec(),
        tracker: tracker.clone(),
    };
    let ip4 = Ip4Assembler {
        id: 0x2003,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_UDP,
        src: mns.host_a_ip4,
        dst: mns.stack_ip4,
        payload: udp.emit_v4(mns.host_a_ip4, mns.stack_ip4),
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: mns.stack_mac,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP4,
        payload: ip4.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);

    assert_eq!(
        events.try_recv().unwrap(),
        UdpEvent::Datagram {
            local_ip: IpAddr::V4(mns.stack_ip4),
            local_port: 7,
            remote_ip: IpAddr::V4(mns.host_a_ip4),
            remote_port: 9000,
            payload: b"ping payload".to_vec(),
        }
    );
}

fn tcp_frame(mns: &MockNet, dport: u16, seq: u32, flags: TcpFlags, payload: &[u8]) -> Vec<u8> {
    let tracker = Tracker::new(Direction::Tx);
    let tcp = TcpAssembler {
        sport: 40_000,
        dport,
        seq,
        ack: 0,
        flags,
        win: 0x4000,
        options: Vec::new(),
        payload: payload.to_vec(),
        tracker: tracker.clone(),
    };
    let ip4 = Ip4Assembler {
        id: 0x2004,
        flag_df: false,
        flag_mf: false,
        offset: 0,
        ttl: IP4_DEFAULT_TTL,
        proto: IP_PROTO_TCP,
        src: mns.host_a_ip4,
        dst: mns.stack_ip4,
        payload: tcp.emit_v4(mns.host_a_ip4, mns.stack_ip4),
        tracker: tracker.clone(),
    };
    EtherAssembler {
        dst: mns.stack_mac,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP4,
        payload: ip4.emit(),
        tracker,
    }
    .emit()
}

#[test]
fn inbound_tcp_delivers_to_bound_socket() {
    let mns = mns();
    let events = mns.handler.sockets().bind_tcp(SocketKey::listener_v4(80));

    let frame = tcp_frame(&mns, 80, 0x1000, TcpFlags::SYN, &[]);
    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            tcp__pre_parse: 1,
            tcp__socket_match: 1,
            ..Default::default()
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        TcpEvent::Segment {
            local_ip: IpAddr::V4(mns.stack_ip4),
            local_port: 80,
            remote_ip: IpAddr::V4(mns.host_a_ip4),
            remote_port: 40_000,
            seq: 0x1000,
            ack: 0,
            flags: TcpFlags::SYN,
            win: 0x4000,
            payload: Vec::new(),
        }
    );
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn inbound_tcp_without_socket_answers_rst() {
    let mns = mns();
    let frame = tcp_frame(&mns, 81, 1000, TcpFlags::SYN, &[]);
    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            tcp__pre_parse: 1,
            tcp__no_socket_match__respond_rst: 1,
            ..Default::default()
        }
    );

    let reply = mns.frames.try_recv().expect("rst frame");
    let ether = EtherFrame::parse(&reply).unwrap();
    assert_eq!(ether.dst(), mns.host_a_mac);
    let ip4 = Ip4Packet::parse(ether.payload()).unwrap();
    assert_eq!(ip4.proto(), IP_PROTO_TCP);
    assert_eq!(ip4.src(), mns.stack_ip4);
    assert_eq!(ip4.dst(), mns.host_a_ip4);
    let tcp = TcpPacket::parse_v4(ip4.payload(), ip4.src(), ip4.dst()).unwrap();
    assert_eq!(tcp.sport(), 81);
    assert_eq!(tcp.dport(), 40_000);
    // The SYN carried no ACK, so the reset acknowledges seq + 1.
    assert_eq!(tcp.flags(), TcpFlags::RST | TcpFlags::ACK);
    assert_eq!(tcp.seq(), 0);
    assert_eq!(tcp.ack(), 1001);
    assert_eq!(tcp.win(), 0);
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn fragmented_udp_datagram_reassembles_and_delivers() {
    let mns = mns();
    let events = mns
        .handler
        .sockets()
        .bind_udp(SocketKey::listener_v4(7));

    let tracker = Tracker::new(Direction::Tx);
    let payload: Vec<u8> = (0..64u8).cycle().take(3000).collect();
    let udp = UdpAssembler {
        sport: 9000,
        dport: 7,
        payload: payload.clone(),
        tracker: tracker.clone(),
    };
    let segment = udp.emit_v4(mns.host_a_ip4, mns.stack_ip4);

    // Split the segment into three fragments and deliver them out of order.
    let bounds = [(0usize, 1480usize, true), (1480, 2960, true), (2960, segment.len(), false)];
    let mut frames: Vec<Vec<u8>> = bounds
        .iter()
        .map(|&(start, end, more)| {
            let ip4 = Ip4Assembler {
                id: 0x0042,
                flag_df: false,
                flag_mf: more,
                offset: start,
                ttl: IP4_DEFAULT_TTL,
                proto: IP_PROTO_UDP,
                src: mns.host_a_ip4,
                dst: mns.stack_ip4,
                payload: segment[start..end].to_vec(),
                tracker: tracker.clone(),
            };
            EtherAssembler {
                dst: mns.stack_mac,
                src: mns.host_a_mac,
                ethertype: ETHER_TYPE_IP4,
                payload: ip4.emit(),
                tracker: tracker.clone(),
            }
            .emit()
        })
        .collect();

    frames.swap(0, 2);
    for frame in &frames {
        mns.handler.receive_frame(frame);
    }

    let stats = mns.handler.stats_rx();
    assert_eq!(stats.ip4__frag, 3);
    assert_eq!(stats.ip4__defrag, 1);
    assert_eq!(stats.udp__socket_match, 1);

    match events.try_recv().unwrap() {
        UdpEvent::Datagram { payload: received, .. } => assert_eq!(received, payload),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn disabled_ip6_drops_inbound_and_outbound() {
    let stack_mac: MacAddr = "02:00:00:77:77:77".parse().unwrap();
    let config = StackConfig {
        mac_address: stack_mac,
        ip6_support: false,
        ip6_host: vec![Ip6Host::new("2001:db8::7".parse().unwrap(), 64, None)],
        ..Default::default()
    };
    let (ring, frames) = TxRing::new();
    let handler = PacketHandler::new(&config, ring);

    let status = handler.tx_ip6(
        "2001:db8::7".parse().unwrap(),
        "2001:db8::1".parse().unwrap(),
        raw_payload(&[]),
    );
    assert_eq!(status, TxStatus::DropedIp6NoProtocolSupport);
    assert_eq!(handler.stats_tx().ip6__no_proto_support__drop, 1);

    // An inbound IPv6 frame is dropped at the ethernet layer.
    let tracker = Tracker::new(Direction::Tx);
    let ip6 = Ip6Assembler {
        next: IP_PROTO_RAW,
        hop: 64,
        src: "2001:db8::1".parse().unwrap(),
        dst: "2001:db8::7".parse().unwrap(),
        payload: vec![],
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: stack_mac,
        src: "52:54:00:70:7b:2b".parse().unwrap(),
        ethertype: ETHER_TYPE_IP6,
        payload: ip6.emit(),
        tracker,
    }
    .emit();
    handler.receive_frame(&frame);
    assert_eq!(handler.stats_rx().ether__no_proto_support__drop, 1);
    assert!(frames.try_recv().is_err());
}

#[test]
fn source_selection_is_idempotent_for_owned_sources() {
    let mns = mns();
    mns.handler
        .tx_ip4(mns.stack_ip4, mns.host_a_ip4, raw_payload(&[]), false);
    let stats = mns.handler.stats_tx();
    assert_eq!(stats.ip4__src_unspecified__replace, 0);
    assert_eq!(stats.ip4__src_multicast__replace, 0);
    assert_eq!(stats.ip4__src_limited_broadcast__replace, 0);
    assert_eq!(stats.ip4__src_network_broadcast__replace, 0);
}

#[test]
fn ip6_echo_request_round_trip() {
    let mns = mns();
    let tracker = Tracker::new(Direction::Tx);
    let echo = Icmp6Assembler {
        message: Icmp6TxMessage::EchoRequest {
            id: 0x77,
            seq: 2,
            data: b"ping6".to_vec(),
        },
        tracker: tracker.clone(),
    };
    let ip6 = Ip6Assembler {
        next: crate::wire::IP_PROTO_ICMP6,
        hop: 64,
        src: mns.host_a_ip6,
        dst: mns.stack_ip6,
        payload: echo.emit(mns.host_a_ip6, mns.stack_ip6),
        tracker: tracker.clone(),
    };
    let frame = EtherAssembler {
        dst: mns.stack_mac,
        src: mns.host_a_mac,
        ethertype: ETHER_TYPE_IP6,
        payload: ip6.emit(),
        tracker,
    }
    .emit();

    mns.handler.receive_frame(&frame);
    assert_eq!(
        mns.handler.stats_rx().icmp6__echo_request__respond_echo_reply,
        1
    );

    let reply = mns.frames.try_recv().expect("echo reply frame");
    let ether = EtherFrame::parse(&reply).unwrap();
    let ip6 = Ip6Packet::parse(ether.payload()).unwrap();
    assert_eq!(ip6.src(), mns.stack_ip6);
    assert_eq!(ip6.dst(), mns.host_a_ip6);
    let icmp = Icmp6Packet::parse(ip6.payload(), ip6.src(), ip6.dst()).unwrap();
    assert_eq!(
        *icmp.message(),
        Icmp6Message::EchoReply {
            id: 0x77,
            seq: 2,
            data: b"ping6",
        }
    );
}

#[test]
fn corrupted_checksum_drops_silently_with_counter() {
    let mns = mns();
    let mut frame = echo_request_frame(&mns, 1, 1, b"x");
    // Flip one bit inside the ICMP data.
    let last = frame.len() - 1;
    frame[last] ^= 0x80;
    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unicast: 1,
            ip4__pre_parse: 1,
            ip4__dst_unicast: 1,
            icmp4__pre_parse: 1,
            icmp4__failed_parse__drop: 1,
            ..Default::default()
        }
    );
    assert!(mns.frames.try_recv().is_err());
}

#[test]
fn foreign_unicast_frame_is_dropped_at_ethernet() {
    let mns = mns();
    let mut frame = echo_request_frame(&mns, 1, 1, b"x");
    frame[5] ^= 0xff; // perturb the destination mac
    mns.handler.receive_frame(&frame);

    assert_eq!(
        mns.handler.stats_rx(),
        PacketStatsRx {
            ether__pre_parse: 1,
            ether__dst_unknown__drop: 1,
            ..Default::default()
        }
    );
}

#[test]
fn ip6_frag_id_is_fresh_per_datagram() {
    let mns = mns();
    let payload: Vec<u8> = vec![0xab; 3000];
    mns.handler
        .tx_ip6(mns.stack_ip6, mns.host_a_ip6, raw_payload(&payload));
    mns.handler
        .tx_ip6(mns.stack_ip6, mns.host_a_ip6, raw_payload(&payload));

    let mut ids = Vec::new();
    while let Ok(frame) = mns.frames.try_recv() {
        let ip6 = Ip6Packet::parse(&frame[14..]).unwrap();
        let frag = Ip6ExtFrag::parse(ip6.payload()).unwrap();
        ids.push(frag.id());
    }
    assert_eq!(ids.len(), 6); // two datagrams, three fragments each
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[3], ids[4]);
    assert_ne!(ids[0], ids[3]);
}
