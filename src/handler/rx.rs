//! Inbound dispatch entry: one frame in, one pass through the protocol
//! layers to a socket delivery, a reply emission, or a counted drop.

use tracing::debug;

use crate::tracker::{Direction, Tracker};
use crate::wire::arp::{ArpOperation, ArpPacket};
use crate::wire::ether::{EtherFrame, ETHER_TYPE_ARP, ETHER_TYPE_IP4, ETHER_TYPE_IP6};

use super::PacketHandler;

impl PacketHandler {
    /// Process one inbound Ethernet frame to completion.
    pub fn receive_frame(&self, frame: &[u8]) {
        self.stats_rx.lock().ether__pre_parse += 1;
        let tracker = Tracker::new(Direction::Rx);

        let ether = match EtherFrame::parse(frame) {
            Ok(ether) => ether,
            Err(reason) => {
                debug!(%tracker, %reason, "ethernet parse failed");
                self.stats_rx.lock().ether__failed_parse__drop += 1;
                return;
            }
        };

        let dst = ether.dst();
        if dst == self.ctx.mac_unicast {
            self.stats_rx.lock().ether__dst_unicast += 1;
        } else if dst.is_broadcast() {
            self.stats_rx.lock().ether__dst_broadcast += 1;
        } else if dst.is_multicast() && self.ctx.multicast_macs().contains(&dst) {
            self.stats_rx.lock().ether__dst_multicast += 1;
        } else {
            debug!(%tracker, %dst, "frame for foreign mac dropped");
            self.stats_rx.lock().ether__dst_unknown__drop += 1;
            return;
        }

        match ether.ethertype() {
            ETHER_TYPE_ARP => {
                if !self.ip4_support {
                    self.stats_rx.lock().ether__no_proto_support__drop += 1;
                    return;
                }
                self.rx_arp(ether.payload(), &tracker);
            }
            ETHER_TYPE_IP4 => {
                if !self.ip4_support {
                    self.stats_rx.lock().ether__no_proto_support__drop += 1;
                    return;
                }
                self.rx_ip4(ether.payload(), &tracker);
            }
            ETHER_TYPE_IP6 => {
                if !self.ip6_support {
                    self.stats_rx.lock().ether__no_proto_support__drop += 1;
                    return;
                }
                self.rx_ip6(ether.payload(), &tracker);
            }
            ethertype => {
                debug!(%tracker, ethertype, "unknown ethertype dropped");
                self.stats_rx.lock().ether__type_unknown__drop += 1;
            }
        }
    }

    fn rx_arp(&self, payload: &[u8], tracker: &Tracker) {
        self.stats_rx.lock().arp__pre_parse += 1;
        let arp = match ArpPacket::parse(payload) {
            Ok(arp) => arp,
            Err(reason) => {
                debug!(%tracker, %reason, "arp parse failed");
                self.stats_rx.lock().arp__failed_parse__drop += 1;
                return;
            }
        };

        match arp.oper() {
            ArpOperation::Request => {
                self.stats_rx.lock().arp__op_request += 1;

                // ARP probes carry an unspecified sender address; nothing
                // to learn and nothing to answer with.
                if arp.spa().is_unspecified() {
                    debug!(%tracker, tpa = %arp.tpa(), "arp probe dropped");
                    self.stats_rx.lock().arp__op_request__probe__drop += 1;
                    return;
                }

                self.arp_cache.insert(arp.spa(), arp.sha());
                self.stats_rx.lock().arp__op_request__update_cache += 1;

                if self.ctx.owns_ip4(arp.tpa()) {
                    debug!(%tracker, spa = %arp.spa(), tpa = %arp.tpa(), "responding to arp request");
                    self.stats_rx.lock().arp__op_request__tpa_stack__respond += 1;
                    self.send_arp(
                        self.ctx.mac_unicast,
                        arp.sha(),
                        ArpOperation::Reply,
                        self.ctx.mac_unicast,
                        arp.tpa(),
                        arp.sha(),
                        arp.spa(),
                        Some(tracker),
                    );
                } else {
                    self.stats_rx.lock().arp__op_request__tpa_unknown__drop += 1;
                }
            }
            ArpOperation::Reply => {
                self.stats_rx.lock().arp__op_reply += 1;
                self.arp_cache.insert(arp.spa(), arp.sha());
                self.stats_rx.lock().arp__op_reply__update_cache += 1;
            }
        }
    }
}
