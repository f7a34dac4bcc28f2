//! IPv6 assembly: source-address selection, MTU enforcement, and send-path
//! fragmentation via the Fragment extension header.

use std::net::Ipv6Addr;

use tracing::debug;

use crate::addr::MacAddr;
use crate::status::TxStatus;
use crate::tracker::Tracker;
use crate::wire::ip6::{
    Ip6Assembler, Ip6ExtFragAssembler, IP6_DEFAULT_HOP, IP6_EXT_FRAG_LEN, IP6_HEADER_LEN,
};
use crate::wire::{IpPayload, IP6_EXT_FRAG};

use super::{EtherPayload, PacketHandler};

enum SelectedSource {
    Keep(Ipv6Addr),
    Replaced(Ipv6Addr),
    Drop(TxStatus),
}

impl PacketHandler {
    /// Assemble one IPv6 datagram and pass it down to the ethernet layer.
    pub fn tx_ip6(&self, src: Ipv6Addr, dst: Ipv6Addr, payload: IpPayload) -> TxStatus {
        self.tx_ip6_with_hop(src, dst, IP6_DEFAULT_HOP, payload)
    }

    pub(crate) fn tx_ip6_with_hop(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        hop: u8,
        payload: IpPayload,
    ) -> TxStatus {
        self.stats_tx.lock().ip6__pre_assemble += 1;

        if !self.ip6_support {
            self.stats_tx.lock().ip6__no_proto_support__drop += 1;
            return TxStatus::DropedIp6NoProtocolSupport;
        }
        if dst.is_unspecified() {
            self.stats_tx.lock().ip6__dst_unspecified__drop += 1;
            return TxStatus::DropedIp6DstUnspecified;
        }
        let src = match self.select_ip6_source(src, dst) {
            SelectedSource::Keep(src) => src,
            SelectedSource::Replaced(src) => src,
            SelectedSource::Drop(status) => return status,
        };

        if IP6_HEADER_LEN + payload.len() <= self.mtu {
            self.stats_tx.lock().ip6__mtu_ok__send += 1;
            let datagram = Ip6Assembler {
                next: payload.proto(),
                hop,
                src,
                dst,
                payload: payload.emit_v6(src, dst),
                tracker: payload.tracker().clone(),
            };
            return self.tx_ether(
                MacAddr::UNSPECIFIED,
                MacAddr::UNSPECIFIED,
                EtherPayload::Ip6(datagram),
            );
        }

        self.stats_tx.lock().ip6__mtu_exceed__frag += 1;
        self.stats_tx.lock().ip6_ext_frag__pre_assemble += 1;
        let bytes = payload.emit_v6(src, dst);
        let next = payload.proto();
        let id = self.next_ip6_frag_id();
        let chunk = (self.mtu - IP6_HEADER_LEN - IP6_EXT_FRAG_LEN) / 8 * 8;
        debug!(
            tracker = %payload.tracker(),
            len = bytes.len(),
            chunk,
            id,
            "fragmenting ipv6 datagram"
        );

        let mut status = TxStatus::PassedEtherToTxRing;
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + chunk).min(bytes.len());
            let last = end == bytes.len();
            self.stats_tx.lock().ip6_ext_frag__send += 1;
            status = self.tx_ip6_fragment(
                src,
                dst,
                hop,
                next,
                id,
                offset,
                !last,
                bytes[offset..end].to_vec(),
                payload.tracker().clone(),
            );
            offset = end;
        }
        status
    }

    /// One fragment re-enters the assembly path with the Fragment extension
    /// wrapped around its slice of the original payload.
    #[allow(clippy::too_many_arguments)]
    fn tx_ip6_fragment(
        &self,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        hop: u8,
        next: u8,
        id: u32,
        offset: usize,
        flag_mf: bool,
        fragment: Vec<u8>,
        tracker: Tracker,
    ) -> TxStatus {
        {
            let mut stats = self.stats_tx.lock();
            stats.ip6__pre_assemble += 1;
            stats.ip6__mtu_ok__send += 1;
        }
        let ext_frag = Ip6ExtFragAssembler {
            next,
            offset,
            flag_mf,
            id,
            payload: fragment,
            tracker: tracker.clone(),
        };
        let datagram = Ip6Assembler {
            next: IP6_EXT_FRAG,
            hop,
            src,
            dst,
            payload: ext_frag.emit(),
            tracker,
        };
        self.tx_ether(
            MacAddr::UNSPECIFIED,
            MacAddr::UNSPECIFIED,
            EtherPayload::Ip6(datagram),
        )
    }

    fn select_ip6_source(&self, src: Ipv6Addr, dst: Ipv6Addr) -> SelectedSource {
        let hosts = self.ctx.ip6_host.read().clone();

        if hosts.iter().any(|host| host.address == src) {
            return SelectedSource::Keep(src);
        }

        if src.is_unspecified() {
            if let Some(host) = hosts.iter().find(|host| host.network.contains(dst)) {
                self.stats_tx
                    .lock()
                    .ip6__src_network_unspecified__replace_local += 1;
                return SelectedSource::Replaced(host.address);
            }
            if let Some(host) = hosts.iter().find(|host| host.gateway.is_some()) {
                self.stats_tx
                    .lock()
                    .ip6__src_network_unspecified__replace_external += 1;
                return SelectedSource::Replaced(host.address);
            }
            self.stats_tx.lock().ip6__src_unspecified__drop += 1;
            return SelectedSource::Drop(TxStatus::DropedIp6SrcUnspecified);
        }

        if src.is_multicast() {
            if let Some(host) = hosts.first() {
                self.stats_tx.lock().ip6__src_multicast__replace += 1;
                return SelectedSource::Replaced(host.address);
            }
            self.stats_tx.lock().ip6__src_multicast__drop += 1;
            return SelectedSource::Drop(TxStatus::DropedIp6SrcMulticast);
        }

        self.stats_tx.lock().ip6__src_not_owned__drop += 1;
        debug!(%src, "ipv6 source not owned by the stack");
        SelectedSource::Drop(TxStatus::DropedIp6SrcNotOwned)
    }
}
