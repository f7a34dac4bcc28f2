//! IPv4 assembly: source-address selection, MTU enforcement, and send-path
//! fragmentation.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::addr::{Ip4AddrExt, MacAddr};
use crate::status::TxStatus;
use crate::wire::ip4::{Ip4Assembler, IP4_DEFAULT_TTL, IP4_HEADER_LEN};
use crate::wire::IpPayload;

use super::{EtherPayload, PacketHandler};

enum SelectedSource {
    Keep(Ipv4Addr),
    Replaced(Ipv4Addr),
    Drop(TxStatus),
}

impl PacketHandler {
    /// Assemble one IPv4 datagram and pass it down to the ethernet layer,
    /// fragmenting when the payload exceeds the MTU and `flag_df` allows.
    pub fn tx_ip4(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        payload: IpPayload,
        flag_df: bool,
    ) -> TxStatus {
        self.stats_tx.lock().ip4__pre_assemble += 1;

        if !self.ip4_support {
            self.stats_tx.lock().ip4__no_proto_support__drop += 1;
            return TxStatus::DropedIp4NoProtocolSupport;
        }
        if dst.is_unspecified() {
            self.stats_tx.lock().ip4__dst_unspecified__drop += 1;
            return TxStatus::DropedIp4DstUnspecified;
        }
        let src = match self.select_ip4_source(src, dst) {
            SelectedSource::Keep(src) => src,
            SelectedSource::Replaced(src) => src,
            SelectedSource::Drop(status) => return status,
        };

        if IP4_HEADER_LEN + payload.len() <= self.mtu {
            self.stats_tx.lock().ip4__mtu_ok__send += 1;
            let datagram = Ip4Assembler {
                id: 0,
                flag_df,
                flag_mf: false,
                offset: 0,
                ttl: IP4_DEFAULT_TTL,
                proto: payload.proto(),
                src,
                dst,
                payload: payload.emit_v4(src, dst),
                tracker: payload.tracker().clone(),
            };
            return self.tx_ether(MacAddr::UNSPECIFIED, MacAddr::UNSPECIFIED, EtherPayload::Ip4(datagram));
        }

        if flag_df {
            self.stats_tx.lock().ip4__mtu_exceed_df_set__drop += 1;
            debug!(len = payload.len(), mtu = self.mtu, "datagram over mtu with df set");
            return TxStatus::DropedIp4MtuExceeded;
        }

        self.stats_tx.lock().ip4__mtu_exceed__frag += 1;
        let bytes = payload.emit_v4(src, dst);
        let proto = payload.proto();
        let id = self.next_ip4_id();
        let chunk = (self.mtu - IP4_HEADER_LEN) / 8 * 8;
        debug!(
            tracker = %payload.tracker(),
            len = bytes.len(),
            chunk,
            id,
            "fragmenting ipv4 datagram"
        );

        let mut status = TxStatus::PassedEtherToTxRing;
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + chunk).min(bytes.len());
            let last = end == bytes.len();
            status = self.tx_ip4_fragment(
                src,
                dst,
                proto,
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

    /// One fragment re-enters the assembly path: it re-counts
    /// `ip4__pre_assemble` and `ip4__mtu_ok__send`, but skips source
    /// selection, which already ran for the whole datagram.
    #[allow(clippy::too_many_arguments)]
    fn tx_ip4_fragment(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        proto: u8,
        id: u16,
        offset: usize,
        flag_mf: bool,
        fragment: Vec<u8>,
        tracker: crate::tracker::Tracker,
    ) -> TxStatus {
        {
            let mut stats = self.stats_tx.lock();
            stats.ip4__pre_assemble += 1;
            stats.ip4__mtu_ok__send += 1;
        }
        let datagram = Ip4Assembler {
            id,
            flag_df: false,
            flag_mf,
            offset,
            ttl: IP4_DEFAULT_TTL,
            proto,
            src,
            dst,
            payload: fragment,
            tracker,
        };
        self.tx_ether(MacAddr::UNSPECIFIED, MacAddr::UNSPECIFIED, EtherPayload::Ip4(datagram))
    }

    /// Caller-supplied source addresses are accepted only when owned; the
    /// placeholder forms are replaced when a replacement exists.
    fn select_ip4_source(&self, src: Ipv4Addr, dst: Ipv4Addr) -> SelectedSource {
        let hosts = self.ctx.ip4_host.read().clone();

        if hosts.iter().any(|host| host.address == src) {
            return SelectedSource::Keep(src);
        }

        if src.is_unspecified() {
            if let Some(host) = hosts.iter().find(|host| host.network.contains(dst)) {
                self.stats_tx.lock().ip4__src_unspecified__replace += 1;
                return SelectedSource::Replaced(host.address);
            }
            if let Some(host) = hosts.iter().find(|host| host.gateway.is_some()) {
                self.stats_tx.lock().ip4__src_unspecified__replace += 1;
                return SelectedSource::Replaced(host.address);
            }
            self.stats_tx.lock().ip4__src_unspecified__drop += 1;
            return SelectedSource::Drop(TxStatus::DropedIp4SrcUnspecified);
        }

        if src.is_limited_broadcast() {
            if let Some(host) = hosts.iter().find(|host| host.network.contains(dst)) {
                self.stats_tx.lock().ip4__src_limited_broadcast__replace += 1;
                return SelectedSource::Replaced(host.address);
            }
            self.stats_tx.lock().ip4__src_limited_broadcast__drop += 1;
            return SelectedSource::Drop(TxStatus::DropedIp4SrcLimitedBroadcast);
        }

        if let Some(host) = hosts.iter().find(|host| host.network.broadcast() == src) {
            self.stats_tx.lock().ip4__src_network_broadcast__replace += 1;
            return SelectedSource::Replaced(host.address);
        }

        if src.is_multicast() {
            if let Some(host) = hosts.first() {
                self.stats_tx.lock().ip4__src_multicast__replace += 1;
                return SelectedSource::Replaced(host.address);
            }
            self.stats_tx.lock().ip4__src_multicast__drop += 1;
            return SelectedSource::Drop(TxStatus::DropedIp4SrcMulticast);
        }

        self.stats_tx.lock().ip4__src_not_owned__drop += 1;
        debug!(%src, "ipv4 source not owned by the stack");
        SelectedSource::Drop(TxStatus::DropedIp4SrcNotOwned)
    }
}
