//! Disposition of one outbound transmission attempt. Callers and tests key
//! off the exact variant, and the `Display` form is the stable wire-visible
//! spelling used in logs.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TxStatus {
    PassedEtherToTxRing,
    DropedEtherDstResolutionFail,
    DropedEtherSrcNotOwned,
    DropedArpNoProtocolSupport,
    DropedIp4NoProtocolSupport,
    DropedIp4SrcNotOwned,
    DropedIp4SrcMulticast,
    DropedIp4SrcLimitedBroadcast,
    DropedIp4SrcNetworkBroadcast,
    DropedIp4SrcUnspecified,
    DropedIp4DstUnspecified,
    /// Catch-all for a source address rejected by classification. Kept for
    /// interface completeness; every rejection currently maps to one of the
    /// specific variants above, so nothing returns this today.
    DropedIp4InvalidSource,
    DropedIp4MtuExceeded,
    DropedIp6NoProtocolSupport,
    DropedIp6SrcNotOwned,
    DropedIp6SrcMulticast,
    DropedIp6SrcUnspecified,
    DropedIp6DstUnspecified,
}

impl TxStatus {
    pub fn is_passed(self) -> bool {
        matches!(self, TxStatus::PassedEtherToTxRing)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TxStatus::PassedEtherToTxRing => "PASSED__ETHER__TO_TX_RING",
            TxStatus::DropedEtherDstResolutionFail => "DROPED__ETHER__DST_RESOLUTION_FAIL",
            TxStatus::DropedEtherSrcNotOwned => "DROPED__ETHER__SRC_NOT_OWNED",
            TxStatus::DropedArpNoProtocolSupport => "DROPED__ARP__NO_PROTOCOL_SUPPORT",
            TxStatus::DropedIp4NoProtocolSupport => "DROPED__IP4__NO_PROTOCOL_SUPPORT",
            TxStatus::DropedIp4SrcNotOwned => "DROPED__IP4__SRC_NOT_OWNED",
            TxStatus::DropedIp4SrcMulticast => "DROPED__IP4__SRC_MULTICAST",
            TxStatus::DropedIp4SrcLimitedBroadcast => "DROPED__IP4__SRC_LIMITED_BROADCAST",
            TxStatus::DropedIp4SrcNetworkBroadcast => "DROPED__IP4__SRC_NETWORK_BROADCAST",
            TxStatus::DropedIp4SrcUnspecified => "DROPED__IP4__SRC_UNSPECIFIED",
            TxStatus::DropedIp4DstUnspecified => "DROPED__IP4__DST_UNSPECIFIED",
            TxStatus::DropedIp4InvalidSource => "DROPED__IP4__INVALID_SOURCE",
            TxStatus::DropedIp4MtuExceeded => "DROPED__IP4__MTU_EXCEEDED",
            TxStatus::DropedIp6NoProtocolSupport => "DROPED__IP6__NO_PROTOCOL_SUPPORT",
            TxStatus::DropedIp6SrcNotOwned => "DROPED__IP6__SRC_NOT_OWNED",
            TxStatus::DropedIp6SrcMulticast => "DROPED__IP6__SRC_MULTICAST",
            TxStatus::DropedIp6SrcUnspecified => "DROPED__IP6__SRC_UNSPECIFIED",
            TxStatus::DropedIp6DstUnspecified => "DROPED__IP6__DST_UNSPECIFIED",
        };
        f.write_str(text)
    }
}
