//! Fixed-shape counter bundles updated at every dispatch decision point.
//!
//! Each branch of the inbound and outbound pipelines increments exactly one
//! uniquely named counter, so the set of non-zero counters identifies the
//! path a packet took. Tests assert equality over whole bundles; keep these
//! as plain structs so that comparison stays field-for-field exact.

/// Counters for the inbound pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketStatsRx {
    pub ether__pre_parse: u64,
    pub ether__failed_parse__drop: u64,
    pub ether__dst_unicast: u64,
    pub ether__dst_multicast: u64,
    pub ether__dst_broadcast: u64,
    pub ether__dst_unknown__drop: u64,
    pub ether__type_unknown__drop: u64,
    pub ether__no_proto_support__drop: u64,

    pub arp__pre_parse: u64,
    pub arp__failed_parse__drop: u64,
    pub arp__op_request: u64,
    pub arp__op_request__tpa_stack__respond: u64,
    pub arp__op_request__tpa_unknown__drop: u64,
    pub arp__op_request__probe__drop: u64,
    pub arp__op_request__update_cache: u64,
    pub arp__op_reply: u64,
    pub arp__op_reply__update_cache: u64,

    pub ip4__pre_parse: u64,
    pub ip4__failed_parse__drop: u64,
    pub ip4__dst_unicast: u64,
    pub ip4__dst_multicast: u64,
    pub ip4__dst_broadcast: u64,
    pub ip4__dst_unknown__drop: u64,
    pub ip4__frag: u64,
    pub ip4__defrag: u64,
    pub ip4__proto_unknown__respond_unreachable: u64,
    pub ip4__proto_unknown__drop: u64,

    pub ip6__pre_parse: u64,
    pub ip6__failed_parse__drop: u64,
    pub ip6__dst_unicast: u64,
    pub ip6__dst_multicast: u64,
    pub ip6__dst_unknown__drop: u64,
    pub ip6__ext_unknown__drop: u64,

    pub ip6_ext_frag__pre_parse: u64,
    pub ip6_ext_frag__failed_parse__drop: u64,
    pub ip6_ext_frag__defrag: u64,

    pub icmp4__pre_parse: u64,
    pub icmp4__failed_parse__drop: u64,
    pub icmp4__echo_request__respond_echo_reply: u64,
    pub icmp4__echo_reply: u64,
    pub icmp4__unreachable: u64,
    pub icmp4__unknown__drop: u64,

    pub icmp6__pre_parse: u64,
    pub icmp6__failed_parse__drop: u64,
    pub icmp6__echo_request__respond_echo_reply: u64,
    pub icmp6__echo_reply: u64,
    pub icmp6__unreachable: u64,
    pub icmp6__nd_router_solicitation: u64,
    pub icmp6__nd_router_advertisement: u64,
    pub icmp6__nd_neighbor_solicitation: u64,
    pub icmp6__nd_neighbor_solicitation__target_stack__respond: u64,
    pub icmp6__nd_neighbor_solicitation__update_cache: u64,
    pub icmp6__nd_neighbor_advertisement: u64,
    pub icmp6__nd_neighbor_advertisement__update_cache: u64,
    pub icmp6__nd_redirect: u64,
    pub icmp6__unknown__drop: u64,

    pub udp__pre_parse: u64,
    pub udp__failed_parse__drop: u64,
    pub udp__socket_match: u64,
    pub udp__no_socket_match__respond_unreachable: u64,
    pub udp__no_socket_match__drop: u64,

    pub tcp__pre_parse: u64,
    pub tcp__failed_parse__drop: u64,
    pub tcp__socket_match: u64,
    pub tcp__no_socket_match__respond_rst: u64,
    pub tcp__no_socket_match__drop: u64,
}

/// Counters for the outbound pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketStatsTx {
    pub ether__pre_assemble: u64,
    pub ether__src_unspec__fill: u64,
    pub ether__src_spec: u64,
    pub ether__src_not_owned__drop: u64,
    pub ether__dst_spec__send: u64,
    pub ether__dst_unspec__drop: u64,

    pub ether__dst_unspec__ip4_lookup: u64,
    pub ether__dst_unspec__ip4_lookup__multicast__send: u64,
    pub ether__dst_unspec__ip4_lookup__limited_broadcast__send: u64,
    pub ether__dst_unspec__ip4_lookup__network_broadcast__send: u64,
    pub ether__dst_unspec__ip4_lookup__locnet__arp_cache_hit__send: u64,
    pub ether__dst_unspec__ip4_lookup__locnet__arp_cache_miss__drop: u64,
    pub ether__dst_unspec__ip4_lookup__extnet__gw_arp_cache_hit__send: u64,
    pub ether__dst_unspec__ip4_lookup__extnet__gw_arp_cache_miss__drop: u64,
    pub ether__dst_unspec__ip4_lookup__extnet__no_gw__drop: u64,

    pub ether__dst_unspec__ip6_lookup: u64,
    pub ether__dst_unspec__ip6_lookup__multicast__send: u64,
    pub ether__dst_unspec__ip6_lookup__locnet__nd_cache_hit__send: u64,
    pub ether__dst_unspec__ip6_lookup__locnet__nd_cache_miss__drop: u64,
    pub ether__dst_unspec__ip6_lookup__extnet__gw_nd_cache_hit__send: u64,
    pub ether__dst_unspec__ip6_lookup__extnet__gw_nd_cache_miss__drop: u64,
    pub ether__dst_unspec__ip6_lookup__extnet__no_gw__drop: u64,

    pub arp__pre_assemble: u64,
    pub arp__no_proto_support__drop: u64,
    pub arp__op_request__send: u64,
    pub arp__op_reply__send: u64,

    pub ip4__pre_assemble: u64,
    pub ip4__no_proto_support__drop: u64,
    pub ip4__src_not_owned__drop: u64,
    pub ip4__src_multicast__replace: u64,
    pub ip4__src_multicast__drop: u64,
    pub ip4__src_limited_broadcast__replace: u64,
    pub ip4__src_limited_broadcast__drop: u64,
    pub ip4__src_network_broadcast__replace: u64,
    pub ip4__src_unspecified__replace: u64,
    pub ip4__src_unspecified__drop: u64,
    pub ip4__dst_unspecified__drop: u64,
    pub ip4__mtu_ok__send: u64,
    pub ip4__mtu_exceed__frag: u64,
    pub ip4__mtu_exceed_df_set__drop: u64,

    pub ip6__pre_assemble: u64,
    pub ip6__no_proto_support__drop: u64,
    pub ip6__src_not_owned__drop: u64,
    pub ip6__src_multicast__replace: u64,
    pub ip6__src_multicast__drop: u64,
    pub ip6__src_network_unspecified__replace_local: u64,
    pub ip6__src_network_unspecified__replace_external: u64,
    pub ip6__src_unspecified__drop: u64,
    pub ip6__dst_unspecified__drop: u64,
    pub ip6__mtu_ok__send: u64,
    pub ip6__mtu_exceed__frag: u64,

    pub ip6_ext_frag__pre_assemble: u64,
    pub ip6_ext_frag__send: u64,

    pub udp__pre_assemble: u64,
    pub udp__send: u64,

    pub tcp__pre_assemble: u64,
    pub tcp__send: u64,

    pub icmp4__pre_assemble: u64,
    pub icmp4__echo_request__send: u64,
    pub icmp4__echo_reply__send: u64,
    pub icmp4__unreachable__send: u64,

    pub icmp6__pre_assemble: u64,
    pub icmp6__echo_request__send: u64,
    pub icmp6__echo_reply__send: u64,
    pub icmp6__unreachable__send: u64,
    pub icmp6__nd_neighbor_solicitation__send: u64,
    pub icmp6__nd_neighbor_advertisement__send: u64,
}
