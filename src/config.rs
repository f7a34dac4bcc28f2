//! Stack configuration. A plain value struct: construct, adjust fields,
//! hand to [`Stack::new`](crate::Stack::new).

use std::time::Duration;

use crate::addr::{Ip4Host, Ip6Host, MacAddr};

pub const DEFAULT_MTU: usize = 1500;

#[derive(Clone, Debug)]
pub struct StackConfig {
    pub ip4_support: bool,
    pub ip6_support: bool,
    pub mtu: usize,
    pub mac_address: MacAddr,
    pub tap_interface_name: String,
    pub ip4_host: Vec<Ip4Host>,
    pub ip6_host: Vec<Ip6Host>,
    pub arp_cache_entry_max_age: Duration,
    pub arp_cache_entry_refresh_time: Duration,
    pub nd_cache_entry_max_age: Duration,
    pub nd_cache_entry_refresh_time: Duration,
    pub fragment_timeout: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            ip4_support: true,
            ip6_support: true,
            mtu: DEFAULT_MTU,
            mac_address: MacAddr::UNSPECIFIED,
            tap_interface_name: "tap7".to_string(),
            ip4_host: Vec::new(),
            ip6_host: Vec::new(),
            arp_cache_entry_max_age: Duration::from_secs(3600),
            arp_cache_entry_refresh_time: Duration::from_secs(300),
            nd_cache_entry_max_age: Duration::from_secs(3600),
            nd_cache_entry_refresh_time: Duration::from_secs(300),
            fragment_timeout: Duration::from_secs(5),
        }
    }
}
