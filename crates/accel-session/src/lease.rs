//! Address lease records attached to a session.
//!
//! Leases are allocated and reclaimed by the address-pool subsystem. The
//! session only keeps a shared reference so front-ends can configure the
//! link; it never frees or returns them itself.

use std::net::{Ipv4Addr, Ipv6Addr};

/// An IPv4 assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Lease {
    /// Local (gateway) address.
    pub addr: Ipv4Addr,
    /// Subscriber address.
    pub peer_addr: Ipv4Addr,
    /// Prefix length of the subscriber network.
    pub mask: u8,
    /// Name of the pool the lease came from.
    pub pool: Option<String>,
}

/// An IPv6 assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Lease {
    /// Local interface identifier.
    pub intf_id: u64,
    /// Subscriber interface identifier.
    pub peer_intf_id: u64,
    /// Delegated or on-link prefixes.
    pub prefixes: Vec<(Ipv6Addr, u8)>,
    /// Name of the pool the lease came from.
    pub pool: Option<String>,
}
