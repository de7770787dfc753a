//! Multicast socket creation and a process-wide refcounted cache.
//!
//! Sockets are shared by `(family, multicast)` key: two `Advertiser`s
//! and a `Resolver` bound to the same group in the same process must
//! not each try to join it a second time, nor tear it down while a
//! sibling still holds it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ops::BitAnd;
use std::sync::{Arc, Mutex};

use bitvec::prelude::*;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{MdnsError, Result};

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_V4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_V6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);
pub const MULTICAST_TTL: u32 = 255;
pub const DEFAULT_UDP_BUFFER: usize = 512;
pub const DEFAULT_TCP_BUFFER: usize = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    family: Family,
    multicast: bool,
}

struct CacheEntry {
    socket: Arc<UdpSocket>,
    refcount: usize,
}

/// A process-wide cache of multicast/unicast sockets, one entry per
/// `(family, multicast)` pair, refcounted across `acquire`/`release`.
#[derive(Default)]
pub struct SocketCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl SocketCache {
    pub fn new() -> Self {
        SocketCache { entries: Mutex::new(HashMap::new()) }
    }

    /// Borrow (creating if necessary) the shared socket for `family`.
    /// When `multicast` is true the socket joins the mDNS group and
    /// binds port 5353; otherwise it binds an ephemeral port for
    /// one-shot unicast queries.
    pub fn acquire(&self, family: Family, multicast: bool) -> Result<Arc<UdpSocket>> {
        let key = CacheKey { family, multicast };
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refcount += 1;
            debug!("reusing cached socket for {key:?}, refcount now {}", entry.refcount);
            return Ok(entry.socket.clone());
        }

        let socket = Arc::new(build_socket(family, multicast)?);
        entries.insert(key, CacheEntry { socket: socket.clone(), refcount: 1 });
        Ok(socket)
    }

    /// Release a handle acquired for `(family, multicast)`. The
    /// underlying socket is dropped once the refcount reaches zero.
    pub fn release(&self, family: Family, multicast: bool) -> Result<()> {
        let key = CacheKey { family, multicast };
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&key) {
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                Ok(())
            }
            Some(_) => {
                entries.remove(&key);
                Ok(())
            }
            None => Err(MdnsError::SocketCache("release called without a matching acquire")),
        }
    }
}

fn build_socket(family: Family, multicast: bool) -> Result<UdpSocket> {
    let (domain, proto) = match family {
        Family::V4 => (Domain::IPV4, Protocol::UDP),
        Family::V6 => (Domain::IPV6, Protocol::UDP),
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(proto))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(target_os = "windows"))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = match family {
        Family::V4 => SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            if multicast { MDNS_PORT } else { 0 },
        )),
        Family::V6 => SocketAddr::V6(SocketAddrV6::new(
            Ipv6Addr::UNSPECIFIED,
            if multicast { MDNS_PORT } else { 0 },
            0,
            0,
        )),
    };
    socket.bind(&SockAddr::from(bind_addr))?;

    if multicast {
        match family {
            Family::V4 => socket.join_multicast_v4(&MDNS_V4_GROUP, &Ipv4Addr::UNSPECIFIED)?,
            Family::V6 => socket.join_multicast_v6(&MDNS_V6_GROUP, 0)?,
        }
        socket.set_multicast_ttl_v4(MULTICAST_TTL).ok();
        socket.set_unicast_hops_v6(MULTICAST_TTL).ok();
        info!("joined mDNS group for {family:?}");
    } else {
        debug!("bound ephemeral {family:?} socket");
    }

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Attempt to bind port 5353 without `SO_REUSEPORT`, to detect whether
/// another mDNS responder already holds it on this host.
///
/// [RFC 6762 §15.1](https://www.rfc-editor.org/rfc/rfc6762#section-15.1)
pub async fn check_unique_responder() -> Result<()> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    #[cfg(not(target_os = "windows"))]
    socket.set_reuse_port(false)?;
    let address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT);
    socket.bind(&SockAddr::from(address))?;
    Ok(())
}

/// RFC 6762 §11 source-address check: is `source_ip` on the same
/// network as `host_ip`, given `host_subnet`?
pub fn is_reachable_ipv4(host_ip: &Ipv4Addr, host_subnet: &Ipv4Addr, source_ip: &Ipv4Addr) -> bool {
    let host_network = host_ip.octets().into_bitarray::<Msb0>().bitand(host_subnet.octets().into_bitarray());
    let source_network = source_ip.octets().into_bitarray::<Msb0>().bitand(host_subnet.octets().into_bitarray());
    host_network == source_network
}

/// RFC 6762 §11 source-address check for IPv6.
pub fn is_reachable_ipv6(host_ip: &Ipv6Addr, host_subnet: &Ipv6Addr, source_ip: &Ipv6Addr) -> bool {
    let host_network = host_ip.octets().into_bitarray::<Msb0>().bitand(host_subnet.octets().into_bitarray());
    let source_network = source_ip.octets().into_bitarray::<Msb0>().bitand(host_subnet.octets().into_bitarray());
    host_network == source_network
}

pub fn family_of(addr: &IpAddr) -> Family {
    match addr {
        IpAddr::V4(_) => Family::V4,
        IpAddr::V6(_) => Family::V6,
    }
}

/// Every non-loopback address on every local interface, for the
/// Advertiser to build its A/AAAA answer set from.
pub fn local_addresses() -> Result<Vec<IpAddr>> {
    let ifaces = if_addrs::get_if_addrs()?;
    Ok(ifaces
        .into_iter()
        .map(|i| i.ip())
        .filter(|ip| !ip.is_loopback())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_reachability_matches_subnet() {
        assert!(is_reachable_ipv4(
            &Ipv4Addr::new(192, 168, 1, 1),
            &Ipv4Addr::new(255, 255, 255, 0),
            &Ipv4Addr::new(192, 168, 1, 30),
        ));
        assert!(!is_reachable_ipv4(
            &Ipv4Addr::new(192, 168, 1, 1),
            &Ipv4Addr::new(255, 255, 255, 0),
            &Ipv4Addr::new(192, 168, 2, 30),
        ));
    }

    #[test]
    fn ipv6_reachability_matches_subnet() {
        let host = Ipv6Addr::new(0xfd48, 0xa12f, 0x7b0c, 0x3da8, 0, 0, 0, 0);
        let subnet = Ipv6Addr::new(0xffff, 0xffff, 0xffff, 0xffff, 0, 0, 0, 0);
        assert!(is_reachable_ipv6(&host, &subnet, &Ipv6Addr::new(0xfd48, 0xa12f, 0x7b0c, 0x3da8, 0, 0, 0, 0xabcd)));
        assert!(!is_reachable_ipv6(&host, &subnet, &Ipv6Addr::new(0xfd48, 0xa12f, 0x7b0c, 0x3da9, 0, 0, 0, 0xabcd)));
    }

    #[test]
    fn release_without_acquire_is_an_error() {
        let cache = SocketCache::new();
        assert!(cache.release(Family::V4, true).is_err());
    }
}
