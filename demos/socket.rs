//! Two independent owners sharing the same mDNS multicast socket: the
//! second `acquire` reuses the first owner's bound socket instead of
//! trying (and failing) to join the group twice, and the socket is
//! only actually closed once both owners have released it.

use mdns_toolkit::socket::{Family, SocketCache};

#[tokio::main]
pub async fn main() {
    let cache = SocketCache::new();

    let resolver_socket = cache.acquire(Family::V4, true).expect("first acquire binds the socket");
    let advertiser_socket = cache.acquire(Family::V4, true).expect("second acquire reuses it");
    assert!(std::sync::Arc::ptr_eq(&resolver_socket, &advertiser_socket));

    cache.release(Family::V4, true).expect("resolver releases its handle");
    cache.release(Family::V4, true).expect("advertiser releases the last handle, closing the socket");
}
