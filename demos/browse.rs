//! Browse for `_http._tcp.local.` instances over mDNS and log every
//! PTR response that comes back, until the resolver's default 6s
//! timeout ends the listen.

use log::{debug, warn};
use mdns_toolkit::question::{Question, RrClass, RrType};
use mdns_toolkit::resolver::{Resolver, ResolverEvent, Target};

#[tokio::main]
pub async fn main() {
    pretty_env_logger::init_timed();

    let question = Question::new("_http._tcp.local.", RrType::PTR, RrClass::IN);
    let resolver = Resolver::new();

    let mut handle = resolver
        .resolve(vec![question], Target::Multicast)
        .await
        .expect("failed to send mDNS query");

    while let Some(event) = handle.recv().await {
        match event {
            ResolverEvent::Listening(addr) => debug!("listening on {addr}"),
            ResolverEvent::Response { message, from } => {
                for answer in &message.answers {
                    debug!("{from}: {} {:?}", answer.name, answer.rdata);
                }
            }
            ResolverEvent::Error(e) => warn!("resolver error: {e}"),
            ResolverEvent::Timeout => debug!("browse window closed"),
            ResolverEvent::End => break,
        }
    }
}
