//! One-shot unicast or multicast (mDNS) query pipeline.
//!
//! Each outstanding query is demultiplexed by its own random message
//! `id`, so concurrent questions on the same socket never cross wires.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::error::Result;
use crate::header::Header;
use crate::message::MdnsMessage;
use crate::question::Question;
use crate::socket::{Family, SocketCache, MDNS_PORT, MDNS_V4_GROUP};

/// Where to send the query: a specific unicast server, or the shared
/// mDNS multicast group.
pub enum Target {
    Unicast { addr: IpAddr, port: u16 },
    Multicast,
}

/// Events surfaced to the resolver's caller: `listening`, `response`,
/// `error`, `timeout`, `end`.
#[derive(Debug)]
pub enum ResolverEvent {
    Listening(SocketAddr),
    Response { message: MdnsMessage, from: SocketAddr },
    Error(String),
    Timeout,
    End,
}

/// Global timeout default (milliseconds); `0` disables it.
pub const DEFAULT_TIMEOUT_MS: u64 = 6000;

struct PendingRequest {
    id: u16,
}

/// A running query: the event stream plus an explicit `close()` the
/// caller can use to end an mDNS listen early.
/// Dropping the handle without calling `close()` also ends the
/// background task, since the `Notify` and channel are only reachable
/// through it.
pub struct ResolverHandle {
    rx: UnboundedReceiver<ResolverEvent>,
    close: Arc<Notify>,
}

impl ResolverHandle {
    pub async fn recv(&mut self) -> Option<ResolverEvent> {
        self.rx.recv().await
    }

    /// Idempotent: a second call is a no-op `Notify::notify_one` that
    /// nothing is left to observe.
    pub fn close(&self) {
        self.close.notify_one();
    }
}

/// One-shot query pipeline: send `questions`, collect every response
/// whose `id` matches the outstanding request, until `timeout_ms`
/// elapses, the caller calls `close()`, or (unicast) the single
/// matching response arrives.
pub struct Resolver {
    socket_cache: Option<Arc<SocketCache>>,
    timeout_ms: u64,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver { socket_cache: None, timeout_ms: DEFAULT_TIMEOUT_MS }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_socket_cache(mut self, cache: Arc<SocketCache>) -> Self {
        self.socket_cache = Some(cache);
        self
    }

    /// Send `questions` and spawn the listening loop in the
    /// background, returning immediately with a handle the caller
    /// drains at its own pace (the unicast case still ends itself
    /// after the first matching response; the mDNS case keeps
    /// listening until timeout/close).
    pub async fn resolve(self, questions: Vec<Question>, target: Target) -> Result<ResolverHandle> {
        let (tx, rx) = unbounded_channel();
        let close = Arc::new(Notify::new());

        let (socket, cache_guard) = match &target {
            Target::Unicast { .. } => {
                (Arc::new(UdpSocket::bind((IpAddr::from([0, 0, 0, 0]), 0)).await?), None)
            }
            Target::Multicast => {
                let cache = self.socket_cache.clone().unwrap_or_else(|| Arc::new(SocketCache::new()));
                let shared = cache.acquire(Family::V4, true)?;
                (shared, Some(cache))
            }
        };

        tx.send(ResolverEvent::Listening(socket.local_addr()?)).ok();

        let timeout_ms = self.timeout_ms;
        let close_task = close.clone();
        tokio::spawn(async move {
            drive(socket, questions, target, tx, timeout_ms, close_task).await;
            // Release the shared multicast socket only after the
            // listen loop has actually stopped using it.
            if let Some(cache) = cache_guard {
                cache.release(Family::V4, true).ok();
            }
        });

        Ok(ResolverHandle { rx, close })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive(
    socket: Arc<UdpSocket>,
    questions: Vec<Question>,
    target: Target,
    tx: UnboundedSender<ResolverEvent>,
    timeout_ms: u64,
    close: Arc<Notify>,
) {
    let id = rand::thread_rng().gen::<u16>();
    let pending = PendingRequest { id };

    let mut header = Header::new();
    header.id = pending.id;
    header.rd = true;
    let mut message = MdnsMessage::new();
    message.header = header;
    message.questions = questions;

    let bytes = match message.pack() {
        Ok(b) => b,
        Err(e) => {
            tx.send(ResolverEvent::Error(e.to_string())).ok();
            tx.send(ResolverEvent::End).ok();
            return;
        }
    };

    let dest = match &target {
        Target::Unicast { addr, port } => SocketAddr::new(*addr, *port),
        Target::Multicast => SocketAddr::new(IpAddr::V4(MDNS_V4_GROUP), MDNS_PORT),
    };
    if let Err(e) = socket.send_to(&bytes, dest).await {
        tx.send(ResolverEvent::Error(e.to_string())).ok();
        tx.send(ResolverEvent::End).ok();
        return;
    }

    let unicast = matches!(target, Target::Unicast { .. });
    let mut buf = vec![0u8; 4096];

    let deadline = if timeout_ms == 0 { None } else { Some(Duration::from_millis(timeout_ms)) };

    loop {
        let recv = socket.recv_from(&mut buf);
        tokio::select! {
            _ = close.notified() => break,
            outcome = async { match deadline {
                Some(d) => timeout(d, recv).await,
                None => Ok(recv.await),
            } } => {
                let (n, from) = match outcome {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        tx.send(ResolverEvent::Error(e.to_string())).ok();
                        break;
                    }
                    Err(_) => {
                        tx.send(ResolverEvent::Timeout).ok();
                        break;
                    }
                };

                let parsed = match MdnsMessage::unpack(&buf[..n]) {
                    Ok(m) => m,
                    Err(e) => {
                        tx.send(ResolverEvent::Error(e.to_string())).ok();
                        continue;
                    }
                };

                if parsed.header.id != pending.id {
                    continue;
                }

                if let Err(e) = parsed.rcode() {
                    tx.send(ResolverEvent::Error(e.to_string())).ok();
                    if unicast {
                        break;
                    }
                    continue;
                }

                tx.send(ResolverEvent::Response { message: parsed, from }).ok();
                if unicast {
                    break;
                }
            }
        }
    }

    tx.send(ResolverEvent::End).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{RrClass, RrType};

    #[tokio::test]
    async fn unicast_query_times_out_without_a_server() {
        let resolver = Resolver::new().with_timeout_ms(50);
        let q = Question::new("example.invalid.", RrType::A, RrClass::IN);
        let mut handle = resolver
            .resolve(vec![q], Target::Unicast { addr: "127.0.0.1".parse().unwrap(), port: 1 })
            .await
            .unwrap();

        let mut saw_timeout_or_error = false;
        while let Some(ev) = handle.recv().await {
            match ev {
                ResolverEvent::Timeout | ResolverEvent::Error(_) => saw_timeout_or_error = true,
                ResolverEvent::End => break,
                _ => {}
            }
        }
        assert!(saw_timeout_or_error);
    }

    #[tokio::test]
    async fn close_ends_a_listen_with_no_timeout() {
        // timeout disabled (0): without an explicit close() this would
        // wait forever for a response that never comes.
        let resolver = Resolver::new().with_timeout_ms(0);
        let q = Question::new("example.invalid.", RrType::A, RrClass::IN);
        let mut handle = resolver
            .resolve(vec![q], Target::Unicast { addr: "127.0.0.1".parse().unwrap(), port: 1 })
            .await
            .unwrap();

        // Give the spawned task a moment to reach its recv loop, then
        // ask it to stop; `End` must still arrive even with no timeout.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();

        let mut saw_end = false;
        while let Some(ev) = handle.recv().await {
            if matches!(ev, ResolverEvent::End) {
                saw_end = true;
                break;
            }
        }
        assert!(saw_end);
    }
}
