//! Probe → announce → respond → goodbye state machine for mDNS
//! service publication.
//!
//! [RFC 6762 §8-10](https://www.rfc-editor.org/rfc/rfc6762#section-8)
//!
//! Timing: a 0-250ms random jitter before the first probe, three
//! probes 250ms apart, two announcements 1s apart, and a ~500ms linger
//! after the goodbye packet before the advertiser tears down.
//! Signal handling is a front-end concern — see `shutdown()`.

use std::net::IpAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::error::Result;
use crate::header::Header;
use crate::message::MdnsMessage;
use crate::question::{Question, RrClass, RrType};
use crate::record::{split_service_name, RData, ResourceRecord};
use crate::socket::{MDNS_PORT, MDNS_V4_GROUP};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const PROBE_COUNT: u32 = 3;
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);
const ANNOUNCE_COUNT: u32 = 2;
const GOODBYE_LINGER: Duration = Duration::from_millis(500);
const PROBE_JITTER_MAX_MS: u64 = 250;

/// `_services._dns-sd._udp.<domain>` — RFC 6763 §12's service
/// enumeration magic name.
fn service_enumeration_name(domain: &str) -> String {
    format!("_services._dns-sd._udp.{domain}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    Beginning,
    Probing { probes_sent: u32 },
    Announcing { announces_sent: u32 },
    Responding,
    Goodbye,
}

/// Static description of the service being published.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub service: String,
    pub proto: String,
    pub instance: String,
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub txt: Vec<Vec<u8>>,
    /// RFC 6762 §8.4: skip probing/announcing, go straight to
    /// withdrawing the records (used when re-publishing a service that
    /// is shutting down).
    pub goodbye: bool,
    /// Optional RFC 6762 §10.1 ttl/2 re-announcement; off by default,
    /// since RFC 6762 treats it as optional, not required.
    pub reannounce_at_half_ttl: bool,
}

impl ServiceConfig {
    pub fn service_type(&self) -> String {
        format!("_{}._{}.{}", self.service, self.proto, self.domain)
    }

    pub fn instance_name(&self) -> String {
        format!("{}.{}", self.instance, self.service_type())
    }

    pub fn host_name(&self) -> String {
        format!("{}.{}", self.host, self.domain)
    }
}

/// Events surfaced to the Advertiser's caller: `listening`, `response`,
/// `query`, `error`, `end`.
#[derive(Debug)]
pub enum AdvertiserEvent {
    Listening(std::net::SocketAddr),
    Response(MdnsMessage),
    Query(MdnsMessage),
    Error(String),
    End,
}

/// Probe → announce → respond → goodbye state machine for one
/// published service.
pub struct Advertiser {
    config: ServiceConfig,
    state: State,
    /// RRs we still intend to claim; shrinks during `probing` as
    /// conflicts are discovered. Each record is a (question, RR) pair
    /// so probing can drop one without the other falling out of sync.
    claims: Vec<ResourceRecord>,
    tx: UnboundedSender<AdvertiserEvent>,
    shutdown: std::sync::Arc<Notify>,
}

/// A handle the caller can use to ask a running `Advertiser` to send
/// its goodbye and stop, from outside the task `run()` is driving on.
/// Obtained via `Advertiser::shutdown_handle()` before `run()` takes
/// `self` by value. The front-end is responsible for deciding what
/// triggers this (signal handlers, a process-exit hook, and so on) —
/// the core state machine has no signal handling of its own.
#[derive(Clone)]
pub struct AdvertiserShutdown {
    notify: std::sync::Arc<Notify>,
}

impl AdvertiserShutdown {
    /// Idempotent: a second call is a no-op `Notify::notify_one` with
    /// nothing left to observe.
    pub fn shutdown(&self) {
        self.notify.notify_one();
    }
}

impl Advertiser {
    /// `local_addrs` is supplied by the caller — this crate does not
    /// enumerate network interfaces itself.
    pub fn new(config: ServiceConfig, local_addrs: &[IpAddr]) -> (Self, UnboundedReceiver<AdvertiserEvent>) {
        let (tx, rx) = unbounded_channel();
        let claims = build_claim_set(&config, local_addrs);
        let shutdown = std::sync::Arc::new(Notify::new());
        (Advertiser { config, state: State::Beginning, claims, tx, shutdown }, rx)
    }

    pub fn claims(&self) -> &[ResourceRecord] {
        &self.claims
    }

    /// A cloneable shutdown handle for this advertiser. Call this
    /// before `run()`, since `run()` consumes `self`.
    pub fn shutdown_handle(&self) -> AdvertiserShutdown {
        AdvertiserShutdown { notify: self.shutdown.clone() }
    }

    /// Drive the state machine to completion on the shared mDNS
    /// socket. Exits on an empty claim set (every record conflicted),
    /// an external `shutdown()` call, or an unrecoverable transport
    /// error.
    pub async fn run(mut self, socket: std::sync::Arc<UdpSocket>) -> Result<()> {
        self.tx.send(AdvertiserEvent::Listening(socket.local_addr()?)).ok();

        if self.config.goodbye {
            // RFC 6762 §8.4: a service being withdrawn skips probing and
            // announcing entirely and just sends the goodbye packet.
            self.send_goodbye(&socket).await?;
            self.tx.send(AdvertiserEvent::End).ok();
            return Ok(());
        }

        let mut buf = vec![0u8; 4096];
        // Boxed and pinned so it can be freely replaced with a new
        // duration each tick; `Pin<Box<_>>` is `Unpin` regardless of
        // whether `Sleep` itself is, which is what lets `&mut next_action`
        // be polled directly inside `select!` below.
        let mut next_action: std::pin::Pin<Box<tokio::time::Sleep>> =
            Box::pin(tokio::time::sleep(jittered_probe_delay()));
        let shutdown = self.shutdown.clone();

        loop {
            if self.claims.is_empty() && !matches!(self.state, State::Goodbye) {
                break;
            }

            tokio::select! {
                _ = &mut next_action => {
                    let delay = self.on_tick(&socket).await?;
                    if let Some(d) = delay {
                        next_action = Box::pin(tokio::time::sleep(d));
                    } else {
                        break;
                    }
                }
                recv = socket.recv_from(&mut buf) => {
                    let (n, _from) = recv?;
                    match MdnsMessage::unpack(&buf[..n]) {
                        Ok(msg) => self.on_message(&socket, msg).await?,
                        Err(e) => { self.tx.send(AdvertiserEvent::Error(e.to_string())).ok(); }
                    }
                }
                _ = shutdown.notified() => break,
            }

            if matches!(self.state, State::Responding) {
                // responding has no timer of its own; re-arm a
                // no-op far-future sleep so select! keeps working
                // (a cancelled timer is modeled as "never fires").
                next_action = Box::pin(tokio::time::sleep(Duration::from_secs(3600)));
            }
        }

        if !matches!(self.state, State::Goodbye) && self.state != State::Beginning {
            self.send_goodbye(&socket).await?;
        }
        self.tx.send(AdvertiserEvent::End).ok();
        Ok(())
    }

    /// Advance the state machine by one timer tick. Sends whatever
    /// packet the newly-entered state's entry action requires, then
    /// returns the delay until the next tick (`None` once there's
    /// nothing left to schedule).
    async fn on_tick(&mut self, socket: &UdpSocket) -> Result<Option<Duration>> {
        match self.state {
            State::Beginning => {
                self.state = State::Probing { probes_sent: 1 };
                self.send_probe(socket).await?;
                Ok(Some(PROBE_INTERVAL))
            }
            State::Probing { probes_sent } if probes_sent < PROBE_COUNT => {
                self.state = State::Probing { probes_sent: probes_sent + 1 };
                self.send_probe(socket).await?;
                Ok(Some(PROBE_INTERVAL))
            }
            State::Probing { .. } => {
                info!("probing done, {} claims surviving, announcing", self.claims.len());
                self.state = State::Announcing { announces_sent: 1 };
                self.send_announce(socket).await?;
                Ok(Some(ANNOUNCE_INTERVAL))
            }
            State::Announcing { announces_sent } if announces_sent < ANNOUNCE_COUNT => {
                self.state = State::Announcing { announces_sent: announces_sent + 1 };
                self.send_announce(socket).await?;
                Ok(Some(ANNOUNCE_INTERVAL))
            }
            State::Announcing { .. } => {
                info!("announced {}, now responding", self.config.instance_name());
                self.state = State::Responding;
                // RFC 6762 §10.2: the cache-flush bit is only meaningful
                // on the announcement itself; clear it before we start
                // answering individual queries as a normal responder.
                for claim in &mut self.claims {
                    claim.cache_flush = false;
                }
                Ok(Some(Duration::from_secs(3600)))
            }
            State::Responding => Ok(Some(Duration::from_secs(3600))),
            State::Goodbye => Ok(None),
        }
    }

    /// `probing` entry action: an mDNS query asking "does anyone own
    /// these records?", carrying our claims as authority-section
    /// assertions.
    async fn send_probe(&self, socket: &UdpSocket) -> Result<()> {
        let mut msg = MdnsMessage::new();
        msg.questions = probe_questions(&self.claims);
        msg.authorities = self.claims.clone();
        self.send(socket, &msg).await
    }

    /// `announcing` entry action: an unsolicited response asserting
    /// ownership, cache-flush bit set on every claimed record.
    async fn send_announce(&mut self, socket: &UdpSocket) -> Result<()> {
        for claim in &mut self.claims {
            claim.cache_flush = true;
        }
        let mut header = Header::new();
        header.qr = true;
        header.aa = true;
        let mut msg = MdnsMessage::new();
        msg.header = header;
        msg.answers = self.claims.clone();
        self.send(socket, &msg).await
    }

    async fn on_message(&mut self, socket: &UdpSocket, msg: MdnsMessage) -> Result<()> {
        match self.state {
            State::Probing { .. } => {
                // Queries are ignored while probing; only authoritative
                // responses can cause a conflict.
                if msg.header.qr && msg.header.aa {
                    // A PacketError here is the remote's problem, but it
                    // means we can't trust this exchange to resolve our
                    // probe — end the advertiser rather than proceed.
                    if let Err(e) = msg.rcode() {
                        self.tx.send(AdvertiserEvent::Error(e.to_string())).ok();
                        return Err(e);
                    }
                    self.resolve_probe_conflict(&msg);
                    self.tx.send(AdvertiserEvent::Response(msg)).ok();
                }
            }
            State::Responding => {
                if !msg.header.qr {
                    self.respond_to_query(socket, &msg).await?;
                    self.tx.send(AdvertiserEvent::Query(msg)).ok();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// RFC 6762 §8.2: drop any claim whose (name, type) is answered by
    /// someone else's authoritative response.
    fn resolve_probe_conflict(&mut self, msg: &MdnsMessage) {
        self.claims.retain(|claim| {
            !msg.answers
                .iter()
                .any(|ans| ans.name == claim.name && ans.rtype == claim.rtype)
        });
    }

    async fn respond_to_query(&self, socket: &UdpSocket, query: &MdnsMessage) -> Result<()> {
        let mut answers = Vec::new();

        for question in &query.questions {
            if question.qname == service_enumeration_name(&self.config.domain)
                && matches!(question.qtype, RrType::PTR | RrType::ANY)
            {
                answers.push(ResourceRecord::new(
                    question.qname.clone(),
                    RrClass::IN,
                    4500,
                    RData::Ptr(self.config.service_type()),
                ));
                continue;
            }

            for claim in &self.claims {
                let type_matches = question.qtype == claim.rtype || question.qtype == RrType::ANY;
                let class_matches = question.qclass == claim.rclass || question.qclass == RrClass::ANY;
                if question.qname == claim.name && type_matches && class_matches {
                    answers.push(claim.clone());
                }
            }
        }

        if answers.is_empty() {
            return Ok(());
        }

        let mut header = Header::new();
        header.id = query.header.id;
        header.qr = true;
        header.aa = true;
        let mut response = MdnsMessage::new();
        response.header = header;
        response.answers = answers;

        self.send(socket, &response).await
    }

    async fn send(&self, socket: &UdpSocket, msg: &MdnsMessage) -> Result<()> {
        let bytes = msg.pack()?;
        socket.send_to(&bytes, (IpAddr::V4(MDNS_V4_GROUP), MDNS_PORT)).await?;
        Ok(())
    }

    async fn send_goodbye(&mut self, socket: &UdpSocket) -> Result<()> {
        self.state = State::Goodbye;
        let mut header = Header::new();
        header.qr = true;
        header.aa = true;
        let mut msg = MdnsMessage::new();
        msg.header = header;
        msg.answers = self
            .claims
            .iter()
            .cloned()
            .map(|mut rr| {
                rr.ttl = 0;
                rr
            })
            .collect();
        if !msg.answers.is_empty() {
            self.send(socket, &msg).await?;
        }
        tokio::time::sleep(GOODBYE_LINGER).await;
        Ok(())
    }
}

fn jittered_probe_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=PROBE_JITTER_MAX_MS))
}

/// Build the candidate RR set for a service: PTR (service type →
/// instance), SRV (instance → host:port), TXT (optional), and A/AAAA
/// for every supplied local address.
fn build_claim_set(config: &ServiceConfig, local_addrs: &[IpAddr]) -> Vec<ResourceRecord> {
    let mut rrs = Vec::new();

    rrs.push(ResourceRecord::new(
        config.service_type(),
        RrClass::IN,
        4500,
        RData::Ptr(config.instance_name()),
    ));

    rrs.push(ResourceRecord::new(
        config.instance_name(),
        RrClass::IN,
        120,
        RData::Srv { priority: 0, weight: 0, port: config.port, target: config.host_name() },
    ));

    if !config.txt.is_empty() {
        rrs.push(ResourceRecord::new(config.instance_name(), RrClass::IN, 4500, RData::Txt(config.txt.clone())));
    }

    for addr in local_addrs {
        match addr {
            IpAddr::V4(ip) => rrs.push(ResourceRecord::new(config.host_name(), RrClass::IN, 120, RData::A(*ip))),
            IpAddr::V6(ip) => rrs.push(ResourceRecord::new(config.host_name(), RrClass::IN, 120, RData::Aaaa(*ip))),
        }
    }

    rrs
}

/// Build the probe-phase question set (one Question per claimed
/// name/type), used as authority-section claims during `probing`.
pub fn probe_questions(claims: &[ResourceRecord]) -> Vec<Question> {
    claims
        .iter()
        .map(|rr| Question::new(rr.name.clone(), rr.rtype, rr.rclass))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            service: "http".into(),
            proto: "tcp".into(),
            instance: "My Printer".into(),
            domain: "local".into(),
            host: "myhost".into(),
            port: 80,
            txt: vec![],
            goodbye: false,
            reannounce_at_half_ttl: false,
        }
    }

    #[test]
    fn claim_set_includes_ptr_srv_and_address_records() {
        let addrs = vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))];
        let claims = build_claim_set(&test_config(), &addrs);
        assert!(claims.iter().any(|r| r.rtype == RrType::PTR));
        assert!(claims.iter().any(|r| r.rtype == RrType::SRV));
        assert!(claims.iter().any(|r| r.rtype == RrType::A));
    }

    #[test]
    fn service_enumeration_magic_name_is_well_formed() {
        assert_eq!(service_enumeration_name("local"), "_services._dns-sd._udp.local");
    }

    #[test]
    fn conflict_removes_only_the_matching_record() {
        let addrs = vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))];
        let config = test_config();
        let (mut adv, _rx) = Advertiser::new(config.clone(), &addrs);
        let before = adv.claims.len();

        let mut conflicting = MdnsMessage::new();
        conflicting.header.qr = true;
        conflicting.header.aa = true;
        conflicting.answers.push(ResourceRecord::new(
            config.host_name(),
            RrClass::IN,
            120,
            RData::A(Ipv4Addr::new(10, 0, 0, 1)),
        ));

        adv.resolve_probe_conflict(&conflicting);
        assert_eq!(adv.claims.len(), before - 1);
        assert!(adv.claims.iter().all(|c| c.rtype != RrType::A));
    }

    #[test]
    fn split_service_name_parses_the_service_type() {
        let config = test_config();
        assert!(split_service_name(&config.service_type()).is_some());
    }
}
