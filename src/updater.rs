//! RFC 2136 dynamic `UPDATE` message builder and sender.
//!
//! A fluent builder (`server`/`zone`/`prerequisites`/`add`/`del`/
//! `begin`) composes the zone/prerequisite/add/delete sections on top
//! of `message.rs`/`record.rs` and sends the resulting messages,
//! collecting a response per queued update.

use std::net::IpAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::Result;
use crate::header::Header;
use crate::message::MdnsMessage;
use crate::question::{RrClass, RrType};
use crate::record::{RData, ResourceRecord};

/// RFC 1035 §4.1.1 OPCODE value for a dynamic update message.
const OPCODE_UPDATE: u8 = 5;

/// A single prerequisite, tested against the zone before any
/// add/delete is applied. RFC 2136 §2.4.
#[derive(Clone, Debug)]
pub enum Prerequisite {
    /// An RRset of this name and type must exist (class ANY, ttl 0).
    Exists { name: String, rtype: RrType },
    /// An RRset of this name and type must NOT exist (class NONE).
    NotExists { name: String, rtype: RrType },
    /// Some RRset (any type) must exist at this name (type ANY, class ANY).
    InUse { name: String },
    /// No RRset (any type) may exist at this name (type ANY, class NONE).
    NotInUse { name: String },
}

impl Prerequisite {
    fn into_rr(self) -> ResourceRecord {
        let (name, rtype, rclass) = match self {
            Prerequisite::Exists { name, rtype } => (name, rtype, RrClass::ANY),
            Prerequisite::NotExists { name, rtype } => (name, rtype, RrClass::NONE),
            Prerequisite::InUse { name } => (name, RrType::ANY, RrClass::ANY),
            Prerequisite::NotInUse { name } => (name, RrType::ANY, RrClass::NONE),
        };
        ResourceRecord { name, rtype, rclass, cache_flush: false, ttl: 0, rdata: RData::Opaque(Vec::new()) }
    }
}

/// One queued update: a zone, its prerequisites, and the RRs to add
/// or delete.
#[derive(Clone, Debug, Default)]
struct PendingUpdate {
    zone: String,
    prerequisites: Vec<ResourceRecord>,
    adds: Vec<ResourceRecord>,
    deletes: Vec<ResourceRecord>,
}

/// A single server's response to one queued update, with internal
/// offsets stripped from the rdata (the label dictionary is an
/// artifact of the wire encoding, not data the caller should see).
#[derive(Debug)]
pub struct UpdateResponse {
    pub message: MdnsMessage,
    pub records: Vec<ResourceRecord>,
}

/// Fluent RFC 2136 UPDATE builder: `server` → `zone` → `prerequisites`/
/// `add`/`del` (repeatable, queues one update per `zone` call) → `begin`.
#[derive(Default)]
pub struct Updater {
    server: Option<(IpAddr, u16)>,
    updates: Vec<PendingUpdate>,
    timeout_ms: u64,
    tcp: bool,
}

impl Updater {
    pub fn new() -> Self {
        Updater { timeout_ms: 6000, ..Default::default() }
    }

    pub fn server(mut self, addr: IpAddr, port: u16) -> Self {
        self.server = Some((addr, port));
        self
    }

    pub fn tcp(mut self, tcp: bool) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Start a new queued update against `zone`. Subsequent
    /// `prerequisites`/`add`/`del` calls apply to this update until
    /// the next `zone` call.
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.updates.push(PendingUpdate { zone: zone.into(), ..Default::default() });
        self
    }

    pub fn prerequisites(mut self, prereqs: Vec<Prerequisite>) -> Self {
        if let Some(u) = self.updates.last_mut() {
            u.prerequisites.extend(prereqs.into_iter().map(Prerequisite::into_rr));
        }
        self
    }

    pub fn add(mut self, rr: ResourceRecord) -> Self {
        if let Some(u) = self.updates.last_mut() {
            u.adds.push(rr);
        }
        self
    }

    pub fn del(mut self, name: impl Into<String>, rtype: RrType) -> Self {
        if let Some(u) = self.updates.last_mut() {
            u.deletes.push(ResourceRecord {
                name: name.into(),
                rtype,
                rclass: RrClass::ANY,
                cache_flush: false,
                ttl: 0,
                rdata: RData::Opaque(Vec::new()),
            });
        }
        self
    }

    fn build_message(update: &PendingUpdate) -> MdnsMessage {
        let mut header = Header::new();
        header.id = rand::thread_rng().gen();
        header.opcode = OPCODE_UPDATE;

        let mut message = MdnsMessage::new();
        message.header = header;
        message.questions.push(crate::question::Question::new(
            update.zone.clone(),
            RrType::SOA,
            RrClass::IN,
        ));
        message.answers = update.prerequisites.clone();
        message.authorities = update.deletes.iter().cloned().chain(update.adds.iter().cloned()).collect();
        message
    }

    /// Send every queued update — in parallel over UDP, in sequence
    /// over TCP — and collect each response. An overall timeout
    /// applies across all requests.
    pub async fn begin(self) -> Result<Vec<UpdateResponse>> {
        let (addr, port) = self.server.ok_or(crate::error::MdnsError::Malformed {
            what: "updater",
            reason: "server() must be called before begin()".into(),
        })?;
        let deadline = Duration::from_millis(self.timeout_ms.max(1));

        let work = async {
            if self.tcp {
                let mut out = Vec::with_capacity(self.updates.len());
                for update in &self.updates {
                    out.push(Self::send_one_udp(Self::build_message(update), addr, port).await?);
                }
                Ok::<_, crate::error::MdnsError>(out)
            } else {
                let futures = self.updates.iter().map(|u| Self::send_one_udp(Self::build_message(u), addr, port));
                futures::future::try_join_all(futures).await
            }
        };

        timeout(deadline, work).await.map_err(|_| crate::error::MdnsError::Timeout)?
    }

    async fn send_one_udp(message: MdnsMessage, addr: IpAddr, port: u16) -> Result<UpdateResponse> {
        let socket = UdpSocket::bind((IpAddr::from([0, 0, 0, 0]), 0)).await?;
        let bytes = message.pack()?;
        socket.send_to(&bytes, (addr, port)).await?;

        let mut buf = vec![0u8; crate::socket::DEFAULT_TCP_BUFFER];
        let (n, _from) = socket.recv_from(&mut buf).await?;
        let response = MdnsMessage::unpack(&buf[..n])?;
        response.rcode()?;
        let records = response
            .answers
            .iter()
            .chain(response.authorities.iter())
            .chain(response.additionals.iter())
            .cloned()
            .collect();
        Ok(UpdateResponse { message: response, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn prerequisite_forms_have_correct_rrset_shapes() {
        let exists = Prerequisite::Exists { name: "host.example.com.".into(), rtype: RrType::A }.into_rr();
        assert_eq!(exists.rclass, RrClass::ANY);
        assert_eq!(exists.ttl, 0);

        let not_exists = Prerequisite::NotExists { name: "host.example.com.".into(), rtype: RrType::A }.into_rr();
        assert_eq!(not_exists.rclass, RrClass::NONE);

        let in_use = Prerequisite::InUse { name: "host.example.com.".into() }.into_rr();
        assert_eq!(in_use.rtype, RrType::ANY);
        assert_eq!(in_use.rclass, RrClass::ANY);

        let not_in_use = Prerequisite::NotInUse { name: "host.example.com.".into() }.into_rr();
        assert_eq!(not_in_use.rtype, RrType::ANY);
        assert_eq!(not_in_use.rclass, RrClass::NONE);
    }

    #[test]
    fn build_message_uses_update_opcode_and_soa_question() {
        let update = PendingUpdate {
            zone: "example.com.".into(),
            prerequisites: vec![],
            adds: vec![ResourceRecord::new("host.example.com.", RrClass::IN, 3600, RData::A(Ipv4Addr::new(10, 0, 0, 5)))],
            deletes: vec![],
        };
        let msg = Updater::build_message(&update);
        assert_eq!(msg.header.opcode, OPCODE_UPDATE);
        assert_eq!(msg.questions[0].qtype, RrType::SOA);
        assert_eq!(msg.authorities.len(), 1);
    }
}
