//! A complete DNS message: header plus its four sections.
//!
//! UDP messages are capped at 512 octets by default; a responder that
//! cannot fit an answer sets the header's `tc` (truncated) bit and the
//! querier is expected to retry over TCP. This crate does not split
//! an over-long answer across multiple UDP datagrams itself — see
//! `Non-goals`.
//!
//! [RFC 1035 §4.1](https://www.rfc-editor.org/rfc/rfc1035#section-4.1)

use crate::error::{MdnsError, Result};
use crate::header::Header;
use crate::question::Question;
use crate::record::ResourceRecord;
use crate::wire::{Pack, Unpack};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MdnsMessage {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl MdnsMessage {
    pub fn new() -> Self {
        MdnsMessage::default()
    }

    /// Pack this message to its wire form. Section counts in the
    /// header are overwritten from the actual `Vec` lengths so callers
    /// never have to keep them in sync by hand.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut p = Pack::new();
        p.begin_message();

        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;
        header.pack(&mut p)?;

        for q in &self.questions {
            q.pack(&mut p)?;
        }
        for rr in &self.answers {
            rr.pack(&mut p)?;
        }
        for rr in &self.authorities {
            rr.pack(&mut p)?;
        }
        for rr in &self.additionals {
            rr.pack(&mut p)?;
        }
        Ok(p.into_bytes())
    }

    /// Decode a message from its wire form. The four section counts
    /// in the header drive how many records are read from each
    /// section; a short buffer surfaces as `MdnsError::Truncation`.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        let mut u = Unpack::new(buf);
        u.begin_message();

        let header = Header::unpack(&mut u)?;

        let questions = (0..header.qdcount)
            .map(|_| Question::unpack(&mut u))
            .collect::<Result<Vec<_>>>()?;
        let answers = (0..header.ancount)
            .map(|_| ResourceRecord::unpack(&mut u))
            .collect::<Result<Vec<_>>>()?;
        let authorities = (0..header.nscount)
            .map(|_| ResourceRecord::unpack(&mut u))
            .collect::<Result<Vec<_>>>()?;
        let additionals = (0..header.arcount)
            .map(|_| ResourceRecord::unpack(&mut u))
            .collect::<Result<Vec<_>>>()?;

        Ok(MdnsMessage { header, questions, answers, authorities, additionals })
    }

    pub fn rcode(&self) -> Result<()> {
        if self.header.rcode != 0 {
            return Err(MdnsError::PacketError(crate::error::RCode::from_u16(
                self.header.rcode as u16,
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{RrClass, RrType};
    use crate::record::RData;
    use std::net::Ipv4Addr;

    #[test]
    fn pack_unpack_is_byte_exact() {
        let mut msg = MdnsMessage::new();
        msg.header.qr = true;
        msg.header.aa = true;
        msg.questions.push(Question::new("host.local.", RrType::A, RrClass::IN));
        msg.answers.push(ResourceRecord::new(
            "host.local.",
            RrClass::IN,
            120,
            RData::A(Ipv4Addr::new(10, 0, 0, 1)),
        ));

        let bytes = msg.pack().unwrap();
        let bytes_again = MdnsMessage::unpack(&bytes).unwrap().pack().unwrap();
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn header_counts_track_section_lengths() {
        let mut msg = MdnsMessage::new();
        msg.answers.push(ResourceRecord::new(
            "a.local.",
            RrClass::IN,
            0,
            RData::Ptr("b.local.".into()),
        ));
        msg.answers.push(ResourceRecord::new(
            "a.local.",
            RrClass::IN,
            0,
            RData::Ptr("c.local.".into()),
        ));
        let bytes = msg.pack().unwrap();
        let decoded = MdnsMessage::unpack(&bytes).unwrap();
        assert_eq!(decoded.header.ancount, 2);
        assert_eq!(decoded.answers.len(), 2);
    }

    #[test]
    fn nonzero_rcode_surfaces_as_packet_error() {
        let mut msg = MdnsMessage::new();
        msg.header.rcode = 3; // NXDOMAIN
        assert!(msg.rcode().is_err());
    }

    #[test]
    fn query_packing_matches_captured_bytes() {
        let mut msg = MdnsMessage::new();
        msg.header.id = 2;
        msg.header.rd = true;
        msg.questions.push(Question::new("popd.ix.netcom.com.", RrType::A, RrClass::IN));

        let bytes = msg.pack().unwrap();
        assert_eq!(bytes.len(), 36);
        assert_eq!(
            bytes,
            vec![
                0x00, 0x02, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04,
                b'p', b'o', b'p', b'd', 0x02, b'i', b'x', 0x06, b'n', b'e', b't', b'c', b'o',
                b'm', 0x03, b'c', b'o', b'm', 0x00, 0x00, 0x01, 0x00, 0x01,
            ]
        );
    }

    #[test]
    fn compression_across_sections_round_trips() {
        let mut msg = MdnsMessage::new();
        msg.questions.push(Question::new("srv.example.com.", RrType::SRV, RrClass::IN));
        msg.answers.push(ResourceRecord::new(
            "srv.example.com.",
            RrClass::IN,
            120,
            RData::Srv { priority: 0, weight: 0, port: 1234, target: "host.example.com.".into() },
        ));
        let bytes = msg.pack().unwrap();
        assert!(bytes.len() < 80, "compression should keep this well under an uncompressed encoding");
        let decoded = MdnsMessage::unpack(&bytes).unwrap();
        assert_eq!(decoded.questions[0].qname, "srv.example.com.");
    }
}
