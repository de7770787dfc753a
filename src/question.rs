//! Question section format, plus the `RrType`/`RrClass` bimaps shared
//! with `record.rs`.
//!
//! [RFC 1035 §4.1.2](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.2)
//!
//! `RrType`/`RrClass` are newtype wrappers around `u16` rather than
//! closed enums, so an unknown or RFC-undefined value still round-trips
//! losslessly instead of being rejected.

use std::fmt;

use crate::error::Result;
use crate::wire::{Pack, Unpack};

/// A 16-bit resource record / question type, with RFC 1035/2782/3596
/// mnemonics for the ones this crate understands natively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RrType(pub u16);

macro_rules! rr_type_consts {
    ($($name:ident = $val:expr => $mnemonic:expr),* $(,)?) => {
        impl RrType {
            $(pub const $name: RrType = RrType($val);)*

            pub fn name(self) -> &'static str {
                match self {
                    $(RrType::$name => $mnemonic,)*
                    _ => "UNKNOWN",
                }
            }

            pub fn from_name(s: &str) -> Option<RrType> {
                match s.to_ascii_uppercase().as_str() {
                    $($mnemonic => Some(RrType::$name),)*
                    _ => None,
                }
            }
        }
    };
}

rr_type_consts! {
    A = 1 => "A",
    NS = 2 => "NS",
    MD = 3 => "MD",
    MF = 4 => "MF",
    CNAME = 5 => "CNAME",
    SOA = 6 => "SOA",
    MB = 7 => "MB",
    MG = 8 => "MG",
    MR = 9 => "MR",
    NULL = 10 => "NULL",
    WKS = 11 => "WKS",
    PTR = 12 => "PTR",
    HINFO = 13 => "HINFO",
    MINFO = 14 => "MINFO",
    MX = 15 => "MX",
    TXT = 16 => "TXT",
    AAAA = 28 => "AAAA",
    SRV = 33 => "SRV",
    OPT = 41 => "OPT",
    NSEC = 47 => "NSEC",
    AXFR = 252 => "AXFR",
    MAILB = 253 => "MAILB",
    MAILA = 254 => "MAILA",
    ANY = 255 => "ANY",
}

impl RrType {
    pub fn unpack(u: &mut Unpack) -> Result<RrType> {
        Ok(RrType(u.u16()?))
    }

    pub fn pack(self, p: &mut Pack) {
        p.u16(self.0);
    }
}

impl fmt::Display for RrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name() == "UNKNOWN" {
            write!(f, "TYPE{}", self.0)
        } else {
            write!(f, "{}", self.name())
        }
    }
}

impl From<u16> for RrType {
    fn from(v: u16) -> Self {
        RrType(v)
    }
}

/// A 16-bit record/question class.
///
/// mDNS steals the high bit of the class field on the wire: in a
/// Question it means "prefer a unicast response" (RFC 6762 §5.4), in a
/// Resource Record it means "cache flush" (RFC 6762 §10.2). Both are
/// modeled as a separate flag alongside the logical (low 15 bit)
/// class, never folded into `RrClass` itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RrClass(pub u16);

impl RrClass {
    pub const IN: RrClass = RrClass(1);
    pub const CS: RrClass = RrClass(2);
    pub const CH: RrClass = RrClass(3);
    pub const HS: RrClass = RrClass(4);
    /// RFC 2136 prerequisite class meaning "RRset must not exist".
    pub const NONE: RrClass = RrClass(254);
    pub const ANY: RrClass = RrClass(255);

    const HIGH_BIT: u16 = 0x8000;

    pub fn name(self) -> &'static str {
        match self {
            RrClass::IN => "IN",
            RrClass::CS => "CS",
            RrClass::CH => "CH",
            RrClass::HS => "HS",
            RrClass::NONE => "NONE",
            RrClass::ANY => "ANY",
            _ => "UNKNOWN",
        }
    }

    pub fn from_name(s: &str) -> Option<RrClass> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Some(RrClass::IN),
            "CS" => Some(RrClass::CS),
            "CH" => Some(RrClass::CH),
            "HS" => Some(RrClass::HS),
            "NONE" => Some(RrClass::NONE),
            "ANY" => Some(RrClass::ANY),
            _ => None,
        }
    }

    /// Split a raw wire class field into its logical class and the
    /// stolen high bit (cache-flush on RRs, unicast-response on
    /// questions).
    pub fn from_wire(raw: u16) -> (RrClass, bool) {
        (RrClass(raw & !Self::HIGH_BIT), raw & Self::HIGH_BIT != 0)
    }

    pub fn to_wire(self, flag: bool) -> u16 {
        self.0 | if flag { Self::HIGH_BIT } else { 0 }
    }
}

impl fmt::Display for RrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name() == "UNKNOWN" {
            write!(f, "CLASS{}", self.0)
        } else {
            write!(f, "{}", self.name())
        }
    }
}

impl From<u16> for RrClass {
    fn from(v: u16) -> Self {
        RrClass(v)
    }
}

/// `(qname, qtype, qclass)`, plus the mDNS unicast-response bit.
///
/// [RFC 1035 §4.1.2](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.2)
/// ```text
///                                 1  1  1  1  1  1
///   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// /                     QNAME                     /
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                     QTYPE                     |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                     QCLASS                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub qname: String,
    pub qtype: RrType,
    pub qclass: RrClass,
    /// RFC 6762 §5.4: ask the responder to reply unicast rather than
    /// to the multicast group.
    pub unicast_response: bool,
}

impl Question {
    pub fn new(qname: impl Into<String>, qtype: RrType, qclass: RrClass) -> Self {
        Question {
            qname: qname.into(),
            qtype,
            qclass,
            unicast_response: false,
        }
    }

    pub fn pack(&self, p: &mut Pack) -> Result<()> {
        p.domain_name(&self.qname, true)?;
        self.qtype.pack(p);
        p.u16(self.qclass.to_wire(self.unicast_response));
        Ok(())
    }

    pub fn unpack(u: &mut Unpack) -> Result<Self> {
        let qname = u.domain_name()?;
        let qtype = RrType::unpack(u)?;
        let raw_class = u.u16()?;
        let (qclass, unicast_response) = RrClass::from_wire(raw_class);
        Ok(Question { qname, qtype, qclass, unicast_response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_and_class_mnemonics_round_trip() {
        assert_eq!(RrType::from_name("PTR"), Some(RrType::PTR));
        assert_eq!(RrType::PTR.name(), "PTR");
        assert_eq!(RrType(9999).to_string(), "TYPE9999");

        assert_eq!(RrClass::from_name("IN"), Some(RrClass::IN));
        assert_eq!(RrClass::ANY.name(), "ANY");
    }

    #[test]
    fn wire_class_splits_high_bit() {
        let (class, flag) = RrClass::from_wire(0x8001);
        assert_eq!(class, RrClass::IN);
        assert!(flag);
        assert_eq!(RrClass::IN.to_wire(true), 0x8001);
    }

    #[test]
    fn question_pack_unpack_round_trip() {
        let q = Question::new("popd.ix.netcom.com.", RrType::A, RrClass::IN);
        let mut p = Pack::new();
        q.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        let mut u = Unpack::new(&bytes);
        assert_eq!(Question::unpack(&mut u).unwrap(), q);
    }
}
