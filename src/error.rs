use std::io;

use thiserror::Error;

/// Errors produced by the wire codec, the socket layer, and the three
/// high-level behaviors (Resolver, Updater, Advertiser).
///
/// Codec errors (`Truncation`, `Malformed`) are attached to the
/// `Unpack`/`Pack` cursor that produced them and short-circuit the
/// operation in progress; higher layers propagate them with `?`.
#[derive(Debug, Error)]
pub enum MdnsError {
    /// The buffer ran out before a fixed-size field could be read or
    /// written. Distinct from `Malformed` because a caller mid-pack
    /// (e.g. an RR that pre-reserved its rdlength slot) may want to
    /// recover the reserved space rather than abort outright.
    #[error("truncated {field} at offset {offset}")]
    Truncation { field: &'static str, offset: usize },

    /// The value itself is out of spec: a label or name too long, a
    /// compression pointer to an offset that hasn't been seen yet or
    /// that loops, an invalid address literal, a non-zero header Z
    /// bit, and so on.
    #[error("malformed {what}: {reason}")]
    Malformed {
        what: &'static str,
        reason: String,
    },

    /// A DNS response carried a non-zero RCODE.
    #[error("packet error: {0}")]
    PacketError(RCode),

    /// The OS reported a send/recv failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The per-request or global timer fired before a matching
    /// response arrived.
    #[error("timed out waiting for a response")]
    Timeout,

    /// `acquire`/`release` was called on the shared socket cache in an
    /// inconsistent way (e.g. releasing a handle that was never
    /// acquired).
    #[error("socket cache misuse: {0}")]
    SocketCache(&'static str),
}

pub type Result<T> = std::result::Result<T, MdnsError>;

/// Response codes carried by `MdnsError::PacketError`.
///
/// [RFC 1035 §4.1.1](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.1),
/// extended with the EDNS0/TSIG extended codes from later RFCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    YxDomain,
    YxRrSet,
    NxRrSet,
    NotAuth,
    NotZone,
    BadVersOrBadSig,
    BadKey,
    BadTime,
    BadMode,
    BadName,
    BadAlg,
    BadTrunc,
    Unknown(u16),
}

impl RCode {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => RCode::NoError,
            1 => RCode::FormErr,
            2 => RCode::ServFail,
            3 => RCode::NxDomain,
            4 => RCode::NotImp,
            5 => RCode::Refused,
            6 => RCode::YxDomain,
            7 => RCode::YxRrSet,
            8 => RCode::NxRrSet,
            9 => RCode::NotAuth,
            10 => RCode::NotZone,
            16 => RCode::BadVersOrBadSig,
            17 => RCode::BadKey,
            18 => RCode::BadTime,
            19 => RCode::BadMode,
            20 => RCode::BadName,
            21 => RCode::BadAlg,
            22 => RCode::BadTrunc,
            other => RCode::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RCode::NoError => 0,
            RCode::FormErr => 1,
            RCode::ServFail => 2,
            RCode::NxDomain => 3,
            RCode::NotImp => 4,
            RCode::Refused => 5,
            RCode::YxDomain => 6,
            RCode::YxRrSet => 7,
            RCode::NxRrSet => 8,
            RCode::NotAuth => 9,
            RCode::NotZone => 10,
            RCode::BadVersOrBadSig => 16,
            RCode::BadKey => 17,
            RCode::BadTime => 18,
            RCode::BadMode => 19,
            RCode::BadName => 20,
            RCode::BadAlg => 21,
            RCode::BadTrunc => 22,
            RCode::Unknown(v) => v,
        }
    }
}

impl std::fmt::Display for RCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RCode::NoError => "NOERROR",
            RCode::FormErr => "FORMERR",
            RCode::ServFail => "SERVFAIL",
            RCode::NxDomain => "NXDOMAIN",
            RCode::NotImp => "NOTIMP",
            RCode::Refused => "REFUSED",
            RCode::YxDomain => "YXDOMAIN",
            RCode::YxRrSet => "YXRRSET",
            RCode::NxRrSet => "NXRRSET",
            RCode::NotAuth => "NOTAUTH",
            RCode::NotZone => "NOTZONE",
            RCode::BadVersOrBadSig => "BADVERS/BADSIG",
            RCode::BadKey => "BADKEY",
            RCode::BadTime => "BADTIME",
            RCode::BadMode => "BADMODE",
            RCode::BadName => "BADNAME",
            RCode::BadAlg => "BADALG",
            RCode::BadTrunc => "BADTRUNC",
            RCode::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}
