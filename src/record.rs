//! Resource record envelope and the `RData` tagged union.
//!
//! [RFC 1035 §4.1.3](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.3)
//!
//! `RData` is a plain enum keyed by record type, one variant per
//! required RDATA shape and a catch-all `Opaque` for everything else.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{MdnsError, Result};
use crate::question::{RrClass, RrType};
use crate::wire::{Pack, Unpack};

/// `(name, type, class, ttl, rdata)` plus the transient mDNS
/// cache-flush bit (RFC 6762 §10.2 — the high bit of the class field
/// on the wire, never part of the logical class).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RrType,
    pub rclass: RrClass,
    pub cache_flush: bool,
    /// `ttl = 0` means "do not cache"; in mDNS it also signals
    /// goodbye (the record is being withdrawn).
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, rclass: RrClass, ttl: u32, rdata: RData) -> Self {
        let rtype = rdata.rtype();
        ResourceRecord {
            name: name.into(),
            rtype,
            rclass,
            cache_flush: false,
            ttl,
            rdata,
        }
    }

    pub fn pack(&self, p: &mut Pack) -> Result<()> {
        p.domain_name(&self.name, true)?;
        self.rtype.pack(p);
        p.u16(self.rclass.to_wire(self.cache_flush));
        p.u32(self.ttl);
        let rdlen_pos = p.reserve_u16();
        let body_start = p.offset();
        self.rdata.pack(p)?;
        let body_len = p.offset() - body_start;
        if body_len > u16::MAX as usize {
            return Err(MdnsError::Malformed {
                what: "rdata",
                reason: format!("{body_len} octets exceeds u16::MAX"),
            });
        }
        p.patch_u16(rdlen_pos, body_len as u16);
        Ok(())
    }

    pub fn unpack(u: &mut Unpack) -> Result<Self> {
        let name = u.domain_name()?;
        let rtype = RrType::unpack(u)?;
        let raw_class = u.u16()?;
        let (rclass, cache_flush) = RrClass::from_wire(raw_class);
        let ttl = u.u32()?;
        let rdlength = u.u16()? as usize;
        let body_start = u.offset();
        let rdata = RData::unpack(u, rtype, rdlength)?;
        let consumed = u.offset() - body_start;
        if consumed != rdlength {
            return Err(MdnsError::Malformed {
                what: "rdlength",
                reason: format!("declared {rdlength} octets, consumed {consumed}"),
            });
        }
        Ok(ResourceRecord { name, rtype, rclass, cache_flush, ttl, rdata })
    }
}

/// One option carried by an OPT (EDNS0) pseudo-record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// The RDATA payload, tagged by the record's own `RrType`. Variants
/// not listed here (NULL, AXFR, MAILB, MAILA, ANY, and anything
/// unrecognized) fall back to `Opaque`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Cname(String),
    Md(String),
    Mf(String),
    Mb(String),
    Mg(String),
    Mr(String),
    Ptr(String),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Mx {
        preference: u16,
        exchange: String,
    },
    Txt(Vec<Vec<u8>>),
    Hinfo {
        cpu: Vec<u8>,
        os: Vec<u8>,
    },
    Minfo {
        rmailbx: String,
        emailbx: String,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Nsec {
        next_domain_name: String,
        type_bit_maps: Vec<u8>,
    },
    Opt(Vec<EdnsOption>),
    Wks {
        address: Ipv4Addr,
        protocol: u8,
        bitmap: Vec<u8>,
    },
    Opaque(Vec<u8>),
}

impl RData {
    pub fn rtype(&self) -> RrType {
        match self {
            RData::A(_) => RrType::A,
            RData::Aaaa(_) => RrType::AAAA,
            RData::Ns(_) => RrType::NS,
            RData::Cname(_) => RrType::CNAME,
            RData::Md(_) => RrType::MD,
            RData::Mf(_) => RrType::MF,
            RData::Mb(_) => RrType::MB,
            RData::Mg(_) => RrType::MG,
            RData::Mr(_) => RrType::MR,
            RData::Ptr(_) => RrType::PTR,
            RData::Soa { .. } => RrType::SOA,
            RData::Mx { .. } => RrType::MX,
            RData::Txt(_) => RrType::TXT,
            RData::Hinfo { .. } => RrType::HINFO,
            RData::Minfo { .. } => RrType::MINFO,
            RData::Srv { .. } => RrType::SRV,
            RData::Nsec { .. } => RrType::NSEC,
            RData::Opt(_) => RrType::OPT,
            RData::Wks { .. } => RrType::WKS,
            RData::Opaque(_) => RrType::NULL,
        }
    }

    pub fn pack(&self, p: &mut Pack) -> Result<()> {
        match self {
            RData::A(ip) => p.a(*ip),
            RData::Aaaa(ip) => p.aaaa(*ip),
            RData::Ns(n) | RData::Cname(n) | RData::Md(n) | RData::Mf(n) | RData::Mb(n)
            | RData::Mg(n) | RData::Mr(n) | RData::Ptr(n) => {
                p.domain_name(n, true)?;
            }
            RData::Soa { mname, rname, serial, refresh, retry, expire, minimum } => {
                p.domain_name(mname, true)?;
                p.domain_name(rname, true)?;
                p.u32(*serial);
                p.u32(*refresh);
                p.u32(*retry);
                p.u32(*expire);
                p.u32(*minimum);
            }
            RData::Mx { preference, exchange } => {
                p.u16(*preference);
                p.domain_name(exchange, true)?;
            }
            RData::Txt(strings) => {
                for s in strings {
                    p.char_string(s)?;
                }
            }
            RData::Hinfo { cpu, os } => {
                p.char_string(cpu)?;
                p.char_string(os)?;
            }
            RData::Minfo { rmailbx, emailbx } => {
                p.domain_name(rmailbx, true)?;
                p.domain_name(emailbx, true)?;
            }
            RData::Srv { priority, weight, port, target } => {
                p.u16(*priority);
                p.u16(*weight);
                p.u16(*port);
                // RFC 2782: SRV targets are not compressed in practice
                // by most implementations, but nothing forbids it; we
                // compress like any other trailing name.
                p.domain_name(target, true)?;
            }
            RData::Nsec { next_domain_name, type_bit_maps } => {
                // RFC 4034 §6.2: the next domain name MUST NOT be
                // compressed.
                p.domain_name(next_domain_name, false)?;
                p.data(type_bit_maps);
            }
            RData::Opt(options) => {
                for opt in options {
                    p.u16(opt.code);
                    if opt.data.len() > u16::MAX as usize {
                        return Err(MdnsError::Malformed {
                            what: "EDNS0 option",
                            reason: format!("{} octets exceeds u16::MAX", opt.data.len()),
                        });
                    }
                    p.u16(opt.data.len() as u16);
                    p.data(&opt.data);
                }
            }
            RData::Wks { address, protocol, bitmap } => {
                p.a(*address);
                p.u8(*protocol);
                p.data(bitmap);
            }
            RData::Opaque(bytes) => p.data(bytes),
        }
        Ok(())
    }

    pub fn unpack(u: &mut Unpack, rtype: RrType, rdlength: usize) -> Result<Self> {
        let end = u.offset() + rdlength;
        Ok(match rtype {
            RrType::A => RData::A(u.a()?),
            RrType::AAAA => RData::Aaaa(u.aaaa()?),
            RrType::NS => RData::Ns(u.domain_name()?),
            RrType::CNAME => RData::Cname(u.domain_name()?),
            RrType::MD => RData::Md(u.domain_name()?),
            RrType::MF => RData::Mf(u.domain_name()?),
            RrType::MB => RData::Mb(u.domain_name()?),
            RrType::MG => RData::Mg(u.domain_name()?),
            RrType::MR => RData::Mr(u.domain_name()?),
            RrType::PTR => RData::Ptr(u.domain_name()?),
            RrType::SOA => RData::Soa {
                mname: u.domain_name()?,
                rname: u.domain_name()?,
                serial: u.u32()?,
                refresh: u.u32()?,
                retry: u.u32()?,
                expire: u.u32()?,
                minimum: u.u32()?,
            },
            RrType::MX => RData::Mx {
                preference: u.u16()?,
                exchange: u.domain_name()?,
            },
            RrType::TXT => {
                let mut strings = Vec::new();
                while u.offset() < end {
                    strings.push(u.char_string()?);
                }
                RData::Txt(strings)
            }
            RrType::HINFO => RData::Hinfo {
                cpu: u.char_string()?,
                os: u.char_string()?,
            },
            RrType::MINFO => RData::Minfo {
                rmailbx: u.domain_name()?,
                emailbx: u.domain_name()?,
            },
            RrType::SRV => RData::Srv {
                priority: u.u16()?,
                weight: u.u16()?,
                port: u.u16()?,
                target: u.domain_name()?,
            },
            RrType::NSEC => {
                let next_domain_name = u.domain_name()?;
                let remaining = end.saturating_sub(u.offset());
                RData::Nsec {
                    next_domain_name,
                    type_bit_maps: u.data(remaining)?.to_vec(),
                }
            }
            RrType::OPT => {
                let mut options = Vec::new();
                while u.offset() < end {
                    let code = u.u16()?;
                    let len = u.u16()? as usize;
                    let data = u.data(len)?.to_vec();
                    options.push(EdnsOption { code, data });
                }
                RData::Opt(options)
            }
            RrType::WKS => {
                let address = u.a()?;
                let protocol = u.u8()?;
                let remaining = end.saturating_sub(u.offset());
                RData::Wks {
                    address,
                    protocol,
                    bitmap: u.data(remaining)?.to_vec(),
                }
            }
            _ => RData::Opaque(u.data(rdlength)?.to_vec()),
        })
    }
}

/// Split an mDNS service-instance record name `_service._proto.name`
/// into its three components, per RFC 2782's label convention
/// (service and proto labels are `_`-prefixed).
///
/// Returns `None` if the name has fewer than two `_`-prefixed leading
/// labels.
pub fn split_service_name(name: &str) -> Option<(&str, &str, &str)> {
    let trimmed = name.trim_end_matches('.');
    let mut parts = trimmed.splitn(3, '.');
    let service = parts.next()?;
    let proto = parts.next()?;
    let rest = parts.next().unwrap_or("");
    if service.starts_with('_') && proto.starts_with('_') {
        Some((service, proto, rest))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_round_trips() {
        let rr = ResourceRecord::new(
            "host.local.",
            RrClass::IN,
            120,
            RData::A(Ipv4Addr::new(192, 168, 1, 1)),
        );
        let mut p = Pack::new();
        rr.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        let mut u = Unpack::new(&bytes);
        assert_eq!(ResourceRecord::unpack(&mut u).unwrap(), rr);
    }

    #[test]
    fn srv_rdata_matches_scenario_bytes() {
        // port 1234 = 0x04d2, priority/weight 0 -> first 6 octets 00 00 00 00 04 d2
        let rdata = RData::Srv { priority: 0, weight: 0, port: 1234, target: "host.local.".into() };
        let mut p = Pack::new();
        rdata.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        assert_eq!(&bytes[0..6], &[0x00, 0x00, 0x00, 0x00, 0x04, 0xd2]);
    }

    #[test]
    fn txt_rdata_round_trips_multiple_strings() {
        let rdata = RData::Txt(vec![b"key=value".to_vec(), b"a=b".to_vec()]);
        let mut p = Pack::new();
        rdata.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        let mut u = Unpack::new(&bytes);
        let decoded = RData::unpack(&mut u, RrType::TXT, bytes.len()).unwrap();
        assert_eq!(decoded, rdata);
    }

    #[test]
    fn nsec_next_domain_name_is_never_compressed() {
        let mut p = Pack::new();
        p.domain_name("local.", true).unwrap();
        let rdata = RData::Nsec { next_domain_name: "host.local.".into(), type_bit_maps: vec![0, 1, 0x40] };
        rdata.pack(&mut p).unwrap();
        let bytes = p.into_bytes();
        assert!(!bytes[6..].iter().any(|&b| b & 0xC0 == 0xC0 && bytes.len() > 6));
    }

    #[test]
    fn opaque_fallback_for_unknown_type() {
        let rdata = RData::Opaque(vec![1, 2, 3, 4]);
        assert_eq!(rdata.rtype(), RrType::NULL);
    }

    #[test]
    fn split_service_name_extracts_three_parts() {
        assert_eq!(
            split_service_name("_test._tcp.local."),
            Some(("_test", "_tcp", "local."))
        );
        assert_eq!(split_service_name("plain.local."), None);
    }
}
