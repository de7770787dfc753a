//! Domain name codec: RFC 1035 §4.1.4 label compression.
//!
//! A name is a sequence of labels, each tagged by its first two bits:
//! `00` a normal length-prefixed label, `11` a 14-bit pointer into the
//! same message, `01`/`10` reserved (EDNS0 extensions, treated as
//! unsupported here). The per-message dictionary lives on the
//! `Unpack`/`Pack` cursor itself (`crate::wire`) and maps
//! octet-offset ⇄ name; this module only contains the walk/emit
//! algorithms.

use crate::error::{MdnsError, Result};
use crate::wire::{Pack, Unpack};

const POINTER_TAG: u8 = 0b1100_0000;
const LABEL_TAG_MASK: u8 = 0b1100_0000;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_OFFSET: usize = 0x3FFF;

impl<'a> Unpack<'a> {
    /// Decode a `<domain-name>` starting at the cursor, advancing it
    /// past the terminating zero octet or, if the name ends in a
    /// compression pointer, past the two pointer octets.
    pub fn domain_name(&mut self) -> Result<String> {
        let start = self.offset();
        let (name, consumed) = decode_from(self, start)?;
        self.set_offset(start + consumed);
        Ok(name)
    }
}

/// Decode the name beginning at absolute offset `start`, returning the
/// textual name and the number of bytes this particular frame
/// consumed (0 if `start` was already cached, since nothing new is
/// read from the buffer in that case).
fn decode_from(u: &mut Unpack, start: usize) -> Result<(String, usize)> {
    if let Some(cached) = u.dict.get(&start) {
        return Ok((cached.clone(), 0));
    }

    let mut labels: Vec<String> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();
    let mut cur = start;
    let mut total_len = 0usize;

    loop {
        let tag = u.peek_u8_at(cur)?;
        match tag & LABEL_TAG_MASK {
            0x00 => {
                let len = (tag & 0x3F) as usize;
                if len == 0 {
                    let full = build_name(&labels, None);
                    backfill(u, &labels, &offsets, None);
                    return Ok((full, cur + 1 - start));
                }
                if len > MAX_LABEL_LEN {
                    return Err(MdnsError::Malformed {
                        what: "label",
                        reason: format!("{len} octets exceeds {MAX_LABEL_LEN}"),
                    });
                }
                offsets.push(cur);
                let bytes = u.peek_at(cur + 1, len)?;
                labels.push(String::from_utf8_lossy(bytes).into_owned());
                total_len += len + 1;
                if total_len > MAX_NAME_LEN {
                    return Err(MdnsError::Malformed {
                        what: "domain name",
                        reason: format!("exceeds {MAX_NAME_LEN} octets"),
                    });
                }
                cur += 1 + len;
            }
            POINTER_TAG => {
                let b2 = u.peek_u8_at(cur + 1)?;
                let ptr = (((tag & 0x3F) as usize) << 8) | b2 as usize;
                if ptr >= cur {
                    return Err(MdnsError::Malformed {
                        what: "compression pointer",
                        reason: format!("offset {ptr} does not precede {cur}"),
                    });
                }
                let consumed = cur + 2 - start;
                let (suffix, _) = decode_from(u, ptr)?;
                let full = build_name(&labels, Some(&suffix));
                backfill(u, &labels, &offsets, Some(&suffix));
                return Ok((full, consumed));
            }
            _ => {
                return Err(MdnsError::Malformed {
                    what: "label tag",
                    reason: "reserved EDNS0 extension bits".into(),
                })
            }
        }
    }
}

fn build_name(labels: &[String], suffix: Option<&str>) -> String {
    if labels.is_empty() {
        return suffix.map(|s| s.to_string()).unwrap_or_else(|| ".".to_string());
    }
    let head = labels.join(".");
    match suffix {
        None | Some(".") => format!("{head}."),
        Some(s) => format!("{head}.{s}"),
    }
}

/// Record, for every suffix of the name just decoded, the offset it
/// started at — so a later pointer anywhere in the message may target
/// any suffix, not just the whole name. Earliest offset wins; an
/// existing entry is left untouched.
fn backfill(u: &mut Unpack, labels: &[String], offsets: &[usize], suffix: Option<&str>) {
    for i in 0..labels.len() {
        let name = build_name(&labels[i..], suffix);
        u.dict.entry(offsets[i]).or_insert(name);
    }
}

impl Pack {
    /// Encode a `<domain-name>`, compressing against the message's
    /// dictionary unless `compress` is false (RFC 4034 §6.2 requires
    /// this for NSEC's next-domain-name). New suffixes are recorded
    /// regardless, so later records may still compress against this
    /// name's bytes.
    pub fn domain_name(&mut self, name: &str, compress: bool) -> Result<()> {
        let trimmed = name.trim_end_matches('.');
        let labels: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('.').collect()
        };

        let mut total = 1; // terminating zero octet
        for label in &labels {
            if label.len() > MAX_LABEL_LEN {
                return Err(MdnsError::Malformed {
                    what: "label",
                    reason: format!("{} octets exceeds {MAX_LABEL_LEN}", label.len()),
                });
            }
            total += label.len() + 1;
        }
        if total > MAX_NAME_LEN {
            return Err(MdnsError::Malformed {
                what: "domain name",
                reason: format!("exceeds {MAX_NAME_LEN} octets"),
            });
        }

        for idx in 0..labels.len() {
            let suffix = format!("{}.", labels[idx..].join("."));
            if compress {
                if let Some(&offset) = self.dict.get(&suffix) {
                    self.u16(0xC000 | offset as u16);
                    return Ok(());
                }
            }
            let here = self.offset();
            if here <= MAX_POINTER_OFFSET {
                self.dict.entry(suffix).or_insert(here);
            }
            self.u8(labels[idx].len() as u8);
            self.data(labels[idx].as_bytes());
        }
        self.u8(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_name_is_single_zero_octet() {
        let mut p = Pack::new();
        p.domain_name(".", true).unwrap();
        assert_eq!(p.into_bytes(), vec![0]);
    }

    #[test]
    fn decode_simple_name() {
        let buf = [
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
        ];
        let mut u = Unpack::new(&buf);
        assert_eq!(u.domain_name().unwrap(), "example.com.");
        assert_eq!(u.offset(), buf.len());
    }

    #[test]
    fn decode_pointer_and_backfill() {
        // "com." at offset 0, "example.com." at offset 5 via pointer to 0.
        let buf = [
            3, b'c', b'o', b'm', 0, // offset 0..=4
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', // offset 5..=12
            0b1100_0000, 0, // pointer to 0
        ];
        let mut u = Unpack::new(&buf);
        u.set_offset(0);
        assert_eq!(u.domain_name().unwrap(), "com.");
        u.set_offset(5);
        assert_eq!(u.domain_name().unwrap(), "example.com.");
        // the suffix "com." at offset 0 must now be cached
        assert_eq!(u.dict.get(&0).unwrap(), "com.");
    }

    #[test]
    fn pointer_to_self_is_rejected() {
        let buf = [0b1100_0000u8, 0];
        let mut u = Unpack::new(&buf);
        assert!(u.domain_name().is_err());
    }

    #[test]
    fn pointer_forward_is_rejected() {
        let buf = [0b1100_0000u8, 5, 0, 0, 0, 0];
        let mut u = Unpack::new(&buf);
        assert!(u.domain_name().is_err());
    }

    #[test]
    fn label_too_long_is_malformed() {
        let mut buf = vec![64u8];
        buf.extend(std::iter::repeat(b'a').take(64));
        buf.push(0);
        let mut u = Unpack::new(&buf);
        assert!(u.domain_name().is_err());
    }

    #[test]
    fn encode_then_decode_round_trips_with_shared_dict() {
        let mut p = Pack::new();
        p.domain_name("popd.ix.netcom.com.", true).unwrap();
        p.domain_name("popd.best.ix.netcom.com.", true).unwrap();
        let bytes = p.into_bytes();

        let mut u = Unpack::new(&bytes);
        assert_eq!(u.domain_name().unwrap(), "popd.ix.netcom.com.");
        assert_eq!(u.domain_name().unwrap(), "popd.best.ix.netcom.com.");
    }
}
