//! A DNS / Multicast-DNS protocol toolkit: a bit-exact RFC 1035 wire
//! codec plus three higher-level behaviors built on top of it.
//!
//! - [`resolver`] — one-shot unicast or multicast queries.
//! - [`updater`] — RFC 2136 dynamic `UPDATE` messages.
//! - [`advertiser`] — mDNS service publication (probe/announce/
//!   respond/goodbye).
//!
//! Logging throughout the crate goes through the `log` facade; a
//! binary consuming this crate picks the backend (`demos/` uses
//! `pretty_env_logger::init_timed()`).

#[macro_use]
extern crate log;

pub mod advertiser;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod record;
pub mod resolver;
pub mod socket;
pub mod updater;
pub mod wire;

pub use error::{MdnsError, RCode, Result};
pub use socket::{check_unique_responder, is_reachable_ipv4, is_reachable_ipv6, local_addresses};
