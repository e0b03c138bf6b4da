//! # mailtide-proto
//!
//! Wire codec and shared data model for the IMAP4rev1 (RFC 3501) and
//! IMAP4rev2 (RFC 9051) protocol, used by both `mailtide-server` and
//! `mailtide-client`.
//!
//! ## Design
//!
//! - **Sans-I/O decoder**: [`decode::Decoder`] parses an owned buffer that
//!   the transport fills one wire line at a time. Synchronizing literals
//!   surface as [`error::DecodeError::LiteralPending`] so the transport can
//!   answer the continuation request and resume.
//! - **Fluent encoder**: [`encode::Encoder`] builds one complete command or
//!   response in memory; the transport writes it in a single critical
//!   section.
//! - **Bounded literal streams**: [`literal::LiteralReader`] and
//!   [`literal::LiteralWriter`] enforce declared byte counts so message
//!   bodies stream without buffering and the wire stays aligned.
//! - **Typed data model**: flags, capabilities, number sets (with the
//!   `*`-as-0 sentinel), status responses and response codes, envelopes,
//!   FETCH/LIST/STATUS/SEARCH structures.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod datetime;
pub mod decode;
pub mod encode;
mod error;
pub mod literal;
pub mod types;
pub mod utf7;

pub use datetime::InternalDate;
pub use decode::{Decoder, LiteralInfo};
pub use encode::Encoder;
pub use error::{DecodeError, DecodeResult};
pub use literal::{LiteralReader, LiteralWriter};
pub use types::{
    Address, BodySectionData, CapSet, Capability, Envelope, FetchAttr, FetchData, Flag, Flags,
    ListData, Mailbox, MailboxAttr, NumKind, NumRange, NumSet, ResponseCode, SearchKey, SeqNum,
    StatusAttr, StatusData, StatusKind, StatusResponse, Uid,
};

/// Default port for plaintext / STARTTLS connections.
pub const PORT_IMAP: u16 = 143;

/// Default port for implicit-TLS connections.
pub const PORT_IMAPS: u16 = 993;
