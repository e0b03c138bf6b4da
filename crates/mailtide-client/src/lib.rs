//! # mailtide-client
//!
//! A pipelining IMAP4rev1/IMAP4rev2 client core. Commands are tagged,
//! tracked in an in-flight table, and may overlap on the wire; a single
//! background reader routes tagged completions, per-command untagged
//! data, unsolicited updates, and continuation requests.
//!
//! ## Disconnects
//!
//! When the reader observes end-of-stream or a socket error, the cause is
//! stored once and every in-flight command and continuation waiter
//! resolves promptly with it; [`Client::done`] fires exactly once and
//! [`Client::disconnect_err`] stays set.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod commands;
pub mod conn;
mod error;
pub mod pending;
pub mod response;
pub mod tag;

pub use commands::{AppendUid, ClientMechanism, IdleHandle, PlainMechanism, SelectSummary};
pub use conn::{BoxedIo, Client, Io};
pub use error::{ClientError, ClientResult};
pub use pending::{CommandData, CommandHandle, Completion};
pub use response::UntaggedResponse;
pub use tag::TagGenerator;
