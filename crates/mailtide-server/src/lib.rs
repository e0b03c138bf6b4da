//! # mailtide-server
//!
//! An extensible IMAP4rev1/IMAP4rev2 server core. The crate owns the
//! protocol machinery — connection loop, state machine, command dispatch,
//! extension plug-ins, SASL framing, response writers — while mailbox
//! semantics live behind the [`session::Session`] contract implemented by
//! a backend.
//!
//! ## Shape
//!
//! - One tokio task per accepted connection; commands on a connection are
//!   processed strictly in receive order.
//! - All responses funnel through a mutex-serialised
//!   [`response::ResponseEncoder`], so IDLE updates and command output
//!   never interleave mid-response.
//! - Extensions ([`extension::Extension`]) register handlers, wrap
//!   existing ones middleware-style, and advertise capabilities; they are
//!   applied once, in dependency order, when the server is built.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod conn;
pub mod dispatch;
mod error;
pub mod extension;
pub mod handlers;
pub mod response;
pub mod sasl;
pub mod server;
pub mod session;
pub mod state;

pub use conn::{BoxedIo, CommandContext, Conn, Io, SelectedMailbox};
pub use dispatch::{CommandHandler, Dispatcher, FnHandler, Handler};
pub use error::{ServerError, ServerResult};
pub use extension::{Extension, ExtensionError, ExtensionRegistry};
pub use response::{
    ExpungeWriter, FetchWriter, ListWriter, MoveWriter, ResponseEncoder, UpdateWriter,
};
pub use sasl::{MechanismRegistry, Plain, SaslStep, ServerMechanism};
pub use server::{ConnInfo, NewSession, Server, ServerBuilder, ServerConfig, SessionFactory};
pub use session::{
    AppendBody, AppendData, AppendOptions, CopyData, ListOptions, SearchData, SelectData, Session,
    SessionMove, SessionResult, StoreOp, StoreRequest,
};
pub use state::{ConnState, StateMachine, allowed_states};
