//! Shared protocol data model.

pub mod capability;
pub mod envelope;
pub mod fetch;
pub mod flags;
pub mod list;
pub mod mailbox;
pub mod numset;
pub mod search;
pub mod status;

pub use capability::{CapSet, Capability};
pub use envelope::{Address, Envelope};
pub use fetch::{BodySectionData, FetchAttr, FetchData};
pub use flags::{Flag, Flags};
pub use list::{ListData, MailboxAttr, StatusAttr, StatusData};
pub use mailbox::Mailbox;
pub use numset::{NumKind, NumRange, NumSet, SeqNum, Uid};
pub use search::SearchKey;
pub use status::{ResponseCode, StatusKind, StatusResponse};
