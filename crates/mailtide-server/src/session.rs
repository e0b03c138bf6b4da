//! The backend session contract.
//!
//! A [`Session`] is the backend's implementation of the mailbox
//! operations; the core invokes it from command handlers and treats its
//! mailbox state as opaque. Extension capabilities are separate traits
//! probed at dispatch time; an absent capability yields
//! `NO <feature> not supported` rather than a downcast failure.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::watch;

use mailtide_proto::{
    FetchAttr, Flags, InternalDate, LiteralReader, Mailbox, NumKind, NumSet, SearchKey, StatusAttr,
    StatusData, StatusResponse,
};

use crate::response::{ExpungeWriter, FetchWriter, ListWriter, MoveWriter, UpdateWriter};

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, StatusResponse>;

/// The streamed APPEND message body, bounded to the declared literal size.
pub type AppendBody<'a> = LiteralReader<&'a mut (dyn AsyncRead + Send + Unpin)>;

/// Data describing a freshly selected mailbox.
#[derive(Debug, Clone, Default)]
pub struct SelectData {
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// Flags the client may change permanently (`\*` permits keywords).
    pub permanent_flags: Flags,
    /// Number of messages.
    pub num_messages: u32,
    /// Number of recent messages.
    pub num_recent: u32,
    /// Predicted next UID.
    pub uid_next: u32,
    /// UID validity generation counter.
    pub uid_validity: u32,
    /// Sequence number of the first unseen message, if any.
    pub unseen: Option<u32>,
    /// `true` when the mailbox is opened read-only.
    pub read_only: bool,
}

/// Options supplied with APPEND.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Initial flags for the appended message.
    pub flags: Flags,
    /// Explicit internal date, if the client supplied one.
    pub internal_date: Option<InternalDate>,
}

/// APPEND result used for the APPENDUID response code.
///
/// A backend without persistent UIDs reports `uid == 0`, which suppresses
/// the response code.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendData {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: u32,
    /// UID assigned to the appended message.
    pub uid: u32,
}

/// COPY / MOVE result used for the COPYUID response code.
///
/// Empty source or destination sets suppress the response code.
#[derive(Debug, Clone, Default)]
pub struct CopyData {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: u32,
    /// UIDs of the source messages.
    pub source_uids: NumSet,
    /// UIDs assigned in the destination, in corresponding order.
    pub dest_uids: NumSet,
}

impl CopyData {
    /// Returns `true` when both UID sets carry data.
    #[must_use]
    pub fn has_uids(&self) -> bool {
        !self.source_uids.is_empty() && !self.dest_uids.is_empty()
    }
}

/// Options parsed from a LIST command.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// `RETURN (SUBSCRIBED)` was requested.
    pub return_subscribed: bool,
    /// `RETURN (CHILDREN)` was requested.
    pub return_children: bool,
    /// `RETURN (STATUS (...))` items; companions are emitted per mailbox.
    pub return_status: Option<Vec<StatusAttr>>,
}

/// SEARCH result.
#[derive(Debug, Clone, Default)]
pub struct SearchData {
    /// Matching numbers, sequence or UID flavoured per the request.
    pub all: NumSet,
}

/// The STORE flag operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Replace the flag list.
    Set,
    /// Add the listed flags.
    Add,
    /// Remove the listed flags.
    Remove,
}

/// A parsed STORE request.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// The operation.
    pub op: StoreOp,
    /// `.SILENT` suppresses the untagged FETCH echoes.
    pub silent: bool,
    /// The flags operated on.
    pub flags: Flags,
    /// CONDSTORE UNCHANGEDSINCE modifier, when present.
    pub unchanged_since: Option<u64>,
}

/// Backend implementation of the mailbox operations.
#[async_trait]
pub trait Session: Send {
    /// Authenticates a user. Called by LOGIN and by SASL mechanisms.
    async fn login(&mut self, username: &str, password: &str) -> SessionResult<()>;

    /// Reverts to the not-authenticated state (UNAUTHENTICATE).
    async fn unauthenticate(&mut self) -> SessionResult<()> {
        Err(StatusResponse::no("UNAUTHENTICATE not supported"))
    }

    /// Releases backend resources; called exactly once when the
    /// connection ends.
    async fn close(&mut self);

    /// Opens a mailbox read-write.
    async fn select(&mut self, mailbox: &Mailbox) -> SessionResult<SelectData>;

    /// Opens a mailbox read-only.
    async fn examine(&mut self, mailbox: &Mailbox) -> SessionResult<SelectData>;

    /// Leaves the selected mailbox. `expunge` is `true` for CLOSE and
    /// `false` for UNSELECT.
    async fn unselect(&mut self, expunge: bool) -> SessionResult<()>;

    /// Creates a mailbox.
    async fn create(&mut self, mailbox: &Mailbox) -> SessionResult<()>;

    /// Deletes a mailbox.
    async fn delete(&mut self, mailbox: &Mailbox) -> SessionResult<()>;

    /// Renames a mailbox.
    async fn rename(&mut self, from: &Mailbox, to: &Mailbox) -> SessionResult<()>;

    /// Adds a mailbox to the subscription list.
    async fn subscribe(&mut self, mailbox: &Mailbox) -> SessionResult<()>;

    /// Removes a mailbox from the subscription list.
    async fn unsubscribe(&mut self, mailbox: &Mailbox) -> SessionResult<()>;

    /// Streams LIST responses for the matching mailboxes.
    async fn list(
        &mut self,
        reference: &str,
        patterns: &[String],
        options: &ListOptions,
        writer: &ListWriter,
    ) -> SessionResult<()>;

    /// Reports STATUS counters for a mailbox.
    async fn status(&mut self, mailbox: &Mailbox, items: &[StatusAttr])
    -> SessionResult<StatusData>;

    /// Appends a message; `body` is bounded to the declared literal size.
    ///
    /// The caller drains any unread body bytes afterwards, on success and
    /// error alike, so the stream stays aligned.
    async fn append(
        &mut self,
        mailbox: &Mailbox,
        options: &AppendOptions,
        body: &mut AppendBody<'_>,
    ) -> SessionResult<AppendData>;

    /// Emits pending untagged updates (NOOP and between commands).
    async fn poll(&mut self, writer: &UpdateWriter, allow_expunge: bool) -> SessionResult<()> {
        let _ = (writer, allow_expunge);
        Ok(())
    }

    /// Suspends until `stop` fires, emitting updates as they happen.
    ///
    /// The default implementation emits nothing and waits cooperatively.
    async fn idle(
        &mut self,
        writer: &UpdateWriter,
        stop: &mut watch::Receiver<bool>,
    ) -> SessionResult<()> {
        let _ = writer;
        while !*stop.borrow() {
            if stop.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Expunges deleted messages; `uids` restricts the set (UID EXPUNGE).
    async fn expunge(
        &mut self,
        uids: Option<&NumSet>,
        writer: &ExpungeWriter,
    ) -> SessionResult<()>;

    /// Searches the selected mailbox.
    async fn search(&mut self, kind: NumKind, criteria: &SearchKey) -> SessionResult<SearchData>;

    /// Streams FETCH data for the requested messages.
    async fn fetch(
        &mut self,
        numbers: &NumSet,
        attrs: &[FetchAttr],
        writer: &FetchWriter,
    ) -> SessionResult<()>;

    /// Updates flags, echoing results through the writer unless silent.
    async fn store(
        &mut self,
        numbers: &NumSet,
        request: &StoreRequest,
        writer: &FetchWriter,
    ) -> SessionResult<()>;

    /// Copies messages to another mailbox.
    async fn copy(&mut self, numbers: &NumSet, dest: &Mailbox) -> SessionResult<CopyData>;

    /// Probes for MOVE support.
    fn as_move(&mut self) -> Option<&mut dyn SessionMove> {
        None
    }
}

/// MOVE extension capability (RFC 6851).
#[async_trait]
pub trait SessionMove: Session {
    /// Moves messages: copy, emit expunges through the writer, and record
    /// the COPYUID data on it.
    async fn move_messages(
        &mut self,
        numbers: &NumSet,
        dest: &Mailbox,
        writer: &MoveWriter,
    ) -> SessionResult<()>;
}
