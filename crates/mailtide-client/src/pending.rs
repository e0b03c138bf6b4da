//! In-flight command tracking.
//!
//! Every sent command owns a [`PendingCommand`] entry until its tagged
//! response (or the disconnect cause) resolves it — exactly once.

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use mailtide_proto::{
    Capability, FetchData, Flags, ListData, ResponseCode, StatusData, StatusKind, StatusResponse,
};

use crate::error::{ClientError, ClientResult};
use crate::response::UntaggedResponse;

/// Untagged data accumulated for one command.
#[derive(Debug, Default, Clone)]
pub struct CommandData {
    /// `* CAPABILITY` listing.
    pub capabilities: Option<Vec<Capability>>,
    /// `* ENABLED` listing.
    pub enabled: Vec<Capability>,
    /// `* <n> FETCH` responses.
    pub fetches: Vec<FetchData>,
    /// `* LIST` responses.
    pub lists: Vec<ListData>,
    /// `* STATUS` responses.
    pub statuses: Vec<StatusData>,
    /// `* SEARCH` numbers.
    pub search: Vec<u32>,
    /// Latest `* <n> EXISTS`.
    pub exists: Option<u32>,
    /// Latest `* <n> RECENT`.
    pub recent: Option<u32>,
    /// `* <n> EXPUNGE` sequence numbers, in order.
    pub expunges: Vec<u32>,
    /// Mailbox-level `* FLAGS`.
    pub mailbox_flags: Option<Flags>,
    /// Response codes from untagged OK lines (SELECT metadata).
    pub codes: Vec<ResponseCode>,
}

impl CommandData {
    /// Finds an accumulated response code by shape.
    #[must_use]
    pub fn find_code<F>(&self, matches: F) -> Option<&ResponseCode>
    where
        F: Fn(&ResponseCode) -> bool,
    {
        self.codes.iter().find(|code| matches(code))
    }
}

/// A resolved command: tagged status plus the accumulated data.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The command tag.
    pub tag: String,
    /// The tagged status response.
    pub status: StatusResponse,
    /// Untagged data received while the command was in flight.
    pub data: CommandData,
}

impl Completion {
    /// Converts NO/BAD completions into errors.
    pub fn ok(self) -> ClientResult<Self> {
        match self.status.kind {
            StatusKind::Ok => Ok(self),
            StatusKind::Bye => Err(ClientError::Bye(self.status)),
            _ => Err(ClientError::Status(self.status)),
        }
    }
}

/// Awaitable handle for a pipelined command.
#[derive(Debug)]
pub struct CommandHandle {
    pub(crate) rx: oneshot::Receiver<ClientResult<Completion>>,
}

impl CommandHandle {
    /// Waits for the tagged response (or the disconnect cause).
    pub async fn wait(self) -> ClientResult<Completion> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Closed),
        }
    }
}

pub(crate) struct PendingCommand {
    pub(crate) tag: String,
    pub(crate) name: String,
    pub(crate) tx: oneshot::Sender<ClientResult<Completion>>,
    pub(crate) cont_tx: Option<mpsc::UnboundedSender<String>>,
    pub(crate) data: CommandData,
}

/// The in-flight table: tag → pending command, in send order.
#[derive(Default)]
pub(crate) struct InFlight {
    commands: Mutex<Vec<PendingCommand>>,
}

impl InFlight {
    pub(crate) fn push(&self, command: PendingCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            debug_assert!(
                commands.iter().all(|c| c.tag != command.tag),
                "tags are unique per connection"
            );
            commands.push(command);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.commands.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Resolves a tagged response; `false` when the tag is unknown.
    pub(crate) fn complete(&self, tag: &str, status: StatusResponse) -> bool {
        let Ok(mut commands) = self.commands.lock() else {
            return false;
        };
        let Some(idx) = commands.iter().position(|c| c.tag == tag) else {
            return false;
        };
        let command = commands.remove(idx);
        let completion = Completion {
            tag: command.tag,
            status,
            data: command.data,
        };
        let _ = command.tx.send(Ok(completion));
        true
    }

    /// Feeds a continuation to the oldest command expecting one.
    pub(crate) fn route_continuation(&self, text: String) -> bool {
        let Ok(commands) = self.commands.lock() else {
            return false;
        };
        for command in commands.iter() {
            if let Some(cont_tx) = &command.cont_tx {
                return cont_tx.send(text).is_ok();
            }
        }
        false
    }

    /// Routes an untagged response into the matching in-flight command's
    /// accumulator, or returns it for the unsolicited stream.
    pub(crate) fn route_untagged(&self, resp: UntaggedResponse) -> Option<UntaggedResponse> {
        let Ok(mut commands) = self.commands.lock() else {
            return Some(resp);
        };
        let idx = {
            let wants = |c: &PendingCommand| match &resp {
                UntaggedResponse::Capability(_) => {
                    matches!(c.name.as_str(), "CAPABILITY" | "LOGIN" | "AUTHENTICATE")
                }
                UntaggedResponse::Enabled(_) => c.name == "ENABLE",
                UntaggedResponse::Fetch(_) => matches!(c.name.as_str(), "FETCH" | "STORE"),
                UntaggedResponse::List(_) => c.name == "LIST",
                UntaggedResponse::MailboxStatus(_) => {
                    matches!(c.name.as_str(), "STATUS" | "LIST")
                }
                UntaggedResponse::Search(_) => c.name == "SEARCH",
                UntaggedResponse::Exists(_)
                | UntaggedResponse::Recent(_)
                | UntaggedResponse::Flags(_) => {
                    matches!(c.name.as_str(), "SELECT" | "EXAMINE")
                }
                UntaggedResponse::Expunge(_) => matches!(c.name.as_str(), "EXPUNGE" | "MOVE"),
                // Untagged OK codes (SELECT metadata) attach to the oldest
                // in-flight command; other untagged statuses are unsolicited.
                UntaggedResponse::Status(status) => status.kind == StatusKind::Ok,
                UntaggedResponse::Unknown(_) => false,
            };
            commands.iter().position(|c| wants(c))
        };
        let Some(command) = idx.and_then(|i| commands.get_mut(i)) else {
            return Some(resp);
        };
        match resp {
            UntaggedResponse::Capability(caps) => command.data.capabilities = Some(caps),
            UntaggedResponse::Enabled(caps) => command.data.enabled = caps,
            UntaggedResponse::Fetch(data) => command.data.fetches.push(data),
            UntaggedResponse::List(data) => command.data.lists.push(data),
            UntaggedResponse::MailboxStatus(data) => command.data.statuses.push(data),
            UntaggedResponse::Search(numbers) => command.data.search.extend(numbers),
            UntaggedResponse::Exists(n) => command.data.exists = Some(n),
            UntaggedResponse::Recent(n) => command.data.recent = Some(n),
            UntaggedResponse::Flags(flags) => command.data.mailbox_flags = Some(flags),
            UntaggedResponse::Expunge(seq) => command.data.expunges.push(seq),
            UntaggedResponse::Status(status) => {
                if let Some(code) = status.code {
                    command.data.codes.push(code);
                }
            }
            UntaggedResponse::Unknown(_) => {}
        }
        None
    }

    /// Fails every pending command and continuation waiter with the
    /// disconnect cause.
    pub(crate) fn fail_all(&self, cause: &ClientError) {
        let Ok(mut commands) = self.commands.lock() else {
            return;
        };
        for command in commands.drain(..) {
            warn!(tag = %command.tag, "failing in-flight command: {cause}");
            let _ = command.tx.send(Err(cause.clone()));
            // Dropping cont_tx closes any continuation waiters.
        }
    }
}
