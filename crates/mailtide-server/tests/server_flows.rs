//! End-to-end server flows over an in-process duplex transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use mailtide_proto::{
    Capability, Envelope, FetchAttr, FetchData, Flag, Flags, ListData, Mailbox, NumKind, NumSet,
    SearchKey, StatusAttr, StatusData, StatusResponse,
};
use mailtide_server::{
    AppendBody, AppendData, AppendOptions, CommandContext, CommandHandler, ConnInfo, CopyData,
    Extension, ExpungeWriter, FetchWriter, Handler, ListOptions, ListWriter, NewSession,
    SearchData, SelectData, Server, ServerResult, Session, SessionFactory, SessionResult,
    StoreOp, StoreRequest, UpdateWriter,
};

// In-memory backend used by the tests: one shared store, one session per
// connection.

#[derive(Debug)]
struct MemMessage {
    uid: u32,
    flags: Flags,
    body: Vec<u8>,
}

#[derive(Debug)]
struct MemMailbox {
    uid_validity: u32,
    uid_next: u32,
    messages: Vec<MemMessage>,
}

impl MemMailbox {
    fn new(uid_validity: u32) -> Self {
        Self {
            uid_validity,
            uid_next: 1,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemStore {
    mailboxes: Mutex<HashMap<String, MemMailbox>>,
}

impl MemStore {
    fn with_inbox(uid_validity: u32) -> Arc<Self> {
        let store = Self::default();
        if let Ok(mut mailboxes) = store.mailboxes.lock() {
            mailboxes.insert("INBOX".to_string(), MemMailbox::new(uid_validity));
        }
        Arc::new(store)
    }
}

struct MemSession {
    store: Arc<MemStore>,
    selected: Option<String>,
}

impl MemSession {
    fn new(store: Arc<MemStore>) -> Self {
        Self {
            store,
            selected: None,
        }
    }

    fn selected_name(&self) -> SessionResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| StatusResponse::bad("no mailbox selected"))
    }
}

fn parse_header(body: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (field, value) = line.split_once(':')?;
            field
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
}

#[async_trait]
impl Session for MemSession {
    async fn login(&mut self, username: &str, password: &str) -> SessionResult<()> {
        if username == "user" && password == "pass" {
            Ok(())
        } else {
            Err(StatusResponse::no("invalid credentials"))
        }
    }

    async fn close(&mut self) {}

    async fn select(&mut self, mailbox: &Mailbox) -> SessionResult<SelectData> {
        let mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(mbox) = mailboxes.get(mailbox.as_str()) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        self.selected = Some(mailbox.as_str().to_string());
        Ok(SelectData {
            flags: Flags::from_vec(vec![Flag::Seen, Flag::Answered, Flag::Deleted]),
            permanent_flags: Flags::from_vec(vec![Flag::Seen, Flag::Deleted, Flag::Wildcard]),
            num_messages: u32::try_from(mbox.messages.len()).unwrap_or(u32::MAX),
            num_recent: 0,
            uid_next: mbox.uid_next,
            uid_validity: mbox.uid_validity,
            unseen: None,
            read_only: false,
        })
    }

    async fn examine(&mut self, mailbox: &Mailbox) -> SessionResult<SelectData> {
        let mut data = self.select(mailbox).await?;
        data.read_only = true;
        Ok(data)
    }

    async fn unselect(&mut self, _expunge: bool) -> SessionResult<()> {
        self.selected = None;
        Ok(())
    }

    async fn create(&mut self, mailbox: &Mailbox) -> SessionResult<()> {
        let mut mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        if mailboxes.contains_key(mailbox.as_str()) {
            return Err(StatusResponse::no("mailbox already exists"));
        }
        mailboxes.insert(mailbox.as_str().to_string(), MemMailbox::new(1));
        Ok(())
    }

    async fn delete(&mut self, mailbox: &Mailbox) -> SessionResult<()> {
        let mut mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        mailboxes
            .remove(mailbox.as_str())
            .map(|_| ())
            .ok_or_else(|| StatusResponse::no("no such mailbox"))
    }

    async fn rename(&mut self, from: &Mailbox, to: &Mailbox) -> SessionResult<()> {
        let mut mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(mbox) = mailboxes.remove(from.as_str()) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        mailboxes.insert(to.as_str().to_string(), mbox);
        Ok(())
    }

    async fn subscribe(&mut self, _mailbox: &Mailbox) -> SessionResult<()> {
        Ok(())
    }

    async fn unsubscribe(&mut self, _mailbox: &Mailbox) -> SessionResult<()> {
        Ok(())
    }

    async fn list(
        &mut self,
        _reference: &str,
        patterns: &[String],
        _options: &ListOptions,
        writer: &ListWriter,
    ) -> SessionResult<()> {
        let names: Vec<String> = {
            let mailboxes = self
                .store
                .mailboxes
                .lock()
                .map_err(|_| StatusResponse::no("store poisoned"))?;
            let mut names: Vec<String> = mailboxes.keys().cloned().collect();
            names.sort();
            names
        };
        for name in names {
            let matched = patterns
                .iter()
                .any(|p| p == "*" || p == "%" || p.eq_ignore_ascii_case(&name));
            if matched {
                writer
                    .write_list(&ListData::new(Mailbox::new(&name), Some('/')))
                    .await
                    .map_err(|_| StatusResponse::no("write failed"))?;
            }
        }
        Ok(())
    }

    async fn status(
        &mut self,
        mailbox: &Mailbox,
        items: &[StatusAttr],
    ) -> SessionResult<StatusData> {
        let mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(mbox) = mailboxes.get(mailbox.as_str()) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        let mut data = StatusData::default();
        for item in items {
            match item {
                StatusAttr::Messages => {
                    data.messages = Some(u32::try_from(mbox.messages.len()).unwrap_or(u32::MAX));
                }
                StatusAttr::Recent => data.recent = Some(0),
                StatusAttr::UidNext => data.uid_next = Some(mbox.uid_next),
                StatusAttr::UidValidity => data.uid_validity = Some(mbox.uid_validity),
                StatusAttr::Unseen => {
                    let unseen = mbox.messages.iter().filter(|m| !m.flags.is_seen()).count();
                    data.unseen = Some(u32::try_from(unseen).unwrap_or(u32::MAX));
                }
                StatusAttr::HighestModSeq => {}
            }
        }
        Ok(data)
    }

    async fn append(
        &mut self,
        mailbox: &Mailbox,
        options: &AppendOptions,
        body: &mut AppendBody<'_>,
    ) -> SessionResult<AppendData> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)
            .await
            .map_err(|err| StatusResponse::no(format!("read failed: {err}")))?;
        let mut mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(mbox) = mailboxes.get_mut(mailbox.as_str()) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        let uid = mbox.uid_next;
        mbox.uid_next += 1;
        mbox.messages.push(MemMessage {
            uid,
            flags: options.flags.clone(),
            body: bytes,
        });
        Ok(AppendData {
            uid_validity: mbox.uid_validity,
            uid,
        })
    }

    async fn idle(
        &mut self,
        writer: &UpdateWriter,
        stop: &mut tokio::sync::watch::Receiver<bool>,
    ) -> SessionResult<()> {
        let count = {
            let name = self.selected_name()?;
            let mailboxes = self
                .store
                .mailboxes
                .lock()
                .map_err(|_| StatusResponse::no("store poisoned"))?;
            mailboxes
                .get(&name)
                .map(|m| u32::try_from(m.messages.len()).unwrap_or(u32::MAX))
                .unwrap_or_default()
        };
        writer
            .write_exists(count)
            .await
            .map_err(|_| StatusResponse::no("write failed"))?;
        while !*stop.borrow() {
            if stop.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn expunge(
        &mut self,
        _uids: Option<&NumSet>,
        writer: &ExpungeWriter,
    ) -> SessionResult<()> {
        let name = self.selected_name()?;
        let expunged: Vec<u32> = {
            let mut mailboxes = self
                .store
                .mailboxes
                .lock()
                .map_err(|_| StatusResponse::no("store poisoned"))?;
            let Some(mbox) = mailboxes.get_mut(&name) else {
                return Err(StatusResponse::no("no such mailbox"));
            };
            let mut seqs = Vec::new();
            let mut seq = 0u32;
            mbox.messages.retain(|message| {
                seq += 1;
                if message.flags.is_deleted() {
                    // Report the live sequence number at removal time.
                    seqs.push(seq - u32::try_from(seqs.len()).unwrap_or(0));
                    false
                } else {
                    true
                }
            });
            seqs
        };
        for seq in expunged {
            writer
                .write_expunge(seq)
                .await
                .map_err(|_| StatusResponse::no("write failed"))?;
        }
        Ok(())
    }

    async fn search(&mut self, kind: NumKind, criteria: &SearchKey) -> SessionResult<SearchData> {
        let name = self.selected_name()?;
        let mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(mbox) = mailboxes.get(&name) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        let matches = |seq: u32, message: &MemMessage| -> bool {
            match criteria {
                SearchKey::All => true,
                SearchKey::Seen => message.flags.is_seen(),
                SearchKey::Unseen => !message.flags.is_seen(),
                SearchKey::SeqSet(set) => {
                    set.contains(seq, u32::try_from(mbox.messages.len()).unwrap_or(u32::MAX))
                }
                SearchKey::UidSet(set) => set.contains(message.uid, mbox.uid_next - 1),
                _ => false,
            }
        };
        let numbers = mbox.messages.iter().enumerate().filter_map(|(i, message)| {
            let seq = u32::try_from(i + 1).ok()?;
            let n = if kind == NumKind::Uid { message.uid } else { seq };
            matches(seq, message).then_some(n)
        });
        Ok(SearchData {
            all: NumSet::from_numbers(kind, numbers),
        })
    }

    async fn fetch(
        &mut self,
        numbers: &NumSet,
        attrs: &[FetchAttr],
        writer: &FetchWriter,
    ) -> SessionResult<()> {
        let name = self.selected_name()?;
        let items: Vec<FetchData> = {
            let mailboxes = self
                .store
                .mailboxes
                .lock()
                .map_err(|_| StatusResponse::no("store poisoned"))?;
            let Some(mbox) = mailboxes.get(&name) else {
                return Err(StatusResponse::no("no such mailbox"));
            };
            let count = u32::try_from(mbox.messages.len()).unwrap_or(u32::MAX);
            let max_uid = mbox.uid_next.saturating_sub(1);
            mbox.messages
                .iter()
                .enumerate()
                .filter_map(|(i, message)| {
                    let seq = u32::try_from(i + 1).ok()?;
                    let selected = match numbers.kind() {
                        NumKind::Seq => numbers.contains(seq, count),
                        NumKind::Uid => numbers.contains(message.uid, max_uid),
                    };
                    if !selected {
                        return None;
                    }
                    let mut data = FetchData::new(seq);
                    for attr in attrs {
                        match attr {
                            FetchAttr::Flags => data.flags = Some(message.flags.clone()),
                            FetchAttr::Uid => data.uid = Some(message.uid),
                            FetchAttr::Rfc822Size => {
                                data.rfc822_size =
                                    Some(u32::try_from(message.body.len()).unwrap_or(u32::MAX));
                            }
                            FetchAttr::Envelope => {
                                let mut envelope = Envelope {
                                    subject: parse_header(&message.body, "Subject"),
                                    ..Envelope::default()
                                };
                                if let Some(from) = parse_header(&message.body, "From")
                                    && let Some((local, host)) = from.split_once('@')
                                {
                                    envelope
                                        .from
                                        .push(mailtide_proto::Address::new(local, host));
                                }
                                data.envelope = Some(envelope);
                            }
                            FetchAttr::BodySection { section, .. } if section.is_empty() => {
                                data.body_sections.push(mailtide_proto::BodySectionData {
                                    section: String::new(),
                                    origin: None,
                                    data: Some(message.body.clone()),
                                });
                            }
                            _ => {}
                        }
                    }
                    Some(data)
                })
                .collect()
        };
        for data in items {
            writer
                .write_fetch_data(&data)
                .await
                .map_err(|_| StatusResponse::no("write failed"))?;
        }
        Ok(())
    }

    async fn store(
        &mut self,
        numbers: &NumSet,
        request: &StoreRequest,
        writer: &FetchWriter,
    ) -> SessionResult<()> {
        let name = self.selected_name()?;
        let updated: Vec<(u32, u32, Flags)> = {
            let mut mailboxes = self
                .store
                .mailboxes
                .lock()
                .map_err(|_| StatusResponse::no("store poisoned"))?;
            let Some(mbox) = mailboxes.get_mut(&name) else {
                return Err(StatusResponse::no("no such mailbox"));
            };
            let count = u32::try_from(mbox.messages.len()).unwrap_or(u32::MAX);
            let max_uid = mbox.uid_next.saturating_sub(1);
            let mut updated = Vec::new();
            for (i, message) in mbox.messages.iter_mut().enumerate() {
                let seq = u32::try_from(i + 1).unwrap_or(u32::MAX);
                let selected = match numbers.kind() {
                    NumKind::Seq => numbers.contains(seq, count),
                    NumKind::Uid => numbers.contains(message.uid, max_uid),
                };
                if !selected {
                    continue;
                }
                match request.op {
                    StoreOp::Set => message.flags = request.flags.clone(),
                    StoreOp::Add => message.flags.union(&request.flags),
                    StoreOp::Remove => message.flags.subtract(&request.flags),
                }
                updated.push((seq, message.uid, message.flags.clone()));
            }
            updated
        };
        if !request.silent {
            for (seq, uid, flags) in updated {
                writer
                    .write_flags(seq, Some(uid), &flags)
                    .await
                    .map_err(|_| StatusResponse::no("write failed"))?;
            }
        }
        Ok(())
    }

    async fn copy(&mut self, numbers: &NumSet, dest: &Mailbox) -> SessionResult<CopyData> {
        let name = self.selected_name()?;
        let mut mailboxes = self
            .store
            .mailboxes
            .lock()
            .map_err(|_| StatusResponse::no("store poisoned"))?;
        let Some(source) = mailboxes.get(&name) else {
            return Err(StatusResponse::no("no such mailbox"));
        };
        let count = u32::try_from(source.messages.len()).unwrap_or(u32::MAX);
        let max_uid = source.uid_next.saturating_sub(1);
        let picked: Vec<(u32, Flags, Vec<u8>)> = source
            .messages
            .iter()
            .enumerate()
            .filter_map(|(i, message)| {
                let seq = u32::try_from(i + 1).ok()?;
                let selected = match numbers.kind() {
                    NumKind::Seq => numbers.contains(seq, count),
                    NumKind::Uid => numbers.contains(message.uid, max_uid),
                };
                selected.then(|| (message.uid, message.flags.clone(), message.body.clone()))
            })
            .collect();
        let Some(target) = mailboxes.get_mut(dest.as_str()) else {
            return Err(StatusResponse::no("no such destination")
                .with_code(mailtide_proto::ResponseCode::TryCreate));
        };
        let mut source_uids = Vec::new();
        let mut dest_uids = Vec::new();
        let uid_validity = target.uid_validity;
        for (uid, flags, body) in picked {
            source_uids.push(uid);
            let new_uid = target.uid_next;
            target.uid_next += 1;
            dest_uids.push(new_uid);
            target.messages.push(MemMessage {
                uid: new_uid,
                flags,
                body,
            });
        }
        Ok(CopyData {
            uid_validity,
            source_uids: NumSet::from_numbers(NumKind::Uid, source_uids),
            dest_uids: NumSet::from_numbers(NumKind::Uid, dest_uids),
        })
    }
}

struct MemFactory {
    store: Arc<MemStore>,
}

#[async_trait]
impl SessionFactory for MemFactory {
    async fn new_session(&self, _info: &ConnInfo) -> Result<NewSession, StatusResponse> {
        Ok(NewSession::new(Box::new(MemSession::new(Arc::clone(
            &self.store,
        )))))
    }
}

fn test_server(store: Arc<MemStore>) -> Server {
    Server::builder(Box::new(MemFactory { store }))
        .greeting("test server ready")
        .allow_insecure_auth(true)
        .build()
        .expect("server builds")
}

// Byte-level test driver over one half of a duplex pipe.

struct Wire {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Wire {
    fn new(io: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.expect("read line");
        assert!(n > 0, "server closed the stream unexpectedly");
        line
    }

    async fn expect(&mut self, exact: &str) {
        assert_eq!(self.line().await, exact);
    }

    async fn expect_prefix(&mut self, prefix: &str) -> String {
        let line = self.line().await;
        assert!(line.starts_with(prefix), "expected {prefix:?}, got {line:?}");
        line
    }

    /// Skips untagged lines until the tagged response for `tag`.
    async fn tagged(&mut self, tag: &str) -> String {
        loop {
            let line = self.line().await;
            if line.starts_with(tag) {
                return line;
            }
            assert!(
                line.starts_with('*') || line.starts_with('+'),
                "unexpected line while waiting for {tag}: {line:?}"
            );
        }
    }
}

async fn start(store: Arc<MemStore>) -> Wire {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = test_server(store);
    tokio::spawn(async move { server.serve_connection(server_io).await });
    let mut wire = Wire::new(client_io);
    wire.expect_prefix("* OK [CAPABILITY ").await;
    wire
}

#[tokio::test]
async fn login_completes_and_authenticates() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN \"user\" \"pass\"\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;

    // Authenticated state now admits SELECT.
    wire.send(b"A002 SELECT INBOX\r\n").await;
    let line = wire.tagged("A002").await;
    assert!(line.starts_with("A002 OK [READ-WRITE]"), "{line:?}");
}

#[tokio::test]
async fn login_bad_credentials() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN user wrong\r\n").await;
    wire.expect("A001 NO invalid credentials\r\n").await;
}

#[tokio::test]
async fn command_rejected_in_wrong_state() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;

    // FETCH needs the selected state.
    wire.send(b"A002 FETCH 1 FLAGS\r\n").await;
    wire.expect("A002 BAD FETCH not allowed in authenticated state\r\n")
        .await;

    // And the connection is still usable.
    wire.send(b"A003 NOOP\r\n").await;
    wire.expect("A003 OK NOOP completed\r\n").await;
}

#[tokio::test]
async fn fetch_rejected_before_login() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 FETCH 1 FLAGS\r\n").await;
    wire.expect("A001 BAD FETCH not allowed in not authenticated state\r\n")
        .await;
}

#[tokio::test]
async fn append_round_trip_with_appenduid() {
    let store = MemStore::with_inbox(42);
    // Advance uid_next so the appended message gets UID 7.
    if let Ok(mut mailboxes) = store.mailboxes.lock() {
        mailboxes.get_mut("INBOX").expect("inbox").uid_next = 7;
    }
    let mut wire = start(Arc::clone(&store)).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;

    wire.send(b"A003 APPEND INBOX (\\Seen) {11}\r\n").await;
    wire.expect_prefix("+ ").await;
    wire.send(b"hello world\r\n").await;
    wire.expect("A003 OK [APPENDUID 42 7] APPEND completed\r\n")
        .await;

    // The mailbox now reports one more message.
    wire.send(b"A004 STATUS INBOX (MESSAGES)\r\n").await;
    wire.expect("* STATUS INBOX (MESSAGES 1)\r\n").await;
    wire.expect("A004 OK STATUS completed\r\n").await;

    let stored = {
        let mailboxes = store.mailboxes.lock().expect("store");
        mailboxes.get("INBOX").expect("inbox").messages[0]
            .body
            .clone()
    };
    assert_eq!(stored, b"hello world");
}

#[tokio::test]
async fn append_non_sync_literal_skips_continuation() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;

    wire.send(b"A002 APPEND INBOX {5+}\r\nhello\r\n").await;
    let line = wire.tagged("A002").await;
    assert!(line.starts_with("A002 OK [APPENDUID 1 1]"), "{line:?}");
}

#[tokio::test]
async fn login_with_literal_credentials() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN {4}\r\n").await;
    wire.expect_prefix("+ ").await;
    wire.send(b"user {4}\r\n").await;
    wire.expect_prefix("+ ").await;
    wire.send(b"pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;
}

#[tokio::test]
async fn idle_continuation_and_done() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;
    wire.send(b"A004 SELECT INBOX\r\n").await;
    wire.tagged("A004").await;

    wire.send(b"A005 IDLE\r\n").await;
    wire.expect("+ idling\r\n").await;
    // The session emits an update after entering idle.
    wire.expect("* 0 EXISTS\r\n").await;
    wire.send(b"DONE\r\n").await;
    wire.expect("A005 OK IDLE completed\r\n").await;
}

#[tokio::test]
async fn authenticate_plain_round_trip() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 AUTHENTICATE PLAIN\r\n").await;
    wire.expect("+ \r\n").await;
    // base64("\0user\0pass")
    wire.send(b"AHVzZXIAcGFzcw==\r\n").await;
    wire.expect("A001 OK AUTHENTICATE completed\r\n").await;
}

#[tokio::test]
async fn authenticate_cancelled_with_star() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 AUTHENTICATE PLAIN\r\n").await;
    wire.expect("+ \r\n").await;
    wire.send(b"*\r\n").await;
    wire.expect_prefix("A001 BAD ").await;
}

#[tokio::test]
async fn logout_says_bye() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGOUT\r\n").await;
    wire.expect("* BYE logging out\r\n").await;
    wire.expect("A001 OK LOGOUT completed\r\n").await;
}

#[tokio::test]
async fn unknown_command_is_bad() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 FROBNICATE now\r\n").await;
    wire.expect("A001 BAD unknown command FROBNICATE\r\n").await;
}

#[tokio::test]
async fn move_without_capability_is_no() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;
    wire.send(b"A002 SELECT INBOX\r\n").await;
    wire.tagged("A002").await;
    wire.send(b"A003 MOVE 1 Archive\r\n").await;
    wire.expect("A003 NO MOVE not supported\r\n").await;
}

#[tokio::test]
async fn uid_fetch_returns_uid_item() {
    let store = MemStore::with_inbox(9);
    if let Ok(mut mailboxes) = store.mailboxes.lock() {
        let inbox = mailboxes.get_mut("INBOX").expect("inbox");
        inbox.messages.push(MemMessage {
            uid: 1,
            flags: Flags::new(),
            body: b"From: alice@example.com\r\nSubject: Test\r\n\r\nbody\r\n".to_vec(),
        });
        inbox.uid_next = 2;
    }
    let mut wire = start(store).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;
    wire.send(b"A002 SELECT INBOX\r\n").await;
    wire.tagged("A002").await;

    wire.send(b"A003 UID FETCH 1 ENVELOPE\r\n").await;
    let line = wire.expect_prefix("* 1 FETCH (").await;
    assert!(line.contains("ENVELOPE"), "{line:?}");
    assert!(line.contains("UID 1"), "{line:?}");
    assert!(line.contains("\"Test\""), "{line:?}");
    assert!(line.contains("\"alice\" \"example.com\""), "{line:?}");
    wire.expect("A003 OK FETCH completed\r\n").await;
}

#[tokio::test]
async fn store_and_expunge_flow() {
    let store = MemStore::with_inbox(3);
    if let Ok(mut mailboxes) = store.mailboxes.lock() {
        let inbox = mailboxes.get_mut("INBOX").expect("inbox");
        for uid in 1..=2 {
            inbox.messages.push(MemMessage {
                uid,
                flags: Flags::new(),
                body: b"Subject: x\r\n\r\n.".to_vec(),
            });
        }
        inbox.uid_next = 3;
    }
    let mut wire = start(store).await;
    wire.send(b"A001 LOGIN user pass\r\n").await;
    wire.expect("A001 OK LOGIN completed\r\n").await;
    wire.send(b"A002 SELECT INBOX\r\n").await;
    wire.tagged("A002").await;

    wire.send(b"A003 STORE 1 +FLAGS (\\Deleted)\r\n").await;
    wire.expect("* 1 FETCH (FLAGS (\\Deleted) UID 1)\r\n").await;
    wire.expect("A003 OK STORE completed\r\n").await;

    wire.send(b"A004 EXPUNGE\r\n").await;
    wire.expect("* 1 EXPUNGE\r\n").await;
    wire.expect("A004 OK EXPUNGE completed\r\n").await;

    wire.send(b"A005 SEARCH ALL\r\n").await;
    wire.expect("* SEARCH 1\r\n").await;
    wire.expect("A005 OK SEARCH completed\r\n").await;
}

// Extension machinery: a plug-in that adds a command and one that wraps
// an existing handler.

struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        ctx.expect_end()?;
        ctx.encoder()
            .send(|enc| {
                enc.star().atom("XPING").sp().atom("pong").crlf();
            })
            .await?;
        Ok(())
    }
}

struct PingExtension;

impl Extension for PingExtension {
    fn name(&self) -> &str {
        "XPING"
    }
    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Other("XPING".to_string())]
    }
    fn handlers(&self) -> Vec<(String, Handler)> {
        vec![("XPING".to_string(), Arc::new(PingHandler))]
    }
}

struct CountingWrapper {
    inner: Handler,
    count: Arc<AtomicU64>,
}

#[async_trait]
impl CommandHandler for CountingWrapper {
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.handle(ctx).await
    }
}

struct CountingExtension {
    count: Arc<AtomicU64>,
}

impl Extension for CountingExtension {
    fn name(&self) -> &str {
        "XCOUNT"
    }
    fn depends_on(&self) -> Vec<String> {
        vec!["XPING".to_string()]
    }
    fn wrap_handler(&self, name: &str, inner: Handler) -> Option<Handler> {
        (name == "NOOP" || name == "XPING").then(|| {
            Arc::new(CountingWrapper {
                inner,
                count: Arc::clone(&self.count),
            }) as Handler
        })
    }
}

#[tokio::test]
async fn extensions_add_and_wrap_handlers() {
    let count = Arc::new(AtomicU64::new(0));
    let server = Server::builder(Box::new(MemFactory {
        store: MemStore::with_inbox(1),
    }))
    .allow_insecure_auth(true)
    .extension(Arc::new(CountingExtension {
        count: Arc::clone(&count),
    }))
    .extension(Arc::new(PingExtension))
    .build()
    .expect("server builds");

    assert!(
        server
            .capabilities()
            .contains(&Capability::Other("XPING".to_string()))
    );

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.serve_connection(server_io).await });
    let mut wire = Wire::new(client_io);
    wire.expect_prefix("* OK ").await;

    wire.send(b"A001 XPING\r\n").await;
    wire.expect("* XPING pong\r\n").await;
    wire.expect("A001 OK XPING completed\r\n").await;

    wire.send(b"A002 NOOP\r\n").await;
    wire.expect("A002 OK NOOP completed\r\n").await;

    // Both wrapped commands were observed by the middleware.
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn capability_command_lists_base_set() {
    let mut wire = start(MemStore::with_inbox(1)).await;
    wire.send(b"A001 CAPABILITY\r\n").await;
    let line = wire.expect_prefix("* CAPABILITY ").await;
    for token in ["IMAP4rev1", "IMAP4rev2", "IDLE", "LITERAL+", "AUTH=PLAIN"] {
        assert!(line.contains(token), "missing {token} in {line:?}");
    }
    wire.expect("A001 OK CAPABILITY completed\r\n").await;
}
