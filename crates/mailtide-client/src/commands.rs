//! Typed command surface.
//!
//! Every method sends one command; the synchronous variants await the
//! tagged response, while [`Client::submit`] (and the FETCH handle
//! variant) expose the pipelined form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use mailtide_proto::{
    Capability, Encoder, FetchAttr, FetchData, Flags, InternalDate, ListData, NumKind, NumSet,
    ResponseCode, SearchKey, StatusAttr, StatusData, StatusResponse,
};

use crate::conn::Client;
use crate::error::{ClientError, ClientResult};
use crate::pending::{CommandHandle, Completion};

/// Summary of a freshly selected mailbox.
#[derive(Debug, Clone, Default)]
pub struct SelectSummary {
    /// Message count.
    pub exists: u32,
    /// Recent count.
    pub recent: u32,
    /// Mailbox flags.
    pub flags: Flags,
    /// Permanent flags, when announced.
    pub permanent_flags: Option<Flags>,
    /// UIDVALIDITY, when announced.
    pub uid_validity: Option<u32>,
    /// UIDNEXT, when announced.
    pub uid_next: Option<u32>,
    /// First unseen sequence number, when announced.
    pub unseen: Option<u32>,
    /// `true` when the tagged OK carried READ-ONLY.
    pub read_only: bool,
}

impl SelectSummary {
    fn from_completion(completion: &Completion) -> Self {
        let data = &completion.data;
        let mut summary = Self {
            exists: data.exists.unwrap_or_default(),
            recent: data.recent.unwrap_or_default(),
            flags: data.mailbox_flags.clone().unwrap_or_default(),
            ..Self::default()
        };
        for code in &data.codes {
            match code {
                ResponseCode::PermanentFlags(flags) => {
                    summary.permanent_flags = Some(flags.clone());
                }
                ResponseCode::UidValidity(n) => summary.uid_validity = Some(*n),
                ResponseCode::UidNext(n) => summary.uid_next = Some(*n),
                ResponseCode::Unseen(n) => summary.unseen = Some(*n),
                _ => {}
            }
        }
        summary.read_only = matches!(completion.status.code, Some(ResponseCode::ReadOnly));
        summary
    }
}

/// APPEND result from the APPENDUID response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendUid {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: u32,
    /// UID of the appended message.
    pub uid: u32,
}

/// Client side of a SASL mechanism.
pub trait ClientMechanism: Send {
    /// Mechanism name for the AUTHENTICATE command line.
    fn name(&self) -> &'static str;

    /// Optional initial response (SASL-IR).
    fn initial_response(&mut self) -> Option<Vec<u8>>;

    /// Answers a server challenge.
    fn respond(&mut self, challenge: &[u8]) -> ClientResult<Vec<u8>>;
}

/// The PLAIN mechanism (RFC 4616).
#[derive(Debug)]
pub struct PlainMechanism {
    username: String,
    password: String,
}

impl PlainMechanism {
    /// Creates a PLAIN exchange for the credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn message(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        out
    }
}

impl ClientMechanism for PlainMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn initial_response(&mut self) -> Option<Vec<u8>> {
        Some(self.message())
    }

    fn respond(&mut self, _challenge: &[u8]) -> ClientResult<Vec<u8>> {
        Ok(self.message())
    }
}

impl Client {
    /// CAPABILITY.
    pub async fn capability(&self) -> ClientResult<Vec<Capability>> {
        let completion = self.submit("CAPABILITY", |_| {}).await?.wait().await?.ok()?;
        Ok(completion.data.capabilities.unwrap_or_default())
    }

    /// NOOP.
    pub async fn noop(&self) -> ClientResult<()> {
        self.submit("NOOP", |_| {}).await?.wait().await?.ok()?;
        Ok(())
    }

    /// LOGIN.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<()> {
        let username = username.to_string();
        let password = password.to_string();
        self.submit("LOGIN", move |enc| {
            enc.sp().astring(&username).sp().astring(&password);
        })
        .await?
        .wait()
        .await?
        .ok()?;
        Ok(())
    }

    /// AUTHENTICATE with a SASL mechanism.
    pub async fn authenticate(&self, mechanism: &mut dyn ClientMechanism) -> ClientResult<()> {
        let (tag, mut handle, cont_rx) = self.register("AUTHENTICATE", true)?;
        let Some(mut cont_rx) = cont_rx else {
            return Err(ClientError::Closed);
        };

        let mut enc = Encoder::new();
        enc.atom(&tag).sp().atom("AUTHENTICATE").sp().atom(mechanism.name());
        if let Some(initial) = mechanism.initial_response() {
            enc.sp();
            if initial.is_empty() {
                enc.atom("=");
            } else {
                enc.atom(&BASE64.encode(initial));
            }
        }
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;

        loop {
            tokio::select! {
                completion = &mut handle.rx => {
                    return match completion {
                        Ok(result) => {
                            result?.ok()?;
                            Ok(())
                        }
                        Err(_) => Err(ClientError::Closed),
                    };
                }
                challenge = cont_rx.recv() => {
                    let Some(challenge) = challenge else {
                        // The pending entry is gone; the completion (or
                        // disconnect) is about to arrive.
                        let completion = handle.rx.await.map_err(|_| ClientError::Closed)??;
                        completion.ok()?;
                        return Ok(());
                    };
                    let decoded = BASE64
                        .decode(challenge.trim())
                        .map_err(|_| ClientError::Status(StatusResponse::bad(
                            "server sent invalid base64 challenge",
                        )))?;
                    let answer = mechanism.respond(&decoded)?;
                    let mut line = BASE64.encode(answer).into_bytes();
                    line.extend_from_slice(b"\r\n");
                    self.write_wire(&line).await?;
                }
            }
        }
    }

    /// ENABLE; returns the capabilities the server actually enabled.
    pub async fn enable(&self, caps: &[Capability]) -> ClientResult<Vec<Capability>> {
        let caps: Vec<String> = caps.iter().map(ToString::to_string).collect();
        let completion = self
            .submit("ENABLE", move |enc| {
                for cap in &caps {
                    enc.sp().atom(cap);
                }
            })
            .await?
            .wait()
            .await?
            .ok()?;
        Ok(completion.data.enabled)
    }

    /// SELECT.
    pub async fn select(&self, mailbox: &str) -> ClientResult<SelectSummary> {
        self.select_inner("SELECT", mailbox).await
    }

    /// EXAMINE (read-only SELECT).
    pub async fn examine(&self, mailbox: &str) -> ClientResult<SelectSummary> {
        self.select_inner("EXAMINE", mailbox).await
    }

    async fn select_inner(&self, verb: &str, mailbox: &str) -> ClientResult<SelectSummary> {
        let mailbox = mailbox.to_string();
        let completion = self
            .submit(verb, move |enc| {
                enc.sp().mailbox(&mailbox);
            })
            .await?
            .wait()
            .await?
            .ok()?;
        Ok(SelectSummary::from_completion(&completion))
    }

    /// CREATE.
    pub async fn create(&self, mailbox: &str) -> ClientResult<()> {
        self.mailbox_command("CREATE", mailbox).await
    }

    /// DELETE.
    pub async fn delete(&self, mailbox: &str) -> ClientResult<()> {
        self.mailbox_command("DELETE", mailbox).await
    }

    /// SUBSCRIBE.
    pub async fn subscribe(&self, mailbox: &str) -> ClientResult<()> {
        self.mailbox_command("SUBSCRIBE", mailbox).await
    }

    /// UNSUBSCRIBE.
    pub async fn unsubscribe(&self, mailbox: &str) -> ClientResult<()> {
        self.mailbox_command("UNSUBSCRIBE", mailbox).await
    }

    async fn mailbox_command(&self, verb: &str, mailbox: &str) -> ClientResult<()> {
        let mailbox = mailbox.to_string();
        self.submit(verb, move |enc| {
            enc.sp().mailbox(&mailbox);
        })
        .await?
        .wait()
        .await?
        .ok()?;
        Ok(())
    }

    /// RENAME.
    pub async fn rename(&self, from: &str, to: &str) -> ClientResult<()> {
        let from = from.to_string();
        let to = to.to_string();
        self.submit("RENAME", move |enc| {
            enc.sp().mailbox(&from).sp().mailbox(&to);
        })
        .await?
        .wait()
        .await?
        .ok()?;
        Ok(())
    }

    /// LIST.
    pub async fn list(&self, reference: &str, pattern: &str) -> ClientResult<Vec<ListData>> {
        let reference = reference.to_string();
        let pattern = pattern.to_string();
        let completion = self
            .submit("LIST", move |enc| {
                enc.sp().astring(&reference).sp().astring(&pattern);
            })
            .await?
            .wait()
            .await?
            .ok()?;
        Ok(completion.data.lists)
    }

    /// STATUS.
    pub async fn status(&self, mailbox: &str, items: &[StatusAttr]) -> ClientResult<StatusData> {
        let mailbox = mailbox.to_string();
        let items: Vec<&'static str> = items.iter().map(|item| item.as_str()).collect();
        let mut completion = self
            .submit("STATUS", move |enc| {
                enc.sp().mailbox(&mailbox).sp().begin_list();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        enc.sp();
                    }
                    enc.atom(item);
                }
                enc.end_list();
            })
            .await?
            .wait()
            .await?
            .ok()?;
        if completion.data.statuses.is_empty() {
            return Err(ClientError::Status(StatusResponse::bad(
                "server sent no STATUS response",
            )));
        }
        Ok(completion.data.statuses.remove(0))
    }

    /// APPEND; honours LITERAL+ when advertised.
    pub async fn append(
        &self,
        mailbox: &str,
        flags: &Flags,
        internal_date: Option<&InternalDate>,
        body: &[u8],
    ) -> ClientResult<Option<AppendUid>> {
        let non_sync = self.has_capability(&Capability::LiteralPlus);
        let (tag, handle, cont_rx) = self.register("APPEND", !non_sync)?;

        let mut enc = Encoder::new();
        enc.set_utf8_accepted(self.utf8_accepted());
        enc.atom(&tag).sp().atom("APPEND").sp().mailbox(mailbox);
        if !flags.is_empty() {
            enc.sp().flags(flags);
        }
        if let Some(date) = internal_date {
            enc.sp().date_time(date);
        }
        enc.sp();

        if non_sync {
            enc.literal_non_sync(body);
            enc.crlf();
            self.write_wire(enc.as_bytes()).await?;
        } else {
            enc.atom(&format!("{{{}}}", body.len()));
            enc.crlf();
            // Hold the writer across the continuation so pipelined
            // commands cannot interleave with the literal.
            let mut guard = self.inner.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(self.disconnect_err().unwrap_or(ClientError::Closed));
            };
            use tokio::io::AsyncWriteExt;
            writer.write_all(enc.as_bytes()).await.map_err(ClientError::from)?;
            writer.flush().await.map_err(ClientError::from)?;
            let mut cont_rx = cont_rx.ok_or(ClientError::Closed)?;
            if cont_rx.recv().await.is_some() {
                writer.write_all(body).await.map_err(ClientError::from)?;
                writer.write_all(b"\r\n").await.map_err(ClientError::from)?;
                writer.flush().await.map_err(ClientError::from)?;
            }
        }

        let completion = handle.wait().await?.ok()?;
        Ok(match completion.status.code {
            Some(ResponseCode::AppendUid { uid_validity, uid }) => Some(AppendUid {
                uid_validity,
                uid,
            }),
            _ => None,
        })
    }

    /// FETCH / UID FETCH, as a pipelined handle.
    pub async fn fetch_handle(
        &self,
        kind: NumKind,
        numbers: &NumSet,
        attrs: &[FetchAttr],
    ) -> ClientResult<CommandHandle> {
        let (tag, handle, _) = self.register("FETCH", false)?;
        let mut enc = Encoder::new();
        enc.atom(&tag).sp();
        if kind == NumKind::Uid {
            enc.atom("UID").sp();
        }
        enc.atom("FETCH").sp().atom(&numbers.to_string()).sp();
        if attrs.len() == 1 {
            attrs[0].encode(&mut enc);
        } else {
            enc.begin_list();
            for (i, attr) in attrs.iter().enumerate() {
                if i > 0 {
                    enc.sp();
                }
                attr.encode(&mut enc);
            }
            enc.end_list();
        }
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;
        Ok(handle)
    }

    /// FETCH / UID FETCH.
    pub async fn fetch(
        &self,
        kind: NumKind,
        numbers: &NumSet,
        attrs: &[FetchAttr],
    ) -> ClientResult<Vec<FetchData>> {
        let completion = self.fetch_handle(kind, numbers, attrs).await?.wait().await?.ok()?;
        Ok(completion.data.fetches)
    }

    /// STORE / UID STORE.
    pub async fn store(
        &self,
        kind: NumKind,
        numbers: &NumSet,
        action: &str,
        flags: &Flags,
    ) -> ClientResult<Vec<FetchData>> {
        let numbers = numbers.to_string();
        let action = action.to_string();
        let flags = flags.clone();
        let verb_prefix = kind == NumKind::Uid;
        let (tag, handle, _) = self.register("STORE", false)?;
        let mut enc = Encoder::new();
        enc.atom(&tag).sp();
        if verb_prefix {
            enc.atom("UID").sp();
        }
        enc.atom("STORE").sp().atom(&numbers).sp().atom(&action).sp().flags(&flags);
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;
        let completion = handle.wait().await?.ok()?;
        Ok(completion.data.fetches)
    }

    /// SEARCH / UID SEARCH.
    pub async fn search(&self, kind: NumKind, key: &SearchKey) -> ClientResult<Vec<u32>> {
        let (tag, handle, _) = self.register("SEARCH", false)?;
        let mut enc = Encoder::new();
        enc.atom(&tag).sp();
        if kind == NumKind::Uid {
            enc.atom("UID").sp();
        }
        enc.atom("SEARCH").sp();
        key.encode(&mut enc);
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;
        let completion = handle.wait().await?.ok()?;
        Ok(completion.data.search)
    }

    /// COPY / UID COPY; returns the COPYUID code when granted.
    pub async fn copy(
        &self,
        kind: NumKind,
        numbers: &NumSet,
        mailbox: &str,
    ) -> ClientResult<Option<ResponseCode>> {
        let (tag, handle, _) = self.register("COPY", false)?;
        let mut enc = Encoder::new();
        enc.set_utf8_accepted(self.utf8_accepted());
        enc.atom(&tag).sp();
        if kind == NumKind::Uid {
            enc.atom("UID").sp();
        }
        enc.atom("COPY").sp().atom(&numbers.to_string()).sp().mailbox(mailbox);
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;
        let completion = handle.wait().await?.ok()?;
        Ok(completion.status.code)
    }

    /// EXPUNGE; returns the expunged sequence numbers in order.
    pub async fn expunge(&self) -> ClientResult<Vec<u32>> {
        let completion = self.submit("EXPUNGE", |_| {}).await?.wait().await?.ok()?;
        Ok(completion.data.expunges)
    }

    /// CLOSE.
    pub async fn close_mailbox(&self) -> ClientResult<()> {
        self.submit("CLOSE", |_| {}).await?.wait().await?.ok()?;
        Ok(())
    }

    /// UNSELECT.
    pub async fn unselect(&self) -> ClientResult<()> {
        self.submit("UNSELECT", |_| {}).await?.wait().await?.ok()?;
        Ok(())
    }

    /// IDLE; resolves once the server grants the continuation.
    pub async fn idle(&self) -> ClientResult<IdleHandle> {
        let (tag, mut handle, cont_rx) = self.register("IDLE", true)?;
        let Some(mut cont_rx) = cont_rx else {
            return Err(ClientError::Closed);
        };
        let mut enc = Encoder::new();
        enc.atom(&tag).sp().atom("IDLE").crlf();
        self.write_wire(enc.as_bytes()).await?;

        tokio::select! {
            completion = &mut handle.rx => {
                // Rejected before the continuation arrived.
                match completion {
                    Ok(result) => {
                        result?.ok()?;
                        Err(ClientError::Status(StatusResponse::bad(
                            "IDLE completed without a continuation",
                        )))
                    }
                    Err(_) => Err(ClientError::Closed),
                }
            }
            granted = cont_rx.recv() => match granted {
                Some(_) => Ok(IdleHandle {
                    client: self.clone(),
                    handle,
                }),
                None => Err(self.disconnect_err().unwrap_or(ClientError::Closed)),
            }
        }
    }

    /// LOGOUT; tolerates the connection dropping right after the BYE.
    pub async fn logout(&self) -> ClientResult<()> {
        let handle = self.submit("LOGOUT", |_| {}).await?;
        match handle.wait().await {
            Ok(completion) => {
                completion.ok()?;
                Ok(())
            }
            Err(ClientError::Disconnected(_) | ClientError::Closed) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// An IDLE in progress; drop it via [`IdleHandle::done`].
#[derive(Debug)]
pub struct IdleHandle {
    client: Client,
    handle: CommandHandle,
}

impl IdleHandle {
    /// Ends the IDLE by sending DONE and awaiting the tagged OK.
    pub async fn done(self) -> ClientResult<()> {
        self.client.write_wire(b"DONE\r\n").await?;
        self.handle.wait().await?.ok()?;
        Ok(())
    }
}
