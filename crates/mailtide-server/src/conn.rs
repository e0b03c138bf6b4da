//! Per-connection command loop.
//!
//! One task per connection: read a line, parse tag and command name,
//! check admission, dispatch, translate errors. Handlers may keep reading
//! from the connection (literal bodies, SASL exchanges, IDLE's DONE) via
//! the [`CommandContext`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader, ReadHalf,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mailtide_proto::{
    CapSet, Capability, DecodeError, Decoder, LiteralInfo, Mailbox, NumKind, ResponseCode,
    StatusKind, StatusResponse,
};

use crate::error::{ServerError, ServerResult};
use crate::response::ResponseEncoder;
use crate::server::ServerShared;
use crate::session::Session;
use crate::state::{ConnState, StateMachine, allowed_states};

/// Marker trait for connection transports.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Boxed connection transport; rebuilt in place on STARTTLS.
pub type BoxedIo = Box<dyn Io>;

/// The mailbox currently selected on a connection.
#[derive(Debug, Clone)]
pub struct SelectedMailbox {
    /// Decoded mailbox name.
    pub mailbox: Mailbox,
    /// `true` when opened via EXAMINE.
    pub read_only: bool,
}

/// Server side of one accepted connection.
pub struct Conn {
    pub(crate) id: u64,
    pub(crate) reader: Option<BufReader<ReadHalf<BoxedIo>>>,
    pub(crate) enc: Arc<ResponseEncoder>,
    pub(crate) state: StateMachine,
    pub(crate) enabled: CapSet,
    pub(crate) selected: Option<SelectedMailbox>,
    pub(crate) is_tls: bool,
    pub(crate) utf8_accepted: bool,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) shared: Arc<ServerShared>,
    pub(crate) session: Box<dyn Session>,
    pre_auth: bool,
}

impl Conn {
    pub(crate) fn new(
        shared: Arc<ServerShared>,
        id: u64,
        io: BoxedIo,
        remote_addr: Option<SocketAddr>,
        is_tls: bool,
        session: Box<dyn Session>,
        pre_auth: bool,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        let write_timeout = shared.config.write_timeout;
        Self {
            id,
            reader: Some(BufReader::new(read_half)),
            enc: Arc::new(ResponseEncoder::new(write_half, write_timeout)),
            state: StateMachine::new(),
            enabled: CapSet::new(),
            selected: None,
            is_tls,
            utf8_accepted: false,
            remote_addr,
            shared,
            session,
            pre_auth,
        }
    }

    /// Connection identifier, unique per server.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Remote peer address, when known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// `true` once the transport is TLS (implicit or upgraded).
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.is_tls
    }

    /// `true` once UTF8=ACCEPT has been enabled.
    #[must_use]
    pub const fn utf8_accepted(&self) -> bool {
        self.utf8_accepted
    }

    /// Current connection state.
    #[must_use]
    pub fn conn_state(&self) -> ConnState {
        self.state.state()
    }

    /// The state machine (hooks, custom transitions).
    pub fn state_machine(&mut self) -> &mut StateMachine {
        &mut self.state
    }

    /// Capabilities enabled on this connection via ENABLE.
    #[must_use]
    pub const fn enabled_caps(&self) -> &CapSet {
        &self.enabled
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub const fn selected_mailbox(&self) -> Option<&SelectedMailbox> {
        self.selected.as_ref()
    }

    /// The shared response encoder.
    #[must_use]
    pub fn encoder(&self) -> Arc<ResponseEncoder> {
        Arc::clone(&self.enc)
    }

    /// The backend session.
    pub fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    /// Capabilities advertised to this connection right now.
    ///
    /// STARTTLS and LOGINDISABLED appear only on plaintext transports;
    /// `AUTH=` entries appear once login is permitted.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = self.shared.caps.snapshot();
        if !self.is_tls {
            if self.shared.tls_acceptor.is_some() {
                caps.push(Capability::StartTls);
            }
            if !self.shared.config.allow_insecure_auth {
                caps.push(Capability::LoginDisabled);
            }
        }
        if self.is_tls || self.shared.config.allow_insecure_auth {
            for mech in self.shared.mechanisms.names() {
                caps.push(Capability::Auth(mech));
            }
        }
        caps.sort_by_key(ToString::to_string);
        caps.dedup();
        caps
    }

    /// `true` when LOGIN / AUTHENTICATE are permitted on this transport.
    #[must_use]
    pub fn auth_allowed(&self) -> bool {
        self.is_tls || self.shared.config.allow_insecure_auth
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) {
        let result = self.run_inner().await;
        match result {
            Ok(()) | Err(ServerError::Closed) => {
                debug!(conn_id = self.id, "connection finished");
            }
            Err(ServerError::Io(err)) => {
                debug!(conn_id = self.id, error = %err, "connection I/O error");
            }
            Err(err) => {
                warn!(conn_id = self.id, error = %err, "connection terminated");
            }
        }
        self.session.close().await;
        self.enc.close().await;
        info!(conn_id = self.id, "connection closed");
    }

    async fn run_inner(&mut self) -> ServerResult<()> {
        self.send_greeting().await?;
        loop {
            if self.state.state() == ConnState::Logout {
                return Ok(());
            }
            let line = match self.read_command_line().await {
                Ok(line) => line,
                Err(ServerError::Closed) => return Ok(()),
                Err(err) => return Err(err),
            };
            self.process_command(line).await?;
        }
    }

    async fn send_greeting(&mut self) -> ServerResult<()> {
        let caps = self.capabilities();
        let text = self.shared.config.greeting.clone();
        let status = if self.pre_auth {
            StatusResponse {
                kind: StatusKind::PreAuth,
                code: Some(ResponseCode::Capability(caps)),
                text,
            }
        } else {
            StatusResponse::ok(text).with_code(ResponseCode::Capability(caps))
        };
        self.enc.send_status(None, &status).await?;
        if self.pre_auth {
            self.state.transition(ConnState::Authenticated)?;
        }
        Ok(())
    }

    async fn read_command_line(&mut self) -> ServerResult<Vec<u8>> {
        let max_len = self.shared.config.max_line_length;
        let read_timeout = self.shared.config.read_timeout;
        let reader = self.reader.as_mut().ok_or(ServerError::Closed)?;
        match timeout(read_timeout, read_wire_line(reader, max_len)).await {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(ServerError::Status(status))) => {
                let _ = self.enc.send_status(None, &status).await;
                Err(ServerError::Closed)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                let _ = self
                    .enc
                    .send_status(
                        None,
                        &StatusResponse::bye("autologout; connection idle for too long"),
                    )
                    .await;
                Err(ServerError::Closed)
            }
        }
    }

    async fn process_command(&mut self, line: Vec<u8>) -> ServerResult<()> {
        let mut dec = Decoder::new(line);
        let Ok(tag) = dec.read_atom() else {
            self.enc
                .send_status(None, &StatusResponse::bad("invalid command tag"))
                .await?;
            return Ok(());
        };
        let name = match Self::parse_command_name(&mut dec) {
            Ok(name) => name,
            Err(err) => {
                self.enc
                    .send_status(Some(&tag), &StatusResponse::bad(err))
                    .await?;
                return Ok(());
            }
        };
        let (name, num_kind) = if name == "UID" {
            match Self::parse_command_name(&mut dec) {
                Ok(inner) => (inner, NumKind::Uid),
                Err(err) => {
                    self.enc
                        .send_status(Some(&tag), &StatusResponse::bad(err))
                        .await?;
                    return Ok(());
                }
            }
        } else {
            (name, NumKind::Seq)
        };
        debug!(conn_id = self.id, tag = %tag, command = %name, "dispatching command");

        if let Some(states) = allowed_states(&name)
            && !states.contains(&self.state.state())
        {
            let text = format!(
                "{name} not allowed in {} state",
                self.state.state().name()
            );
            let tail = dec.remaining().to_vec();
            self.drain_rejected(tail).await?;
            self.enc
                .send_status(Some(&tag), &StatusResponse::bad(text))
                .await?;
            return Ok(());
        }

        let Some(handler) = self.shared.dispatcher.get(&name) else {
            let tail = dec.remaining().to_vec();
            self.drain_rejected(tail).await?;
            self.enc
                .send_status(Some(&tag), &StatusResponse::bad(format!("unknown command {name}")))
                .await?;
            return Ok(());
        };

        let mut ctx = CommandContext {
            tag: tag.clone(),
            name: name.clone(),
            num_kind,
            dec,
            conn: self,
            tagged_written: false,
        };
        let result = handler.handle(&mut ctx).await;
        let tagged_written = ctx.tagged_written;

        match result {
            Ok(()) => {
                if !tagged_written {
                    self.enc
                        .send_status(
                            Some(&tag),
                            &StatusResponse::ok(format!("{name} completed")),
                        )
                        .await?;
                }
                Ok(())
            }
            Err(ServerError::Status(status)) => {
                if status.kind == StatusKind::Bye {
                    let _ = self.enc.send_status(None, &status).await;
                    return Err(ServerError::Closed);
                }
                self.enc.send_status(Some(&tag), &status).await?;
                Ok(())
            }
            Err(ServerError::Decode(err)) => {
                self.enc
                    .send_status(Some(&tag), &StatusResponse::bad(err.to_string()))
                    .await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn parse_command_name(dec: &mut Decoder) -> Result<String, String> {
        dec.read_sp()
            .map_err(|_| "expected command name".to_string())?;
        let mut name = dec
            .read_atom()
            .map_err(|_| "expected command name".to_string())?;
        name.make_ascii_uppercase();
        Ok(name)
    }

    /// Discards the wire tail of a rejected command so the stream stays
    /// aligned: non-synchronizing literal bodies arrive regardless of the
    /// rejection and must be consumed.
    async fn drain_rejected(&mut self, mut tail: Vec<u8>) -> ServerResult<()> {
        let max_len = self.shared.config.max_line_length;
        loop {
            let Some(info) = trailing_literal(&tail) else {
                return Ok(());
            };
            if !info.non_sync {
                // Synchronizing: no continuation was granted, so the
                // client will not send the body.
                return Ok(());
            }
            let reader = self.reader.as_mut().ok_or(ServerError::Closed)?;
            discard_exact(reader, u64::from(info.size)).await?;
            tail = read_wire_line(reader, max_len).await?;
        }
    }

    /// Reads one raw line from the wire with the CRLF stripped, for
    /// handler-driven exchanges (SASL responses, IDLE's DONE).
    pub(crate) async fn read_data_line(&mut self) -> ServerResult<Vec<u8>> {
        let max_len = self.shared.config.max_line_length;
        let reader = self.reader.as_mut().ok_or(ServerError::Closed)?;
        let mut line = read_wire_line(reader, max_len).await?;
        while line.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
            line.pop();
        }
        Ok(line)
    }

    pub(crate) async fn upgrade_tls(
        &mut self,
        acceptor: tokio_rustls::TlsAcceptor,
    ) -> ServerResult<()> {
        let reader = self.reader.take().ok_or(ServerError::Closed)?;
        let Some(writer) = self.enc.take_writer().await else {
            return Err(ServerError::Closed);
        };
        let io = reader.into_inner().unsplit(writer);
        let tls = acceptor.accept(io).await?;
        let (read_half, write_half) = tokio::io::split(Box::new(tls) as BoxedIo);
        self.reader = Some(BufReader::new(read_half));
        self.enc.restore_writer(write_half).await;
        self.is_tls = true;
        debug!(conn_id = self.id, "TLS established");
        Ok(())
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("state", &self.state.state())
            .field("is_tls", &self.is_tls)
            .finish_non_exhaustive()
    }
}

/// Per-command context handed to handlers.
pub struct CommandContext<'a> {
    /// The client-chosen tag.
    pub tag: String,
    /// Upper-cased command name (UID prefix already stripped).
    pub name: String,
    /// Whether message numbers in this command are sequence numbers or
    /// UIDs (`UID` prefix).
    pub num_kind: NumKind,
    /// Decoder over the command's argument bytes.
    pub dec: Decoder,
    pub(crate) conn: &'a mut Conn,
    tagged_written: bool,
}

impl CommandContext<'_> {
    /// The connection the command arrived on.
    pub fn conn(&mut self) -> &mut Conn {
        self.conn
    }

    /// The backend session.
    pub fn session(&mut self) -> &mut dyn Session {
        self.conn.session.as_mut()
    }

    /// The shared response encoder.
    #[must_use]
    pub fn encoder(&self) -> Arc<ResponseEncoder> {
        Arc::clone(&self.conn.enc)
    }

    /// Marks that the handler wrote the tagged response itself, which
    /// suppresses the automatic tagged OK.
    pub const fn set_tagged_written(&mut self) {
        self.tagged_written = true;
    }

    /// Whether the tagged response was already written.
    #[must_use]
    pub const fn tagged_written(&self) -> bool {
        self.tagged_written
    }

    /// Writes the tagged status response and marks it written.
    pub async fn write_tagged(&mut self, status: &StatusResponse) -> ServerResult<()> {
        self.conn.enc.send_status(Some(&self.tag), status).await?;
        self.tagged_written = true;
        Ok(())
    }

    /// Reads an astring argument, answering literal continuations.
    pub async fn read_astring(&mut self) -> ServerResult<String> {
        loop {
            match self.dec.read_astring() {
                Err(DecodeError::LiteralPending(info)) => self.feed_literal(info).await?,
                other => return other.map_err(Into::into),
            }
        }
    }

    /// Reads a string argument, answering literal continuations.
    pub async fn read_string(&mut self) -> ServerResult<String> {
        loop {
            match self.dec.read_string() {
                Err(DecodeError::LiteralPending(info)) => self.feed_literal(info).await?,
                other => return other.map_err(Into::into),
            }
        }
    }

    /// Reads a LIST pattern, answering literal continuations.
    pub async fn read_list_pattern(&mut self) -> ServerResult<String> {
        loop {
            match self.dec.read_list_mailbox() {
                Err(DecodeError::LiteralPending(info)) => self.feed_literal(info).await?,
                other => return other.map_err(Into::into),
            }
        }
    }

    /// Reads a mailbox name argument, decoding modified UTF-7 unless
    /// UTF8=ACCEPT is enabled.
    pub async fn read_mailbox(&mut self) -> ServerResult<Mailbox> {
        let wire = self.read_astring().await?;
        Mailbox::from_wire(&wire, self.conn.utf8_accepted).map_err(Into::into)
    }

    /// Consumes the command's trailing CRLF and fails on leftover bytes.
    pub fn expect_end(&mut self) -> ServerResult<()> {
        self.dec.read_crlf()?;
        if self.dec.is_eof() {
            Ok(())
        } else {
            Err(ServerError::bad("unexpected trailing arguments"))
        }
    }

    /// Runs a composite sync parse, answering literal continuations and
    /// retrying from the starting position until it completes.
    pub(crate) async fn with_literals<T, F>(&mut self, parse: F) -> ServerResult<T>
    where
        F: Fn(&mut Decoder) -> Result<T, DecodeError>,
    {
        let start = self.dec.position();
        loop {
            match parse(&mut self.dec) {
                Err(DecodeError::LiteralPending(info)) => {
                    // The pending header always terminates the buffer, so
                    // the body splices in right behind it; rewind and retry.
                    self.feed_literal(info).await?;
                    self.dec.set_position(start);
                }
                other => return other.map_err(Into::into),
            }
        }
    }

    /// Answers a continuation request and splices the announced literal
    /// body plus the following line into the argument decoder.
    async fn feed_literal(&mut self, info: LiteralInfo) -> ServerResult<()> {
        let max = self.conn.shared.config.max_literal_size;
        let max_len = self.conn.shared.config.max_line_length;
        if info.size > max {
            if info.non_sync {
                // The body is coming regardless; discard it to stay aligned.
                let reader = self.conn.reader.as_mut().ok_or(ServerError::Closed)?;
                discard_exact(reader, u64::from(info.size)).await?;
                let _ = read_wire_line(reader, max_len).await?;
            }
            return Err(ServerError::Status(
                StatusResponse::no(format!("literal exceeds {max} bytes"))
                    .with_code(ResponseCode::Limit),
            ));
        }
        if !info.non_sync {
            self.conn.enc.continuation("Ready for literal data").await?;
        }
        let reader = self.conn.reader.as_mut().ok_or(ServerError::Closed)?;
        let mut body = vec![0u8; info.size as usize];
        reader.read_exact(&mut body).await?;
        self.dec.extend(&body);
        let next_line = read_wire_line(reader, max_len).await?;
        self.dec.extend(&next_line);
        Ok(())
    }
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("num_kind", &self.num_kind)
            .finish_non_exhaustive()
    }
}

/// Reads one wire line (through LF), bounded by `max_len`.
pub(crate) async fn read_wire_line<R>(reader: &mut R, max_len: usize) -> ServerResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            if line.is_empty() {
                return Err(ServerError::Closed);
            }
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-line",
            )));
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..=pos]);
            reader.consume(pos + 1);
            return Ok(line);
        }
        let n = buf.len();
        line.extend_from_slice(buf);
        reader.consume(n);
        if line.len() > max_len {
            return Err(ServerError::Status(StatusResponse::bye("command line too long")));
        }
    }
}

/// Discards exactly `n` bytes from the reader.
pub(crate) async fn discard_exact<R>(reader: &mut R, n: u64) -> ServerResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut limited = (&mut *reader).take(n);
    let discarded = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
    if discarded < n {
        return Err(ServerError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed inside literal",
        )));
    }
    Ok(())
}

/// Detects a literal header terminating a command line.
#[must_use]
pub(crate) fn trailing_literal(line: &[u8]) -> Option<LiteralInfo> {
    let line = line.strip_suffix(b"\r\n").or_else(|| line.strip_suffix(b"\n")).unwrap_or(line);
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let binary = open > 0 && inner[open - 1] == b'~';
    let spec = &inner[open + 1..];
    let (digits, non_sync) = match spec.strip_suffix(b"+") {
        Some(digits) => (digits, true),
        None => (spec, false),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let size: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some(LiteralInfo {
        size,
        non_sync,
        binary,
    })
}
