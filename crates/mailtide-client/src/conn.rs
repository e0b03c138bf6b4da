//! Client connection core.
//!
//! One background reader task per connection routes every server
//! response: tagged completions resolve the in-flight table, untagged
//! data feeds per-command accumulators or the unsolicited stream, and
//! `+` continuations wake the oldest expecting sender. Disconnects fan
//! out from a single place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, RwLock};

use rustls::pki_types::ServerName;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use mailtide_proto::{Capability, Decoder, Encoder, StatusKind, StatusResponse};

use crate::error::{ClientError, ClientResult};
use crate::pending::{CommandData, CommandHandle, InFlight, PendingCommand};
use crate::response::{UntaggedResponse, decode_untagged};
use crate::tag::TagGenerator;

/// Marker trait for client transports.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Boxed client transport.
pub type BoxedIo = Box<dyn Io>;

/// Longest accepted response line.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest accepted response literal.
const MAX_LITERAL_SIZE: u32 = 100 * 1024 * 1024;

pub(crate) struct ClientInner {
    pub(crate) writer: Mutex<Option<WriteHalf<BoxedIo>>>,
    pub(crate) inflight: InFlight,
    pub(crate) tags: TagGenerator,
    pub(crate) caps: RwLock<Vec<Capability>>,
    pub(crate) utf8_accepted: AtomicBool,
    disconnect: OnceLock<ClientError>,
    done_tx: watch::Sender<bool>,
    unsolicited_tx: mpsc::UnboundedSender<UntaggedResponse>,
}

impl ClientInner {
    /// Stores the disconnect cause (first writer wins) and fails every
    /// in-flight command and continuation waiter.
    pub(crate) async fn fail_all(&self, cause: ClientError) {
        let cause = self
            .disconnect
            .get_or_init(|| cause.into_disconnect())
            .clone();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.inflight.fail_all(&cause);
        let _ = self.done_tx.send(true);
    }

    fn note_capabilities(&self, caps: &[Capability]) {
        if let Ok(mut stored) = self.caps.write() {
            *stored = caps.to_vec();
        }
    }
}

/// Pipelining IMAP client.
///
/// Cloning is cheap; all clones share the connection.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
    done_rx: watch::Receiver<bool>,
    unsolicited_rx: Arc<StdMutex<Option<mpsc::UnboundedReceiver<UntaggedResponse>>>>,
    greeting: StatusResponse,
}

impl Client {
    /// Wraps an established transport, reads the server greeting, and
    /// spawns the background reader.
    pub async fn new<S>(io: S) -> ClientResult<Self>
    where
        S: Io + 'static,
    {
        let (read_half, write_half) = tokio::io::split(Box::new(io) as BoxedIo);
        let mut reader = BufReader::new(read_half);
        let greeting = read_greeting(&mut reader).await?;
        Ok(Self::start(reader, write_half, greeting))
    }

    /// Dials `host:port` with implicit TLS (port 993 style) and returns
    /// a running client.
    pub async fn connect_tls(host: &str, port: u16) -> ClientResult<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        let tls = tls_handshake(host, tcp).await?;
        Self::new(tls).await
    }

    /// Dials plaintext (port 143 style), upgrades via STARTTLS, and
    /// returns a running client on the encrypted transport.
    ///
    /// The pre-TLS dialogue runs unbuffered, byte by byte, so no
    /// handshake bytes can be swallowed by a read buffer before rustls
    /// takes over. No new greeting follows the upgrade; the plaintext
    /// one is carried forward.
    pub async fn connect_starttls(host: &str, port: u16) -> ClientResult<Self> {
        let mut tcp = TcpStream::connect((host, port)).await?;

        let mut dec = Decoder::new(read_line_unbuffered(&mut tcp).await?);
        dec.expect_byte(b'*')?;
        dec.read_sp()?;
        let greeting = StatusResponse::decode(&mut dec)?;
        if greeting.kind == StatusKind::Bye {
            return Err(ClientError::Bye(greeting));
        }

        tcp.write_all(b"S1 STARTTLS\r\n").await?;
        loop {
            let line = read_line_unbuffered(&mut tcp).await?;
            if line.starts_with(b"S1 ") {
                let mut dec = Decoder::new(line);
                let _ = dec.read_atom()?;
                dec.read_sp()?;
                let status = StatusResponse::decode(&mut dec)?;
                if !status.is_ok() {
                    return Err(ClientError::Status(status));
                }
                break;
            }
            if !line.starts_with(b"* ") {
                return Err(ClientError::Status(StatusResponse::bad(
                    "unexpected line before the STARTTLS reply",
                )));
            }
        }

        let tls = tls_handshake(host, tcp).await?;
        let (read_half, write_half) = tokio::io::split(Box::new(tls) as BoxedIo);
        Ok(Self::start(BufReader::new(read_half), write_half, greeting))
    }

    fn start(
        reader: BufReader<ReadHalf<BoxedIo>>,
        write_half: WriteHalf<BoxedIo>,
        greeting: StatusResponse,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientInner {
            writer: Mutex::new(Some(write_half)),
            inflight: InFlight::default(),
            tags: TagGenerator::default(),
            caps: RwLock::new(Vec::new()),
            utf8_accepted: AtomicBool::new(false),
            disconnect: OnceLock::new(),
            done_tx,
            unsolicited_tx,
        });
        if let Some(mailtide_proto::ResponseCode::Capability(caps)) = &greeting.code {
            inner.note_capabilities(caps);
        }

        tokio::spawn(reader_loop(Arc::clone(&inner), reader));

        Self {
            inner,
            done_rx,
            unsolicited_rx: Arc::new(StdMutex::new(Some(unsolicited_rx))),
            greeting,
        }
    }

    /// The server greeting (`OK` or `PREAUTH`).
    #[must_use]
    pub const fn greeting(&self) -> &StatusResponse {
        &self.greeting
    }

    /// `true` when the greeting was `PREAUTH`.
    #[must_use]
    pub fn is_pre_authenticated(&self) -> bool {
        self.greeting.kind == StatusKind::PreAuth
    }

    /// Last seen server capability listing.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.inner.caps.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// `true` if the server advertised the capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.inner
            .caps
            .read()
            .is_ok_and(|caps| caps.contains(cap))
    }

    /// Takes the unsolicited-update stream (EXISTS, EXPUNGE, FLAGS, …).
    ///
    /// Returns `None` after the first call.
    #[must_use]
    pub fn unsolicited(&self) -> Option<mpsc::UnboundedReceiver<UntaggedResponse>> {
        self.unsolicited_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Resolves once the connection has ended, however it ended.
    pub async fn done(&self) {
        let mut done_rx = self.done_rx.clone();
        while !*done_rx.borrow() {
            if done_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// The sticky disconnect cause, if the connection has ended.
    #[must_use]
    pub fn disconnect_err(&self) -> Option<ClientError> {
        self.inner.disconnect.get().cloned()
    }

    /// Closes the connection, failing everything in flight.
    pub async fn close(&self) {
        self.inner.fail_all(ClientError::Closed).await;
    }

    /// Number of commands currently awaiting their tagged response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    pub(crate) fn ensure_connected(&self) -> ClientResult<()> {
        match self.inner.disconnect.get() {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn utf8_accepted(&self) -> bool {
        self.inner.utf8_accepted.load(Ordering::Relaxed)
    }

    /// Registers a pending command and returns its tag and handle.
    pub(crate) fn register(
        &self,
        name: &str,
        expects_continuation: bool,
    ) -> ClientResult<(
        String,
        CommandHandle,
        Option<mpsc::UnboundedReceiver<String>>,
    )> {
        self.ensure_connected()?;
        let tag = self.inner.tags.next();
        let (tx, rx) = oneshot::channel();
        let (cont_tx, cont_rx) = if expects_continuation {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        self.inner.inflight.push(PendingCommand {
            tag: tag.clone(),
            name: name.to_ascii_uppercase(),
            tx,
            cont_tx,
            data: CommandData::default(),
        });
        Ok((tag, CommandHandle { rx }, cont_rx))
    }

    /// Writes raw wire bytes; a failure tears the connection down.
    pub(crate) async fn write_wire(&self, bytes: &[u8]) -> ClientResult<()> {
        let mut guard = self.inner.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(self
                .disconnect_err()
                .unwrap_or(ClientError::Closed));
        };
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        drop(guard);
        if let Err(err) = result {
            let cause = ClientError::from(err);
            self.inner.fail_all(cause.clone()).await;
            return Err(cause);
        }
        Ok(())
    }

    /// Sends a command with inline (non-literal) arguments and returns a
    /// pipelined handle; the caller decides when to await it.
    pub async fn submit<F>(&self, name: &str, args: F) -> ClientResult<CommandHandle>
    where
        F: FnOnce(&mut Encoder),
    {
        let (tag, handle, _) = self.register(name, false)?;
        let mut enc = Encoder::new();
        enc.set_utf8_accepted(self.utf8_accepted());
        enc.atom(&tag).sp().atom(name);
        args(&mut enc);
        enc.crlf();
        self.write_wire(enc.as_bytes()).await?;
        Ok(handle)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("in_flight", &self.in_flight())
            .field("disconnected", &self.disconnect_err().is_some())
            .finish_non_exhaustive()
    }
}

async fn reader_loop(inner: Arc<ClientInner>, mut reader: BufReader<ReadHalf<BoxedIo>>) {
    loop {
        match read_response(&mut reader).await {
            Ok(bytes) => {
                if let Err(err) = route_response(&inner, bytes) {
                    warn!(error = %err, "discarding unparsable server response");
                }
            }
            Err(err) => {
                debug!(error = %err, "reader task stopping");
                inner.fail_all(err).await;
                return;
            }
        }
    }
}

fn route_response(inner: &Arc<ClientInner>, bytes: Vec<u8>) -> ClientResult<()> {
    let mut dec = Decoder::new(bytes);
    match dec.peek_byte() {
        Some(b'+') => {
            dec.discard_n(1);
            dec.maybe_sp();
            let text = dec.read_text().unwrap_or_default();
            if !inner.inflight.route_continuation(text) {
                warn!("continuation request with no expecting command");
            }
            Ok(())
        }
        Some(b'*') => {
            dec.discard_n(1);
            dec.read_sp()?;
            let utf8 = inner.utf8_accepted.load(Ordering::Relaxed);
            let resp = decode_untagged(&mut dec, utf8)?;
            match &resp {
                UntaggedResponse::Capability(caps) => inner.note_capabilities(caps),
                UntaggedResponse::Enabled(caps) => {
                    if caps.contains(&Capability::Utf8Accept) {
                        inner.utf8_accepted.store(true, Ordering::Relaxed);
                    }
                }
                _ => {}
            }
            if let Some(unsolicited) = inner.inflight.route_untagged(resp) {
                let _ = inner.unsolicited_tx.send(unsolicited);
            }
            Ok(())
        }
        _ => {
            let tag = dec.read_atom()?;
            dec.read_sp()?;
            let status = StatusResponse::decode(&mut dec)?;
            if let Some(mailtide_proto::ResponseCode::Capability(caps)) = &status.code {
                inner.note_capabilities(caps);
            }
            if !inner.inflight.complete(&tag, status) {
                warn!(tag = %tag, "tagged response for unknown command");
            }
            Ok(())
        }
    }
}

/// Reads and validates the connection greeting.
async fn read_greeting(
    reader: &mut BufReader<ReadHalf<BoxedIo>>,
) -> ClientResult<StatusResponse> {
    let bytes = read_response(reader).await?;
    let mut dec = Decoder::new(bytes);
    dec.expect_byte(b'*')?;
    dec.read_sp()?;
    let greeting = StatusResponse::decode(&mut dec)?;
    if greeting.kind == StatusKind::Bye {
        return Err(ClientError::Bye(greeting));
    }
    Ok(greeting)
}

/// Runs the rustls handshake against `host`, trusting the webpki roots.
async fn tls_handshake(host: &str, tcp: TcpStream) -> ClientResult<TlsStream<TcpStream>> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|err| ClientError::Io(Arc::new(std::io::Error::other(err))))?;
    Ok(connector.connect(server_name, tcp).await?)
}

/// Reads one line without buffering past the LF, for the STARTTLS
/// pre-dialogue.
async fn read_line_unbuffered(stream: &mut TcpStream) -> ClientResult<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if stream.read(&mut byte).await? == 0 {
            return Err(ClientError::Closed);
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(line);
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(ClientError::Decode(
                mailtide_proto::DecodeError::Expected {
                    position: line.len(),
                    expected: "CRLF within the line limit",
                },
            ));
        }
    }
}

/// Reads one complete response: a line plus any literals it announces.
pub(crate) async fn read_response<R>(reader: &mut R) -> ClientResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut response = Vec::new();
    loop {
        let line = read_line(reader, response.is_empty()).await?;
        response.extend_from_slice(&line);
        let Some(size) = trailing_literal_len(&line) else {
            return Ok(response);
        };
        if size > MAX_LITERAL_SIZE {
            return Err(ClientError::Decode(
                mailtide_proto::DecodeError::LiteralTooLarge {
                    size,
                    limit: MAX_LITERAL_SIZE,
                },
            ));
        }
        let start = response.len();
        response.resize(start + size as usize, 0);
        reader.read_exact(&mut response[start..]).await?;
    }
}

async fn read_line<R>(reader: &mut R, at_response_start: bool) -> ClientResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            if line.is_empty() && at_response_start {
                return Err(ClientError::Closed);
            }
            return Err(ClientError::Io(Arc::new(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-response",
            ))));
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..=pos]);
            reader.consume(pos + 1);
            return Ok(line);
        }
        let n = buf.len();
        line.extend_from_slice(buf);
        reader.consume(n);
        if line.len() > MAX_LINE_LENGTH {
            return Err(ClientError::Decode(
                mailtide_proto::DecodeError::Expected {
                    position: line.len(),
                    expected: "CRLF within the line limit",
                },
            ));
        }
    }
}

/// Matches `{N}` / `{N+}` / `~{N}` at the end of a line.
fn trailing_literal_len(line: &[u8]) -> Option<u32> {
    let line = line
        .strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))?;
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = inner[open + 1..].strip_suffix(b"+").unwrap_or(&inner[open + 1..]);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
