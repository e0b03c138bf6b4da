//! Server assembly and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use mailtide_proto::{CapSet, Capability, StatusResponse};

use crate::conn::{BoxedIo, Conn, Io};
use crate::dispatch::Dispatcher;
use crate::error::ServerResult;
use crate::extension::{Extension, ExtensionError, ExtensionRegistry};
use crate::handlers;
use crate::sasl::{MechanismFactory, MechanismRegistry};
use crate::session::Session;

/// Server tunables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Greeting text sent with `* OK`.
    pub greeting: String,
    /// Maximum simultaneous connections; excess get `* BYE`.
    pub max_connections: usize,
    /// Largest accepted literal, to bound memory use.
    pub max_literal_size: u32,
    /// Largest accepted command line.
    pub max_line_length: usize,
    /// Read timeout outside IDLE.
    pub read_timeout: Duration,
    /// Timeout for writing one response.
    pub write_timeout: Duration,
    /// Interval between keep-alives while idling.
    pub idle_timeout: Duration,
    /// Permit LOGIN / AUTHENTICATE without TLS.
    pub allow_insecure_auth: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            greeting: "mailtide ready".to_string(),
            max_connections: 1024,
            max_literal_size: 100 * 1024 * 1024,
            max_line_length: 1024 * 1024,
            read_timeout: Duration::from_secs(30 * 60),
            write_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(5 * 60),
            allow_insecure_auth: false,
        }
    }
}

/// Facts about an accepted connection, handed to the session factory.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    /// Server-unique connection id.
    pub conn_id: u64,
    /// Remote peer address, when known.
    pub remote_addr: Option<SocketAddr>,
    /// Whether the transport is already TLS.
    pub is_tls: bool,
}

/// A freshly created backend session.
pub struct NewSession {
    /// The backend session for this connection.
    pub session: Box<dyn Session>,
    /// `true` to greet with `* PREAUTH` in the authenticated state.
    pub pre_auth: bool,
}

impl NewSession {
    /// Wraps a session with the normal (not pre-authenticated) greeting.
    #[must_use]
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            pre_auth: false,
        }
    }
}

/// Creates one backend session per accepted connection.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Builds the session; an `Err` rejects the connection with `* BYE`.
    async fn new_session(&self, info: &ConnInfo) -> Result<NewSession, StatusResponse>;
}

pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) caps: CapSet,
    pub(crate) mechanisms: MechanismRegistry,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) factory: Box<dyn SessionFactory>,
    pub(crate) tls_acceptor: Option<TlsAcceptor>,
    active: AtomicUsize,
    next_id: AtomicU64,
}

/// An assembled IMAP server.
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    /// Starts building a server around a session factory.
    #[must_use]
    pub fn builder(factory: Box<dyn SessionFactory>) -> ServerBuilder {
        ServerBuilder::new(factory)
    }

    /// The capabilities advertised before per-connection filtering.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.shared.caps.snapshot()
    }

    /// The extensions in applied (dependency) order.
    #[must_use]
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.shared.extensions
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        info!(addr = ?listener.local_addr().ok(), "listening");
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    self.spawn_connection(Box::new(stream), Some(addr), false);
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(err.into());
                }
            }
        }
    }

    /// Accepts implicit-TLS connections (port 993 style).
    pub async fn serve_tls(&self, listener: TcpListener) -> ServerResult<()> {
        let Some(acceptor) = self.shared.tls_acceptor.clone() else {
            return Err(crate::error::ServerError::no("no TLS acceptor configured"));
        };
        info!(addr = ?listener.local_addr().ok(), "listening (implicit TLS)");
        loop {
            let (stream, addr) = listener.accept().await?;
            let acceptor = acceptor.clone();
            let server = self.clone_handle();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls) => {
                        server
                            .serve_connection_inner(Box::new(tls), Some(addr), true)
                            .await;
                    }
                    Err(err) => {
                        warn!(remote = %addr, error = %err, "TLS handshake failed");
                    }
                }
            });
        }
    }

    /// Runs a single connection over an arbitrary transport.
    ///
    /// Useful for tests (`tokio::io::duplex`) and custom listeners.
    pub async fn serve_connection<S>(&self, io: S)
    where
        S: Io + 'static,
    {
        self.serve_connection_inner(Box::new(io), None, false).await;
    }

    fn clone_handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }

    fn spawn_connection(&self, io: BoxedIo, addr: Option<SocketAddr>, is_tls: bool) {
        let server = self.clone_handle();
        tokio::spawn(async move {
            server.serve_connection_inner(io, addr, is_tls).await;
        });
    }

    async fn serve_connection_inner(&self, io: BoxedIo, addr: Option<SocketAddr>, is_tls: bool) {
        let shared = Arc::clone(&self.shared);
        let active = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        if active > shared.config.max_connections {
            shared.active.fetch_sub(1, Ordering::SeqCst);
            warn!(remote = ?addr, "rejecting connection: server full");
            reject_connection(io, "server too busy").await;
            return;
        }
        let conn_id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        info!(conn_id, remote = ?addr, is_tls, "connection accepted");

        let info = ConnInfo {
            conn_id,
            remote_addr: addr,
            is_tls,
        };
        match shared.factory.new_session(&info).await {
            Ok(new_session) => {
                let conn = Conn::new(
                    Arc::clone(&shared),
                    conn_id,
                    io,
                    addr,
                    is_tls,
                    new_session.session,
                    new_session.pre_auth,
                );
                conn.run().await;
            }
            Err(status) => {
                warn!(conn_id, error = %status, "session factory rejected connection");
                reject_connection(io, &status.text).await;
            }
        }
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn reject_connection(io: BoxedIo, text: &str) {
    use tokio::io::AsyncWriteExt;
    let mut io = io;
    let mut enc = mailtide_proto::Encoder::new();
    enc.status_response(None, &StatusResponse::bye(text));
    let _ = io.write_all(enc.as_bytes()).await;
    let _ = io.shutdown().await;
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

/// Builder assembling dispatcher, extensions, capabilities, and SASL
/// mechanisms into a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    registry: ExtensionRegistry,
    mechanisms: MechanismRegistry,
    factory: Box<dyn SessionFactory>,
    tls_acceptor: Option<TlsAcceptor>,
    error: Option<ExtensionError>,
}

impl ServerBuilder {
    fn new(factory: Box<dyn SessionFactory>) -> Self {
        Self {
            config: ServerConfig::default(),
            registry: ExtensionRegistry::new(),
            mechanisms: MechanismRegistry::with_defaults(),
            factory,
            tls_acceptor: None,
            error: None,
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the greeting text.
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.config.greeting = greeting.into();
        self
    }

    /// Sets the connection limit.
    #[must_use]
    pub const fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Sets the literal acceptance bound.
    #[must_use]
    pub const fn max_literal_size(mut self, max: u32) -> Self {
        self.config.max_literal_size = max;
        self
    }

    /// Sets the non-IDLE read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the per-response write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets the IDLE keep-alive interval.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Permits LOGIN and AUTHENTICATE on plaintext transports.
    #[must_use]
    pub const fn allow_insecure_auth(mut self, allow: bool) -> Self {
        self.config.allow_insecure_auth = allow;
        self
    }

    /// Installs the TLS acceptor used by STARTTLS and `serve_tls`.
    #[must_use]
    pub fn tls_acceptor(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls_acceptor = Some(acceptor);
        self
    }

    /// Registers an extension.
    #[must_use]
    pub fn extension(mut self, ext: Arc<dyn Extension>) -> Self {
        if let Err(err) = self.registry.register(ext)
            && self.error.is_none()
        {
            self.error = Some(err);
        }
        self
    }

    /// Registers a SASL mechanism factory.
    #[must_use]
    pub fn mechanism(mut self, name: &str, factory: MechanismFactory) -> Self {
        self.mechanisms.register(name, factory);
        self
    }

    /// Resolves extensions and assembles the server.
    pub fn build(self) -> Result<Server, ExtensionError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut dispatcher = Dispatcher::new();
        handlers::register_standard(&mut dispatcher);
        let caps = CapSet::from_iter([
            Capability::Imap4Rev1,
            Capability::Imap4Rev2,
            Capability::Idle,
            Capability::LiteralPlus,
            Capability::Enable,
            Capability::Unauthenticate,
            Capability::SaslIr,
            Capability::Utf8Accept,
        ]);
        let extensions = self.registry.apply(&mut dispatcher, &caps)?;
        Ok(Server {
            shared: Arc::new(ServerShared {
                config: self.config,
                dispatcher,
                caps,
                mechanisms: self.mechanisms,
                extensions,
                factory: self.factory,
                tls_acceptor: self.tls_acceptor,
                active: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
