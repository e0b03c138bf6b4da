//! SASL framing for AUTHENTICATE.
//!
//! The core owns the exchange framing (base64 continuation requests and
//! responses); concrete mechanisms are collaborators registered by name.
//! PLAIN ships built-in since every backend with `login` can serve it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use mailtide_proto::StatusResponse;

use crate::session::Session;

/// One step of a server-side SASL exchange.
#[derive(Debug, Default)]
pub struct SaslStep {
    /// Challenge bytes to send (base64-encoded by the framing layer).
    pub challenge: Option<Vec<u8>>,
    /// `true` once the exchange is complete.
    pub done: bool,
}

impl SaslStep {
    /// A non-final step issuing a challenge.
    #[must_use]
    pub fn challenge(bytes: Vec<u8>) -> Self {
        Self {
            challenge: Some(bytes),
            done: false,
        }
    }

    /// The final, successful step.
    #[must_use]
    pub fn done() -> Self {
        Self {
            challenge: None,
            done: true,
        }
    }
}

/// Server side of one SASL mechanism instance.
#[async_trait]
pub trait ServerMechanism: Send {
    /// The mechanism name as advertised in `AUTH=<NAME>`.
    fn name(&self) -> &'static str;

    /// Advances the exchange.
    ///
    /// `response` is `None` before the first client response (unless the
    /// client supplied an initial response). An `Err` aborts the exchange
    /// with a tagged NO.
    async fn step(
        &mut self,
        session: &mut dyn Session,
        response: Option<&[u8]>,
    ) -> Result<SaslStep, StatusResponse>;
}

/// Factory creating fresh mechanism instances per AUTHENTICATE command.
pub type MechanismFactory = Arc<dyn Fn() -> Box<dyn ServerMechanism> + Send + Sync>;

/// Name-keyed registry of SASL mechanism factories.
///
/// Populated at server build time; read-only afterwards.
#[derive(Default, Clone)]
pub struct MechanismRegistry {
    factories: HashMap<String, MechanismFactory>,
}

impl MechanismRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in PLAIN mechanism.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("PLAIN", Arc::new(|| Box::new(Plain::new())));
        registry
    }

    /// Registers a mechanism factory under its (upper-cased) name.
    pub fn register(&mut self, name: &str, factory: MechanismFactory) {
        self.factories.insert(name.to_ascii_uppercase(), factory);
    }

    /// Instantiates a mechanism by name.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Box<dyn ServerMechanism>> {
        self.factories
            .get(&name.to_ascii_uppercase())
            .map(|factory| factory())
    }

    /// Registered mechanism names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// `true` when no mechanism is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for MechanismRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MechanismRegistry")
            .field("mechanisms", &self.names())
            .finish()
    }
}

/// The PLAIN mechanism (RFC 4616): `authzid NUL authcid NUL passwd`.
#[derive(Debug, Default)]
pub struct Plain {
    issued_challenge: bool,
}

impl Plain {
    /// Creates a fresh PLAIN exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerMechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    async fn step(
        &mut self,
        session: &mut dyn Session,
        response: Option<&[u8]>,
    ) -> Result<SaslStep, StatusResponse> {
        let Some(response) = response else {
            if self.issued_challenge {
                return Err(StatusResponse::no("authentication exchange out of order"));
            }
            self.issued_challenge = true;
            return Ok(SaslStep::challenge(Vec::new()));
        };
        let mut parts = response.split(|&b| b == 0);
        let (Some(_authzid), Some(authcid), Some(passwd), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(StatusResponse::no("malformed PLAIN response"));
        };
        let authcid = std::str::from_utf8(authcid)
            .map_err(|_| StatusResponse::no("malformed PLAIN response"))?;
        let passwd = std::str::from_utf8(passwd)
            .map_err(|_| StatusResponse::no("malformed PLAIN response"))?;
        session.login(authcid, passwd).await?;
        Ok(SaslStep::done())
    }
}
