//! Mailbox names.

use crate::error::DecodeResult;
use crate::utf7::{decode_utf7, encode_utf7};

/// A mailbox name, stored decoded (UTF-8).
///
/// `INBOX` is case-insensitive and normalised to upper case; every other
/// name compares binary-equal after modified-UTF-7 decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mailbox(String);

impl Mailbox {
    /// Creates a mailbox from a decoded name, folding `INBOX`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".to_string())
        } else {
            Self(name)
        }
    }

    /// The INBOX mailbox.
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Decodes a wire-form name.
    ///
    /// With `utf8_accepted` the name is taken verbatim; otherwise it is
    /// decoded from modified UTF-7.
    pub fn from_wire(wire: &str, utf8_accepted: bool) -> DecodeResult<Self> {
        if utf8_accepted && !wire.is_ascii() {
            // UTF8=ACCEPT names are not folded apart from INBOX itself.
            return Ok(Self::new(wire));
        }
        Ok(Self::new(decode_utf7(wire)?))
    }

    /// Encodes the name for the wire.
    #[must_use]
    pub fn to_wire(&self, utf8_accepted: bool) -> String {
        if utf8_accepted {
            self.0.clone()
        } else {
            encode_utf7(&self.0)
        }
    }

    /// The decoded name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the INBOX.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0 == "INBOX"
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Mailbox {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
