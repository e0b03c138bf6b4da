//! Server capabilities.

use std::collections::HashSet;
use std::sync::RwLock;

/// A protocol capability token.
///
/// Capabilities are short upper-case identifiers advertised by the server;
/// some (`AUTH=`, `QUOTA=`) carry a suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// LITERAL+ non-synchronizing literals (RFC 7888)
    LiteralPlus,
    /// LITERAL- limited non-synchronizing literals (RFC 7888)
    LiteralMinus,
    /// STARTTLS upgrade support
    StartTls,
    /// LOGIN command disabled until TLS
    LoginDisabled,
    /// SASL mechanism, e.g. `AUTH=PLAIN`
    Auth(String),
    /// ENABLE command (RFC 5161)
    Enable,
    /// UTF8=ACCEPT (RFC 6855)
    Utf8Accept,
    /// UNAUTHENTICATE (RFC 8437)
    Unauthenticate,
    /// SASL-IR initial responses (RFC 4959)
    SaslIr,
    /// UIDPLUS (RFC 4315)
    UidPlus,
    /// MOVE (RFC 6851)
    Move,
    /// UNSELECT (RFC 3691)
    Unselect,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// NAMESPACE (RFC 2342)
    Namespace,
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// Any other capability, verbatim.
    Other(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "LITERAL+" => Self::LiteralPlus,
            "LITERAL-" => Self::LiteralMinus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "ENABLE" => Self::Enable,
            "UTF8=ACCEPT" => Self::Utf8Accept,
            "UNAUTHENTICATE" => Self::Unauthenticate,
            "SASL-IR" => Self::SaslIr,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "UNSELECT" => Self::Unselect,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "NAMESPACE" => Self::Namespace,
            "SPECIAL-USE" => Self::SpecialUse,
            _ => upper.strip_prefix("AUTH=").map_or_else(
                || Self::Other(s.to_string()),
                |mech| Self::Auth(mech.to_string()),
            ),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Idle => write!(f, "IDLE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::LiteralMinus => write!(f, "LITERAL-"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Enable => write!(f, "ENABLE"),
            Self::Utf8Accept => write!(f, "UTF8=ACCEPT"),
            Self::Unauthenticate => write!(f, "UNAUTHENTICATE"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::Unselect => write!(f, "UNSELECT"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::SpecialUse => write!(f, "SPECIAL-USE"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A concurrent-safe set of capabilities.
///
/// Owned by the server configuration (advertised set) and by each
/// connection (enabled set). Reads dominate; writes occur only at server
/// build time and inside the ENABLE handler.
#[derive(Debug, Default)]
pub struct CapSet {
    caps: RwLock<HashSet<Capability>>,
}

impl CapSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from an iterator of capabilities.
    #[must_use]
    pub fn from_iter<I>(caps: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self {
            caps: RwLock::new(caps.into_iter().collect()),
        }
    }

    /// Inserts a capability.
    pub fn insert(&self, cap: Capability) {
        if let Ok(mut caps) = self.caps.write() {
            caps.insert(cap);
        }
    }

    /// Removes a capability.
    pub fn remove(&self, cap: &Capability) {
        if let Ok(mut caps) = self.caps.write() {
            caps.remove(cap);
        }
    }

    /// Returns `true` if the capability is present.
    #[must_use]
    pub fn contains(&self, cap: &Capability) -> bool {
        self.caps.read().is_ok_and(|caps| caps.contains(cap))
    }

    /// Returns `true` if every member of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.snapshot().iter().all(|c| other.contains(c))
    }

    /// Returns a point-in-time copy of the members, sorted by wire form.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self
            .caps
            .read()
            .map(|caps| caps.iter().cloned().collect())
            .unwrap_or_default();
        caps.sort_by_key(ToString::to_string);
        caps
    }

    /// Number of capabilities in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.caps.read().map(|caps| caps.len()).unwrap_or_default()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for CapSet {
    fn clone(&self) -> Self {
        Self::from_iter(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("idle"), Capability::Idle);
        assert_eq!(Capability::parse("LITERAL+"), Capability::LiteralPlus);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
    }

    #[test]
    fn parse_other_preserves_spelling() {
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Other("X-GM-EXT-1".to_string())
        );
    }

    #[test]
    fn display_round_trip() {
        for s in ["IMAP4rev1", "IDLE", "LITERAL+", "AUTH=PLAIN", "UTF8=ACCEPT"] {
            assert_eq!(Capability::parse(s).to_string(), s);
        }
    }

    #[test]
    fn capset_insert_contains() {
        let set = CapSet::new();
        set.insert(Capability::Idle);
        assert!(set.contains(&Capability::Idle));
        assert!(!set.contains(&Capability::Move));
    }

    #[test]
    fn capset_subset() {
        let all = CapSet::from_iter([Capability::Idle, Capability::Move]);
        let enabled = CapSet::from_iter([Capability::Idle]);
        assert!(enabled.is_subset(&all));
        assert!(!all.is_subset(&enabled));
    }

    #[test]
    fn capset_snapshot_sorted() {
        let set = CapSet::from_iter([Capability::Move, Capability::Idle]);
        let snap = set.snapshot();
        assert_eq!(snap, vec![Capability::Idle, Capability::Move]);
    }
}
