//! Status responses and response codes.

use crate::decode::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::types::capability::Capability;
use crate::types::flags::Flags;
use crate::types::numset::{NumKind, NumSet};

/// Status response kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Success.
    Ok,
    /// Operational failure.
    No,
    /// Protocol or syntax failure.
    Bad,
    /// Server-initiated shutdown or fatal condition.
    Bye,
    /// Pre-authenticated greeting.
    PreAuth,
}

impl StatusKind {
    /// Returns the wire token for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::Bye => "BYE",
            Self::PreAuth => "PREAUTH",
        }
    }

    /// Parses a wire token.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "BYE" => Some(Self::Bye),
            "PREAUTH" => Some(Self::PreAuth),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bracketed response code, optionally carrying an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: text must be shown to the user.
    Alert,
    /// BADCHARSET with the charsets the server does accept.
    BadCharset(Vec<String>),
    /// CAPABILITY listing.
    Capability(Vec<Capability>),
    /// PARSE: error parsing a message.
    Parse,
    /// PERMANENTFLAGS list.
    PermanentFlags(Flags),
    /// Mailbox selected read-only.
    ReadOnly,
    /// Mailbox selected read-write.
    ReadWrite,
    /// Target mailbox does not exist but may be created.
    TryCreate,
    /// Next UID to be assigned.
    UidNext(u32),
    /// UID validity generation counter.
    UidValidity(u32),
    /// First unseen message sequence number.
    Unseen(u32),
    /// UID assigned to an appended message (UIDPLUS).
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: u32,
        /// UID of the appended message.
        uid: u32,
    },
    /// UIDs of copied messages (UIDPLUS).
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: u32,
        /// Source UID set.
        source_uids: NumSet,
        /// Destination UID set.
        dest_uids: NumSet,
    },
    /// Mailbox does not support persistent UIDs.
    UidNotSticky,
    /// Highest mod-sequence (CONDSTORE).
    HighestModSeq(u64),
    /// Messages that failed a conditional STORE (CONDSTORE).
    Modified(NumSet),
    /// Mod-sequences unsupported for this mailbox.
    NoModSeq,
    /// The previously selected mailbox is now closed (QRESYNC).
    Closed,
    /// Quota exceeded.
    OverQuota,
    /// Target already exists.
    AlreadyExists,
    /// Target does not exist.
    NonExistent,
    /// The user should contact the administrator.
    ContactAdmin,
    /// Permission denied.
    NoPerm,
    /// Resource is in use.
    InUse,
    /// An expunge was issued while the command ran.
    ExpungeIssued,
    /// Server-side data corruption.
    Corruption,
    /// Server bug.
    ServerBug,
    /// Client bug.
    ClientBug,
    /// The operation is never permitted.
    Cannot,
    /// A limit was reached.
    Limit,
    /// The deleted mailbox has children.
    HasChildren,
    /// METADATA information, verbatim argument.
    Metadata(String),
    /// A SELECT parameter value could not be saved.
    NotSaved,
    /// Object identifier of a mailbox (OBJECTID).
    MailboxId(String),
    /// Generic OBJECTID code.
    ObjectId,
    /// Progress indication for a long-running command.
    InProgress,
    /// Any other code, name plus optional raw argument.
    Other(String, Option<String>),
}

impl ResponseCode {
    /// Returns the code's wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Alert => "ALERT",
            Self::BadCharset(_) => "BADCHARSET",
            Self::Capability(_) => "CAPABILITY",
            Self::Parse => "PARSE",
            Self::PermanentFlags(_) => "PERMANENTFLAGS",
            Self::ReadOnly => "READ-ONLY",
            Self::ReadWrite => "READ-WRITE",
            Self::TryCreate => "TRYCREATE",
            Self::UidNext(_) => "UIDNEXT",
            Self::UidValidity(_) => "UIDVALIDITY",
            Self::Unseen(_) => "UNSEEN",
            Self::AppendUid { .. } => "APPENDUID",
            Self::CopyUid { .. } => "COPYUID",
            Self::UidNotSticky => "UIDNOTSTICKY",
            Self::HighestModSeq(_) => "HIGHESTMODSEQ",
            Self::Modified(_) => "MODIFIED",
            Self::NoModSeq => "NOMODSEQ",
            Self::Closed => "CLOSED",
            Self::OverQuota => "OVERQUOTA",
            Self::AlreadyExists => "ALREADYEXISTS",
            Self::NonExistent => "NONEXISTENT",
            Self::ContactAdmin => "CONTACTADMIN",
            Self::NoPerm => "NOPERM",
            Self::InUse => "INUSE",
            Self::ExpungeIssued => "EXPUNGEISSUED",
            Self::Corruption => "CORRUPTION",
            Self::ServerBug => "SERVERBUG",
            Self::ClientBug => "CLIENTBUG",
            Self::Cannot => "CANNOT",
            Self::Limit => "LIMIT",
            Self::HasChildren => "HASCHILDREN",
            Self::Metadata(_) => "METADATA",
            Self::NotSaved => "NOTSAVED",
            Self::MailboxId(_) => "MAILBOXID",
            Self::ObjectId => "OBJECTID",
            Self::InProgress => "INPROGRESS",
            Self::Other(name, _) => name,
        }
    }

    /// Renders the bracketed form `[NAME arg]`.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = format!("[{}", self.name());
        match self {
            Self::BadCharset(charsets) if !charsets.is_empty() => {
                out.push_str(" (");
                out.push_str(&charsets.join(" "));
                out.push(')');
            }
            Self::Capability(caps) => {
                for cap in caps {
                    out.push(' ');
                    out.push_str(&cap.to_string());
                }
            }
            Self::PermanentFlags(flags) => {
                out.push_str(" (");
                let rendered: Vec<String> = flags.iter().map(ToString::to_string).collect();
                out.push_str(&rendered.join(" "));
                out.push(')');
            }
            Self::UidNext(n) | Self::UidValidity(n) | Self::Unseen(n) => {
                out.push_str(&format!(" {n}"));
            }
            Self::AppendUid { uid_validity, uid } => {
                out.push_str(&format!(" {uid_validity} {uid}"));
            }
            Self::CopyUid {
                uid_validity,
                source_uids,
                dest_uids,
            } => {
                out.push_str(&format!(" {uid_validity} {source_uids} {dest_uids}"));
            }
            Self::HighestModSeq(n) => out.push_str(&format!(" {n}")),
            Self::Modified(set) => out.push_str(&format!(" {set}")),
            Self::Metadata(arg) | Self::MailboxId(arg) => {
                out.push(' ');
                out.push_str(arg);
            }
            Self::Other(_, Some(arg)) => {
                out.push(' ');
                out.push_str(arg);
            }
            _ => {}
        }
        out.push(']');
        out
    }

    /// Decodes a bracketed response code, positioned at `[`.
    pub fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        dec.expect_byte(b'[')?;
        let name = dec.read_atom()?.to_ascii_uppercase();
        let code = match name.as_str() {
            "ALERT" => Self::Alert,
            "PARSE" => Self::Parse,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            "UIDNOTSTICKY" => Self::UidNotSticky,
            "NOMODSEQ" => Self::NoModSeq,
            "CLOSED" => Self::Closed,
            "OVERQUOTA" => Self::OverQuota,
            "ALREADYEXISTS" => Self::AlreadyExists,
            "NONEXISTENT" => Self::NonExistent,
            "CONTACTADMIN" => Self::ContactAdmin,
            "NOPERM" => Self::NoPerm,
            "INUSE" => Self::InUse,
            "EXPUNGEISSUED" => Self::ExpungeIssued,
            "CORRUPTION" => Self::Corruption,
            "SERVERBUG" => Self::ServerBug,
            "CLIENTBUG" => Self::ClientBug,
            "CANNOT" => Self::Cannot,
            "LIMIT" => Self::Limit,
            "HASCHILDREN" => Self::HasChildren,
            "NOTSAVED" => Self::NotSaved,
            "OBJECTID" => Self::ObjectId,
            "INPROGRESS" => Self::InProgress,
            "BADCHARSET" => {
                let mut charsets = Vec::new();
                if dec.maybe_sp() {
                    dec.read_list(|d| {
                        charsets.push(d.read_astring()?);
                        Ok(())
                    })?;
                }
                Self::BadCharset(charsets)
            }
            "CAPABILITY" => {
                let mut caps = Vec::new();
                while dec.maybe_sp() {
                    caps.push(Capability::parse(&dec.read_atom()?));
                }
                Self::Capability(caps)
            }
            "PERMANENTFLAGS" => {
                dec.read_sp()?;
                Self::PermanentFlags(dec.read_flags()?)
            }
            "UIDNEXT" => {
                dec.read_sp()?;
                Self::UidNext(dec.read_number()?)
            }
            "UIDVALIDITY" => {
                dec.read_sp()?;
                Self::UidValidity(dec.read_number()?)
            }
            "UNSEEN" => {
                dec.read_sp()?;
                Self::Unseen(dec.read_number()?)
            }
            "APPENDUID" => {
                dec.read_sp()?;
                let uid_validity = dec.read_number()?;
                dec.read_sp()?;
                let uid = dec.read_number()?;
                Self::AppendUid { uid_validity, uid }
            }
            "COPYUID" => {
                dec.read_sp()?;
                let uid_validity = dec.read_number()?;
                dec.read_sp()?;
                let source_uids = dec.read_sequence_set(NumKind::Uid)?;
                dec.read_sp()?;
                let dest_uids = dec.read_sequence_set(NumKind::Uid)?;
                Self::CopyUid {
                    uid_validity,
                    source_uids,
                    dest_uids,
                }
            }
            "HIGHESTMODSEQ" => {
                dec.read_sp()?;
                Self::HighestModSeq(dec.read_number64()?)
            }
            "MODIFIED" => {
                dec.read_sp()?;
                Self::Modified(dec.read_sequence_set(NumKind::Uid)?)
            }
            "METADATA" => {
                dec.read_sp()?;
                Self::Metadata(read_code_arg(dec)?)
            }
            "MAILBOXID" => {
                dec.read_sp()?;
                Self::MailboxId(read_code_arg(dec)?)
            }
            _ => {
                let arg = if dec.maybe_sp() {
                    Some(read_code_arg(dec)?)
                } else {
                    None
                };
                Self::Other(name, arg)
            }
        };
        dec.expect_byte(b']')?;
        Ok(code)
    }
}

/// Reads a raw code argument up to the closing bracket, verbatim.
fn read_code_arg(dec: &mut Decoder) -> DecodeResult<String> {
    let mut out = Vec::new();
    loop {
        match dec.peek_byte() {
            Some(b']') => break,
            Some(b'\r') | None => {
                return Err(DecodeError::Expected {
                    position: dec.position(),
                    expected: "']'",
                });
            }
            Some(b) => {
                out.push(b);
                dec.discard_n(1);
            }
        }
    }
    String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8(dec.position()))
}

/// A status response: kind, optional response code, and text.
///
/// Status responses double as the protocol-level error type: a handler or
/// backend failure is a `StatusResponse` with kind NO/BAD/BYE that the
/// dispatch layer translates verbatim into the tagged response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Response kind.
    pub kind: StatusKind,
    /// Optional bracketed code.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

impl StatusResponse {
    /// Creates a response of the given kind.
    #[must_use]
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            text: text.into(),
        }
    }

    /// Creates an `OK` response.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Ok, text)
    }

    /// Creates a `NO` response.
    #[must_use]
    pub fn no(text: impl Into<String>) -> Self {
        Self::new(StatusKind::No, text)
    }

    /// Creates a `BAD` response.
    #[must_use]
    pub fn bad(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Bad, text)
    }

    /// Creates a `BYE` response.
    #[must_use]
    pub fn bye(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Bye, text)
    }

    /// Attaches a response code.
    #[must_use]
    pub fn with_code(mut self, code: ResponseCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns `true` for OK and PREAUTH.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.kind, StatusKind::Ok | StatusKind::PreAuth)
    }

    /// Decodes the `<kind> [<code>] <text>` tail of a status line.
    ///
    /// The caller has already consumed the tag (or `*`) and the following
    /// space; the decoder finishes the line including its CRLF.
    pub fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        let position = dec.position();
        let kind_atom = dec.read_atom()?;
        let kind = StatusKind::parse(&kind_atom).ok_or(DecodeError::Expected {
            position,
            expected: "status kind",
        })?;
        let mut code = None;
        let mut text = String::new();
        if dec.maybe_sp() {
            if dec.peek_byte() == Some(b'[') {
                code = Some(ResponseCode::decode(dec)?);
                dec.maybe_sp();
            }
            text = dec.read_text()?;
        } else {
            dec.read_crlf()?;
        }
        Ok(Self { kind, code, text })
    }
}

impl std::fmt::Display for StatusResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, " {}", code.to_wire())?;
        }
        if !self.text.is_empty() {
            write!(f, " {}", self.text)?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusResponse {}
