//! LIST and STATUS response data.

use crate::decode::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::types::mailbox::Mailbox;

/// A mailbox name attribute in a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttr {
    /// Mailbox cannot be selected.
    Noselect,
    /// Mailbox has no children and cannot have any.
    Noinferiors,
    /// Mailbox is marked as interesting.
    Marked,
    /// Mailbox has no new messages.
    Unmarked,
    /// Mailbox has child mailboxes.
    HasChildren,
    /// Mailbox has no child mailboxes.
    HasNoChildren,
    /// Mailbox is subscribed (IMAP4rev2 LIST).
    Subscribed,
    /// Mailbox does not exist.
    NonExistent,
    /// Special-use: all mail.
    All,
    /// Special-use: archive.
    Archive,
    /// Special-use: drafts.
    Drafts,
    /// Special-use: flagged.
    Flagged,
    /// Special-use: junk.
    Junk,
    /// Special-use: sent.
    Sent,
    /// Special-use: trash.
    Trash,
    /// Any other attribute, without the leading backslash.
    Other(String),
}

impl MailboxAttr {
    /// Parses the attribute name (without the leading backslash).
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "NOSELECT" => Self::Noselect,
            "NOINFERIORS" => Self::Noinferiors,
            "MARKED" => Self::Marked,
            "UNMARKED" => Self::Unmarked,
            "HASCHILDREN" => Self::HasChildren,
            "HASNOCHILDREN" => Self::HasNoChildren,
            "SUBSCRIBED" => Self::Subscribed,
            "NONEXISTENT" => Self::NonExistent,
            "ALL" => Self::All,
            "ARCHIVE" => Self::Archive,
            "DRAFTS" => Self::Drafts,
            "FLAGGED" => Self::Flagged,
            "JUNK" => Self::Junk,
            "SENT" => Self::Sent,
            "TRASH" => Self::Trash,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Returns the wire form including the leading backslash.
    #[must_use]
    pub fn as_str(&self) -> String {
        let name = match self {
            Self::Noselect => "Noselect",
            Self::Noinferiors => "Noinferiors",
            Self::Marked => "Marked",
            Self::Unmarked => "Unmarked",
            Self::HasChildren => "HasChildren",
            Self::HasNoChildren => "HasNoChildren",
            Self::Subscribed => "Subscribed",
            Self::NonExistent => "NonExistent",
            Self::All => "All",
            Self::Archive => "Archive",
            Self::Drafts => "Drafts",
            Self::Flagged => "Flagged",
            Self::Junk => "Junk",
            Self::Sent => "Sent",
            Self::Trash => "Trash",
            Self::Other(name) => name,
        };
        format!("\\{name}")
    }
}

/// One `* LIST` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListData {
    /// Name attributes.
    pub attrs: Vec<MailboxAttr>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delim: Option<char>,
    /// The mailbox.
    pub mailbox: Mailbox,
    /// LIST-EXTENDED OLDNAME data, set after a RENAME.
    pub old_name: Option<Mailbox>,
    /// LIST-EXTENDED CHILDINFO extension names.
    pub child_info: Vec<String>,
    /// Correlated STATUS data requested via LIST RETURN (STATUS ...).
    pub status: Option<StatusData>,
}

impl ListData {
    /// Creates LIST data for a mailbox with no attributes.
    #[must_use]
    pub fn new(mailbox: Mailbox, delim: Option<char>) -> Self {
        Self {
            attrs: Vec::new(),
            delim,
            mailbox,
            old_name: None,
            child_info: Vec::new(),
            status: None,
        }
    }
}

/// A STATUS item that can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusAttr {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UID validity.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
    /// Highest mod-sequence (CONDSTORE).
    HighestModSeq,
}

impl StatusAttr {
    /// Parses a STATUS item name.
    pub fn parse(name: &str, position: usize) -> DecodeResult<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MESSAGES" => Ok(Self::Messages),
            "RECENT" => Ok(Self::Recent),
            "UIDNEXT" => Ok(Self::UidNext),
            "UIDVALIDITY" => Ok(Self::UidValidity),
            "UNSEEN" => Ok(Self::Unseen),
            "HIGHESTMODSEQ" => Ok(Self::HighestModSeq),
            _ => Err(DecodeError::Expected {
                position,
                expected: "status item",
            }),
        }
    }

    /// Decodes a parenthesized STATUS item list.
    pub fn decode_list(dec: &mut Decoder) -> DecodeResult<Vec<Self>> {
        let mut items = Vec::new();
        dec.read_list(|d| {
            let position = d.position();
            let name = d.read_atom()?;
            items.push(Self::parse(&name, position)?);
            Ok(())
        })?;
        Ok(items)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// STATUS response counters for one mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusData {
    /// The mailbox the counters describe.
    pub mailbox: Option<Mailbox>,
    /// MESSAGES counter.
    pub messages: Option<u32>,
    /// RECENT counter.
    pub recent: Option<u32>,
    /// UIDNEXT value.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u32>,
    /// UNSEEN counter.
    pub unseen: Option<u32>,
    /// HIGHESTMODSEQ value.
    pub highest_modseq: Option<u64>,
}

impl StatusData {
    /// Renders the parenthesized counter list in request order.
    #[must_use]
    pub fn to_item_list(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = self.messages {
            parts.push(format!("MESSAGES {n}"));
        }
        if let Some(n) = self.recent {
            parts.push(format!("RECENT {n}"));
        }
        if let Some(n) = self.uid_next {
            parts.push(format!("UIDNEXT {n}"));
        }
        if let Some(n) = self.uid_validity {
            parts.push(format!("UIDVALIDITY {n}"));
        }
        if let Some(n) = self.unseen {
            parts.push(format!("UNSEEN {n}"));
        }
        if let Some(n) = self.highest_modseq {
            parts.push(format!("HIGHESTMODSEQ {n}"));
        }
        format!("({})", parts.join(" "))
    }

    /// Decodes the parenthesized counter list.
    pub fn decode_items(dec: &mut Decoder) -> DecodeResult<Self> {
        let mut data = Self::default();
        dec.read_list(|d| {
            let position = d.position();
            let name = d.read_atom()?;
            d.read_sp()?;
            match StatusAttr::parse(&name, position)? {
                StatusAttr::Messages => data.messages = Some(d.read_number()?),
                StatusAttr::Recent => data.recent = Some(d.read_number()?),
                StatusAttr::UidNext => data.uid_next = Some(d.read_number()?),
                StatusAttr::UidValidity => data.uid_validity = Some(d.read_number()?),
                StatusAttr::Unseen => data.unseen = Some(d.read_number()?),
                StatusAttr::HighestModSeq => data.highest_modseq = Some(d.read_number64()?),
            }
            Ok(())
        })?;
        Ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn attr_parse_round_trip() {
        for name in ["Noselect", "HasChildren", "Subscribed", "Trash"] {
            let attr = MailboxAttr::parse(name);
            assert_eq!(attr.as_str(), format!("\\{name}"));
        }
    }

    #[test]
    fn attr_other_preserved() {
        let attr = MailboxAttr::parse("XListItem");
        assert_eq!(attr.as_str(), "\\XListItem");
    }

    #[test]
    fn status_attr_list() {
        let mut dec = Decoder::new(&b"(MESSAGES UNSEEN UIDNEXT)"[..]);
        let items = StatusAttr::decode_list(&mut dec).unwrap();
        assert_eq!(
            items,
            vec![StatusAttr::Messages, StatusAttr::Unseen, StatusAttr::UidNext]
        );
    }

    #[test]
    fn status_attr_rejects_unknown() {
        let mut dec = Decoder::new(&b"(BOGUS)"[..]);
        assert!(StatusAttr::decode_list(&mut dec).is_err());
    }

    #[test]
    fn status_data_round_trip() {
        let data = StatusData {
            mailbox: None,
            messages: Some(231),
            recent: None,
            uid_next: Some(44_292),
            uid_validity: None,
            unseen: Some(5),
            highest_modseq: None,
        };
        let rendered = data.to_item_list();
        assert_eq!(rendered, "(MESSAGES 231 UIDNEXT 44292 UNSEEN 5)");
        let mut dec = Decoder::new(rendered.into_bytes());
        assert_eq!(StatusData::decode_items(&mut dec).unwrap(), data);
    }
}
