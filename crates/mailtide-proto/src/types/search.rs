//! SEARCH criteria.

use chrono::NaiveDate;

use crate::datetime::{format_date, parse_date};
use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::{DecodeError, DecodeResult};
use crate::types::flags::Flag;
use crate::types::numset::{NumKind, NumSet};

/// A single SEARCH key, possibly composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// All messages.
    All,
    /// Messages with the `\Answered` flag.
    Answered,
    /// Messages with the `\Deleted` flag.
    Deleted,
    /// Messages with the `\Draft` flag.
    Draft,
    /// Messages with the `\Flagged` flag.
    Flagged,
    /// Recent and unseen messages.
    New,
    /// Messages without the `\Recent` flag.
    Old,
    /// Messages with the `\Recent` flag.
    Recent,
    /// Messages with the `\Seen` flag.
    Seen,
    /// Messages without the `\Answered` flag.
    Unanswered,
    /// Messages without the `\Deleted` flag.
    Undeleted,
    /// Messages without the `\Draft` flag.
    Undraft,
    /// Messages without the `\Flagged` flag.
    Unflagged,
    /// Messages without the `\Seen` flag.
    Unseen,
    /// Bcc header contains the string.
    Bcc(String),
    /// Body contains the string.
    Body(String),
    /// Cc header contains the string.
    Cc(String),
    /// From header contains the string.
    From(String),
    /// Subject header contains the string.
    Subject(String),
    /// Header or body contains the string.
    Text(String),
    /// To header contains the string.
    To(String),
    /// Named header contains the string.
    Header(String, String),
    /// Messages with the keyword flag set.
    Keyword(Flag),
    /// Messages without the keyword flag.
    Unkeyword(Flag),
    /// Internal date before the day.
    Before(NaiveDate),
    /// Internal date within the day.
    On(NaiveDate),
    /// Internal date on or after the day.
    Since(NaiveDate),
    /// Date header before the day.
    SentBefore(NaiveDate),
    /// Date header within the day.
    SentOn(NaiveDate),
    /// Date header on or after the day.
    SentSince(NaiveDate),
    /// Size larger than n octets.
    Larger(u32),
    /// Size smaller than n octets.
    Smaller(u32),
    /// Message sequence number set.
    SeqSet(NumSet),
    /// UID set.
    UidSet(NumSet),
    /// Mod-sequence at least n (CONDSTORE).
    ModSeq(u64),
    /// Negation.
    Not(Box<SearchKey>),
    /// Disjunction of exactly two keys.
    Or(Box<SearchKey>, Box<SearchKey>),
    /// Conjunction (the implicit ANDing of a key list).
    And(Vec<SearchKey>),
}

impl SearchKey {
    /// Decodes one search key from the decoder.
    pub fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        match dec.peek_byte() {
            Some(b'(') => {
                let mut keys = Vec::new();
                dec.read_list(|d| {
                    keys.push(Self::decode(d)?);
                    Ok(())
                })?;
                Ok(Self::And(keys))
            }
            Some(b'*' | b'0'..=b'9') => {
                Ok(Self::SeqSet(dec.read_sequence_set(NumKind::Seq)?))
            }
            _ => {
                let position = dec.position();
                let name = dec.read_atom()?.to_ascii_uppercase();
                Self::decode_named(dec, &name, position)
            }
        }
    }

    /// Decodes all remaining keys on the line as an implicit AND.
    pub fn decode_all(dec: &mut Decoder) -> DecodeResult<Self> {
        let mut keys = vec![Self::decode(dec)?];
        while dec.maybe_sp() {
            keys.push(Self::decode(dec)?);
        }
        if keys.len() == 1 {
            Ok(keys.remove(0))
        } else {
            Ok(Self::And(keys))
        }
    }

    fn decode_named(dec: &mut Decoder, name: &str, position: usize) -> DecodeResult<Self> {
        let read_string = |d: &mut Decoder| -> DecodeResult<String> {
            d.read_sp()?;
            d.read_astring()
        };
        let read_date = |d: &mut Decoder| -> DecodeResult<NaiveDate> {
            d.read_sp()?;
            let raw = d.read_string()?;
            parse_date(&raw)
        };
        match name {
            "ALL" => Ok(Self::All),
            "ANSWERED" => Ok(Self::Answered),
            "DELETED" => Ok(Self::Deleted),
            "DRAFT" => Ok(Self::Draft),
            "FLAGGED" => Ok(Self::Flagged),
            "NEW" => Ok(Self::New),
            "OLD" => Ok(Self::Old),
            "RECENT" => Ok(Self::Recent),
            "SEEN" => Ok(Self::Seen),
            "UNANSWERED" => Ok(Self::Unanswered),
            "UNDELETED" => Ok(Self::Undeleted),
            "UNDRAFT" => Ok(Self::Undraft),
            "UNFLAGGED" => Ok(Self::Unflagged),
            "UNSEEN" => Ok(Self::Unseen),
            "BCC" => Ok(Self::Bcc(read_string(dec)?)),
            "BODY" => Ok(Self::Body(read_string(dec)?)),
            "CC" => Ok(Self::Cc(read_string(dec)?)),
            "FROM" => Ok(Self::From(read_string(dec)?)),
            "SUBJECT" => Ok(Self::Subject(read_string(dec)?)),
            "TEXT" => Ok(Self::Text(read_string(dec)?)),
            "TO" => Ok(Self::To(read_string(dec)?)),
            "HEADER" => {
                let field = read_string(dec)?;
                let value = read_string(dec)?;
                Ok(Self::Header(field, value))
            }
            "KEYWORD" => {
                dec.read_sp()?;
                Ok(Self::Keyword(dec.read_flag()?))
            }
            "UNKEYWORD" => {
                dec.read_sp()?;
                Ok(Self::Unkeyword(dec.read_flag()?))
            }
            "BEFORE" => Ok(Self::Before(read_date(dec)?)),
            "ON" => Ok(Self::On(read_date(dec)?)),
            "SINCE" => Ok(Self::Since(read_date(dec)?)),
            "SENTBEFORE" => Ok(Self::SentBefore(read_date(dec)?)),
            "SENTON" => Ok(Self::SentOn(read_date(dec)?)),
            "SENTSINCE" => Ok(Self::SentSince(read_date(dec)?)),
            "LARGER" => {
                dec.read_sp()?;
                Ok(Self::Larger(dec.read_number()?))
            }
            "SMALLER" => {
                dec.read_sp()?;
                Ok(Self::Smaller(dec.read_number()?))
            }
            "UID" => {
                dec.read_sp()?;
                Ok(Self::UidSet(dec.read_sequence_set(NumKind::Uid)?))
            }
            "MODSEQ" => {
                dec.read_sp()?;
                Ok(Self::ModSeq(dec.read_number64()?))
            }
            "NOT" => {
                dec.read_sp()?;
                Ok(Self::Not(Box::new(Self::decode(dec)?)))
            }
            "OR" => {
                dec.read_sp()?;
                let a = Self::decode(dec)?;
                dec.read_sp()?;
                let b = Self::decode(dec)?;
                Ok(Self::Or(Box::new(a), Box::new(b)))
            }
            _ => Err(DecodeError::Expected {
                position,
                expected: "search key",
            }),
        }
    }

    /// Encodes the key in request form.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::All => {
                enc.atom("ALL");
            }
            Self::Answered => {
                enc.atom("ANSWERED");
            }
            Self::Deleted => {
                enc.atom("DELETED");
            }
            Self::Draft => {
                enc.atom("DRAFT");
            }
            Self::Flagged => {
                enc.atom("FLAGGED");
            }
            Self::New => {
                enc.atom("NEW");
            }
            Self::Old => {
                enc.atom("OLD");
            }
            Self::Recent => {
                enc.atom("RECENT");
            }
            Self::Seen => {
                enc.atom("SEEN");
            }
            Self::Unanswered => {
                enc.atom("UNANSWERED");
            }
            Self::Undeleted => {
                enc.atom("UNDELETED");
            }
            Self::Undraft => {
                enc.atom("UNDRAFT");
            }
            Self::Unflagged => {
                enc.atom("UNFLAGGED");
            }
            Self::Unseen => {
                enc.atom("UNSEEN");
            }
            Self::Bcc(s) => {
                enc.atom("BCC").sp().astring(s);
            }
            Self::Body(s) => {
                enc.atom("BODY").sp().astring(s);
            }
            Self::Cc(s) => {
                enc.atom("CC").sp().astring(s);
            }
            Self::From(s) => {
                enc.atom("FROM").sp().astring(s);
            }
            Self::Subject(s) => {
                enc.atom("SUBJECT").sp().astring(s);
            }
            Self::Text(s) => {
                enc.atom("TEXT").sp().astring(s);
            }
            Self::To(s) => {
                enc.atom("TO").sp().astring(s);
            }
            Self::Header(field, value) => {
                enc.atom("HEADER").sp().astring(field).sp().astring(value);
            }
            Self::Keyword(flag) => {
                enc.atom("KEYWORD").sp().atom(flag.as_str());
            }
            Self::Unkeyword(flag) => {
                enc.atom("UNKEYWORD").sp().atom(flag.as_str());
            }
            Self::Before(d) => {
                enc.atom("BEFORE").sp().atom(&format_date(d));
            }
            Self::On(d) => {
                enc.atom("ON").sp().atom(&format_date(d));
            }
            Self::Since(d) => {
                enc.atom("SINCE").sp().atom(&format_date(d));
            }
            Self::SentBefore(d) => {
                enc.atom("SENTBEFORE").sp().atom(&format_date(d));
            }
            Self::SentOn(d) => {
                enc.atom("SENTON").sp().atom(&format_date(d));
            }
            Self::SentSince(d) => {
                enc.atom("SENTSINCE").sp().atom(&format_date(d));
            }
            Self::Larger(n) => {
                enc.atom("LARGER").sp().number(*n);
            }
            Self::Smaller(n) => {
                enc.atom("SMALLER").sp().number(*n);
            }
            Self::SeqSet(set) => {
                enc.atom(&set.to_string());
            }
            Self::UidSet(set) => {
                enc.atom("UID").sp().atom(&set.to_string());
            }
            Self::ModSeq(n) => {
                enc.atom("MODSEQ").sp().number64(*n);
            }
            Self::Not(key) => {
                enc.atom("NOT").sp();
                key.encode(enc);
            }
            Self::Or(a, b) => {
                enc.atom("OR").sp();
                a.encode(enc);
                enc.sp();
                b.encode(enc);
            }
            Self::And(keys) => {
                enc.begin_list();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        enc.sp();
                    }
                    key.encode(enc);
                }
                enc.end_list();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(input: &str) -> SearchKey {
        let mut dec = Decoder::new(input.as_bytes().to_vec());
        SearchKey::decode_all(&mut dec).unwrap()
    }

    #[test]
    fn simple_keys() {
        assert_eq!(decode("ALL"), SearchKey::All);
        assert_eq!(decode("UNSEEN"), SearchKey::Unseen);
    }

    #[test]
    fn implicit_and() {
        let key = decode("UNSEEN FLAGGED");
        assert_eq!(
            key,
            SearchKey::And(vec![SearchKey::Unseen, SearchKey::Flagged])
        );
    }

    #[test]
    fn string_keys() {
        assert_eq!(
            decode("FROM \"alice@example.com\""),
            SearchKey::From("alice@example.com".to_string())
        );
        assert_eq!(
            decode("HEADER Message-ID \"<x@y>\""),
            SearchKey::Header("Message-ID".to_string(), "<x@y>".to_string())
        );
    }

    #[test]
    fn date_keys() {
        let key = decode("SINCE 1-Feb-1994");
        assert_eq!(
            key,
            SearchKey::Since(NaiveDate::from_ymd_opt(1994, 2, 1).unwrap())
        );
    }

    #[test]
    fn composite_keys() {
        let key = decode("OR SEEN NOT DELETED");
        assert_eq!(
            key,
            SearchKey::Or(
                Box::new(SearchKey::Seen),
                Box::new(SearchKey::Not(Box::new(SearchKey::Deleted)))
            )
        );
    }

    #[test]
    fn sequence_and_uid_sets() {
        assert!(matches!(decode("1:5"), SearchKey::SeqSet(_)));
        assert!(matches!(decode("UID 100:*"), SearchKey::UidSet(_)));
    }

    #[test]
    fn parenthesized_group() {
        let key = decode("(SEEN FLAGGED)");
        assert_eq!(
            key,
            SearchKey::And(vec![SearchKey::Seen, SearchKey::Flagged])
        );
    }

    #[test]
    fn unknown_key_fails() {
        let mut dec = Decoder::new(&b"BOGUSKEY"[..]);
        assert!(SearchKey::decode_all(&mut dec).is_err());
    }

    #[test]
    fn encode_round_trip() {
        let original = decode("OR (UNSEEN LARGER 1024) FROM alice SINCE 5-Feb-2020");
        let mut enc = Encoder::new();
        original.encode(&mut enc);
        let rendered = enc.into_bytes().to_vec();
        let mut dec = Decoder::new(rendered);
        let parsed = SearchKey::decode_all(&mut dec).unwrap();
        assert_eq!(parsed, original);
    }
}
