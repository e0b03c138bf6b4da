//! FETCH request attributes and response data.

use crate::datetime::{InternalDate, format_date_time, parse_date_time};
use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::{DecodeError, DecodeResult};
use crate::types::envelope::Envelope;
use crate::types::flags::Flags;
use crate::types::numset::Uid;

/// A requested FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttr {
    /// Message flags.
    Flags,
    /// Message UID.
    Uid,
    /// Message size in bytes.
    Rfc822Size,
    /// Internal date.
    InternalDate,
    /// Envelope structure.
    Envelope,
    /// A body section, e.g. `BODY[]`, `BODY.PEEK[HEADER]<0.512>`.
    BodySection {
        /// Raw section specifier between the brackets.
        section: String,
        /// `true` for BODY.PEEK (does not set `\Seen`).
        peek: bool,
        /// Partial fetch range `<origin.count>`.
        partial: Option<(u32, u32)>,
    },
    /// Mod-sequence (CONDSTORE).
    ModSeq,
}

impl FetchAttr {
    /// Decodes the FETCH items argument: a macro, a single item, or a
    /// parenthesized item list.
    pub fn decode_items(dec: &mut Decoder) -> DecodeResult<Vec<Self>> {
        if dec.peek_byte() == Some(b'(') {
            let mut items = Vec::new();
            dec.read_list(|d| {
                items.push(Self::decode(d)?);
                Ok(())
            })?;
            return Ok(items);
        }
        let position = dec.position();
        let name = dec.read_atom()?;
        if let Some(expanded) = Self::expand_macro(&name) {
            return Ok(expanded);
        }
        Self::decode_named(dec, &name, position).map(|attr| vec![attr])
    }

    /// Decodes a single FETCH item.
    pub fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        let position = dec.position();
        let name = dec.read_atom()?;
        Self::decode_named(dec, &name, position)
    }

    fn decode_named(dec: &mut Decoder, name: &str, position: usize) -> DecodeResult<Self> {
        let name = name.to_ascii_uppercase();
        match name.as_str() {
            "FLAGS" => Ok(Self::Flags),
            "UID" => Ok(Self::Uid),
            "RFC822.SIZE" => Ok(Self::Rfc822Size),
            "INTERNALDATE" => Ok(Self::InternalDate),
            "ENVELOPE" => Ok(Self::Envelope),
            "MODSEQ" => Ok(Self::ModSeq),
            "BODY" | "BODY.PEEK" => {
                if dec.peek_byte() != Some(b'[') {
                    // Bare BODY (the BODYSTRUCTURE short form) is out of
                    // scope; treat it as an envelope-level error.
                    return Err(DecodeError::Expected {
                        position: dec.position(),
                        expected: "'['",
                    });
                }
                dec.expect_byte(b'[')?;
                let mut section = String::new();
                while let Some(b) = dec.peek_byte() {
                    if b == b']' {
                        break;
                    }
                    section.push(b as char);
                    dec.discard_n(1);
                }
                dec.expect_byte(b']')?;
                let partial = if dec.peek_byte() == Some(b'<') {
                    dec.expect_byte(b'<')?;
                    let origin = dec.read_number()?;
                    dec.expect_byte(b'.')?;
                    let count = dec.read_number()?;
                    dec.expect_byte(b'>')?;
                    Some((origin, count))
                } else {
                    None
                };
                Ok(Self::BodySection {
                    section,
                    peek: name == "BODY.PEEK",
                    partial,
                })
            }
            _ => Err(DecodeError::Expected {
                position,
                expected: "fetch item",
            }),
        }
    }

    /// Expands a FETCH macro atom, or returns `None` for non-macros.
    #[must_use]
    pub fn expand_macro(name: &str) -> Option<Vec<Self>> {
        match name.to_ascii_uppercase().as_str() {
            "ALL" => Some(vec![
                Self::Flags,
                Self::InternalDate,
                Self::Rfc822Size,
                Self::Envelope,
            ]),
            "FAST" => Some(vec![Self::Flags, Self::InternalDate, Self::Rfc822Size]),
            "FULL" => Some(vec![
                Self::Flags,
                Self::InternalDate,
                Self::Rfc822Size,
                Self::Envelope,
                Self::BodySection {
                    section: String::new(),
                    peek: true,
                    partial: None,
                },
            ]),
            _ => None,
        }
    }

    /// Encodes the item in request form.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::Flags => {
                enc.atom("FLAGS");
            }
            Self::Uid => {
                enc.atom("UID");
            }
            Self::Rfc822Size => {
                enc.atom("RFC822.SIZE");
            }
            Self::InternalDate => {
                enc.atom("INTERNALDATE");
            }
            Self::Envelope => {
                enc.atom("ENVELOPE");
            }
            Self::ModSeq => {
                enc.atom("MODSEQ");
            }
            Self::BodySection {
                section,
                peek,
                partial,
            } => {
                enc.atom(if *peek { "BODY.PEEK[" } else { "BODY[" });
                enc.atom(section);
                enc.atom("]");
                if let Some((origin, count)) = partial {
                    enc.atom(&format!("<{origin}.{count}>"));
                }
            }
        }
    }
}

/// A fetched body section with its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySectionData {
    /// Raw section specifier between the brackets.
    pub section: String,
    /// Origin octet for partial responses.
    pub origin: Option<u32>,
    /// Section bytes, or `None` for NIL.
    pub data: Option<Vec<u8>>,
}

/// One message's FETCH response data.
///
/// Fields are emitted in a stable order: FLAGS, UID, RFC822.SIZE,
/// INTERNALDATE, ENVELOPE, MODSEQ, then body sections in request order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchData {
    /// Message sequence number.
    pub seq: u32,
    /// Flags, if fetched or changed.
    pub flags: Option<Flags>,
    /// UID, if fetched (always present for UID FETCH).
    pub uid: Option<Uid>,
    /// Size, if fetched.
    pub rfc822_size: Option<u32>,
    /// Internal date, if fetched.
    pub internal_date: Option<InternalDate>,
    /// Envelope, if fetched.
    pub envelope: Option<Envelope>,
    /// Mod-sequence, if fetched.
    pub modseq: Option<u64>,
    /// Message object identifier (OBJECTID), if the backend assigns one.
    pub email_id: Option<String>,
    /// Thread object identifier (OBJECTID), if the backend assigns one.
    pub thread_id: Option<String>,
    /// Server-generated preview text (PREVIEW), if requested.
    pub preview: Option<String>,
    /// Body sections in request order.
    pub body_sections: Vec<BodySectionData>,
}

impl FetchData {
    /// Creates empty data for a sequence number.
    #[must_use]
    pub fn new(seq: u32) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }

    /// Encodes the item list `(<items…>)` in stable order.
    pub fn encode_items(&self, enc: &mut Encoder) {
        enc.begin_list();
        let mut first = true;
        let mut sep = |enc: &mut Encoder, first: &mut bool| {
            if !*first {
                enc.sp();
            }
            *first = false;
        };
        if let Some(flags) = &self.flags {
            sep(enc, &mut first);
            enc.atom("FLAGS").sp().flags(flags);
        }
        if let Some(uid) = self.uid {
            sep(enc, &mut first);
            enc.atom("UID").sp().number(uid);
        }
        if let Some(size) = self.rfc822_size {
            sep(enc, &mut first);
            enc.atom("RFC822.SIZE").sp().number(size);
        }
        if let Some(date) = &self.internal_date {
            sep(enc, &mut first);
            enc.atom("INTERNALDATE").sp().date_time(date);
        }
        if let Some(envelope) = &self.envelope {
            sep(enc, &mut first);
            enc.atom("ENVELOPE").sp();
            envelope.encode(enc);
        }
        if let Some(modseq) = self.modseq {
            sep(enc, &mut first);
            enc.atom("MODSEQ").sp().begin_list().number64(modseq).end_list();
        }
        if let Some(email_id) = &self.email_id {
            sep(enc, &mut first);
            enc.atom("EMAILID").sp().begin_list().atom(email_id).end_list();
        }
        if let Some(thread_id) = &self.thread_id {
            sep(enc, &mut first);
            enc.atom("THREADID").sp().begin_list().atom(thread_id).end_list();
        }
        if let Some(preview) = &self.preview {
            sep(enc, &mut first);
            enc.atom("PREVIEW").sp().string(preview);
        }
        for section in &self.body_sections {
            sep(enc, &mut first);
            enc.atom("BODY[").atom(&section.section).atom("]");
            if let Some(origin) = section.origin {
                enc.atom(&format!("<{origin}>"));
            }
            enc.sp();
            match &section.data {
                Some(data) => {
                    enc.literal(data);
                }
                None => {
                    enc.nil();
                }
            }
        }
        enc.end_list();
    }

    /// Decodes the item list of a `* <seq> FETCH (...)` response.
    pub fn decode_items(seq: u32, dec: &mut Decoder) -> DecodeResult<Self> {
        let mut data = Self::new(seq);
        dec.expect_byte(b'(')?;
        loop {
            if dec.peek_byte() == Some(b')') {
                dec.discard_n(1);
                break;
            }
            let position = dec.position();
            let name = dec.read_atom()?.to_ascii_uppercase();
            match name.as_str() {
                "FLAGS" => {
                    dec.read_sp()?;
                    data.flags = Some(dec.read_flags()?);
                }
                "UID" => {
                    dec.read_sp()?;
                    data.uid = Some(dec.read_number()?);
                }
                "RFC822.SIZE" => {
                    dec.read_sp()?;
                    data.rfc822_size = Some(dec.read_number()?);
                }
                "INTERNALDATE" => {
                    dec.read_sp()?;
                    let raw = dec.read_string()?;
                    data.internal_date = Some(parse_date_time(&raw)?);
                }
                "ENVELOPE" => {
                    dec.read_sp()?;
                    data.envelope = Some(Envelope::decode(dec)?);
                }
                "MODSEQ" => {
                    dec.read_sp()?;
                    dec.expect_byte(b'(')?;
                    data.modseq = Some(dec.read_number64()?);
                    dec.expect_byte(b')')?;
                }
                "EMAILID" => {
                    dec.read_sp()?;
                    dec.expect_byte(b'(')?;
                    data.email_id = Some(dec.read_atom()?);
                    dec.expect_byte(b')')?;
                }
                "THREADID" => {
                    dec.read_sp()?;
                    dec.expect_byte(b'(')?;
                    data.thread_id = Some(dec.read_atom()?);
                    dec.expect_byte(b')')?;
                }
                "PREVIEW" => {
                    dec.read_sp()?;
                    data.preview = dec.read_nstring()?;
                }
                "BODY" => {
                    dec.expect_byte(b'[')?;
                    let mut section = String::new();
                    while let Some(b) = dec.peek_byte() {
                        if b == b']' {
                            break;
                        }
                        section.push(b as char);
                        dec.discard_n(1);
                    }
                    dec.expect_byte(b']')?;
                    let origin = if dec.peek_byte() == Some(b'<') {
                        dec.expect_byte(b'<')?;
                        let n = dec.read_number()?;
                        dec.expect_byte(b'>')?;
                        Some(n)
                    } else {
                        None
                    };
                    dec.read_sp()?;
                    let body = dec.read_nstring_bytes()?;
                    data.body_sections.push(BodySectionData {
                        section,
                        origin,
                        data: body,
                    });
                }
                _ => {
                    return Err(DecodeError::Expected {
                        position,
                        expected: "fetch item",
                    });
                }
            }
            dec.maybe_sp();
        }
        Ok(data)
    }

    /// Renders the internal date in wire form, for logging.
    #[must_use]
    pub fn internal_date_string(&self) -> Option<String> {
        self.internal_date.as_ref().map(|dt| format_date_time(dt))
    }
}
