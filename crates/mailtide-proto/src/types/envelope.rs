//! Message envelopes.
//!
//! The minimal envelope model used by FETCH ENVELOPE: a fixed tuple of
//! nstrings and address lists, decoded and encoded losslessly.

use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::DecodeResult;

/// A single RFC 5322 address in envelope form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Display name, if any.
    pub name: Option<String>,
    /// Source route (obsolete, kept for round-tripping).
    pub adl: Option<String>,
    /// Local part of the address.
    pub mailbox: Option<String>,
    /// Domain part of the address.
    pub host: Option<String>,
}

impl Address {
    /// Builds an address from `local@domain` parts.
    #[must_use]
    pub fn new(mailbox: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: None,
            adl: None,
            mailbox: Some(mailbox.into()),
            host: Some(host.into()),
        }
    }

    /// Renders `local@domain` when both parts are present.
    #[must_use]
    pub fn addr_spec(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
            _ => None,
        }
    }

    fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        dec.expect_byte(b'(')?;
        let name = dec.read_nstring()?;
        dec.read_sp()?;
        let adl = dec.read_nstring()?;
        dec.read_sp()?;
        let mailbox = dec.read_nstring()?;
        dec.read_sp()?;
        let host = dec.read_nstring()?;
        dec.expect_byte(b')')?;
        Ok(Self {
            name,
            adl,
            mailbox,
            host,
        })
    }

    fn encode(&self, enc: &mut Encoder) {
        enc.begin_list();
        encode_nstring(enc, self.name.as_deref());
        enc.sp();
        encode_nstring(enc, self.adl.as_deref());
        enc.sp();
        encode_nstring(enc, self.mailbox.as_deref());
        enc.sp();
        encode_nstring(enc, self.host.as_deref());
        enc.end_list();
    }
}

/// A message envelope as carried by FETCH ENVELOPE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header, verbatim.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

impl Envelope {
    /// Decodes a parenthesized envelope.
    pub fn decode(dec: &mut Decoder) -> DecodeResult<Self> {
        dec.expect_byte(b'(')?;
        let date = dec.read_nstring()?;
        dec.read_sp()?;
        let subject = dec.read_nstring()?;
        dec.read_sp()?;
        let from = decode_address_list(dec)?;
        dec.read_sp()?;
        let sender = decode_address_list(dec)?;
        dec.read_sp()?;
        let reply_to = decode_address_list(dec)?;
        dec.read_sp()?;
        let to = decode_address_list(dec)?;
        dec.read_sp()?;
        let cc = decode_address_list(dec)?;
        dec.read_sp()?;
        let bcc = decode_address_list(dec)?;
        dec.read_sp()?;
        let in_reply_to = dec.read_nstring()?;
        dec.read_sp()?;
        let message_id = dec.read_nstring()?;
        dec.expect_byte(b')')?;
        Ok(Self {
            date,
            subject,
            from,
            sender,
            reply_to,
            to,
            cc,
            bcc,
            in_reply_to,
            message_id,
        })
    }

    /// Encodes the envelope as a parenthesized structure.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.begin_list();
        encode_nstring(enc, self.date.as_deref());
        enc.sp();
        encode_nstring(enc, self.subject.as_deref());
        enc.sp();
        encode_address_list(enc, &self.from);
        enc.sp();
        encode_address_list(enc, &self.sender);
        enc.sp();
        encode_address_list(enc, &self.reply_to);
        enc.sp();
        encode_address_list(enc, &self.to);
        enc.sp();
        encode_address_list(enc, &self.cc);
        enc.sp();
        encode_address_list(enc, &self.bcc);
        enc.sp();
        encode_nstring(enc, self.in_reply_to.as_deref());
        enc.sp();
        encode_nstring(enc, self.message_id.as_deref());
        enc.end_list();
    }
}

fn encode_nstring(enc: &mut Encoder, value: Option<&str>) {
    match value {
        Some(s) => {
            enc.string(s);
        }
        None => {
            enc.nil();
        }
    }
}

fn decode_address_list(dec: &mut Decoder) -> DecodeResult<Vec<Address>> {
    if dec.peek_byte() != Some(b'(') {
        // NIL
        dec.read_nstring()?;
        return Ok(Vec::new());
    }
    let mut addresses = Vec::new();
    dec.expect_byte(b'(')?;
    while dec.peek_byte() == Some(b'(') {
        addresses.push(Address::decode(dec)?);
        dec.maybe_sp();
    }
    dec.expect_byte(b')')?;
    Ok(addresses)
}

fn encode_address_list(enc: &mut Encoder, addresses: &[Address]) {
    if addresses.is_empty() {
        enc.nil();
        return;
    }
    enc.begin_list();
    for address in addresses {
        address.encode(enc);
    }
    enc.end_list();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn round_trip(envelope: &Envelope) -> Envelope {
        let mut enc = Encoder::new();
        envelope.encode(&mut enc);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        Envelope::decode(&mut dec).unwrap()
    }

    #[test]
    fn empty_envelope_round_trips() {
        let envelope = Envelope::default();
        assert_eq!(round_trip(&envelope), envelope);
    }

    #[test]
    fn full_envelope_round_trips() {
        let envelope = Envelope {
            date: Some("Wed, 17 Jul 1996 02:23:25 -0700".to_string()),
            subject: Some("Test".to_string()),
            from: vec![Address {
                name: Some("Alice".to_string()),
                adl: None,
                mailbox: Some("alice".to_string()),
                host: Some("example.com".to_string()),
            }],
            sender: vec![Address::new("alice", "example.com")],
            reply_to: Vec::new(),
            to: vec![Address::new("bob", "example.org")],
            cc: Vec::new(),
            bcc: Vec::new(),
            in_reply_to: None,
            message_id: Some("<x@example.com>".to_string()),
        };
        assert_eq!(round_trip(&envelope), envelope);
    }

    #[test]
    fn addr_spec() {
        assert_eq!(
            Address::new("alice", "example.com").addr_spec().unwrap(),
            "alice@example.com"
        );
        assert_eq!(Address::default().addr_spec(), None);
    }

    #[test]
    fn decode_wire_form() {
        let wire = b"(NIL \"Test\" ((\"Alice\" NIL \"alice\" \"example.com\")) NIL NIL NIL NIL NIL NIL \"<id@host>\")";
        let mut dec = Decoder::new(wire.to_vec());
        let envelope = Envelope::decode(&mut dec).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Test"));
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(
            envelope.from[0].addr_spec().unwrap(),
            "alice@example.com"
        );
        assert_eq!(envelope.message_id.as_deref(), Some("<id@host>"));
    }
}
