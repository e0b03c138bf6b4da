//! Fluent IMAP encoder.
//!
//! The encoder builds one wire unit (a command or a response) in memory;
//! the transport layer writes the finished buffer in a single critical
//! section so concurrent writers never interleave.

use bytes::BytesMut;

use crate::datetime::{InternalDate, format_date_time};
use crate::types::flags::Flags;
use crate::types::status::{ResponseCode, StatusResponse};
use crate::utf7::encode_utf7;

/// Chainable IMAP wire encoder over a growable buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
    utf8_accepted: bool,
}

impl Encoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables UTF-8 mode: mailbox names and strings may carry raw UTF-8
    /// (quoted) instead of modified UTF-7 / literals.
    pub const fn set_utf8_accepted(&mut self, accepted: bool) {
        self.utf8_accepted = accepted;
    }

    /// The encoded bytes so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the encoder, returning the buffer.
    #[must_use]
    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    /// Appends raw bytes verbatim.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends an atom (or any preformatted token) verbatim.
    pub fn atom(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Appends a single space.
    pub fn sp(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b" ");
        self
    }

    /// Appends CRLF.
    pub fn crlf(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    /// Appends `NIL`.
    pub fn nil(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b"NIL");
        self
    }

    /// Appends a 32-bit decimal number.
    pub fn number(&mut self, n: u32) -> &mut Self {
        self.atom(&n.to_string())
    }

    /// Appends a 64-bit decimal number.
    pub fn number64(&mut self, n: u64) -> &mut Self {
        self.atom(&n.to_string())
    }

    /// Appends a quoted string, escaping `"` and `\`.
    pub fn quoted_string(&mut self, s: &str) -> &mut Self {
        self.buf.reserve(s.len() + 2);
        self.buf.extend_from_slice(b"\"");
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                self.buf.extend_from_slice(b"\\");
            }
            self.buf.extend_from_slice(&[b]);
        }
        self.buf.extend_from_slice(b"\"");
        self
    }

    /// Appends a string as quoted or literal depending on its content.
    ///
    /// CR, LF and NUL always force a literal; bytes above 0x7e force one
    /// only while UTF-8 has not been negotiated.
    pub fn string(&mut self, s: &str) -> &mut Self {
        let must_literal = s.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
            || (!self.utf8_accepted && s.bytes().any(|b| b > 0x7e));
        if must_literal {
            self.literal(s.as_bytes())
        } else {
            self.quoted_string(s)
        }
    }

    /// Appends an astring: bare atom when possible, string otherwise.
    pub fn astring(&mut self, s: &str) -> &mut Self {
        if crate::decode::is_atom(s) {
            self.atom(s)
        } else {
            self.string(s)
        }
    }

    /// Appends a synchronizing literal: `{N}\r\n<bytes>`.
    pub fn literal(&mut self, bytes: &[u8]) -> &mut Self {
        self.atom(&format!("{{{}}}", bytes.len()));
        self.crlf();
        self.raw(bytes)
    }

    /// Appends a non-synchronizing literal: `{N+}\r\n<bytes>`.
    pub fn literal_non_sync(&mut self, bytes: &[u8]) -> &mut Self {
        self.atom(&format!("{{{}+}}", bytes.len()));
        self.crlf();
        self.raw(bytes)
    }

    /// Opens a parenthesized list.
    pub fn begin_list(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b"(");
        self
    }

    /// Closes a parenthesized list.
    pub fn end_list(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b")");
        self
    }

    /// Appends a parenthesized flag list.
    pub fn flags(&mut self, flags: &Flags) -> &mut Self {
        self.begin_list();
        for (i, flag) in flags.iter().enumerate() {
            if i > 0 {
                self.sp();
            }
            self.atom(flag.as_str());
        }
        self.end_list()
    }

    /// Appends a mailbox name, applying modified UTF-7 unless UTF-8 has
    /// been accepted on this connection.
    pub fn mailbox(&mut self, name: &str) -> &mut Self {
        if self.utf8_accepted {
            self.astring(name)
        } else {
            let encoded = encode_utf7(name);
            self.astring(&encoded)
        }
    }

    /// Appends a quoted internal date-time.
    pub fn date_time(&mut self, dt: &InternalDate) -> &mut Self {
        let rendered = format_date_time(dt);
        self.buf.extend_from_slice(b"\"");
        self.atom(&rendered);
        self.buf.extend_from_slice(b"\"");
        self
    }

    /// Appends a bracketed response code.
    pub fn response_code(&mut self, code: &ResponseCode) -> &mut Self {
        self.atom(&code.to_wire())
    }

    /// Appends a complete status response line.
    ///
    /// `tag` is `None` for untagged (`*`) responses.
    pub fn status_response(&mut self, tag: Option<&str>, status: &StatusResponse) -> &mut Self {
        self.atom(tag.unwrap_or("*"));
        self.sp();
        self.atom(status.kind.as_str());
        if let Some(code) = &status.code {
            self.sp();
            self.response_code(code);
        }
        if !status.text.is_empty() {
            self.sp();
            self.atom(&status.text);
        }
        self.crlf()
    }

    /// Appends a continuation request: `+ <text>\r\n`.
    pub fn continuation_request(&mut self, text: &str) -> &mut Self {
        self.atom("+");
        if !text.is_empty() {
            self.sp();
            self.atom(text);
        }
        self.crlf()
    }

    /// Appends the untagged marker `* `.
    pub fn star(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b"* ");
        self
    }

    /// Appends a numbered untagged response header: `* <n> <name>`.
    pub fn num_response(&mut self, n: u32, name: &str) -> &mut Self {
        self.star();
        self.number(n);
        self.sp();
        self.atom(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::flags::Flag;
    use crate::types::status::StatusKind;

    fn encoded(f: impl FnOnce(&mut Encoder)) -> Vec<u8> {
        let mut enc = Encoder::new();
        f(&mut enc);
        enc.into_bytes().to_vec()
    }

    #[test]
    fn test_atoms_and_numbers() {
        let out = encoded(|e| {
            e.atom("FETCH").sp().number(7).sp().number64(u64::MAX);
        });
        assert_eq!(out, b"FETCH 7 18446744073709551615");
    }

    #[test]
    fn test_quoted_string_escapes() {
        let out = encoded(|e| {
            e.quoted_string("a \"b\" \\c");
        });
        assert_eq!(out, b"\"a \\\"b\\\" \\\\c\"");
    }

    #[test]
    fn test_string_selects_quoted() {
        let out = encoded(|e| {
            e.string("hello world");
        });
        assert_eq!(out, b"\"hello world\"");
    }

    #[test]
    fn test_string_selects_literal_for_newline() {
        let out = encoded(|e| {
            e.string("a\r\nb");
        });
        assert_eq!(out, b"{4}\r\na\r\nb");
    }

    #[test]
    fn test_string_selects_literal_for_high_bytes() {
        let out = encoded(|e| {
            e.string("héllo");
        });
        assert!(out.starts_with(b"{6}\r\n"));
    }

    #[test]
    fn test_utf8_accepted_keeps_quoted() {
        let out = encoded(|e| {
            e.set_utf8_accepted(true);
            e.string("héllo");
        });
        assert_eq!(out, "\"héllo\"".as_bytes());
    }

    #[test]
    fn test_astring_bare_atom() {
        let out = encoded(|e| {
            e.astring("INBOX");
        });
        assert_eq!(out, b"INBOX");
    }

    #[test]
    fn test_astring_empty_is_quoted() {
        let out = encoded(|e| {
            e.astring("");
        });
        assert_eq!(out, b"\"\"");
    }

    #[test]
    fn test_literal_non_sync() {
        let out = encoded(|e| {
            e.literal_non_sync(b"hello");
        });
        assert_eq!(out, b"{5+}\r\nhello");
    }

    #[test]
    fn test_flag_list() {
        let flags = Flags::from_vec(vec![Flag::Seen, Flag::Flagged]);
        let out = encoded(|e| {
            e.flags(&flags);
        });
        assert_eq!(out, b"(\\Seen \\Flagged)");
    }

    #[test]
    fn test_mailbox_utf7() {
        let out = encoded(|e| {
            e.mailbox("Entwürfe");
        });
        assert_eq!(out, b"Entw&APw-rfe");
    }

    #[test]
    fn test_mailbox_utf8_accepted() {
        let out = encoded(|e| {
            e.set_utf8_accepted(true);
            e.mailbox("Entwürfe");
        });
        assert_eq!(out, "\"Entwürfe\"".as_bytes());
    }

    #[test]
    fn test_status_response_tagged_with_code() {
        let status = StatusResponse::new(StatusKind::Ok, "APPEND completed").with_code(
            ResponseCode::AppendUid {
                uid_validity: 42,
                uid: 7,
            },
        );
        let out = encoded(|e| {
            e.status_response(Some("A003"), &status);
        });
        assert_eq!(out, b"A003 OK [APPENDUID 42 7] APPEND completed\r\n");
    }

    #[test]
    fn test_status_response_untagged() {
        let status = StatusResponse::ok("ready");
        let out = encoded(|e| {
            e.status_response(None, &status);
        });
        assert_eq!(out, b"* OK ready\r\n");
    }

    #[test]
    fn test_continuation_request() {
        let out = encoded(|e| {
            e.continuation_request("idling");
        });
        assert_eq!(out, b"+ idling\r\n");
    }

    #[test]
    fn test_num_response() {
        let out = encoded(|e| {
            e.num_response(23, "EXISTS").crlf();
        });
        assert_eq!(out, b"* 23 EXISTS\r\n");
    }

    #[test]
    fn test_date_time() {
        let dt = crate::datetime::parse_date_time("17-Jul-1996 02:44:25 -0700").unwrap();
        let out = encoded(|e| {
            e.date_time(&dt);
        });
        assert_eq!(out, b"\"17-Jul-1996 02:44:25 -0700\"");
    }
}
