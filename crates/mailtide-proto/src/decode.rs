//! Streaming IMAP decoder.
//!
//! The decoder is synchronous and sans-I/O: it parses an owned byte buffer
//! that the transport layer fills one wire line at a time. When a
//! synchronizing literal is announced mid-line, parsing stops with
//! [`DecodeError::LiteralPending`]; the transport answers the continuation
//! request, splices the literal body and the following line into the buffer
//! with [`Decoder::extend`], and the failed read is retried.

use crate::error::{DecodeError, DecodeResult};
use crate::types::flags::{Flag, Flags};
use crate::types::numset::{NumKind, NumRange, NumSet};

/// Parsed literal header: `{N}`, `{N+}` or `~{N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralInfo {
    /// Declared size in bytes.
    pub size: u32,
    /// `true` for non-synchronizing literals (`{N+}`, LITERAL+/LITERAL-).
    pub non_sync: bool,
    /// `true` for binary literals (`~{N}`, RFC 3516).
    pub binary: bool,
}

/// Returns `true` if the byte may appear in an atom.
///
/// Atom characters are printable ASCII excluding the atom-specials
/// `( ) { % * " \ ]`, space, and control characters. `[` is excluded as
/// well so section tokens like `BODY[HEADER]` lex as an atom followed by
/// a bracketed section.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(
            b,
            b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b'[' | b']'
        )
}

/// Returns `true` if the string can be sent as a bare atom.
#[must_use]
pub fn is_atom(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_atom_char)
}

/// Synchronous IMAP decoder over an extendable buffer.
pub struct Decoder {
    buf: Vec<u8>,
    pos: usize,
}

impl Decoder {
    /// Creates a decoder over the given bytes.
    #[must_use]
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Appends more wire bytes, typically after a continuation round.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Rewinds (or advances) to a previously observed position.
    ///
    /// Used to retry a composite parse after a pending literal body has
    /// been spliced into the buffer.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    /// Unconsumed bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Returns `true` when the buffer is exhausted.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Peeks at the next byte without consuming it.
    #[must_use]
    pub fn peek_byte(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Some(byte)
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof(self.pos)
    }

    fn expected(&self, what: &'static str) -> DecodeError {
        DecodeError::Expected {
            position: self.pos,
            expected: what,
        }
    }

    /// Consumes one byte, failing unless it equals `want`.
    pub fn expect_byte(&mut self, want: u8) -> DecodeResult<()> {
        match self.peek_byte() {
            Some(b) if b == want => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(DecodeError::Expected {
                position: self.pos,
                expected: byte_name(want),
            }),
            None => Err(self.eof()),
        }
    }

    /// Consumes a single SP.
    pub fn read_sp(&mut self) -> DecodeResult<()> {
        self.expect_byte(b' ')
    }

    /// Consumes SP if present; returns whether one was consumed.
    pub fn maybe_sp(&mut self) -> bool {
        if self.peek_byte() == Some(b' ') {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes CRLF.
    pub fn read_crlf(&mut self) -> DecodeResult<()> {
        self.expect_byte(b'\r')?;
        self.expect_byte(b'\n')
    }

    /// Reads up to the next CRLF, returning the bytes before the
    /// terminator and consuming the terminator itself.
    pub fn read_line(&mut self) -> DecodeResult<Vec<u8>> {
        let rest = &self.buf[self.pos..];
        let Some(idx) = rest.windows(2).position(|w| w == b"\r\n") else {
            return Err(self.eof());
        };
        let line = rest[..idx].to_vec();
        self.pos += idx + 2;
        Ok(line)
    }

    /// Discards the rest of the current line, including the CRLF if any.
    pub fn discard_line(&mut self) {
        let rest = &self.buf[self.pos..];
        match rest.windows(2).position(|w| w == b"\r\n") {
            Some(idx) => self.pos += idx + 2,
            None => self.pos = self.buf.len(),
        }
    }

    /// Reads the remaining human-readable text of the current line.
    pub fn read_text(&mut self) -> DecodeResult<String> {
        let line = self.read_line()?;
        String::from_utf8(line).map_err(|_| DecodeError::InvalidUtf8(self.pos))
    }

    /// Greedily reads an atom.
    pub fn read_atom(&mut self) -> DecodeResult<String> {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if is_atom_char(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.expected("atom"));
        }
        str_slice(&self.buf[start..self.pos], start).map(str::to_owned)
    }

    /// Reads an unsigned 32-bit decimal number.
    pub fn read_number(&mut self) -> DecodeResult<u32> {
        let start = self.pos;
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.expected("number"));
        }
        let digits = str_slice(&self.buf[start..self.pos], start)?;
        digits
            .parse()
            .map_err(|_| DecodeError::InvalidNumber(start))
    }

    /// Reads an unsigned 64-bit decimal number.
    pub fn read_number64(&mut self) -> DecodeResult<u64> {
        let start = self.pos;
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.expected("number"));
        }
        let digits = str_slice(&self.buf[start..self.pos], start)?;
        digits
            .parse()
            .map_err(|_| DecodeError::InvalidNumber(start))
    }

    /// Reads a quoted string, honouring `\\` and `\"` escapes.
    pub fn read_quoted_string(&mut self) -> DecodeResult<String> {
        self.expect_byte(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b @ (b'"' | b'\\')) => out.push(b),
                    Some(_) => return Err(DecodeError::InvalidEscape(self.pos - 1)),
                    None => return Err(self.eof()),
                },
                Some(b'\r' | b'\n') => return Err(self.expected("closing quote")),
                Some(b) => out.push(b),
                None => return Err(self.eof()),
            }
        }
        String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8(self.pos))
    }

    /// Parses a literal header `{N}` / `{N+}` / `~{N}` and its trailing CRLF.
    pub fn read_literal_info(&mut self) -> DecodeResult<LiteralInfo> {
        let binary = if self.peek_byte() == Some(b'~') {
            self.pos += 1;
            true
        } else {
            false
        };
        self.expect_byte(b'{')?;
        let size = self.read_number()?;
        let non_sync = if self.peek_byte() == Some(b'+') {
            self.pos += 1;
            true
        } else {
            false
        };
        self.expect_byte(b'}')?;
        self.read_crlf()?;
        Ok(LiteralInfo {
            size,
            non_sync,
            binary,
        })
    }

    /// Reads exactly `size` raw bytes of a literal body.
    ///
    /// Fails with [`DecodeError::LiteralPending`] when fewer bytes are
    /// buffered; the caller's position is left unchanged in that case so
    /// the read can be retried after [`Decoder::extend`].
    pub fn read_literal_bytes(&mut self, info: LiteralInfo) -> DecodeResult<Vec<u8>> {
        let size = info.size as usize;
        if self.buf.len() - self.pos < size {
            return Err(DecodeError::LiteralPending(info));
        }
        let body = self.buf[self.pos..self.pos + size].to_vec();
        self.pos += size;
        Ok(body)
    }

    /// Reads a string: quoted string, literal, or atom.
    ///
    /// For a literal whose body is not yet buffered, the decoder rewinds to
    /// the start of the literal header and fails with
    /// [`DecodeError::LiteralPending`].
    pub fn read_string(&mut self) -> DecodeResult<String> {
        match self.peek_byte() {
            Some(b'"') => self.read_quoted_string(),
            Some(b'{' | b'~') => {
                let start = self.pos;
                let info = self.read_literal_info()?;
                match self.read_literal_bytes(info) {
                    Ok(body) => {
                        String::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8(start))
                    }
                    Err(err) => {
                        self.pos = start;
                        Err(err)
                    }
                }
            }
            Some(_) => self.read_atom(),
            None => Err(self.eof()),
        }
    }

    /// Reads an astring: atom with `]` permitted, quoted string, or literal.
    pub fn read_astring(&mut self) -> DecodeResult<String> {
        self.read_string()
    }

    /// Reads NIL or a string.
    pub fn read_nstring(&mut self) -> DecodeResult<Option<String>> {
        if self.peek_nil() {
            self.pos += 3;
            return Ok(None);
        }
        self.read_string().map(Some)
    }

    /// Reads a LIST pattern token: like an astring, but `%` and `*`
    /// wildcards are permitted in the atom form.
    pub fn read_list_mailbox(&mut self) -> DecodeResult<String> {
        match self.peek_byte() {
            Some(b'"' | b'{' | b'~') => self.read_string(),
            _ => {
                let start = self.pos;
                while let Some(b) = self.peek_byte() {
                    if is_atom_char(b) || b == b'%' || b == b'*' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                if self.pos == start {
                    return Err(self.expected("list pattern"));
                }
                str_slice(&self.buf[start..self.pos], start).map(str::to_owned)
            }
        }
    }

    /// Reads NIL or a string, returning raw bytes (binary-safe).
    pub fn read_nstring_bytes(&mut self) -> DecodeResult<Option<Vec<u8>>> {
        if self.peek_nil() {
            self.pos += 3;
            return Ok(None);
        }
        match self.peek_byte() {
            Some(b'{' | b'~') => {
                let start = self.pos;
                let info = self.read_literal_info()?;
                match self.read_literal_bytes(info) {
                    Ok(body) => Ok(Some(body)),
                    Err(err) => {
                        self.pos = start;
                        Err(err)
                    }
                }
            }
            _ => self.read_string().map(|s| Some(s.into_bytes())),
        }
    }

    fn peek_nil(&self) -> bool {
        self.buf[self.pos..]
            .get(..3)
            .is_some_and(|w| w.eq_ignore_ascii_case(b"NIL"))
            && !self
                .buf
                .get(self.pos + 3)
                .copied()
                .is_some_and(is_atom_char)
    }

    /// Reads a parenthesized list, invoking `element` once per element.
    ///
    /// The callback is responsible for consuming exactly one element; the
    /// decoder consumes the surrounding parentheses and separators. The
    /// empty list `()` is permitted.
    pub fn read_list<F>(&mut self, mut element: F) -> DecodeResult<()>
    where
        F: FnMut(&mut Self) -> DecodeResult<()>,
    {
        self.expect_byte(b'(')?;
        if self.peek_byte() == Some(b')') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            element(self)?;
            if !self.maybe_sp() {
                break;
            }
        }
        self.expect_byte(b')')
    }

    /// Reads a single flag: `\Atom`, `\*`, or a keyword atom.
    pub fn read_flag(&mut self) -> DecodeResult<Flag> {
        if self.peek_byte() == Some(b'\\') {
            self.pos += 1;
            if self.peek_byte() == Some(b'*') {
                self.pos += 1;
                return Ok(Flag::Wildcard);
            }
            let name = self.read_atom()?;
            return Ok(Flag::system(&name));
        }
        self.read_atom().map(Flag::Keyword)
    }

    /// Reads a parenthesized flag list.
    pub fn read_flags(&mut self) -> DecodeResult<Flags> {
        let mut flags = Flags::new();
        self.read_list(|dec| {
            flags.insert(dec.read_flag()?);
            Ok(())
        })?;
        Ok(flags)
    }

    /// Reads a sequence set: `num | num:num | *`, comma-joined.
    pub fn read_sequence_set(&mut self, kind: NumKind) -> DecodeResult<NumSet> {
        let start = self.pos;
        let mut ranges = Vec::new();
        loop {
            let lo = self.read_seq_number()?;
            let range = if self.peek_byte() == Some(b':') {
                self.pos += 1;
                NumRange::new(lo, self.read_seq_number()?)
            } else {
                NumRange::single(lo)
            };
            ranges.push(range);
            if self.peek_byte() == Some(b',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if ranges.is_empty() {
            return Err(DecodeError::InvalidNumSet(start));
        }
        Ok(NumSet::new(kind, ranges))
    }

    fn read_seq_number(&mut self) -> DecodeResult<u32> {
        if self.peek_byte() == Some(b'*') {
            self.pos += 1;
            return Ok(0);
        }
        let start = self.pos;
        let n = self.read_number()?;
        if n == 0 {
            return Err(DecodeError::InvalidNumSet(start));
        }
        Ok(n)
    }

    /// Skips `n` bytes, saturating at the end of the buffer.
    pub fn discard_n(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("pos", &self.pos)
            .field("len", &self.buf.len())
            .finish()
    }
}

fn str_slice(bytes: &[u8], position: usize) -> DecodeResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(position))
}

const fn byte_name(b: u8) -> &'static str {
    match b {
        b' ' => "SP",
        b'\r' => "CR",
        b'\n' => "LF",
        b'(' => "'('",
        b')' => "')'",
        b'{' => "'{'",
        b'}' => "'}'",
        b'[' => "'['",
        b']' => "']'",
        b'"' => "DQUOTE",
        b'+' => "'+'",
        b'*' => "'*'",
        _ => "byte",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_atom() {
        let mut dec = Decoder::new(&b"LOGIN user"[..]);
        assert_eq!(dec.read_atom().unwrap(), "LOGIN");
        dec.read_sp().unwrap();
        assert_eq!(dec.read_atom().unwrap(), "user");
        assert!(dec.is_eof());
    }

    #[test]
    fn test_atom_stops_at_specials() {
        let mut dec = Decoder::new(&b"FLAGS(\\Seen)"[..]);
        assert_eq!(dec.read_atom().unwrap(), "FLAGS");
        assert_eq!(dec.peek_byte(), Some(b'('));
    }

    #[test]
    fn test_empty_atom_fails() {
        let mut dec = Decoder::new(&b"(x)"[..]);
        assert!(matches!(
            dec.read_atom(),
            Err(DecodeError::Expected { expected: "atom", .. })
        ));
    }

    #[test]
    fn test_read_quoted_string() {
        let mut dec = Decoder::new(&b"\"hello world\""[..]);
        assert_eq!(dec.read_quoted_string().unwrap(), "hello world");
    }

    #[test]
    fn test_read_quoted_string_escapes() {
        let mut dec = Decoder::new(&b"\"a \\\"b\\\" \\\\c\""[..]);
        assert_eq!(dec.read_quoted_string().unwrap(), "a \"b\" \\c");
    }

    #[test]
    fn test_quoted_string_bad_escape() {
        let mut dec = Decoder::new(&b"\"a\\nb\""[..]);
        assert!(matches!(
            dec.read_quoted_string(),
            Err(DecodeError::InvalidEscape(_))
        ));
    }

    #[test]
    fn test_read_number() {
        let mut dec = Decoder::new(&b"4294967295 12"[..]);
        assert_eq!(dec.read_number().unwrap(), u32::MAX);
        dec.read_sp().unwrap();
        assert_eq!(dec.read_number().unwrap(), 12);
    }

    #[test]
    fn test_number_overflow() {
        let mut dec = Decoder::new(&b"4294967296"[..]);
        assert!(matches!(
            dec.read_number(),
            Err(DecodeError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_read_number64() {
        let mut dec = Decoder::new(&b"72057594037927936"[..]);
        assert_eq!(dec.read_number64().unwrap(), 72_057_594_037_927_936);
    }

    #[test]
    fn test_literal_info_sync() {
        let mut dec = Decoder::new(&b"{11}\r\n"[..]);
        let info = dec.read_literal_info().unwrap();
        assert_eq!(info.size, 11);
        assert!(!info.non_sync);
        assert!(!info.binary);
    }

    #[test]
    fn test_literal_info_non_sync() {
        let mut dec = Decoder::new(&b"{5+}\r\n"[..]);
        let info = dec.read_literal_info().unwrap();
        assert_eq!(info.size, 5);
        assert!(info.non_sync);
    }

    #[test]
    fn test_literal_info_binary() {
        let mut dec = Decoder::new(&b"~{3}\r\n"[..]);
        let info = dec.read_literal_info().unwrap();
        assert_eq!(info.size, 3);
        assert!(info.binary);
    }

    #[test]
    fn test_read_string_literal_inline() {
        let mut dec = Decoder::new(&b"{5}\r\nhello rest"[..]);
        assert_eq!(dec.read_string().unwrap(), "hello");
        dec.read_sp().unwrap();
        assert_eq!(dec.read_atom().unwrap(), "rest");
    }

    #[test]
    fn test_read_string_literal_pending_rewinds() {
        let mut dec = Decoder::new(&b"{5}\r\nhel"[..]);
        let pos = dec.position();
        match dec.read_string() {
            Err(DecodeError::LiteralPending(info)) => assert_eq!(info.size, 5),
            other => panic!("expected LiteralPending, got {other:?}"),
        }
        assert_eq!(dec.position(), pos);

        // After the transport splices the remaining bytes, the retry works.
        dec.extend(b"lo");
        assert_eq!(dec.read_string().unwrap(), "hello");
    }

    #[test]
    fn test_read_nstring() {
        let mut dec = Decoder::new(&b"NIL \"x\" nil"[..]);
        assert_eq!(dec.read_nstring().unwrap(), None);
        dec.read_sp().unwrap();
        assert_eq!(dec.read_nstring().unwrap(), Some("x".to_string()));
        dec.read_sp().unwrap();
        assert_eq!(dec.read_nstring().unwrap(), None);
    }

    #[test]
    fn test_nil_prefix_atom_is_not_nil() {
        let mut dec = Decoder::new(&b"NILLY"[..]);
        assert_eq!(dec.read_nstring().unwrap(), Some("NILLY".to_string()));
    }

    #[test]
    fn test_read_list() {
        let mut dec = Decoder::new(&b"(a b c)"[..]);
        let mut items = Vec::new();
        dec.read_list(|d| {
            items.push(d.read_atom()?);
            Ok(())
        })
        .unwrap();
        assert_eq!(items, ["a", "b", "c"]);
    }

    #[test]
    fn test_read_empty_list() {
        let mut dec = Decoder::new(&b"()"[..]);
        let mut calls = 0;
        dec.read_list(|_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_read_flags() {
        let mut dec = Decoder::new(&b"(\\Seen \\Flagged custom \\*)"[..]);
        let flags = dec.read_flags().unwrap();
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Flagged));
        assert!(flags.contains(&Flag::Keyword("custom".to_string())));
        assert!(flags.contains(&Flag::Wildcard));
    }

    #[test]
    fn test_read_line() {
        let mut dec = Decoder::new(&b"first line\r\nsecond"[..]);
        assert_eq!(dec.read_line().unwrap(), b"first line");
        assert_eq!(dec.remaining(), b"second");
    }

    #[test]
    fn test_sequence_set_simple() {
        let mut dec = Decoder::new(&b"1:5,9,20:*"[..]);
        let set = dec.read_sequence_set(NumKind::Seq).unwrap();
        assert_eq!(set.ranges().len(), 3);
        assert!(set.dynamic());
    }

    #[test]
    fn test_sequence_set_star_only() {
        let mut dec = Decoder::new(&b"*"[..]);
        let set = dec.read_sequence_set(NumKind::Uid).unwrap();
        assert!(set.dynamic());
        assert!(set.contains(42, 42));
    }

    #[test]
    fn test_sequence_set_rejects_zero() {
        let mut dec = Decoder::new(&b"0:3"[..]);
        assert!(matches!(
            dec.read_sequence_set(NumKind::Seq),
            Err(DecodeError::InvalidNumSet(_))
        ));
    }

    #[test]
    fn test_expect_byte_mismatch() {
        let mut dec = Decoder::new(&b"x"[..]);
        assert!(dec.expect_byte(b'(').is_err());
        assert_eq!(dec.peek_byte(), Some(b'x'));
    }

    #[test]
    fn test_read_list_mailbox_wildcards() {
        let mut dec = Decoder::new(&b"Archive/% \"Sent Mail\" *"[..]);
        assert_eq!(dec.read_list_mailbox().unwrap(), "Archive/%");
        dec.read_sp().unwrap();
        assert_eq!(dec.read_list_mailbox().unwrap(), "Sent Mail");
        dec.read_sp().unwrap();
        assert_eq!(dec.read_list_mailbox().unwrap(), "*");
    }

    #[test]
    fn test_crlf() {
        let mut dec = Decoder::new(&b"\r\n"[..]);
        dec.read_crlf().unwrap();
        assert!(dec.is_eof());
    }
}
