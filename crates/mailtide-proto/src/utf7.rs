//! Modified UTF-7 mailbox-name encoding (RFC 3501 §5.1.3).
//!
//! Printable US-ASCII other than `&` represents itself; `&` is escaped as
//! `&-`; everything else is carried in `&…-` shifts holding modified
//! BASE64 (`,` instead of `/`, no padding) over UTF-16BE code units.

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};

use crate::error::{DecodeError, DecodeResult};

const ALPHABET: Alphabet = match Alphabet::new(
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+,",
) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid modified base64 alphabet"),
};

const CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::RequireNone)
    .with_decode_allow_trailing_bits(true);

const ENGINE: GeneralPurpose = GeneralPurpose::new(&ALPHABET, CONFIG);

fn is_direct(c: char) -> bool {
    matches!(c, '\x20'..='\x7e') && c != '&'
}

/// Encodes a mailbox name into modified UTF-7.
///
/// Names consisting only of printable US-ASCII pass through unchanged
/// (apart from `&` escaping), so the result is safe to send as an astring.
#[must_use]
pub fn encode_utf7(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut shifted: Vec<u16> = Vec::new();

    let mut flush = |out: &mut String, shifted: &mut Vec<u16>| {
        if shifted.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(shifted.len() * 2);
        for unit in shifted.iter() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        out.push('&');
        out.push_str(&ENGINE.encode(&bytes));
        out.push('-');
        shifted.clear();
    };

    for c in name.chars() {
        if is_direct(c) {
            flush(&mut out, &mut shifted);
            out.push(c);
        } else if c == '&' {
            flush(&mut out, &mut shifted);
            out.push_str("&-");
        } else {
            let mut units = [0u16; 2];
            shifted.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush(&mut out, &mut shifted);
    out
}

/// Decodes a modified UTF-7 mailbox name.
pub fn decode_utf7(encoded: &str) -> DecodeResult<String> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.char_indices();

    while let Some((start, c)) = chars.next() {
        if c != '&' {
            if !is_direct(c) {
                return Err(DecodeError::InvalidUtf7);
            }
            out.push(c);
            continue;
        }
        // Shift sequence: everything up to the next '-'.
        let rest = &encoded[start + 1..];
        let Some(end) = rest.find('-') else {
            return Err(DecodeError::InvalidUtf7);
        };
        let b64 = &rest[..end];
        if b64.is_empty() {
            out.push('&');
        } else {
            let bytes = ENGINE.decode(b64).map_err(|_| DecodeError::InvalidUtf7)?;
            if bytes.len() % 2 != 0 {
                return Err(DecodeError::InvalidUtf7);
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            let decoded = String::from_utf16(&units).map_err(|_| DecodeError::InvalidUtf7)?;
            if decoded.chars().all(is_direct) {
                // Directly-representable text must not be shift-encoded.
                return Err(DecodeError::InvalidUtf7);
            }
            out.push_str(&decoded);
        }
        // Skip the consumed shift sequence.
        for _ in 0..=end {
            chars.next();
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passthrough() {
        assert_eq!(encode_utf7("INBOX"), "INBOX");
        assert_eq!(decode_utf7("INBOX").unwrap(), "INBOX");
    }

    #[test]
    fn ampersand_escape() {
        assert_eq!(encode_utf7("Lost & Found"), "Lost &- Found");
        assert_eq!(decode_utf7("Lost &- Found").unwrap(), "Lost & Found");
    }

    #[test]
    fn rfc_examples() {
        // RFC 3501 §5.1.3 and RFC 2152 worked examples.
        assert_eq!(encode_utf7("Entwürfe"), "Entw&APw-rfe");
        assert_eq!(decode_utf7("Entw&APw-rfe").unwrap(), "Entwürfe");
        assert_eq!(encode_utf7("日本語"), "&ZeVnLIqe-");
        assert_eq!(decode_utf7("&ZeVnLIqe-").unwrap(), "日本語");
    }

    #[test]
    fn surrogate_pairs() {
        let name = "mail📬box";
        let encoded = encode_utf7(name);
        assert_eq!(decode_utf7(&encoded).unwrap(), name);
    }

    #[test]
    fn unterminated_shift_is_invalid() {
        assert!(decode_utf7("&APw").is_err());
    }

    #[test]
    fn raw_non_ascii_is_invalid() {
        assert!(decode_utf7("Entwürfe").is_err());
    }

    #[test]
    fn overlong_direct_encoding_is_invalid() {
        // "AEE-" decodes to 'A', which must be sent directly.
        assert!(decode_utf7("&AEE-").is_err());
    }

    #[test]
    fn round_trip_mixed() {
        for name in ["", "a", "Grüße/2024", "&&&", "résumé & notes", "日本語/下書き"] {
            let encoded = encode_utf7(name);
            assert!(encoded.is_ascii());
            assert_eq!(decode_utf7(&encoded).unwrap(), name, "{name}");
        }
    }
}
