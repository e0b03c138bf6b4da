//! Decode errors for the wire codec.

use thiserror::Error;

use crate::decode::LiteralInfo;

/// Errors produced by the wire decoder.
///
/// Every variant names the expectation that failed, so the dispatch layer
/// can surface a precise `BAD` text to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before the expected token.
    #[error("unexpected end of input at position {0}")]
    UnexpectedEof(usize),

    /// A specific byte or token class was expected.
    #[error("expected {expected} at position {position}")]
    Expected {
        /// Byte position where the mismatch occurred.
        position: usize,
        /// Human-readable name of the expected token.
        expected: &'static str,
    },

    /// A decimal number failed to parse or overflowed.
    #[error("invalid number at position {0}")]
    InvalidNumber(usize),

    /// Bytes were not valid UTF-8 where text was required.
    #[error("invalid UTF-8 at position {0}")]
    InvalidUtf8(usize),

    /// A quoted string contained an escape other than `\\` or `\"`.
    #[error("invalid escape in quoted string at position {0}")]
    InvalidEscape(usize),

    /// A synchronizing literal was announced but its body is not buffered.
    ///
    /// The receiving side must emit a continuation request, splice the
    /// literal body (and the following line) into the decoder, and retry.
    #[error("literal body of {} bytes pending continuation", .0.size)]
    LiteralPending(LiteralInfo),

    /// A literal exceeded the configured acceptance limit.
    #[error("literal of {size} bytes exceeds the {limit} byte limit")]
    LiteralTooLarge {
        /// Declared literal size.
        size: u32,
        /// Configured maximum.
        limit: u32,
    },

    /// A number set did not follow the `num | num:num | *` grammar.
    #[error("invalid sequence set at position {0}")]
    InvalidNumSet(usize),

    /// A mailbox name was not valid modified UTF-7.
    #[error("invalid modified UTF-7 mailbox name")]
    InvalidUtf7,

    /// A date-time did not follow the internal-date grammar.
    #[error("invalid date-time at position {0}")]
    InvalidDateTime(usize),
}

/// Result alias for decoder operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
