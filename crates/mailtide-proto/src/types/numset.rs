//! Message number sets.
//!
//! Sequence numbers and UIDs are 32-bit unsigned values; the value 0 is
//! reserved to encode `*` inside a range, which resolves to the largest
//! number in use at evaluation time. A set containing any `*` endpoint is
//! *dynamic*: its membership depends on the current mailbox size.

use std::fmt;

use crate::error::{DecodeError, DecodeResult};

/// Message sequence number. 0 encodes `*`.
pub type SeqNum = u32;

/// Message unique identifier. 0 encodes `*`.
pub type Uid = u32;

/// Flavour of a number set: message sequence numbers or UIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumKind {
    /// Message sequence numbers.
    #[default]
    Seq,
    /// Unique identifiers.
    Uid,
}

/// An inclusive range of message numbers.
///
/// Orientation is not normalized on input: `4:2` and `2:4` denote the same
/// range. Either endpoint may be 0, encoding `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumRange {
    /// Range start; 0 encodes `*`.
    pub start: u32,
    /// Range stop; 0 encodes `*`.
    pub stop: u32,
}

impl NumRange {
    /// Creates a range between two endpoints.
    #[must_use]
    pub const fn new(start: u32, stop: u32) -> Self {
        Self { start, stop }
    }

    /// Creates a single-number range.
    #[must_use]
    pub const fn single(n: u32) -> Self {
        Self { start: n, stop: n }
    }

    /// Returns `true` if either endpoint is `*`.
    #[must_use]
    pub const fn dynamic(&self) -> bool {
        self.start == 0 || self.stop == 0
    }

    /// Returns `true` if `n` falls inside the range, resolving `*` against
    /// `max`, the largest number currently in use.
    #[must_use]
    pub fn contains(&self, n: u32, max: u32) -> bool {
        let resolve = |v: u32| if v == 0 { max } else { v };
        let (a, b) = (resolve(self.start), resolve(self.stop));
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        n >= lo && n <= hi && n != 0
    }
}

impl fmt::Display for NumRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = |v: u32| -> String {
            if v == 0 {
                "*".to_string()
            } else {
                v.to_string()
            }
        };
        if self.start == self.stop {
            write!(f, "{}", endpoint(self.start))
        } else {
            write!(f, "{}:{}", endpoint(self.start), endpoint(self.stop))
        }
    }
}

/// An ordered sequence of [`NumRange`], flavoured as a sequence set or a
/// UID set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumSet {
    kind: NumKind,
    ranges: Vec<NumRange>,
}

impl NumSet {
    /// Creates a set from ranges.
    #[must_use]
    pub const fn new(kind: NumKind, ranges: Vec<NumRange>) -> Self {
        Self { kind, ranges }
    }

    /// Creates an empty set.
    #[must_use]
    pub const fn empty(kind: NumKind) -> Self {
        Self {
            kind,
            ranges: Vec::new(),
        }
    }

    /// Creates a single-number set.
    #[must_use]
    pub fn single(kind: NumKind, n: u32) -> Self {
        Self::new(kind, vec![NumRange::single(n)])
    }

    /// Creates a set covering one range.
    #[must_use]
    pub fn range(kind: NumKind, start: u32, stop: u32) -> Self {
        Self::new(kind, vec![NumRange::new(start, stop)])
    }

    /// Builds a set from concrete numbers, compressing consecutive runs
    /// into ranges. Input order is preserved run-by-run.
    #[must_use]
    pub fn from_numbers<I>(kind: NumKind, numbers: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut ranges: Vec<NumRange> = Vec::new();
        for n in numbers {
            match ranges.last_mut() {
                Some(last) if last.stop != 0 && last.stop.checked_add(1) == Some(n) => {
                    last.stop = n;
                }
                _ => ranges.push(NumRange::single(n)),
            }
        }
        Self { kind, ranges }
    }

    /// Parses the textual `num | num:num | *` grammar.
    pub fn parse(kind: NumKind, s: &str) -> DecodeResult<Self> {
        let mut dec = crate::decode::Decoder::new(s.as_bytes().to_vec());
        let set = dec.read_sequence_set(kind)?;
        if !dec.is_eof() {
            return Err(DecodeError::InvalidNumSet(dec.position()));
        }
        Ok(set)
    }

    /// The set's flavour.
    #[must_use]
    pub const fn kind(&self) -> NumKind {
        self.kind
    }

    /// The underlying ranges, in input order.
    #[must_use]
    pub fn ranges(&self) -> &[NumRange] {
        &self.ranges
    }

    /// Appends a range.
    pub fn push(&mut self, range: NumRange) {
        self.ranges.push(range);
    }

    /// Returns `true` if the set has no ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `true` if any range contains a `*` endpoint.
    #[must_use]
    pub fn dynamic(&self) -> bool {
        self.ranges.iter().any(NumRange::dynamic)
    }

    /// Membership test, resolving `*` against `max`.
    #[must_use]
    pub fn contains(&self, n: u32, max: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(n, max))
    }

    /// Expands the set into ascending, deduplicated concrete numbers,
    /// resolving `*` against `max`.
    #[must_use]
    pub fn numbers(&self, max: u32) -> Vec<u32> {
        let mut out: Vec<u32> = (1..=max).filter(|&n| self.contains(n, max)).collect();
        // Static ranges may reach beyond the current max.
        for r in &self.ranges {
            if !r.dynamic() {
                let (lo, hi) = if r.start <= r.stop {
                    (r.start, r.stop)
                } else {
                    (r.stop, r.start)
                };
                for n in lo.max(max.saturating_add(1))..=hi {
                    out.push(n);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl fmt::Display for NumSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn range_contains_plain() {
        let r = NumRange::new(2, 4);
        assert!(!r.contains(1, 10));
        assert!(r.contains(2, 10));
        assert!(r.contains(3, 10));
        assert!(r.contains(4, 10));
        assert!(!r.contains(5, 10));
    }

    #[test]
    fn range_orientation_insensitive() {
        let a = NumRange::new(4, 2);
        let b = NumRange::new(2, 4);
        for n in 1..=6 {
            assert_eq!(a.contains(n, 10), b.contains(n, 10));
        }
    }

    #[test]
    fn range_star_resolves_to_max() {
        let r = NumRange::new(3, 0);
        assert!(r.contains(3, 7));
        assert!(r.contains(7, 7));
        assert!(!r.contains(8, 7));
        // 4:* with max 2 still covers 2..4 (order-insensitive resolution).
        let r = NumRange::new(4, 0);
        assert!(r.contains(3, 2));
        assert!(r.contains(2, 2));
        assert!(!r.contains(1, 2));
    }

    #[test]
    fn range_display() {
        assert_eq!(NumRange::single(9).to_string(), "9");
        assert_eq!(NumRange::new(1, 5).to_string(), "1:5");
        assert_eq!(NumRange::new(3, 0).to_string(), "3:*");
        assert_eq!(NumRange::single(0).to_string(), "*");
    }

    #[test]
    fn set_parse_round_trip() {
        for text in ["1", "1:5", "1:5,9", "3:*", "*", "1,2:4,8:*"] {
            let set = NumSet::parse(NumKind::Seq, text).unwrap();
            assert_eq!(set.to_string(), text);
        }
    }

    #[test]
    fn set_parse_rejects_trailing_garbage() {
        assert!(NumSet::parse(NumKind::Seq, "1:5 x").is_err());
        assert!(NumSet::parse(NumKind::Seq, "").is_err());
    }

    #[test]
    fn set_dynamic() {
        assert!(NumSet::parse(NumKind::Seq, "1:*").unwrap().dynamic());
        assert!(!NumSet::parse(NumKind::Seq, "1:5").unwrap().dynamic());
    }

    #[test]
    fn set_numbers_expansion() {
        let set = NumSet::parse(NumKind::Seq, "1:3,7").unwrap();
        assert_eq!(set.numbers(10), vec![1, 2, 3, 7]);
        // Static range beyond max is preserved.
        assert_eq!(set.numbers(2), vec![1, 2, 3, 7]);
    }

    #[test]
    fn set_from_numbers_compresses_runs() {
        let set = NumSet::from_numbers(NumKind::Uid, [1, 2, 3, 7, 9, 10]);
        assert_eq!(set.to_string(), "1:3,7,9:10");
    }

    #[test]
    fn empty_mailbox_star() {
        let set = NumSet::parse(NumKind::Seq, "*").unwrap();
        assert!(!set.contains(1, 0));
    }
}
