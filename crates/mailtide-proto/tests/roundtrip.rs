//! Round-trip properties for the wire codec.
//!
//! For every lossless value type, `decode(encode(x)) == x`.

use proptest::prelude::*;

use mailtide_proto::types::numset::{NumKind, NumRange, NumSet};
use mailtide_proto::utf7::{decode_utf7, encode_utf7};
use mailtide_proto::{Decoder, Encoder, Flag, Flags};

proptest! {
    #[test]
    fn string_round_trips(s in "\\PC*") {
        let mut enc = Encoder::new();
        enc.string(&s);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        prop_assert_eq!(dec.read_string().unwrap(), s);
    }

    #[test]
    fn astring_round_trips(s in "\\PC*") {
        let mut enc = Encoder::new();
        enc.astring(&s);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        prop_assert_eq!(dec.read_astring().unwrap(), s);
    }

    #[test]
    fn quoted_string_round_trips(s in "[ -~]*") {
        let mut enc = Encoder::new();
        enc.quoted_string(&s);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        prop_assert_eq!(dec.read_quoted_string().unwrap(), s);
    }

    #[test]
    fn literal_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut enc = Encoder::new();
        enc.literal(&bytes);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        let info = dec.read_literal_info().unwrap();
        prop_assert_eq!(info.size as usize, bytes.len());
        prop_assert_eq!(dec.read_literal_bytes(info).unwrap(), bytes);
    }

    #[test]
    fn utf7_round_trips(name in "\\PC*") {
        let encoded = encode_utf7(&name);
        prop_assert!(encoded.is_ascii());
        prop_assert_eq!(decode_utf7(&encoded).unwrap(), name);
    }

    #[test]
    fn numset_display_parse_round_trips(
        ranges in proptest::collection::vec((0u32..50, 0u32..50), 1..6)
    ) {
        let set = NumSet::new(
            NumKind::Seq,
            ranges.iter().map(|&(a, b)| NumRange::new(a, b)).collect(),
        );
        let parsed = NumSet::parse(NumKind::Seq, &set.to_string()).unwrap();
        prop_assert_eq!(parsed, set);
    }

    #[test]
    fn numset_membership_matches_semantics(
        start in 0u32..30,
        stop in 0u32..30,
        n in 1u32..40,
        max in 0u32..30,
    ) {
        let range = NumRange::new(start, stop);
        let resolve = |v: u32| if v == 0 { max } else { v };
        let (lo, hi) = {
            let (a, b) = (resolve(start), resolve(stop));
            if a <= b { (a, b) } else { (b, a) }
        };
        prop_assert_eq!(range.contains(n, max), n >= lo && n <= hi);
    }

    #[test]
    fn flag_list_round_trips(keywords in proptest::collection::vec("[A-Za-z$][A-Za-z0-9$]{0,8}", 0..5)) {
        let mut flags = Flags::from_vec(vec![Flag::Seen, Flag::Answered]);
        for keyword in keywords {
            flags.insert(Flag::Keyword(keyword));
        }
        let mut enc = Encoder::new();
        enc.flags(&flags);
        let mut dec = Decoder::new(enc.into_bytes().to_vec());
        let parsed = dec.read_flags().unwrap();
        prop_assert_eq!(parsed, flags);
    }
}

#[test]
fn date_time_round_trips() {
    for raw in [
        "17-Jul-1996 02:44:25 -0700",
        " 1-Jan-2024 00:00:00 +0000",
        "31-Dec-1999 23:59:59 +1345",
    ] {
        let dt = mailtide_proto::datetime::parse_date_time(raw).unwrap();
        let rendered = mailtide_proto::datetime::format_date_time(&dt);
        assert_eq!(
            mailtide_proto::datetime::parse_date_time(&rendered).unwrap(),
            dt
        );
    }
}
