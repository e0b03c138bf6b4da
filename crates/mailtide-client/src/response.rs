//! Untagged response parsing.

use mailtide_proto::{
    Capability, DecodeResult, Decoder, FetchData, Flags, ListData, Mailbox, MailboxAttr,
    StatusData, StatusKind, StatusResponse,
};

/// One untagged (`*`) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK/NO/BAD/BYE/PREAUTH …`
    Status(StatusResponse),
    /// `* CAPABILITY …`
    Capability(Vec<Capability>),
    /// `* ENABLED …`
    Enabled(Vec<Capability>),
    /// `* <n> EXISTS`
    Exists(u32),
    /// `* <n> RECENT`
    Recent(u32),
    /// `* <n> EXPUNGE`
    Expunge(u32),
    /// `* <n> FETCH (…)`
    Fetch(FetchData),
    /// `* LIST (…) … …`
    List(ListData),
    /// `* STATUS <mailbox> (…)`
    MailboxStatus(StatusData),
    /// `* SEARCH <n>…`
    Search(Vec<u32>),
    /// `* FLAGS (…)`
    Flags(Flags),
    /// Anything else, kept verbatim.
    Unknown(String),
}

/// Decodes an untagged response; the decoder is positioned after `* `.
pub fn decode_untagged(dec: &mut Decoder, utf8_accepted: bool) -> DecodeResult<UntaggedResponse> {
    if dec.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
        let n = dec.read_number()?;
        dec.read_sp()?;
        let keyword = dec.read_atom()?.to_ascii_uppercase();
        return Ok(match keyword.as_str() {
            "EXISTS" => UntaggedResponse::Exists(n),
            "RECENT" => UntaggedResponse::Recent(n),
            "EXPUNGE" => UntaggedResponse::Expunge(n),
            "FETCH" => {
                dec.read_sp()?;
                UntaggedResponse::Fetch(FetchData::decode_items(n, dec)?)
            }
            _ => UntaggedResponse::Unknown(format!("{n} {keyword}")),
        });
    }

    let start = dec.position();
    let keyword = dec.read_atom()?.to_ascii_uppercase();
    if StatusKind::parse(&keyword).is_some() {
        dec.set_position(start);
        return Ok(UntaggedResponse::Status(StatusResponse::decode(dec)?));
    }
    match keyword.as_str() {
        "CAPABILITY" => {
            let mut caps = Vec::new();
            while dec.maybe_sp() {
                caps.push(Capability::parse(&dec.read_atom()?));
            }
            Ok(UntaggedResponse::Capability(caps))
        }
        "ENABLED" => {
            let mut caps = Vec::new();
            while dec.maybe_sp() {
                caps.push(Capability::parse(&dec.read_atom()?));
            }
            Ok(UntaggedResponse::Enabled(caps))
        }
        "FLAGS" => {
            dec.read_sp()?;
            Ok(UntaggedResponse::Flags(dec.read_flags()?))
        }
        "SEARCH" => {
            let mut numbers = Vec::new();
            while dec.maybe_sp() {
                numbers.push(dec.read_number()?);
            }
            Ok(UntaggedResponse::Search(numbers))
        }
        "LIST" => Ok(UntaggedResponse::List(decode_list(dec, utf8_accepted)?)),
        "STATUS" => {
            dec.read_sp()?;
            let wire = dec.read_astring()?;
            let mailbox = Mailbox::from_wire(&wire, utf8_accepted)?;
            dec.read_sp()?;
            let mut data = StatusData::decode_items(dec)?;
            data.mailbox = Some(mailbox);
            Ok(UntaggedResponse::MailboxStatus(data))
        }
        other => {
            dec.discard_line();
            Ok(UntaggedResponse::Unknown(other.to_string()))
        }
    }
}

fn decode_list(dec: &mut Decoder, utf8_accepted: bool) -> DecodeResult<ListData> {
    dec.read_sp()?;
    let mut attrs = Vec::new();
    dec.read_list(|d| {
        d.expect_byte(b'\\')?;
        attrs.push(MailboxAttr::parse(&d.read_atom()?));
        Ok(())
    })?;
    dec.read_sp()?;
    let delim = dec
        .read_nstring()?
        .and_then(|s| s.chars().next());
    dec.read_sp()?;
    let wire = dec.read_astring()?;
    let mailbox = Mailbox::from_wire(&wire, utf8_accepted)?;
    let mut data = ListData::new(mailbox, delim);
    data.attrs = attrs;

    // LIST-EXTENDED items: ("OLDNAME" (<name>)) ("CHILDINFO" ("SUBSCRIBED"))
    if dec.maybe_sp() && dec.peek_byte() == Some(b'(') {
        dec.read_list(|d| {
            let item = d.read_string()?.to_ascii_uppercase();
            d.read_sp()?;
            match item.as_str() {
                "OLDNAME" => {
                    d.expect_byte(b'(')?;
                    let wire = d.read_astring()?;
                    data.old_name = Some(Mailbox::from_wire(&wire, utf8_accepted)?);
                    d.expect_byte(b')')?;
                }
                "CHILDINFO" => {
                    d.read_list(|dd| {
                        data.child_info.push(dd.read_string()?);
                        Ok(())
                    })?;
                }
                _ => {
                    // Unknown extended item: skip its parenthesized value.
                    d.read_list(|dd| {
                        let _ = dd.read_string()?;
                        Ok(())
                    })?;
                }
            }
            Ok(())
        })?;
    }
    Ok(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(line: &[u8]) -> UntaggedResponse {
        let mut dec = Decoder::new(line.to_vec());
        dec.expect_byte(b'*').unwrap();
        dec.read_sp().unwrap();
        decode_untagged(&mut dec, false).unwrap()
    }

    #[test]
    fn numbered_responses() {
        assert_eq!(decode(b"* 23 EXISTS\r\n"), UntaggedResponse::Exists(23));
        assert_eq!(decode(b"* 5 RECENT\r\n"), UntaggedResponse::Recent(5));
        assert_eq!(decode(b"* 44 EXPUNGE\r\n"), UntaggedResponse::Expunge(44));
    }

    #[test]
    fn fetch_response() {
        match decode(b"* 12 FETCH (FLAGS (\\Seen) UID 100)\r\n") {
            UntaggedResponse::Fetch(data) => {
                assert_eq!(data.seq, 12);
                assert_eq!(data.uid, Some(100));
            }
            other => panic!("expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn capability_response() {
        match decode(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\n") {
            UntaggedResponse::Capability(caps) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Idle));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
            }
            other => panic!("expected CAPABILITY, got {other:?}"),
        }
    }

    #[test]
    fn status_line() {
        match decode(b"* OK [UIDVALIDITY 42] ready\r\n") {
            UntaggedResponse::Status(status) => {
                assert_eq!(status.kind, StatusKind::Ok);
                assert!(status.code.is_some());
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn list_response() {
        match decode(b"* LIST (\\HasNoChildren \\Trash) \"/\" Trash\r\n") {
            UntaggedResponse::List(data) => {
                assert_eq!(data.delim, Some('/'));
                assert_eq!(data.mailbox.as_str(), "Trash");
                assert!(data.attrs.contains(&MailboxAttr::Trash));
            }
            other => panic!("expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn list_response_nil_delim() {
        match decode(b"* LIST () NIL INBOX\r\n") {
            UntaggedResponse::List(data) => {
                assert_eq!(data.delim, None);
                assert!(data.mailbox.is_inbox());
            }
            other => panic!("expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn list_extended_oldname() {
        match decode(b"* LIST () \"/\" NewName (\"OLDNAME\" (OldName))\r\n") {
            UntaggedResponse::List(data) => {
                assert_eq!(data.old_name.as_ref().unwrap().as_str(), "OldName");
            }
            other => panic!("expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn status_response() {
        match decode(b"* STATUS INBOX (MESSAGES 231 UNSEEN 5)\r\n") {
            UntaggedResponse::MailboxStatus(data) => {
                assert!(data.mailbox.as_ref().unwrap().is_inbox());
                assert_eq!(data.messages, Some(231));
                assert_eq!(data.unseen, Some(5));
            }
            other => panic!("expected STATUS, got {other:?}"),
        }
    }

    #[test]
    fn search_response() {
        assert_eq!(
            decode(b"* SEARCH 2 84 882\r\n"),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(decode(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));
    }

    #[test]
    fn mailbox_utf7_decoded() {
        match decode(b"* LIST () \"/\" Entw&APw-rfe\r\n") {
            UntaggedResponse::List(data) => {
                assert_eq!(data.mailbox.as_str(), "Entwürfe");
            }
            other => panic!("expected LIST, got {other:?}"),
        }
    }
}
