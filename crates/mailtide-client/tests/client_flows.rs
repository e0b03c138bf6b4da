//! Client behavior against a scripted peer.
//!
//! The "server" here is the test itself, driving the other half of a
//! duplex pipe byte-by-byte, so response routing, pipelining, and
//! disconnect propagation are observable precisely.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use mailtide_client::{Client, ClientError, PlainMechanism};
use mailtide_proto::{Capability, FetchAttr, NumKind, NumSet};

struct Script {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Script {
    fn new(io: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("script write");
    }

    async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.expect("script read");
        assert!(n > 0, "client closed the stream");
        line
    }

    async fn expect_recv(&mut self, exact: &str) {
        assert_eq!(self.recv_line().await, exact);
    }
}

async fn connect() -> (Client, Script) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut script = Script::new(server_io);
    script
        .send(b"* OK [CAPABILITY IMAP4rev1 IMAP4rev2 IDLE LITERAL+] ready\r\n")
        .await;
    let client = Client::new(client_io).await.expect("greeting accepted");
    (client, script)
}

#[tokio::test]
async fn greeting_capabilities_recorded() {
    let (client, _script) = connect().await;
    assert!(client.has_capability(&Capability::Imap4Rev1));
    assert!(client.has_capability(&Capability::LiteralPlus));
    assert!(!client.is_pre_authenticated());
}

#[tokio::test]
async fn bye_greeting_is_rejected() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    let mut script = Script::new(server_io);
    script.send(b"* BYE server shutting down\r\n").await;
    let err = Client::new(client_io).await.expect_err("BYE greeting");
    assert!(matches!(err, ClientError::Bye(_)));
}

#[tokio::test]
async fn login_round_trip() {
    let (client, mut script) = connect().await;
    let login = tokio::spawn(async move { client.login("user", "pass").await });

    script.expect_recv("A001 LOGIN user pass\r\n").await;
    script.send(b"A001 OK LOGIN completed\r\n").await;
    login.await.expect("join").expect("login ok");
}

#[tokio::test]
async fn login_failure_is_status_error() {
    let (client, mut script) = connect().await;
    let login = tokio::spawn(async move { client.login("user", "nope").await });

    script.expect_recv("A001 LOGIN user nope\r\n").await;
    script.send(b"A001 NO [AUTHENTICATIONFAILED] bad credentials\r\n").await;
    let err = login.await.expect("join").expect_err("login fails");
    assert!(matches!(err, ClientError::Status(_)), "{err:?}");
}

#[tokio::test]
async fn select_summary_collects_untagged_data() {
    let (client, mut script) = connect().await;
    let select = tokio::spawn(async move { client.select("INBOX").await });

    script.expect_recv("A001 SELECT INBOX\r\n").await;
    script.send(b"* FLAGS (\\Seen \\Deleted)\r\n").await;
    script.send(b"* 172 EXISTS\r\n").await;
    script.send(b"* 1 RECENT\r\n").await;
    script.send(b"* OK [UNSEEN 12] first unseen\r\n").await;
    script.send(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n").await;
    script.send(b"* OK [UIDNEXT 4392] predicted next UID\r\n").await;
    script.send(b"A001 OK [READ-WRITE] SELECT completed\r\n").await;

    let summary = select.await.expect("join").expect("select ok");
    assert_eq!(summary.exists, 172);
    assert_eq!(summary.recent, 1);
    assert_eq!(summary.unseen, Some(12));
    assert_eq!(summary.uid_validity, Some(3_857_529_045));
    assert_eq!(summary.uid_next, Some(4392));
    assert!(!summary.read_only);
}

#[tokio::test]
async fn uid_fetch_envelope_parses_back() {
    let (client, mut script) = connect().await;
    let fetch = tokio::spawn(async move {
        client
            .fetch(
                NumKind::Uid,
                &NumSet::single(NumKind::Uid, 1),
                &[FetchAttr::Envelope],
            )
            .await
    });

    script.expect_recv("A001 UID FETCH 1 ENVELOPE\r\n").await;
    script
        .send(b"* 1 FETCH (UID 1 ENVELOPE (NIL \"Test\" ((NIL NIL \"alice\" \"example.com\")) NIL NIL NIL NIL NIL NIL NIL))\r\n")
        .await;
    script.send(b"A001 OK FETCH completed\r\n").await;

    let fetched = fetch.await.expect("join").expect("fetch ok");
    assert_eq!(fetched.len(), 1);
    let envelope = fetched[0].envelope.as_ref().expect("envelope");
    assert_eq!(envelope.subject.as_deref(), Some("Test"));
    assert_eq!(
        envelope.from[0].addr_spec().as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(fetched[0].uid, Some(1));
}

#[tokio::test]
async fn fetch_with_body_literal() {
    let (client, mut script) = connect().await;
    let fetch = tokio::spawn(async move {
        client
            .fetch(
                NumKind::Seq,
                &NumSet::single(NumKind::Seq, 1),
                &[FetchAttr::BodySection {
                    section: String::new(),
                    peek: true,
                    partial: None,
                }],
            )
            .await
    });

    script.expect_recv("A001 FETCH 1 BODY.PEEK[]\r\n").await;
    script.send(b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n").await;
    script.send(b"A001 OK FETCH completed\r\n").await;

    let fetched = fetch.await.expect("join").expect("fetch ok");
    assert_eq!(
        fetched[0].body_sections[0].data.as_deref(),
        Some(&b"hello"[..])
    );
}

#[tokio::test]
async fn pipelined_commands_resolve_in_order() {
    let (client, mut script) = connect().await;

    let h1 = client.submit("NOOP", |_| {}).await.expect("submit 1");
    let h2 = client.submit("NOOP", |_| {}).await.expect("submit 2");
    assert_eq!(client.in_flight(), 2);

    script.expect_recv("A001 NOOP\r\n").await;
    script.expect_recv("A002 NOOP\r\n").await;
    script.send(b"A001 OK done\r\n").await;
    script.send(b"A002 OK done\r\n").await;

    let c1 = h1.wait().await.expect("first completes");
    let c2 = h2.wait().await.expect("second completes");
    assert_eq!(c1.tag, "A001");
    assert_eq!(c2.tag, "A002");
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn disconnect_fails_all_pipelined_commands() {
    let (client, mut script) = connect().await;

    let h1 = client
        .fetch_handle(
            NumKind::Seq,
            &NumSet::single(NumKind::Seq, 1),
            &[FetchAttr::Flags],
        )
        .await
        .expect("fetch 1");
    let h2 = client
        .fetch_handle(
            NumKind::Seq,
            &NumSet::single(NumKind::Seq, 2),
            &[FetchAttr::Flags],
        )
        .await
        .expect("fetch 2");

    script.expect_recv("A001 FETCH 1 FLAGS\r\n").await;
    script.expect_recv("A002 FETCH 2 FLAGS\r\n").await;
    // Close the socket mid-response.
    script.send(b"* 1 FETCH (FLAGS (\\See").await;
    drop(script);

    let e1 = h1.wait().await.expect_err("first fails");
    let e2 = h2.wait().await.expect_err("second fails");
    let (ClientError::Disconnected(c1), ClientError::Disconnected(c2)) = (&e1, &e2) else {
        panic!("expected disconnect errors, got {e1:?} / {e2:?}");
    };
    // Both observe the same stored cause.
    assert_eq!(c1, c2);

    // done() fires (exactly once, observable repeatedly).
    client.done().await;
    client.done().await;
    assert!(client.disconnect_err().is_some());

    // New commands fail fast with the sticky cause.
    let err = client.noop().await.expect_err("sticky disconnect");
    assert!(matches!(err, ClientError::Disconnected(_)));
}

#[tokio::test]
async fn continuation_feeds_append() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut script = Script::new(server_io);
    // No LITERAL+ here, forcing the synchronizing flow.
    script.send(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").await;
    let client = Client::new(client_io).await.expect("greeting");

    let flags = mailtide_proto::Flags::new();
    let append = tokio::spawn(async move {
        client
            .append("INBOX", &flags, None, b"hello world")
            .await
    });

    script.expect_recv("A001 APPEND INBOX {11}\r\n").await;
    script.send(b"+ Ready for literal data\r\n").await;
    script.expect_recv("hello world\r\n").await;
    script.send(b"A001 OK [APPENDUID 42 7] APPEND completed\r\n").await;

    let appended = append.await.expect("join").expect("append ok");
    let uid = appended.expect("appenduid present");
    assert_eq!(uid.uid_validity, 42);
    assert_eq!(uid.uid, 7);
}

#[tokio::test]
async fn append_uses_non_sync_literal_with_literal_plus() {
    let (client, mut script) = connect().await;
    let flags = mailtide_proto::Flags::new();
    let append = tokio::spawn(async move {
        client.append("INBOX", &flags, None, b"hi").await
    });

    script.expect_recv("A001 APPEND INBOX {2+}\r\n").await;
    script.expect_recv("hi\r\n").await;
    script.send(b"A001 OK APPEND completed\r\n").await;
    let appended = append.await.expect("join").expect("append ok");
    assert!(appended.is_none());
}

#[tokio::test]
async fn authenticate_plain_initial_response() {
    let (client, mut script) = connect().await;
    let auth = tokio::spawn(async move {
        let mut mech = PlainMechanism::new("user", "pass");
        client.authenticate(&mut mech).await
    });

    script
        .expect_recv("A001 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n")
        .await;
    script.send(b"A001 OK AUTHENTICATE completed\r\n").await;
    auth.await.expect("join").expect("auth ok");
}

#[tokio::test]
async fn idle_handle_done() {
    let (client, mut script) = connect().await;
    let mut unsolicited = client.unsolicited().expect("stream");

    let idle_client = client.clone();
    let idle = tokio::spawn(async move { idle_client.idle().await });

    script.expect_recv("A001 IDLE\r\n").await;
    script.send(b"+ idling\r\n").await;
    let handle = idle.await.expect("join").expect("idle granted");

    // Session-level updates arrive while idling.
    script.send(b"* 4 EXISTS\r\n").await;
    let update = unsolicited.recv().await.expect("update");
    assert_eq!(
        update,
        mailtide_client::UntaggedResponse::Exists(4)
    );

    let done = tokio::spawn(async move { handle.done().await });
    script.expect_recv("DONE\r\n").await;
    script.send(b"A001 OK IDLE completed\r\n").await;
    done.await.expect("join").expect("done ok");
}

#[tokio::test]
async fn unsolicited_expunge_routes_to_stream() {
    let (client, mut script) = connect().await;
    let mut unsolicited = client.unsolicited().expect("stream");
    script.send(b"* 7 EXPUNGE\r\n").await;
    let update = unsolicited.recv().await.expect("update");
    assert_eq!(update, mailtide_client::UntaggedResponse::Expunge(7));
    drop(client);
}
