//! Integration tests for the response interpreter.
//!
//! These tests replay server transcripts, either through a mock stream and
//! the async framing layer or straight from memory, without requiring a
//! real server connection.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailwire_imap::source::{BufferedLines, ReaderLines};
use mailwire_imap::{
    BodyPart, BodyPartKind, BodyStructureCache, Capabilities, CollectingHandler, CommandContext,
    Completion, ConnectionState, FramedStream, MailboxObserver, MessageFlags, NoopHandler,
    ObservedEvent, ParserConfig, ResponseAccumulator, ResponseParser, SeqNum, ShellKey, Uid,
    UidValidity,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mailwire_imap=trace")
        .with_test_writer()
        .try_init();
}

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Vec<u8>,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Vec::new(),
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        // Short reads, so lines and literals straddle buffer refills.
        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining()).min(7);
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Minimal session: sends a command, reads its response, parses it.
struct Session {
    framed: FramedStream<MockStream>,
    parser: ResponseParser,
    observer: CollectingHandler,
    sink: CollectingHandler,
}

impl Session {
    fn new(script: &[u8]) -> Self {
        Self {
            framed: FramedStream::new(MockStream::new(script)),
            parser: ResponseParser::new(ParserConfig::new("imap.example.com")),
            observer: CollectingHandler::new(),
            sink: CollectingHandler::new(),
        }
    }

    async fn greeting(&mut self) {
        let line = self.framed.read_response().await.unwrap();
        let mut lines = BufferedLines::from(&line[..]);
        self.parser
            .parse_greeting(&mut lines, &mut self.observer)
            .unwrap();
    }

    async fn run(&mut self, command: &str) -> mailwire_imap::ResponseSummary {
        let cmd = CommandContext::parse(command).unwrap();
        self.framed
            .write_command(format!("{command}\r\n").as_bytes())
            .await
            .unwrap();
        let mut lines = ResponseAccumulator::new(cmd.tag.as_str())
            .read_until_tagged(&mut self.framed)
            .await
            .unwrap();
        self.parser
            .parse_response(&cmd, &mut lines, &mut self.observer, &mut self.sink)
            .unwrap()
    }

    async fn idle_update(&mut self) -> mailwire_imap::ResponseSummary {
        let line = self.framed.read_response().await.unwrap();
        let mut lines = BufferedLines::from(&line[..]);
        self.parser
            .parse_idle_update(&mut lines, &mut self.observer, &mut self.sink)
            .unwrap()
    }
}

#[tokio::test]
async fn test_full_session() {
    init_tracing();
    let script = b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n\
                   a1 OK LOGIN completed\r\n\
                   * 2 EXISTS\r\n\
                   * 0 RECENT\r\n\
                   * OK [UIDVALIDITY 7] UIDs valid\r\n\
                   * OK [UIDNEXT 12] Predicted next UID\r\n\
                   * FLAGS (\\Seen \\Deleted)\r\n\
                   a2 OK [READ-WRITE] SELECT completed\r\n\
                   * 1 FETCH (UID 10 FLAGS (\\Seen))\r\n\
                   * 2 FETCH (FLAGS () UID 11)\r\n\
                   a3 OK FETCH completed\r\n\
                   * 2 FETCH (UID 11 BODY[] {7}\r\nHello\r\n)\r\n\
                   a4 OK FETCH completed\r\n\
                   + idling\r\n\
                   * 3 EXISTS\r\n\
                   a5 OK IDLE terminated\r\n\
                   * BYE logging out\r\n\
                   a6 OK LOGOUT completed\r\n";
    let mut session = Session::new(script);

    session.greeting().await;
    assert!(session.parser.tracker().has_capability(Capabilities::IDLE));

    assert!(session.run("a1 LOGIN user secret").await.succeeded());
    assert_eq!(session.parser.tracker().state(), ConnectionState::Authenticated);

    assert!(session.run("a2 SELECT INBOX").await.succeeded());
    let tracker = session.parser.tracker();
    assert_eq!(tracker.state(), ConnectionState::MailboxSelected);
    assert_eq!(tracker.selected_mailbox(), Some("INBOX"));
    assert_eq!(tracker.mailbox().unwrap().exists, 2);
    assert_eq!(tracker.mailbox().unwrap().uid_validity, UidValidity::new(7));

    session.run("a3 UID FETCH 1:* (UID FLAGS)").await;
    let records = session.observer.fetched();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].flags, Some(MessageFlags::SEEN));
    assert_eq!(records[1].flags, Some(MessageFlags::empty()));
    let flags = session.parser.flag_state();
    assert_eq!(flags.uid_of(SeqNum::new(2).unwrap()), Uid::new(11));
    assert_eq!(flags.highest_uid(), Uid::new(11));

    session.run("a4 UID FETCH 11 BODY.PEEK[]").await;
    assert_eq!(session.sink.finished, vec![b"Hello\r\n".to_vec()]);

    let summary = session.run("a5 IDLE").await;
    assert!(matches!(summary.completion, Completion::ContinuationRequested { .. }));
    let update = session.idle_update().await;
    assert_eq!(update.completion, Completion::IdleUpdate);
    assert_eq!(session.parser.tracker().mailbox().unwrap().exists, 3);
    session.parser.end_idle();
    let cmd = CommandContext::parse("a5 IDLE").unwrap();
    let mut lines = ResponseAccumulator::new("a5")
        .read_until_tagged(&mut session.framed)
        .await
        .unwrap();
    let done = session
        .parser
        .parse_response(&cmd, &mut lines, &mut session.observer, &mut session.sink)
        .unwrap();
    assert_eq!(done.completion, Completion::Tagged);

    let summary = session.run("a6 LOGOUT").await;
    assert_eq!(summary.completion, Completion::LoggedOut);
    assert_eq!(session.parser.tracker().state(), ConnectionState::NonAuthenticated);
    assert!(
        session
            .observer
            .events
            .contains(&ObservedEvent::Bye("logging out".to_string()))
    );
    assert!(session.framed.get_ref().sent.starts_with(b"a1 LOGIN user secret\r\n"));
}

/// Observer that caches every body structure it is told about.
struct CachingObserver {
    cache: BodyStructureCache,
    uid_validity: UidValidity,
}

impl MailboxObserver for CachingObserver {
    fn on_body_structure(&mut self, _seq: SeqNum, uid: Option<Uid>, body: &BodyPart) {
        if let Some(uid) = uid {
            let key = ShellKey::new("imap.example.com", self.uid_validity, uid);
            self.cache.insert(key, body.clone());
        }
    }
}

#[test]
fn test_multipart_structure_cached() {
    init_tracing();
    let mut parser = ResponseParser::new(ParserConfig::new("imap.example.com"));
    let mut observer = CachingObserver {
        cache: BodyStructureCache::new(16),
        uid_validity: UidValidity::new(7).unwrap(),
    };
    let cmd = CommandContext::parse("a1 UID FETCH 5:6 BODYSTRUCTURE").unwrap();
    let mut lines = BufferedLines::from(
        "* 1 FETCH (UID 5 BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 1152 23)\
         (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\" \"NAME\" \"cc.diff\") \"<960723163407.20117h@cac.washington.edu>\" \
         \"Compiler diff\" \"BASE64\" 4554 73) \"MIXED\"))\r\n\
         * 2 FETCH (UID 6 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" ((\"broken\"))))\r\n\
         a1 OK FETCH completed\r\n",
    );

    let summary = parser
        .parse_response(&cmd, &mut lines, &mut observer, &mut NoopHandler)
        .unwrap();
    assert_eq!(summary.syntax_errors, 1);
    assert_eq!(observer.cache.len(), 1);

    let key = ShellKey::new("imap.example.com", UidValidity::new(7).unwrap(), Uid::new(5).unwrap());
    let body = observer.cache.get(&key).unwrap();
    assert!(body.is_multipart());
    match &body.find("2").unwrap().kind {
        BodyPartKind::Leaf(leaf) => {
            assert_eq!(leaf.description.as_deref(), Some("Compiler diff"));
            assert_eq!(leaf.octet_size, 4554);
        }
        other => panic!("expected leaf, got {other:?}"),
    }
}

#[test]
fn test_garbage_between_valid_lines() {
    init_tracing();
    let mut parser = ResponseParser::new(ParserConfig::new("imap.example.com"));
    let mut observer = CollectingHandler::new();
    let cmd = CommandContext::parse("a1 NOOP").unwrap();
    let mut lines = BufferedLines::from(
        "* 0 EXISTS\r\n\
         * FETCH\r\n\
         )))\r\n\
         * 4 EXISTS\r\n\
         * OK [UNKNOWN-CODE 1 2 3] fine\r\n\
         a1 OK NOOP completed\r\n",
    );
    let summary = parser
        .parse_response(&cmd, &mut lines, &mut observer, &mut NoopHandler)
        .unwrap();
    assert!(summary.succeeded());
    assert_eq!(summary.syntax_errors, 2);
    assert!(observer.events.contains(&ObservedEvent::Exists(4)));
}

#[test]
fn test_reader_lines_source() {
    let data = b"* PREAUTH IMAP4rev1 ready\r\n".to_vec();
    let mut source = ReaderLines::new(io::BufReader::new(Cursor::new(data)));
    let mut parser = ResponseParser::new(ParserConfig::new("imap.example.com"));
    let greeting = parser.parse_greeting(&mut source, &mut NoopHandler).unwrap();
    assert_eq!(greeting.text, "IMAP4rev1 ready");
    assert_eq!(parser.tracker().state(), ConnectionState::Authenticated);
}
