//! FETCH response parsing.
//!
//! One `* n FETCH (...)` line is read attribute by attribute. FLAGS, UID,
//! RFC822.SIZE and MODSEQ go to the flag table; message bodies are streamed
//! to the sink as their literal arrives; structures and envelopes are held
//! back until the line ends, so they can be reported together with a UID
//! that may appear after them.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::parser::bodystructure::BodyPart;
use crate::parser::cursor::TokenCursor;
use crate::parser::lexer::Token;
use crate::parser::literal::LiteralTransfer;
use crate::types::{Address, Envelope, MessageFlags, SeqNum, Uid};

use super::helpers::parse_flag_list;
use super::{DownloadState, Exchange, ResponseParser};

/// Values reported once the FETCH line is complete.
#[derive(Debug, Default)]
struct Deferred {
    body: Option<BodyPart>,
    envelope: Option<Envelope>,
    custom: Vec<(String, String)>,
    zero_length: bool,
}

impl ResponseParser {
    /// Parses the parenthesized attribute list of `* seq FETCH`.
    pub(super) fn msg_fetch(&mut self, ex: &mut Exchange<'_>, seq: SeqNum) -> Result<()> {
        ex.cursor.expect(&Token::LParen)?;
        self.flags.begin_line(seq, ex.cmd.fetch);

        let mut deferred = Deferred::default();
        loop {
            let name = match ex.cursor.advance()? {
                Token::RParen => break,
                Token::Atom(name) => name,
                Token::Eol => return Err(ex.cursor.syntax("unterminated FETCH attribute list")),
                token => return Err(ex.cursor.syntax(format!("unexpected {token} in FETCH"))),
            };
            self.fetch_attribute(ex, &name, &mut deferred)?;
        }

        self.publish_fetch(ex, seq, deferred);
        Ok(())
    }

    fn fetch_attribute(
        &mut self,
        ex: &mut Exchange<'_>,
        name: &str,
        deferred: &mut Deferred,
    ) -> Result<()> {
        let upper = name.to_ascii_uppercase();
        trace!(attribute = %upper, "FETCH attribute");

        match upper.as_str() {
            "FLAGS" => {
                let flags = parse_flag_list(&mut ex.cursor)?;
                let (bits, keywords) =
                    MessageFlags::classify(&flags, self.flags.supported_user_flags());
                self.flags.record_flags(bits, keywords);
            }
            "UID" => self.fetch_uid(ex)?,
            "MODSEQ" => self.fetch_mod_seq(ex)?,
            "RFC822.SIZE" | "XAOL.SIZE" => {
                let size = ex.cursor.read_u32()?;
                self.flags.record_size(size);
                deferred.zero_length |= size == 0;
            }
            "INTERNALDATE" => {
                ex.cursor.read_nstring()?;
            }
            "ENVELOPE" => deferred.envelope = Some(parse_envelope(&mut ex.cursor)?),
            "BODYSTRUCTURE" | "BODY" => match self.body.parse(&mut ex.cursor) {
                Ok(body) => deferred.body = Some(body),
                // Nothing left to salvage; line recovery counts it.
                Err(err @ Error::Syntax(_)) if ex.cursor.at_end_of_line() => return Err(err),
                // The builder left the cursor behind the structure.
                Err(err @ Error::Syntax(_)) => {
                    ex.scratch.syntax_errors += 1;
                    self.syntax_errors += 1;
                    warn!(error = %err, "malformed body structure");
                }
                Err(err) => return Err(err),
            },
            "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => self.message_body(ex, &upper)?,
            _ if is_body_section(&upper) => self.message_body(ex, &upper)?,
            "X-GM-MSGID" | "X-GM-THRID" | "X-GM-LABELS" => {
                let value = read_value_text(&mut ex.cursor)?;
                deferred.custom.push((name.to_string(), value));
            }
            _ if ex
                .cmd
                .custom_fetch_attribute
                .as_deref()
                .is_some_and(|custom| custom.eq_ignore_ascii_case(name)) =>
            {
                let value = read_value_text(&mut ex.cursor)?;
                deferred.custom.push((name.to_string(), value));
            }
            _ => {
                debug!(attribute = %name, "skipping FETCH attribute");
                skip_value(&mut ex.cursor)?;
            }
        }
        Ok(())
    }

    fn fetch_uid(&mut self, ex: &mut Exchange<'_>) -> Result<()> {
        match ex.cursor.advance()? {
            Token::Number(n) => {
                let uid = Uid::from_wire(n)
                    .ok_or_else(|| ex.cursor.syntax(format!("invalid UID {n}")))?;
                self.flags.record_uid(uid);
                Ok(())
            }
            // Zimbra glues the next attribute name to the UID: `UID 123MODSEQ (5)`.
            Token::Atom(glued) => {
                let split = glued
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(glued.len());
                let (digits, rest) = glued.split_at(split);
                let uid = digits
                    .parse::<u64>()
                    .ok()
                    .and_then(Uid::from_wire)
                    .ok_or_else(|| ex.cursor.syntax(format!("invalid UID {glued}")))?;
                self.flags.record_uid(uid);
                if rest.eq_ignore_ascii_case("MODSEQ") {
                    self.fetch_mod_seq(ex)
                } else {
                    Err(ex.cursor.syntax(format!("invalid UID {glued}")))
                }
            }
            token => Err(ex.cursor.syntax(format!("expected UID, found {token}"))),
        }
    }

    fn fetch_mod_seq(&mut self, ex: &mut Exchange<'_>) -> Result<()> {
        ex.cursor.expect(&Token::LParen)?;
        let mod_seq = ex.cursor.read_number()?;
        ex.cursor.expect(&Token::RParen)?;

        self.flags.record_mod_seq(mod_seq);
        if ex.selecting() {
            self.mailbox.raise_highest_mod_seq(mod_seq);
        } else if let Some(metadata) = self.tracker.mailbox_mut() {
            if metadata.highest_mod_seq.is_none_or(|highest| mod_seq > highest) {
                metadata.highest_mod_seq = Some(mod_seq);
            }
        }
        Ok(())
    }

    /// Delivers a message body or section to the sink.
    fn message_body(&mut self, ex: &mut Exchange<'_>, name: &str) -> Result<()> {
        let content_type = if name.contains("HEADER") {
            "text/rfc822-headers"
        } else {
            "message/rfc822"
        };

        match ex.cursor.advance()? {
            Token::Literal(size) => self.stream_literal(ex, size, content_type),
            Token::QuotedString(text) => {
                self.deliver_inline(ex, text.as_bytes(), content_type);
                Ok(())
            }
            Token::Nil => {
                // Nothing more for a download that ended exactly on the chunk size.
                if self.download.active {
                    let carry = std::mem::take(&mut self.download.carry);
                    ex.sink.append_bytes(&carry, true);
                    ex.sink.end_download();
                    self.download = DownloadState::default();
                }
                Ok(())
            }
            token => Err(ex.cursor.syntax(format!("expected body data, found {token}"))),
        }
    }

    fn begin_download(&mut self, ex: &mut Exchange<'_>, size: u32, content_type: &str) {
        if !self.download.active {
            debug!(size, content_type, "download started");
            ex.sink.begin_download(size, content_type);
            self.download.active = true;
        }
    }

    fn stream_literal(
        &mut self,
        ex: &mut Exchange<'_>,
        size: u32,
        content_type: &str,
    ) -> Result<()> {
        let transfer = LiteralTransfer::new(size)
            .with_chunk_ceiling(ex.cmd.chunk_ceiling)
            .with_carry(std::mem::take(&mut self.download.carry));
        self.begin_download(ex, size, content_type);

        let mut final_delivered = false;
        let mut streamer = ex.cursor.literal(transfer);
        while let Some(piece) = streamer.next() {
            let piece = piece?;
            let last = streamer.transfer().is_complete();
            let transfer = streamer.transfer_mut();
            let bytes = transfer.prepare_delivery(&piece, last);
            let is_final = last && transfer.is_final_chunk();
            if !bytes.is_empty() || is_final {
                ex.sink.append_bytes(&bytes, is_final);
                final_delivered |= is_final;
            }
        }
        let (mut transfer, remainder) = streamer.finish();

        self.end_chunk(ex, &mut transfer, final_delivered);
        ex.cursor.resume(remainder)
    }

    fn deliver_inline(&mut self, ex: &mut Exchange<'_>, data: &[u8], content_type: &str) {
        let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let mut transfer = LiteralTransfer::new(size)
            .with_chunk_ceiling(ex.cmd.chunk_ceiling)
            .with_carry(std::mem::take(&mut self.download.carry));
        transfer.octets_consumed = size;
        self.begin_download(ex, size, content_type);

        let bytes = transfer.prepare_delivery(data, true);
        let is_final = transfer.is_final_chunk();
        if !bytes.is_empty() || is_final {
            ex.sink.append_bytes(&bytes, is_final);
        }
        self.end_chunk(ex, &mut transfer, is_final);
    }

    /// Finishes the download after its last chunk, or keeps the carry for the next one.
    fn end_chunk(
        &mut self,
        ex: &mut Exchange<'_>,
        transfer: &mut LiteralTransfer,
        final_delivered: bool,
    ) {
        if transfer.is_final_chunk() {
            if !final_delivered {
                ex.sink.append_bytes(&transfer.take_carry(), true);
            }
            ex.sink.end_download();
            self.download = DownloadState::default();
            debug!(octets = transfer.total_octets_expected, "download finished");
        } else {
            self.download.carry = transfer.take_carry();
        }
    }

    fn publish_fetch(&mut self, ex: &mut Exchange<'_>, seq: SeqNum, deferred: Deferred) {
        if self.flags.pending_uid().is_none() {
            if let Some(uid) = ex.cmd.single_message_uid {
                self.flags.record_uid(uid);
            }
        }
        let uid = self.flags.pending_uid().or_else(|| self.flags.uid_of(seq));

        if let Some(record) = self.flags.publish() {
            ex.observer.on_message_fetched(&record);
        }
        if let Some(body) = &deferred.body {
            ex.observer.on_body_structure(seq, uid, body);
        }
        if let Some(envelope) = &deferred.envelope {
            ex.observer.on_envelope(seq, uid, envelope);
        }
        for (name, value) in &deferred.custom {
            ex.observer.on_custom_attribute(seq, uid, name, value);
        }
        if deferred.zero_length {
            match uid {
                Some(uid) => ex.scratch.zero_length_uids.push(uid),
                None => debug!(%seq, "zero-length message without UID"),
            }
        }
    }
}

/// Returns true for `BODY[...]`, `BODY.PEEK[...]`, `BINARY[...]` and `BINARY.PEEK[...]`.
fn is_body_section(upper: &str) -> bool {
    ["BODY[", "BODY.PEEK[", "BINARY[", "BINARY.PEEK["]
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// Parses an ENVELOPE structure.
pub fn parse_envelope(cursor: &mut TokenCursor<'_>) -> Result<Envelope> {
    cursor.expect(&Token::LParen)?;

    let date = cursor.read_nstring()?;
    let subject = cursor.read_nstring()?;
    let from = parse_address_list(cursor)?;
    let sender = parse_address_list(cursor)?;
    let reply_to = parse_address_list(cursor)?;
    let to = parse_address_list(cursor)?;
    let cc = parse_address_list(cursor)?;
    let bcc = parse_address_list(cursor)?;
    let in_reply_to = cursor.read_nstring()?;
    let message_id = cursor.read_nstring()?;

    cursor.expect(&Token::RParen)?;

    Ok(Envelope {
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

/// Parses an address list.
pub fn parse_address_list(cursor: &mut TokenCursor<'_>) -> Result<Vec<Address>> {
    match cursor.advance()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();
            loop {
                match cursor.advance()? {
                    Token::RParen => break,
                    Token::LParen => addresses.push(parse_address(cursor)?),
                    token => {
                        return Err(cursor.syntax(format!("expected address, found {token}")));
                    }
                }
            }
            Ok(addresses)
        }
        token => Err(cursor.syntax(format!("expected address list, found {token}"))),
    }
}

/// Parses a single address after its opening parenthesis.
fn parse_address(cursor: &mut TokenCursor<'_>) -> Result<Address> {
    let name = cursor.read_nstring()?;
    let adl = cursor.read_nstring()?;
    let mailbox = cursor.read_nstring()?;
    let host = cursor.read_nstring()?;
    cursor.expect(&Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Renders one attribute value as text; lists keep their parentheses.
fn read_value_text(cursor: &mut TokenCursor<'_>) -> Result<String> {
    match cursor.advance()? {
        Token::Nil => Ok("NIL".to_string()),
        Token::Literal(size) => {
            let bytes = cursor.read_literal_bytes(size)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Token::LParen => {
            let mut items = Vec::new();
            loop {
                match cursor.peek()? {
                    Token::RParen => {
                        cursor.advance()?;
                        break;
                    }
                    Token::Eol => return Err(cursor.syntax("unterminated list")),
                    _ => items.push(read_value_text(cursor)?),
                }
            }
            Ok(format!("({})", items.join(" ")))
        }
        token => token
            .text()
            .map(Cow::into_owned)
            .ok_or_else(|| cursor.syntax(format!("unexpected {token}"))),
    }
}

/// Consumes one attribute value of any shape.
fn skip_value(cursor: &mut TokenCursor<'_>) -> Result<()> {
    match cursor.advance()? {
        Token::LParen => cursor.skip_to_close_paren(1),
        Token::Literal(size) => {
            let mut streamer = cursor.literal(LiteralTransfer::new(size));
            for piece in &mut streamer {
                piece?;
            }
            let (_, remainder) = streamer.finish();
            cursor.resume(remainder)
        }
        token @ (Token::RParen | Token::Eol) => {
            Err(cursor.syntax(format!("missing attribute value before {token}")))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::command::CommandContext;
    use crate::config::ParserConfig;
    use crate::handler::{CollectingHandler, ObservedEvent};
    use crate::parser::bodystructure::BodyPartKind;
    use crate::parser::response::ResponseSummary;
    use crate::source::{BufferedLines, LineSource, ScriptedLines};

    fn logged_in() -> ResponseParser {
        let mut parser = ResponseParser::new(ParserConfig::new("test"));
        let cmd = CommandContext::parse("a0 LOGIN u p").unwrap();
        let mut source = BufferedLines::from("a0 OK\r\n");
        parser
            .parse_response(
                &cmd,
                &mut source,
                &mut CollectingHandler::new(),
                &mut CollectingHandler::new(),
            )
            .unwrap();
        parser
    }

    fn fetch(
        parser: &mut ResponseParser,
        command: &str,
        source: &mut dyn LineSource,
        observer: &mut CollectingHandler,
        sink: &mut CollectingHandler,
    ) -> Result<ResponseSummary> {
        let cmd = CommandContext::parse(command).unwrap();
        parser.parse_response(&cmd, source, observer, sink)
    }

    fn fetch_str(
        parser: &mut ResponseParser,
        command: &str,
        input: &str,
    ) -> (CollectingHandler, CollectingHandler, ResponseSummary) {
        let mut observer = CollectingHandler::new();
        let mut sink = CollectingHandler::new();
        let mut source = BufferedLines::from(input);
        let summary = fetch(parser, command, &mut source, &mut observer, &mut sink).unwrap();
        (observer, sink, summary)
    }

    #[test]
    fn test_flags_and_uid_in_either_order() {
        let mut parser = logged_in();
        let (first, _, _) = fetch_str(
            &mut parser,
            "a1 FETCH 1:2 (FLAGS UID)",
            "* 1 FETCH (FLAGS (\\Seen) UID 10)\r\n* 2 FETCH (UID 11 FLAGS (\\Seen))\r\na1 OK\r\n",
        );
        let records = first.fetched();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uid, Uid::new(10).unwrap());
        assert_eq!(records[1].uid, Uid::new(11).unwrap());
        assert_eq!(records[0].flags, records[1].flags);
        assert_eq!(records[0].flags, Some(MessageFlags::SEEN));
    }

    #[test]
    fn test_incomplete_line_not_published() {
        let mut parser = logged_in();
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a1 FETCH 1 (FLAGS UID)",
            "* 1 FETCH (FLAGS (\\Seen))\r\na1 OK\r\n",
        );
        assert!(observer.fetched().is_empty());
        assert_eq!(parser.flag_state().uid_of(SeqNum::new(1).unwrap()), None);
    }

    #[test]
    fn test_unsolicited_flags_use_known_uid() {
        let mut parser = logged_in();
        fetch_str(&mut parser, "a1 FETCH 3 (UID)", "* 3 FETCH (UID 42)\r\na1 OK\r\n");
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a2 NOOP",
            "* 3 FETCH (FLAGS (\\Flagged $Junk))\r\na2 OK\r\n",
        );
        let records = observer.fetched();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uid, Uid::new(42).unwrap());
        assert_eq!(
            records[0].flags,
            Some(MessageFlags::FLAGGED | MessageFlags::CUSTOM_KEYWORD)
        );
        assert_eq!(records[0].custom_keywords, vec!["$Junk".to_string()]);
    }

    #[test]
    fn test_single_message_uid_fills_missing_uid() {
        let mut parser = logged_in();
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a1 UID FETCH 77 (FLAGS)",
            "* 5 FETCH (FLAGS ())\r\na1 OK\r\n",
        );
        assert_eq!(observer.fetched()[0].uid, Uid::new(77).unwrap());
    }

    #[test]
    fn test_zimbra_glued_modseq() {
        let mut parser = logged_in();
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a1 UID FETCH 1:* (FLAGS)",
            "* 1 FETCH (FLAGS () UID 123MODSEQ (5))\r\na1 OK\r\n",
        );
        let record = observer.fetched()[0].clone();
        assert_eq!(record.uid, Uid::new(123).unwrap());
        assert_eq!(record.mod_seq, Some(5));
    }

    #[test]
    fn test_body_literal_streamed_across_lines() {
        let mut parser = logged_in();
        let mut source: ScriptedLines = [
            "* 1 FETCH (UID 9 BODY[] {14}\r\n",
            "Hello\r",
            "\nWorld\r\n",
            " FLAGS (\\Seen))\r\n",
            "a1 OK\r\n",
        ]
        .into_iter()
        .collect();
        let mut observer = CollectingHandler::new();
        let mut sink = CollectingHandler::new();
        let command = "a1 UID FETCH 9 (BODY[] FLAGS)";
        fetch(&mut parser, command, &mut source, &mut observer, &mut sink).unwrap();

        assert_eq!(sink.finished, vec![b"Hello\r\nWorld\r\n".to_vec()]);
        assert_eq!(sink.final_chunks, 1);
        assert_eq!(
            sink.events.first(),
            Some(&ObservedEvent::DownloadStarted(14, "message/rfc822".into()))
        );
        assert_eq!(observer.fetched()[0].flags, Some(MessageFlags::SEEN));
    }

    #[test]
    fn test_chunked_download_carries_cr() {
        let mut parser = logged_in();
        let mut sink = CollectingHandler::new();
        let mut observer = CollectingHandler::new();

        let mut source =
            BufferedLines::from("* 1 FETCH (UID 9 BODY[]<0> {4}\r\nabc\r)\r\na1 OK\r\n");
        let command = "a1 UID FETCH 9 BODY.PEEK[]<0.4>";
        fetch(&mut parser, command, &mut source, &mut observer, &mut sink).unwrap();
        assert_eq!(sink.download, b"abc");
        assert!(sink.finished.is_empty());

        let mut source = BufferedLines::from("* 1 FETCH (UID 9 BODY[]<4> {2}\r\n\nd)\r\na2 OK\r\n");
        let command = "a2 UID FETCH 9 BODY.PEEK[]<4.4>";
        fetch(&mut parser, command, &mut source, &mut observer, &mut sink).unwrap();
        assert_eq!(sink.finished, vec![b"abc\r\nd".to_vec()]);
        assert_eq!(sink.final_chunks, 1);
        let started = sink
            .events
            .iter()
            .filter(|e| matches!(e, ObservedEvent::DownloadStarted(..)))
            .count();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_zero_length_message() {
        let mut parser = logged_in();
        let (_, sink, summary) = fetch_str(
            &mut parser,
            "a1 UID FETCH 5 (RFC822.SIZE BODY[])",
            "* 1 FETCH (UID 5 RFC822.SIZE 0 BODY[] {0}\r\n)\r\na1 OK\r\n",
        );
        assert_eq!(summary.zero_length_uids, vec![Uid::new(5).unwrap()]);
        assert_eq!(sink.finished, vec![Vec::<u8>::new()]);
        assert_eq!(sink.final_chunks, 1);
    }

    #[test]
    fn test_quoted_header_section() {
        let mut parser = logged_in();
        let (_, sink, _) = fetch_str(
            &mut parser,
            "a1 UID FETCH 5 BODY.PEEK[HEADER]",
            "* 1 FETCH (UID 5 BODY[HEADER] \"Subject: hi\")\r\na1 OK\r\n",
        );
        assert_eq!(
            sink.events.first(),
            Some(&ObservedEvent::DownloadStarted(11, "text/rfc822-headers".into()))
        );
        assert_eq!(sink.finished, vec![b"Subject: hi".to_vec()]);
    }

    #[test]
    fn test_truncated_literal_aborts_download() {
        let mut parser = logged_in();
        let mut observer = CollectingHandler::new();
        let mut sink = CollectingHandler::new();
        let mut source = BufferedLines::from("* 1 FETCH (UID 5 BODY[] {100}\r\nshort\r\n");
        let err = fetch(&mut parser, "a1 UID FETCH 5 BODY[]", &mut source, &mut observer, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::LiteralTruncated { expected: 100, .. }));
        assert_eq!(sink.events.last(), Some(&ObservedEvent::DownloadAborted));
    }

    #[test]
    fn test_envelope_reported_with_uid() {
        let mut parser = logged_in();
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a1 FETCH 1 (ENVELOPE UID)",
            "* 1 FETCH (ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700\" \"IMAP4rev1 WG mtg summary\" \
             ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) NIL NIL \
             ((NIL NIL \"imap\" \"cac.washington.edu\")) NIL NIL NIL \"<B27397-0100000@cac.washington.edu>\") UID 7)\r\n\
             a1 OK\r\n",
        );
        let envelope = observer
            .events
            .iter()
            .find_map(|e| match e {
                ObservedEvent::Envelope(_, uid, envelope) => Some((*uid, envelope.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(envelope.0, Uid::new(7));
        assert_eq!(envelope.1.subject.as_deref(), Some("IMAP4rev1 WG mtg summary"));
        assert_eq!(envelope.1.from[0].mailbox.as_deref(), Some("gray"));
        assert_eq!(envelope.1.to[0].host.as_deref(), Some("cac.washington.edu"));
        assert!(envelope.1.sender.is_empty());
    }

    #[test]
    fn test_body_structure_reported() {
        let mut parser = logged_in();
        let (observer, _, _) = fetch_str(
            &mut parser,
            "a1 UID FETCH 3 BODYSTRUCTURE",
            "* 1 FETCH (UID 3 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92))\r\n\
             a1 OK\r\n",
        );
        assert!(observer.events.iter().any(|e| matches!(
            e,
            ObservedEvent::BodyStructure(
                _,
                Some(uid),
                BodyPart { kind: BodyPartKind::Leaf(leaf), .. },
            ) if uid.get() == 3 && leaf.mime_type().eq_ignore_ascii_case("text/plain")
        )));
    }

    #[test]
    fn test_malformed_body_structure_keeps_line() {
        let mut parser = logged_in();
        let (observer, _, summary) = fetch_str(
            &mut parser,
            "a1 UID FETCH 3 (BODYSTRUCTURE FLAGS)",
            "* 1 FETCH (BODYSTRUCTURE (\"TEXT\" (oops)) UID 3 FLAGS (\\Seen))\r\na1 OK\r\n",
        );
        assert_eq!(summary.syntax_errors, 1);
        assert!(!observer
            .events
            .iter()
            .any(|e| matches!(e, ObservedEvent::BodyStructure(..))));
        assert_eq!(observer.fetched().len(), 1);
    }

    #[test]
    fn test_body_structure_cut_at_end_of_line_counts_once() {
        let mut parser = logged_in();
        let (observer, _, summary) = fetch_str(
            &mut parser,
            "a1 UID FETCH 3 BODYSTRUCTURE",
            "* 1 FETCH (UID 3 BODYSTRUCTURE (\"TEXT\" \"PLAIN\"\r\na1 OK\r\n",
        );
        assert!(summary.succeeded());
        assert_eq!(summary.syntax_errors, 1);
        assert_eq!(parser.syntax_errors(), 1);
        assert!(observer.fetched().is_empty());
    }

    #[test]
    fn test_fetch_mod_seq_during_select_raises_highest() {
        let mut parser = logged_in();
        fetch_str(
            &mut parser,
            "a1 SELECT INBOX",
            "* 2 EXISTS\r\n\
             * OK [UIDVALIDITY 7] ok\r\n\
             * OK [HIGHESTMODSEQ 500] ok\r\n\
             * 1 FETCH (UID 4 MODSEQ (900))\r\n\
             * 2 FETCH (UID 5 MODSEQ (20))\r\n\
             a1 OK [READ-WRITE] done\r\n",
        );
        let metadata = parser.tracker().mailbox().unwrap();
        assert_eq!(metadata.highest_mod_seq, Some(900));
    }

    #[test]
    fn test_gmail_labels_and_custom_attribute() {
        let mut parser = logged_in();
        let cmd = CommandContext::parse("a1 UID FETCH 3 (X-GM-LABELS X-PRIORITY)")
            .unwrap()
            .with_custom_fetch_attribute("X-PRIORITY");
        let mut observer = CollectingHandler::new();
        let mut source = BufferedLines::from(
            "* 1 FETCH (UID 3 X-GM-LABELS (\\Inbox \"Work stuff\") X-PRIORITY 2)\r\na1 OK\r\n",
        );
        parser
            .parse_response(&cmd, &mut source, &mut observer, &mut CollectingHandler::new())
            .unwrap();
        let custom: Vec<_> = observer
            .events
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::CustomAttribute { name, value, .. } => {
                    Some((name.clone(), value.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            custom,
            vec![
                ("X-GM-LABELS".to_string(), "(\\Inbox Work stuff)".to_string()),
                ("X-PRIORITY".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_attribute_with_literal_skipped() {
        let mut parser = logged_in();
        let (observer, _, summary) = fetch_str(
            &mut parser,
            "a1 UID FETCH 3 (FLAGS)",
            "* 1 FETCH (X-UNKNOWN {3}\r\nabc UID 3 FLAGS ())\r\na1 OK\r\n",
        );
        assert_eq!(summary.syntax_errors, 0);
        assert_eq!(observer.fetched().len(), 1);
    }

    #[test]
    fn test_expunge_shifts_table() {
        let mut parser = logged_in();
        fetch_str(
            &mut parser,
            "a1 FETCH 1:3 (UID)",
            "* 1 FETCH (UID 10)\r\n* 2 FETCH (UID 20)\r\n* 3 FETCH (UID 30)\r\na1 OK\r\n",
        );
        let (observer, _, _) = fetch_str(&mut parser, "a2 NOOP", "* 2 EXPUNGE\r\na2 OK\r\n");
        assert!(observer.events.contains(&ObservedEvent::Expunge(SeqNum::new(2).unwrap())));
        assert_eq!(parser.flag_state().uid_of(SeqNum::new(2).unwrap()), Uid::new(30));
    }
}
