//! Property tests for FETCH bookkeeping and literal streaming.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use mailwire_imap::source::{BufferedLines, ScriptedLines};
use mailwire_imap::{
    CollectingHandler, CommandContext, LineSource, NoopHandler, ParserConfig, ResponseParser,
};

fn logged_in() -> ResponseParser {
    let mut parser = ResponseParser::new(ParserConfig::new("prop"));
    let cmd = CommandContext::parse("a0 LOGIN u p").unwrap();
    let mut source = BufferedLines::from("a0 OK\r\n");
    parser
        .parse_response(&cmd, &mut source, &mut NoopHandler, &mut NoopHandler)
        .unwrap();
    parser
}

fn fetch(
    parser: &mut ResponseParser,
    command: &str,
    source: &mut dyn LineSource,
    sink: &mut CollectingHandler,
) -> CollectingHandler {
    let cmd = CommandContext::parse(command).unwrap();
    let mut observer = CollectingHandler::new();
    parser
        .parse_response(&cmd, source, &mut observer, sink)
        .unwrap();
    observer
}

const FLAG_NAMES: [&str; 6] = ["\\Seen", "\\Answered", "\\Flagged", "\\Deleted", "\\Draft", "$Label1"];

fn flag_subset() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(FLAG_NAMES.to_vec(), 0..=FLAG_NAMES.len())
}

fn body_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'z', b' ', b'\r', b'\n']), 0..200)
}

proptest! {
    #[test]
    fn flags_and_uid_order_is_irrelevant(uid in 1u32..1_000_000, seq in 1u32..500, flags in flag_subset()) {
        let list = flags.join(" ");
        let command = "a1 FETCH 1:* (FLAGS UID)";

        let mut first = logged_in();
        let input = format!("* {seq} FETCH (FLAGS ({list}) UID {uid})\r\na1 OK\r\n");
        let a = fetch(&mut first, command, &mut BufferedLines::from(input.as_str()), &mut CollectingHandler::new());

        let mut second = logged_in();
        let input = format!("* {seq} FETCH (UID {uid} FLAGS ({list}))\r\na1 OK\r\n");
        let b = fetch(&mut second, command, &mut BufferedLines::from(input.as_str()), &mut CollectingHandler::new());

        prop_assert_eq!(a.fetched().len(), 1);
        prop_assert_eq!(a.fetched(), b.fetched());
        prop_assert_eq!(a.fetched()[0].uid.get(), uid);
    }

    #[test]
    fn literal_survives_any_split(body in body_bytes(), cuts in prop::collection::vec(0usize..200, 0..8)) {
        let mut points: Vec<usize> = cuts.into_iter().map(|c| c.min(body.len())).collect();
        points.push(0);
        points.push(body.len());
        points.sort_unstable();
        points.dedup();

        let mut source = ScriptedLines::new();
        source.push(format!("* 1 FETCH (UID 9 BODY[] {{{}}}\r\n", body.len()));
        for window in points.windows(2) {
            source.push(body[window[0]..window[1]].to_vec());
        }
        source.push(")\r\n");
        source.push("a1 OK\r\n");

        let mut parser = logged_in();
        let mut sink = CollectingHandler::new();
        fetch(&mut parser, "a1 UID FETCH 9 BODY[]", &mut source, &mut sink);

        prop_assert_eq!(sink.finished.len(), 1);
        prop_assert_eq!(&sink.finished[0], &body);
        prop_assert_eq!(sink.final_chunks, 1);
    }

    #[test]
    fn chunked_download_reassembles(body in body_bytes(), chunk in 1usize..40) {
        let mut parser = logged_in();
        let mut sink = CollectingHandler::new();

        let mut offset = 0;
        let mut round = 0;
        loop {
            let piece = &body[offset..(offset + chunk).min(body.len())];
            round += 1;
            let mut input = format!("* 1 FETCH (UID 9 BODY[]<{offset}> {{{}}}\r\n", piece.len()).into_bytes();
            input.extend_from_slice(piece);
            input.extend_from_slice(format!(")\r\nc{round} OK\r\n").as_bytes());
            let command = format!("c{round} UID FETCH 9 BODY.PEEK[]<{offset}.{chunk}>");
            fetch(&mut parser, &command, &mut BufferedLines::from(&input[..]), &mut sink);

            offset += piece.len();
            if piece.len() < chunk {
                break;
            }
        }

        prop_assert_eq!(sink.finished.len(), 1);
        prop_assert_eq!(&sink.finished[0], &body);
        prop_assert_eq!(sink.final_chunks, 1);
    }
}
