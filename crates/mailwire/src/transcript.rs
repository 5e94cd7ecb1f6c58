//! Recorded session transcripts.
//!
//! A transcript is the server's byte stream with the client's commands
//! interleaved as lines starting with `C: `. Literal octets announced by a
//! server `{n}` marker are taken verbatim, even when they contain a line
//! that looks like a client command.

use bytes::BytesMut;
use mailwire_imap::parser::trailing_literal_length;

/// One stretch of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A line the client sent, without the `C: ` prefix and line ending.
    Client(String),
    /// Server output up to the next client line.
    Server(BytesMut),
}

const CLIENT_PREFIX: &[u8] = b"C: ";

/// Splits a transcript into client and server entries.
pub fn split(data: &[u8]) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let start = pos;
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| pos + i + 1);
        let line = &data[start..end];
        pos = end;

        if let Some(command) = line.strip_prefix(CLIENT_PREFIX) {
            let command = String::from_utf8_lossy(command);
            entries.push(Entry::Client(command.trim_end().to_string()));
            continue;
        }

        // The literal's octets travel with the line that announced them.
        if let Some(size) = trailing_literal_length(line) {
            pos = (pos + size as usize).min(data.len());
        }
        let chunk = &data[start..pos];

        match entries.last_mut() {
            Some(Entry::Server(buffer)) => buffer.extend_from_slice(chunk),
            _ => entries.push(Entry::Server(BytesMut::from(chunk))),
        }
    }

    entries
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

    fn server(text: &str) -> Entry {
        Entry::Server(BytesMut::from(text.as_bytes()))
    }

    #[test]
    fn test_split_commands_and_responses() {
        let entries = split(b"* OK ready\r\nC: a1 NOOP\r\n* 1 EXISTS\r\na1 OK\r\n");
        assert_eq!(
            entries,
            vec![
                server("* OK ready\r\n"),
                Entry::Client("a1 NOOP".into()),
                server("* 1 EXISTS\r\na1 OK\r\n"),
            ]
        );
    }

    #[test]
    fn test_literal_is_not_split() {
        let entries =
            split(b"C: a1 FETCH 1 BODY[]\r\n* 1 FETCH (BODY[] {8}\r\nC: x\r\nyz)\r\na1 OK\r\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            server("* 1 FETCH (BODY[] {8}\r\nC: x\r\nyz)\r\na1 OK\r\n")
        );
    }

    #[test]
    fn test_literal_cut_short_by_end_of_file() {
        let entries = split(b"C: a1 FETCH 1 BODY[]\r\n* 1 FETCH (BODY[] {50}\r\nabc");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], server("* 1 FETCH (BODY[] {50}\r\nabc"));
    }

    #[test]
    fn test_consecutive_client_lines() {
        let entries = split(b"C: a1 IDLE\r\n+ idling\r\nC: DONE\r\na1 OK\r\n");
        assert_eq!(
            entries,
            vec![
                Entry::Client("a1 IDLE".into()),
                server("+ idling\r\n"),
                Entry::Client("DONE".into()),
                server("a1 OK\r\n"),
            ]
        );
    }
}
