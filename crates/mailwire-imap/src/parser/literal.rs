//! Octet-counted literal streaming.
//!
//! A `{n}` marker promises exactly `n` octets after the marker's CRLF. The
//! octets may arrive spread over many transport lines, and the last line
//! usually carries more than the literal: whatever follows the literal on
//! that line belongs to the response again.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::source::{LineSource, TransportError};

/// Bookkeeping for one literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralTransfer {
    /// Octets announced by the marker.
    pub total_octets_expected: u32,
    /// Octets pulled from the line source so far.
    pub octets_consumed: u32,
    /// Chunk size the client asked for with `BODY[]<origin.count>`.
    pub requested_chunk_ceiling: Option<u32>,
    /// A CR held back from the sink until the following byte is known.
    pub partial_line_carry: Vec<u8>,
}

impl LiteralTransfer {
    /// Creates a transfer for `total` octets.
    #[must_use]
    pub const fn new(total: u32) -> Self {
        Self {
            total_octets_expected: total,
            octets_consumed: 0,
            requested_chunk_ceiling: None,
            partial_line_carry: Vec::new(),
        }
    }

    /// Sets the requested chunk ceiling.
    #[must_use]
    pub const fn with_chunk_ceiling(mut self, ceiling: Option<u32>) -> Self {
        self.requested_chunk_ceiling = ceiling;
        self
    }

    /// Restores a carry left over from the previous chunk of the same message.
    #[must_use]
    pub fn with_carry(mut self, carry: Vec<u8>) -> Self {
        self.partial_line_carry = carry;
        self
    }

    /// Octets still owed by the server.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_octets_expected
            .saturating_sub(self.octets_consumed)
    }

    /// Returns true once every announced octet was consumed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.octets_consumed >= self.total_octets_expected
    }

    /// Returns true if this literal is the last piece of the message.
    ///
    /// Without a ceiling the literal is the whole message. With one, the
    /// server signals the end by sending fewer (or more) octets than asked.
    #[must_use]
    pub fn is_final_chunk(&self) -> bool {
        self.requested_chunk_ceiling
            .is_none_or(|ceiling| ceiling != self.total_octets_expected)
    }

    /// Takes the carry out, leaving it empty.
    pub fn take_carry(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.partial_line_carry)
    }

    /// Prepares bytes for the sink.
    ///
    /// Prepends the held-back carry and holds back a trailing CR unless
    /// this is the very last piece of the message.
    pub fn prepare_delivery(&mut self, piece: &[u8], last_piece: bool) -> Bytes {
        let mut out = self.take_carry();
        out.extend_from_slice(piece);
        if !(last_piece && self.is_final_chunk()) && out.last() == Some(&b'\r') {
            out.pop();
            self.partial_line_carry.push(b'\r');
        }
        Bytes::from(out)
    }
}

/// Lazy, finite, non-restartable sequence of literal pieces.
///
/// Each item is one transport line (or the literal part of it). The
/// iterator ends when the announced octets are consumed; a closed source
/// before that point yields [`Error::LiteralTruncated`] and ends.
pub struct LiteralStreamer<'a> {
    source: &'a mut dyn LineSource,
    transfer: LiteralTransfer,
    remainder: Option<Bytes>,
    done: bool,
}

impl<'a> LiteralStreamer<'a> {
    /// Starts streaming `transfer` from `source`.
    pub fn new(source: &'a mut dyn LineSource, transfer: LiteralTransfer) -> Self {
        Self {
            source,
            transfer,
            remainder: None,
            done: false,
        }
    }

    /// Current bookkeeping.
    #[must_use]
    pub const fn transfer(&self) -> &LiteralTransfer {
        &self.transfer
    }

    /// Mutable bookkeeping, for carry handling while delivering.
    pub const fn transfer_mut(&mut self) -> &mut LiteralTransfer {
        &mut self.transfer
    }

    /// Ends the stream, returning the bookkeeping and the bytes that
    /// followed the literal on its last line.
    #[must_use]
    pub fn finish(self) -> (LiteralTransfer, Option<Bytes>) {
        (self.transfer, self.remainder)
    }
}

impl Iterator for LiteralStreamer<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.transfer.is_complete() {
            self.done = true;
            return None;
        }

        let mut line = match self.source.next_line() {
            Ok(line) => line,
            Err(TransportError::Closed) => {
                self.done = true;
                return Some(Err(Error::LiteralTruncated {
                    expected: self.transfer.total_octets_expected,
                    received: self.transfer.octets_consumed,
                }));
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };

        let needed = self.transfer.remaining() as usize;
        if line.len() > needed {
            self.remainder = Some(line.split_off(needed));
        }
        // line.len() <= needed <= u32::MAX here
        #[allow(clippy::cast_possible_truncation)]
        let taken = line.len() as u32;
        self.transfer.octets_consumed += taken;
        if self.transfer.is_complete() {
            self.done = true;
        }
        Some(Ok(line))
    }
}

/// Returns the size of a `{n}` or `{n+}` marker ending `line`, if any.
#[must_use]
pub fn trailing_literal_length(line: &[u8]) -> Option<u32> {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    let line = &line[..end];
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use crate::source::{BufferedLines, ScriptedLines};

    fn collect(streamer: LiteralStreamer<'_>) -> (Vec<u8>, LiteralTransfer, Option<Bytes>) {
        let mut streamer = streamer;
        let mut data = Vec::new();
        for piece in &mut streamer {
            data.extend_from_slice(&piece.unwrap());
        }
        let (transfer, remainder) = streamer.finish();
        (data, transfer, remainder)
    }

    #[test]
    fn test_literal_in_one_line() {
        let mut source = BufferedLines::from("hello world)\r\n");
        let (data, transfer, remainder) =
            collect(LiteralStreamer::new(&mut source, LiteralTransfer::new(11)));
        assert_eq!(data, b"hello world");
        assert!(transfer.is_complete());
        assert_eq!(remainder.unwrap(), &b")\r\n"[..]);
    }

    #[test]
    fn test_literal_split_mid_string() {
        let mut source: ScriptedLines = ["hel", "lo wo", "rld UID 4)\r\n"].into_iter().collect();
        let (data, _, remainder) =
            collect(LiteralStreamer::new(&mut source, LiteralTransfer::new(11)));
        assert_eq!(data, b"hello world");
        assert_eq!(remainder.unwrap(), &b" UID 4)\r\n"[..]);
    }

    #[test]
    fn test_literal_spanning_lines() {
        let mut source = BufferedLines::from("Subject: x\r\n\r\nbody\r\n)\r\n");
        let (data, _, remainder) =
            collect(LiteralStreamer::new(&mut source, LiteralTransfer::new(20)));
        assert_eq!(data, b"Subject: x\r\n\r\nbody\r\n");
        assert!(remainder.is_none());
        assert_eq!(source.next_line().unwrap(), &b")\r\n"[..]);
    }

    #[test]
    fn test_empty_literal_reads_nothing() {
        let mut source = BufferedLines::from(")\r\n");
        let (data, _, remainder) =
            collect(LiteralStreamer::new(&mut source, LiteralTransfer::new(0)));
        assert!(data.is_empty());
        assert!(remainder.is_none());
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_truncated_literal() {
        let mut source = BufferedLines::from("only");
        let mut streamer = LiteralStreamer::new(&mut source, LiteralTransfer::new(10));
        assert_eq!(&streamer.next().unwrap().unwrap()[..], b"only");
        let err = streamer.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::LiteralTruncated {
                expected: 10,
                received: 4
            }
        ));
        assert!(streamer.next().is_none());
    }

    #[test]
    fn test_final_chunk_rule() {
        assert!(LiteralTransfer::new(10).is_final_chunk());
        assert!(!LiteralTransfer::new(16).with_chunk_ceiling(Some(16)).is_final_chunk());
        assert!(LiteralTransfer::new(3).with_chunk_ceiling(Some(16)).is_final_chunk());
    }

    #[test]
    fn test_carry_holds_back_cr() {
        let mut transfer = LiteralTransfer::new(8).with_chunk_ceiling(Some(8));
        let first = transfer.prepare_delivery(b"line\r", false);
        assert_eq!(&first[..], b"line");
        assert_eq!(transfer.partial_line_carry, b"\r");

        // Not the final chunk, so the CR survives the end of the literal too.
        let second = transfer.prepare_delivery(b"\nab\r", true);
        assert_eq!(&second[..], b"\r\nab");
        assert_eq!(transfer.take_carry(), b"\r");

        let mut last = LiteralTransfer::new(2)
            .with_chunk_ceiling(Some(8))
            .with_carry(b"\r".to_vec());
        assert_eq!(&last.prepare_delivery(b"\n\r", true)[..], b"\r\n\r");
        assert!(last.partial_line_carry.is_empty());
    }

    #[test]
    fn test_trailing_literal_length() {
        assert_eq!(trailing_literal_length(b"* 1 FETCH (BODY[] {42}\r\n"), Some(42));
        assert_eq!(trailing_literal_length(b"A1 APPEND {7+}\r\n"), Some(7));
        assert_eq!(trailing_literal_length(b"* OK done\r\n"), None);
        assert_eq!(trailing_literal_length(b"* OK {abc}\r\n"), None);
        assert_eq!(trailing_literal_length(b"{}"), None);
    }
}
