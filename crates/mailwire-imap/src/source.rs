//! Line sources feeding the parser.
//!
//! The parser pulls server output one line at a time through [`LineSource`].
//! A line normally ends in CRLF; the parser counts literal octets itself,
//! so a source may also hand out partial lines when the transport splits
//! them.

use std::collections::VecDeque;
use std::io::BufRead;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Failure reported by a line source.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection or the recording ran out.
    #[error("connection closed")]
    Closed,
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking, pull-based supplier of server lines.
pub trait LineSource {
    /// Returns the next line of server output.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no more data can be read.
    fn next_line(&mut self) -> Result<Bytes, TransportError>;
}

impl<T: LineSource + ?Sized> LineSource for &mut T {
    fn next_line(&mut self) -> Result<Bytes, TransportError> {
        (**self).next_line()
    }
}

/// In-memory buffer split into LF-terminated lines on demand.
#[derive(Debug, Clone, Default)]
pub struct BufferedLines {
    buffer: BytesMut,
}

impl BufferedLines {
    /// Creates a source over the given bytes.
    #[must_use]
    pub fn new(buffer: BytesMut) -> Self {
        Self { buffer }
    }

    /// Appends more server output.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the number of buffered bytes not yet handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if every byte has been handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl From<&[u8]> for BufferedLines {
    fn from(data: &[u8]) -> Self {
        Self::new(BytesMut::from(data))
    }
}

impl From<&str> for BufferedLines {
    fn from(data: &str) -> Self {
        Self::from(data.as_bytes())
    }
}

impl LineSource for BufferedLines {
    fn next_line(&mut self) -> Result<Bytes, TransportError> {
        if self.buffer.is_empty() {
            return Err(TransportError::Closed);
        }
        let end = self
            .buffer
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.buffer.len(), |pos| pos + 1);
        Ok(self.buffer.split_to(end).freeze())
    }
}

/// Replays pre-cut chunks exactly as given.
///
/// Each chunk is returned by one `next_line` call, which lets callers model
/// transports that split lines at arbitrary points.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLines {
    chunks: VecDeque<Bytes>,
}

impl ScriptedLines {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk to the script.
    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        self.chunks.push_back(chunk.into());
    }

    /// Returns the number of chunks not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl<B: Into<Bytes>> FromIterator<B> for ScriptedLines {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self {
            chunks: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for ScriptedLines {
    fn next_line(&mut self) -> Result<Bytes, TransportError> {
        self.chunks.pop_front().ok_or(TransportError::Closed)
    }
}

/// Reads lines from a blocking [`BufRead`].
#[derive(Debug)]
pub struct ReaderLines<R> {
    reader: R,
}

impl<R: BufRead> ReaderLines<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> LineSource for ReaderLines<R> {
    fn next_line(&mut self) -> Result<Bytes, TransportError> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Err(TransportError::Closed);
        }
        Ok(Bytes::from(line))
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

    #[test]
    fn test_buffered_lines_split_on_lf() {
        let mut source = BufferedLines::from("* OK ready\r\nA1 OK done\r\ntail");
        assert_eq!(source.next_line().unwrap(), &b"* OK ready\r\n"[..]);
        assert_eq!(source.next_line().unwrap(), &b"A1 OK done\r\n"[..]);
        assert_eq!(source.next_line().unwrap(), &b"tail"[..]);
        assert!(matches!(source.next_line(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_buffered_lines_extend() {
        let mut source = BufferedLines::default();
        assert!(source.is_empty());
        source.extend_from_slice(b"* 3 EXISTS\r\n");
        assert_eq!(source.len(), 12);
        assert_eq!(source.next_line().unwrap(), &b"* 3 EXISTS\r\n"[..]);
    }

    #[test]
    fn test_scripted_lines_keep_chunks() {
        let mut source: ScriptedLines = ["hel", "lo world)\r\n"].into_iter().collect();
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_line().unwrap(), &b"hel"[..]);
        assert_eq!(source.next_line().unwrap(), &b"lo world)\r\n"[..]);
        assert!(matches!(source.next_line(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_reader_lines() {
        let data: &[u8] = b"* BYE\r\n";
        let mut source = ReaderLines::new(data);
        assert_eq!(source.next_line().unwrap(), &b"* BYE\r\n"[..]);
        assert!(matches!(source.next_line(), Err(TransportError::Closed)));
    }
}
