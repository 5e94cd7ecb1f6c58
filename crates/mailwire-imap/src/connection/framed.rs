//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with support for literals. This module
//! reads whole responses from an async stream into a [`BufferedLines`]
//! that the blocking response parser then pulls from.

#![allow(clippy::missing_errors_doc)]

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::config::DEFAULT_MAX_LITERAL_SIZE;
use crate::parser::trailing_literal_length;
use crate::source::{BufferedLines, TransportError};
use crate::types::Tag;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Framed connection for IMAP protocol.
///
/// Handles line-based reading with literal support and buffered writing.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    max_literal_size: u32,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
        }
    }

    /// Sets the largest literal accepted.
    #[must_use]
    pub const fn with_max_literal_size(mut self, size: u32) -> Self {
        self.max_literal_size = size;
        self
    }

    /// Reads one logical response line, including embedded literals.
    ///
    /// IMAP responses can contain literals in the format `{n}\r\n<n bytes>`.
    /// The returned bytes keep the literal markers, so the parser sees the
    /// response exactly as the server sent it.
    pub async fn read_response(&mut self) -> Result<Bytes> {
        let mut response = BytesMut::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(size) = trailing_literal_length(&line) else {
                break;
            };
            if size > self.max_literal_size {
                return Err(Error::LiteralTooLarge {
                    size,
                    limit: self.max_literal_size,
                });
            }
            trace!(size, "reading literal");
            let mut literal = vec![0u8; size as usize];
            self.reader.read_exact(&mut literal).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::Transport(TransportError::Closed)
                } else {
                    Error::Io(err)
                }
            })?;
            response.extend_from_slice(&literal);
        }

        Ok(response.freeze())
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Transport(TransportError::Closed));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            // No CRLF yet; it may straddle two reads.
            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);
            if line.ends_with(b"\r") {
                let next = self.reader.fill_buf().await?;
                if next.first() == Some(&b'\n') {
                    line.push(b'\n');
                    self.reader.consume(1);
                    break;
                }
            }

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes a command to the stream.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Collects the lines of one command's response.
///
/// Reading stops after the tagged line or a `+` continuation request, the
/// two points where [`ResponseParser`](crate::ResponseParser) hands control
/// back to the caller.
pub struct ResponseAccumulator {
    tag: Tag,
    lines: BufferedLines,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: Tag::new(tag),
            lines: BufferedLines::default(),
        }
    }

    /// Reads responses until the tagged line or a continuation request.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<BufferedLines>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let done = self.ends_exchange(&response);
            self.lines.extend_from_slice(&response);
            if done {
                break;
            }
        }

        Ok(std::mem::take(&mut self.lines))
    }

    /// Bytes collected by an interrupted read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lines.len()
    }

    fn ends_exchange(&self, response: &[u8]) -> bool {
        if response.starts_with(b"+") {
            return true;
        }
        let tag = self.tag.as_str().as_bytes();
        !tag.is_empty()
            && response.starts_with(tag)
            && response.get(tag.len()).is_some_and(|&b| b == b' ')
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
    use crate::handler::CollectingHandler;
    use crate::parser::ResponseParser;
    use crate::source::LineSource;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(&response[..], b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"* OK ready\r").read(b"\n* 2 EXISTS\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(&framed.read_response().await.unwrap()[..], b"* OK ready\r\n");
        assert_eq!(&framed.read_response().await.unwrap()[..], b"* 2 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_framed_write_command() {
        use tokio_test::io::Builder;

        let mock = Builder::new().write(b"A001 LOGIN user pass\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed
            .write_command(b"A001 LOGIN user pass\r\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_response_accumulator() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"* CAPABILITY IMAP4rev1\r\n")
            .read(b"* OK IMAP ready\r\n")
            .read(b"A001 OK Success\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A001");

        let mut lines = accumulator.read_until_tagged(&mut framed).await.unwrap();
        assert_eq!(&lines.next_line().unwrap()[..], b"* CAPABILITY IMAP4rev1\r\n");
        assert_eq!(&lines.next_line().unwrap()[..], b"* OK IMAP ready\r\n");
        assert_eq!(&lines.next_line().unwrap()[..], b"A001 OK Success\r\n");
        assert!(lines.next_line().is_err());
    }

    #[tokio::test]
    async fn test_accumulator_stops_at_continuation() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"+ idling\r\n").build();
        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A002");

        let lines = accumulator.read_until_tagged(&mut framed).await.unwrap();
        assert_eq!(lines.len(), 10);
    }

    #[tokio::test]
    async fn test_accumulated_lines_feed_parser() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 7 BODY[] {11}\r\n")
            .read(b"Hi\r\nthere\r\n)\r\n")
            .read(b"A003 OK FETCH done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let mut lines = ResponseAccumulator::new("A003")
            .read_until_tagged(&mut framed)
            .await
            .unwrap();

        let mut parser = ResponseParser::new(ParserConfig::new("test"));
        let cmd = CommandContext::parse("A003 UID FETCH 7 BODY[]").unwrap();
        let mut observer = CollectingHandler::new();
        let mut sink = CollectingHandler::new();
        let summary = parser
            .parse_response(&cmd, &mut lines, &mut observer, &mut sink)
            .unwrap();
        assert!(summary.succeeded());
        assert_eq!(sink.finished, vec![b"Hi\r\nthere\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"* 1 FETCH (BODY[] {1001}\r\n").build();
        let mut framed = FramedStream::new(mock).with_max_literal_size(1000);

        let result = framed.read_response().await;
        assert!(matches!(
            result,
            Err(Error::LiteralTooLarge { size: 1001, limit: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_closed_mid_literal() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"* 1 FETCH (BODY[] {10}\r\n").read(b"abc").build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(matches!(result, Err(Error::Transport(TransportError::Closed))));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        use tokio_test::io::Builder;

        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}
