//! Token cursor threaded through the grammar productions.
//!
//! The cursor owns the lexer for the current logical line and borrows the
//! line source, so a production can pull literal octets and continue
//! tokenizing where the literal ended.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::lexer::{Lexer, Token};
use super::literal::{LiteralStreamer, LiteralTransfer, trailing_literal_length};
use crate::error::{Error, Result, SyntaxError};
use crate::source::LineSource;

/// Lexer plus line source for one parse invocation.
pub struct TokenCursor<'s> {
    source: &'s mut dyn LineSource,
    lexer: Lexer,
    max_literal_size: u32,
    pending_literal: Option<u32>,
    paren_depth: usize,
    lines_read: usize,
}

impl<'s> TokenCursor<'s> {
    /// Creates a cursor with no line loaded.
    pub fn new(source: &'s mut dyn LineSource, max_literal_size: u32) -> Self {
        Self {
            source,
            lexer: Lexer::default(),
            max_literal_size,
            pending_literal: None,
            paren_depth: 0,
            lines_read: 0,
        }
    }

    /// Pulls the next server line into the lexer.
    pub fn load_next_line(&mut self) -> Result<()> {
        let line = self.source.next_line()?;
        trace!(line = %String::from_utf8_lossy(&line).trim_end(), "S:");
        self.lexer.reset(line);
        self.pending_literal = None;
        self.paren_depth = 0;
        self.lines_read += 1;
        Ok(())
    }

    /// Number of transport lines pulled outside of literals.
    #[must_use]
    pub const fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Consumes and returns the next token.
    pub fn advance(&mut self) -> Result<Token> {
        let token = self.lexer.next_token()?;
        match token {
            Token::Literal(n) => self.pending_literal = Some(n),
            Token::LParen => self.paren_depth += 1,
            Token::RParen => self.paren_depth = self.paren_depth.saturating_sub(1),
            _ => {}
        }
        Ok(token)
    }

    /// Parentheses opened and not yet closed on the current logical line.
    #[must_use]
    pub const fn paren_depth(&self) -> usize {
        self.paren_depth
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Result<Token> {
        Ok(self.lexer.peek_token()?)
    }

    /// Returns true if nothing but the line terminator remains.
    #[must_use]
    pub fn at_end_of_line(&self) -> bool {
        self.lexer.at_end_of_line()
    }

    /// Consumes the rest of the line as text.
    pub fn rest_of_line(&mut self) -> String {
        self.lexer.rest_of_line()
    }

    /// Returns the rest of the line as text without consuming it.
    #[must_use]
    pub fn peek_rest_of_line(&self) -> String {
        self.lexer.clone().rest_of_line()
    }

    /// Builds a syntax error at the current position.
    pub fn syntax(&self, message: impl Into<String>) -> Error {
        Error::Syntax(SyntaxError::new(self.lexer.position(), message))
    }

    /// Consumes the next token and checks it.
    pub fn expect(&mut self, expected: &Token) -> Result<()> {
        let token = self.advance()?;
        if &token == expected {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {expected}, found {token}")))
        }
    }

    /// Consumes an atom equal to `keyword`, ignoring case.
    pub fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let token = self.advance()?;
        if token.is_keyword(keyword) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {keyword}, found {token}")))
        }
    }

    /// Consumes the next token if it is `expected`.
    pub fn eat(&mut self, expected: &Token) -> Result<bool> {
        if &self.peek()? == expected {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Reads an astring: atom, quoted string, number or literal.
    pub fn read_astring(&mut self) -> Result<String> {
        let token = self.advance()?;
        self.string_value(token)?
            .ok_or_else(|| self.syntax("expected string, found NIL"))
    }

    /// Reads an nstring: like an astring, but NIL yields `None`.
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        let token = self.advance()?;
        self.string_value(token)
    }

    fn string_value(&mut self, token: Token) -> Result<Option<String>> {
        match token {
            Token::Nil => Ok(None),
            Token::Literal(n) => {
                let bytes = self.read_literal_bytes(n)?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            other => match other.text() {
                Some(text) => Ok(Some(text.into_owned())),
                None => Err(self.syntax(format!("expected string, found {other}"))),
            },
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u64> {
        match self.advance()? {
            Token::Number(n) => Ok(n),
            other => Err(self.syntax(format!("expected number, found {other}"))),
        }
    }

    /// Reads a number that must fit in 32 bits.
    pub fn read_u32(&mut self) -> Result<u32> {
        let n = self.read_number()?;
        u32::try_from(n).map_err(|_| self.syntax(format!("number out of range: {n}")))
    }

    /// Collects a literal into memory, bounded by the configured ceiling.
    pub fn read_literal_bytes(&mut self, size: u32) -> Result<Bytes> {
        if size > self.max_literal_size {
            return Err(Error::LiteralTooLarge {
                size,
                limit: self.max_literal_size,
            });
        }
        let mut data = BytesMut::with_capacity(size as usize);
        let mut streamer = self.literal(LiteralTransfer::new(size));
        for piece in &mut streamer {
            data.extend_from_slice(&piece?);
        }
        let (_, remainder) = streamer.finish();
        self.resume(remainder)?;
        Ok(data.freeze())
    }

    /// Starts streaming the literal whose marker was just consumed.
    ///
    /// After the stream is finished the caller must hand its remainder to
    /// [`resume`](Self::resume).
    pub fn literal(&mut self, transfer: LiteralTransfer) -> LiteralStreamer<'_> {
        self.pending_literal = None;
        LiteralStreamer::new(&mut *self.source, transfer)
    }

    /// Continues tokenizing after a literal.
    ///
    /// Bytes that followed the literal on its last line are the rest of the
    /// logical line. If the literal ended exactly at a line boundary, the
    /// next transport line continues it.
    pub fn resume(&mut self, remainder: Option<Bytes>) -> Result<()> {
        match remainder {
            Some(rest) if !rest.is_empty() => {
                self.lexer.reset(rest);
                Ok(())
            }
            _ => {
                let line = self.source.next_line()?;
                self.lexer.reset(line);
                Ok(())
            }
        }
    }

    fn drain_literal(&mut self, size: u32) -> Result<()> {
        let mut streamer = self.literal(LiteralTransfer::new(size));
        for piece in &mut streamer {
            piece?;
        }
        let (_, remainder) = streamer.finish();
        self.resume(remainder)
    }

    /// Discards the rest of the logical line, including any literals on it.
    pub fn skip_to_end_of_line(&mut self) -> Result<()> {
        if let Some(size) = self.pending_literal.take() {
            self.drain_literal(size)?;
        }
        loop {
            let rest = self.lexer.take_remaining();
            match trailing_literal_length(&rest) {
                Some(size) => self.drain_literal(size)?,
                None => return Ok(()),
            }
        }
    }

    /// Consumes tokens until `depth` open parentheses are closed.
    ///
    /// Used to leave a malformed parenthesized production balanced.
    pub fn skip_to_close_paren(&mut self, mut depth: usize) -> Result<()> {
        if let Some(size) = self.pending_literal.take() {
            self.drain_literal(size)?;
        }
        while depth > 0 {
            match self.advance()? {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Literal(size) => {
                    self.pending_literal = None;
                    self.drain_literal(size)?;
                }
                Token::Eol => return Err(self.syntax("unbalanced parentheses")),
                _ => {}
            }
        }
        Ok(())
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
    use crate::source::BufferedLines;

    #[test]
    fn test_astring_forms() {
        let mut source = BufferedLines::from("INBOX \"Sent Items\" 42 {5}\r\nDraft NIL\r\n");
        let mut cursor = TokenCursor::new(&mut source, 1024);
        cursor.load_next_line().unwrap();

        assert_eq!(cursor.read_astring().unwrap(), "INBOX");
        assert_eq!(cursor.read_astring().unwrap(), "Sent Items");
        assert_eq!(cursor.read_astring().unwrap(), "42");
        assert_eq!(cursor.read_astring().unwrap(), "Draft");
        assert_eq!(cursor.read_nstring().unwrap(), None);
        assert_eq!(cursor.advance().unwrap(), Token::Eol);
    }

    #[test]
    fn test_literal_limit() {
        let mut source = BufferedLines::from("{100}\r\n");
        let mut cursor = TokenCursor::new(&mut source, 10);
        cursor.load_next_line().unwrap();
        let err = cursor.read_astring().unwrap_err();
        assert!(matches!(err, Error::LiteralTooLarge { size: 100, limit: 10 }));
    }

    #[test]
    fn test_skip_to_end_of_line_drains_literal() {
        let mut source = BufferedLines::from("* 1 FETCH (BODY[] {7}\r\nA1 OK x)\r\nA1 OK done\r\n");
        let mut cursor = TokenCursor::new(&mut source, 1024);
        cursor.load_next_line().unwrap();
        cursor.advance().unwrap();
        cursor.skip_to_end_of_line().unwrap();

        cursor.load_next_line().unwrap();
        assert_eq!(cursor.advance().unwrap(), Token::Atom("A1".into()));
        assert_eq!(cursor.rest_of_line(), "OK done");
    }

    #[test]
    fn test_skip_after_consumed_marker() {
        let mut source = BufferedLines::from("* X {3}\r\nabc\r\n* OK\r\n");
        let mut cursor = TokenCursor::new(&mut source, 1024);
        cursor.load_next_line().unwrap();
        cursor.advance().unwrap();
        cursor.advance().unwrap();
        assert_eq!(cursor.advance().unwrap(), Token::Literal(3));
        cursor.skip_to_end_of_line().unwrap();

        cursor.load_next_line().unwrap();
        assert_eq!(cursor.advance().unwrap(), Token::Asterisk);
    }

    #[test]
    fn test_skip_to_close_paren() {
        let mut source = BufferedLines::from("a (b {2}\r\n()) c) d\r\n");
        let mut cursor = TokenCursor::new(&mut source, 1024);
        cursor.load_next_line().unwrap();
        cursor.skip_to_close_paren(1).unwrap();
        assert_eq!(cursor.advance().unwrap(), Token::Atom("d".into()));
    }

    #[test]
    fn test_skip_to_close_paren_unbalanced() {
        let mut source = BufferedLines::from("a (b\r\n");
        let mut cursor = TokenCursor::new(&mut source, 1024);
        cursor.load_next_line().unwrap();
        assert!(matches!(
            cursor.skip_to_close_paren(1),
            Err(Error::Syntax(_))
        ));
    }
}
