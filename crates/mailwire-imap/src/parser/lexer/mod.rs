//! IMAP lexer for tokenizing server response lines.
//!
//! The lexer works on one transport line at a time. Spaces separate tokens
//! and are never returned. A `{n}` literal marker is returned as
//! [`Token::Literal`]; reading the octets that follow is the caller's job,
//! after which the lexer is [`reset`](Lexer::reset) onto whatever is left.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use bytes::Bytes;

use crate::error::SyntaxError;

/// IMAP lexer state for a single line.
#[derive(Debug, Clone, Default)]
pub struct Lexer {
    line: Bytes,
    pos: usize,
}

impl Lexer {
    /// Creates a new lexer for the given line.
    #[must_use]
    pub fn new(line: impl Into<Bytes>) -> Self {
        Self {
            line: line.into(),
            pos: 0,
        }
    }

    /// Replaces the current line and rewinds to its start.
    pub fn reset(&mut self, line: Bytes) {
        self.line = line;
        self.pos = 0;
    }

    /// Returns the current position in the line.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unconsumed part of the line.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.line[self.pos.min(self.line.len())..]
    }

    /// Returns true if only whitespace and the line terminator remain.
    #[must_use]
    pub fn at_end_of_line(&self) -> bool {
        self.remaining()
            .iter()
            .all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_spaces();

        let Some(byte) = self.peek() else {
            return Ok(Token::Eol);
        };

        match byte {
            b'\r' | b'\n' => {
                self.pos = self.line.len();
                Ok(Token::Eol)
            }
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'*' => self.single(Token::Asterisk),
            b'+' if self.peek_at(1).is_none_or(|b| matches!(b, b' ' | b'\r' | b'\n')) => {
                self.single(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal_marker(),
            b'\\' if self.peek_at(1) == Some(b'*') => {
                self.pos += 2;
                Ok(Token::Atom("\\*".to_string()))
            }
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(format!("Unexpected character: {byte:#04x}"))),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token, SyntaxError> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Consumes and returns the rest of the line as text, without the terminator.
    pub fn rest_of_line(&mut self) -> String {
        self.skip_spaces();
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos = self.line.len();
        text
    }

    /// Consumes and returns the raw remainder of the line.
    pub fn take_remaining(&mut self) -> Bytes {
        let start = self.pos.min(self.line.len());
        self.pos = self.line.len();
        self.line.slice(start..)
    }

    fn peek(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.line.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn single(&mut self, token: Token) -> Result<Token, SyntaxError> {
        self.pos += 1;
        Ok(token)
    }

    /// Reads a quoted string token. IMAP forbids CR/LF inside quotes.
    fn read_quoted_string(&mut self) -> Result<Token, SyntaxError> {
        self.pos += 1;

        let mut result = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => {
                        return Err(self.error(format!("Invalid escape: \\{}", char::from(c))));
                    }
                    None => return Err(self.error("Unterminated quoted string")),
                },
                Some(b'\r' | b'\n') | None => {
                    return Err(self.error("Unterminated quoted string"));
                }
                Some(c) => result.push(c),
            }
        }

        Ok(Token::QuotedString(
            String::from_utf8_lossy(&result).into_owned(),
        ))
    }

    /// Reads a literal marker `{n}` or `{n+}`, which must end the line.
    fn read_literal_marker(&mut self) -> Result<Token, SyntaxError> {
        self.pos += 1;

        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let end = self.pos;
        if start == end {
            return Err(self.error("Invalid literal size"));
        }

        if self.peek() == Some(b'+') {
            self.pos += 1;
        }
        if self.bump() != Some(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if !self.at_end_of_line() {
            return Err(self.error("Literal marker must end the line"));
        }

        let size = std::str::from_utf8(&self.line[start..end])
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        let Some(size) = size else {
            return Err(self.error("Literal size out of range"));
        };

        self.pos = self.line.len();
        Ok(Token::Literal(size))
    }

    /// Reads an atom, number or NIL.
    ///
    /// A `[` inside an atom opens a section that runs to the matching `]`,
    /// spaces included, so `BODY[HEADER.FIELDS (FROM)]<0>` is one token.
    fn read_atom(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;

        while let Some(b) = self.peek() {
            if b == b'[' {
                self.skip_section()?;
            } else if is_atom_char(b) {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw = &self.line[start..self.pos];
        if raw.iter().all(u8::is_ascii_digit) {
            if let Some(n) = std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                return Ok(Token::Number(n));
            }
        }

        let text = String::from_utf8_lossy(raw).into_owned();
        if text.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(text))
        }
    }

    fn skip_section(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0usize;
        while let Some(b) = self.bump() {
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                b'\r' | b'\n' => break,
                _ => {}
            }
        }
        Err(self.error("Unterminated section in atom"))
    }

    /// Creates a syntax error at the current position.
    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.pos, message)
    }
}

/// Returns true if the byte may appear in an atom as sent by real servers.
///
/// Includes `\` (flags), `%` (mailbox names) and 8-bit bytes, which some
/// servers emit unquoted.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 |         // !
        0x23..=0x27 |  // # $ % & '
        0x2B..=0x5A |  // + , - . / 0-9 : ; < = > ? @ A-Z
        0x5C |         // \ (for flags like \Seen)
        0x5E..=0x7A |  // ^ _ ` a-z
        0x7C |         // |
        0x7E |         // ~
        0x80..=0xFF
    )
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

    fn atom(s: &str) -> Token {
        Token::Atom(s.to_string())
    }

    #[test]
    fn test_simple_tokens() {
        let mut lexer = Lexer::new(&b"* OK\r\n"[..]);

        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eol);
        assert_eq!(lexer.next_token().unwrap(), Token::Eol);
    }

    #[test]
    fn test_tagged_response() {
        let mut lexer = Lexer::new(&b"A001 OK LOGIN completed\r\n"[..]);

        assert_eq!(lexer.next_token().unwrap(), atom("A001"));
        assert_eq!(lexer.next_token().unwrap(), atom("OK"));
        assert_eq!(lexer.rest_of_line(), "LOGIN completed");
        assert!(lexer.at_end_of_line());
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new(&b"123 18446744073709551616 4a"[..]);

        assert_eq!(lexer.next_token().unwrap(), Token::Number(123));
        assert_eq!(
            lexer.next_token().unwrap(),
            atom("18446744073709551616")
        );
        assert_eq!(lexer.next_token().unwrap(), atom("4a"));
    }

    #[test]
    fn test_quoted_string_escaped() {
        let mut lexer = Lexer::new(&b"\"hello \\\"world\\\"\" \"a\\\\b\""[..]);

        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("hello \"world\"".to_string())
        );
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("a\\b".to_string())
        );
    }

    #[test]
    fn test_unterminated_quote_fails() {
        let mut lexer = Lexer::new(&b"\"no end\r\n"[..]);
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_nil() {
        let mut lexer = Lexer::new(&b"NIL nil Nil NILS"[..]);

        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), atom("NILS"));
    }

    #[test]
    fn test_parentheses_and_flags() {
        let mut lexer = Lexer::new(&b"(\\Seen \\Flagged \\*)"[..]);

        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), atom("\\Flagged"));
        assert_eq!(lexer.next_token().unwrap(), atom("\\*"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_brackets() {
        let mut lexer = Lexer::new(&b"[UIDNEXT 100]"[..]);

        assert_eq!(lexer.next_token().unwrap(), Token::LBracket);
        assert_eq!(lexer.next_token().unwrap(), atom("UIDNEXT"));
        assert_eq!(lexer.next_token().unwrap(), Token::Number(100));
        assert_eq!(lexer.next_token().unwrap(), Token::RBracket);
    }

    #[test]
    fn test_section_atom() {
        let mut lexer = Lexer::new(&b"BODY[HEADER.FIELDS (DATE FROM)]<0> {12}\r\n"[..]);

        assert_eq!(
            lexer.next_token().unwrap(),
            atom("BODY[HEADER.FIELDS (DATE FROM)]<0>")
        );
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(12));
        assert!(lexer.at_end_of_line());
    }

    #[test]
    fn test_literal_marker() {
        let mut lexer = Lexer::new(&b"{5}\r\n"[..]);
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(5));

        let mut lexer = Lexer::new(&b"{7+}\r\n"[..]);
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(7));
    }

    #[test]
    fn test_literal_marker_must_end_line() {
        let mut lexer = Lexer::new(&b"{5} trailing\r\n"[..]);
        assert!(lexer.next_token().is_err());

        let mut lexer = Lexer::new(&b"{abc}\r\n"[..]);
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_literal_marker_size_errors() {
        let mut lexer = Lexer::new(&b"{}\r\n"[..]);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("Invalid literal size"));

        let mut lexer = Lexer::new(&b"{99999999999}\r\n"[..]);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("out of range"));

        let mut lexer = Lexer::new(&b"{12\r\n"[..]);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("Expected }"));
    }

    #[test]
    fn test_continuation_plus() {
        let mut lexer = Lexer::new(&b"+ idling\r\n"[..]);
        assert_eq!(lexer.next_token().unwrap(), Token::Plus);
        assert_eq!(lexer.rest_of_line(), "idling");

        let mut lexer = Lexer::new(&b"+FOO"[..]);
        assert_eq!(lexer.next_token().unwrap(), atom("+FOO"));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new(&b"FLAGS (x)"[..]);
        assert_eq!(lexer.peek_token().unwrap(), atom("FLAGS"));
        assert_eq!(lexer.next_token().unwrap(), atom("FLAGS"));
        assert_eq!(lexer.peek_token().unwrap(), Token::LParen);
    }

    #[test]
    fn test_take_remaining() {
        let mut lexer = Lexer::new(&b"A1 junk {3}\r\n"[..]);
        lexer.next_token().unwrap();
        assert_eq!(lexer.take_remaining(), &b" junk {3}\r\n"[..]);
        assert!(lexer.at_end_of_line());
    }

    #[test]
    fn test_atom_chars() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b'%'));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b']'));
        assert!(!is_atom_char(b'"'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'{'));
    }
}
