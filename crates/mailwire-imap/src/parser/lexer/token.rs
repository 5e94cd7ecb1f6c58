//! IMAP token types.

use std::borrow::Cow;

/// Token types produced by the lexer.
///
/// Tokens own their text because a logical response line can span several
/// transport lines once literals are involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Atom (unquoted string without special characters).
    Atom(String),
    /// Quoted string, unescaped.
    QuotedString(String),
    /// Literal marker `{n}`; the `n` octets follow on the next line.
    Literal(u32),
    /// Number.
    Number(u64),
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Asterisk (untagged response prefix).
    Asterisk,
    /// Plus (continuation response prefix).
    Plus,
    /// NIL.
    Nil,
    /// End of the current line.
    Eol,
}

impl Token {
    /// Returns the textual value of atoms, quoted strings and numbers.
    #[must_use]
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Atom(s) | Self::QuotedString(s) => Some(Cow::Borrowed(s)),
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    /// Returns true if this is an atom equal to `keyword`, ignoring case.
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Atom(s) if s.eq_ignore_ascii_case(keyword))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atom(s) => write!(f, "{s}"),
            Self::QuotedString(s) => write!(f, "{s:?}"),
            Self::Literal(n) => write!(f, "{{{n}}}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBracket => f.write_str("["),
            Self::RBracket => f.write_str("]"),
            Self::Asterisk => f.write_str("*"),
            Self::Plus => f.write_str("+"),
            Self::Nil => f.write_str("NIL"),
            Self::Eol => f.write_str("end of line"),
        }
    }
}
