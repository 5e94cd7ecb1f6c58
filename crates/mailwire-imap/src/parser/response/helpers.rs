//! Parser helper functions.
//!
//! Each function parses one production from the cursor and returns plain
//! data; applying it to connection state is the response parser's job.

use crate::parser::cursor::TokenCursor;
use crate::parser::lexer::Token;
use crate::types::{
    BoxFlags, Capabilities, Flag, Namespace, NamespaceType, QuotaResource, ResponseCode,
    StatusCounts, Uid, UidValidity,
};
use crate::Result;

/// Parses optional `[code]` and the human readable text after it.
pub fn parse_resp_text(cursor: &mut TokenCursor<'_>) -> Result<(Option<ResponseCode>, String)> {
    // Free text may not tokenize, so a lexing failure here just means no code.
    let code = if matches!(cursor.peek(), Ok(Token::LBracket)) {
        cursor.advance()?;
        Some(parse_response_code(cursor)?)
    } else {
        None
    };
    Ok((code, cursor.rest_of_line()))
}

/// Parses the resp-text of a BYE line.
///
/// A BYE ends the connection whatever follows it, so a malformed code
/// falls back to the raw remainder of the line as the text.
pub fn parse_bye_text(cursor: &mut TokenCursor<'_>) -> Result<(Option<ResponseCode>, String)> {
    let raw = cursor.peek_rest_of_line();
    match parse_resp_text(cursor) {
        Ok(parsed) => Ok(parsed),
        Err(err) if err.is_fatal() => Err(err),
        Err(_) => {
            cursor.rest_of_line();
            Ok((None, raw))
        }
    }
}

/// Parses a response code after its `[`, through the closing `]`.
pub fn parse_response_code(cursor: &mut TokenCursor<'_>) -> Result<ResponseCode> {
    let name = match cursor.advance()? {
        Token::Atom(name) => name,
        other => return Err(cursor.syntax(format!("expected response code, found {other}"))),
    };

    let code = match name.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "UIDNEXT" => ResponseCode::UidNext(read_uid(cursor)?),
        "UIDVALIDITY" => ResponseCode::UidValidity(read_uid_validity(cursor)?),
        "UNSEEN" => ResponseCode::Unseen(cursor.read_u32()?),
        "HIGHESTMODSEQ" => ResponseCode::HighestModSeq(cursor.read_number()?),
        "PERMANENTFLAGS" => ResponseCode::PermanentFlags(parse_flag_list(cursor)?),
        "CAPABILITY" => {
            let mut tokens = Vec::new();
            loop {
                match cursor.peek()? {
                    Token::RBracket | Token::Eol => break,
                    _ => {
                        if let Some(text) = cursor.advance()?.text() {
                            tokens.push(text.into_owned());
                        }
                    }
                }
            }
            ResponseCode::Capability(Capabilities::from_tokens(tokens.iter().map(String::as_str)))
        }
        "APPENDUID" => ResponseCode::AppendUid {
            uid_validity: read_uid_validity(cursor)?,
            uid: read_uid(cursor)?,
        },
        "COPYUID" => ResponseCode::CopyUid {
            uid_validity: read_uid_validity(cursor)?,
            source: cursor.read_astring()?,
            destination: cursor.read_astring()?,
        },
        "MYRIGHTS" => ResponseCode::MyRights(cursor.read_astring()?),
        _ => ResponseCode::Unknown(name),
    };

    // Skip whatever the code carries up to the closing bracket.
    loop {
        match cursor.advance()? {
            Token::RBracket => break,
            Token::Eol => return Err(cursor.syntax("unterminated response code")),
            Token::Literal(size) => {
                cursor.read_literal_bytes(size)?;
            }
            _ => {}
        }
    }

    Ok(code)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(cursor: &mut TokenCursor<'_>) -> Result<Vec<Flag>> {
    cursor.expect(&Token::LParen)?;

    let mut flags = Vec::new();
    loop {
        match cursor.advance()? {
            Token::RParen => break,
            Token::Atom(s) | Token::QuotedString(s) => flags.push(Flag::parse(&s)),
            token => {
                return Err(cursor.syntax(format!("Unexpected token in flag list: {token}")));
            }
        }
    }

    Ok(flags)
}

/// Parses capability data up to the end of the line.
pub fn parse_capability_data(cursor: &mut TokenCursor<'_>) -> Result<Capabilities> {
    let mut tokens = Vec::new();
    loop {
        match cursor.advance()? {
            Token::Eol => break,
            token => {
                if let Some(text) = token.text() {
                    tokens.push(text.into_owned());
                }
            }
        }
    }
    Ok(Capabilities::from_tokens(tokens.iter().map(String::as_str)))
}

/// One LIST, LSUB or XLIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Attribute bits.
    pub attributes: BoxFlags,
    /// Hierarchy delimiter, `None` for NIL.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub name: String,
}

/// Parses `(attributes) delimiter name`.
pub fn parse_list_response(cursor: &mut TokenCursor<'_>) -> Result<ListEntry> {
    cursor.expect(&Token::LParen)?;
    let mut attributes = BoxFlags::empty();
    loop {
        match cursor.advance()? {
            Token::RParen => break,
            Token::Atom(s) => {
                if let Some(bit) = BoxFlags::for_attribute(&s) {
                    attributes |= bit;
                }
            }
            token => {
                return Err(cursor.syntax(format!("Unexpected token in LIST attributes: {token}")));
            }
        }
    }

    let delimiter = match cursor.advance()? {
        Token::Nil => None,
        Token::QuotedString(s) | Token::Atom(s) => s.chars().next(),
        token => return Err(cursor.syntax(format!("Expected delimiter, got {token}"))),
    };

    let name = cursor.read_astring()?;

    Ok(ListEntry {
        attributes,
        delimiter,
        name,
    })
}

/// Parses `name (item value ...)` of a STATUS response.
pub fn parse_status_response(cursor: &mut TokenCursor<'_>) -> Result<(String, StatusCounts)> {
    let name = cursor.read_astring()?;
    cursor.expect(&Token::LParen)?;

    let mut counts = StatusCounts::default();
    loop {
        match cursor.advance()? {
            Token::RParen => break,
            Token::Atom(item) => {
                let value = cursor.read_number()?;
                let small = u32::try_from(value).ok();
                match item.to_ascii_uppercase().as_str() {
                    "MESSAGES" => counts.messages = small,
                    "RECENT" => counts.recent = small,
                    "UIDNEXT" => counts.uid_next = Uid::from_wire(value),
                    "UIDVALIDITY" => counts.uid_validity = UidValidity::from_wire(value),
                    "UNSEEN" => counts.unseen = small,
                    "HIGHESTMODSEQ" => counts.highest_mod_seq = Some(value),
                    _ => tracing::trace!(item, value, "ignoring STATUS item"),
                }
            }
            token => return Err(cursor.syntax(format!("Unexpected token in STATUS: {token}"))),
        }
    }

    Ok((name, counts))
}

/// Parses SEARCH hits, tolerating a trailing `(MODSEQ n)`.
pub fn parse_search_response(cursor: &mut TokenCursor<'_>) -> Result<Vec<u32>> {
    let mut hits = Vec::new();
    loop {
        match cursor.advance()? {
            Token::Eol => break,
            Token::Number(n) => {
                let hit = u32::try_from(n).map_err(|_| cursor.syntax("search hit out of range"))?;
                hits.push(hit);
            }
            Token::LParen => {
                cursor.expect_keyword("MODSEQ")?;
                cursor.read_number()?;
                cursor.expect(&Token::RParen)?;
            }
            token => return Err(cursor.syntax(format!("Unexpected token in SEARCH: {token}"))),
        }
    }
    Ok(hits)
}

/// Parses the three namespace groups of a NAMESPACE response.
pub fn parse_namespace_response(cursor: &mut TokenCursor<'_>) -> Result<Vec<Namespace>> {
    let mut namespaces = Vec::new();
    for kind in [
        NamespaceType::Personal,
        NamespaceType::OtherUsers,
        NamespaceType::Public,
    ] {
        match cursor.advance()? {
            Token::Nil => {}
            Token::LParen => {
                while !cursor.eat(&Token::RParen)? {
                    cursor.expect(&Token::LParen)?;
                    let prefix = cursor.read_astring()?;
                    let delimiter = match cursor.advance()? {
                        Token::QuotedString(s) => s.chars().next(),
                        Token::Nil => None,
                        token => {
                            return Err(cursor.syntax(format!("Expected delimiter, got {token}")));
                        }
                    };
                    // Namespace response extensions.
                    cursor.skip_to_close_paren(1)?;
                    namespaces.push(Namespace {
                        kind,
                        prefix,
                        delimiter,
                    });
                }
            }
            token => return Err(cursor.syntax(format!("Expected namespace list, got {token}"))),
        }
    }
    Ok(namespaces)
}

/// Parses `root (name usage limit ...)` of a QUOTA response.
pub fn parse_quota_response(cursor: &mut TokenCursor<'_>) -> Result<(String, Vec<QuotaResource>)> {
    let root = cursor.read_astring()?;
    cursor.expect(&Token::LParen)?;
    let mut resources = Vec::new();
    while !cursor.eat(&Token::RParen)? {
        let name = cursor.read_astring()?;
        let usage = cursor.read_number()?;
        let limit = cursor.read_number()?;
        resources.push(QuotaResource { name, usage, limit });
    }
    Ok((root, resources))
}

/// Parses the astrings remaining on the line.
pub fn parse_astrings_to_end(cursor: &mut TokenCursor<'_>) -> Result<Vec<String>> {
    let mut values = Vec::new();
    while cursor.peek()? != Token::Eol {
        values.push(cursor.read_astring()?);
    }
    Ok(values)
}

/// Parses an ID parameter list, or NIL.
pub fn parse_id_response(cursor: &mut TokenCursor<'_>) -> Result<Vec<(String, Option<String>)>> {
    match cursor.advance()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut params = Vec::new();
            while !cursor.eat(&Token::RParen)? {
                let key = cursor.read_astring()?;
                let value = cursor.read_nstring()?;
                params.push((key, value));
            }
            Ok(params)
        }
        token => Err(cursor.syntax(format!("Expected ID parameters, got {token}"))),
    }
}

/// Reads a non-zero UID.
pub fn read_uid(cursor: &mut TokenCursor<'_>) -> Result<Uid> {
    let n = cursor.read_number()?;
    Uid::from_wire(n).ok_or_else(|| cursor.syntax(format!("invalid UID value: {n}")))
}

fn read_uid_validity(cursor: &mut TokenCursor<'_>) -> Result<UidValidity> {
    let n = cursor.read_number()?;
    UidValidity::from_wire(n).ok_or_else(|| cursor.syntax(format!("invalid UIDVALIDITY: {n}")))
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

    fn with_cursor<T>(input: &str, f: impl FnOnce(&mut TokenCursor<'_>) -> T) -> T {
        let mut source = BufferedLines::from(input);
        let mut cursor = TokenCursor::new(&mut source, 1 << 20);
        cursor.load_next_line().unwrap();
        f(&mut cursor)
    }

    #[test]
    fn test_parse_response_code() {
        let (code, text) = with_cursor("[UIDVALIDITY 1234567890] UIDs valid\r\n", |c| {
            parse_resp_text(c).unwrap()
        });
        assert_eq!(
            code,
            Some(ResponseCode::UidValidity(UidValidity::new(1_234_567_890).unwrap()))
        );
        assert_eq!(text, "UIDs valid");
    }

    #[test]
    fn test_resp_text_without_code() {
        let (code, text) = with_cursor("\"odd\" text\r\n", |c| parse_resp_text(c).unwrap());
        assert!(code.is_none());
        assert_eq!(text, "\"odd\" text");
    }

    #[test]
    fn test_permanent_flags_code() {
        let (code, _) = with_cursor("[PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n", |c| {
            parse_resp_text(c).unwrap()
        });
        assert_eq!(
            code,
            Some(ResponseCode::PermanentFlags(vec![
                Flag::Deleted,
                Flag::Seen,
                Flag::Wildcard
            ]))
        );
    }

    #[test]
    fn test_capability_code_cut_at_bracket() {
        let (code, text) = with_cursor("[CAPABILITY IMAP4rev1 IDLE] ready\r\n", |c| {
            parse_resp_text(c).unwrap()
        });
        let Some(ResponseCode::Capability(caps)) = code else {
            panic!("expected capability code");
        };
        assert!(caps.contains(Capabilities::IDLE | Capabilities::IMAP4REV1));
        assert_eq!(text, "ready");
    }

    #[test]
    fn test_unknown_code_skipped() {
        let (code, text) = with_cursor("[X-FOO 1 (2 3)] hi\r\n", |c| parse_resp_text(c).unwrap());
        assert_eq!(code, Some(ResponseCode::Unknown("X-FOO".into())));
        assert_eq!(text, "hi");
    }

    #[test]
    fn test_copyuid_code() {
        let (code, _) = with_cursor("[COPYUID 38505 304,319:320 3956:3958] Done\r\n", |c| {
            parse_resp_text(c).unwrap()
        });
        assert_eq!(
            code,
            Some(ResponseCode::CopyUid {
                uid_validity: UidValidity::new(38505).unwrap(),
                source: "304,319:320".into(),
                destination: "3956:3958".into(),
            })
        );
    }

    #[test]
    fn test_unterminated_code_fails() {
        let result = with_cursor("[ALERT oops\r\n", parse_resp_text);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_list() {
        let entry = with_cursor("(\\HasChildren \\Sent) \"/\" \"Sent Items\"\r\n", |c| {
            parse_list_response(c).unwrap()
        });
        assert_eq!(entry.attributes, BoxFlags::HAS_CHILDREN | BoxFlags::SENT);
        assert_eq!(entry.delimiter, Some('/'));
        assert_eq!(entry.name, "Sent Items");
    }

    #[test]
    fn test_parse_list_literal_name() {
        let entry = with_cursor("() NIL {4}\r\nTest\r\n", |c| parse_list_response(c).unwrap());
        assert_eq!(entry.delimiter, None);
        assert_eq!(entry.name, "Test");
    }

    #[test]
    fn test_parse_status() {
        let (name, counts) = with_cursor(
            "blurdybloop (MESSAGES 231 UIDNEXT 44292 HIGHESTMODSEQ 7011231777)\r\n",
            |c| parse_status_response(c).unwrap(),
        );
        assert_eq!(name, "blurdybloop");
        assert_eq!(counts.messages, Some(231));
        assert_eq!(counts.uid_next, Uid::new(44292));
        assert_eq!(counts.highest_mod_seq, Some(7011231777));
    }

    #[test]
    fn test_parse_search_with_modseq() {
        let hits = with_cursor("2 5 8 (MODSEQ 917162500)\r\n", |c| {
            parse_search_response(c).unwrap()
        });
        assert_eq!(hits, vec![2, 5, 8]);
    }

    #[test]
    fn test_parse_namespace() {
        let namespaces = with_cursor(
            "((\"\" \"/\")) ((\"~\" \"/\")) ((\"#shared/\" \"/\" \"X-PARAM\" (\"FLAG1\")))\r\n",
            |c| parse_namespace_response(c).unwrap(),
        );
        assert_eq!(namespaces.len(), 3);
        assert_eq!(namespaces[0].kind, NamespaceType::Personal);
        assert_eq!(namespaces[1].prefix, "~");
        assert_eq!(namespaces[2].kind, NamespaceType::Public);
        assert_eq!(namespaces[2].delimiter, Some('/'));
    }

    #[test]
    fn test_parse_namespace_nil_groups() {
        let namespaces = with_cursor("((\"INBOX.\" \".\")) NIL NIL\r\n", |c| {
            parse_namespace_response(c).unwrap()
        });
        assert_eq!(namespaces.len(), 1);
        assert_eq!(namespaces[0].prefix, "INBOX.");
    }

    #[test]
    fn test_parse_quota() {
        let (root, resources) = with_cursor("\"\" (STORAGE 10 512 MESSAGE 3 100)\r\n", |c| {
            parse_quota_response(c).unwrap()
        });
        assert_eq!(root, "");
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1].name, "MESSAGE");
        assert_eq!(resources[1].limit, 100);
    }

    #[test]
    fn test_parse_id() {
        let params = with_cursor("(\"name\" \"Cyrus\" \"support-url\" NIL)\r\n", |c| {
            parse_id_response(c).unwrap()
        });
        assert_eq!(
            params,
            vec![
                ("name".to_string(), Some("Cyrus".to_string())),
                ("support-url".to_string(), None)
            ]
        );
    }
}
