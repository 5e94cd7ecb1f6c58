//! BODYSTRUCTURE parsing.
//!
//! The production is recursive: a multipart body holds child bodies, and a
//! `message/rfc822` leaf holds the body of the embedded message. Every node
//! gets a dotted part number usable in `BODY[<part>]`.
//!
//! Numbering:
//! - a single leaf at the top is `1`;
//! - children of the top-level multipart are `1`, `2`, ...; a multipart
//!   child `3` numbers its own children `3.1`, `3.2`, ...;
//! - the body of a message embedded at `P` is `P.1` when it is a leaf; when
//!   it is a multipart its children are `P.1`, `P.2`, ...;
//! - a multipart that has no number of its own on the wire is named
//!   `TEXT` (top level) or `P.TEXT` (embedded at `P`).

use tracing::trace;

use super::cursor::TokenCursor;
use super::lexer::Token;
use crate::error::Result;

/// One node of a body structure tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    /// Dotted part number.
    pub part_number: String,
    /// What kind of node this is.
    pub kind: BodyPartKind,
}

/// Node variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPartKind {
    /// A single MIME part.
    Leaf(LeafPart),
    /// A multipart container.
    Multipart {
        /// Multipart subtype, for example `mixed`.
        subtype: String,
        /// `boundary` parameter, if present.
        boundary: Option<String>,
        /// Child parts in wire order.
        children: Vec<BodyPart>,
    },
    /// A `message/rfc822` part and the body of the message it carries.
    EmbeddedMessage {
        /// Fields of the `message/rfc822` part itself.
        header: LeafPart,
        /// Body of the embedded message.
        body: Box<BodyPart>,
    },
}

/// Fields of a single MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPart {
    /// Media type, lowercased.
    pub media_type: String,
    /// Media subtype, lowercased.
    pub subtype: String,
    /// Content-ID.
    pub content_id: Option<String>,
    /// Content-Description.
    pub description: Option<String>,
    /// Content-Transfer-Encoding.
    pub encoding: String,
    /// Size in octets.
    pub octet_size: u32,
}

impl LeafPart {
    /// Returns `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.subtype)
    }
}

impl BodyPart {
    /// Returns true for a multipart container.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.kind, BodyPartKind::Multipart { .. })
    }

    /// Finds the node with the given part number.
    #[must_use]
    pub fn find(&self, part_number: &str) -> Option<&Self> {
        self.iter().find(|part| part.part_number == part_number)
    }

    /// Iterates over the tree depth-first, parents before children.
    #[must_use]
    pub fn iter(&self) -> Parts<'_> {
        Parts { stack: vec![self] }
    }
}

/// Depth-first iterator over a body structure tree.
#[derive(Debug)]
pub struct Parts<'a> {
    stack: Vec<&'a BodyPart>,
}

impl<'a> Iterator for Parts<'a> {
    type Item = &'a BodyPart;

    fn next(&mut self) -> Option<Self::Item> {
        let part = self.stack.pop()?;
        match &part.kind {
            BodyPartKind::Leaf(_) => {}
            BodyPartKind::Multipart { children, .. } => self.stack.extend(children.iter().rev()),
            BodyPartKind::EmbeddedMessage { body, .. } => self.stack.push(body),
        }
        Some(part)
    }
}

/// Where a body sits in the tree; decides its part number.
#[derive(Debug, Clone)]
struct Slot {
    leaf_number: String,
    multipart_number: String,
    child_prefix: String,
}

impl Slot {
    fn top_level() -> Self {
        Self {
            leaf_number: "1".to_string(),
            multipart_number: "TEXT".to_string(),
            child_prefix: String::new(),
        }
    }

    fn child(prefix: &str, index: usize) -> Self {
        let number = join(prefix, &index.to_string());
        Self {
            leaf_number: number.clone(),
            multipart_number: number.clone(),
            child_prefix: number,
        }
    }

    fn embedded(parent: &str) -> Self {
        Self {
            leaf_number: join(parent, "1"),
            multipart_number: join(parent, "TEXT"),
            child_prefix: parent.to_string(),
        }
    }
}

fn join(prefix: &str, part: &str) -> String {
    if prefix.is_empty() {
        part.to_string()
    } else {
        format!("{prefix}.{part}")
    }
}

/// Recursive BODYSTRUCTURE parser.
#[derive(Debug, Clone, Copy)]
pub struct BodyStructureBuilder {
    max_depth: usize,
}

impl Default for BodyStructureBuilder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BodyStructureBuilder {
    /// Creates a builder that rejects nesting deeper than `max_depth`.
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Parses one `body` production starting at its opening parenthesis.
    ///
    /// # Errors
    ///
    /// Returns a syntax error for malformed input. In that case the tokens
    /// have been consumed through the matching close parenthesis whenever
    /// the line allowed it. Literal and transport failures are returned
    /// as they are.
    pub fn parse(&self, cursor: &mut TokenCursor<'_>) -> Result<BodyPart> {
        self.parse_body(cursor, &Slot::top_level(), 0)
    }

    fn parse_body(
        &self,
        cursor: &mut TokenCursor<'_>,
        slot: &Slot,
        depth: usize,
    ) -> Result<BodyPart> {
        cursor.expect(&Token::LParen)?;
        let level = cursor.paren_depth();

        let result = if depth >= self.max_depth {
            Err(cursor.syntax("body structure nested too deeply"))
        } else if cursor.peek()? == Token::LParen {
            self.parse_multipart(cursor, slot, depth)
        } else {
            self.parse_single(cursor, slot, depth)
        };

        match result {
            Err(err) if !err.is_fatal() => {
                let open = cursor.paren_depth().saturating_sub(level) + 1;
                trace!(open, error = %err, "resynchronising body structure");
                cursor.skip_to_close_paren(open)?;
                Err(err)
            }
            other => other,
        }
    }

    fn parse_multipart(
        &self,
        cursor: &mut TokenCursor<'_>,
        slot: &Slot,
        depth: usize,
    ) -> Result<BodyPart> {
        let mut children = Vec::new();
        while cursor.peek()? == Token::LParen {
            let child = Slot::child(&slot.child_prefix, children.len() + 1);
            children.push(self.parse_body(cursor, &child, depth + 1)?);
        }

        let subtype = cursor.read_astring()?.to_ascii_lowercase();
        let boundary = if cursor.peek()? == Token::RParen {
            None
        } else {
            find_param(&read_params(cursor)?, "boundary")
        };
        cursor.skip_to_close_paren(1)?;

        Ok(BodyPart {
            part_number: slot.multipart_number.clone(),
            kind: BodyPartKind::Multipart {
                subtype,
                boundary,
                children,
            },
        })
    }

    fn parse_single(
        &self,
        cursor: &mut TokenCursor<'_>,
        slot: &Slot,
        depth: usize,
    ) -> Result<BodyPart> {
        let media_type = cursor.read_astring()?.to_ascii_lowercase();
        let subtype = cursor.read_astring()?.to_ascii_lowercase();
        read_params(cursor)?;
        let content_id = cursor.read_nstring()?;
        let description = cursor.read_nstring()?;
        let encoding = cursor
            .read_nstring()?
            .unwrap_or_else(|| "7BIT".to_string());
        let octet_size = cursor.read_u32()?;

        let header = LeafPart {
            media_type,
            subtype,
            content_id,
            description,
            encoding,
            octet_size,
        };
        let part_number = slot.leaf_number.clone();

        // Some servers send message/rfc822 without envelope and body.
        let embedded = header.media_type == "message"
            && header.subtype == "rfc822"
            && cursor.peek()? != Token::RParen;

        let kind = if embedded {
            skip_envelope(cursor)?;
            let body = self.parse_body(cursor, &Slot::embedded(&part_number), depth + 1)?;
            BodyPartKind::EmbeddedMessage {
                header,
                body: Box::new(body),
            }
        } else {
            BodyPartKind::Leaf(header)
        };

        // Line count, MD5, disposition, language, location.
        cursor.skip_to_close_paren(1)?;

        Ok(BodyPart { part_number, kind })
    }
}

/// Reads `NIL` or a parenthesized list of key/value pairs.
fn read_params(cursor: &mut TokenCursor<'_>) -> Result<Vec<(String, String)>> {
    match cursor.advance()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut params = Vec::new();
            while !cursor.eat(&Token::RParen)? {
                let key = cursor.read_astring()?;
                let value = cursor.read_nstring()?.unwrap_or_default();
                params.push((key, value));
            }
            Ok(params)
        }
        other => Err(cursor.syntax(format!("expected body parameters, found {other}"))),
    }
}

fn find_param(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn skip_envelope(cursor: &mut TokenCursor<'_>) -> Result<()> {
    match cursor.advance()? {
        Token::Nil => Ok(()),
        Token::LParen => cursor.skip_to_close_paren(1),
        other => Err(cursor.syntax(format!("expected envelope, found {other}"))),
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
    use crate::error::Error;
    use crate::source::BufferedLines;

    fn parse(input: &str) -> (Result<BodyPart>, String) {
        let mut source = BufferedLines::from(input);
        let mut cursor = TokenCursor::new(&mut source, 1 << 20);
        cursor.load_next_line().unwrap();
        let result = BodyStructureBuilder::default().parse(&mut cursor);
        let rest = cursor.rest_of_line();
        (result, rest)
    }

    fn numbers(part: &BodyPart) -> Vec<&str> {
        part.iter().map(|p| p.part_number.as_str()).collect()
    }

    const PLAIN: &str = r#"("TEXT" "PLAIN" ("CHARSET" "US-ASCII") NIL NIL "7BIT" 1152 23)"#;
    const HTML: &str = r#"("text" "html" ("charset" "utf-8") NIL NIL "quoted-printable" 400 10 NIL NIL NIL)"#;

    #[test]
    fn test_single_leaf() {
        let (part, rest) = parse(&format!("{PLAIN} UID 4)\r\n"));
        let part = part.unwrap();
        assert_eq!(part.part_number, "1");
        let BodyPartKind::Leaf(leaf) = &part.kind else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.mime_type(), "text/plain");
        assert_eq!(leaf.encoding, "7BIT");
        assert_eq!(leaf.octet_size, 1152);
        assert_eq!(rest, "UID 4)");
    }

    #[test]
    fn test_multipart_numbering() {
        let input = format!(
            r#"({PLAIN} {HTML} ({PLAIN} {HTML} "alternative") "mixed" ("boundary" "b1") NIL NIL)"#
        );
        let (part, _) = parse(&format!("{input}\r\n"));
        let part = part.unwrap();
        assert_eq!(numbers(&part), ["TEXT", "1", "2", "3", "3.1", "3.2"]);

        let BodyPartKind::Multipart {
            subtype, boundary, ..
        } = &part.kind
        else {
            panic!("expected multipart");
        };
        assert_eq!(subtype, "mixed");
        assert_eq!(boundary.as_deref(), Some("b1"));
        assert!(part.find("3").unwrap().is_multipart());
    }

    #[test]
    fn test_embedded_message() {
        let envelope = r#"("date" "subj" NIL NIL NIL NIL NIL NIL NIL "<id@x>")"#;
        let inner = format!(r#"({PLAIN} {HTML} "alternative")"#);
        let input = format!(
            r#"({PLAIN} ("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 2000 {envelope} {inner} 40) "mixed")"#
        );
        let (part, _) = parse(&format!("{input}\r\n"));
        let part = part.unwrap();
        assert_eq!(numbers(&part), ["TEXT", "1", "2", "2.TEXT", "2.1", "2.2"]);

        let BodyPartKind::EmbeddedMessage { header, body } = &part.find("2").unwrap().kind else {
            panic!("expected embedded message");
        };
        assert_eq!(header.mime_type(), "message/rfc822");
        assert!(body.is_multipart());
    }

    #[test]
    fn test_embedded_message_with_leaf_body() {
        let input = format!(r#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 900 NIL {PLAIN} 12)"#);
        let (part, _) = parse(&format!("{input}\r\n"));
        assert_eq!(numbers(&part.unwrap()), ["1", "1.1"]);
    }

    #[test]
    fn test_message_without_envelope_is_leaf() {
        let (part, _) = parse("(\"message\" \"rfc822\" NIL NIL NIL \"7bit\" 10)\r\n");
        assert!(matches!(part.unwrap().kind, BodyPartKind::Leaf(_)));
    }

    #[test]
    fn test_literal_inside_structure() {
        let input = "((\"text\" \"plain\" (\"name\" {5}\r\nhello) NIL NIL \"7bit\" 5 1) \"mixed\") FLAGS ()\r\n";
        let (part, rest) = parse(input);
        assert_eq!(numbers(&part.unwrap()), ["TEXT", "1"]);
        assert_eq!(rest, "FLAGS ()");
    }

    #[test]
    fn test_malformed_child_is_skipped_to_close_paren() {
        let input = format!(r#"({PLAIN} ("text" "plain" NIL NIL NIL "7bit" oops 3) "mixed") UID 9)"#);
        let (part, rest) = parse(&format!("{input}\r\n"));
        assert!(matches!(part, Err(Error::Syntax(_))));
        assert_eq!(rest, "UID 9)");
    }

    #[test]
    fn test_depth_limit() {
        let mut input = String::new();
        for _ in 0..5 {
            input.push('(');
        }
        input.push_str(PLAIN);
        input.push_str(r#" "mixed") "mixed") "mixed") "mixed") "mixed") UID 1)"#);

        let mut source = BufferedLines::from(format!("{input}\r\n").as_str());
        let mut cursor = TokenCursor::new(&mut source, 1 << 20);
        cursor.load_next_line().unwrap();
        let result = BodyStructureBuilder::new(3).parse(&mut cursor);
        assert!(matches!(result, Err(Error::Syntax(_))));
        assert_eq!(cursor.rest_of_line(), "UID 1)");
    }
}
