//! IMAP response parser.
//!
//! The parser is pull-based: it asks a [`LineSource`](crate::source::LineSource)
//! for lines as the grammar needs them, so literals of any size pass
//! through without being buffered whole.
//!
//! # Architecture
//!
//! - **Lexer**: splits one transport line into IMAP tokens
//! - **Token cursor**: lexer plus line source, shared by all productions
//! - **Literal streamer**: hands out the octets of a `{n}` literal piece by piece
//! - **Body structure builder**: turns BODYSTRUCTURE into a numbered part tree
//! - **Response parser**: the per-connection state machine on top
//!
//! # Example
//!
//! ```
//! use mailwire_imap::{CommandContext, NoopHandler, ParserConfig, ResponseParser};
//! use mailwire_imap::source::BufferedLines;
//!
//! let mut parser = ResponseParser::new(ParserConfig::new("imap.example.com"));
//! let cmd = CommandContext::parse("a1 NOOP").unwrap();
//! let mut source = BufferedLines::from("* 3 EXISTS\r\na1 OK NOOP completed\r\n");
//!
//! let summary = parser
//!     .parse_response(&cmd, &mut source, &mut NoopHandler, &mut NoopHandler)
//!     .unwrap();
//! assert!(summary.succeeded());
//! ```

pub mod bodystructure;
pub mod cursor;
pub mod lexer;
pub mod literal;
pub mod response;

pub use bodystructure::{BodyPart, BodyPartKind, BodyStructureBuilder, LeafPart};
pub use cursor::TokenCursor;
pub use lexer::{Lexer, Token};
pub use literal::{LiteralStreamer, LiteralTransfer, trailing_literal_length};
pub use response::{Completion, Greeting, ResponseParser, ResponseSummary};
