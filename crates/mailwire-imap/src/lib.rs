//! # mailwire-imap
//!
//! Client-side interpreter for IMAP4rev1 server responses.
//!
//! The crate does not send commands. Given the command a client just sent,
//! [`ResponseParser`] reads the server's answer from a [`LineSource`],
//! keeps the connection state (RFC 3501 section 3) and the selected
//! mailbox's flag table up to date, and reports structured results to a
//! [`MailboxObserver`]. Message bodies stream to a [`MessageSink`] while
//! their literal is still arriving.
//!
//! ## Features
//!
//! - **Streaming literals**: octet-counted, chunk-aware, CR-safe delivery
//! - **Body structure trees**: numbered parts ready for `BODY[<part>]`
//! - **Per-line recovery**: a malformed line is skipped, the response goes on
//! - **Server quirks**: glued Zimbra UIDs, Gmail labels, AOL sizes
//!
//! ## Quick Start
//!
//! ```
//! use mailwire_imap::source::BufferedLines;
//! use mailwire_imap::{CollectingHandler, CommandContext, ParserConfig, ResponseParser};
//!
//! let mut parser = ResponseParser::new(ParserConfig::new("imap.example.com"));
//! let mut observer = CollectingHandler::new();
//! let mut sink = CollectingHandler::new();
//!
//! let mut greeting = BufferedLines::from("* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n");
//! parser.parse_greeting(&mut greeting, &mut observer).unwrap();
//!
//! let cmd = CommandContext::parse("a1 LOGIN user secret").unwrap();
//! let mut reply = BufferedLines::from("a1 OK LOGIN completed\r\n");
//! let summary = parser
//!     .parse_response(&cmd, &mut reply, &mut observer, &mut sink)
//!     .unwrap();
//!
//! assert!(summary.succeeded());
//! assert!(parser.tracker().state().is_authenticated());
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │  NonAuthenticated   │ ─── LOGIN/AUTHENTICATE OK, PREAUTH ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── SELECT/EXAMINE OK ───→ MailboxSelected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   MailboxSelected   │ ─── CLOSE/UNSELECT OK ───→ Authenticated
//! └─────────────────────┘
//! ```
//!
//! LOGOUT, BYE and fatal errors return to NonAuthenticated from anywhere.
//!
//! ## Modules
//!
//! - [`parser`]: lexer, literal streaming, body structures and the response state machine
//! - [`flag_state`]: per-message flag and UID bookkeeping
//! - [`mailbox_spec`]: mailbox snapshots from SELECT, LIST and STATUS
//! - [`protocol`]: connection state tracking
//! - [`handler`]: observer, sink and namespace traits
//! - [`cache`]: body structure cache
//! - [`connection`]: async framing that feeds the parser
//! - [`types`]: core IMAP value types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod flag_state;
pub mod handler;
pub mod mailbox_spec;
pub mod parser;
pub mod protocol;
pub mod source;
pub mod types;

pub use cache::{BodyStructureCache, ShellKey};
pub use command::{CommandContext, CommandKind};
pub use config::{ParserConfig, ParserConfigBuilder};
pub use connection::{FramedStream, ResponseAccumulator};
pub use error::{Error, ErrorKind, Result, SyntaxError};
pub use flag_state::{FetchExpectations, FlagAndUidState, MessageFetchRecord};
pub use handler::{
    CollectingHandler, LoggingHandler, MailboxObserver, MessageSink, NamespaceRegistry,
    NoNamespaces, NoopHandler, ObservedEvent, StaticNamespaces,
};
pub use mailbox_spec::{MailboxSpec, MailboxSpecBuilder};
pub use parser::{
    BodyPart, BodyPartKind, BodyStructureBuilder, Completion, Greeting, LeafPart,
    ResponseParser, ResponseSummary,
};
pub use protocol::{ConnectionState, ConnectionStateTracker};
pub use source::{BufferedLines, LineSource, ReaderLines, ScriptedLines, TransportError};
pub use types::{
    BoxFlags, Capabilities, Envelope, Flag, MailboxMetadata, MessageFlags, ResponseCode, SeqNum,
    Status, Tag, Uid, UidValidity,
};

/// IMAP protocol version interpreted.
pub const IMAP_VERSION: &str = "IMAP4rev1";
