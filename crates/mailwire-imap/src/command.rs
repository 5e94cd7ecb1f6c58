//! What the client sent, as far as response parsing needs to know.
//!
//! The parser never builds commands. It only needs the tag to wait for, the
//! command name to drive state transitions, and a few arguments that change
//! how responses are read (which FETCH items were asked for, the chunk size
//! of a partial fetch, the mailbox being selected).

use std::fmt;

use crate::flag_state::FetchExpectations;
use crate::types::{Tag, Uid};

/// Command names the interpreter reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// LOGIN
    Login,
    /// AUTHENTICATE
    Authenticate,
    /// LOGOUT
    Logout,
    /// SELECT
    Select,
    /// EXAMINE
    Examine,
    /// CLOSE
    Close,
    /// UNSELECT
    Unselect,
    /// FETCH
    Fetch,
    /// UID FETCH
    UidFetch,
    /// STORE
    Store,
    /// UID STORE
    UidStore,
    /// SEARCH
    Search,
    /// UID SEARCH
    UidSearch,
    /// LIST
    List,
    /// LSUB
    Lsub,
    /// XLIST
    Xlist,
    /// STATUS
    Status,
    /// CAPABILITY
    Capability,
    /// NAMESPACE
    Namespace,
    /// NOOP
    Noop,
    /// IDLE
    Idle,
    /// APPEND
    Append,
    /// COPY
    Copy,
    /// UID COPY
    UidCopy,
    /// EXPUNGE
    Expunge,
    /// ENABLE
    Enable,
    /// ID
    Id,
    /// GETACL
    GetAcl,
    /// MYRIGHTS
    MyRights,
    /// GETQUOTAROOT
    GetQuotaRoot,
    /// The server greeting, before any command.
    Greeting,
    /// Anything else; never changes connection state.
    Other(String),
}

impl CommandKind {
    /// Maps a command name (and UID prefix) to its kind.
    #[must_use]
    pub fn from_name(name: &str, uid: bool) -> Self {
        let upper = name.to_ascii_uppercase();
        match (upper.as_str(), uid) {
            ("FETCH", true) => Self::UidFetch,
            ("STORE", true) => Self::UidStore,
            ("SEARCH", true) => Self::UidSearch,
            ("COPY", true) => Self::UidCopy,
            (_, true) => Self::Other(format!("UID {upper}")),
            ("LOGIN", _) => Self::Login,
            ("AUTHENTICATE", _) => Self::Authenticate,
            ("LOGOUT", _) => Self::Logout,
            ("SELECT", _) => Self::Select,
            ("EXAMINE", _) => Self::Examine,
            ("CLOSE", _) => Self::Close,
            ("UNSELECT", _) => Self::Unselect,
            ("FETCH", _) => Self::Fetch,
            ("STORE", _) => Self::Store,
            ("SEARCH", _) => Self::Search,
            ("LIST", _) => Self::List,
            ("LSUB", _) => Self::Lsub,
            ("XLIST", _) => Self::Xlist,
            ("STATUS", _) => Self::Status,
            ("CAPABILITY", _) => Self::Capability,
            ("NAMESPACE", _) => Self::Namespace,
            ("NOOP", _) => Self::Noop,
            ("IDLE", _) => Self::Idle,
            ("APPEND", _) => Self::Append,
            ("COPY", _) => Self::Copy,
            ("EXPUNGE", _) => Self::Expunge,
            ("ENABLE", _) => Self::Enable,
            ("ID", _) => Self::Id,
            ("GETACL", _) => Self::GetAcl,
            ("MYRIGHTS", _) => Self::MyRights,
            ("GETQUOTAROOT", _) => Self::GetQuotaRoot,
            _ => Self::Other(upper),
        }
    }

    /// Wire name of the command.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::Authenticate => "AUTHENTICATE",
            Self::Logout => "LOGOUT",
            Self::Select => "SELECT",
            Self::Examine => "EXAMINE",
            Self::Close => "CLOSE",
            Self::Unselect => "UNSELECT",
            Self::Fetch => "FETCH",
            Self::UidFetch => "UID FETCH",
            Self::Store => "STORE",
            Self::UidStore => "UID STORE",
            Self::Search => "SEARCH",
            Self::UidSearch => "UID SEARCH",
            Self::List => "LIST",
            Self::Lsub => "LSUB",
            Self::Xlist => "XLIST",
            Self::Status => "STATUS",
            Self::Capability => "CAPABILITY",
            Self::Namespace => "NAMESPACE",
            Self::Noop => "NOOP",
            Self::Idle => "IDLE",
            Self::Append => "APPEND",
            Self::Copy => "COPY",
            Self::UidCopy => "UID COPY",
            Self::Expunge => "EXPUNGE",
            Self::Enable => "ENABLE",
            Self::Id => "ID",
            Self::GetAcl => "GETACL",
            Self::MyRights => "MYRIGHTS",
            Self::GetQuotaRoot => "GETQUOTAROOT",
            Self::Greeting => "greeting",
            Self::Other(name) => name,
        }
    }

    /// Returns true for commands whose FETCH responses carry UIDs implicitly.
    #[must_use]
    pub const fn is_uid_command(&self) -> bool {
        matches!(
            self,
            Self::UidFetch | Self::UidStore | Self::UidSearch | Self::UidCopy
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The command whose response is being parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Tag of the command; empty for the greeting.
    pub tag: Tag,
    /// Command kind.
    pub kind: CommandKind,
    /// Mailbox argument of SELECT, EXAMINE, STATUS, APPEND and the ACL/quota commands.
    pub mailbox: Option<String>,
    /// SASL mechanism of AUTHENTICATE.
    pub auth_mechanism: Option<String>,
    /// FETCH items the response has to deliver before a record is published.
    pub fetch: FetchExpectations,
    /// Chunk size requested with `<origin.count>`.
    pub chunk_ceiling: Option<u32>,
    /// UID of a UID FETCH naming exactly one message.
    pub single_message_uid: Option<Uid>,
    /// Suppresses EXPUNGE bookkeeping.
    pub ignore_expunges: bool,
    /// Extra FETCH attribute to report verbatim.
    pub custom_fetch_attribute: Option<String>,
}

impl CommandContext {
    /// Creates a context with no arguments.
    #[must_use]
    pub fn new(tag: impl Into<String>, kind: CommandKind) -> Self {
        let fetch = FetchExpectations {
            flags: false,
            uid: kind.is_uid_command(),
        };
        Self {
            tag: Tag::new(tag),
            kind,
            mailbox: None,
            auth_mechanism: None,
            fetch,
            chunk_ceiling: None,
            single_message_uid: None,
            ignore_expunges: false,
            custom_fetch_attribute: None,
        }
    }

    /// Context for reading the server greeting.
    #[must_use]
    pub fn greeting() -> Self {
        Self::new("", CommandKind::Greeting)
    }

    /// Sets the mailbox argument.
    #[must_use]
    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Suppresses EXPUNGE bookkeeping while this command runs.
    #[must_use]
    pub const fn ignoring_expunges(mut self) -> Self {
        self.ignore_expunges = true;
        self
    }

    /// Reports the named FETCH attribute through the observer.
    #[must_use]
    pub fn with_custom_fetch_attribute(mut self, name: impl Into<String>) -> Self {
        self.custom_fetch_attribute = Some(name.into());
        self
    }

    /// Builds a context from a command line as sent on the wire.
    ///
    /// Returns `None` if the line has no tag or no command name.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut args = Arguments::new(line.trim_end());
        let tag = args.next()?;
        let mut name = args.next()?;
        let uid = name.eq_ignore_ascii_case("UID");
        if uid {
            name = args.next()?;
        }

        let mut context = Self::new(tag, CommandKind::from_name(&name, uid));
        match context.kind {
            CommandKind::Select
            | CommandKind::Examine
            | CommandKind::Status
            | CommandKind::Append
            | CommandKind::GetAcl
            | CommandKind::MyRights
            | CommandKind::GetQuotaRoot => context.mailbox = args.next(),
            CommandKind::Authenticate => context.auth_mechanism = args.next(),
            CommandKind::Fetch | CommandKind::UidFetch => {
                let set = args.next().unwrap_or_default();
                if context.kind == CommandKind::UidFetch {
                    context.single_message_uid = set.parse::<u32>().ok().and_then(Uid::new);
                }
                context.apply_fetch_items(args.rest());
            }
            _ => {}
        }
        Some(context)
    }

    fn apply_fetch_items(&mut self, items: &str) {
        let upper = items.to_ascii_uppercase();
        for word in upper
            .split(|c: char| c.is_ascii_whitespace() || c == '(' || c == ')')
            .filter(|w| !w.is_empty())
        {
            match word {
                "FLAGS" | "ALL" | "FAST" | "FULL" => self.fetch.flags = true,
                "UID" => self.fetch.uid = true,
                _ => {}
            }
        }
        self.chunk_ceiling = partial_count(&upper);
    }
}

/// Extracts `count` from the first `<origin.count>` partial specifier.
fn partial_count(items: &str) -> Option<u32> {
    let start = items.find('<')? + 1;
    let end = start + items[start..].find('>')?;
    let (_, count) = items[start..end].split_once('.')?;
    count.parse().ok()
}

/// Splits command arguments, honouring quoted strings.
struct Arguments<'a> {
    rest: &'a str,
}

impl<'a> Arguments<'a> {
    const fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn rest(&self) -> &'a str {
        self.rest.trim_start()
    }

    fn next(&mut self) -> Option<String> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        self.rest = &quoted[i + 1..];
                        return Some(value);
                    }
                    _ => value.push(c),
                }
            }
            self.rest = "";
            return Some(value);
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.rest = &rest[end..];
        Some(rest[..end].to_string())
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
    fn test_parse_select_quoted_mailbox() {
        let ctx = CommandContext::parse("A003 SELECT \"Sent \\\"Items\\\"\"\r\n").unwrap();
        assert_eq!(ctx.tag.as_str(), "A003");
        assert_eq!(ctx.kind, CommandKind::Select);
        assert_eq!(ctx.mailbox.as_deref(), Some("Sent \"Items\""));
    }

    #[test]
    fn test_parse_uid_fetch() {
        let line = "a7 UID FETCH 42 (UID RFC822.SIZE BODY.PEEK[]<0.16384>)";
        let ctx = CommandContext::parse(line).unwrap();
        assert_eq!(ctx.kind, CommandKind::UidFetch);
        assert_eq!(ctx.single_message_uid, Uid::new(42));
        assert_eq!(ctx.chunk_ceiling, Some(16384));
        assert!(ctx.fetch.uid);
        assert!(!ctx.fetch.flags);
    }

    #[test]
    fn test_parse_fetch_flags() {
        let ctx = CommandContext::parse("a8 FETCH 1:* (FLAGS)").unwrap();
        assert_eq!(ctx.kind, CommandKind::Fetch);
        assert!(ctx.fetch.flags);
        assert!(!ctx.fetch.uid);
        assert_eq!(ctx.single_message_uid, None);

        let ctx = CommandContext::parse("a9 UID FETCH 1:* FAST").unwrap();
        assert!(ctx.fetch.flags);
        assert!(ctx.fetch.uid);
        assert_eq!(ctx.single_message_uid, None);
    }

    #[test]
    fn test_parse_authenticate_and_other() {
        let ctx = CommandContext::parse("a1 authenticate PLAIN").unwrap();
        assert_eq!(ctx.kind, CommandKind::Authenticate);
        assert_eq!(ctx.auth_mechanism.as_deref(), Some("PLAIN"));

        let ctx = CommandContext::parse("a2 XYZZY").unwrap();
        assert_eq!(ctx.kind, CommandKind::Other("XYZZY".into()));
        assert_eq!(ctx.kind.to_string(), "XYZZY");

        let ctx = CommandContext::parse("a3 UID EXPUNGE 4").unwrap();
        assert_eq!(ctx.kind.name(), "UID EXPUNGE");

        assert!(CommandContext::parse("lonely").is_none());
        assert!(CommandContext::parse("").is_none());
    }

    #[test]
    fn test_builders() {
        let ctx = CommandContext::new("t1", CommandKind::Noop)
            .ignoring_expunges()
            .with_custom_fetch_attribute("X-GM-LABELS")
            .with_mailbox("INBOX");
        assert!(ctx.ignore_expunges);
        assert_eq!(ctx.custom_fetch_attribute.as_deref(), Some("X-GM-LABELS"));
        assert_eq!(ctx.mailbox.as_deref(), Some("INBOX"));
        assert_eq!(CommandContext::greeting().kind, CommandKind::Greeting);
    }
}
