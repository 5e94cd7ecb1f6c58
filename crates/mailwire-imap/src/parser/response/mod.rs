//! IMAP response parser.
//!
//! [`ResponseParser`] reads one complete server response per call: every
//! untagged line up to and including the tagged completion of the command
//! that was sent, or a continuation request. It keeps the connection state,
//! the selected mailbox snapshot and the per-mailbox flag table between
//! calls and reports everything else to the caller's observer and sink.
//!
//! A malformed line costs only that line. It is counted, logged and
//! skipped. BYE, transport failures and literal overruns end the response
//! with an error and drop the connection state to non-authenticated.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::match_same_arms)]

mod fetch;
mod helpers;

use tracing::{debug, error, warn};

use crate::command::{CommandContext, CommandKind};
use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::flag_state::FlagAndUidState;
use crate::handler::{MailboxObserver, MessageSink, NamespaceRegistry, NoNamespaces};
use crate::mailbox_spec::{MailboxSpec, MailboxSpecBuilder};
use crate::parser::bodystructure::BodyStructureBuilder;
use crate::parser::cursor::TokenCursor;
use crate::parser::lexer::Token;
use crate::protocol::ConnectionStateTracker;
use crate::source::{LineSource, TransportError};
use crate::types::{ListKind, ResponseCode, SeqNum, Status, Tag, Uid, UidValidity};

use helpers::{
    parse_astrings_to_end, parse_bye_text, parse_capability_data, parse_flag_list,
    parse_id_response, parse_list_response, parse_namespace_response, parse_quota_response,
    parse_resp_text, parse_search_response, parse_status_response,
};

/// How a response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The tagged line of the command arrived.
    Tagged,
    /// The server sent `+` and waits for the client.
    ContinuationRequested {
        /// Text after the `+`.
        text: String,
    },
    /// LOGOUT finished, with or without its tagged line.
    LoggedOut,
    /// One unsolicited line while idling.
    IdleUpdate,
}

/// Outcome of one [`ResponseParser::parse_response`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    /// Tag of the command.
    pub tag: Tag,
    /// The command the response belongs to.
    pub command: CommandKind,
    /// How the response ended.
    pub completion: Completion,
    /// Status of the tagged line, if one arrived.
    pub status: Option<Status>,
    /// Response code of the tagged line.
    pub code: Option<ResponseCode>,
    /// Text of the tagged line.
    pub text: String,
    /// Text of an untagged BAD seen while the command ran.
    pub untagged_bad: Option<String>,
    /// Malformed lines skipped in this response.
    pub syntax_errors: usize,
    /// UIDs whose RFC822.SIZE was 0.
    pub zero_length_uids: Vec<Uid>,
    /// APPENDUID: destination UIDVALIDITY and new UID.
    pub append_uid: Option<(UidValidity, Uid)>,
    /// COPYUID: destination UIDVALIDITY, source set and destination set.
    pub copy_uid: Option<(UidValidity, String, String)>,
    /// SASL challenge text of an AUTHENTICATE continuation.
    pub challenge: Option<String>,
}

impl ResponseSummary {
    /// Returns true if the command completed with OK and no untagged BAD.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.untagged_bad.is_none() && self.status.is_some_and(Status::is_ok)
    }

    /// Turns a NO/BAD completion into [`Error::CommandFailed`].
    pub fn into_result(self) -> Result<Self> {
        match (self.status, &self.untagged_bad) {
            (Some(status @ (Status::No | Status::Bad)), _) => Err(Error::CommandFailed {
                command: self.command.name().to_string(),
                status,
                text: self.text,
            }),
            (_, Some(text)) => Err(Error::CommandFailed {
                command: self.command.name().to_string(),
                status: Status::Bad,
                text: text.clone(),
            }),
            _ => Ok(self),
        }
    }
}

/// The server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// OK or PREAUTH.
    pub status: Status,
    /// Response code, typically CAPABILITY.
    pub code: Option<ResponseCode>,
    /// Greeting text.
    pub text: String,
}

#[derive(Debug, Default)]
struct DownloadState {
    active: bool,
    carry: Vec<u8>,
}

/// Per-response scratch state.
#[derive(Debug, Default)]
struct Scratch {
    syntax_errors: usize,
    untagged_bad: Option<String>,
    bye: Option<String>,
    zero_length_uids: Vec<Uid>,
    append_uid: Option<(UidValidity, Uid)>,
    copy_uid: Option<(UidValidity, String, String)>,
    challenge: Option<String>,
}

/// Everything one response exchange works with.
struct Exchange<'a> {
    cursor: TokenCursor<'a>,
    observer: &'a mut dyn MailboxObserver,
    sink: &'a mut dyn MessageSink,
    cmd: &'a CommandContext,
    scratch: Scratch,
}

impl Exchange<'_> {
    fn selecting(&self) -> bool {
        matches!(self.cmd.kind, CommandKind::Select | CommandKind::Examine)
    }

    fn summary(
        &mut self,
        completion: Completion,
        status: Option<Status>,
        code: Option<ResponseCode>,
        text: String,
    ) -> ResponseSummary {
        let scratch = std::mem::take(&mut self.scratch);
        ResponseSummary {
            tag: self.cmd.tag.clone(),
            command: self.cmd.kind.clone(),
            completion,
            status,
            code,
            text,
            untagged_bad: scratch.untagged_bad,
            syntax_errors: scratch.syntax_errors,
            zero_length_uids: scratch.zero_length_uids,
            append_uid: scratch.append_uid,
            copy_uid: scratch.copy_uid,
            challenge: scratch.challenge,
        }
    }
}

/// Grammar-driven interpreter of server responses for one connection.
pub struct ResponseParser {
    config: ParserConfig,
    tracker: ConnectionStateTracker,
    flags: FlagAndUidState,
    mailbox: MailboxSpecBuilder,
    body: BodyStructureBuilder,
    registry: Box<dyn NamespaceRegistry>,
    download: DownloadState,
    idle_command: Option<CommandContext>,
    last_alert: Option<String>,
    search_hits: Vec<u32>,
    syntax_errors: usize,
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("config", &self.config)
            .field("state", &self.tracker.state())
            .field("syntax_errors", &self.syntax_errors)
            .finish_non_exhaustive()
    }
}

impl ResponseParser {
    /// Creates a parser for a fresh connection.
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        let registry = NoNamespaces::new(config.default_hierarchy_delimiter);
        Self {
            body: BodyStructureBuilder::new(config.max_body_depth),
            registry: Box::new(registry),
            config,
            tracker: ConnectionStateTracker::new(),
            flags: FlagAndUidState::new(),
            mailbox: MailboxSpecBuilder::new(),
            download: DownloadState::default(),
            idle_command: None,
            last_alert: None,
            search_hits: Vec::new(),
            syntax_errors: 0,
        }
    }

    /// Uses `registry` for namespace and delimiter lookups.
    #[must_use]
    pub fn with_namespace_registry(mut self, registry: impl NamespaceRegistry + 'static) -> Self {
        self.registry = Box::new(registry);
        self
    }

    /// Connection state, capabilities and selected mailbox.
    #[must_use]
    pub const fn tracker(&self) -> &ConnectionStateTracker {
        &self.tracker
    }

    /// Per-mailbox flag and UID table.
    #[must_use]
    pub const fn flag_state(&self) -> &FlagAndUidState {
        &self.flags
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Hits of the most recent SEARCH response.
    #[must_use]
    pub fn last_search_hits(&self) -> &[u32] {
        &self.search_hits
    }

    /// Malformed lines skipped over the parser's lifetime.
    #[must_use]
    pub const fn syntax_errors(&self) -> usize {
        self.syntax_errors
    }

    /// Reads the server greeting.
    ///
    /// PREAUTH moves the connection to the authenticated state. BYE is
    /// returned as [`Error::Bye`].
    pub fn parse_greeting(
        &mut self,
        source: &mut dyn LineSource,
        observer: &mut dyn MailboxObserver,
    ) -> Result<Greeting> {
        let mut cursor = TokenCursor::new(source, self.config.max_literal_size);
        cursor.load_next_line()?;
        cursor.expect(&Token::Asterisk)?;
        let status = match cursor.advance()? {
            Token::Atom(word) => Status::parse(&word),
            _ => None,
        }
        .ok_or_else(|| cursor.syntax("expected OK, PREAUTH or BYE"))?;
        let (code, text) = if status == Status::Bye {
            parse_bye_text(&mut cursor)?
        } else {
            parse_resp_text(&mut cursor)?
        };

        match &code {
            Some(ResponseCode::Capability(caps)) => {
                self.tracker.set_capabilities(*caps);
                observer.on_capabilities(*caps);
            }
            Some(ResponseCode::Alert) => self.alert(observer, &text),
            _ => {}
        }

        match status {
            Status::Ok => {}
            Status::PreAuth => self.tracker.pre_authenticate(),
            Status::Bye => {
                observer.on_bye(&text);
                self.tracker.disconnect();
                return Err(Error::Bye(text));
            }
            Status::No | Status::Bad => return Err(cursor.syntax(format!("{status} greeting"))),
        }
        debug!(%status, text, "greeting");
        Ok(Greeting { status, code, text })
    }

    /// Reads the complete response to `cmd`.
    ///
    /// Returns `Ok` for every completion, including NO and BAD; see
    /// [`ResponseSummary::into_result`]. `Err` means the connection is
    /// unusable.
    pub fn parse_response(
        &mut self,
        cmd: &CommandContext,
        source: &mut dyn LineSource,
        observer: &mut dyn MailboxObserver,
        sink: &mut dyn MessageSink,
    ) -> Result<ResponseSummary> {
        self.begin_command(cmd);
        let mut ex = Exchange {
            cursor: TokenCursor::new(source, self.config.max_literal_size),
            observer,
            sink,
            cmd,
            scratch: Scratch::default(),
        };

        let result = self.run(&mut ex);
        self.finish(&mut ex, result)
    }

    /// Reads one line while IDLE is active.
    ///
    /// Untagged data is reported as usual and yields
    /// [`Completion::IdleUpdate`]. The tagged end of IDLE yields
    /// [`Completion::Tagged`] and leaves the idle state.
    pub fn parse_idle_update(
        &mut self,
        source: &mut dyn LineSource,
        observer: &mut dyn MailboxObserver,
        sink: &mut dyn MessageSink,
    ) -> Result<ResponseSummary> {
        let cmd = match (&self.idle_command, self.tracker.is_idling()) {
            (Some(cmd), true) => cmd.clone(),
            _ => return Err(Error::Protocol("IDLE is not active".to_string())),
        };
        let mut ex = Exchange {
            cursor: TokenCursor::new(source, self.config.max_literal_size),
            observer,
            sink,
            cmd: &cmd,
            scratch: Scratch::default(),
        };

        let result = self.idle_line(&mut ex);
        self.finish(&mut ex, result)
    }

    /// Leaves the idle sub-state after the client sent DONE.
    ///
    /// The tagged completion is then read with [`parse_response`](Self::parse_response).
    pub fn end_idle(&mut self) {
        self.tracker.set_idling(false);
        self.tracker.set_awaiting_client_input(false);
        self.idle_command = None;
    }

    fn begin_command(&mut self, cmd: &CommandContext) {
        self.tracker.set_awaiting_client_input(false);
        if matches!(cmd.kind, CommandKind::Select | CommandKind::Examine) {
            self.mailbox.reset();
            self.flags.reset();
        }
    }

    fn finish(
        &mut self,
        ex: &mut Exchange<'_>,
        result: Result<ResponseSummary>,
    ) -> Result<ResponseSummary> {
        match result {
            Ok(summary) => Ok(summary),
            Err(Error::Transport(TransportError::Closed)) if ex.scratch.bye.is_some() => {
                let text = ex.scratch.bye.take().unwrap_or_default();
                Ok(ex.summary(Completion::LoggedOut, None, None, text))
            }
            Err(err) => {
                error!(error = %err, command = %ex.cmd.kind, "response aborted");
                if self.download.active {
                    ex.sink.abort_download();
                    self.download = DownloadState::default();
                }
                self.flags.discard_line();
                self.tracker.disconnect();
                Err(err)
            }
        }
    }

    fn run(&mut self, ex: &mut Exchange<'_>) -> Result<ResponseSummary> {
        loop {
            ex.cursor.load_next_line()?;
            match self.dispatch_line(ex) {
                Ok(Some(summary)) => return Ok(summary),
                Ok(None) => {}
                Err(err @ Error::Syntax(_)) => self.recover(ex, &err)?,
                Err(err) => return Err(err),
            }
        }
    }

    fn idle_line(&mut self, ex: &mut Exchange<'_>) -> Result<ResponseSummary> {
        ex.cursor.load_next_line()?;
        match self.dispatch_line(ex) {
            Ok(Some(summary)) => Ok(summary),
            Ok(None) => Ok(ex.summary(Completion::IdleUpdate, None, None, String::new())),
            Err(err @ Error::Syntax(_)) => {
                self.recover(ex, &err)?;
                Ok(ex.summary(Completion::IdleUpdate, None, None, String::new()))
            }
            Err(err) => Err(err),
        }
    }

    /// Records a malformed line and skips the rest of it.
    fn recover(&mut self, ex: &mut Exchange<'_>, err: &Error) -> Result<()> {
        ex.scratch.syntax_errors += 1;
        self.syntax_errors += 1;
        warn!(error = %err, line = ex.cursor.lines_read(), "skipping malformed response line");
        self.flags.discard_line();
        ex.cursor.skip_to_end_of_line()
    }

    /// Parses one logical line. Returns the summary once the response is complete.
    fn dispatch_line(&mut self, ex: &mut Exchange<'_>) -> Result<Option<ResponseSummary>> {
        match ex.cursor.advance()? {
            Token::Asterisk => {
                self.untagged(ex)?;
                ex.cursor.skip_to_end_of_line()?;
                Ok(None)
            }
            Token::Plus => Ok(Some(self.continuation(ex))),
            Token::Eol => Ok(None),
            token => match token.text() {
                Some(tag) => {
                    let tag = tag.into_owned();
                    self.tagged(ex, &tag).map(Some)
                }
                None => Err(ex.cursor.syntax(format!("unexpected {token} at start of line"))),
            },
        }
    }

    fn continuation(&mut self, ex: &mut Exchange<'_>) -> ResponseSummary {
        let text = ex.cursor.rest_of_line();
        self.tracker.set_awaiting_client_input(true);
        match ex.cmd.kind {
            CommandKind::Authenticate => ex.scratch.challenge = Some(text.clone()),
            CommandKind::Idle => {
                self.tracker.set_idling(true);
                self.idle_command = Some(ex.cmd.clone());
            }
            _ => {}
        }
        debug!(command = %ex.cmd.kind, text, "continuation request");
        ex.summary(
            Completion::ContinuationRequested { text },
            None,
            None,
            String::new(),
        )
    }

    fn tagged(&mut self, ex: &mut Exchange<'_>, tag: &str) -> Result<ResponseSummary> {
        if !ex.cmd.tag.matches(tag) {
            return Err(ex.cursor.syntax(format!("unexpected tag {tag}")));
        }

        let status = match ex.cursor.advance()? {
            Token::Atom(word) => Status::parse(&word).filter(|s| {
                matches!(s, Status::Ok | Status::No | Status::Bad)
            }),
            _ => None,
        };
        let (status, code, text) = match status {
            Some(status) => match parse_resp_text(&mut ex.cursor) {
                Ok((code, text)) => (status, code, text),
                Err(err @ Error::Syntax(_)) => {
                    self.recover(ex, &err)?;
                    (status, None, String::new())
                }
                Err(err) => return Err(err),
            },
            None => {
                // The command is over either way.
                let err = ex.cursor.syntax("invalid status in tagged response");
                self.recover(ex, &err)?;
                (Status::Bad, None, String::new())
            }
        };

        if let Some(code) = &code {
            self.apply_code(ex, code, &text);
        }
        Ok(self.complete(ex, status, code, text))
    }

    fn complete(
        &mut self,
        ex: &mut Exchange<'_>,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    ) -> ResponseSummary {
        let kind = &ex.cmd.kind;
        let succeeded = status.is_ok() && ex.scratch.untagged_bad.is_none();

        if succeeded && ex.selecting() {
            let name = ex.cmd.mailbox.as_deref().unwrap_or_default();
            let spec = self
                .mailbox
                .build(name, self.registry.as_ref(), &self.config.server_key);
            self.flags.set_supported_user_flags(spec.metadata.user_flags);
            self.tracker
                .complete(kind, true, Some(&spec.name), Some(spec.metadata.clone()));
            ex.observer.on_mailbox_spec(&spec);
        } else {
            self.tracker.complete(kind, succeeded, None, None);
        }

        if *kind == CommandKind::Idle {
            self.end_idle();
        }

        debug!(command = %kind, %status, text, "command completed");
        let completion = if *kind == CommandKind::Logout && (succeeded || ex.scratch.bye.is_some())
        {
            Completion::LoggedOut
        } else {
            Completion::Tagged
        };
        ex.summary(completion, Some(status), code, text)
    }

    fn untagged(&mut self, ex: &mut Exchange<'_>) -> Result<()> {
        let word = match ex.cursor.advance()? {
            Token::Number(n) => return self.numeric(ex, n),
            Token::Atom(word) => word,
            token => return Err(ex.cursor.syntax(format!("unexpected {token} after *"))),
        };
        let upper = word.to_ascii_uppercase();
        debug!(response = %upper, "untagged");

        match upper.as_str() {
            "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                let status = Status::parse(&upper).unwrap_or(Status::Ok);
                self.untagged_status(ex, status)
            }
            "CAPABILITY" => {
                let caps = parse_capability_data(&mut ex.cursor)?;
                self.tracker.set_capabilities(caps);
                ex.observer.on_capabilities(caps);
                Ok(())
            }
            "FLAGS" => {
                let flags = parse_flag_list(&mut ex.cursor)?;
                self.mailbox.apply_flags(&flags);
                Ok(())
            }
            "LIST" => self.mailbox_list(ex, ListKind::List),
            "LSUB" => self.mailbox_list(ex, ListKind::Lsub),
            "XLIST" => self.mailbox_list(ex, ListKind::Xlist),
            "STATUS" => {
                let (name, counts) = parse_status_response(&mut ex.cursor)?;
                let spec = MailboxSpecBuilder::status_spec(
                    &name,
                    &counts,
                    self.registry.as_ref(),
                    &self.config.server_key,
                );
                ex.observer.on_mailbox_status(&spec, &counts);
                Ok(())
            }
            "SEARCH" => {
                let hits = parse_search_response(&mut ex.cursor)?;
                ex.observer.on_search_hits(&hits);
                self.search_hits = hits;
                Ok(())
            }
            "NAMESPACE" => {
                let namespaces = parse_namespace_response(&mut ex.cursor)?;
                ex.observer.on_namespaces(&namespaces);
                Ok(())
            }
            "QUOTAROOT" => {
                let mailbox = ex.cursor.read_astring()?;
                let roots = parse_astrings_to_end(&mut ex.cursor)?;
                ex.observer.on_quota_root(&mailbox, &roots);
                Ok(())
            }
            "QUOTA" => {
                let (root, resources) = parse_quota_response(&mut ex.cursor)?;
                ex.observer.on_quota(&root, &resources);
                Ok(())
            }
            "ACL" => {
                let mailbox = ex.cursor.read_astring()?;
                let pairs = parse_astrings_to_end(&mut ex.cursor)?;
                for pair in pairs.chunks(2) {
                    if let [identifier, rights] = pair {
                        ex.observer.on_folder_rights(&mailbox, Some(identifier.as_str()), rights);
                    }
                }
                Ok(())
            }
            "MYRIGHTS" => {
                let mailbox = ex.cursor.read_astring()?;
                let rights = ex.cursor.read_astring()?;
                ex.observer.on_folder_rights(&mailbox, None, &rights);
                Ok(())
            }
            "ENABLED" => {
                for capability in parse_astrings_to_end(&mut ex.cursor)? {
                    if capability.eq_ignore_ascii_case("CONDSTORE") {
                        self.tracker.enable_condstore();
                    }
                }
                Ok(())
            }
            "ID" => {
                let params = parse_id_response(&mut ex.cursor)?;
                ex.observer.on_server_id(&params);
                self.tracker.set_server_id(params);
                Ok(())
            }
            "LANGUAGE" | "VERSION" | "ACCOUNT-URL" | "XAOL-OPTION" | "XSERVERINFO"
            | "XMAILBOXINFO" | "MAILBOX" => {
                let text = ex.cursor.rest_of_line();
                debug!(response = %upper, text, "ignored untagged data");
                Ok(())
            }
            _ => Err(ex.cursor.syntax(format!("unknown untagged response {word}"))),
        }
    }

    fn untagged_status(&mut self, ex: &mut Exchange<'_>, status: Status) -> Result<()> {
        let (code, text) = if status == Status::Bye {
            parse_bye_text(&mut ex.cursor)?
        } else {
            parse_resp_text(&mut ex.cursor)?
        };
        if let Some(code) = &code {
            self.apply_code(ex, code, &text);
        }

        match status {
            Status::Ok => {}
            Status::No => {
                warn!(text, "NO");
                ex.observer.on_warning(&text);
            }
            Status::Bad => {
                warn!(text, command = %ex.cmd.kind, "untagged BAD");
                ex.scratch.untagged_bad = Some(text);
            }
            Status::PreAuth => self.tracker.pre_authenticate(),
            Status::Bye => {
                ex.observer.on_bye(&text);
                if ex.cmd.kind == CommandKind::Logout {
                    debug!(text, "BYE during LOGOUT");
                    self.tracker.disconnect();
                    ex.scratch.bye = Some(text);
                } else {
                    return Err(Error::Bye(text));
                }
            }
        }
        Ok(())
    }

    fn apply_code(&mut self, ex: &mut Exchange<'_>, code: &ResponseCode, text: &str) {
        let selecting = ex.selecting();
        match code {
            ResponseCode::Alert => self.alert(ex.observer, text),
            ResponseCode::Capability(caps) => {
                self.tracker.set_capabilities(*caps);
                ex.observer.on_capabilities(*caps);
            }
            ResponseCode::PermanentFlags(flags) => self.mailbox.apply_permanent_flags(flags),
            ResponseCode::ReadOnly => self.mailbox.set_read_only(true),
            ResponseCode::ReadWrite => self.mailbox.set_read_only(false),
            ResponseCode::UidValidity(validity) => {
                self.mailbox.set_uid_validity(*validity);
                self.flags.reset_highest_uid();
            }
            ResponseCode::Unseen(n) => self.mailbox.set_unseen(*n),
            ResponseCode::UidNext(uid) => {
                if selecting {
                    self.mailbox.set_next_uid(*uid);
                } else if let Some(metadata) = self.tracker.mailbox_mut() {
                    metadata.next_uid = Some(*uid);
                }
            }
            ResponseCode::HighestModSeq(n) => self.record_highest_mod_seq(selecting, *n),
            ResponseCode::NoModSeq => self.record_highest_mod_seq(selecting, 0),
            ResponseCode::AppendUid { uid_validity, uid } => {
                ex.scratch.append_uid = Some((*uid_validity, *uid));
            }
            ResponseCode::CopyUid {
                uid_validity,
                source,
                destination,
            } => {
                ex.scratch.copy_uid = Some((*uid_validity, source.clone(), destination.clone()));
            }
            ResponseCode::MyRights(rights) => {
                let mailbox = self
                    .tracker
                    .selected_mailbox()
                    .or(ex.cmd.mailbox.as_deref())
                    .unwrap_or_default()
                    .to_string();
                ex.observer.on_folder_rights(&mailbox, None, rights);
            }
            ResponseCode::Parse | ResponseCode::TryCreate | ResponseCode::Unknown(_) => {
                debug!(?code, "response code");
            }
        }
    }

    fn record_highest_mod_seq(&mut self, selecting: bool, mod_seq: u64) {
        if selecting {
            self.mailbox.set_highest_mod_seq(mod_seq);
        } else if let Some(metadata) = self.tracker.mailbox_mut() {
            metadata.highest_mod_seq = Some(mod_seq);
        }
    }

    fn alert(&mut self, observer: &mut dyn MailboxObserver, text: &str) {
        if self.last_alert.as_deref() == Some(text) {
            return;
        }
        warn!(text, "ALERT");
        observer.on_alert(text);
        self.last_alert = Some(text.to_string());
    }

    fn mailbox_list(&mut self, ex: &mut Exchange<'_>, kind: ListKind) -> Result<()> {
        let entry = parse_list_response(&mut ex.cursor)?;
        let spec: MailboxSpec = MailboxSpecBuilder::listed(
            &entry.name,
            entry.delimiter,
            entry.attributes,
            kind,
            self.registry.as_ref(),
            &self.config.server_key,
        );
        ex.observer.on_mailbox_listed(&spec, kind);
        Ok(())
    }

    fn numeric(&mut self, ex: &mut Exchange<'_>, n: u64) -> Result<()> {
        let value = u32::try_from(n)
            .map_err(|_| ex.cursor.syntax(format!("number out of range: {n}")))?;
        let word = match ex.cursor.advance()? {
            Token::Atom(word) => word.to_ascii_uppercase(),
            token => return Err(ex.cursor.syntax(format!("unexpected {token} after {n}"))),
        };
        debug!(response = %word, value, "untagged");

        match word.as_str() {
            "EXISTS" => {
                if ex.selecting() {
                    self.mailbox.set_exists(value);
                } else if let Some(metadata) = self.tracker.mailbox_mut() {
                    metadata.exists = value;
                }
                ex.observer.on_exists(value);
            }
            "RECENT" => {
                if ex.selecting() {
                    self.mailbox.set_recent(value);
                } else if let Some(metadata) = self.tracker.mailbox_mut() {
                    metadata.recent = value;
                }
                ex.observer.on_recent(value);
            }
            "EXPUNGE" => {
                let seq = sequence_number(ex, value)?;
                if ex.cmd.ignore_expunges {
                    debug!(seq = value, "EXPUNGE ignored");
                } else {
                    self.flags.expunge(seq);
                    if let Some(metadata) = self.tracker.mailbox_mut() {
                        metadata.exists = metadata.exists.saturating_sub(1);
                    }
                    ex.observer.on_expunge(seq);
                }
            }
            "FETCH" => {
                let seq = sequence_number(ex, value)?;
                self.msg_fetch(ex, seq)?;
            }
            // Obsolete RFC 1730 forms.
            "COPY" | "STORE" => {}
            _ => return Err(ex.cursor.syntax(format!("unknown message data {word}"))),
        }
        Ok(())
    }
}

fn sequence_number(ex: &Exchange<'_>, value: u32) -> Result<SeqNum> {
    SeqNum::new(value).ok_or_else(|| ex.cursor.syntax("Invalid sequence number 0"))
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
    use crate::handler::{CollectingHandler, ObservedEvent};
    use crate::protocol::ConnectionState;
    use crate::source::BufferedLines;
    use crate::types::{Capabilities, MessageFlags};

    fn parser() -> ResponseParser {
        ResponseParser::new(ParserConfig::new("test"))
    }

    fn run(
        parser: &mut ResponseParser,
        command: &str,
        input: &str,
        handler: &mut CollectingHandler,
    ) -> Result<ResponseSummary> {
        let cmd = CommandContext::parse(command).unwrap();
        let mut source = BufferedLines::from(input);
        let mut sink = CollectingHandler::new();
        let result = parser.parse_response(&cmd, &mut source, handler, &mut sink);
        handler.download = sink.download;
        handler.finished = sink.finished;
        handler.events.extend(sink.events);
        result
    }

    fn logged_in() -> ResponseParser {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        run(&mut parser, "a1 LOGIN u p", "a1 OK done\r\n", &mut handler).unwrap();
        parser
    }

    #[test]
    fn test_greeting_with_capabilities() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let mut source = BufferedLines::from("* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n");
        let greeting = parser.parse_greeting(&mut source, &mut handler).unwrap();
        assert_eq!(greeting.status, Status::Ok);
        assert_eq!(greeting.text, "ready");
        assert!(parser.tracker().has_capability(Capabilities::IDLE));
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
    }

    #[test]
    fn test_preauth_greeting() {
        let mut parser = parser();
        let mut source = BufferedLines::from("* PREAUTH welcome\r\n");
        parser
            .parse_greeting(&mut source, &mut CollectingHandler::new())
            .unwrap();
        assert_eq!(parser.tracker().state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_bye_greeting() {
        let mut parser = parser();
        let mut source = BufferedLines::from("* BYE too busy\r\n");
        let err = parser
            .parse_greeting(&mut source, &mut CollectingHandler::new())
            .unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too busy"));
    }

    #[test]
    fn test_login_transitions() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let summary =
            run(&mut parser, "a1 LOGIN u p", "a1 NO bad password\r\n", &mut handler).unwrap();
        assert_eq!(summary.status, Some(Status::No));
        assert!(!summary.succeeded());
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);

        let summary = run(&mut parser, "a2 LOGIN u p", "a2 OK welcome\r\n", &mut handler).unwrap();
        assert!(summary.succeeded());
        assert_eq!(parser.tracker().state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_select_populates_metadata() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let input = "* 172 EXISTS\r\n\
                     * 1 RECENT\r\n\
                     * OK [UNSEEN 12] Message 12 is first unseen\r\n\
                     * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
                     * OK [UIDNEXT 4392] Predicted next UID\r\n\
                     * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
                     * OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n\
                     a2 OK [READ-WRITE] SELECT completed\r\n";
        let summary = run(&mut parser, "a2 SELECT INBOX", input, &mut handler).unwrap();
        assert!(summary.succeeded());
        assert_eq!(parser.tracker().state(), ConnectionState::MailboxSelected);

        let metadata = parser.tracker().mailbox().unwrap();
        assert_eq!(metadata.exists, 172);
        assert_eq!(metadata.recent, 1);
        assert_eq!(metadata.unseen, 12);
        assert_eq!(metadata.uid_validity, UidValidity::new(3857529045));
        assert_eq!(metadata.next_uid, Uid::new(4392));
        assert_eq!(metadata.permanent_flags, MessageFlags::DELETED | MessageFlags::SEEN);
        assert!(metadata.supports_user_defined_flags);
        assert!(!metadata.read_only);

        let specs: Vec<_> = handler
            .events
            .iter()
            .filter(|e| matches!(e, ObservedEvent::MailboxSpec(_)))
            .collect();
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn test_failed_select_stays_authenticated() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let summary = run(
            &mut parser,
            "a2 SELECT \"Inbox\"",
            "* 3 EXISTS\r\na2 NO no such mailbox\r\n",
            &mut handler,
        )
        .unwrap();
        assert_eq!(parser.tracker().state(), ConnectionState::Authenticated);
        assert!(parser.tracker().mailbox().is_none());
        assert!(matches!(
            summary.into_result(),
            Err(Error::CommandFailed { status: Status::No, .. })
        ));
    }

    #[test]
    fn test_capability_replaced_not_merged() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let input = "* CAPABILITY IMAP4rev1 IDLE\r\na1 OK done\r\n";
        run(&mut parser, "a1 CAPABILITY", input, &mut handler).unwrap();
        let first = parser.tracker().capabilities();
        run(&mut parser, "a1 CAPABILITY", input, &mut handler).unwrap();
        assert_eq!(parser.tracker().capabilities(), first);

        let input = "* CAPABILITY IMAP4rev1\r\na2 OK\r\n";
        run(&mut parser, "a2 CAPABILITY", input, &mut handler).unwrap();
        assert!(!parser.tracker().has_capability(Capabilities::IDLE));
    }

    #[test]
    fn test_syntax_error_is_recovered() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let input = "* FROBNICATE (((\r\n* 4 EXISTS\r\na1 OK done\r\n";
        let summary = run(&mut parser, "a1 NOOP", input, &mut handler).unwrap();
        assert!(summary.succeeded());
        assert_eq!(summary.syntax_errors, 1);
        assert_eq!(parser.syntax_errors(), 1);
        assert!(handler.events.contains(&ObservedEvent::Exists(4)));
    }

    #[test]
    fn test_stray_tag_is_syntax_error() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let summary =
            run(&mut parser, "a2 NOOP", "a1 OK old\r\na2 OK done\r\n", &mut handler).unwrap();
        assert_eq!(summary.syntax_errors, 1);
        assert_eq!(summary.text, "done");
    }

    #[test]
    fn test_bye_is_fatal() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let err = run(&mut parser, "a2 NOOP", "* BYE shutting down\r\n", &mut handler).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
        assert!(handler.events.contains(&ObservedEvent::Bye("shutting down".into())));
    }

    #[test]
    fn test_bye_with_malformed_code_is_fatal() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let input = "* BYE [ALERT server shutting down\r\na2 OK done\r\n";
        let err = run(&mut parser, "a2 NOOP", input, &mut handler).unwrap_err();
        assert!(matches!(&err, Error::Bye(text) if text == "[ALERT server shutting down"));
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
        assert_eq!(parser.syntax_errors(), 0);
    }

    #[test]
    fn test_bye_greeting_with_malformed_code() {
        let mut parser = parser();
        let mut source = BufferedLines::from("* BYE [UIDNEXT abc] overloaded\r\n");
        let err = parser
            .parse_greeting(&mut source, &mut CollectingHandler::new())
            .unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "[UIDNEXT abc] overloaded"));
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
    }

    #[test]
    fn test_logout_with_bye() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let summary = run(
            &mut parser,
            "a9 LOGOUT",
            "* BYE logging out\r\na9 OK LOGOUT completed\r\n",
            &mut handler,
        )
        .unwrap();
        assert_eq!(summary.completion, Completion::LoggedOut);
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
    }

    #[test]
    fn test_logout_without_tagged_line() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let summary = run(&mut parser, "a9 LOGOUT", "* BYE bye\r\n", &mut handler).unwrap();
        assert_eq!(summary.completion, Completion::LoggedOut);
        assert_eq!(summary.status, None);
    }

    #[test]
    fn test_untagged_bad_fails_command() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let summary = run(
            &mut parser,
            "a1 LOGIN u p",
            "* BAD line too long\r\na1 OK done\r\n",
            &mut handler,
        )
        .unwrap();
        assert!(!summary.succeeded());
        assert_eq!(parser.tracker().state(), ConnectionState::NonAuthenticated);
        assert!(summary.into_result().is_err());
    }

    #[test]
    fn test_untagged_no_is_warning() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let summary = run(
            &mut parser,
            "a1 NOOP",
            "* NO disk almost full\r\na1 OK done\r\n",
            &mut handler,
        )
        .unwrap();
        assert!(summary.succeeded());
        assert!(handler.events.contains(&ObservedEvent::Warning("disk almost full".into())));
    }

    #[test]
    fn test_alert_deduplicated() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let input = "* OK [ALERT] maintenance\r\n* OK [ALERT] maintenance\r\na1 OK done\r\n";
        run(&mut parser, "a1 NOOP", input, &mut handler).unwrap();
        let alerts = handler
            .events
            .iter()
            .filter(|e| matches!(e, ObservedEvent::Alert(_)))
            .count();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_authenticate_challenge() {
        let mut parser = parser();
        let mut handler = CollectingHandler::new();
        let input = "+ PDE4OTYuNjk3\r\n";
        let summary = run(&mut parser, "a1 AUTHENTICATE CRAM-MD5", input, &mut handler).unwrap();
        assert_eq!(summary.challenge.as_deref(), Some("PDE4OTYuNjk3"));
        assert!(matches!(summary.completion, Completion::ContinuationRequested { .. }));
        assert!(parser.tracker().awaiting_client_input());
    }

    #[test]
    fn test_idle_cycle() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let mut sink = CollectingHandler::new();
        let cmd = CommandContext::parse("a3 IDLE").unwrap();

        let mut source = BufferedLines::from("+ idling\r\n");
        let summary = parser
            .parse_response(&cmd, &mut source, &mut handler, &mut sink)
            .unwrap();
        assert!(matches!(summary.completion, Completion::ContinuationRequested { .. }));
        assert!(parser.tracker().is_idling());

        let mut source = BufferedLines::from("* 5 EXISTS\r\n");
        let summary = parser
            .parse_idle_update(&mut source, &mut handler, &mut sink)
            .unwrap();
        assert_eq!(summary.completion, Completion::IdleUpdate);
        assert!(handler.events.contains(&ObservedEvent::Exists(5)));

        parser.end_idle();
        assert!(!parser.tracker().is_idling());
        let mut source = BufferedLines::from("a3 OK IDLE terminated\r\n");
        let summary = parser
            .parse_response(&cmd, &mut source, &mut handler, &mut sink)
            .unwrap();
        assert_eq!(summary.completion, Completion::Tagged);
    }

    #[test]
    fn test_idle_update_requires_idle() {
        let mut parser = parser();
        let mut source = BufferedLines::from("* 5 EXISTS\r\n");
        let result = parser.parse_idle_update(
            &mut source,
            &mut CollectingHandler::new(),
            &mut CollectingHandler::new(),
        );
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_append_uid() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let summary = run(
            &mut parser,
            "a4 APPEND saved-messages (\\Seen) {310}",
            "a4 OK [APPENDUID 38505 3955] APPEND completed\r\n",
            &mut handler,
        )
        .unwrap();
        assert_eq!(
            summary.append_uid,
            Some((UidValidity::new(38505).unwrap(), Uid::new(3955).unwrap()))
        );
    }

    #[test]
    fn test_list_and_status() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let input = "* LIST (\\HasNoChildren) \"/\" inbox\r\n\
                     * LSUB () \".\" #news.comp.mail.misc\r\n\
                     a5 OK done\r\n";
        run(&mut parser, "a5 LIST \"\" *", input, &mut handler).unwrap();
        let listed: Vec<_> = handler
            .events
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::Listed(spec, kind) => Some((spec.name.clone(), *kind)),
                _ => None,
            })
            .collect();
        assert_eq!(
            listed,
            vec![
                ("INBOX".to_string(), ListKind::List),
                ("#news.comp.mail.misc".to_string(), ListKind::Lsub)
            ]
        );

        let input = "* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\na6 OK done\r\n";
        run(&mut parser, "a6 STATUS blurdybloop (MESSAGES UIDNEXT)", input, &mut handler).unwrap();
        assert!(handler.events.iter().any(|e| matches!(
            e,
            ObservedEvent::Status(spec, counts)
                if spec.name == "blurdybloop"
                    && counts.messages == Some(231)
                    && !spec.folder_selected
        )));
    }

    #[test]
    fn test_namespace_quota_acl_id_enabled() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let input = "* NAMESPACE ((\"\" \"/\")) NIL ((\"Public Folders/\" \"/\"))\r\n\
                     * QUOTAROOT INBOX \"\"\r\n\
                     * QUOTA \"\" (STORAGE 10 512)\r\n\
                     * ACL INBOX Fred rwipsldexta\r\n\
                     * MYRIGHTS INBOX rwiptsldaex\r\n\
                     * ID (\"name\" \"Cyrus\")\r\n\
                     * ENABLED CONDSTORE\r\n\
                     a7 OK done\r\n";
        let summary = run(&mut parser, "a7 NOOP", input, &mut handler).unwrap();
        assert_eq!(summary.syntax_errors, 0);
        assert!(parser.tracker().condstore_enabled());
        assert_eq!(
            parser.tracker().server_id(),
            [("name".to_string(), Some("Cyrus".to_string()))]
        );
        assert!(handler
            .events
            .iter()
            .any(|e| matches!(e, ObservedEvent::Namespaces(ns) if ns.len() == 2)));
        assert!(handler.events.contains(&ObservedEvent::QuotaRoot(
            "INBOX".into(),
            vec![String::new()]
        )));
        assert!(handler.events.contains(&ObservedEvent::FolderRights {
            mailbox: "INBOX".into(),
            identifier: Some("Fred".into()),
            rights: "rwipsldexta".into(),
        }));
        assert!(handler.events.contains(&ObservedEvent::FolderRights {
            mailbox: "INBOX".into(),
            identifier: None,
            rights: "rwiptsldaex".into(),
        }));
    }

    #[test]
    fn test_search_hits() {
        let mut parser = logged_in();
        let mut handler = CollectingHandler::new();
        let input = "* SEARCH 2 84 882\r\na8 OK done\r\n";
        run(&mut parser, "a8 SEARCH UNSEEN", input, &mut handler).unwrap();
        assert_eq!(parser.last_search_hits(), [2, 84, 882]);
        assert!(handler.events.contains(&ObservedEvent::SearchHits(vec![2, 84, 882])));
    }
}
