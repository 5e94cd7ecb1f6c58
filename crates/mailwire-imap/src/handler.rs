//! Collaborators the response parser reports to.
//!
//! - [`MailboxObserver`] receives structured events: mailbox specs, fetched
//!   messages, body structures, counts and server notices.
//! - [`MessageSink`] receives streamed message bytes.
//! - [`NamespaceRegistry`] answers namespace questions while mailbox specs
//!   are built. The parser never changes it.
//!
//! Per RFC 2683, IMAP clients must be prepared to receive EXISTS, EXPUNGE
//! and FETCH responses at any time, so every observer method may be called
//! outside the command that seems to own it.
//!
//! # Example
//!
//! ```
//! use mailwire_imap::handler::MailboxObserver;
//!
//! struct Counter {
//!     exists: u32,
//! }
//!
//! impl MailboxObserver for Counter {
//!     fn on_exists(&mut self, count: u32) {
//!         self.exists = count;
//!     }
//! }
//! ```

use crate::flag_state::MessageFetchRecord;
use crate::mailbox_spec::MailboxSpec;
use crate::parser::BodyPart;
use crate::types::{
    Capabilities, Envelope, ListKind, Namespace, NamespaceType, QuotaResource, SeqNum,
    StatusCounts, Uid,
};

/// Receiver of structured events.
///
/// All methods default to doing nothing.
pub trait MailboxObserver {
    /// The mailbox selected by SELECT/EXAMINE.
    fn on_mailbox_spec(&mut self, spec: &MailboxSpec) {
        let _ = spec;
    }

    /// One LIST, LSUB or XLIST entry.
    fn on_mailbox_listed(&mut self, spec: &MailboxSpec, kind: ListKind) {
        let _ = (spec, kind);
    }

    /// One STATUS response.
    fn on_mailbox_status(&mut self, spec: &MailboxSpec, counts: &StatusCounts) {
        let _ = (spec, counts);
    }

    /// A FETCH line that carried everything the command asked for.
    fn on_message_fetched(&mut self, record: &MessageFetchRecord) {
        let _ = record;
    }

    /// A complete BODYSTRUCTURE tree.
    ///
    /// Malformed structures are never reported, so an implementation may
    /// cache whatever it receives here.
    fn on_body_structure(&mut self, seq: SeqNum, uid: Option<Uid>, body: &BodyPart) {
        let _ = (seq, uid, body);
    }

    /// An ENVELOPE.
    fn on_envelope(&mut self, seq: SeqNum, uid: Option<Uid>, envelope: &Envelope) {
        let _ = (seq, uid, envelope);
    }

    /// A vendor or caller-named FETCH attribute, rendered as text.
    fn on_custom_attribute(&mut self, seq: SeqNum, uid: Option<Uid>, name: &str, value: &str) {
        let _ = (seq, uid, name, value);
    }

    /// Called when the message count changes (EXISTS response).
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// Called when the recent count changes.
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// Called when a message is expunged (EXPUNGE response).
    ///
    /// Sequence numbers of subsequent messages decrease by one.
    fn on_expunge(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// SEARCH results.
    fn on_search_hits(&mut self, hits: &[u32]) {
        let _ = hits;
    }

    /// A new capability set replaced the old one.
    fn on_capabilities(&mut self, capabilities: Capabilities) {
        let _ = capabilities;
    }

    /// A NAMESPACE response.
    fn on_namespaces(&mut self, namespaces: &[Namespace]) {
        let _ = namespaces;
    }

    /// QUOTAROOT: the quota roots of a mailbox.
    fn on_quota_root(&mut self, mailbox: &str, roots: &[String]) {
        let _ = (mailbox, roots);
    }

    /// QUOTA: resource usage of one root.
    fn on_quota(&mut self, root: &str, resources: &[QuotaResource]) {
        let _ = (root, resources);
    }

    /// ACL or MYRIGHTS. `identifier` is `None` for MYRIGHTS.
    fn on_folder_rights(&mut self, mailbox: &str, identifier: Option<&str>, rights: &str) {
        let _ = (mailbox, identifier, rights);
    }

    /// Server ID parameters.
    fn on_server_id(&mut self, params: &[(String, Option<String>)]) {
        let _ = params;
    }

    /// Called when the server sends an ALERT response code.
    ///
    /// Per RFC 3501, ALERT messages MUST be presented to the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for untagged NO responses (warnings).
    fn on_warning(&mut self, text: &str) {
        let _ = text;
    }

    /// Called when the server is closing the connection (BYE response).
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }
}

/// Receiver of streamed message bytes.
///
/// A download is opened by `begin_download`, fed through `append_bytes`
/// and closed by exactly one of `end_download` or `abort_download`.
pub trait MessageSink {
    /// A message or message section starts.
    fn begin_download(&mut self, size_hint: u32, content_type: &str) {
        let _ = (size_hint, content_type);
    }

    /// More bytes. `is_final_chunk` is set on the last call of a download.
    fn append_bytes(&mut self, bytes: &[u8], is_final_chunk: bool) {
        let _ = (bytes, is_final_chunk);
    }

    /// The download completed.
    fn end_download(&mut self) {}

    /// The download can never complete.
    fn abort_download(&mut self) {}
}

/// Namespace knowledge the parser consults.
pub trait NamespaceRegistry {
    /// Hierarchy delimiter for `mailbox`.
    fn hierarchy_delimiter_for(&self, server_key: &str, mailbox: &str) -> char;

    /// Namespace class of `mailbox`.
    fn namespace_type_for(&self, server_key: &str, mailbox: &str) -> NamespaceType;
}

/// Registry without namespace information.
#[derive(Debug, Clone, Copy)]
pub struct NoNamespaces {
    default_delimiter: char,
}

impl NoNamespaces {
    /// Creates a registry answering `default_delimiter` for every mailbox.
    #[must_use]
    pub const fn new(default_delimiter: char) -> Self {
        Self { default_delimiter }
    }
}

impl Default for NoNamespaces {
    fn default() -> Self {
        Self::new('/')
    }
}

impl NamespaceRegistry for NoNamespaces {
    fn hierarchy_delimiter_for(&self, _server_key: &str, _mailbox: &str) -> char {
        self.default_delimiter
    }

    fn namespace_type_for(&self, _server_key: &str, _mailbox: &str) -> NamespaceType {
        NamespaceType::Unknown
    }
}

/// Registry over a fixed namespace list, matching the longest prefix.
#[derive(Debug, Clone)]
pub struct StaticNamespaces {
    namespaces: Vec<Namespace>,
    default_delimiter: char,
}

impl StaticNamespaces {
    /// Creates a registry from a NAMESPACE response.
    #[must_use]
    pub const fn new(namespaces: Vec<Namespace>, default_delimiter: char) -> Self {
        Self {
            namespaces,
            default_delimiter,
        }
    }

    fn lookup(&self, mailbox: &str) -> Option<&Namespace> {
        self.namespaces
            .iter()
            .filter(|ns| {
                mailbox.starts_with(&ns.prefix)
                    || (ns.prefix.len() >= 5
                        && ns.prefix[..5].eq_ignore_ascii_case("INBOX")
                        && mailbox.len() >= ns.prefix.len()
                        && mailbox.is_char_boundary(ns.prefix.len())
                        && mailbox[..ns.prefix.len()].eq_ignore_ascii_case(&ns.prefix))
            })
            .max_by_key(|ns| ns.prefix.len())
    }
}

impl NamespaceRegistry for StaticNamespaces {
    fn hierarchy_delimiter_for(&self, _server_key: &str, mailbox: &str) -> char {
        self.lookup(mailbox)
            .and_then(|ns| ns.delimiter)
            .unwrap_or(self.default_delimiter)
    }

    fn namespace_type_for(&self, _server_key: &str, mailbox: &str) -> NamespaceType {
        self.lookup(mailbox)
            .map_or(NamespaceType::Unknown, |ns| ns.kind)
    }
}

/// A handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl MailboxObserver for NoopHandler {}
impl MessageSink for NoopHandler {}

/// A handler that logs every callback using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl MailboxObserver for LoggingHandler {
    fn on_mailbox_spec(&mut self, spec: &MailboxSpec) {
        tracing::info!(
            name = %spec.name,
            exists = spec.metadata.exists,
            recent = spec.metadata.recent,
            uid_validity = ?spec.metadata.uid_validity,
            read_only = spec.metadata.read_only,
            "mailbox selected"
        );
    }

    fn on_mailbox_listed(&mut self, spec: &MailboxSpec, kind: ListKind) {
        tracing::info!(
            name = %spec.name,
            ?kind,
            flags = ?spec.box_flags,
            delimiter = ?spec.hierarchy_delimiter,
            "mailbox listed"
        );
    }

    fn on_mailbox_status(&mut self, spec: &MailboxSpec, counts: &StatusCounts) {
        tracing::info!(name = %spec.name, ?counts, "STATUS");
    }

    fn on_message_fetched(&mut self, record: &MessageFetchRecord) {
        tracing::debug!(
            seq = record.sequence_number.get(),
            uid = record.uid.get(),
            flags = ?record.flags,
            keywords = ?record.custom_keywords,
            size = ?record.size_octets,
            mod_seq = ?record.mod_seq,
            "FETCH"
        );
    }

    fn on_body_structure(&mut self, seq: SeqNum, uid: Option<Uid>, body: &BodyPart) {
        let parts: Vec<&str> = body.iter().map(|p| p.part_number.as_str()).collect();
        tracing::debug!(seq = seq.get(), ?uid, ?parts, "BODYSTRUCTURE");
    }

    fn on_envelope(&mut self, seq: SeqNum, uid: Option<Uid>, envelope: &Envelope) {
        tracing::debug!(seq = seq.get(), ?uid, subject = ?envelope.subject, "ENVELOPE");
    }

    fn on_custom_attribute(&mut self, seq: SeqNum, uid: Option<Uid>, name: &str, value: &str) {
        tracing::debug!(seq = seq.get(), ?uid, name, value, "custom attribute");
    }

    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "EXPUNGE");
    }

    fn on_search_hits(&mut self, hits: &[u32]) {
        tracing::debug!(count = hits.len(), ?hits, "SEARCH");
    }

    fn on_capabilities(&mut self, capabilities: Capabilities) {
        tracing::debug!(?capabilities, "CAPABILITY");
    }

    fn on_namespaces(&mut self, namespaces: &[Namespace]) {
        tracing::debug!(?namespaces, "NAMESPACE");
    }

    fn on_quota_root(&mut self, mailbox: &str, roots: &[String]) {
        tracing::debug!(mailbox, ?roots, "QUOTAROOT");
    }

    fn on_quota(&mut self, root: &str, resources: &[QuotaResource]) {
        tracing::debug!(root, ?resources, "QUOTA");
    }

    fn on_folder_rights(&mut self, mailbox: &str, identifier: Option<&str>, rights: &str) {
        tracing::debug!(mailbox, ?identifier, rights, "rights");
    }

    fn on_server_id(&mut self, params: &[(String, Option<String>)]) {
        tracing::debug!(?params, "ID");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_warning(&mut self, text: &str) {
        tracing::warn!(text, "NO");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }
}

impl MessageSink for LoggingHandler {
    fn begin_download(&mut self, size_hint: u32, content_type: &str) {
        tracing::debug!(size_hint, content_type, "download started");
    }

    fn append_bytes(&mut self, bytes: &[u8], is_final_chunk: bool) {
        tracing::trace!(len = bytes.len(), is_final_chunk, "download bytes");
    }

    fn end_download(&mut self) {
        tracing::debug!("download finished");
    }

    fn abort_download(&mut self) {
        tracing::warn!("download aborted");
    }
}

/// An event collected by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    /// `on_mailbox_spec`
    MailboxSpec(MailboxSpec),
    /// `on_mailbox_listed`
    Listed(MailboxSpec, ListKind),
    /// `on_mailbox_status`
    Status(MailboxSpec, StatusCounts),
    /// `on_message_fetched`
    MessageFetched(MessageFetchRecord),
    /// `on_body_structure`
    BodyStructure(SeqNum, Option<Uid>, BodyPart),
    /// `on_envelope`
    Envelope(SeqNum, Option<Uid>, Envelope),
    /// `on_custom_attribute`
    CustomAttribute {
        /// Sequence number.
        seq: SeqNum,
        /// UID, if known.
        uid: Option<Uid>,
        /// Attribute name.
        name: String,
        /// Attribute value.
        value: String,
    },
    /// `on_exists`
    Exists(u32),
    /// `on_recent`
    Recent(u32),
    /// `on_expunge`
    Expunge(SeqNum),
    /// `on_search_hits`
    SearchHits(Vec<u32>),
    /// `on_capabilities`
    Capabilities(Capabilities),
    /// `on_namespaces`
    Namespaces(Vec<Namespace>),
    /// `on_quota_root`
    QuotaRoot(String, Vec<String>),
    /// `on_quota`
    Quota(String, Vec<QuotaResource>),
    /// `on_folder_rights`
    FolderRights {
        /// Mailbox name.
        mailbox: String,
        /// ACL identifier; `None` for MYRIGHTS.
        identifier: Option<String>,
        /// Rights string.
        rights: String,
    },
    /// `on_server_id`
    ServerId(Vec<(String, Option<String>)>),
    /// `on_alert`
    Alert(String),
    /// `on_warning`
    Warning(String),
    /// `on_bye`
    Bye(String),
    /// `begin_download`
    DownloadStarted(u32, String),
    /// `end_download`
    DownloadFinished,
    /// `abort_download`
    DownloadAborted,
}

/// A handler that collects events and downloaded bytes.
///
/// Useful for testing or batch processing of events.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events.
    pub events: Vec<ObservedEvent>,
    /// Bytes of the download in progress.
    pub download: Vec<u8>,
    /// Bytes of every finished download.
    pub finished: Vec<Vec<u8>>,
    /// Number of `append_bytes` calls flagged final.
    pub final_chunks: usize,
}

impl CollectingHandler {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<ObservedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Fetch records collected so far.
    #[must_use]
    pub fn fetched(&self) -> Vec<&MessageFetchRecord> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::MessageFetched(record) => Some(record),
                _ => None,
            })
            .collect()
    }
}

impl MailboxObserver for CollectingHandler {
    fn on_mailbox_spec(&mut self, spec: &MailboxSpec) {
        self.events.push(ObservedEvent::MailboxSpec(spec.clone()));
    }

    fn on_mailbox_listed(&mut self, spec: &MailboxSpec, kind: ListKind) {
        self.events.push(ObservedEvent::Listed(spec.clone(), kind));
    }

    fn on_mailbox_status(&mut self, spec: &MailboxSpec, counts: &StatusCounts) {
        self.events.push(ObservedEvent::Status(spec.clone(), *counts));
    }

    fn on_message_fetched(&mut self, record: &MessageFetchRecord) {
        self.events.push(ObservedEvent::MessageFetched(record.clone()));
    }

    fn on_body_structure(&mut self, seq: SeqNum, uid: Option<Uid>, body: &BodyPart) {
        self.events
            .push(ObservedEvent::BodyStructure(seq, uid, body.clone()));
    }

    fn on_envelope(&mut self, seq: SeqNum, uid: Option<Uid>, envelope: &Envelope) {
        self.events
            .push(ObservedEvent::Envelope(seq, uid, envelope.clone()));
    }

    fn on_custom_attribute(&mut self, seq: SeqNum, uid: Option<Uid>, name: &str, value: &str) {
        self.events.push(ObservedEvent::CustomAttribute {
            seq,
            uid,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn on_exists(&mut self, count: u32) {
        self.events.push(ObservedEvent::Exists(count));
    }

    fn on_recent(&mut self, count: u32) {
        self.events.push(ObservedEvent::Recent(count));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.events.push(ObservedEvent::Expunge(seq));
    }

    fn on_search_hits(&mut self, hits: &[u32]) {
        self.events.push(ObservedEvent::SearchHits(hits.to_vec()));
    }

    fn on_capabilities(&mut self, capabilities: Capabilities) {
        self.events.push(ObservedEvent::Capabilities(capabilities));
    }

    fn on_namespaces(&mut self, namespaces: &[Namespace]) {
        self.events
            .push(ObservedEvent::Namespaces(namespaces.to_vec()));
    }

    fn on_quota_root(&mut self, mailbox: &str, roots: &[String]) {
        self.events
            .push(ObservedEvent::QuotaRoot(mailbox.to_string(), roots.to_vec()));
    }

    fn on_quota(&mut self, root: &str, resources: &[QuotaResource]) {
        self.events
            .push(ObservedEvent::Quota(root.to_string(), resources.to_vec()));
    }

    fn on_folder_rights(&mut self, mailbox: &str, identifier: Option<&str>, rights: &str) {
        self.events.push(ObservedEvent::FolderRights {
            mailbox: mailbox.to_string(),
            identifier: identifier.map(str::to_string),
            rights: rights.to_string(),
        });
    }

    fn on_server_id(&mut self, params: &[(String, Option<String>)]) {
        self.events.push(ObservedEvent::ServerId(params.to_vec()));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(ObservedEvent::Alert(text.to_string()));
    }

    fn on_warning(&mut self, text: &str) {
        self.events.push(ObservedEvent::Warning(text.to_string()));
    }

    fn on_bye(&mut self, text: &str) {
        self.events.push(ObservedEvent::Bye(text.to_string()));
    }
}

impl MessageSink for CollectingHandler {
    fn begin_download(&mut self, size_hint: u32, content_type: &str) {
        self.download.clear();
        self.events
            .push(ObservedEvent::DownloadStarted(size_hint, content_type.to_string()));
    }

    fn append_bytes(&mut self, bytes: &[u8], is_final_chunk: bool) {
        self.download.extend_from_slice(bytes);
        if is_final_chunk {
            self.final_chunks += 1;
        }
    }

    fn end_download(&mut self) {
        self.finished.push(std::mem::take(&mut self.download));
        self.events.push(ObservedEvent::DownloadFinished);
    }

    fn abort_download(&mut self) {
        self.download.clear();
        self.events.push(ObservedEvent::DownloadAborted);
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
    fn test_noop_handler() {
        let mut handler = NoopHandler;
        // Should not panic
        handler.on_exists(100);
        handler.on_expunge(SeqNum::new(1).unwrap());
        handler.on_bye("goodbye");
        handler.begin_download(10, "message/rfc822");
        handler.append_bytes(b"abc", true);
        handler.end_download();
    }

    #[test]
    fn test_collecting_handler() {
        let mut handler = CollectingHandler::new();

        handler.on_exists(50);
        handler.on_recent(5);
        handler.on_alert("Test alert");

        assert_eq!(handler.events.len(), 3);
        assert_eq!(handler.events[0], ObservedEvent::Exists(50));
        assert_eq!(handler.events[1], ObservedEvent::Recent(5));
        assert_eq!(
            handler.events[2],
            ObservedEvent::Alert("Test alert".to_string())
        );

        let taken = handler.take();
        assert_eq!(taken.len(), 3);
        assert!(handler.events.is_empty());
    }

    #[test]
    fn test_collecting_downloads() {
        let mut handler = CollectingHandler::new();
        handler.begin_download(5, "message/rfc822");
        handler.append_bytes(b"he", false);
        handler.append_bytes(b"llo", true);
        handler.end_download();

        handler.begin_download(9, "message/rfc822");
        handler.append_bytes(b"partial", false);
        handler.abort_download();

        assert_eq!(handler.finished, vec![b"hello".to_vec()]);
        assert!(handler.download.is_empty());
        assert_eq!(handler.final_chunks, 1);
        assert_eq!(handler.events.last(), Some(&ObservedEvent::DownloadAborted));
    }

    #[test]
    fn test_static_namespaces_longest_prefix() {
        let registry = StaticNamespaces::new(
            vec![
                Namespace {
                    kind: NamespaceType::Personal,
                    prefix: String::new(),
                    delimiter: Some('/'),
                },
                Namespace {
                    kind: NamespaceType::OtherUsers,
                    prefix: "~".into(),
                    delimiter: Some('/'),
                },
                Namespace {
                    kind: NamespaceType::Public,
                    prefix: "#public.".into(),
                    delimiter: Some('.'),
                },
            ],
            '^',
        );
        assert_eq!(registry.namespace_type_for("s", "Drafts"), NamespaceType::Personal);
        assert_eq!(registry.namespace_type_for("s", "~fred/Mail"), NamespaceType::OtherUsers);
        assert_eq!(registry.namespace_type_for("s", "#public.news"), NamespaceType::Public);
        assert_eq!(registry.hierarchy_delimiter_for("s", "#public.news"), '.');
    }

    #[test]
    fn test_inbox_prefix_is_case_insensitive() {
        let registry = StaticNamespaces::new(
            vec![Namespace {
                kind: NamespaceType::Personal,
                prefix: "INBOX.".into(),
                delimiter: Some('.'),
            }],
            '/',
        );
        assert_eq!(registry.namespace_type_for("s", "inbox.Sent"), NamespaceType::Personal);
        assert_eq!(registry.namespace_type_for("s", "Other"), NamespaceType::Unknown);
        assert_eq!(registry.hierarchy_delimiter_for("s", "Other"), '/');
    }
}
