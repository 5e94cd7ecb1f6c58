//! Mailbox snapshots handed to the session.
//!
//! SELECT/EXAMINE responses arrive as a series of untagged lines (FLAGS,
//! EXISTS, RECENT, OK [UIDVALIDITY ...], ...). [`MailboxSpecBuilder`]
//! collects them until the tagged OK turns them into a [`MailboxSpec`].
//! LIST/LSUB/XLIST and STATUS entries become specs directly.

use crate::handler::NamespaceRegistry;
use crate::types::{
    BoxFlags, Flag, ListKind, MailboxMetadata, MessageFlags, NamespaceType, StatusCounts, Uid,
    UidValidity, UserFlagSupport,
};

/// Immutable description of one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSpec {
    /// Mailbox name; `INBOX` in canonical case.
    pub name: String,
    /// Hierarchy delimiter; `None` for a flat name.
    pub hierarchy_delimiter: Option<char>,
    /// Namespace the name belongs to.
    pub namespace: NamespaceType,
    /// LIST attributes plus namespace bits.
    pub box_flags: BoxFlags,
    /// Counts and flags; only filled for SELECT and STATUS.
    pub metadata: MailboxMetadata,
    /// True if this describes the mailbox just selected.
    pub folder_selected: bool,
}

/// Accumulates the untagged data of a SELECT/EXAMINE response.
#[derive(Debug, Clone, Default)]
pub struct MailboxSpecBuilder {
    metadata: MailboxMetadata,
    got_permanent_flags: bool,
}

impl MailboxSpecBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything; called when a SELECT/EXAMINE starts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Snapshot of the data collected so far.
    #[must_use]
    pub const fn metadata(&self) -> &MailboxMetadata {
        &self.metadata
    }

    /// EXISTS.
    pub fn set_exists(&mut self, exists: u32) {
        self.metadata.exists = exists;
    }

    /// RECENT.
    pub fn set_recent(&mut self, recent: u32) {
        self.metadata.recent = recent;
    }

    /// `[UNSEEN n]`.
    pub fn set_unseen(&mut self, unseen: u32) {
        self.metadata.unseen = unseen;
    }

    /// `[UIDVALIDITY n]`.
    pub fn set_uid_validity(&mut self, uid_validity: UidValidity) {
        self.metadata.uid_validity = Some(uid_validity);
    }

    /// `[UIDNEXT n]`.
    pub fn set_next_uid(&mut self, next_uid: Uid) {
        self.metadata.next_uid = Some(next_uid);
    }

    /// `[HIGHESTMODSEQ n]`, or 0 for `[NOMODSEQ]`.
    pub fn set_highest_mod_seq(&mut self, mod_seq: u64) {
        self.metadata.highest_mod_seq = Some(mod_seq);
    }

    /// A FETCH MODSEQ seen while selecting; only ever raises the value.
    pub fn raise_highest_mod_seq(&mut self, mod_seq: u64) {
        if self.metadata.highest_mod_seq.is_none_or(|highest| mod_seq > highest) {
            self.metadata.highest_mod_seq = Some(mod_seq);
        }
    }

    /// `[READ-ONLY]` / `[READ-WRITE]`.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.metadata.read_only = read_only;
    }

    /// Applies an untagged FLAGS line.
    ///
    /// Ignored once PERMANENTFLAGS was seen, which is the more precise list.
    pub fn apply_flags(&mut self, flags: &[Flag]) {
        if self.got_permanent_flags {
            return;
        }
        let support = UserFlagSupport::from_flags(flags);
        let (bits, _) = MessageFlags::classify(flags, support);
        self.metadata.permanent_flags = bits;
        self.metadata.user_flags = support;
    }

    /// Applies `[PERMANENTFLAGS (...)]`.
    ///
    /// A list without any settable flag keeps the previous settable set.
    pub fn apply_permanent_flags(&mut self, flags: &[Flag]) {
        self.got_permanent_flags = true;
        let support = UserFlagSupport::from_flags(flags);
        let (bits, _) = MessageFlags::classify(flags, support);
        if bits.is_empty() && support.is_empty() {
            return;
        }
        self.metadata.permanent_flags = bits;
        self.metadata.user_flags = support;
        self.metadata.supports_user_defined_flags = support.contains(UserFlagSupport::USER_DEFINED);
    }

    /// Builds the spec of the mailbox being selected.
    #[must_use]
    pub fn build(
        &self,
        name: &str,
        registry: &dyn NamespaceRegistry,
        server_key: &str,
    ) -> MailboxSpec {
        let name = canonical_name(name);
        let namespace = registry.namespace_type_for(server_key, &name);
        MailboxSpec {
            hierarchy_delimiter: Some(registry.hierarchy_delimiter_for(server_key, &name)),
            namespace,
            box_flags: BoxFlags::for_namespace(namespace),
            metadata: self.metadata.clone(),
            folder_selected: true,
            name,
        }
    }

    /// Builds the spec of a LIST, LSUB or XLIST entry.
    ///
    /// The delimiter from the wire wins; `None` there means a flat name.
    #[must_use]
    pub fn listed(
        name: &str,
        delimiter: Option<char>,
        attributes: BoxFlags,
        kind: ListKind,
        registry: &dyn NamespaceRegistry,
        server_key: &str,
    ) -> MailboxSpec {
        let name = canonical_name(name);
        let namespace = registry.namespace_type_for(server_key, &name);
        let mut box_flags = attributes | BoxFlags::for_namespace(namespace);
        if kind == ListKind::Lsub {
            box_flags |= BoxFlags::LSUB;
        }
        MailboxSpec {
            hierarchy_delimiter: delimiter,
            namespace,
            box_flags,
            metadata: MailboxMetadata::default(),
            folder_selected: false,
            name,
        }
    }

    /// Builds the spec of a STATUS response.
    #[must_use]
    pub fn status_spec(
        name: &str,
        counts: &StatusCounts,
        registry: &dyn NamespaceRegistry,
        server_key: &str,
    ) -> MailboxSpec {
        let name = canonical_name(name);
        let namespace = registry.namespace_type_for(server_key, &name);
        MailboxSpec {
            hierarchy_delimiter: Some(registry.hierarchy_delimiter_for(server_key, &name)),
            namespace,
            box_flags: BoxFlags::for_namespace(namespace),
            metadata: MailboxMetadata {
                uid_validity: counts.uid_validity,
                highest_mod_seq: counts.highest_mod_seq,
                exists: counts.messages.unwrap_or_default(),
                unseen: counts.unseen.unwrap_or_default(),
                recent: counts.recent.unwrap_or_default(),
                next_uid: counts.uid_next,
                ..MailboxMetadata::default()
            },
            folder_selected: false,
            name,
        }
    }
}

fn canonical_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("INBOX") {
        "INBOX".to_string()
    } else {
        name.to_string()
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
    use crate::handler::{NoNamespaces, StaticNamespaces};
    use crate::types::Namespace;

    fn flags(list: &[&str]) -> Vec<Flag> {
        list.iter().map(|s| Flag::parse(s)).collect()
    }

    #[test]
    fn test_select_spec() {
        let mut builder = MailboxSpecBuilder::new();
        builder.set_exists(172);
        builder.set_recent(1);
        builder.set_unseen(12);
        builder.set_uid_validity(UidValidity::new(3857529045).unwrap());
        builder.set_next_uid(Uid::new(4392).unwrap());
        builder.apply_flags(&flags(&["\\Answered", "\\Flagged", "\\Deleted", "\\Seen", "\\Draft"]));
        builder.apply_permanent_flags(&flags(&["\\Deleted", "\\Seen", "\\*"]));

        let spec = builder.build("inbox", &NoNamespaces::default(), "server");
        assert_eq!(spec.name, "INBOX");
        assert!(spec.folder_selected);
        assert_eq!(spec.hierarchy_delimiter, Some('/'));
        assert_eq!(spec.metadata.exists, 172);
        assert_eq!(spec.metadata.next_uid, Uid::new(4392));
        assert_eq!(
            spec.metadata.permanent_flags,
            MessageFlags::DELETED | MessageFlags::SEEN
        );
        assert!(spec.metadata.supports_user_defined_flags);
    }

    #[test]
    fn test_flags_after_permanent_flags_ignored() {
        let mut builder = MailboxSpecBuilder::new();
        builder.apply_permanent_flags(&flags(&["\\Seen"]));
        builder.apply_flags(&flags(&["\\Seen", "\\Deleted"]));
        assert_eq!(builder.metadata().permanent_flags, MessageFlags::SEEN);
    }

    #[test]
    fn test_fetch_mod_seq_only_raises() {
        let mut builder = MailboxSpecBuilder::new();
        builder.raise_highest_mod_seq(40);
        assert_eq!(builder.metadata().highest_mod_seq, Some(40));
        builder.set_highest_mod_seq(500);
        builder.raise_highest_mod_seq(90);
        assert_eq!(builder.metadata().highest_mod_seq, Some(500));
        builder.raise_highest_mod_seq(900);
        assert_eq!(builder.metadata().highest_mod_seq, Some(900));
    }

    #[test]
    fn test_empty_permanent_flags_keep_previous() {
        let mut builder = MailboxSpecBuilder::new();
        builder.apply_flags(&flags(&["\\Seen", "\\Deleted"]));
        builder.apply_permanent_flags(&[]);
        assert_eq!(
            builder.metadata().permanent_flags,
            MessageFlags::SEEN | MessageFlags::DELETED
        );
    }

    #[test]
    fn test_listed_spec() {
        let registry = StaticNamespaces::new(
            vec![Namespace {
                kind: NamespaceType::Public,
                prefix: "#shared.".into(),
                delimiter: Some('.'),
            }],
            '/',
        );
        let spec = MailboxSpecBuilder::listed(
            "#shared.news",
            Some('.'),
            BoxFlags::HAS_NO_CHILDREN,
            ListKind::Lsub,
            &registry,
            "server",
        );
        assert_eq!(spec.namespace, NamespaceType::Public);
        assert!(
            spec.box_flags
                .contains(BoxFlags::PUBLIC | BoxFlags::LSUB | BoxFlags::HAS_NO_CHILDREN)
        );
        assert!(!spec.folder_selected);
    }

    #[test]
    fn test_status_spec() {
        let counts = StatusCounts {
            messages: Some(231),
            uid_next: Uid::new(44292),
            ..StatusCounts::default()
        };
        let spec =
            MailboxSpecBuilder::status_spec("blurdybloop", &counts, &NoNamespaces::new('.'), "s");
        assert_eq!(spec.metadata.exists, 231);
        assert_eq!(spec.metadata.next_uid, Uid::new(44292));
        assert_eq!(spec.hierarchy_delimiter, Some('.'));
        assert!(!spec.folder_selected);
    }
}
