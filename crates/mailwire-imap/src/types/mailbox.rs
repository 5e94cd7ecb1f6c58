//! Mailbox types.

use bitflags::bitflags;

use super::{MessageFlags, Uid, UidValidity, UserFlagSupport};

/// Snapshot of the selected mailbox.
///
/// Only meaningful while the connection is in the selected state; it is
/// replaced wholesale by SELECT/EXAMINE and dropped by CLOSE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxMetadata {
    /// UIDVALIDITY epoch.
    pub uid_validity: Option<UidValidity>,
    /// Highest mod-sequence; `Some(0)` after NOMODSEQ.
    pub highest_mod_seq: Option<u64>,
    /// Flags the client can store permanently.
    pub permanent_flags: MessageFlags,
    /// Keyword storage support derived from FLAGS/PERMANENTFLAGS.
    pub user_flags: UserFlagSupport,
    /// Whether arbitrary keywords can be created (`\*`).
    pub supports_user_defined_flags: bool,
    /// Number of messages (EXISTS).
    pub exists: u32,
    /// For SELECT: first unseen sequence number. For STATUS: unseen count.
    pub unseen: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Next UID to be assigned.
    pub next_uid: Option<Uid>,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
}

bitflags! {
    /// Attributes of a mailbox from LIST/LSUB/XLIST, plus namespace membership.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BoxFlags: u32 {
        /// `\Marked`
        const MARKED          = 1 << 0;
        /// `\Unmarked`
        const UNMARKED        = 1 << 1;
        /// `\Noinferiors`
        const NO_INFERIORS    = 1 << 2;
        /// `\Noselect`
        const NO_SELECT       = 1 << 3;
        /// `\HasChildren`
        const HAS_CHILDREN    = 1 << 4;
        /// `\HasNoChildren`
        const HAS_NO_CHILDREN = 1 << 5;
        /// `\NonExistent`
        const NON_EXISTENT    = 1 << 6;
        /// `\Subscribed`
        const SUBSCRIBED      = 1 << 7;
        /// `\Drafts`
        const DRAFTS          = 1 << 8;
        /// `\Trash`
        const TRASH           = 1 << 9;
        /// `\Sent`
        const SENT            = 1 << 10;
        /// `\Junk` or `\Spam`
        const JUNK            = 1 << 11;
        /// `\All` or `\AllMail`
        const ALL_MAIL        = 1 << 12;
        /// `\Archive`
        const ARCHIVE         = 1 << 13;
        /// `\Flagged` or `\Starred`
        const FLAGGED         = 1 << 14;
        /// `\Important`
        const IMPORTANT       = 1 << 15;
        /// `\Inbox` (XLIST)
        const INBOX           = 1 << 16;
        /// Name lies in a personal namespace.
        const PERSONAL        = 1 << 17;
        /// Name lies in a shared namespace.
        const PUBLIC          = 1 << 18;
        /// Name lies in another user's namespace.
        const OTHER_USERS     = 1 << 19;
        /// Entry came from LSUB.
        const LSUB            = 1 << 20;
    }
}

impl BoxFlags {
    /// Maps a LIST attribute to its bit.
    #[must_use]
    pub fn for_attribute(attribute: &str) -> Option<Self> {
        let bit = match attribute.to_ascii_uppercase().as_str() {
            "\\MARKED" => Self::MARKED,
            "\\UNMARKED" => Self::UNMARKED,
            "\\NOINFERIORS" => Self::NO_INFERIORS,
            "\\NOSELECT" => Self::NO_SELECT,
            "\\HASCHILDREN" => Self::HAS_CHILDREN,
            "\\HASNOCHILDREN" => Self::HAS_NO_CHILDREN,
            "\\NONEXISTENT" => Self::NON_EXISTENT,
            "\\SUBSCRIBED" => Self::SUBSCRIBED,
            "\\DRAFTS" => Self::DRAFTS,
            "\\TRASH" => Self::TRASH,
            "\\SENT" => Self::SENT,
            "\\JUNK" | "\\SPAM" => Self::JUNK,
            "\\ALL" | "\\ALLMAIL" => Self::ALL_MAIL,
            "\\ARCHIVE" => Self::ARCHIVE,
            "\\FLAGGED" | "\\STARRED" => Self::FLAGGED,
            "\\IMPORTANT" => Self::IMPORTANT,
            "\\INBOX" => Self::INBOX,
            _ => return None,
        };
        Some(bit)
    }

    /// Returns the namespace membership bit for a namespace type.
    #[must_use]
    pub const fn for_namespace(kind: NamespaceType) -> Self {
        match kind {
            NamespaceType::Personal => Self::PERSONAL,
            NamespaceType::Public => Self::PUBLIC,
            NamespaceType::OtherUsers => Self::OTHER_USERS,
            NamespaceType::Unknown => Self::empty(),
        }
    }
}

/// Namespace class of a mailbox name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NamespaceType {
    /// The user's own mailboxes.
    Personal,
    /// Shared mailboxes.
    Public,
    /// Other users' mailboxes.
    OtherUsers,
    /// No namespace information.
    #[default]
    Unknown,
}

/// One entry of a NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Namespace class.
    pub kind: NamespaceType,
    /// Name prefix, for example `"INBOX."` or `"#shared/"`.
    pub prefix: String,
    /// Hierarchy delimiter; `None` for a flat namespace.
    pub delimiter: Option<char>,
}

/// Origin of a mailbox listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// LIST response.
    List,
    /// LSUB response.
    Lsub,
    /// XLIST response.
    Xlist,
}

/// One resource of a QUOTA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name, for example `STORAGE`.
    pub name: String,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// Counters of a STATUS response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// MESSAGES
    pub messages: Option<u32>,
    /// RECENT
    pub recent: Option<u32>,
    /// UIDNEXT
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY
    pub uid_validity: Option<UidValidity>,
    /// UNSEEN
    pub unseen: Option<u32>,
    /// HIGHESTMODSEQ
    pub highest_mod_seq: Option<u64>,
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
    fn test_box_flag_attributes() {
        assert_eq!(BoxFlags::for_attribute("\\Noselect"), Some(BoxFlags::NO_SELECT));
        assert_eq!(BoxFlags::for_attribute("\\NOINFERIORS"), Some(BoxFlags::NO_INFERIORS));
        assert_eq!(BoxFlags::for_attribute("\\Spam"), Some(BoxFlags::JUNK));
        assert_eq!(BoxFlags::for_attribute("\\AllMail"), Some(BoxFlags::ALL_MAIL));
        assert_eq!(BoxFlags::for_attribute("\\Starred"), Some(BoxFlags::FLAGGED));
        assert_eq!(BoxFlags::for_attribute("\\Whatever"), None);
    }

    #[test]
    fn test_namespace_bits() {
        assert_eq!(
            BoxFlags::for_namespace(NamespaceType::Public),
            BoxFlags::PUBLIC
        );
        assert!(BoxFlags::for_namespace(NamespaceType::Unknown).is_empty());
    }

    #[test]
    fn test_metadata_default() {
        let metadata = MailboxMetadata::default();
        assert_eq!(metadata.exists, 0);
        assert!(metadata.uid_validity.is_none());
        assert!(!metadata.read_only);
    }
}
