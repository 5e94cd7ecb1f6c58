//! Response codes.

use super::{Capabilities, Flag, Uid, UidValidity};

/// Bracketed `resp-text-code` of a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY: capability set sent inline.
    Capability(Capabilities),
    /// PARSE: Error parsing message.
    Parse,
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(UidValidity),
    /// UNSEEN: First unseen message sequence number.
    Unseen(u32),
    /// APPENDUID: UID assigned to appended message.
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: UidValidity,
        /// UID of the appended message.
        uid: Uid,
    },
    /// COPYUID: UID sets of copied messages, kept in wire form.
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: UidValidity,
        /// Source UID set.
        source: String,
        /// Destination UID set.
        destination: String,
    },
    /// HIGHESTMODSEQ: Highest mod-sequence value (CONDSTORE).
    HighestModSeq(u64),
    /// NOMODSEQ: Server doesn't support mod-sequences for this mailbox.
    NoModSeq,
    /// MYRIGHTS: rights on the selected mailbox (unsolicited form).
    MyRights(String),
    /// Unknown response code name.
    Unknown(String),
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
    fn test_capability_code_holds_bitset() {
        let caps = Capabilities::from_tokens(["IMAP4rev1", "IDLE"]);
        let code = ResponseCode::Capability(caps);
        if let ResponseCode::Capability(c) = code {
            assert!(c.contains(Capabilities::IDLE));
        } else {
            panic!("Expected Capability variant");
        }
    }

    #[test]
    fn test_append_uid_fields() {
        let code = ResponseCode::AppendUid {
            uid_validity: UidValidity::new(38505).unwrap(),
            uid: Uid::new(3955).unwrap(),
        };
        if let ResponseCode::AppendUid { uid_validity, uid } = code {
            assert_eq!(uid_validity.get(), 38505);
            assert_eq!(uid.get(), 3955);
        } else {
            panic!("Expected AppendUid variant");
        }
    }
}
