//! Per-message flag and UID bookkeeping.
//!
//! FETCH lines report FLAGS and UID in any order. Values are accumulated
//! for the line being parsed and only published once the line carries
//! everything the originating command asked for. Published records also
//! update the mailbox-wide table indexed by sequence number.

use std::collections::HashMap;

use tracing::trace;

use crate::types::{MessageFlags, SeqNum, Uid, UserFlagSupport};

/// FETCH items the originating command asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchExpectations {
    /// FLAGS was requested.
    pub flags: bool,
    /// UID was requested (explicitly or through UID FETCH).
    pub uid: bool,
}

/// Everything one FETCH line said about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFetchRecord {
    /// Sequence number the line was reported for.
    pub sequence_number: SeqNum,
    /// UID, from the line or from the table.
    pub uid: Uid,
    /// Flag bits, if FLAGS was on the line.
    pub flags: Option<MessageFlags>,
    /// Keywords without a dedicated bit, in wire order.
    pub custom_keywords: Vec<String>,
    /// RFC822.SIZE.
    pub size_octets: Option<u32>,
    /// MODSEQ.
    pub mod_seq: Option<u64>,
}

#[derive(Debug, Clone)]
struct PendingFetch {
    sequence_number: SeqNum,
    expectations: FetchExpectations,
    flags: Option<(MessageFlags, Vec<String>)>,
    uid: Option<Uid>,
    size_octets: Option<u32>,
    mod_seq: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    uid: Uid,
    flags: MessageFlags,
}

/// Flag/UID accumulator plus the selected mailbox's message table.
#[derive(Debug, Clone, Default)]
pub struct FlagAndUidState {
    messages: Vec<Option<TableEntry>>,
    custom_flags: HashMap<Uid, Vec<String>>,
    highest_uid: Option<Uid>,
    supported_user_flags: UserFlagSupport,
    pending: Option<PendingFetch>,
}

impl FlagAndUidState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accumulating a FETCH line for `sequence_number`.
    ///
    /// Anything left over from an unfinished line is dropped.
    pub fn begin_line(&mut self, sequence_number: SeqNum, expectations: FetchExpectations) {
        self.pending = Some(PendingFetch {
            sequence_number,
            expectations,
            flags: None,
            uid: None,
            size_octets: None,
            mod_seq: None,
        });
    }

    /// Records the FLAGS of the current line.
    pub fn record_flags(&mut self, flags: MessageFlags, custom_keywords: Vec<String>) {
        if let Some(pending) = &mut self.pending {
            pending.flags = Some((flags, custom_keywords));
        }
    }

    /// Records the UID of the current line.
    pub fn record_uid(&mut self, uid: Uid) {
        if let Some(pending) = &mut self.pending {
            pending.uid = Some(uid);
        }
    }

    /// Records RFC822.SIZE of the current line.
    pub fn record_size(&mut self, size: u32) {
        if let Some(pending) = &mut self.pending {
            pending.size_octets = Some(size);
        }
    }

    /// Records MODSEQ of the current line.
    pub fn record_mod_seq(&mut self, mod_seq: u64) {
        if let Some(pending) = &mut self.pending {
            pending.mod_seq = Some(mod_seq);
        }
    }

    /// UID recorded on the current line so far.
    #[must_use]
    pub fn pending_uid(&self) -> Option<Uid> {
        self.pending.as_ref().and_then(|p| p.uid)
    }

    /// Returns true if the current line can be published.
    ///
    /// Each of FLAGS and UID must either have been seen, or not have been
    /// requested. A UID that was not requested must still be known from
    /// the table.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        let flags_ok = pending.flags.is_some() || !pending.expectations.flags;
        let uid_ok = pending.uid.is_some()
            || (!pending.expectations.uid && self.uid_of(pending.sequence_number).is_some());
        flags_ok && uid_ok
    }

    /// Ends the current line.
    ///
    /// Returns the record if the line was complete and applies it to the
    /// table. Accumulated values are cleared either way.
    pub fn publish(&mut self) -> Option<MessageFetchRecord> {
        if !self.is_complete() {
            if let Some(pending) = self.pending.take() {
                trace!(seq = %pending.sequence_number, "incomplete FETCH line not published");
            }
            return None;
        }
        let pending = self.pending.take()?;
        let seq = pending.sequence_number;
        let uid = pending.uid.or_else(|| self.uid_of(seq))?;

        let (flags, custom_keywords) = match pending.flags {
            Some((bits, keywords)) => {
                self.clear_custom_flags(uid);
                if !keywords.is_empty() {
                    self.custom_flags.insert(uid, keywords.clone());
                }
                (Some(bits), keywords)
            }
            None => (None, Vec::new()),
        };

        let index = seq.get() as usize - 1;
        if self.messages.len() <= index {
            self.messages.resize(index + 1, None);
        }
        let previous = self.messages[index].filter(|entry| entry.uid == uid);
        self.messages[index] = Some(TableEntry {
            uid,
            flags: flags.or(previous.map(|entry| entry.flags)).unwrap_or_default(),
        });
        if self.highest_uid.is_none_or(|highest| uid > highest) {
            self.highest_uid = Some(uid);
        }

        Some(MessageFetchRecord {
            sequence_number: seq,
            uid,
            flags,
            custom_keywords,
            size_octets: pending.size_octets,
            mod_seq: pending.mod_seq,
        })
    }

    /// Drops the current line without publishing.
    pub fn discard_line(&mut self) {
        self.pending = None;
    }

    /// Forgets the keywords stored for `uid`.
    pub fn clear_custom_flags(&mut self, uid: Uid) {
        self.custom_flags.remove(&uid);
    }

    /// Keywords last reported for `uid`.
    #[must_use]
    pub fn custom_flags(&self, uid: Uid) -> &[String] {
        self.custom_flags.get(&uid).map(Vec::as_slice).unwrap_or_default()
    }

    /// UID of the message at `seq`, if known.
    #[must_use]
    pub fn uid_of(&self, seq: SeqNum) -> Option<Uid> {
        self.entry(seq).map(|entry| entry.uid)
    }

    /// Flags of the message at `seq`, if known.
    #[must_use]
    pub fn flags_of(&self, seq: SeqNum) -> Option<MessageFlags> {
        self.entry(seq).map(|entry| entry.flags)
    }

    fn entry(&self, seq: SeqNum) -> Option<TableEntry> {
        self.messages.get(seq.get() as usize - 1).copied().flatten()
    }

    /// Removes `seq` from the table; later messages move down by one.
    pub fn expunge(&mut self, seq: SeqNum) {
        let index = seq.get() as usize - 1;
        if index < self.messages.len() {
            if let Some(entry) = self.messages.remove(index) {
                self.custom_flags.remove(&entry.uid);
            }
        }
    }

    /// Number of sequence slots with a known message.
    #[must_use]
    pub fn known_messages(&self) -> usize {
        self.messages.iter().flatten().count()
    }

    /// Highest UID recorded since the last reset.
    #[must_use]
    pub const fn highest_uid(&self) -> Option<Uid> {
        self.highest_uid
    }

    /// Forgets the highest UID (new UIDVALIDITY epoch).
    pub fn reset_highest_uid(&mut self) {
        self.highest_uid = None;
    }

    /// Keyword storage support of the selected mailbox.
    #[must_use]
    pub const fn supported_user_flags(&self) -> UserFlagSupport {
        self.supported_user_flags
    }

    /// Sets keyword storage support of the selected mailbox.
    pub fn set_supported_user_flags(&mut self, support: UserFlagSupport) {
        self.supported_user_flags = support;
    }

    /// Clears everything; called when a new mailbox is being selected.
    pub fn reset(&mut self) {
        *self = Self::default();
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

    const BOTH: FetchExpectations = FetchExpectations {
        flags: true,
        uid: true,
    };

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn test_needs_flags_and_uid() {
        let mut state = FlagAndUidState::new();
        state.begin_line(seq(1), BOTH);
        state.record_uid(uid(42));
        assert!(!state.is_complete());
        state.record_flags(MessageFlags::SEEN, Vec::new());
        assert!(state.is_complete());

        let record = state.publish().unwrap();
        assert_eq!(record.uid, uid(42));
        assert_eq!(record.flags, Some(MessageFlags::SEEN));
        assert_eq!(state.uid_of(seq(1)), Some(uid(42)));
        assert_eq!(state.highest_uid(), Some(uid(42)));
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut a = FlagAndUidState::new();
        a.begin_line(seq(3), BOTH);
        a.record_flags(MessageFlags::SEEN, vec!["work".into()]);
        a.record_uid(uid(7));

        let mut b = FlagAndUidState::new();
        b.begin_line(seq(3), BOTH);
        b.record_uid(uid(7));
        b.record_flags(MessageFlags::SEEN, vec!["work".into()]);

        assert_eq!(a.publish(), b.publish());
    }

    #[test]
    fn test_incomplete_line_is_dropped() {
        let mut state = FlagAndUidState::new();
        state.begin_line(seq(1), BOTH);
        state.record_flags(MessageFlags::SEEN, Vec::new());
        assert!(state.publish().is_none());
        assert!(!state.is_complete());
        assert_eq!(state.known_messages(), 0);
    }

    #[test]
    fn test_unrequested_uid_resolved_from_table() {
        let mut state = FlagAndUidState::new();
        state.begin_line(seq(2), BOTH);
        state.record_uid(uid(20));
        state.record_flags(MessageFlags::empty(), Vec::new());
        state.publish().unwrap();

        // Unsolicited flag change without UID.
        let expectations = FetchExpectations::default();
        state.begin_line(seq(2), expectations);
        state.record_flags(MessageFlags::DELETED, Vec::new());
        let record = state.publish().unwrap();
        assert_eq!(record.uid, uid(20));
        assert_eq!(state.flags_of(seq(2)), Some(MessageFlags::DELETED));

        state.begin_line(seq(9), expectations);
        state.record_flags(MessageFlags::DELETED, Vec::new());
        assert!(state.publish().is_none());
    }

    #[test]
    fn test_custom_flags_replaced_not_merged() {
        let mut state = FlagAndUidState::new();
        state.begin_line(seq(1), BOTH);
        state.record_uid(uid(5));
        state.record_flags(MessageFlags::CUSTOM_KEYWORD, vec!["a".into(), "b".into()]);
        state.publish().unwrap();
        assert_eq!(state.custom_flags(uid(5)), ["a", "b"]);

        state.begin_line(seq(1), BOTH);
        state.record_uid(uid(5));
        state.record_flags(MessageFlags::empty(), Vec::new());
        state.publish().unwrap();
        assert!(state.custom_flags(uid(5)).is_empty());
    }

    #[test]
    fn test_expunge_shifts_table() {
        let mut state = FlagAndUidState::new();
        for (s, u) in [(1, 10), (2, 11), (3, 12)] {
            state.begin_line(seq(s), BOTH);
            state.record_uid(uid(u));
            state.record_flags(MessageFlags::empty(), Vec::new());
            state.publish().unwrap();
        }
        state.expunge(seq(2));
        assert_eq!(state.uid_of(seq(1)), Some(uid(10)));
        assert_eq!(state.uid_of(seq(2)), Some(uid(12)));
        assert_eq!(state.uid_of(seq(3)), None);
        assert_eq!(state.known_messages(), 2);

        state.expunge(seq(50));
        assert_eq!(state.known_messages(), 2);
    }

    #[test]
    fn test_uid_only_line_keeps_flags() {
        let mut state = FlagAndUidState::new();
        state.begin_line(seq(1), BOTH);
        state.record_uid(uid(3));
        state.record_flags(MessageFlags::FLAGGED, Vec::new());
        state.publish().unwrap();

        let uid_only = FetchExpectations {
            flags: false,
            uid: true,
        };
        state.begin_line(seq(1), uid_only);
        state.record_uid(uid(3));
        state.record_size(120);
        let record = state.publish().unwrap();
        assert_eq!(record.flags, None);
        assert_eq!(record.size_octets, Some(120));
        assert_eq!(state.flags_of(seq(1)), Some(MessageFlags::FLAGGED));
    }

    #[test]
    fn test_reset() {
        let mut state = FlagAndUidState::new();
        state.set_supported_user_flags(UserFlagSupport::USER_DEFINED);
        state.begin_line(seq(1), BOTH);
        state.record_uid(uid(3));
        state.record_flags(MessageFlags::empty(), Vec::new());
        state.publish().unwrap();
        state.reset();
        assert_eq!(state.known_messages(), 0);
        assert_eq!(state.highest_uid(), None);
        assert!(state.supported_user_flags().is_empty());
    }
}
