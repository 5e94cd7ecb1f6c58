//! Core IMAP identifiers.
//!
//! Tags correlate a command with its completion. Sequence numbers, UIDs
//! and UIDVALIDITY values are non-zero 32-bit numbers on the wire.

use std::num::NonZeroU32;

/// IMAP command tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `text` is this tag. Tags compare case-sensitively.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        !self.0.is_empty() && self.0 == text
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            /// Creates the identifier, returning `None` for 0.
            #[must_use]
            pub const fn new(n: u32) -> Option<Self> {
                match NonZeroU32::new(n) {
                    Some(n) => Some(Self(n)),
                    None => None,
                }
            }

            /// Creates the identifier from a wire number, rejecting 0 and
            /// values above `u32::MAX`.
            #[must_use]
            pub fn from_wire(n: u64) -> Option<Self> {
                u32::try_from(n).ok().and_then(Self::new)
            }

            /// Returns the underlying value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

nonzero_id!(
    /// Message sequence number (1-based, shifts on expunge).
    SeqNum
);

nonzero_id!(
    /// Unique identifier of a message within one UIDVALIDITY epoch.
    Uid
);

nonzero_id!(
    /// UIDVALIDITY epoch of a mailbox; a change invalidates cached UIDs.
    UidValidity
);

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
    fn test_tag_matches() {
        let tag = Tag::new("A001");
        assert!(tag.matches("A001"));
        assert!(!tag.matches("a001"));
        assert!(!Tag::new("").matches(""));
        assert_eq!(tag.to_string(), "A001");
    }

    #[test]
    fn test_zero_is_rejected() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::from_wire(0).is_none());
    }

    #[test]
    fn test_from_wire_range() {
        assert_eq!(Uid::from_wire(42).unwrap().get(), 42);
        assert_eq!(
            UidValidity::from_wire(u64::from(u32::MAX)).unwrap().get(),
            u32::MAX
        );
        assert!(Uid::from_wire(u64::from(u32::MAX) + 1).is_none());
    }

    #[test]
    fn test_ordering() {
        assert!(Uid::new(3).unwrap() < Uid::new(10).unwrap());
        assert_eq!(SeqNum::new(7).unwrap().to_string(), "7");
    }
}
