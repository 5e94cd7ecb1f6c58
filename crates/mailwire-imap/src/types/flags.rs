//! Message flags.

use bitflags::bitflags;

/// One flag token as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// `$Forwarded` keyword.
    Forwarded,
    /// `$MDNSent` keyword.
    MdnSent,
    /// `\*`: the server accepts new keywords (PERMANENTFLAGS only).
    Wildcard,
    /// Any other keyword.
    Keyword(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            "$FORWARDED" => Self::Forwarded,
            "$MDNSENT" => Self::MdnSent,
            "\\*" => Self::Wildcard,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Forwarded => "$Forwarded",
            Self::MdnSent => "$MDNSent",
            Self::Wildcard => "\\*",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    /// Flag bitmask of one message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u16 {
        /// `\Seen`
        const SEEN           = 1 << 0;
        /// `\Answered`
        const ANSWERED       = 1 << 1;
        /// `\Flagged`
        const FLAGGED        = 1 << 2;
        /// `\Deleted`
        const DELETED        = 1 << 3;
        /// `\Draft`
        const DRAFT          = 1 << 4;
        /// `\Recent`
        const RECENT         = 1 << 5;
        /// `$Forwarded`
        const FORWARDED      = 1 << 6;
        /// `$MDNSent`
        const MDN_SENT       = 1 << 7;
        /// At least one custom keyword is set.
        const CUSTOM_KEYWORD = 1 << 8;
    }
}

bitflags! {
    /// Which keyword flags a mailbox lets the client store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UserFlagSupport: u8 {
        /// `\*` present: arbitrary keywords can be created.
        const USER_DEFINED = 1 << 0;
        /// `$Forwarded` can be stored.
        const FORWARDED    = 1 << 1;
        /// `$MDNSent` can be stored.
        const MDN_SENT     = 1 << 2;
        /// All of `$Label1` .. `$Label5` can be stored.
        const LABELS       = 1 << 3;
    }
}

impl MessageFlags {
    /// Returns the bit for a system flag or known keyword.
    ///
    /// Keywords only map to a bit when the mailbox supports storing them;
    /// otherwise `None` is returned and the caller keeps them as custom keywords.
    #[must_use]
    pub fn for_flag(flag: &Flag, support: UserFlagSupport) -> Option<Self> {
        match flag {
            Flag::Seen => Some(Self::SEEN),
            Flag::Answered => Some(Self::ANSWERED),
            Flag::Flagged => Some(Self::FLAGGED),
            Flag::Deleted => Some(Self::DELETED),
            Flag::Draft => Some(Self::DRAFT),
            Flag::Recent => Some(Self::RECENT),
            Flag::Forwarded
                if support.intersects(UserFlagSupport::FORWARDED | UserFlagSupport::USER_DEFINED) =>
            {
                Some(Self::FORWARDED)
            }
            Flag::MdnSent
                if support.intersects(UserFlagSupport::MDN_SENT | UserFlagSupport::USER_DEFINED) =>
            {
                Some(Self::MDN_SENT)
            }
            _ => None,
        }
    }

    /// Splits a parsed flag list into a bitmask and the remaining keywords.
    ///
    /// Keywords keep first-seen order and are deduplicated case-insensitively.
    #[must_use]
    pub fn classify(flags: &[Flag], support: UserFlagSupport) -> (Self, Vec<String>) {
        let mut bits = Self::empty();
        let mut keywords: Vec<String> = Vec::new();
        for flag in flags {
            if let Some(bit) = Self::for_flag(flag, support) {
                bits |= bit;
            } else if !matches!(flag, Flag::Wildcard) {
                let name = flag.as_str();
                if !keywords.iter().any(|k| k.eq_ignore_ascii_case(name)) {
                    keywords.push(name.to_string());
                }
            }
        }
        if !keywords.is_empty() {
            bits |= Self::CUSTOM_KEYWORD;
        }
        (bits, keywords)
    }
}

impl UserFlagSupport {
    /// Derives keyword support from a FLAGS or PERMANENTFLAGS list.
    #[must_use]
    pub fn from_flags(flags: &[Flag]) -> Self {
        let mut support = Self::empty();
        let mut labels = 0u8;
        for flag in flags {
            match flag {
                Flag::Wildcard => support |= Self::USER_DEFINED,
                Flag::Forwarded => support |= Self::FORWARDED,
                Flag::MdnSent => support |= Self::MDN_SENT,
                Flag::Keyword(k) => {
                    if let Some(n) = label_number(k) {
                        labels |= 1 << (n - 1);
                    }
                }
                _ => {}
            }
        }
        if labels == 0b1_1111 {
            support |= Self::LABELS;
        }
        support
    }
}

/// Returns `n` for `$Label1` .. `$Label5`.
fn label_number(keyword: &str) -> Option<u8> {
    let rest = keyword.get(..6)?;
    if !rest.eq_ignore_ascii_case("$label") {
        return None;
    }
    match keyword.get(6..)? {
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        "5" => Some(5),
        _ => None,
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

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_system_flags() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\answered"), Flag::Answered);
            assert_eq!(Flag::parse("\\Recent"), Flag::Recent);
        }

        #[test]
        fn parse_known_keywords() {
            assert_eq!(Flag::parse("$MDNSent"), Flag::MdnSent);
            assert_eq!(Flag::parse("$forwarded"), Flag::Forwarded);
            assert_eq!(Flag::parse("\\*"), Flag::Wildcard);
        }

        #[test]
        fn parse_keyword() {
            let flag = Flag::parse("$Important");
            assert_eq!(flag, Flag::Keyword("$Important".to_string()));
            assert_eq!(flag.to_string(), "$Important");
        }
    }

    mod classify_tests {
        use super::*;

        #[test]
        fn system_flags_become_bits() {
            let flags = [Flag::Seen, Flag::Deleted];
            let (bits, keywords) = MessageFlags::classify(&flags, UserFlagSupport::empty());
            assert_eq!(bits, MessageFlags::SEEN | MessageFlags::DELETED);
            assert!(keywords.is_empty());
        }

        #[test]
        fn keywords_set_custom_bit() {
            let flags = [
                Flag::Seen,
                Flag::Keyword("work".into()),
                Flag::Keyword("WORK".into()),
                Flag::Keyword("later".into()),
            ];
            let (bits, keywords) = MessageFlags::classify(&flags, UserFlagSupport::empty());
            assert!(bits.contains(MessageFlags::CUSTOM_KEYWORD));
            assert_eq!(keywords, vec!["work".to_string(), "later".to_string()]);
        }

        #[test]
        fn known_keywords_need_support() {
            let flags = [Flag::MdnSent];
            let (bits, keywords) = MessageFlags::classify(&flags, UserFlagSupport::empty());
            assert_eq!(bits, MessageFlags::CUSTOM_KEYWORD);
            assert_eq!(keywords, vec!["$MDNSent".to_string()]);

            let (bits, keywords) = MessageFlags::classify(&flags, UserFlagSupport::USER_DEFINED);
            assert_eq!(bits, MessageFlags::MDN_SENT);
            assert!(keywords.is_empty());
        }
    }

    mod support_tests {
        use super::*;

        #[test]
        fn wildcard_means_user_defined() {
            let support = UserFlagSupport::from_flags(&[Flag::Seen, Flag::Wildcard]);
            assert_eq!(support, UserFlagSupport::USER_DEFINED);
        }

        #[test]
        fn labels_need_all_five() {
            let mut flags: Vec<Flag> = (1..=4)
                .map(|n| Flag::Keyword(format!("$Label{n}")))
                .collect();
            assert!(!UserFlagSupport::from_flags(&flags).contains(UserFlagSupport::LABELS));

            flags.push(Flag::Keyword("$label5".into()));
            assert!(UserFlagSupport::from_flags(&flags).contains(UserFlagSupport::LABELS));
        }
    }
}
