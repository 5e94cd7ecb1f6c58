//! Server capabilities and response status.

use bitflags::bitflags;

/// Response status of a `resp-cond-state` / `resp-cond-bye` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses a status atom case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Negotiated capability set of one connection.
    ///
    /// Rebuilt wholesale from every CAPABILITY response; never merged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u64 {
        /// A CAPABILITY response has been seen.
        const DEFINED              = 1 << 0;
        /// Plain LOGIN is allowed (cleared by `LOGINDISABLED`).
        const AUTH_OLD_LOGIN       = 1 << 1;
        /// `AUTH=LOGIN`
        const AUTH_LOGIN           = 1 << 2;
        /// `AUTH=PLAIN`
        const AUTH_PLAIN           = 1 << 3;
        /// `AUTH=CRAM-MD5`
        const AUTH_CRAM_MD5        = 1 << 4;
        /// `AUTH=NTLM`
        const AUTH_NTLM            = 1 << 5;
        /// `AUTH=GSSAPI`
        const AUTH_GSSAPI          = 1 << 6;
        /// `AUTH=MSN`
        const AUTH_MSN             = 1 << 7;
        /// `AUTH=EXTERNAL`
        const AUTH_EXTERNAL        = 1 << 8;
        /// `STARTTLS`
        const STARTTLS             = 1 << 9;
        /// `XSENDER`
        const XSENDER              = 1 << 10;
        /// `IMAP4`
        const IMAP4                = 1 << 11;
        /// `IMAP4rev1`
        const IMAP4REV1            = 1 << 12;
        /// Pre-IMAP4 server (no IMAP4 or IMAP4rev1 advertised).
        const IMAP4_OTHER          = 1 << 13;
        /// `X-NO-ATOMIC-RENAME` / `X-NON-HIERARCHICAL-RENAME`
        const NO_HIERARCHY_RENAME  = 1 << 14;
        /// `NAMESPACE`
        const NAMESPACE            = 1 << 15;
        /// `ID`
        const ID                   = 1 << 16;
        /// `ACL`
        const ACL                  = 1 << 17;
        /// `XSERVERINFO`
        const XSERVERINFO          = 1 << 18;
        /// `UIDPLUS`
        const UIDPLUS              = 1 << 19;
        /// `LITERAL+`
        const LITERAL_PLUS         = 1 << 20;
        /// `XAOL-OPTION`
        const AOL                  = 1 << 21;
        /// `X-GM-EXT-1`
        const GMAIL                = 1 << 22;
        /// `QUOTA`
        const QUOTA                = 1 << 23;
        /// `LANGUAGE`
        const LANGUAGE             = 1 << 24;
        /// `IDLE`
        const IDLE                 = 1 << 25;
        /// `CONDSTORE`
        const CONDSTORE            = 1 << 26;
        /// `ENABLE`
        const ENABLE               = 1 << 27;
        /// `LIST-EXTENDED`
        const LIST_EXTENDED        = 1 << 28;
        /// `XLIST`
        const XLIST                = 1 << 29;
        /// `SPECIAL-USE`
        const SPECIAL_USE          = 1 << 30;
        /// `COMPRESS=DEFLATE`
        const COMPRESS_DEFLATE     = 1 << 31;
        /// `MOVE`
        const MOVE                 = 1 << 32;
        /// `HIGHESTMODSEQ`
        const HIGHESTMODSEQ        = 1 << 33;
    }
}

impl Capabilities {
    /// Maps one capability token to its bit, or `None` for unrecognized tokens.
    ///
    /// `LOGINDISABLED` is not a bit; it is handled by [`Self::from_tokens`].
    #[must_use]
    pub fn for_token(token: &str) -> Option<Self> {
        let upper = token.to_ascii_uppercase();
        let bit = match upper.as_str() {
            "AUTH=LOGIN" => Self::AUTH_LOGIN,
            "AUTH=PLAIN" => Self::AUTH_PLAIN,
            "AUTH=CRAM-MD5" => Self::AUTH_CRAM_MD5,
            "AUTH=NTLM" => Self::AUTH_NTLM,
            "AUTH=GSSAPI" => Self::AUTH_GSSAPI,
            "AUTH=MSN" => Self::AUTH_MSN,
            "AUTH=EXTERNAL" => Self::AUTH_EXTERNAL,
            "STARTTLS" => Self::STARTTLS,
            "XSENDER" => Self::XSENDER,
            "IMAP4" => Self::IMAP4,
            "IMAP4REV1" => Self::IMAP4REV1,
            "X-NO-ATOMIC-RENAME" | "X-NON-HIERARCHICAL-RENAME" => Self::NO_HIERARCHY_RENAME,
            "NAMESPACE" => Self::NAMESPACE,
            "ID" => Self::ID,
            "ACL" => Self::ACL,
            "XSERVERINFO" => Self::XSERVERINFO,
            "UIDPLUS" => Self::UIDPLUS,
            "LITERAL+" => Self::LITERAL_PLUS,
            "XAOL-OPTION" => Self::AOL,
            "X-GM-EXT-1" => Self::GMAIL,
            "QUOTA" => Self::QUOTA,
            "LANGUAGE" => Self::LANGUAGE,
            "IDLE" => Self::IDLE,
            "CONDSTORE" => Self::CONDSTORE,
            "ENABLE" => Self::ENABLE,
            "LIST-EXTENDED" => Self::LIST_EXTENDED,
            "XLIST" => Self::XLIST,
            "SPECIAL-USE" => Self::SPECIAL_USE,
            "COMPRESS=DEFLATE" => Self::COMPRESS_DEFLATE,
            "MOVE" => Self::MOVE,
            "HIGHESTMODSEQ" => Self::HIGHESTMODSEQ,
            _ => return None,
        };
        Some(bit)
    }

    /// Builds a fresh capability set from the tokens of one CAPABILITY response.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut caps = Self::DEFINED | Self::AUTH_OLD_LOGIN;
        for token in tokens {
            if token.eq_ignore_ascii_case("LOGINDISABLED") {
                caps.remove(Self::AUTH_OLD_LOGIN);
            } else if let Some(bit) = Self::for_token(token) {
                caps.insert(bit);
            } else {
                tracing::trace!(token, "ignoring unrecognized capability");
            }
        }
        if !caps.intersects(Self::IMAP4 | Self::IMAP4REV1) {
            caps.insert(Self::IMAP4_OTHER);
        }
        caps
    }

    /// Returns true if any challenge/response SASL mechanism is advertised.
    #[must_use]
    pub const fn has_challenge_auth(self) -> bool {
        self.intersects(
            Self::AUTH_CRAM_MD5
                .union(Self::AUTH_NTLM)
                .union(Self::AUTH_GSSAPI)
                .union(Self::AUTH_MSN),
        )
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

    mod status_tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(Status::parse("ok"), Some(Status::Ok));
            assert_eq!(Status::parse("No"), Some(Status::No));
            assert_eq!(Status::parse("BAD"), Some(Status::Bad));
            assert_eq!(Status::parse("FETCH"), None);
        }

        #[test]
        fn is_ok_for_preauth() {
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::Bye.is_ok());
        }

        #[test]
        fn display() {
            assert_eq!(Status::Bad.to_string(), "BAD");
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn tokens_map_to_bits() {
            let caps = Capabilities::from_tokens(["IMAP4rev1", "IDLE", "auth=plain", "LITERAL+"]);
            assert!(caps.contains(Capabilities::DEFINED));
            assert!(caps.contains(Capabilities::IMAP4REV1));
            assert!(caps.contains(Capabilities::IDLE));
            assert!(caps.contains(Capabilities::AUTH_PLAIN));
            assert!(caps.contains(Capabilities::LITERAL_PLUS));
            assert!(caps.contains(Capabilities::AUTH_OLD_LOGIN));
            assert!(!caps.contains(Capabilities::IMAP4_OTHER));
        }

        #[test]
        fn login_disabled_clears_old_login() {
            let caps = Capabilities::from_tokens(["IMAP4rev1", "LOGINDISABLED", "STARTTLS"]);
            assert!(!caps.contains(Capabilities::AUTH_OLD_LOGIN));
            assert!(caps.contains(Capabilities::STARTTLS));
        }

        #[test]
        fn unknown_tokens_are_ignored() {
            let caps = Capabilities::from_tokens(["IMAP4rev1", "X-SOMETHING-NEW"]);
            assert_eq!(
                caps,
                Capabilities::DEFINED | Capabilities::AUTH_OLD_LOGIN | Capabilities::IMAP4REV1
            );
        }

        #[test]
        fn pre_imap4_server() {
            let caps = Capabilities::from_tokens(["AUTH=LOGIN"]);
            assert!(caps.contains(Capabilities::IMAP4_OTHER));
        }

        #[test]
        fn challenge_auth() {
            assert!(Capabilities::from_tokens(["AUTH=CRAM-MD5"]).has_challenge_auth());
            assert!(!Capabilities::from_tokens(["AUTH=PLAIN"]).has_challenge_auth());
        }
    }
}
