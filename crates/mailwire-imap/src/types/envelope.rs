//! ENVELOPE structure.

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Email address from envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part), or group name when `host` is `None`.
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns the full email address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    /// Returns true for an RFC 2822 group start or end marker.
    #[must_use]
    pub const fn is_group_marker(&self) -> bool {
        self.host.is_none()
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
    fn test_email() {
        let addr = Address {
            name: Some("Terry Gray".into()),
            adl: None,
            mailbox: Some("gray".into()),
            host: Some("cac.washington.edu".into()),
        };
        assert_eq!(addr.email().unwrap(), "gray@cac.washington.edu");
        assert!(!addr.is_group_marker());
    }

    #[test]
    fn test_group_marker() {
        let addr = Address {
            name: None,
            adl: None,
            mailbox: Some("undisclosed-recipients".into()),
            host: None,
        };
        assert!(addr.email().is_none());
        assert!(addr.is_group_marker());
    }
}
