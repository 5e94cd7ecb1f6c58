//! Connection state tracking.
//!
//! This module defines the states of an IMAP connection (RFC 3501
//! section 3) and the transitions driven by tagged completions.

use tracing::debug;

use crate::command::CommandKind;
use crate::types::{Capabilities, MailboxMetadata};

/// Protocol state as defined by RFC 3501.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not authenticated - waiting for credentials.
    #[default]
    NonAuthenticated,
    /// Authenticated - user has logged in.
    Authenticated,
    /// Selected - a mailbox is currently open.
    MailboxSelected,
}

impl ConnectionState {
    /// Returns `true` if we're authenticated (authenticated or selected).
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::MailboxSelected)
    }

    /// Returns `true` if a mailbox is selected.
    #[must_use]
    pub const fn is_selected(self) -> bool {
        matches!(self, Self::MailboxSelected)
    }
}

/// Returns the state after `kind` completed with or without success.
///
/// | Command | OK | NO/BAD |
/// |---|---|---|
/// | LOGIN, AUTHENTICATE | Authenticated | NonAuthenticated |
/// | LOGOUT | NonAuthenticated | unchanged |
/// | SELECT, EXAMINE | MailboxSelected | Authenticated |
/// | CLOSE, UNSELECT | Authenticated | unchanged |
///
/// Any other command leaves the state unchanged. A failed SELECT sent
/// before authentication stays NonAuthenticated.
#[must_use]
pub fn transition(
    kind: &CommandKind,
    from: ConnectionState,
    succeeded: bool,
) -> ConnectionState {
    use ConnectionState::{Authenticated, MailboxSelected, NonAuthenticated};

    match (kind, succeeded) {
        (CommandKind::Login | CommandKind::Authenticate, true) => Authenticated,
        (CommandKind::Login | CommandKind::Authenticate, false) => NonAuthenticated,
        (CommandKind::Logout, true) => NonAuthenticated,
        (CommandKind::Select | CommandKind::Examine, true) => MailboxSelected,
        (CommandKind::Select | CommandKind::Examine, false) if from != NonAuthenticated => {
            Authenticated
        }
        (CommandKind::Close | CommandKind::Unselect, true) => Authenticated,
        _ => from,
    }
}

/// Per-connection state that outlives single responses.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateTracker {
    state: ConnectionState,
    capabilities: Capabilities,
    selected_mailbox: Option<String>,
    mailbox: Option<MailboxMetadata>,
    awaiting_client_input: bool,
    idling: bool,
    condstore_enabled: bool,
    server_id: Vec<(String, Option<String>)>,
}

impl ConnectionStateTracker {
    /// Creates a tracker for a fresh connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Negotiated capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Replaces the capability set.
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    /// Returns true if every bit of `capability` was advertised.
    #[must_use]
    pub const fn has_capability(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    /// Name of the selected mailbox.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.selected_mailbox.as_deref()
    }

    /// Snapshot of the selected mailbox.
    #[must_use]
    pub const fn mailbox(&self) -> Option<&MailboxMetadata> {
        self.mailbox.as_ref()
    }

    /// Mutable snapshot, for count updates while selected.
    pub const fn mailbox_mut(&mut self) -> Option<&mut MailboxMetadata> {
        self.mailbox.as_mut()
    }

    /// Applies the completion of `kind` and returns the new state.
    ///
    /// `mailbox` and `metadata` describe the mailbox a successful
    /// SELECT/EXAMINE opened. Leaving the selected state drops both.
    pub fn complete(
        &mut self,
        kind: &CommandKind,
        succeeded: bool,
        mailbox: Option<&str>,
        metadata: Option<MailboxMetadata>,
    ) -> ConnectionState {
        let next = transition(kind, self.state, succeeded);
        if next != self.state {
            debug!(command = %kind, from = ?self.state, to = ?next, "state transition");
        }

        let opened = succeeded && matches!(kind, CommandKind::Select | CommandKind::Examine);
        if opened {
            self.selected_mailbox = mailbox.map(str::to_string);
            self.mailbox = metadata;
        } else if next != ConnectionState::MailboxSelected {
            self.selected_mailbox = None;
            self.mailbox = None;
        }
        if next == ConnectionState::NonAuthenticated {
            self.awaiting_client_input = false;
            self.idling = false;
        }
        self.state = next;
        next
    }

    /// Moves straight to Authenticated (PREAUTH greeting).
    pub fn pre_authenticate(&mut self) {
        debug!(from = ?self.state, "pre-authenticated");
        self.state = ConnectionState::Authenticated;
    }

    /// Drops to NonAuthenticated after BYE or a fatal error.
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::NonAuthenticated {
            debug!(from = ?self.state, "connection lost");
        }
        self.state = ConnectionState::NonAuthenticated;
        self.selected_mailbox = None;
        self.mailbox = None;
        self.awaiting_client_input = false;
        self.idling = false;
    }

    /// Whether the server is waiting for client data (`+` seen).
    #[must_use]
    pub const fn awaiting_client_input(&self) -> bool {
        self.awaiting_client_input
    }

    /// Sets the awaiting-input sub-state.
    pub fn set_awaiting_client_input(&mut self, awaiting: bool) {
        self.awaiting_client_input = awaiting;
    }

    /// Whether an IDLE command is running.
    #[must_use]
    pub const fn is_idling(&self) -> bool {
        self.idling
    }

    /// Sets the IDLE sub-state.
    pub fn set_idling(&mut self, idling: bool) {
        self.idling = idling;
    }

    /// Whether `ENABLED CONDSTORE` was seen.
    #[must_use]
    pub const fn condstore_enabled(&self) -> bool {
        self.condstore_enabled
    }

    /// Records that CONDSTORE was enabled.
    pub fn enable_condstore(&mut self) {
        self.condstore_enabled = true;
    }

    /// Server ID parameters.
    #[must_use]
    pub fn server_id(&self) -> &[(String, Option<String>)] {
        &self.server_id
    }

    /// Stores server ID parameters.
    pub fn set_server_id(&mut self, id: Vec<(String, Option<String>)>) {
        self.server_id = id;
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
    use ConnectionState::{Authenticated, MailboxSelected, NonAuthenticated};

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), NonAuthenticated);
        assert!(!NonAuthenticated.is_authenticated());
        assert!(MailboxSelected.is_authenticated());
        assert!(MailboxSelected.is_selected());
        assert!(!Authenticated.is_selected());
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(&CommandKind::Login, NonAuthenticated, true), Authenticated);
        assert_eq!(transition(&CommandKind::Login, NonAuthenticated, false), NonAuthenticated);
        assert_eq!(
            transition(&CommandKind::Authenticate, NonAuthenticated, true),
            Authenticated
        );
        assert_eq!(transition(&CommandKind::Logout, MailboxSelected, true), NonAuthenticated);
        assert_eq!(transition(&CommandKind::Logout, Authenticated, false), Authenticated);
        assert_eq!(transition(&CommandKind::Select, Authenticated, true), MailboxSelected);
        assert_eq!(transition(&CommandKind::Examine, MailboxSelected, false), Authenticated);
        assert_eq!(transition(&CommandKind::Select, NonAuthenticated, false), NonAuthenticated);
        assert_eq!(transition(&CommandKind::Close, MailboxSelected, true), Authenticated);
        assert_eq!(transition(&CommandKind::Close, MailboxSelected, false), MailboxSelected);
        assert_eq!(transition(&CommandKind::Unselect, MailboxSelected, true), Authenticated);
    }

    #[test]
    fn test_unrecognized_commands_do_not_move() {
        for state in [NonAuthenticated, Authenticated, MailboxSelected] {
            for ok in [true, false] {
                assert_eq!(transition(&CommandKind::Noop, state, ok), state);
                assert_eq!(transition(&CommandKind::Other("X".into()), state, ok), state);
            }
        }
    }

    #[test]
    fn test_tracker_select_and_close() {
        let mut tracker = ConnectionStateTracker::new();
        tracker.complete(&CommandKind::Login, true, None, None);

        let metadata = MailboxMetadata {
            exists: 3,
            ..MailboxMetadata::default()
        };
        let state = tracker.complete(&CommandKind::Select, true, Some("INBOX"), Some(metadata));
        assert_eq!(state, MailboxSelected);
        assert_eq!(tracker.selected_mailbox(), Some("INBOX"));
        assert_eq!(tracker.mailbox().unwrap().exists, 3);

        tracker.complete(&CommandKind::Close, false, None, None);
        assert!(tracker.mailbox().is_some());

        tracker.complete(&CommandKind::Close, true, None, None);
        assert_eq!(tracker.state(), Authenticated);
        assert!(tracker.mailbox().is_none());
        assert!(tracker.selected_mailbox().is_none());
    }

    #[test]
    fn test_failed_select_drops_old_mailbox() {
        let mut tracker = ConnectionStateTracker::new();
        tracker.complete(&CommandKind::Login, true, None, None);
        let metadata = Some(MailboxMetadata::default());
        tracker.complete(&CommandKind::Select, true, Some("INBOX"), metadata);
        tracker.complete(&CommandKind::Select, false, Some("Nope"), None);
        assert_eq!(tracker.state(), Authenticated);
        assert!(tracker.mailbox().is_none());
    }

    #[test]
    fn test_disconnect() {
        let mut tracker = ConnectionStateTracker::new();
        tracker.pre_authenticate();
        tracker.set_idling(true);
        tracker.set_awaiting_client_input(true);
        tracker.disconnect();
        assert_eq!(tracker.state(), NonAuthenticated);
        assert!(!tracker.is_idling());
        assert!(!tracker.awaiting_client_input());
    }

    #[test]
    fn test_capabilities_replaced() {
        let mut tracker = ConnectionStateTracker::new();
        tracker.set_capabilities(Capabilities::IDLE | Capabilities::IMAP4REV1);
        tracker.set_capabilities(Capabilities::IMAP4REV1);
        assert!(!tracker.has_capability(Capabilities::IDLE));
        assert!(tracker.has_capability(Capabilities::IMAP4REV1));
    }
}
