//! Core IMAP types.
//!
//! Value types shared by the parser, the state tracker and the collaborator
//! traits. Sets of flags and capabilities are bitsets.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod envelope;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;

pub use capability::{Capabilities, Status};
pub use envelope::{Address, Envelope};
pub use flags::{Flag, MessageFlags, UserFlagSupport};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{
    BoxFlags, ListKind, MailboxMetadata, Namespace, NamespaceType, QuotaResource, StatusCounts,
};
pub use response_code::ResponseCode;
