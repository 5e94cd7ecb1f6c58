//! Connection-level protocol state.
//!
//! The tracker is owned by the response parser and mutated only by it;
//! everyone else reads it.

mod state;

pub use state::{ConnectionState, ConnectionStateTracker, transition};
