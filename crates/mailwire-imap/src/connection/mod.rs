//! Async transport glue.
//!
//! The response parser is blocking and pulls lines on demand. This module
//! reads complete responses from a tokio stream ahead of time so a session
//! can hand them to the parser as a [`BufferedLines`](crate::source::BufferedLines).

mod framed;

pub use framed::{FramedStream, ResponseAccumulator};
