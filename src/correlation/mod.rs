//! Correlation of inbound gateway events with live tasks.
//!
//! The upstream service returns no request id, so matching relies on surrogate
//! keys: a content hash of the echoed prompt, the id of the origin message, or
//! the id of the interaction that accepted a command.

pub mod hashing;
pub mod index;

pub use hashing::KeywordHash;
pub use index::{CorrelationIndex, CorrelationKey};
