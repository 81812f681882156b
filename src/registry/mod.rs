//! Stream Registry
//!
//! Known streams and their latest live payloads, reconciled against the
//! control API and the push channel.

mod seams;
mod store;

pub use seams::{StreamControl, StreamMembership};
pub use store::{StreamPayload, StreamStore};
