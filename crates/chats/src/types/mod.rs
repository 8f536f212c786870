//! Shared types for the chat domain.

pub mod errors;

pub use errors::{ChatError, ChatResult};
