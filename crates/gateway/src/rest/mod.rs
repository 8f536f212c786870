//! REST endpoints of the gateway.

pub mod ai_stream;
pub mod chat;
pub mod health;
pub mod message;
