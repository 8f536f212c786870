//! WebSocket surface of the gateway.

pub mod handler;

pub use handler::ws_handler;
