//! # Parley Realtime Crate
//!
//! The real-time delivery core of the Parley chat relay: the wire protocol
//! envelopes, the process-wide connection registry, the chat-scoped
//! broadcast fan-out, and the typing-presence relay.
//!
//! Delivery here is fire-and-forget: once a message is durably persisted by
//! the caller, the broadcaster pushes it to every connection currently
//! scoped to the chat. There is no acknowledgement, no redelivery across
//! restarts, and no cross-process sharding of the registry.

pub mod broadcast;
pub mod presence;
pub mod protocol;
pub mod registry;

pub use broadcast::Broadcaster;
pub use presence::relay_typing;
pub use protocol::{ClientEvent, MessagePayload, SenderPayload, ServerEvent};
pub use registry::{
    ChatPeer, ConnectionId, ConnectionRegistry, EventSender, RegistryError, CONNECTION_BUFFER_SIZE,
};
