//! Ephemeral typing-presence relay.
//!
//! Typing signals bypass persistence entirely: they are forwarded verbatim
//! to the other connections scoped to the chat and carry no ordering
//! guarantee relative to messages. Duplicates and reordering are expected.

use tracing::debug;

use crate::broadcast::Broadcaster;
use crate::protocol::ServerEvent;

/// Relay a `typing` envelope as `user_typing` to every other connection
/// scoped to `chat_id`, excluding the sender.
pub fn relay_typing(broadcaster: &Broadcaster, user_id: &str, chat_id: &str, is_typing: bool) {
    debug!(%user_id, %chat_id, is_typing, "relaying typing signal");

    broadcaster.broadcast(
        chat_id,
        &ServerEvent::UserTyping {
            user_id: user_id.to_string(),
            is_typing,
        },
        Some(user_id),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionRegistry, CONNECTION_BUFFER_SIZE};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn scoped(
        registry: &ConnectionRegistry,
        user_id: &str,
        chat_id: &str,
    ) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        registry.register(user_id, tx);
        registry.set_scope(user_id, chat_id).unwrap();
        rx
    }

    #[tokio::test]
    async fn typing_reaches_other_participants_but_not_the_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut rx_sender = scoped(&registry, "a", "g1");
        let mut rx_peer = scoped(&registry, "b", "g1");

        relay_typing(&broadcaster, "a", "g1", true);

        assert!(rx_sender.try_recv().is_err());
        match rx_peer.try_recv().unwrap() {
            ServerEvent::UserTyping { user_id, is_typing } => {
                assert_eq!(user_id, "a");
                assert!(is_typing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_typing_is_relayed_verbatim() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut rx_peer = scoped(&registry, "b", "g1");
        let _rx_sender = scoped(&registry, "a", "g1");

        relay_typing(&broadcaster, "a", "g1", false);

        match rx_peer.try_recv().unwrap() {
            ServerEvent::UserTyping { user_id, is_typing } => {
                assert_eq!(user_id, "a");
                assert!(!is_typing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
