//! Fan-out of server events to every connection scoped to a chat.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::protocol::ServerEvent;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Fire-and-forget delivery against the connection registry: at most once
/// per currently connected recipient, no acknowledgements.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `event` to every connection scoped to `chat_id`, except
    /// `exclude_user_id`.
    ///
    /// Sends are non-blocking against a snapshot of the matching
    /// connections. A recipient whose buffer is full loses this event with
    /// a warning; a recipient whose channel is closed is unregistered.
    /// Neither outcome aborts delivery to the remaining recipients.
    pub fn broadcast(&self, chat_id: &str, event: &ServerEvent, exclude_user_id: Option<&str>) {
        let mut dead: Vec<(String, ConnectionId)> = Vec::new();

        self.registry.for_each_in_chat(chat_id, |peer| {
            if exclude_user_id == Some(peer.user_id.as_str()) {
                return;
            }

            match peer.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        user_id = %peer.user_id,
                        %chat_id,
                        "connection buffer full, dropping event for this recipient"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    dead.push((peer.user_id.clone(), peer.connection_id));
                }
            }
        });

        for (user_id, connection_id) in dead {
            warn!(%user_id, "removing dead connection found during broadcast");
            self.registry.unregister(&user_id, connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessagePayload, SenderPayload};
    use crate::registry::CONNECTION_BUFFER_SIZE;
    use tokio::sync::mpsc;

    fn new_message(content: &str) -> ServerEvent {
        ServerEvent::NewMessage {
            message: MessagePayload {
                id: "m1".to_string(),
                chat_id: "g1".to_string(),
                sender_id: "a".to_string(),
                content: content.to_string(),
                is_from_ai: false,
                status: "sent".to_string(),
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                sender: SenderPayload {
                    id: "a".to_string(),
                    email: None,
                    first_name: None,
                    last_name: None,
                    profile_image_url: None,
                },
            },
        }
    }

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
    async fn every_scoped_connection_receives_one_copy() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut rx_a = scoped(&registry, "a", "g1");
        let mut rx_b = scoped(&registry, "b", "g1");
        let mut rx_c = scoped(&registry, "c", "elsewhere");

        broadcaster.broadcast("g1", &new_message("hi"), None);

        assert!(matches!(
            rx_a.try_recv().unwrap(),
            ServerEvent::NewMessage { message } if message.content == "hi"
        ));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn excluded_sender_is_skipped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut rx_a = scoped(&registry, "a", "g1");
        let mut rx_b = scoped(&registry, "b", "g1");

        broadcaster.broadcast("g1", &new_message("hi"), Some("a"));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_connection_is_pruned_without_aborting_delivery() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let rx_dead = scoped(&registry, "dead", "g1");
        drop(rx_dead);
        let mut rx_live = scoped(&registry, "live", "g1");

        broadcaster.broadcast("g1", &new_message("still here"), None);

        assert!(rx_live.try_recv().is_ok());
        assert!(!registry.contains("dead"));
        assert!(registry.contains("live"));
    }

    #[tokio::test]
    async fn full_buffer_drops_the_event_but_keeps_the_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let (tx, mut rx) = mpsc::channel(1);
        registry.register("slow", tx);
        registry.set_scope("slow", "g1").unwrap();

        broadcaster.broadcast("g1", &new_message("first"), None);
        broadcaster.broadcast("g1", &new_message("second"), None);

        // Only the first event fit; the connection itself survives.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(registry.contains("slow"));
    }
}
