//! Connection registry: which users currently hold a live transport and
//! which chat each connection is scoped to.
//!
//! The registry is the only state shared across all connection handlers.
//! Mutations take the lock briefly and never perform I/O while holding it;
//! iteration snapshots the matching records first and visits them with the
//! lock released, so one slow recipient can never stall registration or
//! delivery to everyone else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::ServerEvent;

/// Capacity of each connection's outbound event buffer.
pub const CONNECTION_BUFFER_SIZE: usize = 64;

/// Sender half of a connection's outbound event channel. The receiving end
/// is owned by that connection's socket writer task.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Identifies one registration. A connection that was superseded by a newer
/// one for the same user still holds its old id, so its late cleanup cannot
/// evict the successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

/// Snapshot of one registered connection scoped to a chat.
#[derive(Debug, Clone)]
pub struct ChatPeer {
    pub user_id: String,
    pub connection_id: ConnectionId,
    pub sender: EventSender,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("user {user_id} has no registered connection")]
    NotRegistered { user_id: String },
}

struct ConnectionRecord {
    connection_id: ConnectionId,
    sender: EventSender,
    chat_id: Option<String>,
}

/// Process-wide map from user id to their single live connection.
///
/// Constructed explicitly and injected wherever needed; tests build
/// isolated instances.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
    next_connection_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Install a connection for `user_id`, replacing any existing one.
    ///
    /// Replacement drops the previous record's sender, which closes the
    /// superseded connection's event channel; its writer task observes the
    /// closure and shuts the old socket down.
    pub fn register(&self, user_id: &str, sender: EventSender) -> ConnectionId {
        let connection_id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let record = ConnectionRecord {
            connection_id,
            sender,
            chat_id: None,
        };

        let previous = self.write().insert(user_id.to_string(), record);
        match previous {
            Some(old) => info!(
                %user_id,
                superseded = old.connection_id.0,
                "replaced existing connection"
            ),
            None => info!(%user_id, "registered connection"),
        }

        connection_id
    }

    /// Update which chat an existing connection is viewing.
    pub fn set_scope(&self, user_id: &str, chat_id: &str) -> Result<(), RegistryError> {
        let mut connections = self.write();
        let Some(record) = connections.get_mut(user_id) else {
            return Err(RegistryError::NotRegistered {
                user_id: user_id.to_string(),
            });
        };

        record.chat_id = Some(chat_id.to_string());
        debug!(%user_id, %chat_id, "updated connection scope");
        Ok(())
    }

    /// Remove the record for `user_id`, but only while it is still the
    /// registration identified by `connection_id`. Returns whether a record
    /// was removed.
    pub fn unregister(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let mut connections = self.write();
        match connections.get(user_id) {
            Some(record) if record.connection_id == connection_id => {
                connections.remove(user_id);
                info!(%user_id, "unregistered connection");
                true
            }
            Some(_) => {
                debug!(%user_id, "skipping stale unregister for superseded connection");
                false
            }
            None => false,
        }
    }

    /// Invoke `f` exactly once per connection currently scoped to
    /// `chat_id`. The registry lock is held only long enough to snapshot
    /// the matching records; `f` runs without it.
    pub fn for_each_in_chat<F>(&self, chat_id: &str, mut f: F)
    where
        F: FnMut(&ChatPeer),
    {
        let peers: Vec<ChatPeer> = {
            let connections = self.read();
            connections
                .iter()
                .filter(|(_, record)| record.chat_id.as_deref() == Some(chat_id))
                .map(|(user_id, record)| ChatPeer {
                    user_id: user_id.clone(),
                    connection_id: record.connection_id,
                    sender: record.sender.clone(),
                })
                .collect()
        };

        for peer in &peers {
            f(peer);
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.read().contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ConnectionRecord>> {
        self.connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ConnectionRecord>> {
        self.connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (EventSender, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(CONNECTION_BUFFER_SIZE)
    }

    #[tokio::test]
    async fn scoped_connections_are_visited_exactly_once() {
        let registry = ConnectionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let (tx_c, _rx_c) = channel();

        registry.register("a", tx_a);
        registry.register("b", tx_b);
        registry.register("c", tx_c);
        registry.set_scope("a", "g1").unwrap();
        registry.set_scope("b", "g1").unwrap();
        registry.set_scope("c", "other").unwrap();

        let mut visited = Vec::new();
        registry.for_each_in_chat("g1", |peer| visited.push(peer.user_id.clone()));
        visited.sort();
        assert_eq!(visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unscoped_connections_are_not_visited() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        registry.register("a", tx);

        let mut count = 0;
        registry.for_each_in_chat("g1", |_| count += 1);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn set_scope_reports_unregistered_users() {
        let registry = ConnectionRegistry::new();
        let result = registry.set_scope("ghost", "g1");
        assert!(matches!(
            result,
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn reregistration_closes_the_superseded_channel() {
        let registry = ConnectionRegistry::new();
        let (tx_old, mut rx_old) = channel();
        let old_id = registry.register("a", tx_old);

        let (tx_new, _rx_new) = channel();
        let new_id = registry.register("a", tx_new);

        assert_ne!(old_id, new_id);
        assert_eq!(registry.len(), 1);
        // The old sender was dropped with its record; its receiver ends.
        assert!(rx_old.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_unregister_does_not_evict_the_successor() {
        let registry = ConnectionRegistry::new();
        let (tx_old, _rx_old) = channel();
        let old_id = registry.register("a", tx_old);

        let (tx_new, _rx_new) = channel();
        registry.register("a", tx_new);

        // Cleanup from the superseded connection arrives late.
        assert!(!registry.unregister("a", old_id));
        assert!(registry.contains("a"));
    }

    #[tokio::test]
    async fn unregister_removes_the_current_record() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register("a", tx);

        assert!(registry.unregister("a", id));
        assert!(registry.is_empty());
        assert!(!registry.unregister("a", id));
    }
}
