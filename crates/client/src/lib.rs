//! # Parley Client Crate
//!
//! Reconnecting WebSocket transport for the Parley chat relay. One
//! [`ChatClient`] maintains at most one live connection, re-establishes it
//! after loss with a fixed interval and a bounded number of attempts, and
//! replays the declared chat scope after every reconnect so server-side
//! state matches client intent even across an invisible reconnection.
//!
//! Server events are surfaced on the unbounded receiver handed out by
//! [`ChatClient::new`]; envelopes with an unknown `type` are dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use parley_realtime::{ClientEvent, ServerEvent};

/// Default bound on automatic reconnection attempts.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Transport configuration.
///
/// The reconnect policy is deliberately a fixed interval, not exponential
/// backoff; after a shared outage many clients will retry in step, which
/// is acceptable at this scale.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect_attempts: u32,
    pub reconnect_interval: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

struct Shared {
    state: ConnectionState,
    attempts: u32,
    current_chat: Option<String>,
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    running: bool,
}

struct ClientInner {
    config: ClientConfig,
    user_id: String,
    shared: Mutex<Shared>,
    shutdown: watch::Sender<bool>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl ClientInner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }
}

/// Reconnecting chat client.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Build a client for `user_id`; returns the client together with the
    /// receiver on which server events are surfaced.
    pub fn new(
        config: ClientConfig,
        user_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(ClientInner {
            config,
            user_id: user_id.into(),
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                attempts: 0,
                current_chat: None,
                outbound: None,
                running: false,
            }),
            shutdown,
            events: events_tx,
        });

        (Self { inner }, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start (or restart) the connection loop. Idempotent: a no-op while a
    /// loop is already connecting or connected.
    pub fn connect(&self) {
        {
            let mut shared = self.inner.lock();
            if shared.running {
                return;
            }
            shared.running = true;
        }

        self.inner.shutdown.send_replace(false);
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(run(self.inner.clone(), shutdown));
    }

    /// Close the live transport and cancel any pending reconnect. The only
    /// cancellation path; there is no per-message cancellation.
    pub fn disconnect(&self) {
        {
            let mut shared = self.inner.lock();
            shared.outbound = None;
            shared.state = ConnectionState::Disconnected;
        }
        self.inner.shutdown.send_replace(true);
    }

    /// Declare the chat this client is viewing. The intent is recorded
    /// even while disconnected and re-declared after every reconnect.
    pub fn join_chat(&self, chat_id: &str) {
        let shared = &mut *self.inner.lock();
        shared.current_chat = Some(chat_id.to_string());
        if let Some(outbound) = &shared.outbound {
            let _ = outbound.send(ClientEvent::JoinChat {
                user_id: self.inner.user_id.clone(),
                chat_id: chat_id.to_string(),
            });
        }
    }

    /// Clear the declared chat scope.
    pub fn leave_chat(&self) {
        self.inner.lock().current_chat = None;
    }

    /// Send a typing signal; reports whether the transport accepted it.
    pub fn send_typing(&self, chat_id: &str, is_typing: bool) -> bool {
        let shared = self.inner.lock();
        match &shared.outbound {
            Some(outbound) => outbound
                .send(ClientEvent::Typing {
                    user_id: self.inner.user_id.clone(),
                    chat_id: chat_id.to_string(),
                    is_typing,
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn current_chat(&self) -> Option<String> {
        self.inner.lock().current_chat.clone()
    }
}

/// Connection loop: connect, pump, and apply the close-driven
/// fixed-interval reconnection policy until the attempt bound is reached
/// or the client shuts down.
async fn run(inner: Arc<ClientInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        inner.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            result = connect_async(inner.config.url.as_str()) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok((stream, _response)) => {
                info!(url = %inner.config.url, "websocket connected");
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                {
                    let shared = &mut *inner.lock();
                    shared.state = ConnectionState::Connected;
                    shared.attempts = 0;
                    shared.outbound = Some(outbound_tx.clone());

                    // Re-declare the chat scope so the server matches
                    // client intent after an invisible reconnection.
                    if let Some(chat_id) = shared.current_chat.clone() {
                        let _ = outbound_tx.send(ClientEvent::JoinChat {
                            user_id: inner.user_id.clone(),
                            chat_id,
                        });
                    }
                }
                drop(outbound_tx);

                let shutting_down = pump(&inner, stream, outbound_rx, &mut shutdown).await;

                {
                    let shared = &mut *inner.lock();
                    shared.outbound = None;
                    shared.state = ConnectionState::Disconnected;
                }
                if shutting_down || *shutdown.borrow() {
                    break;
                }
            }
            Err(error) => {
                warn!(%error, "websocket connect failed");
                inner.set_state(ConnectionState::Error);
            }
        }

        // Close-driven reconnection: one pending timer, fixed interval,
        // bounded attempts. Manual connect() remains possible afterwards.
        let give_up = {
            let shared = &mut *inner.lock();
            if shared.attempts >= inner.config.reconnect_attempts {
                true
            } else {
                shared.attempts += 1;
                info!(
                    attempt = shared.attempts,
                    max_attempts = inner.config.reconnect_attempts,
                    delay_ms = inner.config.reconnect_interval.as_millis() as u64,
                    "scheduling reconnect"
                );
                false
            }
        };
        inner.set_state(ConnectionState::Disconnected);
        if give_up {
            info!("reconnect attempts exhausted, staying disconnected");
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.config.reconnect_interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    let shared = &mut *inner.lock();
    shared.running = false;
    shared.outbound = None;
    shared.state = ConnectionState::Disconnected;
}

/// Pump one live connection until it closes. Returns whether the exit was
/// caused by an explicit shutdown.
async fn pump(
    inner: &Arc<ClientInner>,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut shutting_down = false;

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(event) = outgoing else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(ServerEvent::Unrecognized) => {
                                debug!("ignoring unrecognized envelope type");
                            }
                            Ok(event) => {
                                let _ = inner.events.send(event);
                            }
                            Err(error) => {
                                warn!(%error, "failed to parse server envelope");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(%error, "websocket receive error");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                shutting_down = true;
                break;
            }
        }
    }

    let _ = ws_tx.close().await;
    shutting_down
}
