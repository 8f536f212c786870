//! WebSocket handler: connection lifecycle against the registry.
//!
//! Each socket gets a bounded event channel whose receiver is drained by a
//! writer task; the registry holds the sender. When a newer connection for
//! the same user replaces the record, this sender is dropped, the writer
//! task sees the channel close and shuts the superseded socket down.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use parley_realtime::{relay_typing, ClientEvent, ConnectionId, CONNECTION_BUFFER_SIZE};

use crate::state::AppState;

/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct Session {
    user_id: String,
    connection_id: ConnectionId,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(CONNECTION_BUFFER_SIZE);

    // Writer task: serialize registry events onto the socket. Ends when the
    // socket breaks or the channel closes (connection superseded).
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut session: Option<Session> = None;

    while let Some(incoming) = ws_rx.next().await {
        match incoming {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::JoinChat { user_id, chat_id }) => {
                    join_chat(&state, &mut session, &event_tx, user_id, chat_id);
                }
                Ok(ClientEvent::Typing {
                    user_id,
                    chat_id,
                    is_typing,
                }) => {
                    relay_typing(&state.broadcaster, &user_id, &chat_id, is_typing);
                }
                Ok(ClientEvent::Unrecognized) => {
                    debug!("ignoring unrecognized envelope type");
                }
                Err(error) => {
                    warn!(%error, "failed to parse client envelope");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "websocket receive error");
                break;
            }
        }
    }

    if let Some(session) = session {
        state
            .registry
            .unregister(&session.user_id, session.connection_id);
        info!(user_id = %session.user_id, "websocket connection closed");
    }
    writer.abort();
}

fn join_chat(
    state: &AppState,
    session: &mut Option<Session>,
    event_tx: &parley_realtime::EventSender,
    user_id: String,
    chat_id: String,
) {
    match session {
        // Same user switching chats: just move the scope.
        Some(current) if current.user_id == user_id => {}
        // A connection that re-joins as a different user releases its old
        // registration first.
        Some(current) => {
            state
                .registry
                .unregister(&current.user_id, current.connection_id);
            let connection_id = state.registry.register(&user_id, event_tx.clone());
            *session = Some(Session {
                user_id: user_id.clone(),
                connection_id,
            });
        }
        None => {
            let connection_id = state.registry.register(&user_id, event_tx.clone());
            *session = Some(Session {
                user_id: user_id.clone(),
                connection_id,
            });
        }
    }

    if let Err(error) = state.registry.set_scope(&user_id, &chat_id) {
        warn!(%error, "failed to scope connection");
        return;
    }
    info!(%user_id, %chat_id, "user joined chat");
}
