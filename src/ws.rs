use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::models::{WsClientMessage, WsServerMessage};
use crate::routes::auth;
use crate::state::AppState;

const MAX_FRAME_LENGTH: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Live notification channel. Only authenticated users get a session, since
/// events are addressed by username.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let claims = match query.token.as_deref().map(|t| auth::decode_jwt(&state.jwt_secret, t)) {
        Some(Ok(claims)) => claims,
        Some(Err((status, msg))) => return (status, msg).into_response(),
        None => return (StatusCode::UNAUTHORIZED, "Missing token").into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims.username))
}

async fn handle_socket(socket: WebSocket, state: AppState, username: String) {
    let (session_id, mut pushed) = state.registry.register(&username);
    tracing::info!(
        "{username} connected (session {session_id}, {} online)",
        state.online_count()
    );

    let (mut sender, mut receiver) = socket.split();
    let (client_tx, mut client_rx) = tokio::sync::mpsc::channel::<WsServerMessage>(64);

    // Send identity to client
    let _ = client_tx
        .send(WsServerMessage::Identity {
            username: username.clone(),
            session_id: session_id.clone(),
        })
        .await;

    // Forward notifications pushed through the registry
    let push_tx = client_tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(event) = pushed.recv().await {
            if push_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to serialize WS message: {e}");
                }
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if text.len() > MAX_FRAME_LENGTH {
                    let _ = client_tx
                        .send(WsServerMessage::Error {
                            message: "Message too large".to_string(),
                        })
                        .await;
                    continue;
                }

                match serde_json::from_str::<WsClientMessage>(&text) {
                    Ok(WsClientMessage::Ping) => {
                        let _ = client_tx.send(WsServerMessage::Pong).await;
                    }
                    Err(_) => {
                        let _ = client_tx
                            .send(WsServerMessage::Error {
                                message: "Invalid message format".to_string(),
                            })
                            .await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.unregister(&username, &session_id);
    tracing::info!(
        "{username} disconnected (session {session_id}, {} online)",
        state.online_count()
    );
    forward_task.abort();
    send_task.abort();
}
