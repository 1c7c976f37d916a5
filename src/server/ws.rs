//! Websocket endpoint for signaling clients.
//!
//! Each connection gets a session in the registry and an outbound queue; a
//! dedicated task drains the queue into the socket so that relayed messages
//! from other sessions never wait on this session's reader.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::{
    error::ShareError,
    protocol::{ClientMessage, ServerMessage},
    server::{relay, ServerState},
};

/// Upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    let max = state.config.max_frame_bytes;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.outbound_queue);

    let session_id = state.registry.connect(tx.clone()).await;
    info!("User connected: {session_id}");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("could not encode outbound message: {e}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    if tx
        .send(ServerMessage::Welcome {
            session_id: session_id.clone(),
        })
        .await
        .is_ok()
    {
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => dispatch(msg, &session_id, &state).await,
                        Err(e) => {
                            debug!("malformed frame from {session_id}: {e}");
                            Some(ServerMessage::Error {
                                message: format!("malformed message: {e}"),
                                request: None,
                            })
                        }
                    };
                    if let Some(reply) = reply {
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // ping/pong handled by axum, binary is not part of the protocol
                Err(e) => {
                    warn!("websocket error on {session_id}: {e}");
                    break;
                }
            }
        }
    }

    state.registry.disconnect(&session_id).await;
    info!("User disconnected: {session_id}");
    drop(tx);
    let _ = send_task.await;
}

/// Applies one client message on behalf of `session_id` and returns the
/// reply for that same session, if any.
pub async fn dispatch(
    msg: ClientMessage,
    session_id: &str,
    state: &ServerState,
) -> Option<ServerMessage> {
    let registry = &state.registry;
    let kind = msg.kind();
    match msg {
        ClientMessage::Register { username, password } => {
            Some(match registry.register(&username, &password).await {
                Ok(()) => ServerMessage::AuthSuccess {
                    message: "Registration successful, please log in".to_string(),
                },
                Err(e) => reply_error(e, kind),
            })
        }
        ClientMessage::Login { username, password } => {
            Some(match registry.login(session_id, &username, &password).await {
                Ok(username) => ServerMessage::LoginSuccess {
                    username,
                    session_id: session_id.to_string(),
                },
                Err(e) => reply_error(e, kind),
            })
        }
        ClientMessage::PublishFiles { files } => {
            match registry.publish_files(session_id, files).await {
                Ok(username) => {
                    registry
                        .broadcast(session_id, ServerMessage::FilesUpdated { username })
                        .await;
                    None
                }
                Err(e) => Some(reply_error(e, kind)),
            }
        }
        ClientMessage::Search { keyword } => Some(match registry.search(session_id, &keyword).await {
            Ok(results) => ServerMessage::SearchResults { results },
            Err(e) => reply_error(e, kind),
        }),
        signal @ (ClientMessage::Offer { .. }
        | ClientMessage::Answer { .. }
        | ClientMessage::IceCandidate { .. }) => {
            relay::forward(registry, session_id, signal).await;
            None
        }
    }
}

fn reply_error(e: ShareError, request: &str) -> ServerMessage {
    if e.is_auth() {
        ServerMessage::AuthError {
            message: e.to_string(),
        }
    } else {
        ServerMessage::Error {
            message: e.to_string(),
            request: Some(request.to_string()),
        }
    }
}
