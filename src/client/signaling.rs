use std::collections::VecDeque;

use futures::{stream::SplitStream, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{
    error::{Result, ShareError},
    models::{FileDescriptor, SearchResult, SessionId},
    protocol::{ClientMessage, Password, ServerMessage},
};

/// Client end of the signaling websocket.
///
/// Replies to `register`/`login`/`search` are awaited in place; anything
/// else that arrives meanwhile (relayed offers, broadcasts) is kept for
/// [`recv`](Self::recv) in arrival order.
pub struct SignalingClient {
    session_id: SessionId,
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<ServerMessage>,
    backlog: VecDeque<ServerMessage>,
    shutdown: watch::Sender<bool>,
    socket_task: JoinHandle<()>,
}

impl SignalingClient {
    /// Connects to `url` (e.g. `ws://127.0.0.1:3001/ws`) and waits for the
    /// server's welcome.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to signaling server {url}");
        let (ws_stream, _) = connect_async(url).await?;

        let (outbound, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, mut inbound) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let socket_task = tokio::spawn(run_socket(ws_stream, outbound_rx, inbound_tx, shutdown_rx));

        let session_id = match inbound.recv().await {
            Some(ServerMessage::Welcome { session_id }) => session_id,
            Some(other) => {
                error!("Expected welcome, got {other:?}");
                return Err(ShareError::UnexpectedMessage);
            }
            None => return Err(ShareError::ChannelClosed),
        };
        debug!("Signaling session {session_id}");

        Ok(Self {
            session_id,
            outbound,
            inbound,
            backlog: VecDeque::new(),
            shutdown,
            socket_task,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Outbound queue handle, for a
    /// [`ConnectionManager`](crate::client::manager::ConnectionManager).
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.outbound.clone()
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ShareError::ChannelClosed)
    }

    /// Next server message, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        match self.backlog.pop_front() {
            Some(msg) => Some(msg),
            None => self.inbound.recv().await,
        }
    }

    /// Returns the confirmation text on success.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<String> {
        self.send(ClientMessage::Register {
            username: username.to_string(),
            password: Password::new(password),
        })
        .await?;

        let reply = self
            .reply(|m| matches!(m, ServerMessage::AuthSuccess { .. } | ServerMessage::AuthError { .. }))
            .await?;
        match reply {
            ServerMessage::AuthSuccess { message } => Ok(message),
            ServerMessage::AuthError { message } => Err(ShareError::AuthRejected(message)),
            _ => Err(ShareError::UnexpectedMessage),
        }
    }

    /// Returns the username the session is now bound to.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<String> {
        self.send(ClientMessage::Login {
            username: username.to_string(),
            password: Password::new(password),
        })
        .await?;

        let reply = self
            .reply(|m| matches!(m, ServerMessage::LoginSuccess { .. } | ServerMessage::AuthError { .. }))
            .await?;
        match reply {
            ServerMessage::LoginSuccess { username, .. } => Ok(username),
            ServerMessage::AuthError { message } => Err(ShareError::AuthRejected(message)),
            _ => Err(ShareError::UnexpectedMessage),
        }
    }

    /// Fire and forget: a successful publish has no reply. A rejection shows
    /// up later as an `error` message.
    pub async fn publish(&self, files: Vec<FileDescriptor>) -> Result<()> {
        self.send(ClientMessage::PublishFiles { files }).await
    }

    pub async fn search(&mut self, keyword: &str) -> Result<Vec<SearchResult>> {
        self.send(ClientMessage::Search {
            keyword: keyword.to_string(),
        })
        .await?;

        let reply = self
            .reply(|m| match m {
                ServerMessage::SearchResults { .. } => true,
                ServerMessage::Error { request, .. } => request.as_deref() == Some("search"),
                _ => false,
            })
            .await?;
        match reply {
            ServerMessage::SearchResults { results } => Ok(results),
            ServerMessage::Error { message, .. } => Err(ShareError::ServerError(message)),
            _ => Err(ShareError::UnexpectedMessage),
        }
    }

    /// Sends a close frame and waits for the socket task to end.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        let _ = self.socket_task.await;
    }

    async fn reply(&mut self, wanted: impl Fn(&ServerMessage) -> bool) -> Result<ServerMessage> {
        while let Some(msg) = self.inbound.recv().await {
            if wanted(&msg) {
                return Ok(msg);
            }
            self.backlog.push_back(msg);
        }
        Err(ShareError::ChannelClosed)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Writes outbound messages until shutdown. Reading runs in its own task so
/// a full inbound queue never stops the writes.
async fn run_socket(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    inbound_tx: mpsc::Sender<ServerMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut write, read) = ws_stream.split();
    let mut reader = tokio::spawn(read_socket(read, inbound_tx));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            Some(msg) = outbound_rx.recv() => {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Could not encode {}: {e}", msg.kind());
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!("Signaling send failed: {e}");
                    break;
                }
            }
            _ = &mut reader => break,
        }
    }
    reader.abort();
}

async fn read_socket(mut read: SplitStream<WsStream>, inbound_tx: mpsc::Sender<ServerMessage>) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => {
                    if inbound_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Malformed server frame: {e}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Signaling websocket error: {e}");
                return;
            }
        }
    }
    info!("Signaling connection closed");
}
