pub mod credentials;
pub mod registry;
pub mod relay;
pub mod ws;

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::mpsc};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;

pub use registry::PeerRegistry;

#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<PeerRegistry>,
    pub config: Arc<Config>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new()),
            config: Arc::new(config),
        }
    }
}

/// HTTP front of the registry and relay.
pub struct SignalServer {
    state: ServerState,
}

impl SignalServer {
    pub fn new(config: Config) -> Self {
        Self {
            state: ServerState::new(config),
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws::ws_handler))
            .route("/health", get(health))
            .layer(RequestBodyLimitLayer::new(self.state.config.max_frame_bytes))
            .with_state(self.state.clone())
    }

    /// Binds the configured address. Split from [`serve`](Self::serve) so
    /// callers binding port 0 can learn the real address first.
    pub async fn bind(&self) -> crate::error::Result<TcpListener> {
        Ok(TcpListener::bind(self.state.config.bind_addr).await?)
    }

    /// Serves until `stop_rx` yields or its sender is dropped.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut stop_rx: mpsc::Receiver<()>,
    ) -> crate::error::Result<()> {
        let app = self.create_router();
        log::info!("signaling server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop_rx.recv().await;
            log::info!("shutting down signaling server");
        })
        .await?;

        Ok(())
    }

    pub async fn run(&self, stop_rx: mpsc::Receiver<()>) -> crate::error::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, stop_rx).await
    }
}

async fn health(State(state): State<ServerState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.session_count().await,
    }))
}
