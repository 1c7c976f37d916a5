#![allow(dead_code)]

use std::{future::Future, time::Duration};

use peershare::{
    client::{ConnectionManager, PeerUpdate, SignalingClient, TransportEvent},
    Config, SignalServer,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Starts a server on an ephemeral port. The server stops when the returned
/// sender is dropped.
pub async fn start_server() -> (String, mpsc::Sender<()>) {
    let config = Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = SignalServer::new(config);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        server.serve(listener, stop_rx).await.unwrap();
    });
    (format!("ws://{addr}/ws"), stop_tx)
}

/// Feeds one client's signaling and transport events into its manager.
pub fn pump(
    mut client: SignalingClient,
    manager: ConnectionManager,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    updates: mpsc::UnboundedSender<PeerUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = client.recv() => match msg {
                    Some(msg) => {
                        manager.handle_server_message(msg).await;
                    }
                    None => break,
                },
                Some(event) = events.recv() => {
                    if let Ok(Some(update)) = manager.handle_transport_event(event).await {
                        let _ = updates.send(update);
                    }
                }
            }
        }
    })
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
