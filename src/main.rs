use log::error;
use peershare::{Config, SignalServer};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> peershare::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::new()?;
    let server = SignalServer::new(config);

    let (stop_tx, stop_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for ctrl-c: {e}");
            return;
        }
        let _ = stop_tx.send(()).await;
    });

    server.run(stop_rx).await
}
