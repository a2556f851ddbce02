use tokio::sync::watch;

use flowplan::config::Settings;
use flowplan::{logging, relay};

#[tokio::main]
async fn main() {
    logging::init();

    let settings = Settings::load();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = relay::start_relay_server(&settings, shutdown_rx).await {
        tracing::error!("Relay server error: {}", e);
        std::process::exit(1);
    }
}
