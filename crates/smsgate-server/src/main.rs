//! The gateway HTTP server.

use tokio::net::TcpListener;
use tracing::info;

use smsgate_server::{init_tracing, router, AppState, BootstrapError, Config};

#[tokio::main]
async fn main() -> Result<(), BootstrapError> {
    let config = Config::from_env();
    init_tracing(config.debug);

    let state = AppState::connect(config).await?;
    let listener = TcpListener::bind(state.config.bind_addr()).await?;
    info!(addr = %state.config.bind_addr(), "sms gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
