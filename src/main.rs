//! wallet-feed server binary
//!
//! Run with: SECRET_API_KEY=... cargo run
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

use wallet_feed::{AppConfig, GatewayServer, Multiplexer, WsConnector};

#[tokio::main]
async fn main() {
    // tokio-tungstenite's rustls build ships without a crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        endpoint = %config.multiplexer.upstream.endpoint,
        bind = %config.gateway.bind_addr,
        "Starting wallet-feed"
    );

    let connector = WsConnector::new(config.multiplexer.upstream.clone());
    let (mux, task) = Multiplexer::spawn(config.multiplexer, connector);

    let server = GatewayServer::new(config.gateway, mux.clone());
    let result = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    if let Err(e) = mux.shutdown().await {
        tracing::debug!(error = %e, "Multiplexer already stopped");
    }
    let _ = task.await;

    if let Err(e) = result {
        tracing::error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}
