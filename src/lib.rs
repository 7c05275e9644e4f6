//! wallet-feed
//!
//! Live wallet activity gateway. Browser clients connect over WebSocket and
//! ask to follow a wallet address; every request is multiplexed onto a single
//! JSON-RPC push connection to the upstream provider, and matching
//! notifications are routed back to the client that asked for them.
//!
//! # Architecture
//!
//! ```text
//!   browser ─ws─► GatewayServer ─► Connection ──Command──► Multiplexer ──► UpstreamLink ─ws─► provider
//!   browser ◄─ws─ Connection ◄── bounded queue ◄── on_notify ◄── SubscriptionRegistry ◄───────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use wallet_feed::{AppConfig, GatewayServer, Multiplexer, WsConnector};
//!
//! # async fn run() -> wallet_feed::Result<()> {
//! let config = AppConfig::from_env()?;
//! let connector = WsConnector::new(config.multiplexer.upstream.clone());
//! let (mux, _task) = Multiplexer::spawn(config.multiplexer, connector);
//!
//! let server = GatewayServer::new(config.gateway, mux.clone());
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//! mux.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod mux;
pub mod registry;
pub mod session;
pub mod stats;
pub mod upstream;

pub use config::{AppConfig, ConfigError};
pub use error::{Error, ProtocolError, Result};
pub use gateway::{GatewayConfig, GatewayServer, ServerEvent};
pub use mux::{Multiplexer, MultiplexerConfig, MultiplexerHandle};
pub use stats::MuxStats;
pub use upstream::{UpstreamConfig, UpstreamConnector, WsConnector};
