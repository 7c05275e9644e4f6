//! Downstream WebSocket gateway
//!
//! Accepts browser clients, decodes their subscribe requests and writes
//! events back. All subscription bookkeeping is delegated to the
//! multiplexer through a [`MultiplexerHandle`](crate::mux::MultiplexerHandle).

pub mod config;
pub mod connection;
pub mod listener;
pub mod protocol;

pub use config::GatewayConfig;
pub use connection::Connection;
pub use listener::GatewayServer;
pub use protocol::{ClientRequest, ServerEvent};
