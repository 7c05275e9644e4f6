//! Upstream provider link
//!
//! Owns the single push connection to the RPC provider:
//! - Connection state and reconnect scheduling with backoff
//! - JSON-RPC request encoding and inbound frame demux
//! - Replay of every registered subscription after a reconnect

pub mod config;
pub mod connector;
pub mod link;
pub mod message;

pub use config::UpstreamConfig;
pub use connector::{InboundEvent, UpstreamConnector, UpstreamTransport, WsConnector};
pub use link::{FrameOutcome, LinkState, UpstreamLink};
pub use message::{InboundFrame, RpcRequest};
