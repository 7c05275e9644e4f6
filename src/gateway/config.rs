//! Gateway configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Gateway configuration options
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Per-client event queue capacity; events beyond it are dropped
    pub client_buffer: usize,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            max_connections: 0, // Unlimited
            client_buffer: 64,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl GatewayConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-client event queue capacity (minimum 1)
    pub fn client_buffer(mut self, capacity: usize) -> Self {
        self.client_buffer = capacity.max(1);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
