//! Multiplexer configuration

use crate::upstream::UpstreamConfig;

/// Multiplexer configuration
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Upstream connection settings
    pub upstream: UpstreamConfig,

    /// Capacity of the command queue shared by all client connections
    pub command_buffer: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            command_buffer: 1024,
        }
    }
}

impl MultiplexerConfig {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            upstream,
            ..Default::default()
        }
    }

    /// Set the command queue capacity (minimum 1)
    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }
}
