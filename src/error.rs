//! Error types
//!
//! Crate-wide error and result types. Module-specific errors (registry,
//! configuration, client protocol) are wrapped by [`Error`].

use crate::config::ConfigError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket level I/O failure (bind, accept)
    Io(std::io::Error),
    /// WebSocket transport failure (connect, handshake, read, write)
    Transport(tokio_tungstenite::tungstenite::Error),
    /// Malformed frame from a downstream client
    Protocol(ProtocolError),
    /// Invalid or missing startup configuration
    Config(ConfigError),
    /// Subscription registry misuse
    Registry(RegistryError),
    /// The multiplexer task has stopped
    Closed,
}

/// Client-facing protocol errors
///
/// These are reported back to the originating client as an `ERROR` event;
/// the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is not a JSON object (or not text at all)
    InvalidFormat,
    /// Frame parsed but carries no usable address
    MissingAddress,
    /// Request was accepted but could not be registered
    SubscribeFailed,
}

impl ProtocolError {
    /// Message sent to the client in the `ERROR` event
    pub fn client_message(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFormat => "Invalid message format",
            ProtocolError::MissingAddress => "Address is required",
            ProtocolError::SubscribeFailed => "Failed to subscribe",
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.client_message())
    }
}

impl std::error::Error for ProtocolError {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "WebSocket error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Closed => write!(f, "Multiplexer is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Closed => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
