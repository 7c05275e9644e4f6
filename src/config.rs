//! Process configuration
//!
//! Read once at startup from environment variables:
//!
//! | Variable                 | Default                          |
//! |--------------------------|----------------------------------|
//! | `SECRET_API_KEY`         | required                         |
//! | `UPSTREAM_URL`           | `wss://mainnet.helius-rpc.com/`  |
//! | `BIND_ADDR`              | `0.0.0.0:3001`                   |
//! | `RECONNECT_DELAY_MS`     | `3000`                           |
//! | `MAX_RECONNECT_DELAY_MS` | `30000`                          |
//! | `MAX_RECONNECT_ATTEMPTS` | unlimited                        |
//! | `COMMITMENT`             | `confirmed`                      |
//! | `MAX_CONNECTIONS`        | `0` (unlimited)                  |
//! | `CLIENT_BUFFER`          | `64`                             |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::GatewayConfig;
use crate::mux::MultiplexerConfig;
use crate::upstream::UpstreamConfig;

/// Configuration errors (fatal at startup)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required credential is absent or empty
    MissingCredential(&'static str),
    /// A variable is set but cannot be parsed
    InvalidValue { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingCredential(key) => write!(f, "{} is not set", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Complete process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub multiplexer: MultiplexerConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("SECRET_API_KEY").ok_or(ConfigError::MissingCredential("SECRET_API_KEY"))?;

        let mut upstream = UpstreamConfig::default();
        upstream.api_key = api_key;
        if let Some(url) = get("UPSTREAM_URL") {
            upstream.endpoint = url;
        }
        if let Some(ms) = parse::<u64>("RECONNECT_DELAY_MS", get("RECONNECT_DELAY_MS"))? {
            upstream = upstream.reconnect_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse::<u64>("MAX_RECONNECT_DELAY_MS", get("MAX_RECONNECT_DELAY_MS"))? {
            upstream = upstream.max_reconnect_delay(Duration::from_millis(ms));
        }
        if let Some(attempts) =
            parse::<u32>("MAX_RECONNECT_ATTEMPTS", get("MAX_RECONNECT_ATTEMPTS"))?
        {
            // 0 keeps the default of retrying forever
            upstream = upstream.max_reconnect_attempts((attempts > 0).then_some(attempts));
        }
        if let Some(commitment) = get("COMMITMENT") {
            upstream = upstream.commitment(commitment);
        }

        let mut gateway = GatewayConfig::default();
        if let Some(addr) = parse::<SocketAddr>("BIND_ADDR", get("BIND_ADDR"))? {
            gateway = gateway.bind(addr);
        }
        if let Some(max) = parse::<usize>("MAX_CONNECTIONS", get("MAX_CONNECTIONS"))? {
            gateway = gateway.max_connections(max);
        }
        if let Some(capacity) = parse::<usize>("CLIENT_BUFFER", get("CLIENT_BUFFER"))? {
            gateway = gateway.client_buffer(capacity);
        }

        Ok(Self {
            multiplexer: MultiplexerConfig::new(upstream),
            gateway,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
