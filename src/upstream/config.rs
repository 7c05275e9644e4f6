//! Upstream connection configuration

use std::time::Duration;

/// Default provider endpoint (api key is appended as a query parameter)
pub const DEFAULT_ENDPOINT: &str = "wss://mainnet.helius-rpc.com/";

/// Default subscription method used for wallet activity
pub const DEFAULT_SUBSCRIPTION_METHOD: &str = "logsSubscribe";

/// Default commitment level requested from the provider
pub const DEFAULT_COMMITMENT: &str = "confirmed";

/// Upstream link configuration
///
/// Read once at startup; immutable for the lifetime of the process.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the provider
    pub endpoint: String,

    /// Provider credential
    pub api_key: String,

    /// Delay before the first reconnect attempt
    pub reconnect_delay: Duration,

    /// Upper bound for the exponential backoff
    pub max_reconnect_delay: Duration,

    /// Give up after this many consecutive failures (None = retry forever)
    pub max_reconnect_attempts: Option<u32>,

    /// Time allowed for the connect + WebSocket handshake
    pub connect_timeout: Duration,

    /// Subscription method sent for each client address
    pub subscription_method: String,

    /// Commitment level passed with each subscription
    pub commitment: String,

    /// Capacity of the outbound frame queue to the writer task
    pub outbound_buffer: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: None,
            connect_timeout: Duration::from_secs(10),
            subscription_method: DEFAULT_SUBSCRIPTION_METHOD.to_string(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            outbound_buffer: 1024,
        }
    }
}

impl UpstreamConfig {
    /// Create a config for the given endpoint and credential
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the initial reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the backoff cap
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Limit consecutive reconnect attempts
    pub fn max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the commitment level
    pub fn commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    /// Full connection URL including the credential
    pub fn url(&self) -> String {
        if self.api_key.is_empty() {
            return self.endpoint.clone();
        }
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}api-key={}", self.endpoint, sep, self.api_key)
    }

    /// Delay before reconnect attempt number `attempt` (0-based)
    ///
    /// Doubles per attempt starting at `reconnect_delay`, capped at
    /// `max_reconnect_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay.max(self.reconnect_delay))
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("subscription_method", &self.subscription_method)
            .field("commitment", &self.commitment)
            .field("outbound_buffer", &self.outbound_buffer)
            .finish()
    }
}
