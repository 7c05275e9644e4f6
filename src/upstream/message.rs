//! JSON-RPC envelopes exchanged with the upstream provider
//!
//! Outbound:
//! ```text
//! {"jsonrpc":"2.0","id":<id>,"method":"<method>","params":[...]}
//! ```
//!
//! Inbound frames are classified into acknowledgments, notifications and
//! everything else. Correlation with live subscriptions happens in the link.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{LocalId, RemoteId};

/// Suffix that marks a push notification method
pub const NOTIFICATION_SUFFIX: &str = "Notification";

/// Outbound JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Create a JSON-RPC 2.0 request
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Raw shape of anything the provider may send
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Numeric result for a request id: a subscribe acknowledgment
    Ack {
        local_id: LocalId,
        remote_id: RemoteId,
    },

    /// Push notification for an upstream subscription
    Notification {
        method: String,
        remote_id: RemoteId,
        payload: Value,
    },

    /// Error reply to a request
    RpcError { id: Option<u64>, error: Value },

    /// Anything else (unsubscribe acks, notifications without an id, ...)
    Other,
}

impl InboundFrame {
    /// Parse and classify a text frame
    ///
    /// Anything but a JSON object is an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        // Deserializing through a map rejects the positional array form
        let object: Map<String, Value> = serde_json::from_str(text)?;
        let raw: RawFrame = serde_json::from_value(Value::Object(object))?;
        Ok(Self::classify(raw))
    }

    fn classify(raw: RawFrame) -> Self {
        if let Some(method) = raw.method {
            if !method.ends_with(NOTIFICATION_SUFFIX) {
                return InboundFrame::Other;
            }

            let params = raw.params.unwrap_or(Value::Null);
            let remote_id = match params.get("subscription").and_then(Value::as_u64) {
                Some(id) => id,
                None => return InboundFrame::Other,
            };
            let payload = params.get("result").cloned().unwrap_or(Value::Null);

            return InboundFrame::Notification {
                method,
                remote_id,
                payload,
            };
        }

        let id = raw.id.as_ref().and_then(Value::as_u64);

        if let Some(error) = raw.error {
            return InboundFrame::RpcError { id, error };
        }

        match (id, raw.result.as_ref().and_then(Value::as_u64)) {
            (Some(local_id), Some(remote_id)) => InboundFrame::Ack {
                local_id,
                remote_id,
            },
            _ => InboundFrame::Other,
        }
    }
}
