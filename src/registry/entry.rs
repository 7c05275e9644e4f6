//! Subscription record types
//!
//! This module defines the per-subscription state stored in the registry.

use std::time::Instant;

use serde_json::Value;

/// Identifier issued by this process to correlate a request with its ack
pub type LocalId = u64;

/// Identifier issued by the upstream provider for a confirmed subscription
pub type RemoteId = u64;

/// Result of handing a notification to a subscription callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Payload was queued for the owner
    Queued,
    /// Owner was backed up or gone; payload discarded
    Dropped,
}

/// Callback invoked with each notification payload matched to a subscription
///
/// Runs on the multiplexer task, so it must not block.
pub type NotifyFn = Box<dyn Fn(Value) -> Delivery + Send + Sync>;

/// A single logical subscription
pub struct Subscription {
    /// Local request id (also used when replaying after reconnect)
    pub local_id: LocalId,

    /// Upstream subscription method, e.g. `logsSubscribe`
    pub method: String,

    /// Ordered arguments for `method`
    pub params: Vec<Value>,

    /// Upstream id, only known after the provider acknowledges
    pub(super) remote_id: Option<RemoteId>,

    on_notify: NotifyFn,

    /// When the subscription was registered
    pub created_at: Instant,
}

impl Subscription {
    pub(super) fn new(
        local_id: LocalId,
        method: String,
        params: Vec<Value>,
        on_notify: NotifyFn,
    ) -> Self {
        Self {
            local_id,
            method,
            params,
            remote_id: None,
            on_notify,
            created_at: Instant::now(),
        }
    }

    /// Upstream subscription id, if acknowledged
    pub fn remote_id(&self) -> Option<RemoteId> {
        self.remote_id
    }

    /// Check if the upstream has acknowledged this subscription
    pub fn is_acknowledged(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Hand a notification payload to the owner
    pub fn notify(&self, payload: Value) -> Delivery {
        (self.on_notify)(payload)
    }

    /// Method used to cancel this subscription upstream
    pub fn unsubscribe_method(&self) -> String {
        unsubscribe_method_for(&self.method)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("local_id", &self.local_id)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}

/// Map a subscribe method to its cancel counterpart
///
/// `logsSubscribe` becomes `logsUnsubscribe`. Methods that do not follow the
/// `*Subscribe` convention fall back to the generic `unsubscribe`.
pub fn unsubscribe_method_for(method: &str) -> String {
    match method.strip_suffix("Subscribe") {
        Some(prefix) if !prefix.is_empty() => format!("{}Unsubscribe", prefix),
        _ => "unsubscribe".to_string(),
    }
}
