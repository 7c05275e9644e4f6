//! Upstream link state machine
//!
//! Tracks the lifecycle of the provider connection and owns the subscription
//! registry. All methods run on the multiplexer task and never wait: frames
//! go to the writer queue with `try_send`, and a full queue drops the frame.
//!
//! ```text
//!   Closed ──begin_connect──► Connecting ──on_open──► Open
//!     ▲                           │                    │
//!     └──── on_connect_failed ────┘◄───── on_close ────┘
//!
//!   any ──shutdown / retry limit──► Stopped
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::registry::{
    Delivery, LocalId, NotifyFn, RegistryError, RemoteId, SubscriptionRegistry,
};

use super::config::UpstreamConfig;
use super::message::{InboundFrame, RpcRequest};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Connect attempt in flight
    Connecting,
    /// Connected; requests are transmitted
    Open,
    /// Disconnected, reconnect pending
    Closed,
    /// Shut down or out of reconnect attempts
    Stopped,
}

/// What a single inbound frame did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Subscribe ack recorded
    Acknowledged {
        local_id: LocalId,
        remote_id: RemoteId,
    },
    /// Notification handed to its subscription
    Delivered { local_id: LocalId },
    /// Notification matched but the owner dropped it
    Dropped { local_id: LocalId },
    /// Notification for a remote id with no live subscription
    UnknownSubscription { remote_id: RemoteId },
    /// Frame not relevant to any subscription
    Ignored,
    /// Frame could not be parsed
    Malformed,
}

/// Single upstream connection shared by every subscription
pub struct UpstreamLink {
    config: UpstreamConfig,
    state: LinkState,

    /// Incremented for every connect attempt; stale events carry older values
    generation: u64,

    /// Writer queue of the current connection (only while `Open`)
    outbound: Option<mpsc::Sender<String>>,

    registry: SubscriptionRegistry,
    next_request_id: u64,

    /// Consecutive failed attempts since the last successful open
    failures: u32,

    /// Successful opens over the lifetime of the link
    connections: u64,

    /// Frames discarded because the writer queue was full
    dropped_frames: u64,
}

impl UpstreamLink {
    /// Create a link in the `Closed` state
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config,
            state: LinkState::Closed,
            generation: 0,
            outbound: None,
            registry: SubscriptionRegistry::new(),
            next_request_id: 1,
            failures: 0,
            connections: 0,
            dropped_frames: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Generation of the most recent connect attempt
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Number of successful opens
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Frames dropped on a full writer queue
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Start a connect attempt
    ///
    /// No-op (returns `None`) if already `Open`, `Connecting` or `Stopped`.
    /// Otherwise returns the generation the caller must report back with.
    pub fn begin_connect(&mut self) -> Option<u64> {
        match self.state {
            LinkState::Open | LinkState::Connecting | LinkState::Stopped => None,
            LinkState::Closed => {
                self.generation += 1;
                self.state = LinkState::Connecting;
                tracing::debug!(generation = self.generation, "Upstream connecting");
                Some(self.generation)
            }
        }
    }

    /// Complete a connect attempt and replay every subscription
    ///
    /// Returns false if the attempt is stale; the caller then discards the
    /// connection.
    pub fn on_open(&mut self, generation: u64, outbound: mpsc::Sender<String>) -> bool {
        if generation != self.generation || self.state != LinkState::Connecting {
            tracing::debug!(
                generation = generation,
                current = self.generation,
                "Discarding stale upstream connection"
            );
            return false;
        }

        self.state = LinkState::Open;
        self.outbound = Some(outbound);
        self.failures = 0;
        self.connections += 1;

        self.registry.reset_remote_ids();
        let replay: Vec<RpcRequest> = self
            .registry
            .iter()
            .map(|sub| RpcRequest::new(sub.local_id, sub.method.clone(), sub.params.clone()))
            .collect();

        tracing::info!(
            generation = generation,
            subscriptions = replay.len(),
            "Upstream connected"
        );

        for request in replay {
            self.transmit(&request);
        }

        true
    }

    /// A connect attempt failed
    ///
    /// Returns the delay before the next attempt, or `None` if the event is
    /// stale or the retry limit has been reached.
    pub fn on_connect_failed(&mut self, generation: u64) -> Option<Duration> {
        if generation != self.generation || self.state != LinkState::Connecting {
            return None;
        }
        self.state = LinkState::Closed;
        self.schedule_reconnect()
    }

    /// The connection of `generation` closed
    ///
    /// Returns the delay before the single reconnect attempt, or `None` if
    /// the event is stale or the retry limit has been reached.
    pub fn on_close(&mut self, generation: u64) -> Option<Duration> {
        if generation != self.generation || self.state != LinkState::Open {
            return None;
        }
        self.outbound = None;
        self.state = LinkState::Closed;
        tracing::warn!(generation = generation, "Upstream disconnected");
        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> Option<Duration> {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1);

        if let Some(max) = self.config.max_reconnect_attempts {
            if attempt >= max {
                tracing::error!(
                    attempts = attempt,
                    "Upstream reconnect attempts exhausted, giving up"
                );
                self.state = LinkState::Stopped;
                return None;
            }
        }

        let delay = self.config.backoff_delay(attempt);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "Upstream reconnect scheduled"
        );
        Some(delay)
    }

    /// Transmit a subscribe request if the link is open
    ///
    /// While not `Open` this is a no-op: the subscription is replayed once
    /// the connection comes back.
    pub fn send(&mut self, local_id: LocalId, method: &str, params: &[Value]) {
        if !self.is_open() {
            tracing::debug!(
                local_id = local_id,
                state = ?self.state,
                "Upstream not open, request deferred to replay"
            );
            return;
        }

        let request = RpcRequest::new(local_id, method, params.to_vec());
        self.transmit(&request);
    }

    /// Register a subscription and send its request
    pub fn subscribe(
        &mut self,
        method: &str,
        params: Vec<Value>,
        on_notify: NotifyFn,
    ) -> Result<LocalId, RegistryError> {
        let local_id = self.allocate_id();
        self.registry
            .register(local_id, method, params.clone(), on_notify)?;
        self.send(local_id, method, &params);
        Ok(local_id)
    }

    /// Remove a subscription and cancel it upstream if possible
    ///
    /// Registry removal always happens, before anything is sent. The
    /// upstream cancel is only sent when the subscription was acknowledged
    /// and the link is open. Returns false if `local_id` was not live.
    pub fn unsubscribe(&mut self, local_id: LocalId) -> bool {
        let sub = match self.registry.remove(local_id) {
            Some(sub) => sub,
            None => return false,
        };

        if let (Some(remote_id), true) = (sub.remote_id(), self.is_open()) {
            let request_id = self.allocate_id();
            let request = RpcRequest::new(request_id, sub.unsubscribe_method(), vec![json!(remote_id)]);
            tracing::debug!(
                local_id = local_id,
                remote_id = remote_id,
                request_id = request_id,
                "Cancelling upstream subscription"
            );
            self.transmit(&request);
        }

        true
    }

    /// Dispatch one inbound text frame
    pub fn handle_frame(&mut self, text: &str) -> FrameOutcome {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "Dropping malformed upstream frame");
                return FrameOutcome::Malformed;
            }
        };

        match frame {
            InboundFrame::Ack {
                local_id,
                remote_id,
            } => {
                if self.registry.set_remote_id(local_id, remote_id) {
                    tracing::debug!(
                        local_id = local_id,
                        remote_id = remote_id,
                        "Subscription acknowledged"
                    );
                    FrameOutcome::Acknowledged {
                        local_id,
                        remote_id,
                    }
                } else {
                    FrameOutcome::Ignored
                }
            }
            InboundFrame::Notification {
                remote_id, payload, ..
            } => match self.registry.find_by_remote_id(remote_id) {
                Some(sub) => {
                    let local_id = sub.local_id;
                    match sub.notify(payload) {
                        Delivery::Queued => FrameOutcome::Delivered { local_id },
                        Delivery::Dropped => FrameOutcome::Dropped { local_id },
                    }
                }
                None => {
                    tracing::debug!(remote_id = remote_id, "Notification for unknown subscription");
                    FrameOutcome::UnknownSubscription { remote_id }
                }
            },
            InboundFrame::RpcError { id, error } => {
                tracing::warn!(request_id = ?id, error = %error, "Upstream returned an error");
                FrameOutcome::Ignored
            }
            InboundFrame::Other => FrameOutcome::Ignored,
        }
    }

    /// Close the connection and stop reconnecting
    pub fn shutdown(&mut self) {
        self.outbound = None;
        self.state = LinkState::Stopped;
        // Invalidate any in-flight connect attempt
        self.generation += 1;
        tracing::info!(subscriptions = self.registry.len(), "Upstream link stopped");
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn transmit(&mut self, request: &RpcRequest) {
        let text = match request.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, method = %request.method, "Failed to encode request");
                return;
            }
        };

        let tx = match self.outbound {
            Some(ref tx) => tx,
            None => return,
        };

        match tx.try_send(text) {
            Ok(()) => {}
            // Subscribes are replayed on the next connection
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                tracing::warn!(
                    request_id = request.id,
                    method = %request.method,
                    dropped_frames = self.dropped_frames,
                    "Upstream writer queue full, frame dropped"
                );
            }
            // A closed writer is reported separately through the inbound side
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(request_id = request.id, "Upstream writer gone, frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn link() -> UpstreamLink {
        UpstreamLink::new(
            UpstreamConfig::default()
                .reconnect_delay(Duration::from_millis(100))
                .max_reconnect_delay(Duration::from_millis(400)),
        )
    }

    fn noop() -> NotifyFn {
        Box::new(|_| Delivery::Queued)
    }

    fn open(link: &mut UpstreamLink) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(64);
        let generation = link.begin_connect().unwrap();
        assert!(link.on_open(generation, tx));
        rx
    }

    fn next(rx: &mut mpsc::Receiver<String>) -> RpcRequest {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_begin_connect_is_idempotent() {
        let mut link = link();

        assert_eq!(link.begin_connect(), Some(1));
        assert_eq!(link.state(), LinkState::Connecting);
        assert_eq!(link.begin_connect(), None);
    }

    #[test]
    fn test_no_connect_while_open() {
        let mut link = link();
        let _rx = open(&mut link);

        assert!(link.is_open());
        assert_eq!(link.begin_connect(), None);
    }

    #[test]
    fn test_send_while_closed_is_noop() {
        let mut link = link();

        let local_id = link
            .subscribe("logsSubscribe", vec![json!("AAA1")], noop())
            .unwrap();

        // Registered even though nothing could be sent
        assert!(link.registry().contains(local_id));

        // Replayed on open with the same id
        let mut rx = open(&mut link);
        let request = next(&mut rx);
        assert_eq!(request.id, local_id);
        assert_eq!(request.method, "logsSubscribe");
        assert_eq!(request.params, vec![json!("AAA1")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ack_sets_remote_id() {
        let mut link = link();
        let mut rx = open(&mut link);

        let local_id = link.subscribe("logsSubscribe", vec![], noop()).unwrap();
        assert_eq!(next(&mut rx).id, local_id);

        let outcome = link.handle_frame(&format!(r#"{{"jsonrpc":"2.0","id":{},"result":77}}"#, local_id));
        assert_eq!(
            outcome,
            FrameOutcome::Acknowledged {
                local_id,
                remote_id: 77
            }
        );
        assert_eq!(link.registry().get(local_id).unwrap().remote_id(), Some(77));
    }

    #[test]
    fn test_ack_for_unknown_id_is_ignored() {
        let mut link = link();
        let _rx = open(&mut link);

        assert_eq!(link.handle_frame(r#"{"id":999,"result":5}"#), FrameOutcome::Ignored);
        assert!(link.registry().find_by_remote_id(5).is_none());
    }

    #[test]
    fn test_notification_routing() {
        let mut link = link();
        let mut rx = open(&mut link);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let local_id = link
            .subscribe(
                "logsSubscribe",
                vec![],
                Box::new(move |payload| {
                    sink.lock().unwrap().push(payload);
                    Delivery::Queued
                }),
            )
            .unwrap();
        let _ = next(&mut rx);
        link.handle_frame(&format!(r#"{{"id":{},"result":77}}"#, local_id));

        let outcome = link.handle_frame(
            r#"{"method":"logsNotification","params":{"subscription":77,"result":{"value":{"signature":"sig1"}}}}"#,
        );
        assert_eq!(outcome, FrameOutcome::Delivered { local_id });
        assert_eq!(seen.lock().unwrap()[0]["value"]["signature"], "sig1");
    }

    #[test]
    fn test_unknown_remote_id_is_dropped() {
        let mut link = link();
        let _rx = open(&mut link);

        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        link.subscribe(
            "logsSubscribe",
            vec![],
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                Delivery::Queued
            }),
        )
        .unwrap();

        let outcome = link.handle_frame(
            r#"{"method":"logsNotification","params":{"subscription":404,"result":{}}}"#,
        );
        assert_eq!(outcome, FrameOutcome::UnknownSubscription { remote_id: 404 });
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(link.is_open());
    }

    #[test]
    fn test_malformed_frame_keeps_link_open() {
        let mut link = link();
        let _rx = open(&mut link);

        assert_eq!(link.handle_frame("{not json"), FrameOutcome::Malformed);
        assert!(link.is_open());
    }

    #[test]
    fn test_array_frame_does_not_acknowledge() {
        let mut link = link();
        let _rx = open(&mut link);
        let local_id = link.subscribe("logsSubscribe", vec![], noop()).unwrap();

        let text = format!("[{},77]", local_id);
        assert_eq!(link.handle_frame(&text), FrameOutcome::Malformed);
        assert_eq!(link.registry().get(local_id).unwrap().remote_id(), None);
        assert!(link.registry().find_by_remote_id(77).is_none());
    }

    #[test]
    fn test_dropped_delivery_is_reported() {
        let mut link = link();
        let mut rx = open(&mut link);

        let local_id = link
            .subscribe("logsSubscribe", vec![], Box::new(|_| Delivery::Dropped))
            .unwrap();
        let _ = next(&mut rx);
        link.handle_frame(&format!(r#"{{"id":{},"result":3}}"#, local_id));

        let outcome =
            link.handle_frame(r#"{"method":"logsNotification","params":{"subscription":3}}"#);
        assert_eq!(outcome, FrameOutcome::Dropped { local_id });
    }

    #[test]
    fn test_unsubscribe_sends_cancel_for_acknowledged() {
        let mut link = link();
        let mut rx = open(&mut link);

        let local_id = link.subscribe("logsSubscribe", vec![], noop()).unwrap();
        let _ = next(&mut rx);
        link.handle_frame(&format!(r#"{{"id":{},"result":77}}"#, local_id));

        assert!(link.unsubscribe(local_id));
        assert!(!link.registry().contains(local_id));

        let cancel = next(&mut rx);
        assert_eq!(cancel.method, "logsUnsubscribe");
        assert_eq!(cancel.params, vec![json!(77)]);
        assert_ne!(cancel.id, local_id);

        // Late notification for the cancelled subscription
        let outcome = link.handle_frame(
            r#"{"method":"logsNotification","params":{"subscription":77,"result":{}}}"#,
        );
        assert_eq!(outcome, FrameOutcome::UnknownSubscription { remote_id: 77 });
    }

    #[test]
    fn test_unsubscribe_unacknowledged_sends_nothing() {
        let mut link = link();
        let mut rx = open(&mut link);

        let local_id = link.subscribe("logsSubscribe", vec![], noop()).unwrap();
        let _ = next(&mut rx);

        assert!(link.unsubscribe(local_id));
        assert!(rx.try_recv().is_err());
        assert!(!link.unsubscribe(local_id));
    }

    #[test]
    fn test_unsubscribe_while_closed_removes_synchronously() {
        let mut link = link();
        let _rx = open(&mut link);

        let local_id = link.subscribe("logsSubscribe", vec![], noop()).unwrap();
        link.handle_frame(&format!(r#"{{"id":{},"result":77}}"#, local_id));

        let generation = link.generation();
        assert!(link.on_close(generation).is_some());
        assert_eq!(link.state(), LinkState::Closed);

        assert!(link.unsubscribe(local_id));
        assert!(link.registry().is_empty());
    }

    #[test]
    fn test_replay_after_reconnect() {
        let mut link = link();
        let mut rx = open(&mut link);

        let a = link.subscribe("logsSubscribe", vec![json!("AAA1")], noop()).unwrap();
        let b = link.subscribe("logsSubscribe", vec![json!("BBB2")], noop()).unwrap();
        let _ = next(&mut rx);
        let _ = next(&mut rx);
        link.handle_frame(&format!(r#"{{"id":{},"result":10}}"#, a));
        link.handle_frame(&format!(r#"{{"id":{},"result":11}}"#, b));

        let delay = link.on_close(link.generation()).unwrap();
        assert_eq!(delay, Duration::from_millis(100));

        let mut rx = open(&mut link);
        let replayed: Vec<RpcRequest> = vec![next(&mut rx), next(&mut rx)];
        assert_eq!(replayed[0].id, a);
        assert_eq!(replayed[0].params, vec![json!("AAA1")]);
        assert_eq!(replayed[1].id, b);
        assert_eq!(replayed[1].params, vec![json!("BBB2")]);

        // Remote ids from the old connection are forgotten
        assert_eq!(link.registry().acknowledged_count(), 0);
        assert!(link.registry().find_by_remote_id(10).is_none());

        // A fresh ack only touches its own subscription
        link.handle_frame(&format!(r#"{{"id":{},"result":20}}"#, b));
        assert_eq!(link.registry().get(b).unwrap().remote_id(), Some(20));
        assert_eq!(link.registry().get(a).unwrap().remote_id(), None);
        assert_eq!(link.connections(), 2);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut link = link();
        let _rx = open(&mut link);
        let old = link.generation();

        assert!(link.on_close(old).is_some());
        let current = link.begin_connect().unwrap();

        // Close of the previous connection arriving late
        assert_eq!(link.on_close(old), None);
        assert_eq!(link.state(), LinkState::Connecting);

        // Result of an older attempt
        let (tx, _rx) = mpsc::channel(1);
        assert!(!link.on_open(old, tx));
        assert_eq!(link.on_connect_failed(old), None);

        let (tx, _rx) = mpsc::channel(1);
        assert!(link.on_open(current, tx));
    }

    #[test]
    fn test_backoff_grows_until_open() {
        let mut link = link();

        let g = link.begin_connect().unwrap();
        assert_eq!(link.on_connect_failed(g), Some(Duration::from_millis(100)));
        let g = link.begin_connect().unwrap();
        assert_eq!(link.on_connect_failed(g), Some(Duration::from_millis(200)));
        let g = link.begin_connect().unwrap();
        assert_eq!(link.on_connect_failed(g), Some(Duration::from_millis(400)));
        let g = link.begin_connect().unwrap();
        assert_eq!(link.on_connect_failed(g), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_retry_limit_stops_link() {
        let mut link = UpstreamLink::new(
            UpstreamConfig::default().max_reconnect_attempts(Some(2)),
        );

        let g = link.begin_connect().unwrap();
        assert!(link.on_connect_failed(g).is_some());
        let g = link.begin_connect().unwrap();
        assert!(link.on_connect_failed(g).is_some());
        let g = link.begin_connect().unwrap();
        assert_eq!(link.on_connect_failed(g), None);

        assert_eq!(link.state(), LinkState::Stopped);
        assert_eq!(link.begin_connect(), None);
    }

    #[test]
    fn test_full_writer_queue_drops_instead_of_waiting() {
        let mut link = link();
        let (tx, mut rx) = mpsc::channel(1);
        let generation = link.begin_connect().unwrap();
        assert!(link.on_open(generation, tx));

        let a = link.subscribe("logsSubscribe", vec![json!("AAA1")], noop()).unwrap();
        let b = link.subscribe("logsSubscribe", vec![json!("BBB2")], noop()).unwrap();
        let c = link.subscribe("logsSubscribe", vec![json!("CCC3")], noop()).unwrap();

        // Only the first fit; the rest stay registered for replay
        assert_eq!(link.dropped_frames(), 2);
        assert_eq!(next(&mut rx).id, a);
        assert!(rx.try_recv().is_err());
        assert!(link.registry().contains(b));
        assert!(link.registry().contains(c));
        assert!(link.is_open());
    }

    #[tokio::test]
    async fn test_shutdown_stops_link() {
        let mut link = link();
        let mut rx = open(&mut link);

        link.shutdown();

        assert_eq!(link.state(), LinkState::Stopped);
        assert_eq!(link.begin_connect(), None);
        // Writer queue closed
        assert!(rx.recv().await.is_none());
    }
}
