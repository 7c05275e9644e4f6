//! Session state machine
//!
//! Tracks whether a client is bound to a subscription. A client holds at
//! most one subscription: binding a new one hands back the previous binding
//! so the caller can cancel it first.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::gateway::protocol::ServerEvent;
use crate::registry::{Delivery, LocalId};

/// Subscription owned by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Registry id of the subscription
    pub local_id: LocalId,
    /// Address the client asked for
    pub address: String,
}

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, no subscription
    Idle,
    /// Bound to exactly one subscription
    Subscribed(Binding),
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    phase: SessionPhase,

    /// Queue drained by the connection's writer
    events: mpsc::Sender<ServerEvent>,

    /// Connection start time
    pub connected_at: Instant,

    /// Events discarded because the queue was full
    pub dropped_events: u64,
}

impl SessionState {
    /// Create a new idle session
    pub fn new(id: u64, peer_addr: SocketAddr, events: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Idle,
            events,
            connected_at: Instant::now(),
            dropped_events: 0,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Check if the session owns a subscription
    pub fn is_subscribed(&self) -> bool {
        matches!(self.phase, SessionPhase::Subscribed(_))
    }

    /// Current binding, if any
    pub fn binding(&self) -> Option<&Binding> {
        match self.phase {
            SessionPhase::Subscribed(ref binding) => Some(binding),
            SessionPhase::Idle => None,
        }
    }

    /// Bind to a subscription, returning the binding it replaces
    pub fn bind(&mut self, local_id: LocalId, address: impl Into<String>) -> Option<Binding> {
        let previous = self.take_binding();
        self.phase = SessionPhase::Subscribed(Binding {
            local_id,
            address: address.into(),
        });
        previous
    }

    /// Release the current binding and return to idle
    pub fn take_binding(&mut self) -> Option<Binding> {
        match std::mem::replace(&mut self.phase, SessionPhase::Idle) {
            SessionPhase::Subscribed(binding) => Some(binding),
            SessionPhase::Idle => None,
        }
    }

    /// Sender clone for subscription callbacks
    pub fn event_sender(&self) -> mpsc::Sender<ServerEvent> {
        self.events.clone()
    }

    /// Queue an event for the client without waiting
    pub fn push(&mut self, event: ServerEvent) -> Delivery {
        let delivery = deliver(&self.events, event);
        if delivery == Delivery::Dropped {
            self.dropped_events += 1;
        }
        delivery
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

/// Fire-and-forget push into a client's bounded queue
///
/// A full queue drops the event instead of stalling the caller.
pub fn deliver(events: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Delivery {
    match events.try_send(event) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Client queue full, dropping event");
            Delivery::Dropped
        }
        Err(TrySendError::Closed(_)) => Delivery::Dropped,
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn session(capacity: usize) -> (SessionState, mpsc::Receiver<ServerEvent>) {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        let (tx, rx) = mpsc::channel(capacity);
        (SessionState::new(1, addr, tx), rx)
    }

    #[test]
    fn test_session_lifecycle() {
        let (mut state, _rx) = session(4);

        assert_eq!(state.phase(), &SessionPhase::Idle);
        assert!(!state.is_subscribed());

        assert_eq!(state.bind(1, "AAA1"), None);
        assert!(state.is_subscribed());
        assert_eq!(state.binding().unwrap().address, "AAA1");

        let released = state.take_binding().unwrap();
        assert_eq!(released.local_id, 1);
        assert_eq!(state.phase(), &SessionPhase::Idle);
        assert_eq!(state.take_binding(), None);
    }

    #[test]
    fn test_bind_replaces_previous() {
        let (mut state, _rx) = session(4);

        state.bind(1, "AAA1");
        let previous = state.bind(2, "BBB2").unwrap();

        assert_eq!(previous.local_id, 1);
        assert_eq!(previous.address, "AAA1");
        assert_eq!(state.binding().unwrap().local_id, 2);
    }

    #[test]
    fn test_push_is_bounded() {
        let (mut state, mut rx) = session(1);

        let event = ServerEvent::Subscribed {
            address: "AAA1".into(),
        };
        assert_eq!(state.push(event.clone()), Delivery::Queued);
        assert_eq!(state.push(event.clone()), Delivery::Dropped);
        assert_eq!(state.dropped_events, 1);

        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_push_after_client_gone() {
        let (mut state, rx) = session(4);
        drop(rx);

        let event = ServerEvent::Subscribed {
            address: "AAA1".into(),
        };
        assert_eq!(state.push(event), Delivery::Dropped);
    }
}
