//! Multiplexer task

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ProtocolError, Result};
use crate::gateway::protocol::ServerEvent;
use crate::registry::NotifyFn;
use crate::session::state::deliver;
use crate::session::SessionState;
use crate::stats::{DeliveryCounters, MuxStats};
use crate::upstream::{InboundEvent, UpstreamConnector, UpstreamLink, UpstreamTransport};

use super::config::MultiplexerConfig;
use super::handle::{Command, MultiplexerHandle};

type ConnectResult = (u64, Result<UpstreamTransport>);

/// Owner of the upstream link and all client bindings
pub struct Multiplexer<C: UpstreamConnector> {
    connector: Arc<C>,
    link: UpstreamLink,
    sessions: HashMap<u64, SessionState>,

    commands: mpsc::Receiver<Command>,

    /// Connect attempts run in their own tasks and report back here
    connect_tx: mpsc::Sender<ConnectResult>,
    connect_rx: mpsc::Receiver<ConnectResult>,

    /// Reader side of the current upstream connection
    inbound: Option<mpsc::Receiver<InboundEvent>>,

    /// When the pending reconnect attempt fires
    reconnect_at: Option<Instant>,

    counters: DeliveryCounters,
    subscription_method: String,
    commitment: String,
    started_at: Instant,
}

impl<C: UpstreamConnector> Multiplexer<C> {
    /// Create a multiplexer and the handle that drives it
    pub fn new(config: MultiplexerConfig, connector: C) -> (Self, MultiplexerHandle) {
        let (tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (connect_tx, connect_rx) = mpsc::channel(4);

        let mux = Self {
            connector: Arc::new(connector),
            subscription_method: config.upstream.subscription_method.clone(),
            commitment: config.upstream.commitment.clone(),
            link: UpstreamLink::new(config.upstream),
            sessions: HashMap::new(),
            commands,
            connect_tx,
            connect_rx,
            inbound: None,
            reconnect_at: None,
            counters: DeliveryCounters::new(),
            started_at: Instant::now(),
        };

        (mux, MultiplexerHandle::new(tx))
    }

    /// Spawn the multiplexer onto the runtime
    ///
    /// The task connects upstream immediately and runs until
    /// [`MultiplexerHandle::shutdown`] is called or every handle is dropped.
    pub fn spawn(config: MultiplexerConfig, connector: C) -> (MultiplexerHandle, JoinHandle<()>) {
        let (mux, handle) = Self::new(config, connector);
        let join = tokio::spawn(mux.run());
        (handle, join)
    }

    /// Run the event loop
    pub async fn run(mut self) {
        self.connect();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            self.shutdown();
                            false
                        }
                    };
                    if !keep_running {
                        return;
                    }
                }
                Some((generation, result)) = self.connect_rx.recv() => {
                    self.on_connect_result(generation, result);
                }
                event = next_inbound(&mut self.inbound) => {
                    self.on_inbound(event);
                }
                _ = reconnect_timer(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.connect();
                }
            }
        }
    }

    /// Start a connect attempt unless one is open or in flight
    fn connect(&mut self) {
        let generation = match self.link.begin_connect() {
            Some(generation) => generation,
            None => return,
        };

        let connector = Arc::clone(&self.connector);
        let tx = self.connect_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect().await;
            let _ = tx.send((generation, result)).await;
        });
    }

    fn schedule_reconnect(&mut self, delay: Option<Duration>) {
        self.reconnect_at = delay.map(|d| Instant::now() + d);
    }

    fn on_connect_result(&mut self, generation: u64, result: Result<UpstreamTransport>) {
        match result {
            Ok(transport) => {
                if self.link.on_open(generation, transport.outbound) {
                    self.inbound = Some(transport.inbound);
                }
            }
            Err(e) => {
                tracing::warn!(generation = generation, error = %e, "Upstream connect failed");
                let delay = self.link.on_connect_failed(generation);
                self.schedule_reconnect(delay);
            }
        }
    }

    fn on_inbound(&mut self, event: Option<InboundEvent>) {
        match event {
            Some(InboundEvent::Frame(text)) => {
                let outcome = self.link.handle_frame(&text);
                self.counters.record(outcome);
            }
            Some(InboundEvent::Closed(reason)) => {
                tracing::debug!(reason = ?reason, "Upstream connection closed");
                self.on_upstream_closed();
            }
            None => self.on_upstream_closed(),
        }
    }

    fn on_upstream_closed(&mut self) {
        self.inbound = None;
        let delay = self.link.on_close(self.link.generation());
        self.schedule_reconnect(delay);
    }

    /// Returns false once the loop should exit
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Attach {
                session_id,
                peer_addr,
                events,
            } => {
                self.sessions
                    .insert(session_id, SessionState::new(session_id, peer_addr, events));
                tracing::debug!(session_id = session_id, peer = %peer_addr, "Session attached");
            }
            Command::Subscribe {
                session_id,
                address,
            } => self.subscribe(session_id, address),
            Command::Detach { session_id } => self.detach(session_id),
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown { done } => {
                self.shutdown();
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    fn subscribe(&mut self, session_id: u64, address: String) {
        let session = match self.sessions.get_mut(&session_id) {
            Some(session) => session,
            None => {
                tracing::warn!(session_id = session_id, "Subscribe from unknown session");
                return;
            }
        };

        // Replace, don't stack
        if let Some(previous) = session.take_binding() {
            tracing::debug!(
                session_id = session_id,
                local_id = previous.local_id,
                address = %previous.address,
                "Replacing subscription"
            );
            self.link.unsubscribe(previous.local_id);
        }

        let events = session.event_sender();
        let on_notify: NotifyFn =
            Box::new(move |payload| deliver(&events, ServerEvent::from_notification(&payload)));
        let params = vec![
            json!({ "mentions": [address.as_str()] }),
            json!({ "commitment": self.commitment.as_str() }),
        ];

        match self.link.subscribe(&self.subscription_method, params, on_notify) {
            Ok(local_id) => {
                session.bind(local_id, address.clone());
                tracing::info!(
                    session_id = session_id,
                    local_id = local_id,
                    address = %address,
                    "Client subscribed"
                );
                session.push(ServerEvent::Subscribed { address });
            }
            Err(e) => {
                tracing::error!(session_id = session_id, error = %e, "Failed to register subscription");
                session.push(ServerEvent::error(&ProtocolError::SubscribeFailed));
            }
        }
    }

    fn detach(&mut self, session_id: u64) {
        let mut session = match self.sessions.remove(&session_id) {
            Some(session) => session,
            None => return,
        };

        if let Some(binding) = session.take_binding() {
            self.link.unsubscribe(binding.local_id);
        }

        tracing::debug!(
            session_id = session_id,
            duration_ms = session.duration().as_millis() as u64,
            dropped_events = session.dropped_events,
            "Session detached"
        );
    }

    fn shutdown(&mut self) {
        for local_id in self.link.registry().local_ids() {
            self.link.unsubscribe(local_id);
        }
        self.link.shutdown();
        self.inbound = None;
        self.reconnect_at = None;

        let sessions = self.sessions.len();
        self.sessions.clear();
        tracing::info!(sessions = sessions, "Multiplexer stopped");
    }

    fn stats(&self) -> MuxStats {
        MuxStats {
            link_state: self.link.state(),
            upstream_connections: self.link.connections(),
            upstream_dropped_frames: self.link.dropped_frames(),
            sessions: self.sessions.len(),
            subscriptions: self.link.registry().len(),
            acknowledged_subscriptions: self.link.registry().acknowledged_count(),
            counters: self.counters.clone(),
            uptime: self.started_at.elapsed(),
        }
    }
}

async fn next_inbound(inbound: &mut Option<mpsc::Receiver<InboundEvent>>) -> Option<InboundEvent> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
