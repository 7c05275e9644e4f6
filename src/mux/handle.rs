//! Handle to the multiplexer task

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::gateway::protocol::ServerEvent;
use crate::stats::MuxStats;

/// Requests processed by the multiplexer task
#[derive(Debug)]
pub(crate) enum Command {
    /// A client connected
    Attach {
        session_id: u64,
        peer_addr: SocketAddr,
        events: mpsc::Sender<ServerEvent>,
    },
    /// Subscribe (or re-subscribe) a client to an address
    Subscribe { session_id: u64, address: String },
    /// A client disconnected
    Detach { session_id: u64 },
    /// Snapshot statistics
    Stats { reply: oneshot::Sender<MuxStats> },
    /// Close the upstream link and release every session
    Shutdown { done: oneshot::Sender<()> },
}

/// Cloneable handle used by the gateway to drive the multiplexer
#[derive(Debug, Clone)]
pub struct MultiplexerHandle {
    tx: mpsc::Sender<Command>,
}

impl MultiplexerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Register a client session and the queue its events go to
    pub async fn attach(
        &self,
        session_id: u64,
        peer_addr: SocketAddr,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<()> {
        self.send(Command::Attach {
            session_id,
            peer_addr,
            events,
        })
        .await
    }

    /// Bind a session to `address`, replacing its previous subscription
    ///
    /// The `SUBSCRIBED` confirmation arrives on the session's event queue.
    pub async fn subscribe(&self, session_id: u64, address: impl Into<String>) -> Result<()> {
        self.send(Command::Subscribe {
            session_id,
            address: address.into(),
        })
        .await
    }

    /// Release a session and its subscription
    pub async fn detach(&self, session_id: u64) -> Result<()> {
        self.send(Command::Detach { session_id }).await
    }

    /// Snapshot statistics
    pub async fn stats(&self) -> Result<MuxStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Stop the multiplexer and wait until it has released everything
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Shutdown { done }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Check if the multiplexer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::Closed)
    }
}
