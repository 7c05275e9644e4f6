//! Per-client connection handler
//!
//! Each accepted socket gets one task that upgrades it to WebSocket, attaches
//! a session to the multiplexer, and then pumps frames both ways until
//! either side goes away.

use std::net::SocketAddr;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, ProtocolError, Result};
use crate::gateway::config::GatewayConfig;
use crate::gateway::protocol::{ClientRequest, ServerEvent};
use crate::mux::MultiplexerHandle;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// One downstream client connection
pub struct Connection {
    session_id: u64,
    peer_addr: SocketAddr,
    socket: Option<TcpStream>,
    config: GatewayConfig,
    mux: MultiplexerHandle,
}

impl Connection {
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: GatewayConfig,
        mux: MultiplexerHandle,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            socket: Some(socket),
            config,
            mux,
        }
    }

    /// Serve the client until it disconnects
    pub async fn run(&mut self) -> Result<()> {
        let socket = self.socket.take().ok_or(Error::Closed)?;

        let ws = tokio::time::timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        .map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "WebSocket handshake timeout",
            ))
        })??;

        tracing::info!(session_id = self.session_id, peer = %self.peer_addr, "Client connected");

        let (mut sink, mut stream) = ws.split();
        let (events_tx, mut events_rx) = mpsc::channel(self.config.client_buffer.max(1));

        self.mux
            .attach(self.session_id, self.peer_addr, events_tx)
            .await?;

        let result = loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.on_text(text.as_str(), &mut sink).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        if let Err(e) = write_event(&mut sink, &ServerEvent::error(&ProtocolError::InvalidFormat)).await {
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    // Pongs are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
                event = events_rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = write_event(&mut sink, &event).await {
                            break Err(e);
                        }
                    }
                    // Multiplexer released the session
                    None => break Ok(()),
                },
            }
        };

        // Always release the subscription, even on a transport error
        if let Err(e) = self.mux.detach(self.session_id).await {
            tracing::debug!(session_id = self.session_id, error = %e, "Detach failed");
        }
        let _ = sink.close().await;

        tracing::info!(session_id = self.session_id, "Client disconnected");
        result
    }

    async fn on_text(&self, text: &str, sink: &mut WsSink) -> Result<()> {
        match ClientRequest::parse_address(text) {
            Ok(address) => {
                tracing::debug!(session_id = self.session_id, address = %address, "Subscribe request");
                self.mux.subscribe(self.session_id, address).await
            }
            Err(e) => {
                tracing::debug!(session_id = self.session_id, error = %e, "Rejected client frame");
                write_event(sink, &ServerEvent::error(&e)).await
            }
        }
    }
}

async fn write_event(sink: &mut WsSink, event: &ServerEvent) -> Result<()> {
    let text = match event.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode client event");
            return Ok(());
        }
    };
    sink.send(Message::text(text)).await?;
    Ok(())
}
