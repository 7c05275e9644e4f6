//! Upstream transport
//!
//! Opens the provider connection and bridges it onto two channels so the
//! multiplexer task never touches the socket directly:
//!
//! ```text
//!   UpstreamLink ── outbound: mpsc<String> ──► [writer task] ──► ws sink
//!   Multiplexer ◄── inbound: mpsc<InboundEvent> ◄── [reader task] ◄── ws stream
//! ```

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{Error, Result};

use super::config::UpstreamConfig;

/// Capacity of the inbound event queue
const INBOUND_BUFFER: usize = 1024;

/// Event read from the upstream connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text frame
    Frame(String),
    /// The connection is gone (reason, if the transport reported one)
    Closed(Option<String>),
}

/// Channel pair for one live upstream connection
///
/// Dropping `outbound` closes the connection; the reader stops once
/// `inbound` is dropped.
#[derive(Debug)]
pub struct UpstreamTransport {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

/// Opens upstream connections
pub trait UpstreamConnector: Send + Sync + 'static {
    /// Open a new connection to the provider
    fn connect(&self) -> impl Future<Output = Result<UpstreamTransport>> + Send;
}

/// WebSocket connector for the real provider
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: UpstreamConfig,
}

impl WsConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }
}

impl UpstreamConnector for WsConnector {
    async fn connect(&self) -> Result<UpstreamTransport> {
        let url = self.config.url();

        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "upstream connect timed out",
            ))
        })??;

        tracing::debug!(endpoint = %self.config.endpoint, "Upstream WebSocket handshake complete");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.config.outbound_buffer.max(1));
        let (in_tx, in_rx) = mpsc::channel::<InboundEvent>(INBOUND_BUFFER);

        // Writer: drains the outbound queue until the link drops its sender
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::text(text)).await {
                    tracing::warn!(error = %e, "Upstream write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards frames until the socket or the consumer goes away
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = in_tx.closed() => return,
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let text = text.as_str().to_owned();
                            if in_tx.send(InboundEvent::Frame(text)).await.is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => {
                                if in_tx.send(InboundEvent::Frame(text)).await.is_err() {
                                    return;
                                }
                            }
                            Err(_) => tracing::warn!("Dropping non UTF-8 binary frame from upstream"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            break frame.map(|f| format!("{} {}", f.code, f.reason.as_str()));
                        }
                        // Ping replies are queued by tungstenite itself
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(e.to_string()),
                        None => break None,
                    },
                }
            };
            let _ = in_tx.send(InboundEvent::Closed(reason)).await;
        });

        Ok(UpstreamTransport {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector for exercising the multiplexer without a network

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;

    use super::*;

    /// Provider side of one accepted mock connection
    pub(crate) struct MockUpstream {
        pub sent: mpsc::Receiver<String>,
        pub inbound: mpsc::Sender<InboundEvent>,
    }

    impl MockUpstream {
        /// Next frame the link wrote, decoded as JSON
        pub async fn next_sent(&mut self) -> Value {
            let text = tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
                .await
                .expect("timed out waiting for upstream frame")
                .expect("link closed its outbound queue");
            serde_json::from_str(&text).expect("link sent invalid JSON")
        }

        /// Assert nothing else is written within a short window
        pub async fn assert_idle(&mut self) {
            let next = tokio::time::timeout(Duration::from_millis(50), self.sent.recv()).await;
            assert!(next.is_err(), "unexpected upstream frame: {:?}", next);
        }

        pub async fn push(&self, text: impl Into<String>) {
            self.inbound
                .send(InboundEvent::Frame(text.into()))
                .await
                .expect("multiplexer dropped the connection");
        }
    }

    /// Connector handing each new connection to the test
    #[derive(Clone)]
    pub(crate) struct MockConnector {
        accepted: mpsc::UnboundedSender<MockUpstream>,
        refuse: Arc<AtomicBool>,
        writer_capacity: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<MockUpstream>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self {
                accepted: tx,
                refuse: Arc::new(AtomicBool::new(false)),
                writer_capacity: Arc::new(AtomicUsize::new(64)),
            };
            (connector, rx)
        }

        /// Make subsequent connect attempts fail
        pub fn refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }

        /// Writer queue capacity for subsequent connections
        pub fn writer_capacity(&self, capacity: usize) {
            self.writer_capacity.store(capacity.max(1), Ordering::SeqCst);
        }
    }

    impl UpstreamConnector for MockConnector {
        async fn connect(&self) -> Result<UpstreamTransport> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "mock refused",
                )));
            }

            let (out_tx, out_rx) = mpsc::channel(self.writer_capacity.load(Ordering::SeqCst));
            let (in_tx, in_rx) = mpsc::channel(64);
            let _ = self.accepted.send(MockUpstream {
                sent: out_rx,
                inbound: in_tx,
            });

            Ok(UpstreamTransport {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }
}
