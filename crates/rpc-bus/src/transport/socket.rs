//! Socket-backed transport.
//!
//! Security features:
//! - Message size limits (default 1MB)
//! - Frames that are not JSON envelopes are dropped, never delivered
//!
//! The socket is consumed as two halves: a [`SocketSink`] that writes text
//! frames and a stream of [`SocketEvent`]s. Construction spawns a pump task
//! that drives the event stream for the lifetime of the connection.

use crate::config::BusConfig;
use crate::registry::{Dispatcher, MessageBus};
use futures::{Stream, StreamExt};
use rpc_types::{ApiError, Envelope};
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from the outbound half of a socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The socket no longer accepts frames.
    #[error("Socket closed")]
    Closed,

    /// Writing the frame failed.
    #[error("Socket send failed: {0}")]
    Send(String),
}

/// Outbound half of a text-frame socket.
pub trait SocketSink: Send + Sync {
    /// Queue one text frame for the remote side.
    fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Inbound events of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame arrived.
    Message(String),
    /// The socket closed.
    Closed,
    /// The socket reported an error. Carries its description.
    Error(String),
}

/// [`SocketSink`] over an unbounded channel of frames.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl SocketSink for ChannelSink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

/// Bus bound to a socket.
pub struct SocketBus {
    dispatcher: Dispatcher,
    sink: Box<dyn SocketSink>,
    connection_id: Uuid,
    max_message_size: usize,
}

impl SocketBus {
    /// Bind a bus to a socket with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(sink: impl SocketSink + 'static, events: S) -> Arc<Self>
    where
        S: Stream<Item = SocketEvent> + Send + 'static,
    {
        Self::with_config(sink, events, &BusConfig::default())
    }

    /// Bind a bus to a socket.
    ///
    /// The event stream ending counts as the socket closing.
    pub fn with_config<S>(sink: impl SocketSink + 'static, events: S, config: &BusConfig) -> Arc<Self>
    where
        S: Stream<Item = SocketEvent> + Send + 'static,
    {
        let bus = Arc::new(Self {
            dispatcher: Dispatcher::new(),
            sink: Box::new(sink),
            connection_id: Uuid::new_v4(),
            max_message_size: config.max_message_size,
        });

        let pump = Arc::clone(&bus);
        tokio::spawn(async move { pump.run(events).await });

        bus
    }

    /// Bus over in-memory channels, plus the handle for the other end.
    pub fn channel() -> (Arc<Self>, SocketPeer) {
        Self::channel_with_config(&BusConfig::default())
    }

    pub fn channel_with_config(config: &BusConfig) -> (Arc<Self>, SocketPeer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let bus = Self::with_config(
            ChannelSink::new(sent_tx),
            UnboundedReceiverStream::new(events_rx),
            config,
        );
        let peer = SocketPeer {
            sent: sent_rx,
            events: events_tx,
        };
        (bus, peer)
    }

    /// Identifier used in this connection's log records.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    async fn run<S>(self: Arc<Self>, events: S)
    where
        S: Stream<Item = SocketEvent> + Send,
    {
        let mut events = std::pin::pin!(events);
        info!(connection_id = %self.connection_id, "Socket bus started");

        while let Some(event) = events.next().await {
            if self.handle_event(event).is_break() {
                return;
            }
        }

        debug!(connection_id = %self.connection_id, "Socket event stream ended");
        self.close();
    }

    fn handle_event(&self, event: SocketEvent) -> ControlFlow<()> {
        match event {
            SocketEvent::Message(text) => {
                self.handle_text(&text);
                ControlFlow::Continue(())
            }
            SocketEvent::Closed => {
                info!(connection_id = %self.connection_id, "Socket closed");
                self.close();
                ControlFlow::Break(())
            }
            SocketEvent::Error(error) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %error,
                    "Socket error, rejecting pending calls"
                );
                self.dispatcher
                    .terminate_pending(|request_id| ApiError::bus_error(request_id, error.clone()));
                ControlFlow::Continue(())
            }
        }
    }

    fn handle_text(&self, text: &str) {
        if text.len() > self.max_message_size {
            warn!(
                connection_id = %self.connection_id,
                size = text.len(),
                max = self.max_message_size,
                "Message exceeds size limit"
            );
            return;
        }

        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                debug!(
                    connection_id = %self.connection_id,
                    request_id = %envelope.request_id,
                    message_type = %envelope.message_type,
                    "Received message"
                );
                self.deliver(&envelope);
            }
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Dropping frame that is not a JSON envelope"
                );
            }
        }
    }
}

impl MessageBus for SocketBus {
    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn send(&self, envelope: Envelope) {
        if self.is_closed() {
            return;
        }

        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    request_id = %envelope.request_id,
                    error = %e,
                    "Failed to serialize envelope"
                );
                return;
            }
        };

        if let Err(e) = self.sink.send_text(text) {
            warn!(
                connection_id = %self.connection_id,
                request_id = %envelope.request_id,
                error = %e,
                "Failed to write frame"
            );
        }
    }
}

impl std::fmt::Debug for SocketBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketBus")
            .field("connection_id", &self.connection_id)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// The remote end of a [`SocketBus::channel`] bus.
#[derive(Debug)]
pub struct SocketPeer {
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketPeer {
    /// Push a raw text frame to the bus. Returns false once the bus stopped reading.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Message(text.into())).is_ok()
    }

    /// Push an envelope to the bus as a JSON text frame.
    pub fn push_envelope(&self, envelope: &Envelope) -> bool {
        match serde_json::to_string(envelope) {
            Ok(text) => self.push_text(text),
            Err(_) => false,
        }
    }

    /// Signal that the socket closed.
    pub fn push_close(&self) -> bool {
        self.events.send(SocketEvent::Closed).is_ok()
    }

    /// Signal a socket error.
    pub fn push_error(&self, error: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Error(error.into())).is_ok()
    }

    /// Next frame the bus wrote, waiting if none is queued.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Next frame the bus wrote, decoded as an envelope.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        let text = self.next_sent().await?;
        serde_json::from_str(&text).ok()
    }

    /// Next queued frame, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }
}
