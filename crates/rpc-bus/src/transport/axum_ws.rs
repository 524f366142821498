//! axum WebSocket as a socket transport.
//!
//! ```ignore
//! async fn upgrade(ws: WebSocketUpgrade) -> impl IntoResponse {
//!     ws.on_upgrade(|socket| async move {
//!         let bus = websocket_bus(socket, &BusConfig::default());
//!         create_server_call::<Statistics, _, _>(bus, |_| async { Ok(stats()) });
//!     })
//! }
//! ```

use crate::config::BusConfig;
use crate::transport::socket::{ChannelSink, SocketBus, SocketEvent};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bind a bus to an upgraded axum WebSocket.
///
/// Outbound frames are written by a dedicated task so that `send` never
/// blocks the caller.
pub fn websocket_bus(socket: WebSocket, config: &BusConfig) -> Arc<SocketBus> {
    let (mut ws_sink, ws_stream) = socket.split();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(text) = frames_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                warn!(error = %e, "Failed to send WebSocket frame");
                break;
            }
        }
        if let Err(e) = ws_sink.close().await {
            debug!(error = %e, "WebSocket already closed");
        }
    });

    let events = ws_stream.filter_map(|frame| async move { frame_to_event(frame) });
    SocketBus::with_config(ChannelSink::new(frames_tx), events, config)
}

fn frame_to_event(frame: Result<Message, axum::Error>) -> Option<SocketEvent> {
    match frame {
        Ok(Message::Text(text)) => Some(SocketEvent::Message(text)),
        // Try to read binary frames as UTF-8 JSON
        Ok(Message::Binary(data)) => String::from_utf8(data).ok().map(SocketEvent::Message),
        Ok(Message::Close(_)) => Some(SocketEvent::Closed),
        // Pings are answered by the WebSocket layer
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(SocketEvent::Error(e.to_string())),
    }
}
