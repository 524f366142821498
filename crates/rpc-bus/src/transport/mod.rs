//! # Transport Adapters
//!
//! Bind the dispatch core to a concrete channel.
//!
//! - [`socket`]: any text-frame duplex channel exposing a send path and a
//!   stream of message/closed/error events.
//! - [`loopback`]: two in-process buses wired back to back.
//! - `axum_ws`: an axum WebSocket as a socket transport (feature `axum-ws`).

#[cfg(feature = "axum-ws")]
pub mod axum_ws;
pub mod loopback;
pub mod socket;

pub use loopback::{LinkedPair, LoopbackBus};
pub use socket::{ChannelSink, SocketBus, SocketEvent, SocketPeer, SocketSink, TransportError};
