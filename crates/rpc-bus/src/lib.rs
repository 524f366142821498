//! # RPC Bus Crate
//!
//! Request/response correlation over a duplex message transport.
//!
//! A [`MessageBus`] wraps a transport that can send and receive
//! [`Envelope`](rpc_types::Envelope)s. On top of it, a [`CallFactory`]
//! produces two kinds of callables:
//!
//! - **Client calls** send a Request with a fresh correlation id and resolve
//!   when the matching Response (or Error) arrives, the timeout fires, or the
//!   transport closes or fails.
//! - **Server calls** register a permanent listener that answers every
//!   matching Request with exactly one Response or Error.
//!
//! ## Transports
//!
//! | Transport | Use |
//! |-----------|-----|
//! | [`SocketBus`] | Any text-frame duplex socket |
//! | [`transport::axum_ws::websocket_bus`] | Axum WebSocket (feature `axum-ws`) |
//! | [`LoopbackBus`] | Two linked in-process buses |
//!
//! ## Example
//!
//! ```
//! use rpc_bus::{CallFactory, LoopbackBus};
//! use rpc_types::{api_endpoint, Empty};
//!
//! api_endpoint!(Ping, "Ping", Empty => Empty);
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pair = LoopbackBus::linked_pair();
//! CallFactory::new(pair.server_bus.clone()).serve::<Ping, _, _>(|_req| async { Ok(Empty {}) });
//!
//! let ping = CallFactory::new(pair.client_bus.clone()).client::<Ping>();
//! assert_eq!(ping.call(Empty {}).await.unwrap(), Empty {});
//! # }
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod pending;
pub mod registry;
pub mod server;
pub mod timer;
pub mod transport;

pub use client::{create_client_call, CallFactory, ClientCall};
pub use config::{BusConfig, ConfigError, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_REQUEST_TIMEOUT};
pub use pending::{CallOutcome, PendingCall};
pub use registry::{DispatchStats, Dispatcher, Handler, Listener, ListenerRef, MessageBus};
pub use server::{create_server_call, EndpointHandler};
pub use timer::{Timer, TimerHandle, TimerTask, TokioTimer};
pub use transport::{
    ChannelSink, LinkedPair, LoopbackBus, SocketBus, SocketEvent, SocketPeer, SocketSink,
    TransportError,
};
