//! # RPC Types Crate
//!
//! Wire-level types for the duplex request/response bus.
//!
//! ## Design Principles
//!
//! - **One Envelope Shape**: Requests, Responses and Errors share a single
//!   [`Envelope`] struct; the `messageType` string is the discriminator.
//! - **Correlation by `requestID` Only**: a Response or Error always carries the
//!   `requestID` of the Request it answers. There is no sequence number.
//! - **Typing Without Runtime Cost**: [`Endpoint`] ties an endpoint name to its
//!   request and response payload types at compile time only.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod clock;
pub mod endpoint;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use clock::{Clock, FixedClock, SystemClock};
pub use endpoint::{Empty, Endpoint};
pub use envelope::{Envelope, API_NAME, API_VERSION, ERROR_MESSAGE_TYPE};
pub use errors::{ApiError, ErrorCode, ErrorData};
pub use ids::{IdGenerator, RandomIdGenerator, DEFAULT_ID_LENGTH};
