//! Compile-time endpoint contracts.
//!
//! An endpoint is a named request/response pair such as `"LoadModel"`. The
//! trait carries no behaviour; it only lets the bus type the payloads that
//! travel in `data`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A request/response contract identified by its type tag.
pub trait Endpoint: Send + Sync + 'static {
    /// Type tag; messages use `"<TYPE>Request"` and `"<TYPE>Response"`.
    const TYPE: &'static str;

    /// Payload of the Request `data` field.
    type Request: Serialize + DeserializeOwned + Send + 'static;

    /// Payload of the Response `data` field.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Payload for endpoints that carry no data. Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Declare an endpoint marker type.
///
/// The marker takes the given visibility, private when omitted. It must not
/// be more visible than its payload types.
///
/// ```
/// use rpc_types::{api_endpoint, Empty, Endpoint};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// pub struct StatisticsResponse {
///     pub uptime: u64,
/// }
///
/// api_endpoint!(
///     /// Server statistics.
///     pub Statistics, "Statistics", Empty => StatisticsResponse
/// );
///
/// assert_eq!(Statistics::TYPE, "Statistics");
/// ```
#[macro_export]
macro_rules! api_endpoint {
    ($(#[$meta:meta])* $vis:vis $name:ident, $tag:literal, $request:ty => $response:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::Endpoint for $name {
            const TYPE: &'static str = $tag;
            type Request = $request;
            type Response = $response;
        }
    };
}
