//! # Message Envelope
//!
//! The one wire shape shared by Requests, Responses and Errors.
//!
//! | `messageType`          | Variant  | `timestamp` |
//! |------------------------|----------|-------------|
//! | `"<Endpoint>Request"`  | Request  | absent      |
//! | `"<Endpoint>Response"` | Response | present     |
//! | `"APIError"`           | Error    | present     |
//!
//! Every field defaults on decode, so any JSON object parses. A malformed
//! message simply fails every classification predicate.

use crate::clock::Clock;
use crate::errors::{ErrorCode, ErrorData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol identity tag carried by every message.
pub const API_NAME: &str = "VTubeStudioPublicAPI";

/// Protocol version tag carried by every message.
pub const API_VERSION: &str = "1.0";

/// `messageType` of error replies.
pub const ERROR_MESSAGE_TYPE: &str = "APIError";

/// A wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub api_version: String,
    /// Correlation key. Replies copy it from the Request they answer.
    #[serde(rename = "requestID", default)]
    pub request_id: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
    /// Creation time in milliseconds since the Unix epoch (replies only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Envelope {
    fn base(message_type: String, request_id: &str, data: Value, timestamp: Option<u64>) -> Self {
        Self {
            api_name: API_NAME.to_string(),
            api_version: API_VERSION.to_string(),
            request_id: request_id.to_string(),
            message_type,
            data,
            timestamp,
        }
    }

    /// Build a Request for `endpoint`.
    #[must_use]
    pub fn request(endpoint: &str, request_id: &str, data: Value) -> Self {
        Self::base(format!("{endpoint}Request"), request_id, data, None)
    }

    /// Build a Response for `endpoint`, stamped with the current time.
    #[must_use]
    pub fn response(endpoint: &str, request_id: &str, data: Value, clock: &dyn Clock) -> Self {
        Self::base(
            format!("{endpoint}Response"),
            request_id,
            data,
            Some(clock.now_millis()),
        )
    }

    /// Build an `APIError` reply, stamped with the current time.
    #[must_use]
    pub fn error(request_id: &str, data: &ErrorData, clock: &dyn Clock) -> Self {
        let data = serde_json::to_value(data)
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::base(
            ERROR_MESSAGE_TYPE.to_string(),
            request_id,
            data,
            Some(clock.now_millis()),
        )
    }

    /// True if this is a Request for `endpoint`.
    #[must_use]
    pub fn is_request(&self, endpoint: &str) -> bool {
        self.message_type
            .strip_suffix("Request")
            .is_some_and(|name| name == endpoint)
    }

    /// True if this is a Response for `endpoint`.
    #[must_use]
    pub fn is_response(&self, endpoint: &str) -> bool {
        self.message_type
            .strip_suffix("Response")
            .is_some_and(|name| name == endpoint)
    }

    /// True if this is an `APIError` reply.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.message_type == ERROR_MESSAGE_TYPE
    }

    /// The payload, with an absent or null payload read as `{}`.
    #[must_use]
    pub fn data_or_empty(&self) -> Value {
        match &self.data {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        }
    }

    /// Decode the `{errorID, message}` payload of an Error reply.
    ///
    /// Missing or mistyped fields fall back individually, so a reply that
    /// classifies as an Error always yields a payload.
    #[must_use]
    pub fn error_data(&self) -> ErrorData {
        let error_id = self
            .data
            .get("errorID")
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
            .unwrap_or(ErrorCode::InternalClientError.id());
        let message = self
            .data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ErrorData { error_id, message }
    }
}
