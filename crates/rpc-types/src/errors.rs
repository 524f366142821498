//! # Error Types
//!
//! The `{errorID, message}` payload carried by `APIError` envelopes, the
//! subset of error codes the bus itself emits, and [`ApiError`], the value every
//! rejected call resolves to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes known to the bus.
///
/// Application catalogues extend this range with their own positive ids;
/// those pass through the bus untouched and render as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    // Transport lifecycle
    MessageBusError = -3,
    MessageBusClosed = -2,

    // General
    InternalClientError = -1,
    InternalServerError = 0,
    APIAccessDeactivated = 1,
    JSONInvalid = 2,
    APINameInvalid = 3,
    APIVersionInvalid = 4,
    RequestIDInvalid = 5,
    RequestTypeMissingOrEmpty = 6,
    RequestTypeUnknown = 7,
    RequestRequiresAuthetication = 8,
}

impl ErrorCode {
    /// Numeric wire id.
    #[must_use]
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Look up a known code by wire id.
    #[must_use]
    pub fn from_id(id: i32) -> Option<Self> {
        let code = match id {
            -3 => Self::MessageBusError,
            -2 => Self::MessageBusClosed,
            -1 => Self::InternalClientError,
            0 => Self::InternalServerError,
            1 => Self::APIAccessDeactivated,
            2 => Self::JSONInvalid,
            3 => Self::APINameInvalid,
            4 => Self::APIVersionInvalid,
            5 => Self::RequestIDInvalid,
            6 => Self::RequestTypeMissingOrEmpty,
            7 => Self::RequestTypeUnknown,
            8 => Self::RequestRequiresAuthetication,
            _ => return None,
        };
        Some(code)
    }

    /// Symbolic name of a code.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MessageBusError => "MessageBusError",
            Self::MessageBusClosed => "MessageBusClosed",
            Self::InternalClientError => "InternalClientError",
            Self::InternalServerError => "InternalServerError",
            Self::APIAccessDeactivated => "APIAccessDeactivated",
            Self::JSONInvalid => "JSONInvalid",
            Self::APINameInvalid => "APINameInvalid",
            Self::APIVersionInvalid => "APIVersionInvalid",
            Self::RequestIDInvalid => "RequestIDInvalid",
            Self::RequestTypeMissingOrEmpty => "RequestTypeMissingOrEmpty",
            Self::RequestTypeUnknown => "RequestTypeUnknown",
            Self::RequestRequiresAuthetication => "RequestRequiresAuthetication",
        }
    }

    /// Symbolic name for any wire id, `"Unknown"` outside the known set.
    #[must_use]
    pub fn name_of(id: i32) -> &'static str {
        Self::from_id(id).map_or("Unknown", Self::name)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.id()
    }
}

/// Payload of an `APIError` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(rename = "errorID")]
    pub error_id: i32,
    pub message: String,
}

impl ErrorData {
    pub fn new(error_id: impl Into<i32>, message: impl Into<String>) -> Self {
        Self {
            error_id: error_id.into(),
            message: message.into(),
        }
    }
}

/// A rejected call.
///
/// Carries the remote (or locally generated) error payload and the correlation
/// id of the call it terminated. `thrown_by` holds the transport's own error
/// description when the bus itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub data: ErrorData,
    pub request_id: String,
    pub thrown_by: Option<String>,
}

impl ApiError {
    /// Create a new error for a call.
    pub fn new(
        error_id: impl Into<i32>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self::from_data(ErrorData::new(error_id, message), request_id)
    }

    /// Wrap an error payload received for a call.
    pub fn from_data(data: ErrorData, request_id: impl Into<String>) -> Self {
        Self {
            data,
            request_id: request_id.into(),
            thrown_by: None,
        }
    }

    /// Structured error raised by application handler code.
    ///
    /// The handler does not know the correlation id; the bus forwards only
    /// `data` back to the caller.
    pub fn application(error_id: impl Into<i32>, message: impl Into<String>) -> Self {
        Self::new(error_id, message, String::new())
    }

    /// The call did not settle within its timeout.
    pub fn timeout(request_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalClientError,
            "The request timed out.",
            request_id,
        )
    }

    /// The bus was closed while the call was in flight.
    pub fn bus_closed(request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::MessageBusClosed, "Message bus closed.", request_id)
    }

    /// The transport reported an error while the call was in flight.
    pub fn bus_error(request_id: impl Into<String>, thrown_by: impl Into<String>) -> Self {
        Self::new(ErrorCode::MessageBusError, "Message bus error.", request_id)
            .with_thrown_by(thrown_by)
    }

    /// Unstructured handler failure, reported by its string form.
    pub fn internal_server(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message, request_id)
    }

    /// A payload could not be encoded or decoded on the client side.
    pub fn invalid_payload(details: impl fmt::Display, request_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalClientError,
            format!("Invalid payload: {details}"),
            request_id,
        )
    }

    /// Attach the transport's error description.
    #[must_use]
    pub fn with_thrown_by(mut self, thrown_by: impl Into<String>) -> Self {
        self.thrown_by = Some(thrown_by.into());
        self
    }

    pub fn error_id(&self) -> i32 {
        self.data.error_id
    }

    pub fn message(&self) -> &str {
        &self.data.message
    }

    /// Known code, if the id is one the bus recognises.
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_id(self.data.error_id)
    }

    /// True for the locally generated timeout rejection.
    pub fn is_timeout(&self) -> bool {
        self.code() == Some(ErrorCode::InternalClientError)
            && self.data.message == "The request timed out."
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Error Code: {} {}) (Request ID: {})",
            self.data.message,
            self.data.error_id,
            ErrorCode::name_of(self.data.error_id),
            self.request_id
        )
    }
}

impl std::error::Error for ApiError {}

impl From<ApiError> for ErrorData {
    fn from(err: ApiError) -> Self {
        err.data
    }
}
