//! Pending call context.
//!
//! A [`PendingCall`] is created when a client call is issued and is attached
//! to that call's listener. It owns the call's timeout handle and the one-shot
//! settlement slot. Whoever settles first (matching reply, timeout,
//! bus closure, bus error) wins; every later attempt is ignored.

use crate::timer::TimerHandle;
use parking_lot::Mutex;
use rpc_types::ApiError;
use tokio::sync::oneshot;
use tracing::debug;

/// Terminal outcome of a call: the reply's `data` or the rejection.
pub type CallOutcome = Result<serde_json::Value, ApiError>;

/// Context of a call awaiting its reply.
#[derive(Debug)]
pub struct PendingCall {
    request_id: String,
    timeout: Mutex<Option<TimerHandle>>,
    settle: Mutex<Option<oneshot::Sender<CallOutcome>>>,
}

impl PendingCall {
    /// Create the context and the receiver the caller awaits.
    pub fn new(request_id: impl Into<String>) -> (Self, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let call = Self {
            request_id: request_id.into(),
            timeout: Mutex::new(None),
            settle: Mutex::new(Some(tx)),
        };
        (call, rx)
    }

    /// Correlation id of the request this call sent.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Store the timeout handle. Cancels it at once if the call already settled.
    pub fn set_timeout(&self, handle: TimerHandle) {
        if self.is_settled() {
            handle.cancel();
            return;
        }
        if let Some(previous) = self.timeout.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Cancel the timeout, if one is still armed.
    pub fn clear_timeout(&self) {
        if let Some(handle) = self.timeout.lock().take() {
            handle.cancel();
        }
    }

    /// True once the call has resolved or been rejected.
    pub fn is_settled(&self) -> bool {
        self.settle.lock().is_none()
    }

    /// Resolve with a reply payload. Returns false if the call had already settled.
    pub fn resolve(&self, data: serde_json::Value) -> bool {
        self.finish(Ok(data))
    }

    /// Reject with an error. Returns false if the call had already settled.
    pub fn reject(&self, error: ApiError) -> bool {
        self.finish(Err(error))
    }

    fn finish(&self, outcome: CallOutcome) -> bool {
        let Some(tx) = self.settle.lock().take() else {
            return false;
        };
        self.clear_timeout();
        if tx.send(outcome).is_err() {
            // Caller stopped waiting; the call is settled all the same.
            debug!(request_id = %self.request_id, "Pending call receiver dropped");
        }
        true
    }
}
