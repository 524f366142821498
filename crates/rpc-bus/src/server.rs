//! # Server Call Factory
//!
//! Binds an endpoint handler to a bus. Every matching Request runs the
//! handler in its own task and produces exactly one reply carrying the
//! request's correlation id:
//!
//! - handler success: `<TYPE>Response` with the returned payload (or `{}`)
//! - handler returned an [`ApiError`]: `Error` with that error's data verbatim
//! - any other failure or a panic: `Error` with `InternalServerError`
//! - undecodable request payload: `Error` with `JSONInvalid`
//!
//! Server listeners are permanent. They stay registered until the bus is
//! closed or terminated.

use crate::client::{non_null, CallFactory};
use crate::registry::{Listener, ListenerRef, MessageBus};
use async_trait::async_trait;
use futures::FutureExt;
use rpc_types::{ApiError, Clock, Endpoint, Envelope, ErrorCode, ErrorData};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Application logic behind one endpoint.
///
/// Return an [`ApiError`] (through `anyhow`) for structured failures; its
/// data reaches the caller unchanged.
#[async_trait]
pub trait EndpointHandler<E: Endpoint>: Send + Sync {
    async fn handle(&self, request: E::Request) -> anyhow::Result<E::Response>;
}

/// Adapts an async closure into an [`EndpointHandler`].
struct FnHandler<E, F> {
    f: F,
    _endpoint: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, F, Fut> EndpointHandler<E> for FnHandler<E, F>
where
    E: Endpoint,
    F: Fn(E::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<E::Response>> + Send + 'static,
{
    async fn handle(&self, request: E::Request) -> anyhow::Result<E::Response> {
        (self.f)(request).await
    }
}

impl CallFactory {
    /// Serve endpoint `E` with an async closure.
    pub fn serve<E, F, Fut>(&self, handler: F) -> ListenerRef
    where
        E: Endpoint,
        F: Fn(E::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<E::Response>> + Send + 'static,
    {
        self.serve_handler::<E>(Arc::new(FnHandler {
            f: handler,
            _endpoint: PhantomData,
        }))
    }

    /// Serve endpoint `E` with a handler object.
    ///
    /// Requests are answered on the tokio runtime current at delivery.
    pub fn serve_handler<E: Endpoint>(&self, handler: Arc<dyn EndpointHandler<E>>) -> ListenerRef {
        let bus = Arc::downgrade(&self.bus);
        let clock = Arc::clone(&self.clock);

        let listener = Listener::new(move |msg: &Envelope| {
            if !msg.is_request(E::TYPE) {
                return;
            }
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(request_id = %msg.request_id, endpoint = E::TYPE, "No runtime to answer request");
                return;
            };

            let request_id = msg.request_id.clone();
            let data = msg.data_or_empty();
            let handler = Arc::clone(&handler);
            let bus = bus.clone();
            let clock = Arc::clone(&clock);

            runtime.spawn(async move {
                let reply = answer::<E>(handler.as_ref(), &request_id, data, clock.as_ref()).await;
                send_reply(&bus, reply);
            });
        });

        self.bus.register(Arc::clone(&listener));
        info!(endpoint = E::TYPE, "Server handler registered");
        listener
    }
}

async fn answer<E: Endpoint>(
    handler: &dyn EndpointHandler<E>,
    request_id: &str,
    data: Value,
    clock: &dyn Clock,
) -> Envelope {
    let request: E::Request = match serde_json::from_value(data) {
        Ok(request) => request,
        Err(e) => {
            warn!(request_id, endpoint = E::TYPE, error = %e, "Undecodable request payload");
            let data = ErrorData::new(ErrorCode::JSONInvalid, format!("Invalid request payload: {e}"));
            return Envelope::error(request_id, &data, clock);
        }
    };

    debug!(request_id, endpoint = E::TYPE, "Handling request");
    match AssertUnwindSafe(handler.handle(request)).catch_unwind().await {
        Ok(Ok(response)) => match serde_json::to_value(&response) {
            Ok(data) => Envelope::response(E::TYPE, request_id, non_null(data), clock),
            Err(e) => {
                let failure =
                    ApiError::internal_server(format!("Failed to encode response: {e}"), request_id);
                Envelope::error(request_id, &failure.data, clock)
            }
        },
        Ok(Err(e)) => {
            let data = failure_data(&e, request_id);
            debug!(request_id, endpoint = E::TYPE, error_id = data.error_id, "Handler failed");
            Envelope::error(request_id, &data, clock)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(request_id, endpoint = E::TYPE, %message, "Handler panicked");
            let failure = ApiError::internal_server(message, request_id);
            Envelope::error(request_id, &failure.data, clock)
        }
    }
}

/// Structured failures keep their data; anything else becomes an internal error.
fn failure_data(error: &anyhow::Error, request_id: &str) -> ErrorData {
    match error.downcast_ref::<ApiError>() {
        Some(api) => api.data.clone(),
        None => ApiError::internal_server(error.to_string(), request_id).into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Handler panicked".to_string()
    }
}

fn send_reply(bus: &Weak<dyn MessageBus>, reply: Envelope) {
    match bus.upgrade() {
        Some(bus) => bus.send(reply),
        None => debug!(request_id = %reply.request_id, "Bus dropped before reply"),
    }
}

/// Serve endpoint `E` on `bus` with default collaborators.
pub fn create_server_call<E, F, Fut>(bus: Arc<dyn MessageBus>, handler: F) -> ListenerRef
where
    E: Endpoint,
    F: Fn(E::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<E::Response>> + Send + 'static,
{
    CallFactory::new(bus).serve::<E, _, _>(handler)
}
