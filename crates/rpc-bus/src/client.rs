//! # Client Call Factory
//!
//! Issues typed requests and awaits their correlated reply.
//!
//! ## Flow
//!
//! 1. Generate a fresh correlation id
//! 2. Build a transient listener carrying a [`PendingCall`] context
//! 3. Arm the timeout (default 5s)
//! 4. Register the listener, then send the Request
//! 5. The first of {matching Response, matching Error, timeout, closure,
//!    transport error} settles the call and removes the listener

use crate::config::BusConfig;
use crate::pending::{CallOutcome, PendingCall};
use crate::registry::{Handler, Listener, MessageBus};
use crate::timer::{Timer, TokioTimer};
use rpc_types::{ApiError, Clock, Endpoint, Envelope, IdGenerator, RandomIdGenerator, SystemClock};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A bus together with the collaborators calls need.
///
/// Produces client calls ([`CallFactory::client`]) and server registrations
/// ([`CallFactory::serve`]).
#[derive(Clone)]
pub struct CallFactory {
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: BusConfig,
}

impl CallFactory {
    /// Factory with default collaborators and configuration.
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            timer: Arc::new(TokioTimer),
            ids: Arc::new(RandomIdGenerator),
            clock: Arc::new(SystemClock),
            config: BusConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Callable for endpoint `E`.
    pub fn client<E: Endpoint>(&self) -> ClientCall<E> {
        ClientCall {
            factory: self.clone(),
            _endpoint: PhantomData,
        }
    }
}

impl std::fmt::Debug for CallFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Client callable for one endpoint.
pub struct ClientCall<E: Endpoint> {
    factory: CallFactory,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> Clone for ClientCall<E> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            _endpoint: PhantomData,
        }
    }
}

impl<E: Endpoint> ClientCall<E> {
    /// Send a Request and await the typed Response payload.
    pub async fn call(&self, request: E::Request) -> Result<E::Response, ApiError> {
        let request_id = self.next_request_id();
        let data = serde_json::to_value(&request)
            .map_err(|e| ApiError::invalid_payload(e, &request_id))?;

        let reply = self.dispatch(request_id.clone(), data).await?;
        serde_json::from_value(reply).map_err(|e| ApiError::invalid_payload(e, &request_id))
    }

    /// Send a Request with an untyped payload and await the Response `data`.
    pub async fn call_raw(&self, data: Value) -> Result<Value, ApiError> {
        let request_id = self.next_request_id();
        self.dispatch(request_id, data).await
    }

    fn next_request_id(&self) -> String {
        self.factory.ids.generate(self.factory.config.id_length)
    }

    async fn dispatch(&self, request_id: String, data: Value) -> Result<Value, ApiError> {
        let rx = self.issue(&request_id, data);
        match rx.await {
            Ok(outcome) => outcome,
            // Settlement slot dropped unsettled: the bus went away with the call.
            Err(_) => Err(ApiError::bus_closed(request_id)),
        }
    }

    /// Register the call and send its Request. Everything up to the await.
    fn issue(&self, request_id: &str, data: Value) -> oneshot::Receiver<CallOutcome> {
        let bus = &self.factory.bus;
        let (context, rx) = PendingCall::new(request_id);

        if bus.is_closed() {
            debug!(request_id, endpoint = E::TYPE, "Call issued on closed bus");
            context.reject(ApiError::bus_closed(request_id));
            return rx;
        }

        let reply_bus = Arc::downgrade(bus);
        let listener = Listener::for_call(context, move |me: Weak<Listener>| -> Handler {
            Box::new(move |msg: &Envelope| on_reply(&reply_bus, &me, E::TYPE, msg))
        });

        let timeout_bus = Arc::downgrade(bus);
        let timeout_listener = Arc::clone(&listener);
        let handle = self.factory.timer.schedule(
            self.factory.config.request_timeout,
            Box::new(move || {
                if let Some(bus) = timeout_bus.upgrade() {
                    bus.unregister(&timeout_listener);
                }
                if let Some(call) = timeout_listener.context() {
                    if call.reject(ApiError::timeout(call.request_id())) {
                        warn!(request_id = %call.request_id(), endpoint = E::TYPE, "Request timed out");
                    }
                }
            }),
        );
        if let Some(call) = listener.context() {
            call.set_timeout(handle);
        }

        bus.register(Arc::clone(&listener));
        if bus.is_closed() {
            // Closed between the check above and registration.
            if let Some(call) = listener.context() {
                call.reject(ApiError::bus_closed(request_id));
            }
            return rx;
        }

        debug!(request_id, endpoint = E::TYPE, "Sending request");
        bus.send(Envelope::request(E::TYPE, request_id, non_null(data)));
        rx
    }
}

/// Listener body of a pending call.
///
/// Only a Response for this endpoint or an Error with the call's id settles
/// it. Anything else leaves the listener registered.
fn on_reply(bus: &Weak<dyn MessageBus>, me: &Weak<Listener>, endpoint: &str, msg: &Envelope) {
    let Some(listener) = me.upgrade() else {
        return;
    };
    let Some(call) = listener.context() else {
        return;
    };
    if msg.request_id != call.request_id() {
        return;
    }

    let outcome = if msg.is_response(endpoint) {
        Ok(msg.data_or_empty())
    } else if msg.is_error() {
        Err(ApiError::from_data(msg.error_data(), call.request_id()))
    } else {
        return;
    };

    if let Some(bus) = bus.upgrade() {
        bus.unregister(&listener);
    }
    call.clear_timeout();

    let settled = match outcome {
        Ok(data) => call.resolve(data),
        Err(error) => call.reject(error),
    };
    debug!(request_id = %call.request_id(), endpoint, settled, "Reply received");
}

/// An absent payload goes on the wire as `{}`.
pub(crate) fn non_null(data: Value) -> Value {
    match data {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

/// Callable for endpoint `E` on `bus` with default collaborators.
pub fn create_client_call<E: Endpoint>(bus: Arc<dyn MessageBus>) -> ClientCall<E> {
    CallFactory::new(bus).client()
}
