//! # Handler Registry
//!
//! The dispatch core shared by every transport.
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──close()──▶ Closed (terminal)
//! ```
//!
//! While open, listeners are registered and every delivered envelope is handed
//! to a snapshot of them. Once closed, registration, removal, delivery and
//! sending are all no-ops.
//!
//! ## Snapshot Delivery
//!
//! `deliver` copies the listener list and releases the lock before invoking
//! anything. Listeners may register or unregister (themselves included) from
//! inside a delivery pass without affecting who receives the current message.

use crate::pending::PendingCall;
use parking_lot::Mutex;
use rpc_types::{ApiError, Envelope};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Function invoked for every delivered envelope.
pub type Handler = Box<dyn Fn(&Envelope) + Send + Sync + 'static>;

/// Shared reference to a registered listener. Identity is pointer identity.
pub type ListenerRef = Arc<Listener>;

/// A registered handler, optionally carrying the context of a pending call.
///
/// Listeners with a context are client calls awaiting a reply and are
/// force-terminated on closure or transport error. Listeners without one are
/// permanent server handlers.
pub struct Listener {
    handler: Handler,
    context: Option<PendingCall>,
}

impl Listener {
    /// A permanent listener.
    pub fn new(handler: impl Fn(&Envelope) + Send + Sync + 'static) -> ListenerRef {
        Arc::new(Self {
            handler: Box::new(handler),
            context: None,
        })
    }

    /// A listener for a pending call whose handler needs a reference to itself.
    ///
    /// `build` receives a weak reference to the listener under construction.
    pub fn for_call(
        context: PendingCall,
        build: impl FnOnce(Weak<Listener>) -> Handler,
    ) -> ListenerRef {
        Arc::new_cyclic(|me| Self {
            handler: build(me.clone()),
            context: Some(context),
        })
    }

    /// Pending call context, if this listener is a client call.
    pub fn context(&self) -> Option<&PendingCall> {
        self.context.as_ref()
    }

    pub fn is_pending_call(&self) -> bool {
        self.context.is_some()
    }

    fn invoke(&self, envelope: &Envelope) {
        (self.handler)(envelope);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    force_terminated: AtomicU64,
}

impl DispatchStats {
    /// Envelopes delivered to a listener snapshot
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Pending calls rejected by closure or transport error
    pub fn force_terminated(&self) -> u64 {
        self.force_terminated.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct RegistryState {
    listeners: Vec<ListenerRef>,
    closed: bool,
}

/// Listener collection plus the open/closed flag.
#[derive(Default)]
pub struct Dispatcher {
    state: Mutex<RegistryState>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Registering the same listener twice makes it run
    /// twice per message.
    pub fn register(&self, listener: ListenerRef) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.listeners.push(listener);
    }

    /// Remove the first registration of `listener`. No-op if absent.
    pub fn unregister(&self, listener: &ListenerRef) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if let Some(index) = state
            .listeners
            .iter()
            .position(|registered| Arc::ptr_eq(registered, listener))
        {
            state.listeners.remove(index);
        }
    }

    /// Hand `envelope` to a snapshot of the current listeners, in order.
    pub fn deliver(&self, envelope: &Envelope) {
        let snapshot = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            state.listeners.clone()
        };

        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        for listener in &snapshot {
            listener.invoke(envelope);
        }
    }

    /// Reject every pending call and mark the bus closed.
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.listeners)
        };
        debug!(listeners = drained.len(), "Message bus closed");
        self.reject_all(drained, |request_id| ApiError::bus_closed(request_id));
    }

    /// Reject every pending call with `make_error(request_id)` and drop all
    /// listeners, permanent ones included. The bus stays open.
    pub fn terminate_pending(&self, make_error: impl Fn(&str) -> ApiError) {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            std::mem::take(&mut state.listeners)
        };
        self.reject_all(drained, make_error);
    }

    fn reject_all(&self, drained: Vec<ListenerRef>, make_error: impl Fn(&str) -> ApiError) {
        for context in drained.iter().filter_map(|listener| listener.context()) {
            context.clear_timeout();
            if context.reject(make_error(context.request_id())) {
                self.stats.force_terminated.fetch_add(1, Ordering::Relaxed);
                warn!(request_id = %context.request_id(), "Pending call force-terminated");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Number of registered listeners that are pending calls.
    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|listener| listener.is_pending_call())
            .count()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Dispatcher")
            .field("listeners", &state.listeners.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A bus bound to a transport.
///
/// Implementors provide their [`Dispatcher`] and the outbound path; the
/// registry operations come for free.
pub trait MessageBus: Send + Sync {
    /// The dispatch core backing this bus.
    fn dispatcher(&self) -> &Dispatcher;

    /// Hand an outbound envelope to the transport. No-op once closed.
    fn send(&self, envelope: Envelope);

    fn register(&self, listener: ListenerRef) {
        self.dispatcher().register(listener);
    }

    fn unregister(&self, listener: &ListenerRef) {
        self.dispatcher().unregister(listener);
    }

    /// Deliver an inbound envelope to the listeners.
    fn deliver(&self, envelope: &Envelope) {
        self.dispatcher().deliver(envelope);
    }

    fn close(&self) {
        self.dispatcher().close();
    }

    fn is_closed(&self) -> bool {
        self.dispatcher().is_closed()
    }

    fn listener_count(&self) -> usize {
        self.dispatcher().listener_count()
    }
}
