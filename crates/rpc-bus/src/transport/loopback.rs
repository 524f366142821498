//! In-process loopback transport.
//!
//! `send` on one half delivers synchronously to the other half. The link
//! only carries messages: closing one half leaves the other open.

use crate::registry::{Dispatcher, MessageBus};
use rpc_types::Envelope;
use std::sync::{Arc, OnceLock, Weak};
use tracing::trace;

/// One half of a linked pair.
#[derive(Debug)]
pub struct LoopbackBus {
    dispatcher: Dispatcher,
    peer: OnceLock<Weak<LoopbackBus>>,
}

/// Both halves of a loopback link.
#[derive(Debug, Clone)]
pub struct LinkedPair {
    pub client_bus: Arc<LoopbackBus>,
    pub server_bus: Arc<LoopbackBus>,
}

impl LoopbackBus {
    /// Build both halves and cross-link them before either is handed out.
    #[must_use]
    pub fn linked_pair() -> LinkedPair {
        let client_bus = Arc::new(Self::unlinked());
        let server_bus = Arc::new(Self::unlinked());
        // Freshly created cells; neither set can fail.
        let _ = client_bus.peer.set(Arc::downgrade(&server_bus));
        let _ = server_bus.peer.set(Arc::downgrade(&client_bus));
        LinkedPair {
            client_bus,
            server_bus,
        }
    }

    fn unlinked() -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            peer: OnceLock::new(),
        }
    }

    /// The other half, while it is still alive.
    pub fn peer(&self) -> Option<Arc<LoopbackBus>> {
        self.peer.get().and_then(Weak::upgrade)
    }
}

impl MessageBus for LoopbackBus {
    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn send(&self, envelope: Envelope) {
        if self.is_closed() {
            return;
        }
        if let Some(peer) = self.peer() {
            trace!(
                request_id = %envelope.request_id,
                message_type = %envelope.message_type,
                "Loopback delivery"
            );
            peer.deliver(&envelope);
        }
    }
}
