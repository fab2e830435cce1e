//! Connection establishment: the server-accept and client-connect paths
//!
//! Both paths run their blocking radio call on a worker and report back
//! through the event sink. A successful outcome of either path is promoted
//! into the [`ActiveSessionSlot`]; a failed one leaves it untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rfchat_core::{
    BoxedStream, ConnectionRole, EstablishError, LinkConfig, ListeningEndpoint, PeerDevice,
    Radio, RadioError, SessionId, SERVICE_UUID,
};
use tracing::{debug, error, info, warn};

use crate::discovery::DiscoveryController;
use crate::events::{EventSink, LinkEvent};
use crate::session::{ActiveSessionSlot, ChatSession};
use crate::workers::WorkerSet;

// ----------------------------------------------------------------------------
// Connection Establisher
// ----------------------------------------------------------------------------

/// Runs both establishment paths and promotes their sessions
pub struct ConnectionEstablisher {
    radio: Arc<dyn Radio>,
    discovery: Arc<DiscoveryController>,
    slot: Arc<ActiveSessionSlot>,
    workers: Arc<WorkerSet>,
    sink: EventSink,
    config: LinkConfig,
    next_session: AtomicU64,
    pending_listener: Mutex<Option<Arc<dyn ListeningEndpoint>>>,
}

impl ConnectionEstablisher {
    pub fn new(
        radio: Arc<dyn Radio>,
        discovery: Arc<DiscoveryController>,
        slot: Arc<ActiveSessionSlot>,
        workers: Arc<WorkerSet>,
        sink: EventSink,
        config: LinkConfig,
    ) -> Self {
        Self {
            radio,
            discovery,
            slot,
            workers,
            sink,
            config,
            next_session: AtomicU64::new(1),
            pending_listener: Mutex::new(None),
        }
    }

    /// Open a listening endpoint and accept exactly one peer
    ///
    /// Emits `ServerWaiting` once the endpoint is open, then either
    /// `SessionEstablished` or `EstablishFailed` from the accept worker. When
    /// the endpoint cannot be opened no worker is started.
    pub async fn start_serving(self: &Arc<Self>) {
        // A new serve replaces a listener still waiting for its peer
        self.cancel_pending();

        let listener = match self
            .radio
            .listen(SERVICE_UUID, &self.config.service_name)
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                warn!("Failed to open listening endpoint: {}", e);
                self.fail(ConnectionRole::Server, EstablishError::ListenUnavailable);
                return;
            }
        };

        *self.lock_pending() = Some(listener.clone());
        self.sink.emit(LinkEvent::ServerWaiting);
        info!("Listening for one peer on {}", SERVICE_UUID);

        let this = self.clone();
        let accept_listener = listener.clone();
        let spawned = self.workers.spawn("accept", async move {
            this.accept_one(accept_listener).await;
        });

        if let Err(e) = spawned {
            listener.close();
            self.clear_pending(&listener);
            self.fail(ConnectionRole::Server, e);
        }
    }

    /// Connect to `peer` on a worker, cancelling discovery first
    pub fn connect_to(self: &Arc<Self>, peer: PeerDevice) {
        let this = self.clone();
        let spawned = self.workers.spawn("connect", async move {
            this.connect_one(peer).await;
        });

        if let Err(e) = spawned {
            self.fail(ConnectionRole::Client, e);
        }
    }

    /// Close a listener that is still waiting for its peer
    pub fn cancel_pending(&self) {
        if let Some(listener) = self.lock_pending().take() {
            listener.close();
            debug!("Closed pending listening endpoint");
        }
    }

    /// Whether a listener is waiting for its peer
    pub fn is_serving(&self) -> bool {
        self.lock_pending().is_some()
    }

    async fn accept_one(&self, listener: Arc<dyn ListeningEndpoint>) {
        let accepted = listener.accept().await;

        // One peer per serve: the endpoint never accepts again
        listener.close();
        self.clear_pending(&listener);

        match accepted {
            Ok(Some(stream)) => {
                info!("Accepted inbound connection");
                self.promote(ConnectionRole::Server, None, stream).await;
            }
            Ok(None) => {
                warn!("Accept returned without a connection");
                self.fail(ConnectionRole::Server, EstablishError::NoSocket);
            }
            Err(e) => {
                error!("Accept failed: {}", e);
                self.fail(
                    ConnectionRole::Server,
                    EstablishError::AcceptFailed(radio_reason(e)),
                );
            }
        }
    }

    async fn connect_one(&self, peer: PeerDevice) {
        // Discovery degrades the radio while connecting
        self.discovery.cancel_discovery().await;

        debug!("Connecting to {}", peer);
        match self.radio.connect(&peer.address, SERVICE_UUID).await {
            Ok(stream) => {
                info!("Connected to {}", peer);
                self.promote(ConnectionRole::Client, Some(peer), stream).await;
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", peer, e);
                self.fail(
                    ConnectionRole::Client,
                    EstablishError::ConnectFailed(radio_reason(e)),
                );
            }
        }
    }

    async fn promote(&self, role: ConnectionRole, peer: Option<PeerDevice>, stream: BoxedStream) {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));

        match ChatSession::open(
            id,
            role,
            peer,
            stream,
            self.sink.clone(),
            &self.workers,
            self.config.max_message_len,
        ) {
            Ok((handle, gate)) => match self.slot.promote(handle, gate, &self.sink).await {
                Ok(_) => info!("Session {} active as {}", id, role),
                Err(e) => debug!("Dropped session {} after teardown: {}", id, e),
            },
            Err(e) => {
                error!("Could not start session {}: {}", id, e);
                self.fail(role, e);
            }
        }
    }

    fn fail(&self, role: ConnectionRole, err: EstablishError) {
        self.sink.emit(LinkEvent::EstablishFailed {
            role,
            reason: err.to_string(),
        });
    }

    fn clear_pending(&self, listener: &Arc<dyn ListeningEndpoint>) {
        let mut pending = self.lock_pending();
        if pending
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, listener))
        {
            pending.take();
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn ListeningEndpoint>>> {
        self.pending_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Detail string of a radio failure without repeating its category
fn radio_reason(err: RadioError) -> String {
    match err {
        RadioError::ConnectFailed(reason) | RadioError::AcceptFailed(reason) => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_reason_strips_category() {
        assert_eq!(
            radio_reason(RadioError::ConnectFailed("peer busy".into())),
            "peer busy"
        );
        assert_eq!(radio_reason(RadioError::Unavailable), "radio unavailable");
    }
}
