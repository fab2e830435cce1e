//! Notifications delivered to the presentation layer
//!
//! Every event produced by a background worker is pushed onto a single
//! channel. Its one consumer, the presentation layer, is the UI-affine
//! context: events are observed there in the order they were emitted,
//! whichever task produced them.

use rfchat_core::{ConnectionRole, PeerDevice, SessionId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::SessionHandle;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Lifecycle and message notifications emitted by the link
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Discovery is running
    ScanStarted,
    /// Discovery was cancelled
    ScanStopped,
    /// A peer was seen for the first time in the current scan
    PeerFound(PeerDevice),
    /// The listening endpoint is open and waiting for one peer
    ServerWaiting,
    /// A session was promoted to active
    SessionEstablished { handle: SessionHandle },
    /// An establishment attempt failed; any prior session is untouched
    EstablishFailed {
        role: ConnectionRole,
        reason: String,
    },
    /// One line arrived on a session
    MessageReceived { session: SessionId, text: String },
    /// A session's receive loop terminated
    SessionEnded {
        session: SessionId,
        role: ConnectionRole,
    },
}

// ----------------------------------------------------------------------------
// Event Channel
// ----------------------------------------------------------------------------

/// Producer side, cloned into every worker
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSink {
    /// Queue an event for the presentation layer
    pub fn emit(&self, event: LinkEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Presentation layer gone, dropping event: {:?}", e.0);
        }
    }
}

/// Consumer side, owned by the presentation layer
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once every sink is gone
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sink/stream pair
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}
