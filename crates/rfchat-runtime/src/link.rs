//! The chat link facade driven by the presentation layer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rfchat_core::{
    LinkConfig, LinkError, LinkResult, PeerDevice, PermissionProvider, Radio, SessionId,
};
use tracing::{info, warn};

use crate::discovery::DiscoveryController;
use crate::establish::ConnectionEstablisher;
use crate::events::{event_channel, EventSink, EventStream};
use crate::permission::PermissionGate;
use crate::session::{ActiveSessionSlot, SessionHandle};
use crate::workers::WorkerSet;

// ----------------------------------------------------------------------------
// Chat Link
// ----------------------------------------------------------------------------

/// Wires discovery, establishment, sessions and permissions together
///
/// Commands are gated by the permissions configured in [`LinkConfig`]; their
/// asynchronous outcomes arrive on the [`EventStream`] returned by
/// [`ChatLink::new`].
pub struct ChatLink {
    config: LinkConfig,
    gate: Arc<PermissionGate>,
    discovery: Arc<DiscoveryController>,
    establisher: Arc<ConnectionEstablisher>,
    slot: Arc<ActiveSessionSlot>,
    workers: Arc<WorkerSet>,
    torn_down: AtomicBool,
}

impl ChatLink {
    /// Create a link and the event stream the presentation layer consumes
    pub fn new(
        radio: Arc<dyn Radio>,
        permissions: Arc<dyn PermissionProvider>,
        config: LinkConfig,
    ) -> (Self, EventStream) {
        let (sink, events) = event_channel();
        (Self::with_sink(radio, permissions, config, sink), events)
    }

    fn with_sink(
        radio: Arc<dyn Radio>,
        permissions: Arc<dyn PermissionProvider>,
        config: LinkConfig,
        sink: EventSink,
    ) -> Self {
        let workers = Arc::new(WorkerSet::new(config.max_workers));
        let slot = Arc::new(ActiveSessionSlot::new());
        let discovery = Arc::new(DiscoveryController::new(
            radio.clone(),
            permissions.clone(),
            sink.clone(),
        ));
        let establisher = Arc::new(ConnectionEstablisher::new(
            radio,
            discovery.clone(),
            slot.clone(),
            workers.clone(),
            sink,
            config.clone(),
        ));

        Self {
            gate: Arc::new(PermissionGate::new(permissions)),
            config,
            discovery,
            establisher,
            slot,
            workers,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Ensure scan permissions, then start a fresh scan
    pub async fn start_scan(&self) -> LinkResult<()> {
        self.ensure_open()?;
        if !self.gate.ensure_granted(&self.config.required_for_scan).await {
            return Err(LinkError::PermissionDenied);
        }
        self.discovery.start_scan().await?;
        Ok(())
    }

    /// Stop scanning and unregister from discovery reports
    pub async fn stop_scan(&self) {
        self.discovery.stop_scan().await;
    }

    /// Ensure connect permissions, then wait for one inbound peer
    pub async fn start_serving(&self) -> LinkResult<()> {
        self.ensure_open()?;
        if !self
            .gate
            .ensure_granted(&self.config.required_for_connect)
            .await
        {
            return Err(LinkError::PermissionDenied);
        }
        self.establisher.start_serving().await;
        Ok(())
    }

    /// Ensure connect permissions, then connect to `peer` in the background
    pub async fn connect_to(&self, peer: PeerDevice) -> LinkResult<()> {
        self.ensure_open()?;
        if !self
            .gate
            .ensure_granted(&self.config.required_for_connect)
            .await
        {
            return Err(LinkError::PermissionDenied);
        }
        self.establisher.connect_to(peer);
        Ok(())
    }

    /// Send one message on the active session
    pub async fn send(&self, text: &str) -> LinkResult<()> {
        let session = self
            .slot
            .current()
            .await
            .ok_or(LinkError::NoActiveSession)?;
        session.send(text).await?;
        Ok(())
    }

    /// Close the active session, if any
    pub async fn close_session(&self) -> Option<SessionId> {
        self.slot.close_active().await.map(|session| session.id())
    }

    pub async fn active_session(&self) -> Option<SessionHandle> {
        self.slot.current().await
    }

    /// Peers found by the current scan, in discovery order
    pub fn peers(&self) -> Vec<PeerDevice> {
        self.discovery.peers()
    }

    pub fn is_scanning(&self) -> bool {
        self.discovery.is_scanning()
    }

    pub fn is_serving(&self) -> bool {
        self.establisher.is_serving()
    }

    pub fn permissions(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Release every radio resource held by the link
    ///
    /// Stops the scan, closes a pending listener and the active session,
    /// aborts all workers and drops the discovery subscription. Each step
    /// runs regardless of the others; later calls are no-ops.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Tearing down chat link");

        self.discovery.cancel_discovery().await;
        // Retiring first keeps a connect or accept finishing now from installing a session
        if let Some(session) = self.slot.retire().await {
            // Closing wakes the receive loop; let it report the end before aborting workers
            session.wait_ended().await;
            info!("Closed session {} during teardown", session.id());
        }
        self.workers.shutdown();
        self.establisher.cancel_pending();
        self.discovery.unregister();
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> LinkResult<()> {
        if self.is_torn_down() {
            warn!("Command refused: link torn down");
            return Err(rfchat_core::EstablishError::ShuttingDown.into());
        }
        Ok(())
    }
}

impl Drop for ChatLink {
    fn drop(&mut self) {
        if !self.is_torn_down() {
            self.establisher.cancel_pending();
            self.workers.shutdown();
            self.discovery.unregister();
        }
    }
}
