//! Peer discovery and the deduplicated peer registry

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rfchat_core::{DiscoveryError, PeerDevice, PeerFound, Permission, PermissionProvider, Radio};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventSink, LinkEvent};

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// Peers seen during the current scan, in discovery order
#[derive(Debug, Default)]
struct PeerRegistry {
    peers: Vec<PeerDevice>,
    addresses: HashSet<String>,
    /// Bumped on every new scan and on unregister; stale listeners compare it
    generation: u64,
    accepting: bool,
}

impl PeerRegistry {
    fn reset(&mut self) -> u64 {
        self.peers.clear();
        self.addresses.clear();
        self.generation += 1;
        self.accepting = true;
        self.generation
    }
}

/// Check-and-insert plus notification as one step under the registry lock
///
/// Notifications are emitted while the lock is held, so the presentation
/// layer sees them in exactly the registry's insertion order.
fn record_peer(
    registry: &Mutex<PeerRegistry>,
    sink: &EventSink,
    generation: Option<u64>,
    found: PeerFound,
) -> bool {
    let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
    if !registry.accepting || generation.is_some_and(|g| g != registry.generation) {
        return false;
    }
    if !registry.addresses.insert(found.address.clone()) {
        return false;
    }

    let peer = PeerDevice::from(found);
    debug!("Discovered new peer: {}", peer);
    registry.peers.push(peer.clone());
    sink.emit(LinkEvent::PeerFound(peer));
    true
}

// ----------------------------------------------------------------------------
// Discovery Controller
// ----------------------------------------------------------------------------

/// Owns the scan lifecycle and the discovered peer set
pub struct DiscoveryController {
    radio: Arc<dyn Radio>,
    permissions: Arc<dyn PermissionProvider>,
    sink: EventSink,
    registry: Arc<Mutex<PeerRegistry>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    scanning: AtomicBool,
}

impl DiscoveryController {
    pub fn new(
        radio: Arc<dyn Radio>,
        permissions: Arc<dyn PermissionProvider>,
        sink: EventSink,
    ) -> Self {
        Self {
            radio,
            permissions,
            sink,
            registry: Arc::new(Mutex::new(PeerRegistry::default())),
            listener: Mutex::new(None),
            scanning: AtomicBool::new(false),
        }
    }

    /// Start a fresh scan
    ///
    /// Preconditions are checked in order: radio available, scan permission
    /// held, radio accepts the start request. Nothing is left registered when
    /// any of them fails.
    pub async fn start_scan(&self) -> Result<(), DiscoveryError> {
        if !self.radio.is_available() {
            warn!("Scan refused: radio disabled");
            return Err(DiscoveryError::RadioDisabled);
        }
        if !self.permissions.check(Permission::Scan) {
            warn!("Scan refused: scan permission missing");
            return Err(DiscoveryError::PermissionMissing);
        }

        self.unregister();
        let generation = self.lock_registry().reset();
        let events = self.radio.subscribe_discovery();
        self.register(generation, events);

        if !self.radio.start_discovery().await {
            warn!("Radio rejected discovery start");
            self.unregister();
            return Err(DiscoveryError::StartFailed);
        }

        self.scanning.store(true, Ordering::SeqCst);
        self.sink.emit(LinkEvent::ScanStarted);
        info!("Started scanning for peers");
        Ok(())
    }

    /// Feed one discovery report into the registry
    ///
    /// Returns true when the peer was new to the current scan. Reports are
    /// dropped while no scan is registered.
    pub fn handle_peer_found(&self, found: PeerFound) -> bool {
        record_peer(&self.registry, &self.sink, None, found)
    }

    /// Cancel radio discovery and unregister from discovery reports
    ///
    /// Safe to call at any time, including before any scan.
    pub async fn stop_scan(&self) {
        self.cancel_discovery().await;
        self.unregister();
    }

    /// Cancel radio discovery but keep the peer list and subscription
    ///
    /// Used before connecting: discovery and connect must not run together.
    pub async fn cancel_discovery(&self) {
        self.radio.stop_discovery().await;
        if self.scanning.swap(false, Ordering::SeqCst) {
            self.sink.emit(LinkEvent::ScanStopped);
            info!("Stopped scanning");
        }
    }

    /// Drop the discovery subscription; a no-op when not registered
    pub fn unregister(&self) {
        {
            let mut registry = self.lock_registry();
            registry.accepting = false;
            registry.generation += 1;
        }

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = listener {
            handle.abort();
            debug!("Unregistered from discovery reports");
        }
    }

    /// Snapshot of the peers found by the current scan
    pub fn peers(&self) -> Vec<PeerDevice> {
        self.lock_registry().peers.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    fn register(&self, generation: u64, mut events: broadcast::Receiver<PeerFound>) {
        let registry = self.registry.clone();
        let sink = self.sink.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(found) => {
                        record_peer(&registry, &sink, Some(generation), found);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Discovery listener lagged, {} reports missed", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Discovery report stream closed");
                        break;
                    }
                }
            }
        });

        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, PeerRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DiscoveryController {
    fn drop(&mut self) {
        self.unregister();
    }
}
