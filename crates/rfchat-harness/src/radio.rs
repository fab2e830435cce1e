//! Scriptable in-memory radio

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rfchat_core::{BoxedStream, ListeningEndpoint, PeerFound, Radio, RadioError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Buffer size of each in-memory pipe direction
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Radio operation recorded by [`MockRadio`], in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartDiscovery,
    StopDiscovery,
    Listen { service: Uuid, name: String },
    Connect { address: String, service: Uuid },
}

enum PeerBehavior {
    Reachable(mpsc::UnboundedSender<DuplexStream>),
    Unreachable(String),
}

struct RadioState {
    available: bool,
    reject_discovery: bool,
    listen_failure: Option<String>,
    discovering: bool,
    echo_inbound: bool,
    connect_delay: Option<Duration>,
    announced: Vec<PeerFound>,
    peers: HashMap<String, PeerBehavior>,
    listeners: Vec<Arc<MockListener>>,
    calls: Vec<RadioCall>,
}

/// In-memory [`Radio`] whose behavior tests script up front
pub struct MockRadio {
    state: Mutex<RadioState>,
    discovery: broadcast::Sender<PeerFound>,
}

impl MockRadio {
    pub fn new() -> Self {
        let (discovery, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(RadioState {
                available: true,
                reject_discovery: false,
                listen_failure: None,
                discovering: false,
                echo_inbound: false,
                connect_delay: None,
                announced: Vec::new(),
                peers: HashMap::new(),
                listeners: Vec::new(),
                calls: Vec::new(),
            }),
            discovery,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Make `start_discovery` report failure
    pub fn reject_discovery_start(&self, reject: bool) {
        self.lock().reject_discovery = reject;
    }

    /// Make every `listen` fail with `reason`
    pub fn fail_listen(&self, reason: impl Into<String>) {
        self.lock().listen_failure = Some(reason.into());
    }

    /// Hold every `connect` for `delay` before it settles
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Dial every new listener from an echoing remote peer
    pub fn echo_inbound(&self, enabled: bool) {
        self.lock().echo_inbound = enabled;
    }

    /// Report `found` each time discovery starts successfully
    pub fn announce(&self, found: PeerFound) {
        self.lock().announced.push(found);
    }

    /// Deliver one discovery report to current subscribers
    pub fn emit_peer(&self, found: PeerFound) {
        // No subscribers is fine: reports outside a scan are lost
        let _ = self.discovery.send(found);
    }

    /// Make `address` accept connections; the remote ends arrive on the returned peer
    pub fn register_peer(&self, address: impl Into<String>) -> MockPeer {
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .peers
            .insert(address.clone(), PeerBehavior::Reachable(tx));
        MockPeer {
            address,
            connections: rx,
        }
    }

    /// Make connects to `address` fail with `reason`
    pub fn set_unreachable(&self, address: impl Into<String>, reason: impl Into<String>) {
        self.lock()
            .peers
            .insert(address.into(), PeerBehavior::Unreachable(reason.into()));
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.lock().calls.clone()
    }

    pub fn is_discovering(&self) -> bool {
        self.lock().discovering
    }

    /// Every listener opened so far, oldest first
    pub fn listeners(&self) -> Vec<Arc<MockListener>> {
        self.lock().listeners.clone()
    }

    pub fn last_listener(&self) -> Option<Arc<MockListener>> {
        self.lock().listeners.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn is_available(&self) -> bool {
        self.lock().available
    }

    async fn start_discovery(&self) -> bool {
        let announced = {
            let mut state = self.lock();
            state.calls.push(RadioCall::StartDiscovery);
            if state.reject_discovery {
                return false;
            }
            state.discovering = true;
            state.announced.clone()
        };

        for found in announced {
            self.emit_peer(found);
        }
        true
    }

    async fn stop_discovery(&self) {
        let mut state = self.lock();
        state.calls.push(RadioCall::StopDiscovery);
        state.discovering = false;
    }

    fn subscribe_discovery(&self) -> broadcast::Receiver<PeerFound> {
        self.discovery.subscribe()
    }

    async fn listen(
        &self,
        service: Uuid,
        name: &str,
    ) -> Result<Arc<dyn ListeningEndpoint>, RadioError> {
        let mut state = self.lock();
        state.calls.push(RadioCall::Listen {
            service,
            name: name.to_string(),
        });
        if let Some(reason) = &state.listen_failure {
            return Err(RadioError::ListenUnavailable(reason.clone()));
        }

        let listener = Arc::new(MockListener::new(service, name));
        if state.echo_inbound {
            if let Some(remote) = listener.inject_connection() {
                spawn_echo(remote);
            }
        }
        state.listeners.push(listener.clone());
        debug!("Mock radio listening on {} as {}", service, name);
        Ok(listener)
    }

    async fn connect(&self, address: &str, service: Uuid) -> Result<BoxedStream, RadioError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(RadioCall::Connect {
                address: address.to_string(),
                service,
            });
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        match state.peers.get(address) {
            Some(PeerBehavior::Reachable(connections)) => {
                let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
                connections
                    .send(remote)
                    .map_err(|_| RadioError::ConnectFailed("peer went away".into()))?;
                Ok(Box::new(local))
            }
            Some(PeerBehavior::Unreachable(reason)) => {
                Err(RadioError::ConnectFailed(reason.clone()))
            }
            None => Err(RadioError::ConnectFailed(format!("no such peer {}", address))),
        }
    }
}

// ----------------------------------------------------------------------------
// Remote Peer
// ----------------------------------------------------------------------------

/// Remote side of a peer registered with [`MockRadio::register_peer`]
pub struct MockPeer {
    address: String,
    connections: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MockPeer {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the next client connection to this peer
    pub async fn next_connection(&mut self) -> Option<DuplexStream> {
        self.connections.recv().await
    }

    /// Echo every line on every connection this peer receives
    pub fn serve_echo(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(stream) = self.connections.recv().await {
                spawn_echo(stream);
            }
        })
    }
}

/// Write every line received on `stream` straight back
pub fn spawn_echo(stream: DuplexStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = format!("{}\n", line);
            if writer.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

enum Incoming {
    Stream(DuplexStream),
    Empty,
    Fail(String),
}

/// Listening endpoint handed out by [`MockRadio::listen`]
pub struct MockListener {
    service: Uuid,
    name: String,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    closed: watch::Sender<bool>,
    accepted: AtomicUsize,
}

impl MockListener {
    fn new(service: Uuid, name: &str) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            service,
            name: name.to_string(),
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            closed,
            accepted: AtomicUsize::new(0),
        }
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an inbound connection and return its remote end
    ///
    /// Returns `None` once the listener is closed.
    pub fn inject_connection(&self) -> Option<DuplexStream> {
        if self.is_closed() {
            return None;
        }
        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        self.incoming_tx.send(Incoming::Stream(local)).ok()?;
        Some(remote)
    }

    /// Make the next accept return without a connection or an error
    pub fn inject_empty(&self) {
        let _ = self.incoming_tx.send(Incoming::Empty);
    }

    /// Make the next accept fail with `reason`
    pub fn fail_next_accept(&self, reason: impl Into<String>) {
        let _ = self.incoming_tx.send(Incoming::Fail(reason.into()));
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Connections handed out by accept so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListeningEndpoint for MockListener {
    async fn accept(&self) -> Result<Option<BoxedStream>, RadioError> {
        let mut closed = self.closed.subscribe();
        let mut incoming = self.incoming_rx.lock().await;

        let next = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => None,
            next = incoming.recv() => next,
        };

        match next {
            Some(Incoming::Stream(stream)) if !self.is_closed() => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Box::new(stream)))
            }
            Some(Incoming::Empty) => Ok(None),
            Some(Incoming::Fail(reason)) => Err(RadioError::AcceptFailed(reason)),
            _ => Err(RadioError::AcceptFailed("listener closed".into())),
        }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
