//! TCP-emulated radio
//!
//! Each peer is a socket address. A connect opens a TCP stream and sends the
//! 16-byte service identifier; the listening side answers with one status
//! byte and only hands the stream to the link when the identifier matches.
//! This mirrors the service-record rendezvous of a real radio, so a peer
//! offering a different service is refused.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rfchat_core::{BoxedStream, ListeningEndpoint, PeerFound, Radio, RadioError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PeerEntry, RadioConfig};

/// Reply sent when the requested service is offered
const SERVICE_ACCEPTED: u8 = 0x01;
/// Reply sent when the requested service is unknown
const SERVICE_REFUSED: u8 = 0x00;

// ----------------------------------------------------------------------------
// TCP Radio
// ----------------------------------------------------------------------------

pub struct TcpRadio {
    listen_addr: String,
    connect_timeout: Duration,
    peers: Vec<PeerEntry>,
    discovering: AtomicBool,
    discovery: broadcast::Sender<PeerFound>,
}

impl TcpRadio {
    pub fn new(config: &RadioConfig) -> Self {
        let (discovery, _) = broadcast::channel(64);
        Self {
            listen_addr: config.listen_addr.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            peers: config.peers.clone(),
            discovering: AtomicBool::new(false),
            discovery,
        }
    }

    /// Bind the listen address for `service`
    pub async fn bind(&self, service: Uuid) -> Result<Arc<TcpEndpoint>, RadioError> {
        let listener = TcpListener::bind(&self.listen_addr).await.map_err(|e| {
            RadioError::ListenUnavailable(format!("{}: {}", self.listen_addr, e))
        })?;
        let (closed, _) = watch::channel(false);
        info!("Listening on {}", self.listen_addr);
        Ok(Arc::new(TcpEndpoint {
            listener,
            service,
            handshake_timeout: self.connect_timeout,
            closed,
        }))
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Radio for TcpRadio {
    fn is_available(&self) -> bool {
        true
    }

    async fn start_discovery(&self) -> bool {
        self.discovering.store(true, Ordering::SeqCst);
        // Configured peers stand in for devices in range
        for peer in &self.peers {
            let _ = self
                .discovery
                .send(PeerFound::new(peer.address.as_str(), peer.name.as_deref()));
        }
        debug!("Announced {} configured peers", self.peers.len());
        true
    }

    async fn stop_discovery(&self) {
        self.discovering.store(false, Ordering::SeqCst);
    }

    fn subscribe_discovery(&self) -> broadcast::Receiver<PeerFound> {
        self.discovery.subscribe()
    }

    async fn listen(
        &self,
        service: Uuid,
        name: &str,
    ) -> Result<Arc<dyn ListeningEndpoint>, RadioError> {
        debug!("Registering service {} as {}", service, name);
        let endpoint = self.bind(service).await?;
        Ok(endpoint)
    }

    async fn connect(&self, address: &str, service: Uuid) -> Result<BoxedStream, RadioError> {
        let attempt = async {
            let mut stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;
            stream.write_all(service.as_bytes()).await?;
            stream.flush().await?;
            let reply = stream.read_u8().await?;
            Ok::<_, std::io::Error>((stream, reply))
        };

        let (stream, reply) = tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| RadioError::ConnectFailed(format!("{} timed out", address)))?
            .map_err(|e| RadioError::ConnectFailed(format!("{}: {}", address, e)))?;

        if reply != SERVICE_ACCEPTED {
            return Err(RadioError::ConnectFailed(format!(
                "{} does not offer the chat service",
                address
            )));
        }
        Ok(Box::new(stream))
    }
}

// ----------------------------------------------------------------------------
// Listening Endpoint
// ----------------------------------------------------------------------------

pub struct TcpEndpoint {
    listener: TcpListener,
    service: Uuid,
    /// Time a new connection gets to name its service
    handshake_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl TcpEndpoint {
    pub fn local_addr(&self) -> Result<SocketAddr, RadioError> {
        Ok(self.listener.local_addr()?)
    }

    /// Read the requested service and answer it; true when it matches ours
    async fn rendezvous(&self, stream: &mut TcpStream) -> std::io::Result<bool> {
        let mut requested = [0u8; 16];
        stream.read_exact(&mut requested).await?;
        let matches = Uuid::from_bytes(requested) == self.service;
        let reply = if matches {
            SERVICE_ACCEPTED
        } else {
            SERVICE_REFUSED
        };
        stream.write_all(&[reply]).await?;
        stream.flush().await?;
        Ok(matches)
    }
}

#[async_trait]
impl ListeningEndpoint for TcpEndpoint {
    async fn accept(&self) -> Result<Option<BoxedStream>, RadioError> {
        let mut closed = self.closed.subscribe();
        loop {
            let (mut stream, addr) = tokio::select! {
                _ = closed.wait_for(|closed| *closed) => {
                    return Err(RadioError::AcceptFailed("listener closed".into()));
                }
                accepted = self.listener.accept() => {
                    accepted.map_err(|e| RadioError::AcceptFailed(e.to_string()))?
                }
            };

            // A silent client must neither pin the endpoint nor outlive close()
            let handshake =
                tokio::time::timeout(self.handshake_timeout, self.rendezvous(&mut stream));
            let outcome = tokio::select! {
                _ = closed.wait_for(|closed| *closed) => None,
                outcome = handshake => Some(outcome),
            };

            match outcome {
                None => return Err(RadioError::AcceptFailed("listener closed".into())),
                Some(Ok(Ok(true))) => {
                    let _ = stream.set_nodelay(true);
                    info!("Accepted chat connection from {}", addr);
                    return Ok(Some(Box::new(stream)));
                }
                Some(Ok(Ok(false))) => warn!("Refused {}: different service requested", addr),
                Some(Ok(Err(e))) => warn!("Handshake with {} failed: {}", addr, e),
                Some(Err(_)) => warn!("Handshake with {} timed out", addr),
            }
        }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
