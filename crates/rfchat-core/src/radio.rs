//! Contracts for the external radio stack and the platform permission surface
//!
//! The runtime never talks to hardware directly. It drives an implementation
//! of [`Radio`] (discovery, listen, connect) and asks a [`PermissionProvider`]
//! before touching it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::RadioError;
use crate::permission::{Permission, PermissionState};
use crate::types::PeerFound;

// ----------------------------------------------------------------------------
// Byte Streams
// ----------------------------------------------------------------------------

/// Reliable, ordered, bidirectional byte stream bound to a service
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned stream handed out by accept and connect
pub type BoxedStream = Box<dyn DuplexStream>;

// ----------------------------------------------------------------------------
// Radio Capability
// ----------------------------------------------------------------------------

/// Listening endpoint opened for one service identifier
#[async_trait]
pub trait ListeningEndpoint: Send + Sync {
    /// Wait for the next inbound connection
    ///
    /// `Ok(None)` means the radio returned without a connection and without
    /// an error. A pending accept returns once [`close`](Self::close) is called.
    async fn accept(&self) -> Result<Option<BoxedStream>, RadioError>;

    /// Stop listening; idempotent
    fn close(&self);
}

/// Short-range radio driven by the link
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Whether an adapter is present and enabled
    fn is_available(&self) -> bool;

    /// Begin discovery; `false` when the radio rejects the request
    async fn start_discovery(&self) -> bool;

    /// Cancel discovery; harmless when not discovering
    async fn stop_discovery(&self);

    /// Subscribe to discovery reports
    ///
    /// Only reports emitted after subscribing are delivered.
    fn subscribe_discovery(&self) -> broadcast::Receiver<PeerFound>;

    /// Open a listening endpoint registered under `service` and `name`
    async fn listen(
        &self,
        service: Uuid,
        name: &str,
    ) -> Result<Arc<dyn ListeningEndpoint>, RadioError>;

    /// Connect to `address` on `service`, blocking until the handshake settles
    async fn connect(&self, address: &str, service: Uuid) -> Result<BoxedStream, RadioError>;
}

// ----------------------------------------------------------------------------
// Permissions
// ----------------------------------------------------------------------------

/// Platform permission surface
#[async_trait]
pub trait PermissionProvider: Send + Sync + 'static {
    /// Whether `permission` is currently granted
    fn check(&self, permission: Permission) -> bool;

    /// Ask for every listed permission in one platform round-trip
    ///
    /// The returned state carries the individual answers.
    async fn request_batch(&self, permissions: &[Permission]) -> PermissionState;
}
