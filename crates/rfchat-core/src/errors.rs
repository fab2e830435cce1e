//! Error types for the rfchat link
//!
//! Every variant renders as a short, human-readable reason. Those strings are
//! forwarded verbatim to the presentation layer, which only displays them.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Radio Errors
// ----------------------------------------------------------------------------

/// Failures reported by the radio capability
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("radio unavailable")]
    Unavailable,

    #[error("listen unavailable: {0}")]
    ListenUnavailable(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("accept failed: {0}")]
    AcceptFailed(String),

    #[error("radio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Discovery Errors
// ----------------------------------------------------------------------------

/// Reasons a scan could not be started, in the order they are checked
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("radio disabled")]
    RadioDisabled,

    #[error("permission missing")]
    PermissionMissing,

    #[error("start failed")]
    StartFailed,
}

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Errors raised by an established chat session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("write after close")]
    WriteAfterClose,

    #[error("message contains a line terminator")]
    EmbeddedNewline,

    #[error("message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("incoming line longer than {max_size} bytes")]
    LineTooLong { max_size: usize },

    #[error("session I/O error: {0}")]
    Io(String),
}

// ----------------------------------------------------------------------------
// Establishment Errors
// ----------------------------------------------------------------------------

/// Failures of either connection establishment path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstablishError {
    #[error("permissions denied")]
    PermissionDenied,

    #[error("listen unavailable")]
    ListenUnavailable,

    #[error("accept failed: {0}")]
    AcceptFailed(String),

    #[error("accept returned no connection")]
    NoSocket,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("too many background workers (max: {max})")]
    WorkersExhausted { max: usize },

    #[error("link is shutting down")]
    ShuttingDown,
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error returned by the link facade
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Establish(#[from] EstablishError),

    #[error("permissions denied")]
    PermissionDenied,

    #[error("no active session")]
    NoActiveSession,
}

/// Result type for link operations
pub type LinkResult<T> = std::result::Result<T, LinkError>;
