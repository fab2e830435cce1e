//! Error handling for the rfchat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Link error: {0}")]
    Link(#[from] rfchat_core::LinkError),

    #[error("Radio error: {0}")]
    Radio(#[from] rfchat_core::RadioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
