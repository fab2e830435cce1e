//! rfchat CLI library
//!
//! The pieces behind the `rfchat` binary: argument parsing, configuration,
//! the TCP-emulated radio, the configured permission provider and the
//! terminal presentation layer.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod permissions;
pub mod radio;
pub mod terminal;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
