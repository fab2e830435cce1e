//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive chat mode
    Chat {
        /// Address to accept inbound peers on (tcp backend)
        #[arg(short, long)]
        listen: Option<String>,
        /// Known peer address; repeat for several
        #[arg(short, long)]
        peer: Vec<String>,
        /// Use the in-memory radio with echoing peers
        #[arg(long)]
        mock: bool,
    },
    /// Scan once and list discovered peers
    Peers {
        /// How long to scan, in milliseconds
        #[arg(short, long, default_value_t = 1500)]
        duration_ms: u64,
        /// Use the in-memory radio
        #[arg(long)]
        mock: bool,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_arguments() {
        let cli = Cli::parse_from([
            "rfchat",
            "-v",
            "chat",
            "--listen",
            "127.0.0.1:7001",
            "--peer",
            "127.0.0.1:7002",
            "--peer",
            "127.0.0.1:7003",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { listen, peer, mock } => {
                assert_eq!(listen.as_deref(), Some("127.0.0.1:7001"));
                assert_eq!(peer.len(), 2);
                assert!(!mock);
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_peers_defaults() {
        let cli = Cli::parse_from(["rfchat", "peers"]);
        assert!(matches!(
            cli.command,
            Commands::Peers {
                duration_ms: 1500,
                mock: false
            }
        ));
    }
}
