//! Command handlers for the rfchat CLI

use std::sync::Arc;
use std::time::Duration;

use rfchat_core::{PeerFound, PermissionProvider, Radio};
use rfchat_harness::MockRadio;
use rfchat_runtime::{ChatLink, EventStream, LinkEvent};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, PeerEntry, RadioBackend};
use crate::error::Result;
use crate::permissions::ConfigPermissions;
use crate::radio::TcpRadio;
use crate::terminal::ChatConsole;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Chat { listen, peer, mock } => {
                let config = apply_chat_overrides(config, listen, peer, mock);
                Self::handle_chat_command(config).await
            }
            Commands::Peers { duration_ms, mock } => {
                let mut config = config;
                if mock {
                    config.radio.backend = RadioBackend::Mock;
                }
                Self::handle_peers_command(config, Duration::from_millis(duration_ms)).await
            }
            Commands::ExampleConfig => {
                println!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Handle the chat command with the interactive console
    async fn handle_chat_command(config: AppConfig) -> Result<()> {
        info!(
            "Starting chat with the {:?} radio backend",
            config.radio.backend
        );
        let (link, events) = build_link(&config);
        let console = ChatConsole::new(Arc::new(link), events, config.cli.prompt.clone());
        console.run().await
    }

    /// Handle the peers command: one scan, then print what was found
    async fn handle_peers_command(config: AppConfig, duration: Duration) -> Result<()> {
        let (link, mut events) = build_link(&config);
        link.start_scan().await?;

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Some(LinkEvent::PeerFound(peer)) => info!("Found {}", peer),
                    Some(_) => {}
                    None => break,
                },
            }
        }

        link.stop_scan().await;
        let peers = link.peers();
        if peers.is_empty() {
            println!("No peers found");
        }
        for (index, peer) in peers.iter().enumerate() {
            println!("[{}] {}", index + 1, peer);
        }

        link.teardown().await;
        Ok(())
    }
}

/// Fold chat command flags into the loaded configuration
pub fn apply_chat_overrides(
    mut config: AppConfig,
    listen: Option<String>,
    peers: Vec<String>,
    mock: bool,
) -> AppConfig {
    if let Some(listen) = listen {
        config.radio.listen_addr = listen;
    }
    for address in peers {
        if config.radio.peers.iter().any(|p| p.address == address) {
            continue;
        }
        config.radio.peers.push(PeerEntry {
            address,
            name: None,
        });
    }
    if mock {
        config.radio.backend = RadioBackend::Mock;
    }
    config
}

/// Build the radio for the configured backend
pub fn build_radio(config: &AppConfig) -> Arc<dyn Radio> {
    match config.radio.backend {
        RadioBackend::Tcp => Arc::new(TcpRadio::new(&config.radio)),
        RadioBackend::Mock => {
            let radio = MockRadio::new();
            radio.echo_inbound(true);
            for entry in &config.radio.peers {
                radio.announce(PeerFound::new(entry.address.as_str(), entry.name.as_deref()));
                radio.register_peer(entry.address.as_str()).serve_echo();
            }
            if config.radio.peers.is_empty() {
                warn!("Mock radio has no peers configured; only /serve will connect");
            }
            Arc::new(radio)
        }
    }
}

/// Wire a link from configuration
pub fn build_link(config: &AppConfig) -> (ChatLink, EventStream) {
    let radio = build_radio(config);
    let permissions: Arc<dyn PermissionProvider> =
        Arc::new(ConfigPermissions::new(&config.permissions));
    ChatLink::new(radio, permissions, config.link.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_overrides() {
        let mut config = AppConfig::default();
        config.radio.peers.push(PeerEntry {
            address: "127.0.0.1:7002".to_string(),
            name: Some("Desk".to_string()),
        });

        let config = apply_chat_overrides(
            config,
            Some("127.0.0.1:9001".to_string()),
            vec!["127.0.0.1:7002".to_string(), "127.0.0.1:7003".to_string()],
            true,
        );

        assert_eq!(config.radio.listen_addr, "127.0.0.1:9001");
        assert_eq!(config.radio.backend, RadioBackend::Mock);
        assert_eq!(config.radio.peers.len(), 2);
        assert_eq!(config.radio.peers[0].name.as_deref(), Some("Desk"));
    }

    #[tokio::test]
    async fn test_mock_backend_chats_with_echo_peer() {
        let mut config = AppConfig::default();
        config.radio.backend = RadioBackend::Mock;
        config.radio.peers.push(PeerEntry {
            address: "echo".to_string(),
            name: Some("Echo".to_string()),
        });

        let (link, mut events) = build_link(&config);
        link.start_scan().await.unwrap();

        let mut found = None;
        while found.is_none() {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(LinkEvent::PeerFound(peer))) => found = Some(peer),
                Ok(Some(_)) => {}
                _ => panic!("no peer found"),
            }
        }

        link.connect_to(found.unwrap()).await.unwrap();
        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(LinkEvent::SessionEstablished { .. })) => break,
                Ok(Some(_)) => {}
                _ => panic!("session not established"),
            }
        }

        link.send("marco").await.unwrap();
        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(LinkEvent::MessageReceived { text, .. })) => {
                    assert_eq!(text, "marco");
                    break;
                }
                Ok(Some(_)) => {}
                _ => panic!("no echo received"),
            }
        }
        link.teardown().await;
    }
}
