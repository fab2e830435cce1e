//! Line-oriented terminal presentation layer
//!
//! Owns the link's event stream and is therefore the only place that reacts
//! to link notifications. Input lines are either `/commands` or chat text.

use std::sync::Arc;

use rfchat_core::{ConnectionRole, PeerDevice};
use rfchat_runtime::{ChatLink, EventStream, LinkEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::{CliError, Result};

pub const HELP: &str = "\
Commands:
  /scan              scan for peers
  /stop              stop scanning
  /peers             list peers found by the last scan
  /serve             wait for one peer to connect
  /connect <n|addr>  connect to peer number n or an address
  /close             close the active session
  /help              show this help
  /quit              leave
Anything else is sent as a message.";

// ----------------------------------------------------------------------------
// User Commands
// ----------------------------------------------------------------------------

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Scan,
    StopScan,
    Peers,
    Serve,
    Connect(String),
    Close,
    Help,
    Quit,
    Say(String),
    /// Blank input; nothing is sent
    Nothing,
}

impl UserCommand {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() {
            return Ok(UserCommand::Nothing);
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(UserCommand::Say(line.to_string()));
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let argument = parts.next();
        match (name, argument) {
            ("scan", None) => Ok(UserCommand::Scan),
            ("stop", None) => Ok(UserCommand::StopScan),
            ("peers", None) => Ok(UserCommand::Peers),
            ("serve", None) => Ok(UserCommand::Serve),
            ("connect", Some(target)) => Ok(UserCommand::Connect(target.to_string())),
            ("connect", None) => Err("usage: /connect <n|addr>".to_string()),
            ("close", None) => Ok(UserCommand::Close),
            ("help", None) => Ok(UserCommand::Help),
            ("quit", None) | ("exit", None) => Ok(UserCommand::Quit),
            _ => Err(format!("unknown command: /{}", command.trim())),
        }
    }
}

/// Resolve a `/connect` target against the discovered peers
///
/// A number picks from the list (1-based); anything else is taken as an
/// address, reusing the discovered name when the address is known.
pub fn resolve_peer(target: &str, peers: &[PeerDevice]) -> Result<PeerDevice> {
    if let Ok(index) = target.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| peers.get(i))
            .cloned()
            .ok_or_else(|| CliError::UnknownPeer(target.to_string()));
    }

    Ok(peers
        .iter()
        .find(|peer| peer.address == target)
        .cloned()
        .unwrap_or_else(|| PeerDevice::new(target, None)))
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

/// Text shown for a link event
///
/// `peers` is the current discovery list, used to number found peers the
/// way `/connect <n>` expects.
pub fn render_event(event: &LinkEvent, peers: &[PeerDevice]) -> String {
    match event {
        LinkEvent::ScanStarted => "Scanning for peers...".to_string(),
        LinkEvent::ScanStopped => "Scan stopped".to_string(),
        LinkEvent::PeerFound(peer) => match peers.iter().position(|p| p == peer) {
            Some(index) => format!("  [{}] {}", index + 1, peer),
            None => format!("  {}", peer),
        },
        LinkEvent::ServerWaiting => "Waiting for a peer to connect...".to_string(),
        LinkEvent::SessionEstablished { handle } => match handle.role() {
            ConnectionRole::Server => {
                format!("Connected with {} (server)", handle.remote_label())
            }
            ConnectionRole::Client => {
                format!("Connected to {} (client)", handle.remote_label())
            }
        },
        LinkEvent::EstablishFailed { role, reason } => {
            format!("Connection failed ({}): {}", role, reason)
        }
        LinkEvent::MessageReceived { text, .. } => format!("< {}", text),
        LinkEvent::SessionEnded { session, .. } => format!("Session {} ended", session),
    }
}

// ----------------------------------------------------------------------------
// Console
// ----------------------------------------------------------------------------

/// Interactive chat console over stdin/stdout
pub struct ChatConsole {
    link: Arc<ChatLink>,
    events: EventStream,
    prompt: String,
}

impl ChatConsole {
    pub fn new(link: Arc<ChatLink>, events: EventStream, prompt: String) -> Self {
        Self {
            link,
            events,
            prompt,
        }
    }

    /// Run until `/quit`, end of input or the link going away
    pub async fn run(mut self) -> Result<()> {
        println!("{}", HELP);
        self.show_prompt();

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    match UserCommand::parse(&line) {
                        Ok(UserCommand::Quit) => break,
                        Ok(command) => self.execute(command).await,
                        Err(usage) => println!("{}", usage),
                    }
                    self.show_prompt();
                }
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    println!("{}", render_event(&event, &self.link.peers()));
                }
            }
        }

        self.link.teardown().await;
        Ok(())
    }

    async fn execute(&self, command: UserCommand) {
        let result = match command {
            UserCommand::Scan => self.link.start_scan().await.map_err(CliError::from),
            UserCommand::StopScan => {
                self.link.stop_scan().await;
                Ok(())
            }
            UserCommand::Peers => {
                self.print_peers();
                Ok(())
            }
            UserCommand::Serve => self.link.start_serving().await.map_err(CliError::from),
            UserCommand::Connect(target) => self.connect(&target).await,
            UserCommand::Close => {
                if self.link.close_session().await.is_none() {
                    println!("No active session");
                }
                Ok(())
            }
            UserCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            UserCommand::Say(text) => self.say(&text).await,
            UserCommand::Quit | UserCommand::Nothing => Ok(()),
        };

        if let Err(e) = result {
            warn!("Command failed: {}", e);
            println!("Error: {}", e);
        }
    }

    async fn connect(&self, target: &str) -> Result<()> {
        let peer = resolve_peer(target, &self.link.peers())?;
        println!("Connecting to {}...", peer);
        self.link.connect_to(peer).await?;
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.link.send(text).await?;
        println!("> {}", text);
        Ok(())
    }

    fn print_peers(&self) {
        let peers = self.link.peers();
        if peers.is_empty() {
            println!("No peers found");
            return;
        }
        for (index, peer) in peers.iter().enumerate() {
            println!("  [{}] {}", index + 1, peer);
        }
    }

    fn show_prompt(&self) {
        use std::io::Write;
        print!("{}", self.prompt);
        let _ = std::io::stdout().flush();
    }
}
