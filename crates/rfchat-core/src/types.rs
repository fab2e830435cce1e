//! Data model shared between the radio, the runtime and the presentation layer

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Peers
// ----------------------------------------------------------------------------

/// A remote device reported by discovery
///
/// Identity is the address alone: two reports with different display names
/// but the same address describe the same peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDevice {
    /// Opaque, stable radio address
    pub address: String,
    /// Human-readable name, when the radio knows one
    pub display_name: Option<String>,
}

impl PeerDevice {
    pub fn new(address: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            address: address.into(),
            display_name,
        }
    }

    /// Name to show for this peer, falling back to its address
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for PeerDevice {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerDevice {}

impl Hash for PeerDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} - {}", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Raw discovery event emitted by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFound {
    pub address: String,
    pub display_name: Option<String>,
}

impl PeerFound {
    pub fn new(address: impl Into<String>, display_name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.map(str::to_string),
        }
    }
}

impl From<PeerFound> for PeerDevice {
    fn from(found: PeerFound) -> Self {
        PeerDevice::new(found.address, found.display_name)
    }
}

// ----------------------------------------------------------------------------
// Sessions
// ----------------------------------------------------------------------------

/// Which establishment path produced a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionRole {
    Server,
    Client,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Server => write!(f, "server"),
            ConnectionRole::Client => write!(f, "client"),
        }
    }
}

/// Process-unique session number, increasing with every establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_peer_equality_is_by_address() {
        let a = PeerDevice::new("00:11:22:33:44:55", Some("Pixel".into()));
        let b = PeerDevice::new("00:11:22:33:44:55", None);
        let c = PeerDevice::new("66:77:88:99:AA:BB", Some("Pixel".into()));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_label_falls_back_to_address() {
        let named = PeerDevice::new("AA", Some("Phone".into()));
        let anonymous = PeerDevice::new("BB", None);
        assert_eq!(named.label(), "Phone");
        assert_eq!(anonymous.label(), "BB");
        assert_eq!(named.to_string(), "Phone - AA");
    }
}
