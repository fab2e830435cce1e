//! Link configuration

use serde::{Deserialize, Serialize};

use crate::permission::Permission;
use crate::protocol::{DEFAULT_MAX_MESSAGE_LEN, DEFAULT_SERVICE_NAME};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for a chat link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Upper bound on concurrent background workers (accept, connect, receive loop)
    pub max_workers: usize,
    /// Maximum size of one message in bytes, terminator excluded, in either direction
    pub max_message_len: usize,
    /// Service record name registered with the listener
    pub service_name: String,
    /// Permissions checked before scanning
    pub required_for_scan: Vec<Permission>,
    /// Permissions checked before serving or connecting
    pub required_for_connect: Vec<Permission>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            required_for_scan: Permission::ALL.to_vec(),
            required_for_connect: vec![Permission::Connect],
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background worker bound
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set maximum message size
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Set service record name
    pub fn with_service_name(mut self, name: String) -> Self {
        self.service_name = name;
        self
    }

    /// Set permissions required before scanning
    pub fn with_required_for_scan(mut self, required: Vec<Permission>) -> Self {
        self.required_for_scan = required;
        self
    }

    /// Set permissions required before serving or connecting
    pub fn with_required_for_connect(mut self, required: Vec<Permission>) -> Self {
        self.required_for_connect = required;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.service_name, "BluetoothChat");
        assert_eq!(config.required_for_scan.len(), 3);
        assert_eq!(config.required_for_connect, vec![Permission::Connect]);
    }

    #[test]
    fn test_builder() {
        let config = LinkConfig::new()
            .with_max_workers(2)
            .with_max_message_len(16)
            .with_service_name("Chat".to_string());
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.max_message_len, 16);
        assert_eq!(config.service_name, "Chat");
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{"max_workers": 8}"#).unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_message_len, DEFAULT_MAX_MESSAGE_LEN);
    }
}
