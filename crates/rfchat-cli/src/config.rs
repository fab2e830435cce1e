//! rfchat CLI Configuration Management
//!
//! Configuration is layered with figment, highest priority first:
//! - Environment variables (`RFCHAT_<SECTION>__<KEY>`, e.g. `RFCHAT_RADIO__BACKEND=mock`)
//! - Configuration file (`--config <file>`, otherwise `rfchat.toml` if present)
//! - Default values
//!
//! Command line flags are applied on top by the command handlers.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use rfchat_core::{LinkConfig, Permission};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "rfchat.toml";

/// Prefix of environment overrides; `__` separates section and key
pub const ENV_PREFIX: &str = "RFCHAT_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the rfchat CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Terminal behaviour
    pub cli: CliConfig,

    /// Link tuning
    pub link: LinkConfig,

    /// Radio backend selection
    pub radio: RadioConfig,

    /// Permission provider behaviour
    pub permissions: PermissionConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,

    /// Prompt printed before each input line
    pub prompt: String,
}

/// Which radio drives the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioBackend {
    /// Peers are TCP endpoints; rendezvous on the service identifier
    Tcp,
    /// In-memory radio whose peers echo every message
    Mock,
}

/// A peer the radio reports during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Radio backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub backend: RadioBackend,

    /// Socket address the tcp backend listens on when serving
    pub listen_addr: String,

    /// Connect timeout for the tcp backend, in milliseconds
    pub connect_timeout_ms: u64,

    /// Peers reported by discovery
    pub peers: Vec<PeerEntry>,
}

/// Permission provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Permissions held at startup
    pub granted: Vec<Permission>,

    /// Whether a permission request grants what it asks for
    pub grant_on_request: bool,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            prompt: "rfchat> ".to_string(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            backend: RadioBackend::Tcp,
            listen_addr: "127.0.0.1:7001".to_string(),
            connect_timeout_ms: 5000,
            peers: Vec::new(),
        }
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            granted: Vec::new(),
            grant_on_request: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order:
    /// 1. Environment variables
    /// 2. Configuration file (rfchat.toml)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Self::defaults()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Self::env());

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, still honoring the environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        // figment treats a missing file as empty; an explicit path must exist
        if !path.is_file() {
            return Err(ConfigError::FileSystem(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let figment = Self::defaults()
            .merge(Toml::file(path))
            .merge(Self::env());

        let config: AppConfig = figment.extract().map_err(|e| {
            ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text over the defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::defaults()
            .merge(Toml::string(text))
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))
    }

    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(Self::default()))
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.max_workers < 2 {
            // One receive loop plus one accept or connect must fit
            return Err(ConfigError::Validation(
                "link.max_workers must be at least 2".to_string(),
            ));
        }
        if self.link.max_message_len == 0 {
            return Err(ConfigError::Validation(
                "link.max_message_len must be greater than 0".to_string(),
            ));
        }
        if self.link.service_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "link.service_name must not be empty".to_string(),
            ));
        }
        if self.radio.backend == RadioBackend::Tcp {
            self.radio
                .listen_addr
                .parse::<std::net::SocketAddr>()
                .map_err(|_| {
                    ConfigError::Validation(format!(
                        "Invalid radio.listen_addr: {}",
                        self.radio.listen_addr
                    ))
                })?;
        }
        if self.radio.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "radio.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        for peer in &self.radio.peers {
            if peer.address.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "radio.peers entries need an address".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            radio: RadioConfig {
                peers: vec![
                    PeerEntry {
                        address: "127.0.0.1:7002".to_string(),
                        name: Some("Desk".to_string()),
                    },
                    PeerEntry {
                        address: "127.0.0.1:7003".to_string(),
                        name: None,
                    },
                ],
                ..Default::default()
            },
            permissions: PermissionConfig {
                granted: vec![Permission::Connect],
                grant_on_request: true,
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert!(!config.cli.verbose);
        assert_eq!(config.cli.prompt, "rfchat> ");
        assert_eq!(config.radio.backend, RadioBackend::Tcp);
        assert_eq!(config.link.service_name, "BluetoothChat");
        assert!(config.permissions.grant_on_request);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();

        let mut invalid_config = config.clone();
        invalid_config.radio.listen_addr = "not an address".to_string();
        assert!(invalid_config.validate().is_err());

        // The mock backend never binds, so the address is not checked
        invalid_config.radio.backend = RadioBackend::Mock;
        assert!(invalid_config.validate().is_ok());

        let mut invalid_config = config.clone();
        invalid_config.link.max_workers = 1;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.radio.peers.push(PeerEntry {
            address: " ".to_string(),
            name: None,
        });
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [radio]
            backend = "mock"

            [[radio.peers]]
            address = "AA:BB"
            name = "Phone"

            [permissions]
            granted = ["scan", "connect"]
            "#,
        )
        .unwrap();

        assert_eq!(config.radio.backend, RadioBackend::Mock);
        assert_eq!(config.radio.listen_addr, "127.0.0.1:7001");
        assert_eq!(config.radio.peers[0].name.as_deref(), Some("Phone"));
        assert_eq!(
            config.permissions.granted,
            vec![Permission::Scan, Permission::Connect]
        );
        assert_eq!(config.link, LinkConfig::default());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(AppConfig::from_toml_str("[radio]\nbackend = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [cli]
                prompt = "$ "

                [radio]
                listen_addr = "127.0.0.1:7100"
                "#,
            )?;
            jail.set_env("RFCHAT_CLI__VERBOSE", "true");
            jail.set_env("RFCHAT_RADIO__LISTEN_ADDR", "0.0.0.0:9000");
            jail.set_env("RFCHAT_RADIO__BACKEND", "mock");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert!(config.cli.verbose);
            assert_eq!(config.cli.prompt, "$ ");
            assert_eq!(config.radio.listen_addr, "0.0.0.0:9000");
            assert_eq!(config.radio.backend, RadioBackend::Mock);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("RFCHAT_CLI__VERBOSE", "maybe");

            let err = AppConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::Loading(_)));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileSystem(_)));
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[cli]"));
        assert!(example.contains("[link]"));
        assert!(example.contains("[radio]"));
        assert!(example.contains("[permissions]"));

        let parsed = AppConfig::from_toml_str(&example).unwrap();
        assert_eq!(parsed.radio.peers.len(), 2);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rfchat.toml");
        let mut config = AppConfig::default();
        config.cli.prompt = "> ".to_string();
        config.radio.peers.push(PeerEntry {
            address: "127.0.0.1:7002".to_string(),
            name: Some("Desk".to_string()),
        });
        config.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
