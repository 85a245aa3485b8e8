//! Node configuration.
//!
//! Values are layered: built-in defaults, then an optional config file
//! (format picked from its extension), then `HUDDLE__*` environment
//! variables such as `HUDDLE__SERVER__ADDR=0.0.0.0:8080`. Command-line
//! flags are applied on top by the binary.

use ::config::{Config, Environment, File};
use huddle_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::observability::LogFormat;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HUDDLE";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the Huddle node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Room relay settings.
    pub hub: HubConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Largest WebSocket message accepted from a client, in bytes.
    pub max_message_size: usize,
    /// How often idle rooms are swept when a retention TTL is configured.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_message_size: 64 * 1024,
            sweep_interval_secs: 30,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Shutdown behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long open sessions get to close before the process exits.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

impl NodeConfig {
    /// Load from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let built = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.outbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "hub.outbound_capacity must be at least 1".to_string(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "server.max_message_size must be at least 1".to_string(),
            ));
        }
        if self.hub.retention.needs_sweep() && self.server.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.sweep_interval_secs must be at least 1 when rooms are retained"
                    .to_string(),
            ));
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Shutdown grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }

    /// Idle room sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.server.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_hub::{OverflowPolicy, RoomRetention};
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.addr.port(), 8080);
        assert_eq!(config.grace_period(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = std::env::temp_dir().join(format!("huddle-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("huddle.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "server:\n  addr: \"0.0.0.0:9000\"\nhub:\n  outbound_capacity: 32\n  overflow: disconnect\n  retention:\n    mode: retain_for\n    ttl: 120\nlogging:\n  format: json"
        )
        .unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.server.addr.port(), 9000);
        assert_eq!(config.server.max_message_size, 64 * 1024);
        assert_eq!(config.hub.outbound_capacity, 32);
        assert_eq!(config.hub.overflow, OverflowPolicy::Disconnect);
        assert_eq!(
            config.hub.retention,
            RoomRetention::RetainFor {
                ttl: Duration::from_secs(120)
            }
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = Path::new("/nonexistent/huddle.yaml");
        assert!(matches!(
            NodeConfig::load(Some(path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = NodeConfig::default();
        config.hub.outbound_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config = NodeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_sweep_interval_with_ttl() {
        let mut config = NodeConfig::default();
        config.hub.retention = RoomRetention::RetainFor {
            ttl: Duration::from_secs(5),
        };
        config.server.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
