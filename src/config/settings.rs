//! Typed settings, one struct per JSON config section.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level shape of the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// JSON schema reference, accepted and ignored.
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Free-form comment field, accepted and ignored.
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Bridge connection settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Tool registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks settings that parse fine but cannot work at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "bridge.timeout_secs must be at least 1".to_string(),
            });
        }
        if self.registry.port == 0 {
            return Err(ConfigError::Invalid {
                message: "registry.port must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the relay connection to the bridge server.
///
/// The bridge's listen port is fixed (the embedded host pins it); only the
/// client-side policy is configurable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Request timeout in seconds for every relay call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum idle keep-alive connections held against the bridge.
    #[serde(default = "default_max_idle")]
    pub max_idle_connections: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_idle_connections: default_max_idle(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_idle() -> usize {
    5
}

/// Settings for the tool registry's external-facing HTTP surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Host address the registry binds to.
    #[serde(default = "default_registry_host")]
    pub host: String,

    /// Port the registry binds to.
    #[serde(default = "default_registry_port")]
    pub port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: default_registry_host(),
            port: default_registry_port(),
        }
    }
}

fn default_registry_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_registry_port() -> u16 {
    8000
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level when no `-v`/`-q` flag is given (trace, debug, info, warn,
    /// error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.timeout_secs, 30);
        assert_eq!(config.registry.port, 8000);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "bridge": {
                "timeout_secs": 10,
                "max_idle_connections": 2
            },
            "registry": {
                "host": "127.0.0.1",
                "port": 8765
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.timeout_secs, 10);
        assert_eq!(config.bridge.max_idle_connections, 2);
        assert_eq!(config.registry.host, "127.0.0.1");
        assert_eq!(config.registry.port, 8765);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.bridge.timeout_secs, 30);
        assert_eq!(config.bridge.max_idle_connections, 5);
        assert_eq!(config.registry.host, "127.0.0.1");
        assert_eq!(config.registry.port, 8000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn reject_zero_timeout() {
        let json = r#"{ "bridge": { "timeout_secs": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_registry_port() {
        let json = r#"{ "registry": { "port": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{ "unknown_field": "value" }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
