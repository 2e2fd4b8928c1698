//! Configuration loading.
//!
//! The config file is looked up at the path given on the command line, or at
//! the platform default when none is given:
//!
//! - **Linux/macOS:** `~/.cad-bridge-mcp/config.json`
//! - **Windows:** `%USERPROFILE%\.cad-bridge-mcp\config.json`
//!
//! Every setting has a default, so a missing default-location file is not an
//! error: the built-in defaults are used. An explicitly passed path that does
//! not exist is an error. `config/example-config.json` in the repository
//! shows every setting.

mod settings;

pub use settings::{BridgeConfig, Config, LoggingConfig, RegistryConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.cad-bridge-mcp/`
/// - **Windows:** `%USERPROFILE%\.cad-bridge-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".cad-bridge-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads, parses, and validates the configuration.
///
/// When `path` is `None` and no file exists at the default location, the
/// built-in defaults are returned.
///
/// # Errors
///
/// Returns an error when an explicitly given file is missing or unreadable,
/// the JSON does not parse, or a setting fails validation.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                let config = Config::default();
                config.validate()?;
                return Ok(config);
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_dir_exists() {
        assert!(default_config_dir().is_some());
    }

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/cad-bridge.json")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "registry": { "port": 8123 } }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.registry.port, 8123);
        assert_eq!(config.bridge.timeout_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = load_config(Some(&path));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
