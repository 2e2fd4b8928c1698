//! Error types for configuration handling.
//!
//! Host-side errors live in [`crate::host`] and relay failures in
//! [`crate::relay`]; each layer owns the vocabulary it speaks to the layer
//! above it.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load, parse, or validate the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("could not read config file {path}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("could not parse config file {path}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("config file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// The file parsed, but a setting has an unusable value.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the validation failure.
        message: String,
    },
}
