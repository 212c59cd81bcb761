//! Unified error types for Vitals
//!
//! These cover setup and infrastructure failures. A health check that merely
//! *fails* is not an error: check outcomes carry their own exit codes and are
//! modeled in [`crate::triage`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Vitals operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    // Marker errors
    #[error("Failed to update marker file '{path}': {source}")]
    MarkerWrite { path: PathBuf, source: io::Error },

    #[error("Failed to remove marker file '{path}': {source}")]
    MarkerRemove { path: PathBuf, source: io::Error },

    // Broker errors
    #[error("Invalid broker URL '{url}': {message}")]
    InvalidBrokerUrl { url: String, message: String },

    #[error("Broker connection failed: {0}")]
    BrokerConnection(String),

    #[error("Failed to encode control message: {0}")]
    ControlEncoding(#[from] serde_json::Error),

    // Probe evaluator errors
    #[error("Probe state machine rejected transition: {0}")]
    ProbeTransition(String),
}

/// Result type alias for Vitals operations
pub type Result<T> = std::result::Result<T, Error>;
