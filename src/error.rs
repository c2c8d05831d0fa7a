//! Error types for alphavantage-mcp.
//!
//! # Security Note
//!
//! Error messages never include the provider API key. Variants that wrap
//! lower-level errors carry only their descriptions.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that stop a transport from serving.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The HTTP listener could not bind its address.
    #[error("failed to bind {addr}")]
    Bind {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Transport I/O failed while serving.
    #[error("transport I/O error")]
    Io(#[from] io::Error),
}
