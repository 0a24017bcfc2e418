//! Error types of the application layer
//!
//! Request-time failures live in `doppio_core::Error`; the types here cover
//! the listener lifecycle and loading the server configuration.

use std::io;

use thiserror::Error;

/// Listener lifecycle failures
#[derive(Debug, Error)]
pub enum ServeError {
    /// Binding or accepting on the listener failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The application already has an active server
    #[error("Serve: server is already running")]
    AlreadyRunning,

    /// `shutdown` was called before any server was started
    #[error("Shutdown: server is not running")]
    NotRunning,

    /// Graceful shutdown did not finish in time
    #[error("Shutdown: timed out waiting for connections to close")]
    Timeout,
}

/// Server configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] io::Error),

    #[error("Failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid route registration: {0}")]
    Route(#[from] doppio_core::RouterError),
}

pub type ServeResult<T> = Result<T, ServeError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
