//! Error types for the NGINX worker metrics collector

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting or exposing worker metrics
#[derive(Error, Debug)]
pub enum Error {
    /// Collector registration rejected by the registry (usually a duplicate)
    #[error("Metric registration failed: {0}")]
    Registration(#[source] prometheus::Error),

    /// Metric construction or encoding error
    #[error("Metrics error: {0}")]
    Metrics(#[source] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
