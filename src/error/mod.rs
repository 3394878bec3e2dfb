//! Error types and handlers for mirror operations

pub mod handlers;

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Clone, Error)]
pub enum MirrorError {
    /// Missing or invalid configuration (mirror list, credentials, tools)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Session token could not be obtained
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Network related errors
    #[error("Network error: {0}")]
    Network(String),
    /// Request timed out
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Non-success response from the registry API
    #[error("Registry error (status {status}): {message}")]
    Registry { status: u16, message: String },
    /// Upstream answered with HTTP 429 / toomanyrequests
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Retry budget exhausted on a metadata query
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),
    /// Image copy failed on every transfer strategy
    #[error("Transfer error: {0}")]
    Transfer(String),
    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// Digest cache errors
    #[error("Cache error{}: {message}", at_path(.path))]
    Cache {
        message: String,
        path: Option<PathBuf>,
    },
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl MirrorError {
    /// Transient failures worth another attempt under a retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::Network(_) | MirrorError::Timeout(_) => true,
            MirrorError::Registry { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MirrorError::RateLimited(_))
    }

    /// Errors that must stop the whole batch
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::Config(_) | MirrorError::Auth(_) | MirrorError::RateLimited(_)
        )
    }

    /// Process exit code for an error that terminated the run
    pub fn exit_code(&self) -> u8 {
        match self {
            MirrorError::Config(_) => 2,
            MirrorError::Auth(_) => 3,
            MirrorError::RateLimited(_) => 4,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "request")
    }
}

impl From<url::ParseError> for MirrorError {
    fn from(err: url::ParseError) -> Self {
        MirrorError::Config(format!("Invalid URL: {}", err))
    }
}
