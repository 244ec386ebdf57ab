//! Error types for the AtlasView environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport-level failure (connection refused, TLS, DNS, ...)
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The remote answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The asset does not exist
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Local filesystem failure
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The URL scheme cannot be served by this fetcher
    #[error("Unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme { url: String, scheme: String },

    /// The body could not be decoded as UTF-8 text
    #[error("Decode error for {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(url: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(url: impl std::fmt::Display) -> Self {
        Self::NotFound(url.to_string())
    }
}
