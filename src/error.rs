//! Error types for the path-protector webhook

use thiserror::Error;

/// Main error type for process-level operations
///
/// Per-request failures never surface here; they become fail-open admission
/// responses (see [`crate::protect::MutationOutcome`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// The HTTP server failed to bind or crashed
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }
}
