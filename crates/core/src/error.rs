//! Unified error types for dredge.
//!
//! The taxonomy separates failures that abort a search from those that
//! never do: configuration problems surface at construction through
//! [`crate::config::ConfigError`], auth and upstream failures abort the
//! request, and per-item fetch failures are swallowed by the fetcher
//! before they can reach this type.

use tokio_rusqlite::rusqlite;

/// Unified error type for search and fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A strategy or backend could not be constructed from the
    /// supplied configuration.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Token exchange or tenant resolution failed.
    #[error("AUTH_ERROR: {0}")]
    Auth(String),

    /// Non-success response from an upstream search or fetch call.
    /// The upstream body is preserved verbatim for diagnostics.
    #[error("UPSTREAM_ERROR: status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Transport-level failure before a response was received.
    #[error("HTTP_ERROR: {0}")]
    Http(String),

    /// A request exceeded its timeout budget.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// Cache store operation failed. The fetch path treats this as a
    /// miss; it only propagates from direct cache-management calls.
    #[error("CACHE_ERROR: {0}")]
    Cache(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether this error maps to a gateway-style failure for the
    /// caller's transport layer (as opposed to a client-input failure).
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Upstream { .. } | Error::Http(_) | Error::Timeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
