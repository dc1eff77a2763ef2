//! Error types for the retryable transport.

use thiserror::Error;

/// Errors surfaced by [`Transport::execute`](super::Transport::execute).
///
/// Non-success HTTP statuses are not errors at this layer; the final response
/// is handed back to the caller, who decides what a status means.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure after the retry policy gave up.
    #[error("network error requesting {url} after {attempts} attempt(s): {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// Attempts made, including the initial one.
        attempts: u32,
        /// The last underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The caller's cancellation token fired during a request or backoff sleep.
    #[error("request to {url} cancelled")]
    Cancelled {
        /// The URL whose request was aborted.
        url: String,
    },
}

impl TransportError {
    /// Creates a network error.
    pub fn network(url: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true when the request was aborted by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
