//! Error types for authentication, sessions and SSO login.

use thiserror::Error;

use crate::http::TransportError;

/// Errors raised while stamping credentials onto a request.
///
/// These always indicate a configuration fault (a header that cannot be
/// encoded, a custom authenticator refusing a request) and are never retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A header name supplied to [`HeaderAuth`](super::HeaderAuth) is not valid.
    #[error("invalid header name: {name}")]
    InvalidHeaderName {
        /// The rejected header name.
        name: String,
    },

    /// A credential could not be encoded as a header value.
    #[error("invalid value for header {name}")]
    InvalidHeaderValue {
        /// The header whose value was rejected.
        name: String,
    },

    /// A custom authenticator refused to stamp the request.
    #[error("authenticator rejected request: {reason}")]
    Rejected {
        /// Why the request was refused.
        reason: String,
    },
}

impl AuthError {
    /// Creates a rejection error, for use from custom authenticators.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Errors from [`Session`](super::Session) request execution.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Build {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The authenticator failed to stamp the request.
    #[error("failed to authenticate request to {url}: {source}")]
    Authenticate {
        /// The URL of the request.
        url: String,
        /// The underlying authenticator error.
        #[source]
        source: AuthError,
    },

    /// Retryable transport gave up or was cancelled.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The redirect chain exceeded the hop limit.
    #[error("stopped after {limit} redirects starting from {url}")]
    TooManyRedirects {
        /// The URL that started the chain.
        url: String,
        /// The configured hop limit.
        limit: usize,
    },

    /// A redirect response carried an unusable `Location`.
    #[error("invalid redirect from {url} to {location:?}")]
    InvalidRedirect {
        /// The URL that issued the redirect.
        url: String,
        /// The raw `Location` header value.
        location: String,
    },

    /// A redirect needs the request body again, but the body was a one-shot stream.
    #[error("cannot replay request body while following redirect from {url}")]
    UnreplayableBody {
        /// The URL that issued the redirect.
        url: String,
    },
}

impl SessionError {
    /// Returns true when the request was aborted by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_cancelled())
    }
}

/// Errors from the SSO cookie login.
#[derive(Debug, Error)]
pub enum SsoError {
    /// A configured SSO URL could not be parsed.
    #[error("invalid SSO URL: {url}")]
    InvalidUrl {
        /// The unparseable URL.
        url: String,
    },

    /// The login request itself failed.
    #[error("SSO login request failed: {source}")]
    Request {
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// The login completed but none of the recognized session cookies were set.
    #[error(
        "SSO login via {url} did not produce a session cookie; check the username and password"
    )]
    MissingCookies {
        /// The authorization endpoint that was called.
        url: String,
    },
}

impl SsoError {
    /// Returns true when the login was aborted by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Request { source } if source.is_cancelled())
    }
}
