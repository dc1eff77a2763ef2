//! Error types for cloud-storage access.

use thiserror::Error;

use crate::auth::SessionError;

/// Errors from the credential broker and object downloaders.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No bearer token was configured, so credentials cannot be requested.
    #[error("a bearer token is required to request temporary storage credentials")]
    MissingToken,

    /// Object storage was requested but no broker is configured.
    #[error("cloud-storage URL {url} requires a credential broker")]
    BrokerUnavailable {
        /// The object URL.
        url: String,
    },

    /// The credentials endpoint is not a valid URL.
    #[error("invalid credentials endpoint: {url}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        url: String,
    },

    /// The credentials request failed.
    #[error("temporary credentials request to {url} failed: {source}")]
    CredentialsRequest {
        /// The credentials endpoint.
        url: String,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// The credentials endpoint answered with a non-success status.
    #[error("credentials endpoint {url} returned HTTP {status}")]
    CredentialsStatus {
        /// The credentials endpoint.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The credentials response body could not be decoded.
    #[error("invalid credentials response from {url}: {message}")]
    CredentialsBody {
        /// The credentials endpoint.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// The object URL does not name a bucket and key.
    #[error("invalid object URL {url}: expected <scheme>://<bucket>/<key>")]
    InvalidLocation {
        /// The rejected URL.
        url: String,
    },

    /// Storage refused the credentials (401/403).
    #[error("storage rejected credentials for {bucket}/{key} (HTTP {status})")]
    Rejected {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The object request failed for another reason.
    #[error("object request for {bucket}/{key} failed: {message}")]
    Request {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// HTTP status when one was received.
        status: Option<u16>,
        /// Error description.
        message: String,
    },

    /// Writing object bytes to the sink failed.
    #[error("failed writing object {bucket}/{key}: {source}")]
    Write {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The caller's cancellation token fired.
    #[error("storage operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Returns true when storage rejected the credentials, meaning a refresh may help.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns true when the operation was aborted by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::CredentialsRequest { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Classifies an object request failure by HTTP status.
    pub fn from_status(
        bucket: impl Into<String>,
        key: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        match status {
            Some(status @ (401 | 403)) => Self::Rejected {
                bucket: bucket.into(),
                key: key.into(),
                status,
            },
            status => Self::Request {
                bucket: bucket.into(),
                key: key.into(),
                status,
                message: message.into(),
            },
        }
    }
}
