//! Error types for the download module.
//!
//! Per-file failures are [`DownloadError`]s. A batch collects them into a
//! [`BatchError`] instead of stopping at the first one, and
//! [`EngineError`] covers the failures that stop a batch before any file
//! is attempted.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::auth::{SessionError, SsoError};
use crate::storage::StorageError;

/// Errors that can occur while downloading one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The descriptor has no URL.
    #[error("file descriptor has no URL")]
    MissingUrl,

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Neither an explicit name nor a URL path segment is available.
    #[error("could not determine filename for {url}")]
    UnknownFilename {
        /// The descriptor URL.
        url: String,
    },

    /// The resolved name would escape the destination directory.
    #[error("refusing unsafe filename {name:?} for {url}")]
    InvalidFilename {
        /// The descriptor URL.
        url: String,
        /// The rejected name.
        name: String,
    },

    /// Another descriptor earlier in the batch already claimed this name.
    #[error("filename {name} for {url} collides with an earlier file in the batch")]
    FilenameCollision {
        /// The descriptor URL.
        url: String,
        /// The contested name.
        name: String,
    },

    /// Non-200 response.
    #[error("HTTP {status} downloading {url}: {preview}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Leading part of the response body.
        preview: String,
    },

    /// The server answered with an HTML page, usually a login form.
    #[error("[AUTH] received an HTML page instead of file data from {url} (login required?): {preview}")]
    HtmlResponse {
        /// The requested URL.
        url: String,
        /// Leading part of the HTML body.
        preview: String,
    },

    /// Network-level error while streaming the body.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The session could not complete the request.
    #[error("request for {url} failed: {source}")]
    Session {
        /// The requested URL.
        url: String,
        /// The underlying session error.
        #[source]
        source: SessionError,
    },

    /// The identity-provider login did not produce session cookies.
    #[error("[AUTH] login required for {url} failed: {source}")]
    Login {
        /// The requested URL.
        url: String,
        /// The underlying login error.
        #[source]
        source: SsoError,
    },

    /// Cloud-storage download failed.
    #[error("storage download of {url} failed: {source}")]
    Storage {
        /// The object URL.
        url: String,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded bytes do not match the declared checksum.
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The resolved filename.
        name: String,
        /// Declared digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// The caller cancelled the download.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL being downloaded.
        url: String,
    },

    /// The download task panicked or was aborted.
    #[error("download task failed: {message}")]
    TaskFailed {
        /// Join error description.
        message: String,
    },
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16, preview: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            preview: preview.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Wraps a session error, folding cancellation into [`DownloadError::Cancelled`].
    pub fn session(url: impl Into<String>, source: SessionError) -> Self {
        let url = url.into();
        if source.is_cancelled() {
            return Self::Cancelled { url };
        }
        Self::Session { url, source }
    }

    /// Wraps a storage error, folding cancellation into [`DownloadError::Cancelled`].
    pub fn storage(url: impl Into<String>, source: StorageError) -> Self {
        let url = url.into();
        if source.is_cancelled() {
            return Self::Cancelled { url };
        }
        Self::Storage { url, source }
    }

    /// Returns true when the download stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Session { source, .. } => source.is_cancelled(),
            Self::Login { source, .. } => source.is_cancelled(),
            Self::Storage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Aggregate of every per-file failure in a batch.
#[derive(Debug, Default)]
pub struct BatchError {
    errors: Vec<DownloadError>,
}

impl BatchError {
    /// Wraps the collected failures.
    #[must_use]
    pub fn new(errors: Vec<DownloadError>) -> Self {
        Self { errors }
    }

    /// Number of failed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if no file failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Borrows the individual failures.
    #[must_use]
    pub fn errors(&self) -> &[DownloadError] {
        &self.errors
    }

    /// Iterates over the individual failures.
    pub fn iter(&self) -> std::slice::Iter<'_, DownloadError> {
        self.errors.iter()
    }

    /// Consumes the aggregate, returning the individual failures.
    #[must_use]
    pub fn into_errors(self) -> Vec<DownloadError> {
        self.errors
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

impl<'a> IntoIterator for &'a BatchError {
    type Item = &'a DownloadError;
    type IntoIter = std::slice::Iter<'a, DownloadError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Error type for download batch operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// No destination directory was given.
    #[error("destination directory is required")]
    MissingDestination,

    /// A URL-list batch contained no URLs.
    #[error("no URLs to download")]
    NoUrls,

    /// A product batch contained no files.
    #[error("product contains no downloadable files")]
    NoFiles,

    /// The destination directory could not be created.
    #[error("failed to create destination directory {path}: {source}")]
    CreateDirectory {
        /// The destination directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Cancellation fired before the batch started.
    #[error("download batch cancelled")]
    Cancelled,

    /// One or more files failed.
    #[error("{count} file(s) failed: {0}", count = .0.len())]
    Batch(#[from] BatchError),
}

impl EngineError {
    /// Returns the per-file failures when this is a batch error.
    #[must_use]
    pub fn batch(&self) -> Option<&BatchError> {
        match self {
            Self::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}
