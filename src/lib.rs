//! sarfetch core library
//!
//! Concurrent download and authentication engine for satellite (SAR)
//! product archives. It turns a list of remote file descriptors into
//! checksum-verified files on disk, in parallel, under the credential
//! flows the archive hosts require: bearer tokens, HTTP basic auth,
//! cookie-based SSO login, and temporary cloud-storage credentials.
//!
//! # Architecture
//!
//! The library is organized into the following modules (leaf-first):
//! - [`http`] - retryable transport with pluggable backoff policy
//! - [`auth`] - authenticators, the cookie-holding session, redirect guard and SSO login
//! - [`storage`] - temporary-credential broker and object downloaders for `s3://` URLs
//! - [`download`] - descriptors, the hashing progress writer and the batch manager
//! - [`client`] - single-file, product and URL-list entry points

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod download;
pub mod http;
pub mod storage;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use auth::{Authenticator, BasicAuth, BearerToken, Session, SessionBuilder, TrustedDomains};
pub use client::Client;
pub use download::{
    BatchError, ChecksumAlgorithm, DownloadConfig, DownloadError, DownloadManager, EngineError,
    FileDescriptor, FileProgress, Product,
};
pub use http::{ExponentialBackoff, NoRetry, RetryPolicy, Transport};
pub use storage::{CredentialBroker, StorageError};
