//! Cloud-storage access for `s3://` product URLs.
//!
//! A [`CredentialBroker`] trades the configured bearer token for
//! [`TemporaryCredentials`] and caches an [`ObjectDownloader`] built from
//! them. The downloader itself is produced by a [`DownloaderFactory`], which
//! defaults to the AWS SDK.

mod broker;
mod credentials;
mod downloader;
mod error;

pub use broker::{BrokerState, CredentialBroker, CredentialBrokerBuilder, DEFAULT_REFRESH_MARGIN};
pub use credentials::{
    DEFAULT_CREDENTIALS_URL, DEFAULT_REGION, ObjectLocation, StorageConfig, TemporaryCredentials,
    is_object_url, parse_expiration,
};
pub use downloader::{DownloaderFactory, ObjectDownloader, SdkObjectDownloader, sdk_factory};
pub use error::StorageError;
