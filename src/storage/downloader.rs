//! Object downloaders built from temporary credentials.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use super::credentials::{ObjectLocation, StorageConfig};
use super::error::StorageError;

/// Provider name attached to SDK credentials built from a token exchange.
const CREDENTIALS_PROVIDER_NAME: &str = "sarfetch-temporary-credentials";

/// Streams one object into a sink.
#[async_trait]
pub trait ObjectDownloader: Send + Sync {
    /// Writes the object at `location` into `sink`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Rejected`] when storage refuses the
    /// credentials, so the caller can refresh them and try again.
    async fn download(
        &self,
        location: &ObjectLocation,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError>;
}

/// Builds a downloader for a resolved storage configuration.
///
/// Swappable so tests (or range-limited fetchers) can stand in for the SDK.
pub type DownloaderFactory = Arc<dyn Fn(&StorageConfig) -> Arc<dyn ObjectDownloader> + Send + Sync>;

/// Factory producing [`SdkObjectDownloader`]s.
#[must_use]
pub fn sdk_factory() -> DownloaderFactory {
    Arc::new(|config: &StorageConfig| {
        Arc::new(SdkObjectDownloader::new(config)) as Arc<dyn ObjectDownloader>
    })
}

/// Object downloader backed by the AWS SDK, pinned to one region and one
/// set of static temporary credentials.
#[derive(Debug, Clone)]
pub struct SdkObjectDownloader {
    client: aws_sdk_s3::Client,
}

impl SdkObjectDownloader {
    /// Creates an SDK client for `config`.
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.credentials.access_key_id.clone(),
            config.credentials.secret_access_key.clone(),
            Some(config.credentials.session_token.clone()),
            Some(SystemTime::from(config.credentials.expiration)),
            CREDENTIALS_PROVIDER_NAME,
        );
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
        }
    }
}

#[async_trait]
impl ObjectDownloader for SdkObjectDownloader {
    #[instrument(skip(self, sink), fields(location = %location))]
    async fn download(
        &self,
        location: &ObjectLocation,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|error| {
                let status = error.raw_response().map(|raw| raw.status().as_u16());
                StorageError::from_status(
                    &location.bucket,
                    &location.key,
                    status,
                    DisplayErrorContext(&error).to_string(),
                )
            })?;

        let mut body = output.body;
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(|error| {
            StorageError::from_status(&location.bucket, &location.key, None, error.to_string())
        })? {
            sink.write_all(&chunk)
                .await
                .map_err(|source| StorageError::Write {
                    bucket: location.bucket.clone(),
                    key: location.key.clone(),
                    source,
                })?;
            written += chunk.len() as u64;
        }

        debug!(bytes = written, "object downloaded");
        Ok(written)
    }
}
