//! Exchanges a bearer token for temporary storage credentials and caches a
//! downloader built from them.
//!
//! # State machine
//!
//! ```text
//! Cold --first request--> Fetching --ok--> Warm
//!   ^                                        |
//!   +--- invalidate() / near expiry ---------+
//! ```
//!
//! The cache is a [`tokio::sync::RwLock`]. Warm lookups share the read lock;
//! a cold or stale cache is refilled under the write lock after re-checking,
//! so callers racing the first request collapse into a single fetch.
//! Credentials are treated as stale once fewer than `refresh_margin`
//! remain before their expiry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::TimeDelta;
use reqwest::{Method, Request, StatusCode};
use tokio::io::AsyncWrite;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::credentials::{
    DEFAULT_CREDENTIALS_URL, DEFAULT_REGION, ObjectLocation, StorageConfig, TemporaryCredentials,
};
use super::downloader::{DownloaderFactory, ObjectDownloader, sdk_factory};
use super::error::StorageError;
use crate::auth::{BearerToken, Session};

/// Default time before expiry at which credentials are refreshed.
pub const DEFAULT_REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Observable broker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// No credentials cached.
    Cold,
    /// A fetch (or invalidation) holds the cache.
    Fetching,
    /// Credentials and a downloader are cached.
    Warm,
}

enum Cache {
    Cold,
    Warm {
        credentials: Arc<TemporaryCredentials>,
        downloader: Arc<dyn ObjectDownloader>,
    },
}

/// Per-client cache of temporary storage credentials.
pub struct CredentialBroker {
    session: Arc<Session>,
    token: BearerToken,
    endpoint: String,
    region: String,
    refresh_margin: TimeDelta,
    factory: DownloaderFactory,
    cache: RwLock<Cache>,
    fetches: AtomicUsize,
}

impl fmt::Debug for CredentialBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBroker")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("refresh_margin", &self.refresh_margin)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CredentialBroker {
    /// Starts a builder for a broker that authenticates with `token`.
    #[must_use]
    pub fn builder(session: Arc<Session>, token: impl Into<String>) -> CredentialBrokerBuilder {
        CredentialBrokerBuilder {
            session,
            token: token.into(),
            endpoint: DEFAULT_CREDENTIALS_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            factory: None,
        }
    }

    /// Returns the storage region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the current cache state without waiting.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        match self.cache.try_read() {
            Ok(cache) => match &*cache {
                Cache::Cold => BrokerState::Cold,
                Cache::Warm { .. } => BrokerState::Warm,
            },
            Err(_) => BrokerState::Fetching,
        }
    }

    /// Returns how many times the credentials endpoint has been called.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns a downloader built from fresh credentials, fetching them if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Cancelled`] if `cancel` fires while waiting for
    /// the cache, and the credential errors when a fetch fails.
    pub async fn downloader(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn ObjectDownloader>, StorageError> {
        self.warm(cancel).await.map(|(_, downloader)| downloader)
    }

    /// Returns the cached credentials, fetching them if needed.
    ///
    /// # Errors
    ///
    /// See [`CredentialBroker::downloader`].
    pub async fn credentials(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<TemporaryCredentials>, StorageError> {
        self.warm(cancel).await.map(|(credentials, _)| credentials)
    }

    /// Drops cached credentials so the next request fetches new ones.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        if matches!(*cache, Cache::Warm { .. }) {
            info!("invalidating cached storage credentials");
        }
        *cache = Cache::Cold;
    }

    /// Drops the cache only if it still holds `rejected`.
    ///
    /// Returns false when another caller already replaced those credentials.
    pub async fn invalidate_if_current(&self, rejected: &Arc<TemporaryCredentials>) -> bool {
        let mut cache = self.cache.write().await;
        let current = matches!(
            &*cache,
            Cache::Warm { credentials, .. } if Arc::ptr_eq(credentials, rejected)
        );
        if current {
            info!("invalidating rejected storage credentials");
            *cache = Cache::Cold;
        } else {
            debug!("rejected credentials already replaced");
        }
        current
    }

    /// Downloads the object addressed by `url` into `sink`.
    ///
    /// A [`StorageError::Rejected`] drops the credentials that were used, but
    /// nothing is retried here: the sink may hold partial data, so the caller
    /// decides whether to start over with a fresh sink.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidLocation`] for malformed URLs,
    /// [`StorageError::Cancelled`] on cancellation, and downloader errors.
    #[instrument(skip(self, sink, cancel))]
    pub async fn download_object(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<u64, StorageError> {
        let location = ObjectLocation::parse(url)?;
        let (credentials, downloader) = self.warm(cancel).await?;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StorageError::Cancelled),
            result = downloader.download(&location, sink) => result,
        };
        if let Err(error) = &result
            && error.is_auth_rejection()
        {
            self.invalidate_if_current(&credentials).await;
        }
        result
    }

    async fn warm(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Arc<TemporaryCredentials>, Arc<dyn ObjectDownloader>), StorageError> {
        {
            let cache = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(StorageError::Cancelled),
                cache = self.cache.read() => cache,
            };
            if let Some(hit) = self.fresh_entry(&cache) {
                return Ok(hit);
            }
        }

        let mut cache = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StorageError::Cancelled),
            cache = self.cache.write() => cache,
        };
        // Another caller may have refilled the cache while we waited.
        if let Some(hit) = self.fresh_entry(&cache) {
            return Ok(hit);
        }

        let credentials = Arc::new(self.fetch(cancel).await?);
        let downloader = (self.factory)(&StorageConfig {
            region: self.region.clone(),
            credentials: (*credentials).clone(),
        });
        *cache = Cache::Warm {
            credentials: Arc::clone(&credentials),
            downloader: Arc::clone(&downloader),
        };
        info!(
            expiration = %credentials.expiration,
            region = %self.region,
            "storage credentials cached"
        );
        Ok((credentials, downloader))
    }

    fn fresh_entry(
        &self,
        cache: &Cache,
    ) -> Option<(Arc<TemporaryCredentials>, Arc<dyn ObjectDownloader>)> {
        match cache {
            Cache::Warm {
                credentials,
                downloader,
            } if credentials.is_fresh(self.refresh_margin) => {
                Some((Arc::clone(credentials), Arc::clone(downloader)))
            }
            Cache::Warm { credentials, .. } => {
                debug!(expiration = %credentials.expiration, "cached credentials near expiry");
                None
            }
            Cache::Cold => None,
        }
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<TemporaryCredentials, StorageError> {
        let url = Url::parse(&self.endpoint).map_err(|_| StorageError::InvalidEndpoint {
            url: self.endpoint.clone(),
        })?;

        self.fetches.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "requesting temporary storage credentials");

        let response = self
            .session
            .execute_as(Request::new(Method::GET, url), &self.token, cancel)
            .await
            .map_err(|source| StorageError::CredentialsRequest {
                url: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(StorageError::CredentialsStatus {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StorageError::Cancelled),
            body = response.bytes() => body.map_err(|error| StorageError::CredentialsBody {
                url: self.endpoint.clone(),
                message: error.to_string(),
            })?,
        };

        serde_json::from_slice(&body).map_err(|error| StorageError::CredentialsBody {
            url: self.endpoint.clone(),
            message: error.to_string(),
        })
    }
}

/// Builder for [`CredentialBroker`].
pub struct CredentialBrokerBuilder {
    session: Arc<Session>,
    token: String,
    endpoint: String,
    region: String,
    refresh_margin: TimeDelta,
    factory: Option<DownloaderFactory>,
}

impl CredentialBrokerBuilder {
    /// Overrides the credentials endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the storage region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Overrides how long before expiry credentials are refreshed.
    #[must_use]
    pub fn refresh_margin(mut self, margin: TimeDelta) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Replaces the SDK downloader factory.
    #[must_use]
    pub fn downloader_factory(mut self, factory: DownloaderFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Builds the broker in the `Cold` state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingToken`] when the token is empty.
    pub fn build(self) -> Result<CredentialBroker, StorageError> {
        if self.token.trim().is_empty() {
            return Err(StorageError::MissingToken);
        }
        Ok(CredentialBroker {
            session: self.session,
            token: BearerToken::new(self.token),
            endpoint: self.endpoint,
            region: self.region,
            refresh_margin: self.refresh_margin,
            factory: self.factory.unwrap_or_else(sdk_factory),
            cache: RwLock::new(Cache::Cold),
            fetches: AtomicUsize::new(0),
        })
    }
}
