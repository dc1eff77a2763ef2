//! High-level entry points over [`DownloadManager`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::auth::Session;
use crate::download::{
    BatchItem, BatchRequest, DEFAULT_PRODUCT_CONCURRENCY, DownloadConfig, DownloadError,
    DownloadManager, EngineError, FileDescriptor, MAX_CONCURRENCY, MIN_CONCURRENCY, Product,
};
use crate::storage::CredentialBroker;

/// Downloads single files, products, or plain URL lists.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
///
/// use sarfetch_core::{Client, DownloadConfig, Session};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new(Arc::new(Session::new()?), DownloadConfig::default());
/// let urls = ["https://example.com/a.zip", "https://example.com/b.zip"];
/// client
///     .download_urls(urls, Path::new("./downloads"), None, &CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    manager: DownloadManager,
}

impl Client {
    /// Creates a client without cloud-storage support.
    #[must_use]
    pub fn new(session: Arc<Session>, config: DownloadConfig) -> Self {
        Self {
            manager: DownloadManager::new(session, config, None),
        }
    }

    /// Enables `s3://` downloads through `broker`.
    #[must_use]
    pub fn with_broker(self, broker: Arc<CredentialBroker>) -> Self {
        let session = Arc::clone(self.manager.session());
        let config = self.manager.config().clone();
        Self {
            manager: DownloadManager::new(session, config, Some(broker)),
        }
    }

    /// Returns the underlying manager.
    #[must_use]
    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    /// Downloads one file to `dest_path`.
    ///
    /// # Errors
    ///
    /// Returns the file's [`DownloadError`].
    pub async fn download(
        &self,
        descriptor: &FileDescriptor,
        dest_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        self.manager
            .download_file(descriptor, dest_path, "", cancel)
            .await
    }

    /// Downloads every file of `product` into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoFiles`] for an empty product, otherwise see
    /// [`DownloadManager::download_batch`].
    #[instrument(skip(self, product, cancel), fields(product = %product.id))]
    pub async fn download_product(
        &self,
        product: &Product,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, EngineError> {
        if product.files.is_empty() {
            return Err(EngineError::NoFiles);
        }
        let request = BatchRequest {
            destination: dest_dir.to_path_buf(),
            items: items_for(product),
            concurrency: self
                .manager
                .config()
                .concurrency
                .unwrap_or(DEFAULT_PRODUCT_CONCURRENCY),
            dedupe_urls: false,
        };
        self.manager.download_batch(request, cancel).await
    }

    /// Downloads the files of all `products`, dropping repeated URLs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoFiles`] when no product has files.
    #[instrument(skip(self, products, cancel), fields(products = products.len()))]
    pub async fn download_all(
        &self,
        products: &[Product],
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let items: Vec<BatchItem> = products.iter().flat_map(items_for).collect();
        if items.is_empty() {
            return Err(EngineError::NoFiles);
        }
        let request = BatchRequest {
            destination: dest_dir.to_path_buf(),
            items,
            concurrency: self
                .manager
                .config()
                .concurrency
                .unwrap_or_else(default_parallelism),
            dedupe_urls: true,
        };
        self.manager.download_batch(request, cancel).await
    }

    /// Downloads plain URLs into `dest_dir`.
    ///
    /// Blank entries are skipped and repeated URLs downloaded once.
    /// `concurrency` falls back to the configured value, then to the number
    /// of available CPUs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoUrls`] when no usable URL remains.
    #[instrument(skip(self, urls, cancel))]
    pub async fn download_urls<I, S>(
        &self,
        urls: I,
        dest_dir: &Path,
        concurrency: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<BatchItem> = urls
            .into_iter()
            .map(|url| url.as_ref().trim().to_string())
            .filter(|url| !url.is_empty())
            .map(|url| BatchItem {
                product_id: String::new(),
                descriptor: FileDescriptor::new(url),
            })
            .collect();
        if items.is_empty() {
            return Err(EngineError::NoUrls);
        }
        let request = BatchRequest {
            destination: dest_dir.to_path_buf(),
            items,
            concurrency: concurrency
                .or(self.manager.config().concurrency)
                .unwrap_or_else(default_parallelism),
            dedupe_urls: true,
        };
        self.manager.download_batch(request, cancel).await
    }
}

fn items_for(product: &Product) -> Vec<BatchItem> {
    product
        .files
        .iter()
        .map(|descriptor| BatchItem {
            product_id: product.id.clone(),
            descriptor: descriptor.clone(),
        })
        .collect()
}

/// Available CPU parallelism within the allowed concurrency range.
fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map_or(MIN_CONCURRENCY, NonZeroUsize::get)
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new(Arc::new(Session::new().unwrap()), DownloadConfig::default())
    }

    #[test]
    fn test_default_parallelism_is_in_range() {
        let value = default_parallelism();
        assert!((MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value));
    }

    #[tokio::test]
    async fn test_download_urls_rejects_blank_list() {
        let result = client()
            .download_urls(["", "   "], Path::new("/tmp/unused"), None, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::NoUrls)));
    }

    #[tokio::test]
    async fn test_download_product_rejects_empty_product() {
        let product = Product::new("S1A_EMPTY", Vec::new());
        let result = client()
            .download_product(&product, Path::new("/tmp/unused"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::NoFiles)));
    }

    #[tokio::test]
    async fn test_download_all_rejects_products_without_files() {
        let products = [Product::new("a", Vec::new()), Product::new("b", Vec::new())];
        let result = client()
            .download_all(&products, Path::new("/tmp/unused"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::NoFiles)));
    }
}
