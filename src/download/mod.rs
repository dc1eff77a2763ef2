//! Download engine: descriptors, the hashing progress writer, and the
//! bounded-concurrency manager.
//!
//! # Features
//!
//! - Streaming downloads into `<name>.part`, promoted by rename only after
//!   the checksum matches
//! - MD5 / SHA-1 verification while the bytes are written
//! - Per-file progress callbacks
//! - Partial-failure batches: every failed file is reported, successful
//!   files stay on disk
//! - `s3://` URLs routed through the credential broker
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sarfetch_core::auth::Session;
//! use sarfetch_core::download::{BatchRequest, DownloadConfig, DownloadManager, FileDescriptor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::new(Arc::new(Session::new()?), DownloadConfig::default(), None);
//! let request = BatchRequest::new("./downloads", 2)
//!     .with_item("S1A_IW_SLC", FileDescriptor::new("https://example.com/S1A_IW_SLC.zip"));
//! let paths = manager.download_batch(request, &CancellationToken::new()).await?;
//! println!("downloaded {} file(s)", paths.len());
//! # Ok(())
//! # }
//! ```

mod constants;
mod descriptor;
mod error;
mod manager;
mod progress;

pub use constants::{
    DEFAULT_PRODUCT_CONCURRENCY, HTML_PREVIEW_LIMIT, HTTP_ERROR_PREVIEW_LIMIT, MAX_CONCURRENCY,
    MIN_CONCURRENCY, PARTIAL_SUFFIX,
};
pub use descriptor::{ChecksumAlgorithm, FileDescriptor, Product, UnsupportedAlgorithm};
pub use error::{BatchError, DownloadError, EngineError};
pub use manager::{BatchItem, BatchRequest, DownloadConfig, DownloadManager};
pub use progress::{ChecksumHasher, FileProgress, ProgressFn, ProgressWriter};
