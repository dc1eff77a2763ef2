//! Constants for the download module (previews, concurrency bounds, file naming).

/// Maximum bytes of a non-200 response body kept for the error message.
pub const HTTP_ERROR_PREVIEW_LIMIT: usize = 4096;

/// Maximum bytes of an unexpected HTML body kept for the error message.
pub const HTML_PREVIEW_LIMIT: usize = 2048;

/// Default number of concurrent files for a single product.
pub const DEFAULT_PRODUCT_CONCURRENCY: usize = 2;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Suffix of in-flight files.
pub const PARTIAL_SUFFIX: &str = ".part";
