//! Retryable HTTP transport.
//!
//! Every outbound request made by the engine (catalog downloads, identity
//! provider logins, credential exchanges) is executed by a [`Transport`],
//! which repeats transport failures and transient statuses according to a
//! pluggable [`RetryPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use sarfetch_core::http::Transport;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::new();
//! let transport = Transport::new(client.clone());
//! let request = client.get("https://example.com/file.zip").build()?;
//! let response = transport.execute(request, &CancellationToken::new()).await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

mod error;
mod retry;
mod transport;

pub use error::TransportError;
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_STATUSES, ExponentialBackoff,
    NoRetry, RetryDecision, RetryPolicy,
};
pub use transport::Transport;
