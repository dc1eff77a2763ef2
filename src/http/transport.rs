//! Single request/response exchange with bounded retry.

use std::sync::Arc;

use reqwest::{Client, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::error::TransportError;
use super::retry::{ExponentialBackoff, RetryDecision, RetryPolicy};

/// Executes requests through a [`RetryPolicy`], racing every network call
/// and every backoff sleep against a cancellation token.
///
/// Each attempt sends a fresh clone of the request, because request bodies
/// may be single-use streams. A request whose body cannot be cloned is sent
/// exactly once.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    policy: Arc<dyn RetryPolicy>,
}

impl Transport {
    /// Creates a transport using the default [`ExponentialBackoff`] policy.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_policy(client, Arc::new(ExponentialBackoff::default()))
    }

    /// Creates a transport with an explicit retry policy.
    #[must_use]
    pub fn with_policy(client: Client, policy: Arc<dyn RetryPolicy>) -> Self {
        Self { client, policy }
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.policy
    }

    /// Executes `request`, retrying transport failures and transient statuses.
    ///
    /// The returned response is the final one: either a status the policy does
    /// not consider transient, or the last transient response once the policy
    /// gives up. Intermediate responses are dropped (releasing their
    /// connections) before the backoff sleep.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] as soon as `cancel` fires, and
    /// [`TransportError::Network`] when the last attempt failed below HTTP.
    #[instrument(skip(self, request, cancel), fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let url = request.url().to_string();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let Some(outgoing) = request.try_clone() else {
                debug!("request body cannot be replayed; sending once");
                return self.send(request, &url, attempt, cancel).await;
            };

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::cancelled(url)),
                result = self.client.execute(outgoing) => result,
            };

            let failure = match outcome {
                Ok(response) if !self.policy.is_retryable_status(response.status()) => {
                    return Ok(response);
                }
                Ok(response) => Ok(response),
                Err(error) => Err(error),
            };

            match self.policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    match &failure {
                        Ok(response) => info!(
                            status = response.status().as_u16(),
                            next_attempt,
                            delay_ms = delay.as_millis(),
                            "transient status; retrying"
                        ),
                        Err(error) => info!(
                            error = %error,
                            next_attempt,
                            delay_ms = delay.as_millis(),
                            "network error; retrying"
                        ),
                    }
                    drop(failure);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(TransportError::cancelled(url)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, attempt, "not retrying");
                    return failure.map_err(|error| TransportError::network(url, attempt, error));
                }
            }
        }
    }

    async fn send(
        &self,
        request: Request,
        url: &str,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::cancelled(url)),
            result = self.client.execute(request) => {
                result.map_err(|error| TransportError::network(url, attempt, error))
            }
        }
    }
}
