//! Shared helpers for integration tests.

#![allow(dead_code)]

// Same guard the unit tests use, compiled into each test binary.
#[path = "../../src/test_support/socket_guard.rs"]
pub mod socket_guard;

use std::sync::Arc;

use sarfetch_core::auth::{Session, TrustedDomains};
use sarfetch_core::http::{ExponentialBackoff, NoRetry};

/// Session that trusts the loopback mock server and never retries.
pub fn loopback_session() -> Arc<Session> {
    Arc::new(
        Session::builder()
            .trusted_domains(TrustedDomains::new(["127.0.0.1"]))
            .retry_policy(NoRetry)
            .build()
            .expect("session builds"),
    )
}

/// Session that retries quickly, for flaky-server tests.
pub fn fast_retry_session(max_attempts: u32) -> Arc<Session> {
    Arc::new(
        Session::builder()
            .retry_policy(ExponentialBackoff::new(
                max_attempts,
                std::time::Duration::from_millis(5),
            ))
            .build()
            .expect("session builds"),
    )
}
