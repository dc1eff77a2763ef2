//! Credential-aware redirect handling.
//!
//! The HTTP client runs with automatic redirects disabled; the
//! [`Session`](super::Session) follows them itself and asks the
//! [`RedirectGuard`] to build each hop. Credentials only ride along to hosts
//! in the [`TrustedDomains`] set, so a redirect to a pre-signed storage URL
//! never sees the user's password.

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode};
use tracing::debug;
use url::Url;

use super::error::SessionError;

/// Domains that receive credentials by default.
pub const DEFAULT_TRUSTED_DOMAINS: [&str; 2] = ["asf.alaska.edu", "earthdata.nasa.gov"];

/// Maximum redirect hops followed for one request.
pub const MAX_REDIRECTS: usize = 10;

/// Set of domains allowed to receive credentials, matched exactly or as a
/// parent domain (`data.asf.alaska.edu` matches `asf.alaska.edu`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDomains {
    domains: Vec<String>,
}

impl Default for TrustedDomains {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_DOMAINS)
    }
}

impl TrustedDomains {
    /// Creates a trusted set from domain names (case-insensitive).
    #[must_use]
    pub fn new<S: AsRef<str>>(domains: impl IntoIterator<Item = S>) -> Self {
        Self {
            domains: domains
                .into_iter()
                .map(|domain| normalize_host(domain.as_ref()))
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }

    /// Returns true if `host` is a trusted domain or a subdomain of one.
    #[must_use]
    pub fn is_trusted(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Returns true if the URL's host is trusted.
    #[must_use]
    pub fn is_trusted_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.is_trusted(host))
    }

    /// Returns the configured domains.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

/// Returns true if a redirect with `status` continues as a body-less GET.
#[must_use]
pub fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    status == StatusCode::SEE_OTHER
        || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
            && !matches!(*method, Method::GET | Method::HEAD))
}

/// Returns true for the statuses the session follows.
#[must_use]
pub fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Builds the request for each redirect hop.
#[derive(Debug, Clone)]
pub struct RedirectGuard {
    trusted: TrustedDomains,
    max_redirects: usize,
}

impl Default for RedirectGuard {
    fn default() -> Self {
        Self::new(TrustedDomains::default())
    }
}

impl RedirectGuard {
    /// Creates a guard with the default hop limit.
    #[must_use]
    pub fn new(trusted: TrustedDomains) -> Self {
        Self {
            trusted,
            max_redirects: MAX_REDIRECTS,
        }
    }

    /// Overrides the hop limit.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Returns the trusted domain set.
    #[must_use]
    pub fn trusted(&self) -> &TrustedDomains {
        &self.trusted
    }

    /// Returns the hop limit.
    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Builds the request for redirect hop number `hop` (1-indexed).
    ///
    /// The previous request's headers are carried over. `Authorization` is
    /// replaced with `credential` when `target` is trusted and removed
    /// otherwise. 303 responses, and 301/302 responses to anything but
    /// GET/HEAD, continue as a body-less GET.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TooManyRedirects`] once `hop` exceeds the
    /// limit, and [`SessionError::UnreplayableBody`] when a 307/308 would have
    /// to resend a streaming body.
    pub fn next_request(
        &self,
        previous: &Request,
        status: StatusCode,
        target: Url,
        hop: usize,
        credential: Option<&HeaderValue>,
    ) -> Result<Request, SessionError> {
        if hop > self.max_redirects {
            return Err(SessionError::TooManyRedirects {
                url: previous.url().to_string(),
                limit: self.max_redirects,
            });
        }

        let switch_to_get = switches_to_get(status, previous.method());

        let trusted = self.trusted.is_trusted_url(&target);
        let mut next = if switch_to_get {
            Request::new(Method::GET, target)
        } else {
            let mut replay =
                previous
                    .try_clone()
                    .ok_or_else(|| SessionError::UnreplayableBody {
                        url: previous.url().to_string(),
                    })?;
            *replay.url_mut() = target;
            replay
        };

        let mut headers = previous.headers().clone();
        if switch_to_get {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
        }
        headers.remove(AUTHORIZATION);
        if trusted && let Some(credential) = credential {
            headers.insert(AUTHORIZATION, credential.clone());
        }
        *next.headers_mut() = headers;
        if let Some(timeout) = previous.timeout() {
            *next.timeout_mut() = Some(*timeout);
        }

        debug!(
            hop,
            status = status.as_u16(),
            target = %next.url(),
            trusted,
            credential_attached = trusted && credential.is_some(),
            "following redirect"
        );

        Ok(next)
    }
}
