//! Authenticated HTTP session: cookie jar, authenticator, retrying transport
//! and redirect guard behind one `execute` call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{AUTHORIZATION, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::authenticator::{Authenticator, NoAuth};
use super::error::SessionError;
use super::redirect::{RedirectGuard, TrustedDomains, is_followed_redirect, switches_to_get};
use crate::http::{ExponentialBackoff, RetryPolicy, Transport};
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read timeout between body chunks (5 minutes for large archives).
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Stateful mediator for all outbound traffic.
///
/// A session exclusively owns its cookie jar and default [`Authenticator`].
/// Every request is stamped with credentials, executed through the retrying
/// [`Transport`], and has its redirects followed under the [`RedirectGuard`].
/// Cookies set by any response (including intermediate redirect hops) land in
/// the jar and are replayed on later requests.
///
/// Sessions are cheap to share behind an `Arc` and safe to use from many
/// tasks at once; the jar synchronizes internally.
pub struct Session {
    client: Client,
    jar: Arc<Jar>,
    authenticator: Arc<dyn Authenticator>,
    transport: Transport,
    guard: RedirectGuard,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Returns a builder with default settings.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Creates a session with default settings and no authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Build`] if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, SessionError> {
        Self::builder().build()
    }

    /// Returns the underlying HTTP client (redirects disabled, jar attached).
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the session's cookie jar.
    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Returns the domains that receive credentials across redirects.
    #[must_use]
    pub fn trusted_domains(&self) -> &TrustedDomains {
        self.guard.trusted()
    }

    /// Returns the names of the cookies the jar would send to `url`.
    #[must_use]
    pub fn cookie_names(&self, url: &Url) -> Vec<String> {
        let Some(header) = self.jar.cookies(url) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };
        header
            .split(';')
            .filter_map(|pair| pair.split('=').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Stamps `request` with the session authenticator and executes it.
    ///
    /// # Errors
    ///
    /// See [`Session::execute_as`].
    pub async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, SessionError> {
        self.execute_as(request, self.authenticator.as_ref(), cancel)
            .await
    }

    /// Stamps `request` with `authenticator` instead of the session default,
    /// then executes it and follows redirects.
    ///
    /// The `Authorization` header produced by stamping is what the redirect
    /// guard re-attaches on trusted hops.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authenticate`] without sending anything if
    /// stamping fails, [`SessionError::Transport`] when the transport gives up
    /// or is cancelled, and the redirect errors from [`RedirectGuard`].
    #[instrument(skip(self, request, authenticator, cancel), fields(url = %request.url()))]
    pub async fn execute_as(
        &self,
        mut request: Request,
        authenticator: &dyn Authenticator,
        cancel: &CancellationToken,
    ) -> Result<Response, SessionError> {
        authenticator
            .authenticate(&mut request)
            .map_err(|source| SessionError::Authenticate {
                url: request.url().to_string(),
                source,
            })?;
        let credential = request.headers().get(AUTHORIZATION).cloned();

        let mut hop = 0usize;
        loop {
            let method = request.method().clone();
            let cloned = request.try_clone();
            let replayable = cloned.is_some();
            let previous = cloned.unwrap_or_else(|| {
                let mut shell = Request::new(method.clone(), request.url().clone());
                *shell.headers_mut() = request.headers().clone();
                shell
            });

            let response = self.transport.execute(request, cancel).await?;
            let status = response.status();
            if !is_followed_redirect(status) {
                return Ok(response);
            }
            let Some(location) = response.headers().get(LOCATION) else {
                debug!(status = status.as_u16(), "redirect without Location header");
                return Ok(response);
            };

            let from = response.url().to_string();
            let raw_location = String::from_utf8_lossy(location.as_bytes()).into_owned();
            let target = response
                .url()
                .join(&raw_location)
                .map_err(|_| SessionError::InvalidRedirect {
                    url: from.clone(),
                    location: raw_location.clone(),
                })?;
            drop(response);

            if !replayable && !switches_to_get(status, &method) {
                return Err(SessionError::UnreplayableBody { url: from });
            }

            hop += 1;
            request =
                self.guard
                    .next_request(&previous, status, target, hop, credential.as_ref())?;
        }
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    authenticator: Arc<dyn Authenticator>,
    policy: Arc<dyn RetryPolicy>,
    trusted: TrustedDomains,
    max_redirects: Option<usize>,
    user_agent: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    jar: Option<Arc<Jar>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            authenticator: Arc::new(NoAuth),
            policy: Arc::new(ExponentialBackoff::default()),
            trusted: TrustedDomains::default(),
            max_redirects: None,
            user_agent: None,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            jar: None,
        }
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("policy", &self.policy)
            .field("trusted", &self.trusted)
            .field("max_redirects", &self.max_redirects)
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Sets the default authenticator used by [`Session::execute`].
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    /// Sets the retry policy of the underlying transport.
    #[must_use]
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Sets the domains that receive credentials across redirects.
    #[must_use]
    pub fn trusted_domains(mut self, trusted: TrustedDomains) -> Self {
        self.trusted = trusted;
        self
    }

    /// Overrides the redirect hop limit.
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Overrides the User-Agent header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-read timeout for response bodies.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Uses an existing cookie jar instead of a fresh one.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Build`] if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Session, SessionError> {
        let jar = self.jar.unwrap_or_default();
        let user_agent = self
            .user_agent
            .unwrap_or_else(user_agent::default_user_agent);

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .gzip(true)
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .build()
            .map_err(|source| SessionError::Build { source })?;

        let mut guard = RedirectGuard::new(self.trusted);
        if let Some(max_redirects) = self.max_redirects {
            guard = guard.with_max_redirects(max_redirects);
        }

        debug!(
            trusted = ?guard.trusted().domains(),
            max_redirects = guard.max_redirects(),
            "session built"
        );

        Ok(Session {
            transport: Transport::with_policy(client.clone(), self.policy),
            client,
            jar,
            authenticator: self.authenticator,
            guard,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Method;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::auth::{AuthError, AuthenticatorFn, BearerToken, HeaderAuth};
    use crate::http::NoRetry;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[test]
    fn test_cookie_names_reads_jar() {
        let session = Session::new().unwrap();
        let url: Url = "https://auth.asf.alaska.edu/".parse().unwrap();
        session
            .jar()
            .add_cookie_str("asf-urs=token; Path=/", &url);
        session.jar().add_cookie_str("other=1; Path=/", &url);

        let names = session.cookie_names(&url);
        assert!(names.contains(&"asf-urs".to_string()));
        assert!(names.contains(&"other".to_string()));
    }

    #[test]
    fn test_cookie_names_empty_for_unknown_host() {
        let session = Session::new().unwrap();
        let url: Url = "https://unknown.example/".parse().unwrap();
        assert!(session.cookie_names(&url).is_empty());
    }

    #[tokio::test]
    async fn test_execute_stamps_session_authenticator() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::builder()
            .authenticator(BearerToken::new("t0k"))
            .build()
            .unwrap();
        let request = Request::new(
            Method::GET,
            format!("{}/secure", server.uri()).parse().unwrap(),
        );
        let response = session
            .execute(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_stamping_failure_is_fatal_and_sends_nothing() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let session = Session::builder()
            .authenticator(HeaderAuth::new([("bad header", "x")]))
            .build()
            .unwrap();
        let request = Request::new(Method::GET, server.uri().parse().unwrap());
        let result = session.execute(request, &CancellationToken::new()).await;

        assert!(matches!(result, Err(SessionError::Authenticate { .. })));
    }

    #[tokio::test]
    async fn test_execute_as_overrides_default_authenticator() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/override"))
            .and(header_exists("x-custom"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::builder()
            .authenticator(BearerToken::new("default"))
            .retry_policy(NoRetry)
            .build()
            .unwrap();
        let custom = AuthenticatorFn::new(|request: &mut Request| {
            request.headers_mut().insert(
                "x-custom",
                reqwest::header::HeaderValue::from_static("yes"),
            );
            Ok::<(), AuthError>(())
        });
        let request = Request::new(
            Method::GET,
            format!("{}/override", server.uri()).parse().unwrap(),
        );
        let response = session
            .execute_as(request, &custom, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_hop_limit() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let session = Session::builder().max_redirects(3).build().unwrap();
        let request = Request::new(
            Method::GET,
            format!("{}/loop", server.uri()).parse().unwrap(),
        );
        let result = session.execute(request, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(SessionError::TooManyRedirects { limit: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_cookies_from_redirect_hops_are_stored() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/done")
                    .insert_header("Set-Cookie", "hop=1; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/done"))
            .and(header("cookie", "hop=1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new().unwrap();
        let request = Request::new(
            Method::GET,
            format!("{}/start", server.uri()).parse().unwrap(),
        );
        let response = session
            .execute(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let base: Url = format!("{}/", server.uri()).parse().unwrap();
        assert_eq!(session.cookie_names(&base), vec!["hop".to_string()]);
    }
}
