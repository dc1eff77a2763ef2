//! Cookie-based single sign-on against the Earthdata Login identity provider.
//!
//! Protected data hosts do not accept per-request credentials; they expect a
//! session cookie minted by the identity provider. [`SsoLogin::ensure_login`]
//! checks the session's jar for any recognized cookie and, if none is
//! present, performs one GET against the authorization endpoint with basic
//! credentials. The identity provider answers with a redirect chain that
//! sets the cookies; success is judged purely by their presence afterwards.
//!
//! The cookie jar is the only login state. Two downloads racing the first
//! login may both run the login request; the second one is redundant but
//! harmless, since logging in while already logged in just refreshes the
//! cookies.

use reqwest::{Method, Request};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::authenticator::BasicAuth;
use super::error::SsoError;
use super::session::Session;

/// OAuth client id registered for ASF data downloads.
pub const EDL_CLIENT_ID: &str = "BO_n7nTIlMljdvU6kRRB3g";

/// Earthdata Login identity host.
pub const URS_HOST: &str = "urs.earthdata.nasa.gov";

/// ASF authentication host.
pub const ASF_AUTH_HOST: &str = "auth.asf.alaska.edu";

/// Callback the identity provider redirects to after login.
pub const AUTH_REDIRECT: &str = "https://auth.asf.alaska.edu/login";

/// Cookie names that mark an authenticated session.
pub const AUTH_COOKIE_NAMES: [&str; 4] = [
    "urs_user_already_logged",
    "uat_urs_user_already_logged",
    "asf-urs",
    "urs-access-token",
];

/// Endpoints and cookie names used by the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoSettings {
    /// Authorization endpoint requested with basic credentials.
    pub authorize_url: String,
    /// URLs whose cookies are inspected for a session marker.
    pub cookie_urls: Vec<String>,
    /// Cookie names that count as a session marker.
    pub cookie_names: Vec<String>,
}

impl Default for SsoSettings {
    fn default() -> Self {
        Self {
            authorize_url: authorize_url(URS_HOST, EDL_CLIENT_ID, AUTH_REDIRECT),
            cookie_urls: vec![format!("https://{URS_HOST}/"), format!("https://{ASF_AUTH_HOST}/")],
            cookie_names: AUTH_COOKIE_NAMES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Builds an OAuth authorization URL for the code flow.
#[must_use]
pub fn authorize_url(identity_host: &str, client_id: &str, redirect_uri: &str) -> String {
    format!(
        "https://{identity_host}/oauth/authorize?client_id={client_id}&response_type=code&redirect_uri={}",
        urlencoding::encode(redirect_uri)
    )
}

/// Lazily acquires SSO cookies for a [`Session`].
#[derive(Debug, Clone)]
pub struct SsoLogin {
    settings: SsoSettings,
    credentials: BasicAuth,
}

impl SsoLogin {
    /// Creates a login flow for the given credentials.
    #[must_use]
    pub fn new(settings: SsoSettings, credentials: BasicAuth) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    /// Returns the endpoint configuration.
    #[must_use]
    pub fn settings(&self) -> &SsoSettings {
        &self.settings
    }

    /// Returns the credentials presented at the login step.
    #[must_use]
    pub fn credentials(&self) -> &BasicAuth {
        &self.credentials
    }

    /// Returns true if the session's jar holds any recognized session cookie.
    #[must_use]
    pub fn has_auth_cookies(&self, session: &Session) -> bool {
        self.settings
            .cookie_urls
            .iter()
            .filter_map(|raw| Url::parse(raw).ok())
            .any(|url| {
                session
                    .cookie_names(&url)
                    .iter()
                    .any(|name| self.settings.cookie_names.contains(name))
            })
    }

    /// Makes sure the session is logged in, performing the login if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Request`] if the login request fails (including
    /// cancellation) and [`SsoError::MissingCookies`] if it completes without
    /// producing a recognized cookie.
    #[instrument(skip(self, session, cancel), fields(username = %self.credentials.username()))]
    pub async fn ensure_login(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<(), SsoError> {
        if self.has_auth_cookies(session) {
            debug!("SSO cookies already present");
            return Ok(());
        }

        let url = Url::parse(&self.settings.authorize_url).map_err(|_| SsoError::InvalidUrl {
            url: self.settings.authorize_url.clone(),
        })?;
        info!(host = url.host_str().unwrap_or_default(), "logging in via SSO");

        let response = session
            .execute_as(Request::new(Method::GET, url), &self.credentials, cancel)
            .await
            .map_err(|source| SsoError::Request { source })?;
        debug!(status = response.status().as_u16(), "SSO login finished");
        drop(response);

        if self.has_auth_cookies(session) {
            info!("SSO login succeeded");
            Ok(())
        } else {
            Err(SsoError::MissingCookies {
                url: self.settings.authorize_url.clone(),
            })
        }
    }
}
