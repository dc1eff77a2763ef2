//! Pluggable credential stamping for outgoing requests.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

use super::error::AuthError;

/// Mutates an outgoing request so it carries credentials.
///
/// Implementations must be cheap and side-effect free apart from the request
/// they are given; a [`Session`](super::Session) calls them once per request
/// before anything is sent.
pub trait Authenticator: Send + Sync {
    /// Stamps `request` with credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the credentials cannot be encoded. The
    /// session treats this as fatal and does not send the request.
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError>;
}

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authenticate(&self, _request: &mut Request) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Sets `Authorization: Bearer <token>`; does nothing when the token is empty.
#[derive(Clone, Default)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    /// Wraps a bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Returns true when no token is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &redacted(&self.token))
            .finish()
    }
}

impl Authenticator for BearerToken {
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        if self.token.is_empty() {
            return Ok(());
        }
        let value = sensitive_value(AUTHORIZATION.as_str(), &format!("Bearer {}", self.token))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// HTTP basic credentials; always sets the `Authorization` header.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    /// Creates basic credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Encodes the credentials as an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidHeaderValue`] if the encoded value is not a
    /// valid header (cannot happen for base64 output, kept for symmetry).
    pub fn header_value(&self) -> Result<HeaderValue, AuthError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        sensitive_value(AUTHORIZATION.as_str(), &format!("Basic {encoded}"))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        let value = self.header_value()?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Sets a fixed map of headers on every request. Empty values are skipped.
#[derive(Debug, Clone, Default)]
pub struct HeaderAuth {
    headers: Vec<(String, String)>,
}

impl HeaderAuth {
    /// Creates a header authenticator from name/value pairs.
    #[must_use]
    pub fn new<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl Authenticator for HeaderAuth {
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        for (name, value) in &self.headers {
            if value.is_empty() {
                continue;
            }
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| AuthError::InvalidHeaderName {
                    name: name.clone(),
                })?;
            let header_value = sensitive_value(name, value)?;
            request.headers_mut().insert(header_name, header_value);
        }
        Ok(())
    }
}

/// Adapts a closure into an [`Authenticator`].
///
/// ```
/// use reqwest::header::HeaderValue;
/// use sarfetch_core::auth::{Authenticator, AuthenticatorFn};
///
/// let auth = AuthenticatorFn::new(|request: &mut reqwest::Request| {
///     request
///         .headers_mut()
///         .insert("x-api-key", HeaderValue::from_static("secret"));
///     Ok(())
/// });
/// let mut request = reqwest::Request::new(
///     reqwest::Method::GET,
///     "https://example.com".parse().unwrap(),
/// );
/// auth.authenticate(&mut request).unwrap();
/// assert!(request.headers().contains_key("x-api-key"));
/// ```
pub struct AuthenticatorFn<F> {
    func: F,
}

impl<F> AuthenticatorFn<F>
where
    F: Fn(&mut Request) -> Result<(), AuthError> + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for AuthenticatorFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthenticatorFn")
    }
}

impl<F> Authenticator for AuthenticatorFn<F>
where
    F: Fn(&mut Request) -> Result<(), AuthError> + Send + Sync,
{
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        (self.func)(request)
    }
}

fn sensitive_value(name: &str, value: &str) -> Result<HeaderValue, AuthError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeaderValue {
        name: name.to_string(),
    })?;
    header.set_sensitive(true);
    Ok(header)
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}
