//! Authentication: credential stamping, sessions, redirects and SSO.
//!
//! - [`Authenticator`] - single-method strategy that stamps a request
//!   ([`BearerToken`], [`BasicAuth`], [`HeaderAuth`], [`NoAuth`], or a
//!   closure via [`AuthenticatorFn`])
//! - [`Session`] - cookie jar + authenticator + retrying transport
//! - [`RedirectGuard`] - decides which redirect hops may carry credentials
//! - [`SsoLogin`] - one-time cookie acquisition from the identity provider

mod authenticator;
mod error;
mod redirect;
mod session;
mod sso;

pub use authenticator::{
    Authenticator, AuthenticatorFn, BasicAuth, BearerToken, HeaderAuth, NoAuth,
};
pub use error::{AuthError, SessionError, SsoError};
pub use redirect::{
    DEFAULT_TRUSTED_DOMAINS, MAX_REDIRECTS, RedirectGuard, TrustedDomains, is_followed_redirect,
    switches_to_get,
};
pub use session::{CONNECT_TIMEOUT, READ_TIMEOUT, Session, SessionBuilder};
pub use sso::{
    ASF_AUTH_HOST, AUTH_COOKIE_NAMES, AUTH_REDIRECT, EDL_CLIENT_ID, SsoLogin, SsoSettings,
    URS_HOST, authorize_url,
};
