//! Credentials and token lifecycle.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Re-authenticate when the token is within this guard of expiry.
pub(crate) const EXPIRY_GUARD: Duration = Duration::from_secs(30);

/// Username/password credentials, with an optional authentication domain.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("domain", &self.domain)
            .finish()
    }
}

impl Credentials {
    /// Create credentials without a domain.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    /// Set the authentication domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// The login request body.
    pub(crate) fn login_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "userName": self.username,
            "password": self.password,
        });
        if let Some(ref domain) = self.domain {
            body["domain"] = serde_json::json!(domain);
        }
        body
    }
}

/// Wire shape of the login response. Older servers omit the token and set a
/// session cookie instead.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// How the session authenticates outbound requests.
#[derive(Debug, Clone)]
pub(crate) enum AuthScheme {
    /// Bearer token from the login response.
    Bearer(String),
    /// Session cookies from a legacy server, pre-joined for the Cookie header.
    Cookie(String),
}

/// Current authentication state of a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct AuthState {
    pub scheme: Option<AuthScheme>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthState {
    pub fn authenticated(scheme: AuthScheme, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            scheme: Some(scheme),
            expires_at,
        }
    }

    /// True when a login (or re-login) is needed before dispatching.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.scheme, self.expires_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(expires_at)) => {
                now + chrono::Duration::from_std(EXPIRY_GUARD).unwrap_or_default() >= expires_at
            }
        }
    }
}

/// Read the `exp` claim from a JWT without verifying the signature. The
/// session only uses this to schedule proactive re-authentication; trust in
/// the token's contents stays with the server.
pub(crate) fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;

    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
