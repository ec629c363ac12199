//! Authenticated Swimlane session.
//!
//! [`Session`] combines credentials with HTTP infrastructure and provides
//! typed JSON methods for API requests. It owns the token lifecycle: login on
//! connect, proactive re-login near expiry, and a single replay after an
//! observed 401. Cloning a session is cheap and all clones share one token.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::auth::{token_expiry, AuthScheme, AuthState, Credentials, LoginResponse};
use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::http::HttpClient;
use crate::request::{MultipartFile, RequestBuilder, RequestMethod};
use crate::response::Response;
use crate::version::ServerVersion;

/// Server settings returned by `GET /settings`, fetched lazily once per
/// session.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Raw `apiVersion` string.
    pub api_version: String,
    /// The full settings document.
    pub raw: serde_json::Value,
}

impl ServerSettings {
    fn from_raw(raw: serde_json::Value) -> Result<Self> {
        let api_version = raw
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::new(ErrorKind::Json(
                    "settings response missing apiVersion".to_string(),
                ))
            })?
            .to_string();
        Ok(Self { api_version, raw })
    }
}

struct SessionInner {
    http: HttpClient,
    base_url: String,
    credentials: Credentials,
    auth: Mutex<AuthState>,
    settings: tokio::sync::OnceCell<ServerSettings>,
}

/// Authenticated Swimlane API session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url)
            .field("username", &self.inner.credentials.username)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect to a Swimlane server and log in with the given credentials.
    #[instrument(skip(credentials), fields(username = %credentials.username))]
    pub async fn connect(base_url: impl Into<String> + std::fmt::Debug, credentials: Credentials) -> Result<Self> {
        Self::with_config(base_url, credentials, ClientConfig::default()).await
    }

    /// Connect with custom HTTP configuration.
    pub async fn with_config(
        base_url: impl Into<String> + std::fmt::Debug,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let base_url = base_url.into();
        // Validate early so bad hosts fail at connect, not on first call
        url::Url::parse(&base_url)?;

        let http = HttpClient::new(config)?;
        let session = Self {
            inner: Arc::new(SessionInner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                credentials,
                auth: Mutex::new(AuthState::default()),
                settings: tokio::sync::OnceCell::new(),
            }),
        };

        session.login().await?;
        Ok(session)
    }

    /// The server base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        self.inner.http.config()
    }

    /// Build the full URL for an API path, prepending `/api/` when absent.
    pub fn api_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.starts_with("api/") || path == "api" {
            format!("{}/{}", self.inner.base_url, path)
        } else {
            format!("{}/api/{}", self.inner.base_url, path)
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Exchange credentials for a token (or legacy session cookies).
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<()> {
        let request = RequestBuilder::new(RequestMethod::Post, self.api_url("user/login"))
            .json(&self.inner.credentials.login_body())?;

        let response = self.inner.http.execute(request).await?;
        let response = response.check_api_error().await?;

        let cookies = response.cookies();
        let login: LoginResponse = response.json().await?;

        let state = match login.token {
            Some(token) => {
                let expires_at = token_expiry(&token);
                AuthState::authenticated(AuthScheme::Bearer(token), expires_at)
            }
            None if !cookies.is_empty() => {
                let joined = cookies
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect::<Vec<_>>()
                    .join("; ");
                AuthState::authenticated(AuthScheme::Cookie(joined), None)
            }
            None => {
                return Err(Error::new(ErrorKind::Authentication(
                    "login response carried neither token nor cookies".to_string(),
                )))
            }
        };

        *self.inner.auth.lock().unwrap_or_else(|e| e.into_inner()) = state;
        debug!("Authenticated");
        Ok(())
    }

    /// Re-login when the token is missing or inside the expiry guard.
    async fn ensure_authenticated(&self) -> Result<()> {
        let needs_refresh = {
            let auth = self.inner.auth.lock().unwrap_or_else(|e| e.into_inner());
            auth.needs_refresh(Utc::now())
        };
        if needs_refresh {
            self.login().await?;
        }
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let auth = self.inner.auth.lock().unwrap_or_else(|e| e.into_inner());
        match auth.scheme {
            Some(AuthScheme::Bearer(ref token)) => request.bearer_auth(token.clone()),
            Some(AuthScheme::Cookie(ref cookies)) => request.header("Cookie", cookies.clone()),
            None => request,
        }
    }

    // =========================================================================
    // Request dispatch
    // =========================================================================

    /// Execute a request with auth injection, one 401 replay, and API error
    /// decoding.
    pub async fn request(&self, request: RequestBuilder) -> Result<Response> {
        self.ensure_authenticated().await?;

        let response = self.inner.http.execute(self.authorize(request.clone())).await?;

        let response = if response.status() == 401 {
            debug!("Token rejected mid-session, re-authenticating");
            self.login().await?;
            self.inner.http.execute(self.authorize(request)).await?
        } else {
            response
        };

        response.check_api_error().await
    }

    /// Create a GET request builder for an API path.
    pub fn get(&self, path: &str) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Get, self.api_url(path))
    }

    /// Create a POST request builder for an API path.
    pub fn post(&self, path: &str) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Post, self.api_url(path))
    }

    /// Create a PUT request builder for an API path.
    pub fn put(&self, path: &str) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Put, self.api_url(path))
    }

    /// Create a PATCH request builder for an API path.
    pub fn patch(&self, path: &str) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Patch, self.api_url(path))
    }

    /// Create a DELETE request builder for an API path.
    pub fn delete_builder(&self, path: &str) -> RequestBuilder {
        RequestBuilder::new(RequestMethod::Delete, self.api_url(path))
    }

    // =========================================================================
    // Typed JSON methods
    // =========================================================================

    /// GET with JSON response deserialization.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(self.get(path)).await?;
        response.json().await
    }

    /// GET returning the raw response (for 204 probes and streaming).
    pub async fn get_raw(&self, path: &str) -> Result<Response> {
        self.request(self.get(path)).await
    }

    /// GET with JSON response, carrying query parameters.
    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let mut request = self.get(path);
        for (name, value) in params {
            request = request.query(*name, *value);
        }
        let response = self.request(request).await?;
        response.json().await
    }

    /// GET raw bytes (attachment download).
    pub async fn get_bytes(&self, path: &str) -> Result<bytes::Bytes> {
        let response = self.request(self.get(path)).await?;
        response.bytes().await
    }

    /// POST with JSON body and response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.post(path).json(body)?;
        let response = self.request(request).await?;
        response.json().await
    }

    /// PUT with JSON body and response.
    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.put(path).json(body)?;
        let response = self.request(request).await?;
        response.json().await
    }

    /// PATCH with JSON body, ignoring the response body.
    pub async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let request = self.patch(path).json(body)?;
        self.request(request).await?;
        Ok(())
    }

    /// DELETE, ignoring the response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(self.delete_builder(path)).await?;
        Ok(())
    }

    /// DELETE with JSON body and response (batch endpoints).
    pub async fn delete_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.delete_builder(path).json(body)?;
        let response = self.request(request).await?;
        response.json().await
    }

    /// POST a multipart file upload with JSON response.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        files: Vec<MultipartFile>,
    ) -> Result<T> {
        let request = self.post(path).multipart(files);
        let response = self.request(request).await?;
        response.json().await
    }

    // =========================================================================
    // Settings and version gating
    // =========================================================================

    /// Server settings, fetched once per session lifetime.
    pub async fn settings(&self) -> Result<&ServerSettings> {
        self.inner
            .settings
            .get_or_try_init(|| async {
                let raw: serde_json::Value = self.get_json("settings").await?;
                ServerSettings::from_raw(raw)
            })
            .await
    }

    /// Decoded server version.
    pub async fn version(&self) -> Result<ServerVersion> {
        let settings = self.settings().await?;
        Ok(ServerVersion::parse(&settings.api_version))
    }

    /// Gate an operation on the server product version (inclusive range).
    /// Fails before any further request when outside the range.
    pub async fn require_product_version(
        &self,
        min: Option<&str>,
        max: Option<&str>,
    ) -> Result<()> {
        self.version().await?.require_product(min, max)
    }

    /// Gate an operation on the server build version (inclusive range).
    pub async fn require_build_version(&self, min: Option<&str>, max: Option<&str>) -> Result<()> {
        self.version().await?.require_build(min, max)
    }
}
