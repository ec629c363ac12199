//! Core HTTP client infrastructure for the Swimlane API.
//!
//! This crate provides the transport layer shared by all higher-level
//! Swimlane functionality:
//!
//! - [`Session`] - authenticated session with token lifecycle and API error
//!   decoding
//! - [`HttpClient`] - HTTP execution with retry and backoff
//! - [`ClientConfig`] - timeouts, TLS, retry, and cache configuration
//! - [`ServerVersion`] - server version parsing and gating
//! - [`Error`] / [`ErrorKind`] - the transport error taxonomy
//!
//! # Layering
//!
//! ```text
//! Session            login, token refresh, 401 replay, error envelope
//!   └── HttpClient   retry loop, backoff, multipart encoding
//!         └── reqwest connection pooling, TLS
//! ```
//!
//! # Example
//!
//! ```no_run
//! use swimlane_client::{Credentials, Session};
//!
//! # async fn example() -> swimlane_client::Result<()> {
//! let session = Session::connect(
//!     "https://swimlane.example.com",
//!     Credentials::new("admin", "secret"),
//! )
//! .await?;
//!
//! let apps: Vec<serde_json::Value> = session.get_json("app").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod retry;
pub mod session;
pub mod version;

pub use auth::Credentials;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{error_code_name, Error, ErrorKind, Result};
pub use http::HttpClient;
pub use request::{MultipartFile, RequestBody, RequestBuilder, RequestMethod};
pub use response::Response;
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};
pub use session::{ServerSettings, Session};
pub use version::{compare_versions, ServerVersion};

/// Default User-Agent header value.
pub const USER_AGENT: &str = concat!("swimlane-rs/", env!("CARGO_PKG_VERSION"));
