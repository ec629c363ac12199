//! Error types for swimlane-client.

use std::time::Duration;

/// Result type alias for swimlane-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for swimlane-client operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimited { .. })
    }

    /// Returns true if this is an authentication error (HTTP 401).
    pub fn is_auth_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication(_))
    }

    /// Returns the decoded API error code for an HTTP 400 response, if any.
    pub fn api_error_code(&self) -> Option<i64> {
        match self.kind {
            ErrorKind::BadRequest { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            ErrorKind::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// HTTP request failed with a status the API error decoder does not cover.
    #[error("HTTP error: {status} {message}")]
    Http { status: u16, message: String },

    /// HTTP 400 with a decoded Swimlane error envelope.
    #[error("{}", bad_request_message(*code, name, argument.as_deref(), url))]
    BadRequest {
        /// Numeric error code from the response body.
        code: i64,
        /// Symbolic name resolved from the fixed code table.
        name: &'static str,
        /// Optional argument string from the response body.
        argument: Option<String>,
        /// The request URL.
        url: String,
    },

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Authentication error (HTTP 401).
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authorization error (HTTP 403).
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server product version outside the range required by an operation.
    #[error("Swimlane product version {actual} does not meet requirement {required}")]
    ProductVersion { required: String, actual: String },

    /// Server build version outside the range required by an operation.
    #[error("Swimlane build version {actual} does not meet requirement {required}")]
    BuildVersion { required: String, actual: String },

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// All retries exhausted.
    #[error("All {attempts} retry attempts exhausted")]
    RetriesExhausted { attempts: u32 },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ErrorKind {
    /// Returns true if this error kind is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::RateLimited { .. } => true,
            ErrorKind::Timeout => true,
            ErrorKind::Connection(_) => true,
            ErrorKind::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is typically retryable.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Format the message for a decoded HTTP 400 error.
///
/// `RecordNotFound:3002: Bad Request for url: http://host/api/...` or, with an
/// argument, `RecordNotFound:3002 (tracking-id): Bad Request for url: ...`.
fn bad_request_message(code: i64, name: &str, argument: Option<&str>, url: &str) -> String {
    match argument {
        Some(arg) => format!("{}:{} ({}): Bad Request for url: {}", name, code, arg, url),
        None => format!("{}:{}: Bad Request for url: {}", name, code, url),
    }
}

/// Resolve a numeric Swimlane error code to its symbolic name.
///
/// Unknown codes map to `"Unknown"`.
pub fn error_code_name(code: i64) -> &'static str {
    match code {
        1000 => "InsufficientPermissions",
        1001 => "NotAuthorized",
        1002 => "InvalidUserNameOrPassword",
        1003 => "PasswordExpired",
        1004 => "DuplicateUserName",
        1005 => "InvalidClientSecret",
        1006 => "IdInUse",
        1007 => "DomainNotAllowed",
        1051 => "InvalidLicense",
        2000 => "AppNotFound",
        2001 => "DuplicateAppName",
        2002 => "DuplicateAppAcronym",
        2003 => "DuplicateFieldName",
        3000 => "InvalidRecord",
        3001 => "RecordIdConflict",
        3002 => "RecordNotFound",
        3003 => "TrackingIdNotFound",
        4000 => "GroupNotFound",
        4001 => "UserNotFound",
        4002 => "DuplicateGroupName",
        5000 => "InvalidFilter",
        5001 => "ReportNotFound",
        5007 => "FieldNotFound",
        5008 => "ModelValidationError",
        5009 => "TaskNotFound",
        5010 => "RequiredFieldMissing",
        5011 => "ReadOnlyFieldModified",
        6000 => "AttachmentNotFound",
        7000 => "JobNotFound",
        _ => "Unknown",
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            ErrorKind::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ErrorKind::Other(err.to_string())
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::Config(format!("Invalid URL: {}", err)), err)
    }
}
