//! Error types for swimlane-core.

/// Result type alias for swimlane-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for swimlane-core operations.
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

    /// Shorthand for an unknown-field error with fuzzy suggestions attached.
    pub(crate) fn unknown_field(app: &str, field: &str, similar: Vec<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            app: app.to_string(),
            field: field.to_string(),
            similar,
        })
    }

    /// Shorthand for a validation failure against a record.
    pub(crate) fn validation(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation {
            record: record.into(),
            reason: reason.into(),
        })
    }

    /// Shorthand for an invalid argument to an adapter or resource method.
    pub(crate) fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue(message.into()))
    }

    /// The decoded Swimlane API error code, when the underlying failure was an
    /// HTTP 400 with an error envelope.
    pub fn api_error_code(&self) -> Option<i64> {
        match self.kind {
            ErrorKind::Transport(ref err) => err.api_error_code(),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A field name that does not exist on the app, with close matches.
    #[error("{}", unknown_field_message(app, field, similar))]
    UnknownField {
        /// App display name.
        app: String,
        /// The requested field name.
        field: String,
        /// Fuzzy-matched candidate field names, best first.
        similar: Vec<String>,
    },

    /// A value rejected by local field validation before any request was made.
    #[error("Validation failed for {record}. Reason: {reason}")]
    Validation {
        /// Display form of the record, e.g. `<Record: ACR-7>`.
        record: String,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// An argument that fails local checks (empty selector, bad revision
    /// number, conflicting selection).
    #[error("{0}")]
    InvalidValue(String),

    /// An operation not supported for the target (bulk modify of readonly
    /// fields, members of a user, and the like).
    #[error("{0}")]
    InvalidOperation(String),

    /// A named resource the server has no match for (app by name, user by
    /// display name).
    #[error("{0}")]
    NotFound(String),

    /// An ambiguous selector matching more than one resource.
    #[error("{0}")]
    Ambiguous(String),

    /// Transport or API failure from the session layer.
    #[error(transparent)]
    Transport(#[from] swimlane_client::Error),
}

fn unknown_field_message(app: &str, field: &str, similar: &[String]) -> String {
    if similar.is_empty() {
        format!("{} has no field \"{}\"", app, field)
    } else {
        format!(
            "{} has no field \"{}\". Similar fields: {}",
            app,
            field,
            similar
                .iter()
                .map(|s| format!("\"{}\"", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl From<swimlane_client::Error> for Error {
    fn from(err: swimlane_client::Error) -> Self {
        Error::new(ErrorKind::Transport(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message_with_suggestions() {
        let err = Error::unknown_field(
            "<App: Alerts>",
            "Severty",
            vec!["Severity".to_string(), "Severity Score".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "<App: Alerts> has no field \"Severty\". Similar fields: \"Severity\", \"Severity Score\""
        );
    }

    #[test]
    fn test_unknown_field_message_without_suggestions() {
        let err = Error::unknown_field("<App: Alerts>", "Nope", vec![]);
        assert_eq!(err.to_string(), "<App: Alerts> has no field \"Nope\"");
    }

    #[test]
    fn test_validation_message() {
        let err = Error::validation(
            "<Record: ACR - New>",
            "Required field \"Severity\" is not set",
        );
        assert_eq!(
            err.to_string(),
            "Validation failed for <Record: ACR - New>. Reason: Required field \"Severity\" is not set"
        );
    }

    #[test]
    fn test_api_error_code_passthrough() {
        let inner = swimlane_client::Error::new(swimlane_client::ErrorKind::BadRequest {
            code: 3002,
            name: "RecordNotFound",
            argument: None,
            url: "http://host/api/app/a/record/r".to_string(),
        });
        let err: Error = inner.into();
        assert_eq!(err.api_error_code(), Some(3002));

        let err = Error::invalid_value("bad");
        assert_eq!(err.api_error_code(), None);
    }
}
