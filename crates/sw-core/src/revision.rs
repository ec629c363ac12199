//! Historical revisions of app schemas and records.
//!
//! Revisions come back newest-first. A record revision's snapshot is
//! materialized against the app schema it was saved under, not the current
//! one, so renamed or deleted fields hydrate correctly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use swimlane_client::Session;

use crate::app::App;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::usergroup::UserGroupSelection;

/// An immutable snapshot of an app's schema.
#[derive(Debug, Clone)]
pub struct AppRevision {
    pub revision_number: u64,
    /// `current` or `historical`.
    pub status: String,
    pub modified: Option<DateTime<Utc>>,
    pub user: Option<UserGroupSelection>,
    /// The schema as of this revision.
    pub version: Arc<App>,
}

impl AppRevision {
    fn from_raw(raw: &Value) -> Result<Self> {
        let version = raw.get("version").cloned().ok_or_else(|| {
            Error::invalid_value("App revision document missing version snapshot")
        })?;
        Ok(Self {
            revision_number: revision_number_of(raw),
            status: status_of(raw),
            modified: modified_of(raw),
            user: raw.get("user").and_then(UserGroupSelection::from_wire),
            version: Arc::new(App::from_raw(version)?),
        })
    }
}

impl std::fmt::Display for AppRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<AppRevision: {} ({})>", self.version.name, self.revision_number)
    }
}

/// An immutable snapshot of a record.
#[derive(Debug, Clone)]
pub struct RecordRevision {
    pub revision_number: u64,
    pub status: String,
    pub modified: Option<DateTime<Utc>>,
    pub user: Option<UserGroupSelection>,
    app_id: String,
    raw_version: Value,
}

impl RecordRevision {
    fn from_raw(app_id: &str, raw: &Value) -> Result<Self> {
        let raw_version = raw.get("version").cloned().ok_or_else(|| {
            Error::invalid_value("Record revision document missing version snapshot")
        })?;
        Ok(Self {
            revision_number: revision_number_of(raw),
            status: status_of(raw),
            modified: modified_of(raw),
            user: raw.get("user").and_then(UserGroupSelection::from_wire),
            app_id: app_id.to_string(),
            raw_version,
        })
    }

    /// App-revision number the snapshot was saved under.
    pub fn app_revision_number(&self) -> Option<u64> {
        self.raw_version
            .get("applicationRevision")
            .and_then(Value::as_f64)
            .map(|n| n as u64)
    }

    /// Fetch the matching app revision (the historical schema).
    pub async fn app_version(&self, session: &Session) -> Result<AppRevision> {
        let number = self.app_revision_number().ok_or_else(|| {
            Error::invalid_value("Record snapshot does not carry an app revision number")
        })?;
        app_revision(session, &self.app_id, number as f64).await
    }

    /// Materialize the snapshot record using its historical schema.
    pub async fn version(&self, session: &Session) -> Result<Record> {
        let app_revision = self.app_version(session).await?;
        Record::from_raw(
            session.clone(),
            Arc::clone(&app_revision.version),
            self.raw_version.clone(),
        )
    }
}

impl std::fmt::Display for RecordRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<RecordRevision: {}>", self.revision_number)
    }
}

fn revision_number_of(raw: &Value) -> u64 {
    raw.get("revisionNumber")
        .and_then(Value::as_f64)
        .map(|n| n as u64)
        .unwrap_or(0)
}

fn status_of(raw: &Value) -> String {
    raw.get("status")
        .and_then(Value::as_str)
        .unwrap_or("historical")
        .to_string()
}

fn modified_of(raw: &Value) -> Option<DateTime<Utc>> {
    raw.get("modifiedDate")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Validate a caller-supplied revision number. Floats with a zero fractional
/// part are accepted.
pub(crate) fn validate_revision_number(number: f64) -> Result<u64> {
    if number > 0.0 && number.fract() == 0.0 {
        Ok(number as u64)
    } else {
        Err(Error::invalid_value(
            "The revision number must be a positive whole number greater than 0",
        ))
    }
}

/// All revisions of an app's schema, newest first.
pub(crate) async fn app_revisions(session: &Session, app_id: &str) -> Result<Vec<AppRevision>> {
    let raw: Vec<Value> = session
        .get_json(&format!("app/{}/history", app_id))
        .await?;
    raw.iter().map(AppRevision::from_raw).collect()
}

/// One app-schema revision.
pub(crate) async fn app_revision(
    session: &Session,
    app_id: &str,
    number: f64,
) -> Result<AppRevision> {
    let number = validate_revision_number(number)?;
    let raw: Value = session
        .get_json(&format!("app/{}/history/{}", app_id, number))
        .await?;
    AppRevision::from_raw(&raw)
}

/// All revisions of a record, newest first.
pub(crate) async fn record_revisions(
    session: &Session,
    app_id: &str,
    record_id: &str,
) -> Result<Vec<RecordRevision>> {
    let raw: Vec<Value> = session
        .get_json(&format!("app/{}/record/{}/history", app_id, record_id))
        .await?;
    raw.iter()
        .map(|r| RecordRevision::from_raw(app_id, r))
        .collect()
}

/// One record revision.
pub(crate) async fn record_revision(
    session: &Session,
    app_id: &str,
    record_id: &str,
    number: f64,
) -> Result<RecordRevision> {
    let number = validate_revision_number(number)?;
    let raw: Value = session
        .get_json(&format!(
            "app/{}/record/{}/history/{}",
            app_id, record_id, number
        ))
        .await?;
    RecordRevision::from_raw(app_id, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swimlane_client::{ClientConfig, Credentials};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_revision_number_validation() {
        assert_eq!(validate_revision_number(3.0).unwrap(), 3);
        for bad in [0.0, -1.0, 2.5] {
            let err = validate_revision_number(bad).unwrap_err();
            assert_eq!(
                err.to_string(),
                "The revision number must be a positive whole number greater than 0"
            );
        }
    }

    fn app_revision_raw(number: u64) -> Value {
        let mut app = crate::app::tests::sample_app_raw();
        app["revision"] = json!(number);
        json!({
            "revisionNumber": number as f64,
            "status": if number == 5 { "current" } else { "historical" },
            "modifiedDate": "2024-05-01T12:00:00+00:00",
            "user": {"id": "u1", "name": "Admin"},
            "version": app,
        })
    }

    #[tokio::test]
    async fn test_record_revision_uses_historical_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/app/aZx/record/r1/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "revisionNumber": 2.0,
                    "status": "current",
                    "version": {
                        "id": "r1", "trackingId": "ACR-1", "applicationId": "aZx",
                        "applicationRevision": 5.0,
                        "values": {"fid-text": "new"},
                    },
                },
                {
                    "revisionNumber": 1.0,
                    "version": {
                        "id": "r1", "trackingId": "ACR-1", "applicationId": "aZx",
                        "applicationRevision": 3.0,
                        "values": {"fid-text": "old"},
                    },
                },
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/app/aZx/history/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(app_revision_raw(3)))
            .mount(&server)
            .await;

        let session = Session::with_config(
            server.uri(),
            Credentials::new("admin", "secret"),
            ClientConfig::builder().without_retry().build(),
        )
        .await
        .unwrap();

        let revisions = record_revisions(&session, "aZx", "r1").await.unwrap();
        assert_eq!(revisions.len(), 2);
        // Newest first
        assert_eq!(revisions[0].revision_number, 2);

        let earliest = &revisions[1];
        assert_eq!(earliest.app_revision_number(), Some(3));

        let app_version = earliest.app_version(&session).await.unwrap();
        assert_eq!(app_version.revision_number, 3);

        let record = earliest.version(&session).await.unwrap();
        assert_eq!(
            record.get("Text").unwrap(),
            Some(&crate::fields::FieldValue::Text("old".to_string()))
        );
    }
}
