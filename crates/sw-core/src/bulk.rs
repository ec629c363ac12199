//! Bulk record operations: batch create, and filter- or id-scoped delete and
//! modify with a small operator vocabulary. Delete and modify return a job id
//! that callers poll through the helpers.

use std::sync::Arc;

use serde_json::{json, Value};
use swimlane_client::Session;
use tracing::instrument;

use crate::app::App;
use crate::error::{Error, ErrorKind, Result};
use crate::fields::{Field, FieldValue};
use crate::record::Record;
use crate::report::FilterOperand;

/// Record fields maintained by the server; bulk modify refuses them.
const SYSTEM_FIELD_NAMES: [&str; 4] = [
    "First Created",
    "Last Updated",
    "Created by",
    "Last updated by",
];

/// One bulk-modify operation on a field.
#[derive(Debug, Clone)]
pub enum BulkModification {
    /// Replace the field's value.
    Replace(FieldValue),
    /// Unset the field.
    Clear,
    /// Append to a multi-valued field.
    Append(FieldValue),
    /// Remove from a multi-valued field.
    Remove(FieldValue),
}

impl BulkModification {
    /// The operation's wire tag.
    pub fn wire_type(&self) -> &'static str {
        match self {
            BulkModification::Replace(_) => "create",
            BulkModification::Clear => "delete",
            BulkModification::Append(_) => "append",
            BulkModification::Remove(_) => "subtract",
        }
    }

    fn value(&self) -> Option<&FieldValue> {
        match self {
            BulkModification::Replace(v)
            | BulkModification::Append(v)
            | BulkModification::Remove(v) => Some(v),
            BulkModification::Clear => None,
        }
    }
}

/// One structured filter of a bulk selection.
#[derive(Debug, Clone)]
pub struct BulkFilter {
    pub field_name: String,
    pub operand: FilterOperand,
    pub value: FieldValue,
}

impl BulkFilter {
    pub fn new(
        field_name: impl Into<String>,
        operand: FilterOperand,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            operand,
            value: value.into(),
        }
    }
}

/// What a bulk delete or modify targets. Filters and explicit records cannot
/// be mixed; the two arms make that unrepresentable.
#[derive(Debug, Clone)]
pub enum BulkSelection {
    Filters(Vec<BulkFilter>),
    /// Record ids; see [`BulkSelection::from_records`] for building from
    /// materialized records.
    Records(Vec<String>),
}

impl BulkSelection {
    /// Build an id selection from saved records.
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id().ok_or_else(|| {
                Error::new(ErrorKind::InvalidOperation(
                    "Bulk operations require saved records".to_string(),
                ))
            })?;
            ids.push(id.to_string());
        }
        Ok(BulkSelection::Records(ids))
    }

    /// Render the selection into the batch body.
    fn apply(&self, app: &App, body: &mut Value) -> Result<()> {
        match self {
            BulkSelection::Filters(filters) => {
                let mut rendered = Vec::with_capacity(filters.len());
                for filter in filters {
                    let def = app.field_by_name(&filter.field_name)?;
                    let projected = Field::new(Arc::clone(def))
                        .report_projection(filter.value.clone())
                        .map_err(|err| Error::new(ErrorKind::InvalidValue(err.0)))?;
                    rendered.push(json!({
                        "fieldId": def.id,
                        "filterType": filter.operand.as_str(),
                        "value": projected,
                    }));
                }
                body["filters"] = json!(rendered);
            }
            BulkSelection::Records(ids) => {
                body["recordIds"] = json!(ids);
            }
        }
        Ok(())
    }
}

/// Batch-create records from field-name/value maps, returning the new record
/// ids in order.
#[instrument(skip(session, app, value_maps), fields(app = %app.name, count = value_maps.len()))]
pub(crate) async fn bulk_create(
    session: &Session,
    app: &Arc<App>,
    value_maps: Vec<Vec<(String, FieldValue)>>,
) -> Result<Vec<String>> {
    let mut bodies = Vec::with_capacity(value_maps.len());
    for values in value_maps {
        let mut record = Record::new_stub(session.clone(), Arc::clone(app))?;
        for (name, value) in values {
            record.set(&name, value).await?;
        }
        record.validate()?;
        bodies.push(record.raw().clone());
    }

    let ids: Vec<String> = session
        .post_json(&format!("app/{}/record/batch", app.id), &bodies)
        .await?;
    Ok(ids)
}

/// Delete the selected records, returning the async job id.
#[instrument(skip(session, app, selection), fields(app = %app.name))]
pub(crate) async fn bulk_delete(
    session: &Session,
    app: &App,
    selection: &BulkSelection,
) -> Result<String> {
    let mut body = json!({});
    selection.apply(app, &mut body)?;

    let job_id: String = session
        .delete_json(&format!("app/{}/record/batch", app.id), &body)
        .await?;
    Ok(job_id)
}

/// Modify the selected records, returning the async job id.
#[instrument(skip(session, app, selection, values), fields(app = %app.name))]
pub(crate) async fn bulk_modify(
    session: &Session,
    app: &App,
    selection: &BulkSelection,
    values: &[(String, BulkModification)],
) -> Result<String> {
    let mut modifications = Vec::with_capacity(values.len());
    for (field_name, modification) in values {
        let def = app.field_by_name(field_name)?;

        if def.field_type.forbids_bulk_modify() {
            return Err(Error::invalid_value(format!(
                "Field '{}' of Type '{}', is not supported for bulk modify.",
                def.name,
                def.field_type.class_name()
            )));
        }
        if SYSTEM_FIELD_NAMES.contains(&def.name.as_str()) {
            return Err(Error::invalid_value(format!(
                "Input type \"{}\" is not editable",
                def.key
            )));
        }
        // Server behavior for computed fields is inconsistent; reject locally
        if def.readonly {
            return Err(Error::invalid_value(format!(
                "Field '{}' is readonly and cannot be bulk modified",
                def.name
            )));
        }

        let projected = match modification.value() {
            Some(value) => Field::new(Arc::clone(def))
                .bulk_modify_projection(value.clone())
                .map_err(|err| Error::new(ErrorKind::InvalidValue(err.0)))?,
            None => Value::Null,
        };
        modifications.push(json!({
            "fieldId": {"type": "id", "value": def.id},
            "type": modification.wire_type(),
            "value": projected,
        }));
    }

    let mut body = json!({"modifications": modifications});
    selection.apply(app, &mut body)?;

    let job_id: String = session
        .put_json(&format!("app/{}/record/batch", app.id), &body)
        .await?;
    Ok(job_id)
}

/// Current status records of a bulk job. Does not block; callers poll until
/// one entry reports `completed`.
pub(crate) async fn check_bulk_job_status(session: &Session, job_id: &str) -> Result<Vec<Value>> {
    let status: Vec<Value> = session
        .get_json(&format!("logging/job/{}", job_id))
        .await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swimlane_client::{ClientConfig, Credentials};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> Session {
        Mock::given(method("POST"))
            .and(path("/api/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .mount(server)
            .await;
        Session::with_config(
            server.uri(),
            Credentials::new("admin", "secret"),
            ClientConfig::builder().without_retry().build(),
        )
        .await
        .unwrap()
    }

    fn sample_app() -> Arc<App> {
        Arc::new(App::from_raw(crate::app::tests::sample_app_raw()).unwrap())
    }

    #[tokio::test]
    async fn test_bulk_modify_clear_body_shape() {
        let server = MockServer::start().await;
        let s = session(&server).await;
        let app = sample_app();

        Mock::given(method("PUT"))
            .and(path("/api/app/aZx/record/batch"))
            .and(body_partial_json(json!({
                "filters": [{"fieldId": "fid-text", "filterType": "equals", "value": "x"}],
                "modifications": [{
                    "fieldId": {"type": "id", "value": "fid-num"},
                    "type": "delete",
                    "value": null,
                }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("job-123")))
            .expect(1)
            .mount(&server)
            .await;

        let selection = BulkSelection::Filters(vec![BulkFilter::new(
            "Text",
            FilterOperand::Equals,
            "x",
        )]);
        let job_id = bulk_modify(
            &s,
            &app,
            &selection,
            &[("Numeric".to_string(), BulkModification::Clear)],
        )
        .await
        .unwrap();
        assert_eq!(job_id, "job-123");
    }

    #[tokio::test]
    async fn test_bulk_modify_rejects_tracking_field() {
        let server = MockServer::start().await;
        let s = session(&server).await;
        let app = sample_app();

        let selection = BulkSelection::Records(vec!["r1".to_string()]);
        let err = bulk_modify(
            &s,
            &app,
            &selection,
            &[(
                "Tracking Id".to_string(),
                BulkModification::Replace(FieldValue::Text("x".into())),
            )],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("readonly"));
        // Rejected before any request beyond login
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_by_record_ids() {
        let server = MockServer::start().await;
        let s = session(&server).await;
        let app = sample_app();

        Mock::given(method("DELETE"))
            .and(path("/api/app/aZx/record/batch"))
            .and(body_partial_json(json!({"recordIds": ["r1", "r2"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("job-9")))
            .mount(&server)
            .await;

        let selection = BulkSelection::Records(vec!["r1".to_string(), "r2".to_string()]);
        let job_id = bulk_delete(&s, &app, &selection).await.unwrap();
        assert_eq!(job_id, "job-9");
    }

    #[tokio::test]
    async fn test_bulk_create_returns_ids() {
        let server = MockServer::start().await;
        let s = session(&server).await;
        let app = sample_app();

        Mock::given(method("POST"))
            .and(path("/api/app/aZx/record/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["r1", "r2"])))
            .mount(&server)
            .await;

        let ids = bulk_create(
            &s,
            &app,
            vec![
                vec![
                    ("Text".to_string(), FieldValue::Text("a".into())),
                    ("Required Select".to_string(), FieldValue::Text("a".into())),
                ],
                vec![
                    ("Text".to_string(), FieldValue::Text("b".into())),
                    ("Required Select".to_string(), FieldValue::Text("b".into())),
                ],
            ],
        )
        .await
        .unwrap();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_bulk_create_validates_required_fields() {
        let server = MockServer::start().await;
        let s = session(&server).await;
        let app = sample_app();

        let err = bulk_create(
            &s,
            &app,
            vec![vec![("Text".to_string(), FieldValue::Text("a".into()))]],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Required field"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_operator_wire_tags() {
        assert_eq!(
            BulkModification::Replace(FieldValue::Text("x".into())).wire_type(),
            "create"
        );
        assert_eq!(BulkModification::Clear.wire_type(), "delete");
        assert_eq!(
            BulkModification::Append(FieldValue::Text("x".into())).wire_type(),
            "append"
        );
        assert_eq!(
            BulkModification::Remove(FieldValue::Text("x".into())).wire_type(),
            "subtract"
        );
    }
}
