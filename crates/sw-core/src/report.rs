//! Reports: typed filters, sorts, and column projections over one app,
//! streaming results back as lazily paginated records.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use swimlane_client::Session;

use crate::app::App;
use crate::cursor::{PagedSource, PaginatedCursor, DEFAULT_PAGE_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::fields::Field;
use crate::fields::FieldValue;
use crate::record::Record;

/// Wire tag for a report document.
pub const REPORT_TYPE: &str = "Core.Models.Search.Report, Core";

/// Filter comparison operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperand {
    Equals,
    DoesNotEqual,
    Contains,
    Excludes,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl FilterOperand {
    /// The wire name of the operand.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperand::Equals => "equals",
            FilterOperand::DoesNotEqual => "doesNotEqual",
            FilterOperand::Contains => "contains",
            FilterOperand::Excludes => "excludes",
            FilterOperand::LessThan => "lessThan",
            FilterOperand::GreaterThan => "greaterThan",
            FilterOperand::LessThanOrEqual => "lessThanOrEqual",
            FilterOperand::GreaterThanOrEqual => "greaterThanOrEqual",
        }
    }
}

/// Sort direction of one report column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

/// Top-level filter combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    And,
    Or,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::And => "And",
            FilterType::Or => "Or",
        }
    }
}

/// A report under construction plus its (lazy) result cursor. Filters, sorts,
/// and columns can be added until the first result is pulled; from then on
/// the body is frozen and iteration replays from cache on rewind.
#[derive(Debug)]
pub struct Report {
    session: Session,
    app: Arc<App>,
    pub name: String,
    filters: Vec<Value>,
    sorts: BTreeMap<String, SortDirection>,
    columns: Vec<String>,
    filter_type: FilterType,
    keywords: Vec<String>,
    page_size: usize,
    limit: Option<usize>,
    cursor: Option<PaginatedCursor<SearchSource>>,
}

impl Report {
    /// Create a report over one app with all field ids as columns.
    pub(crate) fn new(session: Session, app: Arc<App>, name: impl Into<String>) -> Self {
        let columns = app.field_definitions().map(|d| d.id.clone()).collect();
        Self {
            session,
            app,
            name: name.into(),
            filters: Vec::new(),
            sorts: BTreeMap::new(),
            columns,
            filter_type: FilterType::And,
            keywords: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
            cursor: None,
        }
    }

    /// Cap the total number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Results fetched per request.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add a structured filter. The value is projected through the field's
    /// report form, so selections and user/groups filter by id.
    pub fn filter(
        &mut self,
        field_name: &str,
        operand: FilterOperand,
        value: impl Into<FieldValue>,
    ) -> Result<&mut Self> {
        let def = self.app.field_by_name(field_name)?;
        let projected = Field::new(Arc::clone(def))
            .report_projection(value)
            .map_err(|err| Error::new(ErrorKind::InvalidValue(err.0)))?;

        self.filters.push(json!({
            "fieldId": def.id,
            "filterType": operand.as_str(),
            "value": projected,
        }));
        Ok(self)
    }

    /// Sort by a field. One direction per field; later calls replace.
    pub fn sort(&mut self, field_name: &str, direction: SortDirection) -> Result<&mut Self> {
        let def = self.app.field_by_name(field_name)?;
        self.sorts.insert(def.id.clone(), direction);
        Ok(self)
    }

    /// Replace the column projection. The tracking field is always included.
    pub fn set_columns(&mut self, field_names: &[&str]) -> Result<&mut Self> {
        let mut columns = Vec::new();
        for name in field_names {
            columns.push(self.app.field_by_name(name)?.id.clone());
        }
        let tracking = &self.app.tracking_field_id;
        if !tracking.is_empty() && !columns.iter().any(|c| c == tracking) {
            columns.push(tracking.clone());
        }
        self.columns = columns;
        Ok(self)
    }

    /// Set the top-level combinator.
    pub fn filter_type(&mut self, filter_type: FilterType) -> &mut Self {
        self.filter_type = filter_type;
        self
    }

    /// Add full-text keywords searched alongside the structured filters.
    pub fn keywords(&mut self, keywords: &[&str]) -> &mut Self {
        self.keywords
            .extend(keywords.iter().map(|k| k.to_string()));
        self
    }

    /// The search body, without paging parameters.
    fn body(&self) -> Value {
        let sorts: serde_json::Map<String, Value> = self
            .sorts
            .iter()
            .map(|(id, dir)| (id.clone(), json!(dir.as_str())))
            .collect();
        json!({
            "$type": REPORT_TYPE,
            "name": self.name,
            "applicationIds": [self.app.id],
            "columns": self.columns,
            "sorts": sorts,
            "filters": self.filters,
            "filterType": self.filter_type.as_str(),
            "keywords": self.keywords.join(" "),
        })
    }

    /// The next matching record; `None` when the results are exhausted.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        if self.cursor.is_none() {
            let source = SearchSource {
                session: self.session.clone(),
                app: Arc::clone(&self.app),
                body: self.body(),
            };
            self.cursor = Some(PaginatedCursor::new(source, self.page_size, self.limit));
        }
        match self.cursor {
            Some(ref mut cursor) => cursor.next().await,
            None => Ok(None),
        }
    }

    /// Materialize all matching records.
    pub async fn all(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Restart iteration, replaying fetched results from cache.
    pub fn rewind(&mut self) {
        if let Some(ref mut cursor) = self.cursor {
            cursor.rewind();
        }
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Report: {}>", self.name)
    }
}

/// Paged source posting the frozen report body to `/search`.
#[derive(Debug)]
struct SearchSource {
    session: Session,
    app: Arc<App>,
    body: Value,
}

impl PagedSource for SearchSource {
    type Item = Record;

    async fn retrieve_page(&mut self, page: usize, page_size: usize) -> Result<Vec<Value>> {
        let mut body = self.body.clone();
        body["pageSize"] = json!(page_size);
        body["offset"] = json!(page);

        let response: Value = self.session.post_json("search", &body).await?;
        let results = response
            .get("results")
            .and_then(|r| r.get(&self.app.id))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(results)
    }

    fn parse(&self, raw: Value) -> Result<Record> {
        Record::from_raw(self.session.clone(), Arc::clone(&self.app), raw)
    }
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

    fn result_record(n: u32) -> Value {
        json!({
            "$type": crate::record::RECORD_TYPE,
            "id": format!("r{n}"),
            "trackingId": format!("ACR-{n}"),
            "applicationId": "aZx",
            "values": {"fid-text": "hi", "fid-num": n},
        })
    }

    #[tokio::test]
    async fn test_body_shape() {
        let server = MockServer::start().await;
        let mut report = Report::new(session(&server).await, sample_app(), "my-report");
        report
            .filter("Numeric", FilterOperand::GreaterThan, 3i64)
            .unwrap();
        report
            .filter("Required Select", FilterOperand::Equals, "a")
            .unwrap();
        report.sort("Numeric", SortDirection::Descending).unwrap();
        report.filter_type(FilterType::Or);
        report.keywords(&["phishing"]);

        let body = report.body();
        assert_eq!(body["applicationIds"], json!(["aZx"]));
        assert_eq!(body["filterType"], "Or");
        assert_eq!(body["keywords"], "phishing");
        assert_eq!(body["filters"][0]["fieldId"], "fid-num");
        assert_eq!(body["filters"][0]["filterType"], "greaterThan");
        assert_eq!(body["filters"][0]["value"], 3);
        // Selection filters collapse to the option id
        assert_eq!(body["filters"][1]["value"], "va");
        assert_eq!(body["sorts"]["fid-num"], "descending");
    }

    #[tokio::test]
    async fn test_set_columns_keeps_tracking_field() {
        let server = MockServer::start().await;
        let mut report = Report::new(session(&server).await, sample_app(), "cols");
        report.set_columns(&["Text"]).unwrap();
        assert_eq!(report.body()["columns"], json!(["fid-text", "fid-track"]));
    }

    #[tokio::test]
    async fn test_paginated_iteration_and_replay() {
        let server = MockServer::start().await;
        let s = session(&server).await;

        // 5 matching records, page size 2: offsets 0, 1, 2
        for (offset, ids) in [(0, vec![1u32, 2]), (1, vec![3, 4]), (2, vec![5])] {
            let records: Vec<Value> = ids.into_iter().map(result_record).collect();
            Mock::given(method("POST"))
                .and(path("/api/search"))
                .and(body_partial_json(json!({"offset": offset, "pageSize": 2})))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"results": {"aZx": records}, "count": 5})),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut report = Report::new(s, sample_app(), "paged").page_size(2).limit(5);
        let records = report.all().await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].tracking_id(), Some("ACR-1"));
        assert_eq!(records[4].tracking_id(), Some("ACR-5"));

        // Replay comes from cache; the expect(1) mocks above verify no
        // additional requests were made
        report.rewind();
        let replay = report.all().await.unwrap();
        assert_eq!(replay.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_filter_field() {
        let server = MockServer::start().await;
        let mut report = Report::new(session(&server).await, sample_app(), "bad");
        let err = report
            .filter("Nope", FilterOperand::Equals, "x")
            .unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::ErrorKind::UnknownField { .. }
        ));
    }
}
