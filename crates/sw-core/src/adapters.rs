//! Adapters: typed entry points for apps, records, users, groups, tasks,
//! reports, revisions, and helper endpoints.
//!
//! Lookup selectors are enums, so "exactly one of id/name" is enforced by
//! construction; empty selector values are rejected before any request.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use swimlane_client::Session;
use tracing::instrument;
use uuid::Uuid;

use crate::app::App;
use crate::bulk::{self, BulkModification, BulkSelection};
use crate::cache::ResourceCache;
use crate::error::{Error, ErrorKind, Result};
use crate::fields::FieldValue;
use crate::record::Record;
use crate::report::{FilterOperand, Report};
use crate::revision::{self, AppRevision};
use crate::task::{self, Task};
use crate::usergroup::{Group, User};

/// App lookup selector.
#[derive(Debug, Clone, Copy)]
pub enum AppRef<'a> {
    Id(&'a str),
    Name(&'a str),
}

/// Record lookup selector.
#[derive(Debug, Clone, Copy)]
pub enum RecordRef<'a> {
    Id(&'a str),
    TrackingId(&'a str),
}

/// User lookup selector.
#[derive(Debug, Clone, Copy)]
pub enum UserRef<'a> {
    Id(&'a str),
    DisplayName(&'a str),
}

/// Group lookup selector.
#[derive(Debug, Clone, Copy)]
pub enum GroupRef<'a> {
    Id(&'a str),
    Name(&'a str),
}

/// Task lookup selector.
#[derive(Debug, Clone, Copy)]
pub enum TaskRef<'a> {
    Id(&'a str),
    Name(&'a str),
}

fn require_value(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_value(format!(
            "The value provided for the key \"{}\" cannot be empty or None",
            key
        )));
    }
    Ok(())
}

// =============================================================================
// Apps
// =============================================================================

/// Adapter over the app directory, with a bounded schema cache.
#[derive(Clone)]
pub struct Apps {
    session: Session,
    cache: Arc<Mutex<ResourceCache<App>>>,
}

impl Apps {
    pub fn new(session: Session) -> Self {
        let capacity = session.config().resource_cache_size;
        Self {
            session,
            cache: Arc::new(Mutex::new(ResourceCache::new(capacity))),
        }
    }

    /// List all apps, sorted by name.
    pub async fn list(&self) -> Result<Vec<AppHandle>> {
        let raw: Vec<Value> = self.session.get_json("app").await?;
        let mut handles = Vec::with_capacity(raw.len());
        for doc in raw {
            handles.push(self.handle_of(App::from_raw(doc)?));
        }
        handles.sort_by(|a, b| a.app().cmp(b.app()));
        Ok(handles)
    }

    /// Fetch one app by id or exact name.
    #[instrument(skip(self))]
    pub async fn get(&self, selector: AppRef<'_>) -> Result<AppHandle> {
        let (key, value) = match selector {
            AppRef::Id(id) => ("id", id),
            AppRef::Name(name) => ("name", name),
        };
        require_value(key, value)?;

        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(value) {
            return Ok(AppHandle {
                session: self.session.clone(),
                app: cached,
            });
        }

        let app = match selector {
            AppRef::Id(id) => {
                let response = self.session.get_raw(&format!("app/{}", id)).await?;
                // The server answers 204 for an unknown app id
                if response.is_no_content() {
                    return Err(Error::invalid_value(format!("No app with id \"{}\"", id)));
                }
                App::from_raw(response.json().await?)?
            }
            AppRef::Name(name) => {
                let raw: Vec<Value> = self.session.get_json("app").await?;
                let doc = raw
                    .into_iter()
                    .find(|doc| doc.get("name").and_then(Value::as_str) == Some(name))
                    .ok_or_else(|| {
                        Error::new(ErrorKind::NotFound(format!(
                            "No app with name \"{}\"",
                            name
                        )))
                    })?;
                App::from_raw(doc)?
            }
        };

        Ok(self.handle_of(app))
    }

    fn handle_of(&self, app: App) -> AppHandle {
        let secondary = vec![app.name.clone(), app.acronym.clone()];
        let id = app.id.clone();
        let shared = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, secondary, app);
        AppHandle {
            session: self.session.clone(),
            app: shared,
        }
    }
}

/// One app plus the session, giving access to its records, reports, and
/// revisions.
#[derive(Debug, Clone)]
pub struct AppHandle {
    session: Session,
    app: Arc<App>,
}

impl AppHandle {
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn records(&self) -> Records {
        Records {
            session: self.session.clone(),
            app: Arc::clone(&self.app),
        }
    }

    pub fn reports(&self) -> Reports {
        Reports {
            session: self.session.clone(),
            app: Arc::clone(&self.app),
        }
    }

    /// App-schema revision history.
    pub async fn revisions(&self) -> Result<Vec<AppRevision>> {
        revision::app_revisions(&self.session, &self.app.id).await
    }

    /// One app-schema revision by number.
    pub async fn revision(&self, number: f64) -> Result<AppRevision> {
        revision::app_revision(&self.session, &self.app.id, number).await
    }
}

impl std::fmt::Display for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.app.fmt(f)
    }
}

// =============================================================================
// Records
// =============================================================================

/// Record operations scoped to one app.
#[derive(Clone)]
pub struct Records {
    session: Session,
    app: Arc<App>,
}

impl Records {
    /// Fetch one record by id or tracking id.
    #[instrument(skip(self), fields(app = %self.app.name))]
    pub async fn get(&self, selector: RecordRef<'_>) -> Result<Record> {
        let path = match selector {
            RecordRef::Id(id) => {
                require_value("id", id)?;
                format!("app/{}/record/{}", self.app.id, id)
            }
            RecordRef::TrackingId(tracking_id) => {
                require_value("tracking_id", tracking_id)?;
                format!("app/{}/record/tracking/{}", self.app.id, tracking_id)
            }
        };
        let raw: Value = self.session.get_json(&path).await?;
        Record::from_raw(self.session.clone(), Arc::clone(&self.app), raw)
    }

    /// Create and save a record from field-name/value pairs.
    pub async fn create(
        &self,
        values: Vec<(&str, FieldValue)>,
    ) -> Result<Record> {
        let mut record = Record::new_stub(self.session.clone(), Arc::clone(&self.app))?;
        for (name, value) in values {
            record.set(name, value).await?;
        }
        record.save().await?;
        Ok(record)
    }

    /// Structured search sugar: an ephemeral report holding the given
    /// filters, fully materialized.
    pub async fn search(
        &self,
        filters: Vec<(&str, FilterOperand, FieldValue)>,
    ) -> Result<Vec<Record>> {
        let name = format!("search-{}", Uuid::new_v4());
        let mut report = Report::new(self.session.clone(), Arc::clone(&self.app), name);
        for (field_name, operand, value) in filters {
            report.filter(field_name, operand, value)?;
        }
        report.all().await
    }

    /// Batch-create records, returning the new ids.
    pub async fn bulk_create(
        &self,
        value_maps: Vec<Vec<(String, FieldValue)>>,
    ) -> Result<Vec<String>> {
        bulk::bulk_create(&self.session, &self.app, value_maps).await
    }

    /// Delete records by filter set or explicit selection; returns a job id.
    pub async fn bulk_delete(&self, selection: BulkSelection) -> Result<String> {
        bulk::bulk_delete(&self.session, &self.app, &selection).await
    }

    /// Modify records by filter set or explicit selection; returns a job id.
    pub async fn bulk_modify(
        &self,
        selection: BulkSelection,
        values: Vec<(String, BulkModification)>,
    ) -> Result<String> {
        bulk::bulk_modify(&self.session, &self.app, &selection, &values).await
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Report construction and listing for one app.
#[derive(Clone)]
pub struct Reports {
    session: Session,
    app: Arc<App>,
}

impl Reports {
    /// Start a new report.
    pub fn build(&self, name: impl Into<String>) -> Report {
        Report::new(self.session.clone(), Arc::clone(&self.app), name)
    }

    /// Raw saved-report documents on the server.
    pub async fn list(&self) -> Result<Vec<Value>> {
        let raw: Vec<Value> = self.session.get_json("reports").await?;
        Ok(raw)
    }

    /// One raw saved-report document.
    pub async fn get(&self, id: &str) -> Result<Value> {
        require_value("id", id)?;
        let raw: Value = self.session.get_json(&format!("reports/{}", id)).await?;
        Ok(raw)
    }
}

// =============================================================================
// Users and groups
// =============================================================================

/// Adapter over the user directory.
#[derive(Clone)]
pub struct Users {
    session: Session,
    cache: Arc<Mutex<ResourceCache<User>>>,
}

impl Users {
    pub fn new(session: Session) -> Self {
        let capacity = session.config().resource_cache_size;
        Self {
            session,
            cache: Arc::new(Mutex::new(ResourceCache::new(capacity))),
        }
    }

    /// List all users.
    pub async fn list(&self) -> Result<Vec<User>> {
        let raw: Value = self.session.get_json("user").await?;
        Ok(items_of(raw).into_iter().map(User::from_raw).collect())
    }

    /// Fetch one user by id or display name. An ambiguous display name is an
    /// error.
    #[instrument(skip(self))]
    pub async fn get(&self, selector: UserRef<'_>) -> Result<User> {
        let (key, value) = match selector {
            UserRef::Id(id) => ("id", id),
            UserRef::DisplayName(name) => ("display_name", name),
        };
        require_value(key, value)?;

        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(value) {
            return Ok((*cached).clone());
        }

        let user = match selector {
            UserRef::Id(id) => {
                let raw: Value = self.session.get_json(&format!("user/{}", id)).await?;
                User::from_raw(raw)
            }
            UserRef::DisplayName(name) => {
                let raw: Value = self
                    .session
                    .get_json_query("user/search", &[("query", name)])
                    .await?;
                let mut matches: Vec<User> = items_of(raw)
                    .into_iter()
                    .map(User::from_raw)
                    .filter(|u| u.display_name == name)
                    .collect();
                match matches.len() {
                    0 => {
                        return Err(Error::new(ErrorKind::NotFound(format!(
                            "No user with display name \"{}\"",
                            name
                        ))))
                    }
                    1 => matches.remove(0),
                    _ => {
                        return Err(Error::new(ErrorKind::Ambiguous(format!(
                            "Multiple users found with display name \"{}\"",
                            name
                        ))))
                    }
                }
            }
        };

        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(
            user.id.clone(),
            vec![user.display_name.clone(), user.username.clone()],
            user.clone(),
        );
        Ok(user)
    }
}

/// Adapter over the group directory.
#[derive(Clone)]
pub struct Groups {
    session: Session,
    cache: Arc<Mutex<ResourceCache<Group>>>,
}

impl Groups {
    pub fn new(session: Session) -> Self {
        let capacity = session.config().resource_cache_size;
        Self {
            session,
            cache: Arc::new(Mutex::new(ResourceCache::new(capacity))),
        }
    }

    /// List all groups.
    pub async fn list(&self) -> Result<Vec<Group>> {
        let raw: Value = self.session.get_json("groups").await?;
        Ok(items_of(raw).into_iter().map(Group::from_raw).collect())
    }

    /// Fetch one group by id or exact name.
    #[instrument(skip(self))]
    pub async fn get(&self, selector: GroupRef<'_>) -> Result<Group> {
        let (key, value) = match selector {
            GroupRef::Id(id) => ("id", id),
            GroupRef::Name(name) => ("name", name),
        };
        require_value(key, value)?;

        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(value) {
            return Ok((*cached).clone());
        }

        let group = match selector {
            GroupRef::Id(id) => {
                let raw: Value = self.session.get_json(&format!("groups/{}", id)).await?;
                Group::from_raw(raw)
            }
            GroupRef::Name(name) => {
                let raw: Value = self
                    .session
                    .get_json_query("groups/lookup", &[("name", name)])
                    .await?;
                items_of(raw)
                    .into_iter()
                    .map(Group::from_raw)
                    .find(|g| g.name == name)
                    .ok_or_else(|| {
                        Error::new(ErrorKind::NotFound(format!(
                            "No group with name \"{}\"",
                            name
                        )))
                    })?
            }
        };

        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(
            group.id.clone(),
            vec![group.name.clone()],
            group.clone(),
        );
        Ok(group)
    }
}

/// Servers answer directory listings either as a bare array or wrapped in an
/// `items` envelope.
fn items_of(raw: Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Adapter over server tasks.
#[derive(Clone)]
pub struct Tasks {
    session: Session,
}

impl Tasks {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The lightweight task index.
    pub async fn list(&self) -> Result<Vec<Task>> {
        task::list(&self.session).await
    }

    /// Fetch one task by id or name.
    pub async fn get(&self, selector: TaskRef<'_>) -> Result<Task> {
        match selector {
            TaskRef::Id(id) => {
                require_value("id", id)?;
                task::get_by_id(&self.session, id).await
            }
            TaskRef::Name(name) => {
                require_value("name", name)?;
                task::list(&self.session)
                    .await?
                    .into_iter()
                    .find(|t| t.name == name)
                    .ok_or_else(|| {
                        Error::new(ErrorKind::NotFound(format!(
                            "No task with name \"{}\"",
                            name
                        )))
                    })
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Direct helper endpoints that bypass record materialization.
#[derive(Clone)]
pub struct Helpers {
    session: Session,
}

impl Helpers {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Append a comment to a record field server-side.
    pub async fn add_comment(
        &self,
        app_id: &str,
        record_id: &str,
        field_id: &str,
        message: &str,
        rich_text: bool,
    ) -> Result<()> {
        let body = json!({"message": message, "isRichText": rich_text});
        let request = self
            .session
            .post(&format!(
                "app/{}/record/{}/{}/comment",
                app_id, record_id, field_id
            ))
            .json(&body)?;
        self.session.request(request).await?;
        Ok(())
    }

    /// Add reference targets to a record field without a full record
    /// round trip.
    pub async fn add_record_references(
        &self,
        app_id: &str,
        record_id: &str,
        field_id: &str,
        target_record_ids: &[&str],
    ) -> Result<()> {
        let body = json!({"fieldId": field_id, "targetRecordIds": target_record_ids});
        let request = self
            .session
            .post(&format!(
                "app/{}/record/{}/add-references",
                app_id, record_id
            ))
            .json(&body)?;
        self.session.request(request).await?;
        Ok(())
    }

    /// Status records of a bulk job. Poll until one reports `completed`.
    pub async fn check_bulk_job_status(&self, job_id: &str) -> Result<Vec<Value>> {
        bulk::check_bulk_job_status(&self.session, job_id).await
    }
}
