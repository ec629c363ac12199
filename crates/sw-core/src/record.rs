//! Records: typed instances of an application.
//!
//! A record owns one [`Field`] per field definition in its app, regardless of
//! whether the server sent a value for it. Every field mutation also updates
//! the raw wire envelope, so `raw["values"]` is always what a save would send.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use swimlane_client::Session;
use tracing::instrument;

use crate::app::App;
use crate::error::{Error, ErrorKind, Result};
use crate::fields::def::{FieldType, UserGroupAllowList};
use crate::fields::{Field, FieldValue};
use crate::resources::{Attachment, Comment};
use crate::task;
use crate::usergroup::{Group, UserGroup, UserGroupSelection};

/// Wire tag for a record envelope.
pub const RECORD_TYPE: &str = "Core.Models.Record.Record, Core";

/// Wire tag for the values dictionary inside a record envelope.
pub const VALUES_DICT_TYPE: &str =
    "System.Collections.Generic.Dictionary`2[[System.String, mscorlib],[System.Object, mscorlib]], mscorlib";

/// One record of an application.
#[derive(Debug, Clone)]
pub struct Record {
    session: Session,
    app: Arc<App>,
    raw: Value,
    fields: HashMap<String, Field>,
    is_new: bool,
    comment_dirty: bool,
}

impl Record {
    /// Materialize a record from its raw server document.
    pub fn from_raw(session: Session, app: Arc<App>, raw: Value) -> Result<Self> {
        let mut record = Self {
            session,
            app,
            raw,
            fields: HashMap::new(),
            is_new: false,
            comment_dirty: false,
        };
        record.build_fields()?;
        Ok(record)
    }

    /// Create an unsaved record with a boilerplate envelope.
    pub fn new_stub(session: Session, app: Arc<App>) -> Result<Self> {
        let raw = json!({
            "$type": RECORD_TYPE,
            "isNew": true,
            "applicationId": app.id,
            "values": {"$type": VALUES_DICT_TYPE},
        });
        let mut record = Self {
            session,
            app,
            raw,
            fields: HashMap::new(),
            is_new: true,
            comment_dirty: false,
        };
        record.build_fields()?;
        Ok(record)
    }

    fn build_fields(&mut self) -> Result<()> {
        let values = self.raw.get("values").cloned().unwrap_or(Value::Null);
        let mut fields = HashMap::new();
        for def in self.app.field_definitions() {
            let mut field = Field::new(Arc::clone(def));
            let wire = values.get(&def.id).unwrap_or(&Value::Null);
            field
                .hydrate(wire)
                .map_err(|err| Error::validation(self.display(), err.0))?;
            fields.insert(def.name.clone(), field);
        }
        self.fields = fields;
        Ok(())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// The raw server document, kept in sync with field mutations.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn id(&self) -> Option<&str> {
        self.raw.get("id").and_then(Value::as_str)
    }

    /// Acronym-prefixed human identifier, e.g. `ACR-7`.
    pub fn tracking_id(&self) -> Option<&str> {
        self.raw.get("trackingId").and_then(Value::as_str)
    }

    /// True until the record has been persisted.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.timestamp("createdDate")
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.timestamp("modifiedDate")
    }

    pub fn created_by(&self) -> Option<UserGroupSelection> {
        self.raw
            .get("createdByUser")
            .and_then(UserGroupSelection::from_wire)
    }

    pub fn modified_by(&self) -> Option<UserGroupSelection> {
        self.raw
            .get("modifiedByUser")
            .and_then(UserGroupSelection::from_wire)
    }

    pub fn is_locked(&self) -> bool {
        self.raw
            .get("locked")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn locking_user(&self) -> Option<UserGroupSelection> {
        self.raw
            .get("lockingUser")
            .and_then(UserGroupSelection::from_wire)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.raw
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Display form: `<Record: ACR-7>`, or `<Record: ACR - New>` before the
    /// first save.
    pub fn display(&self) -> String {
        if self.is_new {
            format!("<Record: {} - New>", self.app.acronym)
        } else {
            format!(
                "<Record: {}>",
                self.tracking_id().unwrap_or(&self.app.acronym)
            )
        }
    }

    // =========================================================================
    // Field access
    // =========================================================================

    /// Borrow a field by display name.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| self.unknown_field(name))
    }

    /// Current value of a field; `None` when unset.
    pub fn get(&self, name: &str) -> Result<Option<&FieldValue>> {
        Ok(self.field(name)?.value())
    }

    /// Assign a value to a field. Validation and coercion run locally; for a
    /// restricted user/group field whose selection is not directly allowed,
    /// the selection is resolved against the directory first.
    #[instrument(skip(self, value), fields(record = %self.display()))]
    pub async fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let display = self.display();
        let session = self.session.clone();

        let Some(field) = self.fields.get_mut(name) else {
            return Err(self.unknown_field(name));
        };

        let needs_resolution = match value {
            FieldValue::UserGroup(ref s) => field.needs_allow_resolution(&s.id),
            FieldValue::UserGroups(ref selections) => selections
                .iter()
                .any(|s| field.needs_allow_resolution(&s.id)),
            _ => false,
        };

        if needs_resolution {
            let FieldType::UserGroup { ref allow, .. } = field.def().field_type else {
                unreachable!("needs_allow_resolution is only true for user/group fields");
            };
            let allow = allow.clone();
            let field_name = field.def().name.clone();
            let selections: Vec<UserGroupSelection> = match value {
                FieldValue::UserGroup(ref s) => vec![s.clone()],
                FieldValue::UserGroups(ref selections) => selections.clone(),
                _ => unreachable!(),
            };
            for selection in &selections {
                if !allow_via_membership(&session, &allow, selection).await? {
                    return Err(Error::validation(
                        &display,
                        format!(
                            "User/group \"{}\" is not an allowed value for field \"{}\"",
                            selection.name, field_name
                        ),
                    ));
                }
            }
            // Re-borrow after the awaits above
            let Some(field) = self.fields.get_mut(name) else {
                return Err(self.unknown_field(name));
            };
            field
                .set_validated(value)
                .map_err(|err| Error::validation(&display, err.0))?;
        } else {
            field
                .set(value)
                .map_err(|err| Error::validation(&display, err.0))?;
        }

        self.sync_raw(name);
        Ok(())
    }

    /// Reset a field to unset and drop its key from the raw envelope.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        let display = self.display();
        let Some(field) = self.fields.get_mut(name) else {
            return Err(self.unknown_field(name));
        };
        field
            .clear()
            .map_err(|err| Error::validation(&display, err.0))?;

        let id = field.def().id.clone();
        if let Some(values) = self.raw.get_mut("values").and_then(Value::as_object_mut) {
            values.remove(&id);
        }
        Ok(())
    }

    /// Add one option to a multi-select field, keeping existing selections.
    pub async fn select(&mut self, name: &str, option: &str) -> Result<()> {
        let mut names = self.multi_select_names(name)?;
        if !names.iter().any(|n| n == option) {
            names.push(option.to_string());
        }
        self.set(name, FieldValue::TextList(names)).await
    }

    /// Remove one option from a multi-select field. Errors when the option is
    /// not currently selected.
    pub async fn deselect(&mut self, name: &str, option: &str) -> Result<()> {
        let mut names = self.multi_select_names(name)?;
        let before = names.len();
        names.retain(|n| n != option);
        if names.len() == before {
            return Err(Error::validation(
                self.display(),
                format!("\"{}\" is not selected on field \"{}\"", option, name),
            ));
        }
        self.set(name, FieldValue::TextList(names)).await
    }

    fn multi_select_names(&self, name: &str) -> Result<Vec<String>> {
        match self.field(name)?.value() {
            Some(FieldValue::MultiSelection(selections)) => {
                Ok(selections.iter().map(|s| s.name.clone()).collect())
            }
            Some(other) => Err(Error::validation(
                self.display(),
                format!(
                    "Field \"{}\" is not a multi-select field (holds {:?})",
                    name, other
                ),
            )),
            None => Ok(Vec::new()),
        }
    }

    fn unknown_field(&self, requested: &str) -> Error {
        let similar = crate::fuzzy::close_matches(requested, self.app.field_names());
        Error::unknown_field(&self.display(), requested, similar)
    }

    /// Mirror a field's wire form into `raw["values"]`.
    fn sync_raw(&mut self, name: &str) {
        let Some(field) = self.fields.get(name) else {
            return;
        };
        let id = field.def().id.clone();
        let wire = field.to_wire();

        let values = self
            .raw
            .as_object_mut()
            .map(|obj| {
                obj.entry("values")
                    .or_insert_with(|| json!({"$type": VALUES_DICT_TYPE}))
            })
            .and_then(Value::as_object_mut);
        if let Some(values) = values {
            if wire.is_null() {
                values.remove(&id);
            } else {
                values.insert(id, wire);
            }
        }
    }

    fn sync_all_raw(&mut self) {
        let names: Vec<String> = self.fields.keys().cloned().collect();
        for name in names {
            if self.fields.get(&name).is_some_and(Field::is_set) {
                self.sync_raw(&name);
            }
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Check required fields without touching the network.
    pub fn validate(&self) -> Result<()> {
        for def in self.app.field_definitions() {
            if !def.required {
                continue;
            }
            let set = self.fields.get(&def.name).is_some_and(Field::is_set);
            if !set {
                return Err(Error::validation(
                    self.display(),
                    format!("Required field \"{}\" is not set", def.name),
                ));
            }
        }
        Ok(())
    }

    /// Persist the record: POST when new, PUT otherwise. The local state is
    /// replaced by the server's response; on failure it is left untouched.
    #[instrument(skip(self), fields(record = %self.display()))]
    pub async fn save(&mut self) -> Result<()> {
        self.validate()?;
        self.sync_all_raw();

        let path = format!("app/{}/record", self.app.id);
        let response: Value = if self.is_new {
            self.session.post_json(&path, &self.raw).await?
        } else {
            self.session.put_json(&path, &self.raw).await?
        };

        self.raw = response;
        self.is_new = false;
        self.comment_dirty = false;
        self.build_fields()?;
        Ok(())
    }

    /// Persist only dirty fields (and pending comments), avoiding
    /// last-writer-wins on untouched fields.
    #[instrument(skip(self), fields(record = %self.display()))]
    pub async fn patch(&mut self) -> Result<()> {
        let id = self.require_persisted("patch")?.to_string();

        let mut values = json!({"$type": VALUES_DICT_TYPE});
        for field in self.fields.values() {
            let dirty = field.is_dirty()
                || (self.comment_dirty
                    && matches!(field.def().field_type, FieldType::Comments));
            if dirty {
                values[&field.def().id] = field.to_wire();
            }
        }

        let body = json!({
            "$type": RECORD_TYPE,
            "id": id,
            "applicationId": self.app.id,
            "values": values,
        });
        self.session
            .patch_json(&format!("app/{}/record/{}", self.app.id, id), &body)
            .await?;

        for field in self.fields.values_mut() {
            field.mark_clean();
        }
        self.comment_dirty = false;
        Ok(())
    }

    /// Delete the record on the server. The local instance reverts to unsaved.
    pub async fn delete(&mut self) -> Result<()> {
        let id = self.require_persisted("delete")?.to_string();
        self.session
            .delete(&format!("app/{}/record/{}", self.app.id, id))
            .await?;

        if let Some(obj) = self.raw.as_object_mut() {
            obj.remove("id");
            obj.remove("trackingId");
        }
        self.is_new = true;
        Ok(())
    }

    fn require_persisted(&self, operation: &str) -> Result<&str> {
        if self.is_new {
            return Err(Error::new(ErrorKind::InvalidOperation(format!(
                "Cannot {} a record that has never been saved",
                operation
            ))));
        }
        self.id().ok_or_else(|| {
            Error::new(ErrorKind::InvalidOperation(format!(
                "Cannot {} a record without an id",
                operation
            )))
        })
    }

    // =========================================================================
    // Locking and restrictions
    // =========================================================================

    /// Acquire the record lock.
    pub async fn lock(&mut self) -> Result<()> {
        let id = self.require_persisted("lock")?.to_string();
        let response: Value = self
            .session
            .post_json(&format!("app/{}/record/{}/lock", self.app.id, id), &json!({}))
            .await?;
        self.absorb_lock_state(response, true);
        Ok(())
    }

    /// Release the record lock.
    pub async fn unlock(&mut self) -> Result<()> {
        let id = self.require_persisted("unlock")?.to_string();
        self.session
            .delete(&format!("app/{}/record/{}/lock", self.app.id, id))
            .await?;
        if let Some(obj) = self.raw.as_object_mut() {
            obj.insert("locked".to_string(), json!(false));
            obj.remove("lockingUser");
            obj.remove("lockedDate");
        }
        Ok(())
    }

    fn absorb_lock_state(&mut self, response: Value, locked: bool) {
        if response.get("locked").is_some() {
            self.raw = response;
            return;
        }
        if let Some(obj) = self.raw.as_object_mut() {
            obj.insert("locked".to_string(), json!(locked));
        }
    }

    /// Add user/group restrictions to the record's ACL. Persisted on the next
    /// save.
    pub fn add_restriction(&mut self, usergroups: &[UserGroupSelection]) {
        let allowed = self
            .raw
            .as_object_mut()
            .map(|obj| obj.entry("allowed").or_insert_with(|| json!([])))
            .and_then(Value::as_array_mut);
        let Some(allowed) = allowed else { return };
        for usergroup in usergroups {
            let present = allowed
                .iter()
                .any(|v| v.get("id").and_then(Value::as_str) == Some(usergroup.id.as_str()));
            if !present {
                allowed.push(usergroup.to_wire());
            }
        }
    }

    /// Remove restrictions; with an empty slice, clears the ACL entirely.
    pub fn remove_restriction(&mut self, usergroups: &[UserGroupSelection]) {
        let Some(allowed) = self.raw.get_mut("allowed").and_then(Value::as_array_mut) else {
            return;
        };
        if usergroups.is_empty() {
            allowed.clear();
        } else {
            allowed.retain(|v| {
                let id = v.get("id").and_then(Value::as_str).unwrap_or_default();
                !usergroups.iter().any(|ug| ug.id == id)
            });
        }
    }

    /// Current ACL entries.
    pub fn restrictions(&self) -> Vec<UserGroupSelection> {
        self.raw
            .get("allowed")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(UserGroupSelection::from_wire)
            .collect()
    }

    // =========================================================================
    // Sub-resources
    // =========================================================================

    /// Run a named task against this record.
    pub async fn execute_task(&self, task_name: &str) -> Result<Value> {
        task::execute_for_record(&self.session, task_name, &self.raw).await
    }

    /// Append a comment locally; persisted through `save` or `patch`.
    pub fn add_comment(&mut self, field_name: &str, comment: Comment) -> Result<()> {
        let display = self.display();
        let Some(field) = self.fields.get_mut(field_name) else {
            return Err(self.unknown_field(field_name));
        };
        if !matches!(field.def().field_type, FieldType::Comments) {
            return Err(Error::validation(
                &display,
                format!("Field \"{}\" is not a comments field", field_name),
            ));
        }
        field.append_comment(comment);
        self.comment_dirty = true;
        self.sync_raw(field_name);
        Ok(())
    }

    /// Comments currently on a field.
    pub fn comments(&self, field_name: &str) -> Result<Vec<Comment>> {
        match self.field(field_name)?.value() {
            Some(FieldValue::Comments(comments)) => Ok(comments.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Upload a file and attach it to a field. The upload happens
    /// immediately; the association persists on the next save.
    pub async fn add_attachment(
        &mut self,
        field_name: &str,
        filename: &str,
        data: bytes::Bytes,
        content_type: Option<&str>,
    ) -> Result<Vec<Attachment>> {
        let display = self.display();
        {
            let Some(field) = self.fields.get(field_name) else {
                return Err(self.unknown_field(field_name));
            };
            if !matches!(field.def().field_type, FieldType::Attachment) {
                return Err(Error::validation(
                    &display,
                    format!("Field \"{}\" is not an attachment field", field_name),
                ));
            }
        }

        let uploaded = Attachment::upload(&self.session, filename, data, content_type).await?;
        if let Some(field) = self.fields.get_mut(field_name) {
            field.append_attachments(uploaded.clone());
        }
        self.sync_raw(field_name);
        Ok(uploaded)
    }

    /// Attachments currently on a field.
    pub fn attachments(&self, field_name: &str) -> Result<Vec<Attachment>> {
        match self.field(field_name)?.value() {
            Some(FieldValue::Attachments(attachments)) => Ok(attachments.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Target record ids of a reference field.
    pub fn reference_ids(&self, field_name: &str) -> Result<Vec<String>> {
        match self.field(field_name)?.value() {
            Some(FieldValue::References(ids)) => Ok(ids.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// Add a reference target, validating the target app when a Record is
    /// given.
    pub fn add_reference(&mut self, field_name: &str, target: ReferenceTarget<'_>) -> Result<()> {
        let display = self.display();
        let Some(field) = self.fields.get_mut(field_name) else {
            return Err(self.unknown_field(field_name));
        };
        let FieldType::Reference { ref target_app_id } = field.def().field_type else {
            return Err(Error::validation(
                &display,
                format!("Field \"{}\" is not a reference field", field_name),
            ));
        };

        let id = match target {
            ReferenceTarget::Id(id) => id.to_string(),
            ReferenceTarget::Record(record) => {
                if record.app.id != *target_app_id {
                    return Err(Error::validation(
                        &display,
                        format!(
                            "Field \"{}\" references app \"{}\", not \"{}\"",
                            field_name, target_app_id, record.app.id
                        ),
                    ));
                }
                record
                    .id()
                    .ok_or_else(|| {
                        Error::validation(&display, "Cannot reference an unsaved record")
                    })?
                    .to_string()
            }
        };

        let mut ids = match field.value() {
            Some(FieldValue::References(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
        field.set_reference_ids(ids);
        self.sync_raw(field_name);
        Ok(())
    }

    /// Remove a reference target by id.
    pub fn remove_reference(&mut self, field_name: &str, target_id: &str) -> Result<()> {
        let display = self.display();
        let Some(field) = self.fields.get_mut(field_name) else {
            return Err(self.unknown_field(field_name));
        };
        let mut ids = match field.value() {
            Some(FieldValue::References(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        let before = ids.len();
        ids.retain(|id| id != target_id);
        if ids.len() == before {
            return Err(Error::validation(
                &display,
                format!(
                    "\"{}\" is not referenced by field \"{}\"",
                    target_id, field_name
                ),
            ));
        }
        field.set_reference_ids(ids);
        self.sync_raw(field_name);
        Ok(())
    }

    /// Cursor over the records referenced by a field. Targets resolve lazily
    /// against the field's configured app; orphaned ids are skipped.
    pub async fn references(&self, field_name: &str) -> Result<crate::cursor::ReferenceCursor> {
        let field = self.field(field_name)?;
        let FieldType::Reference { ref target_app_id } = field.def().field_type else {
            return Err(Error::validation(
                self.display(),
                format!("Field \"{}\" is not a reference field", field_name),
            ));
        };

        let raw: Value = self
            .session
            .get_json(&format!("app/{}", target_app_id))
            .await?;
        let target_app = Arc::new(App::from_raw(raw)?);
        Ok(crate::cursor::ReferenceCursor::new(
            self.session.clone(),
            target_app,
            self.reference_ids(field_name)?,
        ))
    }

    /// All revisions of this record, newest first.
    pub async fn revisions(&self) -> Result<Vec<crate::revision::RecordRevision>> {
        let id = self.require_persisted("fetch history for")?;
        crate::revision::record_revisions(&self.session, &self.app.id, id).await
    }

    /// One revision of this record by number.
    pub async fn revision(&self, number: f64) -> Result<crate::revision::RecordRevision> {
        let id = self.require_persisted("fetch history for")?;
        crate::revision::record_revision(&self.session, &self.app.id, id, number).await
    }
}

/// Target of a reference-field mutation: a record id or a materialized record.
#[derive(Debug)]
pub enum ReferenceTarget<'a> {
    Id(&'a str),
    Record(&'a Record),
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.app.id == other.app.id && self.id().is_some() && self.id() == other.id()
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.tracking_id().cmp(&other.tracking_id()))
    }
}

/// Evaluate the indirect parts of a user/group allow-list: show-all flags,
/// group memberships, and subgroup relations. One resolve plus at most one
/// group fetch per configured group.
async fn allow_via_membership(
    session: &Session,
    allow: &UserGroupAllowList,
    selection: &UserGroupSelection,
) -> Result<bool> {
    let resolved = selection.resolve(session).await?;
    match resolved {
        UserGroup::User(ref user) => {
            if allow.show_all_users {
                return Ok(true);
            }
            for group_id in &allow.member_groups {
                let group = fetch_group(session, group_id).await?;
                if group.member_ids().iter().any(|id| id == &user.id) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        UserGroup::Group(ref group) => {
            if allow.show_all_groups {
                return Ok(true);
            }
            for group_id in &allow.subgroup_groups {
                let parent = fetch_group(session, group_id).await?;
                if parent.subgroup_ids().iter().any(|id| id == &group.id) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

async fn fetch_group(session: &Session, id: &str) -> Result<Group> {
    let raw: Value = session.get_json(&format!("groups/{}", id)).await?;
    Ok(Group::from_raw(raw))
}
