//! Field instances: typed accessors pairing a definition with a value.
//!
//! A [`Field`] is `{ definition, value }`. All validation, coercion, and wire
//! conversion dispatches on the definition's [`FieldType`] variant; there is
//! no class hierarchy. Values move through three representations:
//!
//! - [`FieldValue`] - the ergonomic in-process form
//! - wire JSON - what the server sends and receives inside `values`
//! - projections - the reduced forms used in report filters and bulk-modify
//!   payloads (selections and user/groups collapse to their ids there)

pub mod def;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde_json::{json, Value};

use crate::resources::{Attachment, Comment};
use crate::usergroup::UserGroupSelection;
use def::{
    DateSubtype, FieldDefinition, FieldType, LengthUnit, ListItemType, SelectOption,
    TextConstraints, TextSubtype, UserGroupAllowList,
};

/// Wire tag for a values-list selection.
pub const VALUE_SELECTION_TYPE: &str = "Core.Models.Record.ValueSelection, Core";

/// A rejected field mutation, carrying the human-readable reason. Record
/// operations wrap this with the owning record's display form.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// The in-process representation of a field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
    /// Duration; wire form is integer milliseconds.
    Timespan(TimeDelta),
    /// Single-select option.
    Selection(SelectOption),
    /// Multi-select options, in selection order.
    MultiSelection(Vec<SelectOption>),
    UserGroup(UserGroupSelection),
    UserGroups(Vec<UserGroupSelection>),
    /// Target record ids of a reference field.
    References(Vec<String>),
    TextList(Vec<String>),
    NumberList(Vec<f64>),
    Attachments(Vec<Attachment>),
    Comments(Vec<Comment>),
    /// Arbitrary JSON, used by json-subtype text fields.
    Json(Value),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

impl From<NaiveTime> for FieldValue {
    fn from(v: NaiveTime) -> Self {
        FieldValue::Time(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<TimeDelta> for FieldValue {
    fn from(v: TimeDelta) -> Self {
        FieldValue::Timespan(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::TextList(v)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(v: Vec<&str>) -> Self {
        FieldValue::TextList(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        FieldValue::NumberList(v)
    }
}

impl From<UserGroupSelection> for FieldValue {
    fn from(v: UserGroupSelection) -> Self {
        FieldValue::UserGroup(v)
    }
}

impl From<Vec<UserGroupSelection>> for FieldValue {
    fn from(v: Vec<UserGroupSelection>) -> Self {
        FieldValue::UserGroups(v)
    }
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Timespan(_) => "timespan",
            FieldValue::Selection(_) => "selection",
            FieldValue::MultiSelection(_) => "selections",
            FieldValue::UserGroup(_) => "user/group",
            FieldValue::UserGroups(_) => "user/groups",
            FieldValue::References(_) => "references",
            FieldValue::TextList(_) => "text list",
            FieldValue::NumberList(_) => "number list",
            FieldValue::Attachments(_) => "attachments",
            FieldValue::Comments(_) => "comments",
            FieldValue::Json(_) => "json",
        }
    }
}

/// One field of a record: the definition plus the current value and a dirty
/// flag driving `patch`.
#[derive(Debug, Clone)]
pub struct Field {
    def: Arc<FieldDefinition>,
    value: Option<FieldValue>,
    dirty: bool,
}

impl Field {
    /// Create an unset field for a definition.
    pub fn new(def: Arc<FieldDefinition>) -> Self {
        Self {
            def,
            value: None,
            dirty: false,
        }
    }

    pub fn def(&self) -> &FieldDefinition {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Current value, if set.
    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// True when the field changed since hydration or the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Validate, coerce, and store a value. Readonly fields reject all
    /// assignment; restricted user/group fields additionally require the
    /// selection to be directly allowed (record-level assignment resolves
    /// indirect memberships first).
    pub fn set(&mut self, input: impl Into<FieldValue>) -> Result<(), ValueError> {
        self.check_writable()?;
        let value = self.coerce(input.into())?;
        self.check_allow(&value)?;
        self.value = Some(value);
        self.dirty = true;
        Ok(())
    }

    /// Store a value whose allow-list evaluation already happened.
    pub(crate) fn set_validated(&mut self, input: FieldValue) -> Result<(), ValueError> {
        self.check_writable()?;
        let value = self.coerce(input)?;
        self.value = Some(value);
        self.dirty = true;
        Ok(())
    }

    /// Reset the field to unset.
    pub fn clear(&mut self) -> Result<(), ValueError> {
        self.check_writable()?;
        self.value = None;
        self.dirty = true;
        Ok(())
    }

    fn check_writable(&self) -> Result<(), ValueError> {
        if self.def.readonly {
            return Err(ValueError::new(format!(
                "Cannot set readonly field \"{}\"",
                self.def.name
            )));
        }
        Ok(())
    }

    /// True when assigning `selection_id` needs a directory lookup before the
    /// allow-list can be evaluated.
    pub(crate) fn needs_allow_resolution(&self, selection_id: &str) -> bool {
        match self.def.field_type {
            FieldType::UserGroup { ref allow, .. } => {
                !allow.is_unrestricted() && !directly_allows(allow, selection_id)
            }
            _ => false,
        }
    }

    fn check_allow(&self, value: &FieldValue) -> Result<(), ValueError> {
        let FieldType::UserGroup { ref allow, .. } = self.def.field_type else {
            return Ok(());
        };
        if allow.is_unrestricted() {
            return Ok(());
        }

        let selections: Vec<&UserGroupSelection> = match value {
            FieldValue::UserGroup(selection) => vec![selection],
            FieldValue::UserGroups(selections) => selections.iter().collect(),
            _ => return Ok(()),
        };
        for selection in selections {
            if !directly_allows(allow, &selection.id) {
                return Err(ValueError::new(format!(
                    "User/group \"{}\" is not an allowed value for field \"{}\"",
                    selection.name, self.def.name
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Coercion and validation
    // =========================================================================

    fn coerce(&self, input: FieldValue) -> Result<FieldValue, ValueError> {
        let name = &self.def.name;
        match self.def.field_type {
            FieldType::Text {
                subtype,
                ref constraints,
            } => {
                let text = match input {
                    FieldValue::Text(s) => s,
                    FieldValue::Number(n) => format_number(n),
                    FieldValue::Json(v) if subtype == TextSubtype::Json => v.to_string(),
                    other => return Err(self.type_mismatch(&other)),
                };
                check_text(name, &text, constraints)?;
                Ok(FieldValue::Text(text))
            }
            FieldType::Numeric { min, max } => {
                let FieldValue::Number(n) = input else {
                    return Err(self.type_mismatch(&input));
                };
                if let Some(min) = min {
                    if n < min {
                        return Err(ValueError::new(format!(
                            "Field \"{}\" value {} is below the minimum {}",
                            name,
                            format_number(n),
                            format_number(min)
                        )));
                    }
                }
                if let Some(max) = max {
                    if n > max {
                        return Err(ValueError::new(format!(
                            "Field \"{}\" value {} is above the maximum {}",
                            name,
                            format_number(n),
                            format_number(max)
                        )));
                    }
                }
                Ok(FieldValue::Number(n))
            }
            FieldType::Date { subtype } => match (subtype, input) {
                (DateSubtype::DateTime, FieldValue::DateTime(dt)) => Ok(FieldValue::DateTime(dt)),
                (DateSubtype::DateTime, FieldValue::Date(d)) => Ok(FieldValue::DateTime(
                    Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap_or_default()),
                )),
                (DateSubtype::Date, FieldValue::Date(d)) => Ok(FieldValue::Date(d)),
                (DateSubtype::Date, FieldValue::DateTime(dt)) => {
                    Ok(FieldValue::Date(dt.date_naive()))
                }
                (DateSubtype::Time, FieldValue::Time(t)) => Ok(FieldValue::Time(t)),
                (DateSubtype::Time, FieldValue::DateTime(dt)) => Ok(FieldValue::Time(dt.time())),
                (DateSubtype::Timespan, FieldValue::Timespan(d)) => Ok(FieldValue::Timespan(d)),
                (_, other) => Err(self.type_mismatch(&other)),
            },
            FieldType::ValuesList { multi, ref options } => {
                if multi {
                    let names = match input {
                        FieldValue::TextList(names) => names,
                        FieldValue::Text(name) => vec![name],
                        FieldValue::MultiSelection(selections) => {
                            selections.into_iter().map(|s| s.name).collect()
                        }
                        other => return Err(self.type_mismatch(&other)),
                    };
                    let selections = names
                        .iter()
                        .map(|n| self.resolve_option(options, n))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(FieldValue::MultiSelection(selections))
                } else {
                    let option_name = match input {
                        FieldValue::Text(name) => name,
                        FieldValue::Selection(selection) => selection.name,
                        other => return Err(self.type_mismatch(&other)),
                    };
                    Ok(FieldValue::Selection(
                        self.resolve_option(options, &option_name)?,
                    ))
                }
            }
            FieldType::UserGroup { multi, .. } => match (multi, input) {
                (false, FieldValue::UserGroup(selection)) => Ok(FieldValue::UserGroup(selection)),
                (true, FieldValue::UserGroups(selections)) => {
                    Ok(FieldValue::UserGroups(selections))
                }
                (true, FieldValue::UserGroup(selection)) => {
                    Ok(FieldValue::UserGroups(vec![selection]))
                }
                (_, other) => Err(self.type_mismatch(&other)),
            },
            FieldType::Reference { .. } => {
                let ids = match input {
                    FieldValue::References(ids) => ids,
                    FieldValue::Text(id) => vec![id],
                    FieldValue::TextList(ids) => ids,
                    other => return Err(self.type_mismatch(&other)),
                };
                if ids.iter().any(String::is_empty) {
                    return Err(ValueError::new(format!(
                        "Field \"{}\" reference ids cannot be empty",
                        name
                    )));
                }
                Ok(FieldValue::References(ids))
            }
            FieldType::List {
                item_type,
                min_items,
                max_items,
                ref item_constraints,
                item_min,
                item_max,
            } => self.coerce_list(
                input,
                item_type,
                min_items,
                max_items,
                item_constraints,
                item_min,
                item_max,
            ),
            FieldType::Tracking
            | FieldType::Attachment
            | FieldType::Comments
            | FieldType::History => {
                // Unreachable through set(); kept total for hydration reuse
                Err(ValueError::new(format!(
                    "Cannot set readonly field \"{}\"",
                    name
                )))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn coerce_list(
        &self,
        input: FieldValue,
        item_type: ListItemType,
        min_items: Option<u64>,
        max_items: Option<u64>,
        item_constraints: &TextConstraints,
        item_min: Option<f64>,
        item_max: Option<f64>,
    ) -> Result<FieldValue, ValueError> {
        let name = &self.def.name;
        let count = |len: usize| -> Result<(), ValueError> {
            if let Some(min) = min_items {
                if (len as u64) < min {
                    return Err(ValueError::new(format!(
                        "Field \"{}\" must have at least {} items",
                        name, min
                    )));
                }
            }
            if let Some(max) = max_items {
                if (len as u64) > max {
                    return Err(ValueError::new(format!(
                        "Field \"{}\" must have at most {} items",
                        name, max
                    )));
                }
            }
            Ok(())
        };

        match (item_type, input) {
            (ListItemType::Text, FieldValue::TextList(items)) => {
                count(items.len())?;
                for item in &items {
                    check_text(name, item, item_constraints)?;
                }
                Ok(FieldValue::TextList(items))
            }
            (ListItemType::Text, FieldValue::Text(item)) => {
                self.coerce_list(
                    FieldValue::TextList(vec![item]),
                    item_type,
                    min_items,
                    max_items,
                    item_constraints,
                    item_min,
                    item_max,
                )
            }
            (ListItemType::Numeric, FieldValue::NumberList(items)) => {
                count(items.len())?;
                for &item in &items {
                    if item_min.is_some_and(|min| item < min)
                        || item_max.is_some_and(|max| item > max)
                    {
                        return Err(ValueError::new(format!(
                            "Field \"{}\" item {} is out of range",
                            name,
                            format_number(item)
                        )));
                    }
                }
                Ok(FieldValue::NumberList(items))
            }
            (ListItemType::Numeric, FieldValue::Number(item)) => self.coerce_list(
                FieldValue::NumberList(vec![item]),
                item_type,
                min_items,
                max_items,
                item_constraints,
                item_min,
                item_max,
            ),
            (_, other) => Err(self.type_mismatch(&other)),
        }
    }

    fn resolve_option(
        &self,
        options: &[SelectOption],
        name: &str,
    ) -> Result<SelectOption, ValueError> {
        options
            .iter()
            .find(|o| o.name == name)
            .cloned()
            .ok_or_else(|| {
                ValueError::new(format!(
                    "\"{}\" is not a valid option for field \"{}\". Valid options: {}",
                    name,
                    self.def.name,
                    options
                        .iter()
                        .map(|o| o.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    fn type_mismatch(&self, input: &FieldValue) -> ValueError {
        ValueError::new(format!(
            "Field \"{}\" ({}) does not accept {} values",
            self.def.name,
            self.def.field_type.class_name(),
            input.type_name()
        ))
    }

    // =========================================================================
    // Wire conversion
    // =========================================================================

    /// Accept a raw wire value from the server, bypassing the readonly check.
    pub(crate) fn hydrate(&mut self, wire: &Value) -> Result<(), ValueError> {
        if wire.is_null() {
            self.value = None;
            self.dirty = false;
            return Ok(());
        }

        let name = &self.def.name;
        let parse_error =
            || ValueError::new(format!("Unparseable wire value for field \"{}\"", name));

        let value = match self.def.field_type {
            FieldType::Text { .. } | FieldType::Tracking => {
                FieldValue::Text(wire.as_str().ok_or_else(parse_error)?.to_string())
            }
            FieldType::Numeric { .. } => {
                FieldValue::Number(wire.as_f64().ok_or_else(parse_error)?)
            }
            FieldType::Date { subtype } => {
                if subtype == DateSubtype::Timespan {
                    let millis = wire.as_i64().ok_or_else(parse_error)?;
                    FieldValue::Timespan(TimeDelta::milliseconds(millis))
                } else {
                    let instant = DateTime::parse_from_rfc3339(
                        wire.as_str().ok_or_else(parse_error)?,
                    )
                    .map_err(|_| parse_error())?
                    .with_timezone(&Utc);
                    match subtype {
                        DateSubtype::Date => FieldValue::Date(instant.date_naive()),
                        DateSubtype::Time => FieldValue::Time(instant.time()),
                        _ => FieldValue::DateTime(instant),
                    }
                }
            }
            FieldType::ValuesList { multi, .. } => {
                let parse_one = |v: &Value| -> Result<SelectOption, ValueError> {
                    Ok(SelectOption {
                        id: v
                            .get("id")
                            .and_then(Value::as_str)
                            .ok_or_else(parse_error)?
                            .to_string(),
                        name: v
                            .get("value")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                };
                if multi {
                    let raw = wire.as_array().ok_or_else(parse_error)?;
                    FieldValue::MultiSelection(
                        raw.iter().map(parse_one).collect::<Result<_, _>>()?,
                    )
                } else {
                    FieldValue::Selection(parse_one(wire)?)
                }
            }
            FieldType::UserGroup { multi, .. } => {
                if multi {
                    let raw = wire.as_array().ok_or_else(parse_error)?;
                    FieldValue::UserGroups(
                        raw.iter()
                            .map(|v| UserGroupSelection::from_wire(v).ok_or_else(parse_error))
                            .collect::<Result<_, _>>()?,
                    )
                } else {
                    FieldValue::UserGroup(
                        UserGroupSelection::from_wire(wire).ok_or_else(parse_error)?,
                    )
                }
            }
            FieldType::Reference { .. } => {
                let ids = match wire {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).ok_or_else(parse_error))
                        .collect::<Result<_, _>>()?,
                    Value::String(id) => vec![id.clone()],
                    _ => return Err(parse_error()),
                };
                FieldValue::References(ids)
            }
            FieldType::List { item_type, .. } => {
                let items = wire.as_array().ok_or_else(parse_error)?;
                // Servers send either bare values or {id, value} item objects
                let unwrap_item = |v: &Value| v.get("value").unwrap_or(v).clone();
                match item_type {
                    ListItemType::Text => FieldValue::TextList(
                        items
                            .iter()
                            .map(|v| {
                                unwrap_item(v)
                                    .as_str()
                                    .map(str::to_string)
                                    .ok_or_else(parse_error)
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    ListItemType::Numeric => FieldValue::NumberList(
                        items
                            .iter()
                            .map(|v| unwrap_item(v).as_f64().ok_or_else(parse_error))
                            .collect::<Result<_, _>>()?,
                    ),
                }
            }
            FieldType::Attachment => {
                let raw = wire.as_array().ok_or_else(parse_error)?;
                FieldValue::Attachments(raw.iter().filter_map(Attachment::from_wire).collect())
            }
            FieldType::Comments => {
                let raw = wire.as_array().ok_or_else(parse_error)?;
                FieldValue::Comments(raw.iter().filter_map(Comment::from_wire).collect())
            }
            FieldType::History => return Ok(()),
        };

        self.value = Some(value);
        self.dirty = false;
        Ok(())
    }

    /// The wire form of the current value (`null` when unset).
    pub fn to_wire(&self) -> Value {
        match self.value {
            Some(ref value) => value_to_wire(value),
            None => Value::Null,
        }
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// Coerce a candidate value and produce the form used in report filter
    /// payloads. Selections and user/groups collapse to their ids.
    pub fn report_projection(&self, input: impl Into<FieldValue>) -> Result<Value, ValueError> {
        let value = self.coerce(input.into())?;
        Ok(project_ids(&value))
    }

    /// Coerce a candidate value and produce the form used in bulk-modify
    /// payloads. Same id collapse as report filters.
    pub fn bulk_modify_projection(
        &self,
        input: impl Into<FieldValue>,
    ) -> Result<Value, ValueError> {
        self.report_projection(input)
    }

    // Sub-resource mutation paths, used by the record cursors. These bypass
    // the readonly check: attachments and comments mutate only through them.

    pub(crate) fn append_attachments(&mut self, attachments: Vec<Attachment>) {
        match self.value {
            Some(FieldValue::Attachments(ref mut existing)) => existing.extend(attachments),
            _ => self.value = Some(FieldValue::Attachments(attachments)),
        }
    }

    pub(crate) fn append_comment(&mut self, comment: Comment) {
        match self.value {
            Some(FieldValue::Comments(ref mut existing)) => existing.push(comment),
            _ => self.value = Some(FieldValue::Comments(vec![comment])),
        }
    }

    pub(crate) fn set_reference_ids(&mut self, ids: Vec<String>) {
        self.value = Some(FieldValue::References(ids));
        self.dirty = true;
    }
}

fn directly_allows(allow: &UserGroupAllowList, id: &str) -> bool {
    allow.users.iter().any(|u| u == id) || allow.groups.iter().any(|g| g == id)
}

fn check_text(
    field_name: &str,
    text: &str,
    constraints: &TextConstraints,
) -> Result<(), ValueError> {
    let (length, unit_name) = match constraints.unit {
        LengthUnit::Characters => (text.chars().count() as u64, "characters"),
        LengthUnit::Words => (text.split_whitespace().count() as u64, "words"),
    };
    if let Some(min) = constraints.min_length {
        if length < min {
            return Err(ValueError::new(format!(
                "Field \"{}\" must be at least {} {}",
                field_name, min, unit_name
            )));
        }
    }
    if let Some(max) = constraints.max_length {
        if length > max {
            return Err(ValueError::new(format!(
                "Field \"{}\" must be at most {} {}",
                field_name, max, unit_name
            )));
        }
    }
    Ok(())
}

/// Render a float the way the server does: integral values without a
/// fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn value_to_wire(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => json!(s),
        FieldValue::Number(n) => number_value(*n),
        FieldValue::Date(d) => json!(Utc
            .from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap_or_default())
            .to_rfc3339_opts(SecondsFormat::Millis, true)),
        FieldValue::Time(t) => {
            let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            json!(Utc
                .from_utc_datetime(&date.and_time(*t))
                .to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        FieldValue::DateTime(dt) => json!(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        FieldValue::Timespan(d) => json!(d.num_milliseconds()),
        FieldValue::Selection(o) => selection_to_wire(o),
        FieldValue::MultiSelection(options) => {
            Value::Array(options.iter().map(selection_to_wire).collect())
        }
        FieldValue::UserGroup(s) => s.to_wire(),
        FieldValue::UserGroups(selections) => {
            Value::Array(selections.iter().map(UserGroupSelection::to_wire).collect())
        }
        FieldValue::References(ids) => json!(ids),
        FieldValue::TextList(items) => json!(items),
        FieldValue::NumberList(items) => {
            Value::Array(items.iter().map(|&n| number_value(n)).collect())
        }
        FieldValue::Attachments(attachments) => {
            Value::Array(attachments.iter().map(Attachment::to_wire).collect())
        }
        FieldValue::Comments(comments) => {
            Value::Array(comments.iter().map(Comment::to_wire).collect())
        }
        FieldValue::Json(v) => v.clone(),
    }
}

fn selection_to_wire(option: &SelectOption) -> Value {
    json!({
        "$type": VALUE_SELECTION_TYPE,
        "id": option.id,
        "value": option.name,
    })
}

/// Collapse selections and user/groups to ids; everything else keeps its wire
/// form.
fn project_ids(value: &FieldValue) -> Value {
    match value {
        FieldValue::Selection(o) => json!(o.id),
        FieldValue::MultiSelection(options) => {
            json!(options.iter().map(|o| o.id.as_str()).collect::<Vec<_>>())
        }
        FieldValue::UserGroup(s) => json!(s.id),
        FieldValue::UserGroups(selections) => {
            json!(selections.iter().map(|s| s.id.as_str()).collect::<Vec<_>>())
        }
        other => value_to_wire(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(raw: Value) -> Field {
        Field::new(Arc::new(FieldDefinition::parse(&raw).unwrap()))
    }

    fn text_field() -> Field {
        field(json!({
            "$type": "Core.Models.Fields.TextField, Core",
            "id": "fid-text", "name": "Summary", "key": "summary",
        }))
    }

    fn numeric_field() -> Field {
        field(json!({
            "$type": "Core.Models.Fields.NumericField, Core",
            "id": "fid-num", "name": "Severity Score", "key": "severity-score",
            "min": 0.0, "max": 10.0,
        }))
    }

    fn select_field() -> Field {
        field(json!({
            "$type": "Core.Models.Fields.ValuesListField, Core",
            "id": "fid-sel", "name": "Severity", "key": "severity",
            "values": [
                {"id": "v-low", "name": "Low"},
                {"id": "v-high", "name": "High"},
            ],
        }))
    }

    #[test]
    fn test_text_set_and_wire() {
        let mut f = text_field();
        f.set("hello").unwrap();
        assert!(f.is_dirty());
        assert_eq!(f.to_wire(), json!("hello"));

        // Numbers coerce to their string form
        f.set(5i64).unwrap();
        assert_eq!(f.to_wire(), json!("5"));
    }

    #[test]
    fn test_text_length_constraints() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.TextField, Core",
            "id": "f", "name": "Code", "key": "code",
            "maxLength": 3,
        }));
        f.set("abc").unwrap();
        let err = f.set("abcd").unwrap_err();
        assert_eq!(err.to_string(), "Field \"Code\" must be at most 3 characters");
    }

    #[test]
    fn test_word_count_constraints() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.TextField, Core",
            "id": "f", "name": "Title", "key": "title",
            "lengthType": "words", "minLength": 2,
        }));
        assert!(f.set("one").is_err());
        f.set("two words").unwrap();
    }

    #[test]
    fn test_numeric_range() {
        let mut f = numeric_field();
        f.set(5i64).unwrap();
        assert_eq!(f.to_wire(), json!(5));

        let err = f.set(11i64).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field \"Severity Score\" value 11 is above the maximum 10"
        );
        // Failed set leaves the previous value
        assert_eq!(f.to_wire(), json!(5));
    }

    #[test]
    fn test_numeric_rejects_text() {
        let mut f = numeric_field();
        let err = f.set("five").unwrap_err();
        assert!(err.to_string().contains("does not accept text values"));
    }

    #[test]
    fn test_readonly_rejects_set_but_hydrates() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.TrackingField, Core",
            "id": "f", "name": "Tracking Id", "key": "tracking-id",
        }));
        let err = f.set("ACR-9").unwrap_err();
        assert_eq!(err.to_string(), "Cannot set readonly field \"Tracking Id\"");

        f.hydrate(&json!("ACR-9")).unwrap();
        assert_eq!(f.to_wire(), json!("ACR-9"));
        assert!(!f.is_dirty());
    }

    #[test]
    fn test_selection_resolves_option_id() {
        let mut f = select_field();
        f.set("High").unwrap();
        assert_eq!(
            f.to_wire(),
            json!({"$type": VALUE_SELECTION_TYPE, "id": "v-high", "value": "High"})
        );
    }

    #[test]
    fn test_selection_unknown_option() {
        let mut f = select_field();
        let err = f.set("Critical").unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"Critical\" is not a valid option for field \"Severity\". Valid options: Low, High"
        );
    }

    #[test]
    fn test_multi_selection() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.ValuesListField, Core",
            "id": "f", "name": "Tags", "key": "tags",
            "selectionType": "multi",
            "values": [
                {"id": "t1", "name": "phishing"},
                {"id": "t2", "name": "malware"},
            ],
        }));
        f.set(vec!["malware", "phishing"]).unwrap();
        let wire = f.to_wire();
        assert_eq!(wire[0]["id"], "t2");
        assert_eq!(wire[1]["id"], "t1");
    }

    #[test]
    fn test_date_subtype_coercions() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap();

        let mut date = field(json!({
            "$type": "Core.Models.Fields.DateField, Core",
            "id": "f", "name": "Due", "key": "due", "inputType": "date",
        }));
        date.set(dt).unwrap();
        assert_eq!(
            date.value(),
            Some(&FieldValue::Date(dt.date_naive()))
        );
        assert_eq!(date.to_wire(), json!("2024-05-01T00:00:00.000Z"));

        let mut time = field(json!({
            "$type": "Core.Models.Fields.DateField, Core",
            "id": "f", "name": "At", "key": "at", "inputType": "time",
        }));
        time.set(dt).unwrap();
        assert_eq!(time.value(), Some(&FieldValue::Time(dt.time())));

        let mut instant = field(json!({
            "$type": "Core.Models.Fields.DateField, Core",
            "id": "f", "name": "When", "key": "when",
        }));
        instant.set(dt).unwrap();
        assert_eq!(instant.to_wire(), json!("2024-05-01T13:30:00.000Z"));
    }

    #[test]
    fn test_timespan_wire_is_milliseconds() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.DateField, Core",
            "id": "f", "name": "Duration", "key": "duration", "inputType": "timespan",
        }));
        f.set(TimeDelta::seconds(90)).unwrap();
        assert_eq!(f.to_wire(), json!(90_000));

        f.hydrate(&json!(61_000)).unwrap();
        assert_eq!(f.value(), Some(&FieldValue::Timespan(TimeDelta::seconds(61))));
    }

    #[test]
    fn test_datetime_wire_round_trip() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.DateField, Core",
            "id": "f", "name": "When", "key": "when",
        }));
        f.hydrate(&json!("2024-05-01T13:30:00.000Z")).unwrap();
        assert_eq!(f.to_wire(), json!("2024-05-01T13:30:00.000Z"));
    }

    #[test]
    fn test_usergroup_allow_list_direct() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.UserGroupField, Core",
            "id": "f", "name": "Owner", "key": "owner",
            "members": [{"id": "u1", "itemType": "user"}],
        }));
        f.set(UserGroupSelection::new("u1", "Admin")).unwrap();

        let err = f.set(UserGroupSelection::new("u2", "Other")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "User/group \"Other\" is not an allowed value for field \"Owner\""
        );
        assert!(f.needs_allow_resolution("u2"));
        assert!(!f.needs_allow_resolution("u1"));
    }

    #[test]
    fn test_unrestricted_usergroup() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.UserGroupField, Core",
            "id": "f", "name": "Owner", "key": "owner",
        }));
        f.set(UserGroupSelection::new("anyone", "Anyone")).unwrap();
        assert!(!f.needs_allow_resolution("anyone"));
    }

    #[test]
    fn test_reference_ids() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.ReferenceField, Core",
            "id": "f", "name": "Related", "key": "related", "targetId": "appB",
        }));
        f.set(FieldValue::References(vec!["r1".into(), "r2".into()]))
            .unwrap();
        assert_eq!(f.to_wire(), json!(["r1", "r2"]));

        // Single id coerces to a one-element list
        f.set("r3").unwrap();
        assert_eq!(f.to_wire(), json!(["r3"]));
    }

    #[test]
    fn test_list_item_validation() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.ListField, Core",
            "id": "f", "name": "Indicators", "key": "indicators",
            "itemType": "numeric", "maxItems": 2, "itemMax": 100.0,
        }));
        f.set(FieldValue::NumberList(vec![1.0, 2.0])).unwrap();

        let err = f
            .set(FieldValue::NumberList(vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Field \"Indicators\" must have at most 2 items");

        let err = f.set(FieldValue::NumberList(vec![101.0])).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_list_hydrates_item_objects() {
        let mut f = field(json!({
            "$type": "Core.Models.Fields.ListField, Core",
            "id": "f", "name": "Hosts", "key": "hosts",
        }));
        // Wire form may wrap items in {id, value} objects
        f.hydrate(&json!([
            {"id": "i1", "value": "web01"},
            {"id": "i2", "value": "web02"},
        ]))
        .unwrap();
        assert_eq!(
            f.value(),
            Some(&FieldValue::TextList(vec!["web01".into(), "web02".into()]))
        );
    }

    #[test]
    fn test_report_projection_collapses_ids() {
        let f = select_field();
        assert_eq!(f.report_projection("High").unwrap(), json!("v-high"));

        let f = text_field();
        assert_eq!(f.report_projection("hi").unwrap(), json!("hi"));
    }

    #[test]
    fn test_clear_resets_value() {
        let mut f = text_field();
        f.set("hello").unwrap();
        f.clear().unwrap();
        assert!(!f.is_set());
        assert_eq!(f.to_wire(), Value::Null);
    }

    #[test]
    fn test_hydrate_null_unsets() {
        let mut f = text_field();
        f.set("hello").unwrap();
        f.hydrate(&Value::Null).unwrap();
        assert!(!f.is_set());
        assert!(!f.is_dirty());
    }
}
