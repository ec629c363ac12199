//! Field definitions parsed from an app's field catalog.
//!
//! Every entry in an app schema carries a `$type` wire tag naming its field
//! class. The tag (including legacy namespace aliases) dispatches into
//! [`FieldType`], a tagged variant holding the type-specific configuration.

use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};

/// Subtype of a text field, from the schema's `inputType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSubtype {
    #[default]
    Text,
    Email,
    Url,
    Ip,
    Telephone,
    Json,
    Multiline,
    RichText,
}

impl TextSubtype {
    fn parse(input_type: &str) -> Self {
        match input_type {
            "email" => Self::Email,
            "url" => Self::Url,
            "ip" => Self::Ip,
            "telephone" => Self::Telephone,
            "json" => Self::Json,
            "multiline" => Self::Multiline,
            "richtext" | "rich text" => Self::RichText,
            _ => Self::Text,
        }
    }
}

/// Subtype of a date field, from the schema's `inputType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSubtype {
    Date,
    Time,
    #[default]
    DateTime,
    Timespan,
}

impl DateSubtype {
    fn parse(input_type: &str) -> Self {
        match input_type {
            "date" => Self::Date,
            "time" => Self::Time,
            "timespan" => Self::Timespan,
            _ => Self::DateTime,
        }
    }
}

/// Whether text length constraints count characters or words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Characters,
    Words,
}

/// Length bounds on a text value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConstraints {
    pub unit: LengthUnit,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

impl TextConstraints {
    fn parse(raw: &Value) -> Self {
        let unit = match raw.get("lengthType").and_then(Value::as_str) {
            Some("words") => LengthUnit::Words,
            _ => LengthUnit::Characters,
        };
        Self {
            unit,
            min_length: raw.get("minLength").and_then(Value::as_u64),
            max_length: raw.get("maxLength").and_then(Value::as_u64),
        }
    }
}

/// One option of a values-list field, with its server-stable id.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
}

/// Item type of a list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListItemType {
    #[default]
    Text,
    Numeric,
}

/// Who a user/group field accepts, from the schema's member configuration.
#[derive(Debug, Clone, Default)]
pub struct UserGroupAllowList {
    pub show_all_users: bool,
    pub show_all_groups: bool,
    /// Directly allowed user ids.
    pub users: Vec<String>,
    /// Directly allowed group ids.
    pub groups: Vec<String>,
    /// Groups whose member users are allowed.
    pub member_groups: Vec<String>,
    /// Groups whose subgroups are allowed.
    pub subgroup_groups: Vec<String>,
}

impl UserGroupAllowList {
    fn parse(raw: &Value) -> Self {
        let mut allow = Self {
            show_all_users: raw
                .get("showAllUsers")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            show_all_groups: raw
                .get("showAllGroups")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            ..Self::default()
        };

        let members = raw
            .get("members")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for member in members {
            let Some(id) = member.get("id").and_then(Value::as_str) else {
                continue;
            };
            let item_type = member.get("itemType").and_then(Value::as_str);
            let selection = member.get("selectionType").and_then(Value::as_str);
            match (item_type, selection) {
                (Some("user"), _) => allow.users.push(id.to_string()),
                (Some("group"), Some("members")) => allow.member_groups.push(id.to_string()),
                (Some("group"), Some("subgroups")) => allow.subgroup_groups.push(id.to_string()),
                (Some("group"), _) => allow.groups.push(id.to_string()),
                _ => {}
            }
        }
        allow
    }

    /// True when nothing restricts the field (no member list, no show-all
    /// flags set to false meaningfully). An unconfigured field accepts anyone.
    pub fn is_unrestricted(&self) -> bool {
        self.users.is_empty()
            && self.groups.is_empty()
            && self.member_groups.is_empty()
            && self.subgroup_groups.is_empty()
            && !self.show_all_users
            && !self.show_all_groups
    }
}

/// The typed half of a field definition: one variant per field class, with
/// that class's configuration inline.
#[derive(Debug, Clone)]
pub enum FieldType {
    Text {
        subtype: TextSubtype,
        constraints: TextConstraints,
    },
    Tracking,
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
    },
    Date {
        subtype: DateSubtype,
    },
    ValuesList {
        multi: bool,
        options: Vec<SelectOption>,
    },
    UserGroup {
        multi: bool,
        allow: UserGroupAllowList,
    },
    Reference {
        target_app_id: String,
    },
    List {
        item_type: ListItemType,
        min_items: Option<u64>,
        max_items: Option<u64>,
        item_constraints: TextConstraints,
        item_min: Option<f64>,
        item_max: Option<f64>,
    },
    Attachment,
    Comments,
    History,
}

impl FieldType {
    /// Human name of the field class, used in error messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "Text",
            FieldType::Tracking => "Tracking",
            FieldType::Numeric { .. } => "Numeric",
            FieldType::Date { .. } => "Date",
            FieldType::ValuesList { .. } => "ValuesList",
            FieldType::UserGroup { .. } => "UserGroup",
            FieldType::Reference { .. } => "Reference",
            FieldType::List { .. } => "List",
            FieldType::Attachment => "Attachment",
            FieldType::Comments => "Comments",
            FieldType::History => "History",
        }
    }

    /// True for field classes that can never be assigned directly.
    pub fn is_readonly_class(&self) -> bool {
        matches!(
            self,
            FieldType::Tracking | FieldType::Attachment | FieldType::Comments | FieldType::History
        )
    }

    /// True for field classes excluded from bulk modify payloads.
    pub fn forbids_bulk_modify(&self) -> bool {
        matches!(
            self,
            FieldType::Attachment | FieldType::Comments | FieldType::History
        )
    }
}

/// One entry of an app's field catalog.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    pub key: String,
    /// The original `$type` tag, preserved for round trips.
    pub wire_type: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Set when the schema marks the field readOnly or attaches a formula.
    pub readonly: bool,
}

impl FieldDefinition {
    /// Parse one raw field-definition object from an app schema.
    pub fn parse(raw: &Value) -> Result<Self> {
        let wire_type = raw
            .get("$type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidValue(
                    "field definition missing $type tag".to_string(),
                ))
            })?
            .to_string();

        let field_type = dispatch_wire_tag(&wire_type, raw)?;

        let readonly = raw
            .get("readOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || raw
                .get("formula")
                .map(|f| !f.is_null())
                .unwrap_or(false)
            || field_type.is_readonly_class();

        Ok(Self {
            id: str_attr(raw, "id"),
            name: str_attr(raw, "name"),
            key: str_attr(raw, "key"),
            wire_type,
            field_type,
            required: raw
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            readonly,
        })
    }
}

fn str_attr(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Resolve a `$type` tag to its field class.
///
/// Tags have moved namespaces across server versions (for example
/// `Core.Models.Fields.TextField, Core` vs
/// `Core.Models.Fields.Text.TextField, Core`), so dispatch keys on the final
/// class-name segment.
fn dispatch_wire_tag(tag: &str, raw: &Value) -> Result<FieldType> {
    let class = tag
        .split(',')
        .next()
        .unwrap_or(tag)
        .rsplit('.')
        .next()
        .unwrap_or(tag);

    let input_type = raw.get("inputType").and_then(Value::as_str).unwrap_or("");
    let multi = raw
        .get("selectionType")
        .and_then(Value::as_str)
        .map(|s| s == "multi")
        .unwrap_or(false);

    let field_type = match class {
        "TextField" => FieldType::Text {
            subtype: TextSubtype::parse(input_type),
            constraints: TextConstraints::parse(raw),
        },
        "TrackingField" => FieldType::Tracking,
        "NumericField" => FieldType::Numeric {
            min: raw.get("min").and_then(Value::as_f64),
            max: raw.get("max").and_then(Value::as_f64),
        },
        "DateField" => FieldType::Date {
            subtype: DateSubtype::parse(input_type),
        },
        "ValuesListField" => {
            let options = raw
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(|v| {
                    Some(SelectOption {
                        id: v.get("id")?.as_str()?.to_string(),
                        name: v.get("name")?.as_str()?.to_string(),
                    })
                })
                .collect();
            FieldType::ValuesList { multi, options }
        }
        "UserGroupField" => FieldType::UserGroup {
            multi,
            allow: UserGroupAllowList::parse(raw),
        },
        "ReferenceField" => FieldType::Reference {
            target_app_id: str_attr(raw, "targetId"),
        },
        "ListField" => FieldType::List {
            item_type: match raw.get("itemType").and_then(Value::as_str) {
                Some("numeric") => ListItemType::Numeric,
                _ => ListItemType::Text,
            },
            min_items: raw.get("minItems").and_then(Value::as_u64),
            max_items: raw.get("maxItems").and_then(Value::as_u64),
            item_constraints: TextConstraints::parse(raw),
            item_min: raw.get("itemMin").and_then(Value::as_f64),
            item_max: raw.get("itemMax").and_then(Value::as_f64),
        },
        "AttachmentField" | "AttachmentsField" => FieldType::Attachment,
        "CommentsField" => FieldType::Comments,
        "HistoryField" => FieldType::History,
        other => {
            return Err(Error::new(ErrorKind::InvalidValue(format!(
                "Unrecognized field wire type \"{}\" ({})",
                other, tag
            ))))
        }
    };

    Ok(field_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_field() {
        let raw = json!({
            "$type": "Core.Models.Fields.TextField, Core",
            "id": "fid-text",
            "name": "Summary",
            "key": "summary",
            "inputType": "multiline",
            "required": true,
            "maxLength": 500,
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        assert_eq!(def.id, "fid-text");
        assert_eq!(def.name, "Summary");
        assert!(def.required);
        assert!(!def.readonly);
        match def.field_type {
            FieldType::Text {
                subtype,
                constraints,
            } => {
                assert_eq!(subtype, TextSubtype::Multiline);
                assert_eq!(constraints.max_length, Some(500));
                assert_eq!(constraints.unit, LengthUnit::Characters);
            }
            ref other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_namespace_alias_dispatch() {
        let raw = json!({
            "$type": "Core.Models.Fields.Text.TextField, Core",
            "id": "f", "name": "N", "key": "n",
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        assert!(matches!(def.field_type, FieldType::Text { .. }));
    }

    #[test]
    fn test_formula_implies_readonly() {
        let raw = json!({
            "$type": "Core.Models.Fields.NumericField, Core",
            "id": "f", "name": "Score", "key": "score",
            "formula": "{{Severity}} * 2",
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        assert!(def.readonly);
    }

    #[test]
    fn test_values_list_options_and_selection_type() {
        let raw = json!({
            "$type": "Core.Models.Fields.ValuesListField, Core",
            "id": "f", "name": "Severity", "key": "severity",
            "selectionType": "multi",
            "values": [
                {"id": "v1", "name": "Low"},
                {"id": "v2", "name": "High"},
            ],
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        match def.field_type {
            FieldType::ValuesList { multi, ref options } => {
                assert!(multi);
                assert_eq!(options.len(), 2);
                assert_eq!(options[1].name, "High");
            }
            ref other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_usergroup_allow_list() {
        let raw = json!({
            "$type": "Core.Models.Fields.UserGroupField, Core",
            "id": "f", "name": "Owner", "key": "owner",
            "showAllUsers": false,
            "members": [
                {"id": "u1", "itemType": "user"},
                {"id": "g1", "itemType": "group"},
                {"id": "g2", "itemType": "group", "selectionType": "members"},
                {"id": "g3", "itemType": "group", "selectionType": "subgroups"},
            ],
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        match def.field_type {
            FieldType::UserGroup { ref allow, .. } => {
                assert_eq!(allow.users, vec!["u1"]);
                assert_eq!(allow.groups, vec!["g1"]);
                assert_eq!(allow.member_groups, vec!["g2"]);
                assert_eq!(allow.subgroup_groups, vec!["g3"]);
                assert!(!allow.is_unrestricted());
            }
            ref other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_tracking_is_readonly_class() {
        let raw = json!({
            "$type": "Core.Models.Fields.TrackingField, Core",
            "id": "f", "name": "Tracking Id", "key": "tracking-id",
        });
        let def = FieldDefinition::parse(&raw).unwrap();
        assert!(def.readonly);
        assert!(def.field_type.is_readonly_class());
        assert!(!def.field_type.forbids_bulk_modify());
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let raw = json!({
            "$type": "Core.Models.Fields.HologramField, Core",
            "id": "f", "name": "X", "key": "x",
        });
        assert!(FieldDefinition::parse(&raw).is_err());
    }

    #[test]
    fn test_date_subtypes() {
        for (input, expected) in [
            ("date", DateSubtype::Date),
            ("time", DateSubtype::Time),
            ("dateTime", DateSubtype::DateTime),
            ("timespan", DateSubtype::Timespan),
        ] {
            let raw = json!({
                "$type": "Core.Models.Fields.DateField, Core",
                "id": "f", "name": "When", "key": "when",
                "inputType": input,
            });
            let def = FieldDefinition::parse(&raw).unwrap();
            match def.field_type {
                FieldType::Date { subtype } => assert_eq!(subtype, expected),
                ref other => panic!("unexpected type: {other:?}"),
            }
        }
    }
}
