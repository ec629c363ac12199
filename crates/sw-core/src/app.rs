//! App schemas: the immutable field catalog of one application.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::fields::def::FieldDefinition;
use crate::fuzzy::close_matches;

/// An application: identity, acronym, and the field catalog. Field
/// definitions are indexed by id, name, and key simultaneously.
#[derive(Debug, Clone)]
pub struct App {
    pub id: String,
    pub name: String,
    pub acronym: String,
    pub description: String,
    /// Field definition id of the tracking field.
    pub tracking_field_id: String,
    fields: Vec<Arc<FieldDefinition>>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    raw: Value,
}

impl App {
    /// Build an app from its raw server document. Field definitions with
    /// unrecognized wire tags fail the whole parse; a schema the client
    /// cannot fully represent would corrupt records on save.
    pub fn from_raw(raw: Value) -> Result<Self> {
        let attr = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let mut fields = Vec::new();
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_key = HashMap::new();

        let raw_fields = raw
            .get("fields")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for raw_field in raw_fields {
            let def = Arc::new(FieldDefinition::parse(raw_field)?);
            let index = fields.len();
            by_id.insert(def.id.clone(), index);
            by_name.insert(def.name.clone(), index);
            if !def.key.is_empty() {
                by_key.insert(def.key.clone(), index);
            }
            fields.push(def);
        }

        Ok(Self {
            id: attr("id"),
            name: attr("name"),
            acronym: attr("acronym"),
            description: attr("description"),
            tracking_field_id: attr("trackingFieldId"),
            fields,
            by_id,
            by_name,
            by_key,
            raw,
        })
    }

    /// The raw server document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Field definitions in catalog order.
    pub fn field_definitions(&self) -> impl Iterator<Item = &Arc<FieldDefinition>> {
        self.fields.iter()
    }

    /// All field display names, in catalog order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a field definition by display name.
    pub fn field_by_name(&self, name: &str) -> Result<&Arc<FieldDefinition>> {
        self.by_name
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| self.unknown_field(name))
    }

    /// Look up a field definition by id.
    pub fn field_by_id(&self, id: &str) -> Result<&Arc<FieldDefinition>> {
        self.by_id
            .get(id)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| self.unknown_field(id))
    }

    /// Look up a field definition by key.
    pub fn field_by_key(&self, key: &str) -> Result<&Arc<FieldDefinition>> {
        self.by_key
            .get(key)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| self.unknown_field(key))
    }

    /// Resolve a name-or-key to the canonical field name.
    pub fn resolve_field_name(&self, name_or_key: &str) -> Option<&str> {
        self.by_name
            .get(name_or_key)
            .or_else(|| self.by_key.get(name_or_key))
            .map(|&i| self.fields[i].name.as_str())
    }

    fn unknown_field(&self, requested: &str) -> Error {
        let similar = close_matches(requested, self.fields.iter().map(|f| f.name.as_str()));
        Error::unknown_field(&self.to_string(), requested, similar)
    }
}

impl std::fmt::Display for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<App: {}>", self.name)
    }
}

impl PartialEq for App {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}

impl Eq for App {}

impl std::hash::Hash for App {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for App {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for App {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    pub(crate) fn sample_app_raw() -> Value {
        json!({
            "$type": "Core.Models.Application.Application, Core",
            "id": "aZx",
            "name": "Alerts",
            "acronym": "ACR",
            "description": "Security alerts",
            "trackingFieldId": "fid-track",
            "fields": [
                {
                    "$type": "Core.Models.Fields.TrackingField, Core",
                    "id": "fid-track", "name": "Tracking Id", "key": "tracking-id",
                },
                {
                    "$type": "Core.Models.Fields.TextField, Core",
                    "id": "fid-text", "name": "Text", "key": "text",
                },
                {
                    "$type": "Core.Models.Fields.NumericField, Core",
                    "id": "fid-num", "name": "Numeric", "key": "numeric",
                    "min": 0.0, "max": 10.0,
                },
                {
                    "$type": "Core.Models.Fields.ValuesListField, Core",
                    "id": "fid-sel", "name": "Required Select", "key": "required-select",
                    "required": true,
                    "values": [
                        {"id": "va", "name": "a"},
                        {"id": "vb", "name": "b"},
                        {"id": "vc", "name": "c"},
                    ],
                },
            ],
        })
    }

    #[test]
    fn test_triple_keyed_lookup() {
        let app = App::from_raw(sample_app_raw()).unwrap();
        assert_eq!(app.field_by_name("Numeric").unwrap().id, "fid-num");
        assert_eq!(app.field_by_id("fid-num").unwrap().name, "Numeric");
        assert_eq!(app.field_by_key("numeric").unwrap().name, "Numeric");
    }

    #[test]
    fn test_unknown_field_carries_suggestions() {
        let app = App::from_raw(sample_app_raw()).unwrap();
        let err = app.field_by_name("Numerc").unwrap_err();
        match err.kind {
            ErrorKind::UnknownField { ref similar, .. } => {
                assert_eq!(similar, &vec!["Numeric".to_string()]);
            }
            ref other => panic!("unexpected kind: {other:?}"),
        }
        assert!(err.to_string().contains("<App: Alerts>"));
    }

    #[test]
    fn test_resolve_field_name() {
        let app = App::from_raw(sample_app_raw()).unwrap();
        assert_eq!(app.resolve_field_name("Numeric"), Some("Numeric"));
        assert_eq!(app.resolve_field_name("numeric"), Some("Numeric"));
        assert_eq!(app.resolve_field_name("nope"), None);
    }

    #[test]
    fn test_equality_and_ordering() {
        let a = App::from_raw(sample_app_raw()).unwrap();
        let b = App::from_raw(sample_app_raw()).unwrap();
        assert_eq!(a, b);

        let mut raw = sample_app_raw();
        raw["name"] = json!("Incidents");
        let c = App::from_raw(raw).unwrap();
        assert_ne!(a, c);
        // Sorted by name
        assert!(a < c);
    }

    #[test]
    fn test_display() {
        let app = App::from_raw(sample_app_raw()).unwrap();
        assert_eq!(format!("{}", app), "<App: Alerts>");
    }
}
