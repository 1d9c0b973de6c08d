//! Schema definition, validation and document encoding.
//!
//! Every entity kind declares which fields it writes, which are required,
//! and how an unset optional field is represented remotely. Records are
//! encoded into documents and decoded back only through their schema.

use crate::{
    document::{Document, Fields},
    error::Result,
    timestamp::StoreTimestamp,
    CollectionName, Error,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// RFC 3339 on records, [`StoreTimestamp`] in documents
    Timestamp,
    StringList,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::StringList => write!(f, "StringList"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// How an unset optional field is written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnsetPolicy {
    /// The field is left out of the write entirely.
    #[default]
    Omit,
    /// Updates write an explicit null so the remote value is cleared.
    /// Creates still leave the field out.
    WriteNull,
}

/// Whether a payload is being encoded for a create or an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Definition of a field in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name as it appears in documents
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether this field is required
    pub required: bool,
    /// Remote representation when unset
    pub unset: UnsetPolicy,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            unset: UnsetPolicy::Omit,
        }
    }

    /// Create a new optional field definition that is omitted when unset.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unset: UnsetPolicy::Omit,
        }
    }

    /// Create a new optional field definition that updates clear with null.
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unset: UnsetPolicy::WriteNull,
        }
    }

    /// Encode a record value for writing.
    ///
    /// Returns `None` when nothing should be written for this field.
    pub fn encode(
        &self,
        value: Option<&serde_json::Value>,
        mode: WriteMode,
    ) -> Result<Option<serde_json::Value>> {
        let value = match value {
            Some(v) if !is_unset(v) => v,
            _ if self.required => return Err(Error::MissingRequiredField(self.name.clone())),
            _ => {
                return Ok(match (self.unset, mode) {
                    (UnsetPolicy::WriteNull, WriteMode::Update) => Some(serde_json::Value::Null),
                    _ => None,
                })
            }
        };

        if self.field_type == FieldType::Timestamp {
            let ts = StoreTimestamp::from_value(value).ok_or_else(|| self.mismatch(value))?;
            return Ok(Some(ts.to_value()));
        }

        self.validate_type(value)?;
        Ok(Some(value.clone()))
    }

    /// Decode a document value into its record representation.
    ///
    /// Returns `None` for absent or null values so `Option` fields stay `None`.
    pub fn decode(&self, value: Option<&serde_json::Value>) -> Result<Option<serde_json::Value>> {
        let value = match value {
            None | Some(serde_json::Value::Null) => return Ok(None),
            Some(v) => v,
        };

        if self.field_type == FieldType::Timestamp {
            let date = StoreTimestamp::from_value(value)
                .ok_or_else(|| self.mismatch(value))?
                .to_datetime()?;
            return Ok(Some(serde_json::Value::String(
                date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )));
        }

        self.validate_type(value)?;
        Ok(Some(value.clone()))
    }

    fn validate_type(&self, value: &serde_json::Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => StoreTimestamp::from_value(value).is_some(),
            FieldType::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_string())),
            FieldType::Json => true, // Any JSON is valid
        };

        if valid {
            Ok(())
        } else {
            Err(self.mismatch(value))
        }
    }

    fn mismatch(&self, value: &serde_json::Value) -> Error {
        Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type.to_string(),
            got: json_type_name(value).to_string(),
        }
    }
}

/// Whether a value counts as "not set": null, blank string or empty array.
pub fn is_unset(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

/// Schema for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    /// Remote collection name
    pub collection: CollectionName,
    /// Field that scopes records to a group (queried with equality)
    pub scope_field: String,
    /// Field definitions
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Create a new entity schema.
    pub fn new(
        collection: impl Into<CollectionName>,
        scope_field: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Self {
        Self {
            collection: collection.into(),
            scope_field: scope_field.into(),
            fields,
        }
    }

    /// Get a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Local cache key for one group's records of this kind.
    pub fn scope_key(&self, group_id: &str) -> String {
        format!("{}_{}", self.collection, group_id)
    }

    /// Encode a serialized record into document fields.
    ///
    /// `id` and undeclared keys are never written.
    pub fn encode(&self, payload: &serde_json::Value, mode: WriteMode) -> Result<Fields> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

        let mut fields = Fields::new();
        for def in &self.fields {
            if let Some(value) = def.encode(obj.get(&def.name), mode)? {
                fields.insert(def.name.clone(), value);
            }
        }

        Ok(fields)
    }

    /// Encode a single-field partial update.
    pub fn encode_field(&self, name: &str, value: &serde_json::Value) -> Result<Fields> {
        let def = self.field(name).ok_or_else(|| Error::UnknownField {
            collection: self.collection.clone(),
            field: name.to_string(),
        })?;

        let mut fields = Fields::new();
        if let Some(encoded) = def.encode(Some(value), WriteMode::Update)? {
            fields.insert(def.name.clone(), encoded);
        }
        Ok(fields)
    }

    /// Decode a document into the JSON shape of its record, `id` included.
    pub fn decode(&self, doc: &Document) -> Result<serde_json::Value> {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), serde_json::Value::String(doc.id.clone()));

        for def in &self.fields {
            let decoded = def.decode(doc.get(&def.name)).map_err(|e| Error::InvalidDocument {
                id: doc.id.clone(),
                reason: e.to_string(),
            })?;
            if let Some(value) = decoded {
                obj.insert(def.name.clone(), value);
            }
        }

        Ok(serde_json::Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_schema() -> EntitySchema {
        EntitySchema::new(
            "tasks",
            "groupId",
            vec![
                FieldDef::required("title", FieldType::String),
                FieldDef::required("dueDate", FieldType::Timestamp),
                FieldDef::required("groupId", FieldType::String),
                FieldDef::optional("completed", FieldType::Bool),
                FieldDef::optional("tags", FieldType::StringList),
                FieldDef::nullable("assignedTo", FieldType::String),
                FieldDef::optional("fee", FieldType::Float),
            ],
        )
    }

    #[test]
    fn encode_converts_timestamps_and_strips_unset() {
        let schema = test_schema();
        let payload = json!({
            "id": "ignored",
            "title": "Rehearsal",
            "dueDate": "2024-06-01T00:00:00Z",
            "groupId": "G1",
            "completed": false,
            "tags": [],
            "assignedTo": "  ",
            "fee": null,
            "undeclared": "dropped"
        });

        let fields = schema.encode(&payload, WriteMode::Create).unwrap();

        assert_eq!(
            serde_json::Value::Object(fields),
            json!({
                "title": "Rehearsal",
                "dueDate": {"seconds": 1_717_200_000i64, "nanoseconds": 0},
                "groupId": "G1",
                "completed": false
            })
        );
    }

    #[test]
    fn update_writes_null_for_nullable_fields() {
        let schema = test_schema();
        let payload = json!({
            "title": "Rehearsal",
            "dueDate": "2024-06-01T00:00:00Z",
            "groupId": "G1",
            "assignedTo": ""
        });

        let fields = schema.encode(&payload, WriteMode::Update).unwrap();
        assert_eq!(fields.get("assignedTo"), Some(&json!(null)));
        assert!(!fields.contains_key("tags"));
    }

    #[test]
    fn blank_required_field_is_missing() {
        let schema = test_schema();
        let payload = json!({"title": "", "dueDate": "2024-06-02T00:00:00Z", "groupId": "G1"});
        let result = schema.encode(&payload, WriteMode::Create);
        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "title"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let schema = test_schema();
        let payload = json!({
            "title": "x",
            "dueDate": "2024-06-02T00:00:00Z",
            "groupId": "G1",
            "completed": "yes"
        });
        let result = schema.encode(&payload, WriteMode::Create);
        assert!(matches!(result, Err(Error::TypeMismatch { field, .. }) if field == "completed"));

        let payload = json!({"title": "x", "dueDate": "tomorrow", "groupId": "G1"});
        let result = schema.encode(&payload, WriteMode::Create);
        assert!(matches!(result, Err(Error::TypeMismatch { field, .. }) if field == "dueDate"));
    }

    #[test]
    fn string_list_requires_strings() {
        let schema = test_schema();
        let payload = json!({
            "title": "x",
            "dueDate": "2024-06-02T00:00:00Z",
            "groupId": "G1",
            "tags": ["a", 1]
        });
        assert!(schema.encode(&payload, WriteMode::Create).is_err());
    }

    #[test]
    fn non_object_payload() {
        let schema = test_schema();
        let result = schema.encode(&json!([1, 2]), WriteMode::Create);
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn decode_injects_id_and_drops_nulls() {
        let schema = test_schema();
        let doc = Document::new(
            "t1",
            json!({
                "title": "Rehearsal",
                "dueDate": {"seconds": 1_717_200_000i64, "nanoseconds": 0},
                "groupId": "G1",
                "assignedTo": null,
                "legacy": "ignored"
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let value = schema.decode(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "t1",
                "title": "Rehearsal",
                "dueDate": "2024-06-01T00:00:00Z",
                "groupId": "G1"
            })
        );
    }

    #[test]
    fn decode_reports_bad_documents() {
        let schema = test_schema();
        let doc = Document::new(
            "t9",
            json!({"title": 5, "dueDate": {"seconds": 1, "nanoseconds": 0}, "groupId": "G1"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let result = schema.decode(&doc);
        assert!(matches!(result, Err(Error::InvalidDocument { id, .. }) if id == "t9"));
    }

    #[test]
    fn encode_single_field() {
        let schema = test_schema();
        let fields = schema.encode_field("completed", &json!(true)).unwrap();
        assert_eq!(serde_json::Value::Object(fields), json!({"completed": true}));

        let result = schema.encode_field("nope", &json!(true));
        assert!(matches!(result, Err(Error::UnknownField { .. })));
    }

    #[test]
    fn scope_key_format() {
        assert_eq!(test_schema().scope_key("G1"), "tasks_G1");
    }

    #[test]
    fn unset_values() {
        assert!(is_unset(&json!(null)));
        assert!(is_unset(&json!("")));
        assert!(is_unset(&json!(" \t")));
        assert!(is_unset(&json!([])));
        assert!(!is_unset(&json!(false)));
        assert!(!is_unset(&json!(0)));
        assert!(!is_unset(&json!({})));
    }

    #[test]
    fn schema_serialization() {
        let schema = test_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: EntitySchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }
}
