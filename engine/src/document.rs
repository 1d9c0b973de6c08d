//! Raw documents as exchanged with the remote store.

use crate::RecordId;
use serde::{Deserialize, Serialize};

/// Document field map, exactly as written to or read from the store.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A stored document: store-issued ID plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Whether `field` equals `value` (the only query shape the store offers).
    pub fn matches(&self, field: &str, value: &serde_json::Value) -> bool {
        self.fields.get(field) == Some(value)
    }

    /// Merge a partial update into this document. Later values win.
    pub fn merge(&mut self, partial: Fields) {
        for (key, value) in partial {
            self.fields.insert(key, value);
        }
    }
}
