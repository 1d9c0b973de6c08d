//! The `Entity` contract every synced record kind implements.

use crate::{
    document::{Document, Fields},
    error::Result,
    schema::{EntitySchema, WriteMode},
    Error, RecordId,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// A record kind kept in sync with one remote collection.
///
/// Records are plain serde structs in camelCase. The kind's [`EntitySchema`]
/// decides what is written to the store and how dates are represented there.
pub trait Entity:
    Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Ordering key; lists are kept ascending by it.
    type SortKey: Ord;

    /// Schema for this kind.
    fn schema() -> &'static EntitySchema;

    /// Store-issued identifier, absent before the first successful create.
    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: RecordId);

    /// Group this record is scoped to.
    fn group_id(&self) -> &str;

    fn sort_key(&self) -> Self::SortKey;

    /// Category or type used for filtering, if the kind has one.
    fn category(&self) -> Option<&str> {
        None
    }

    /// Encode into document fields through the schema.
    fn to_fields(&self, mode: WriteMode) -> Result<Fields> {
        let payload =
            serde_json::to_value(self).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        Self::schema().encode(&payload, mode)
    }

    /// Decode a stored document through the schema.
    fn from_document(doc: &Document) -> Result<Self> {
        let value = Self::schema().decode(doc)?;
        serde_json::from_value(value).map_err(|e| Error::InvalidDocument {
            id: doc.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// An entity whose ordering key is a date.
pub trait Dated: Entity {
    fn date(&self) -> DateTime<Utc>;
}
