//! Cache entry format for offline fallback.
//!
//! A cache entry holds the last successfully fetched list for one scope
//! (entity kind + group). Dates are stored as ISO-8601 strings.

use crate::{error::Result, Entity, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the cache entry format for future compatibility.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// The cached list for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// Cache entry format version
    pub format_version: u32,
    /// Scope key this entry was written under
    pub scope_key: String,
    /// When the fetch that produced this entry completed
    pub saved_at: DateTime<Utc>,
    /// Records in list order
    pub records: Vec<T>,
}

/// Older clients stored a bare JSON array under the scope key.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredForm<T> {
    Entry(CacheEntry<T>),
    Legacy(Vec<T>),
}

impl<T: Entity> CacheEntry<T> {
    /// Create an entry for records fetched from `group_id`'s scope.
    pub fn new(group_id: &str, records: Vec<T>, saved_at: DateTime<Utc>) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            scope_key: T::schema().scope_key(group_id),
            saved_at,
            records,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidCacheEntry(e.to_string()))
    }

    /// Deserialize an entry read back from `scope_key`.
    pub fn from_json(json: &str, scope_key: &str) -> Result<Self> {
        let stored: StoredForm<T> =
            serde_json::from_str(json).map_err(|e| Error::InvalidCacheEntry(e.to_string()))?;

        let entry = match stored {
            StoredForm::Entry(entry) => entry,
            StoredForm::Legacy(records) => Self {
                format_version: 0,
                scope_key: scope_key.to_string(),
                saved_at: DateTime::<Utc>::default(),
                records,
            },
        };

        // Validate format version
        if entry.format_version > CACHE_FORMAT_VERSION {
            return Err(Error::InvalidCacheEntry(format!(
                "unsupported cache format version: {} (max supported: {})",
                entry.format_version, CACHE_FORMAT_VERSION
            )));
        }

        if entry.scope_key != scope_key {
            return Err(Error::ScopeMismatch {
                expected: scope_key.to_string(),
                actual: entry.scope_key,
            });
        }

        Ok(entry)
    }
}
