//! The in-memory authoritative list for one entity kind.
//!
//! Records are kept sorted ascending by [`Entity::sort_key`] after every
//! operation. Equal keys keep insertion order.

use crate::{record::Dated, Entity};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// A list of records, always sorted by the kind's ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedRecords<T: Entity> {
    records: Vec<T>,
}

impl<T: Entity> Default for SortedRecords<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> SortedRecords<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Build from records in any order.
    pub fn from_unsorted(mut records: Vec<T>) -> Self {
        records.sort_by_key(|r| r.sort_key());
        Self { records }
    }

    /// Insert a record at its sorted position, after any equal keys.
    pub fn insert(&mut self, record: T) {
        let key = record.sort_key();
        let index = self.records.partition_point(|r| r.sort_key() <= key);
        self.records.insert(index, record);
    }

    /// Replace the record with the same ID, re-positioning it if its key
    /// changed. Returns false (and leaves the list alone) if no record has
    /// that ID.
    pub fn replace(&mut self, record: T) -> bool {
        let Some(id) = record.id() else {
            return false;
        };
        match self.position(id) {
            Some(index) => {
                self.records.remove(index);
                self.insert(record);
                true
            }
            None => false,
        }
    }

    /// Remove a record by ID.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.position(id).map(|index| self.records.remove(index))
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|r| r.id() == Some(id))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == Some(id))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    /// Check the ordering invariant.
    pub fn is_sorted(&self) -> bool {
        self.records
            .windows(2)
            .all(|pair| pair[0].sort_key() <= pair[1].sort_key())
    }

    /// Records whose category (event type, task priority, role) matches.
    pub fn by_category(&self, category: &str) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| r.category() == Some(category))
            .cloned()
            .collect()
    }
}

impl<T: Dated> SortedRecords<T> {
    /// Records falling on `day` as seen in time zone `tz`.
    pub fn on_day<Tz: TimeZone>(&self, day: NaiveDate, tz: &Tz) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| r.date().with_timezone(tz).date_naive() == day)
            .cloned()
            .collect()
    }

    /// The next `limit` records strictly after `now`, ascending.
    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| r.date() > now)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Records with `start <= date <= end`.
    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| {
                let date = r.date();
                date >= start && date <= end
            })
            .cloned()
            .collect()
    }

    /// Records in calendar month `month` (1-12) of `year`, in time zone `tz`.
    ///
    /// Returns nothing for an invalid month.
    pub fn in_month<Tz: TimeZone>(&self, year: i32, month: u32, tz: &Tz) -> Vec<T> {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Vec::new();
        };
        self.records
            .iter()
            .filter(|r| {
                let local = r.date().with_timezone(tz).date_naive();
                local.year() == first.year() && local.month() == first.month()
            })
            .cloned()
            .collect()
    }
}
