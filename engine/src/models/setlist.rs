//! Setlists: the ordered songs a band plays at a concert.

use crate::{
    record::Entity,
    schema::{EntitySchema, FieldDef, FieldType},
    GroupId, RecordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One song in a setlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub duration_minutes: u32,
    pub duration_seconds: u32,
    pub bpm: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>, minutes: u32, seconds: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration_minutes: minutes,
            duration_seconds: seconds,
            bpm: 0,
            key: None,
            start_time: None,
        }
    }

    pub fn total_seconds(&self) -> u32 {
        self.duration_minutes * 60 + self.duration_seconds
    }

    /// `mm:ss`, zero padded.
    pub fn formatted_duration(&self) -> String {
        format!("{:02}:{:02}", self.duration_minutes, self.duration_seconds)
    }
}

/// A group's setlist.
///
/// Setlists with a concert date come first, earliest concert first;
/// undated drafts follow in name order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setlist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    pub user_id: String,
    pub group_id: GroupId,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub songs: Vec<Song>,
    pub concert_date: Option<DateTime<Utc>>,
}

impl Setlist {
    pub fn new(
        name: impl Into<String>,
        user_id: impl Into<String>,
        group_id: impl Into<GroupId>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            user_id: user_id.into(),
            group_id: group_id.into(),
            is_shared: false,
            songs: Vec::new(),
            concert_date: None,
        }
    }

    /// Running time of all songs, in seconds.
    pub fn total_duration(&self) -> u32 {
        self.songs.iter().map(Song::total_seconds).sum()
    }

    pub fn formatted_total_duration(&self) -> String {
        let total = self.total_duration();
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

impl Entity for Setlist {
    type SortKey = (bool, Option<DateTime<Utc>>, String);

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new(
                "setlists",
                "groupId",
                vec![
                    FieldDef::required("name", FieldType::String),
                    FieldDef::required("userId", FieldType::String),
                    FieldDef::required("groupId", FieldType::String),
                    FieldDef::optional("isShared", FieldType::Bool),
                    FieldDef::nullable("songs", FieldType::Json),
                    FieldDef::nullable("concertDate", FieldType::Timestamp),
                ],
            )
        })
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.concert_date.is_none(), self.concert_date, self.name.clone())
    }
}
