//! Scheduled band events: concerts, rehearsals, meetings.

use crate::{
    record::{Dated, Entity},
    schema::{EntitySchema, FieldDef, FieldType},
    GroupId, RecordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Concert,
    Festival,
    Rehearsal,
    Meeting,
    Interview,
    Photoshoot,
    Personal,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Concert,
        EventType::Festival,
        EventType::Rehearsal,
        EventType::Meeting,
        EventType::Interview,
        EventType::Photoshoot,
        EventType::Personal,
    ];

    /// Stored name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Concert => "Concert",
            EventType::Festival => "Festival",
            EventType::Rehearsal => "Rehearsal",
            EventType::Meeting => "Meeting",
            EventType::Interview => "Interview",
            EventType::Photoshoot => "Photoshoot",
            EventType::Personal => "Personal",
        }
    }

    /// Calendar color used by the UI.
    pub fn color_hex(&self) -> &'static str {
        match self {
            EventType::Concert => "#E63946",
            EventType::Festival => "#FFB703",
            EventType::Rehearsal => "#2A9D8F",
            EventType::Meeting => "#457B9D",
            EventType::Interview => "#8338EC",
            EventType::Photoshoot => "#FF006E",
            EventType::Personal => "#A8DADC",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventStatus {
    #[default]
    Booked,
    Confirmed,
}

/// A scheduled event, ordered by `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub status: EventStatus,
    pub location: Option<String>,
    pub organizer_name: Option<String>,
    pub organizer_email: Option<String>,
    pub organizer_phone: Option<String>,
    pub coordinator_name: Option<String>,
    pub coordinator_email: Option<String>,
    pub coordinator_phone: Option<String>,
    pub hotel_name: Option<String>,
    pub hotel_address: Option<String>,
    pub hotel_check_in: Option<DateTime<Utc>>,
    pub hotel_check_out: Option<DateTime<Utc>>,
    pub fee: Option<f64>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub schedule: Vec<String>,
    pub setlist_id: Option<String>,
    pub group_id: GroupId,
    #[serde(default)]
    pub is_personal: bool,
}

impl Event {
    /// A new, not yet stored event with only the required fields set.
    pub fn new(
        title: impl Into<String>,
        date: DateTime<Utc>,
        event_type: EventType,
        group_id: impl Into<GroupId>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            date,
            event_type,
            status: EventStatus::Booked,
            location: None,
            organizer_name: None,
            organizer_email: None,
            organizer_phone: None,
            coordinator_name: None,
            coordinator_email: None,
            coordinator_phone: None,
            hotel_name: None,
            hotel_address: None,
            hotel_check_in: None,
            hotel_check_out: None,
            fee: None,
            currency: None,
            notes: None,
            schedule: Vec::new(),
            setlist_id: None,
            group_id: group_id.into(),
            is_personal: event_type == EventType::Personal,
        }
    }
}

impl Entity for Event {
    type SortKey = DateTime<Utc>;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new(
                "events",
                "groupId",
                vec![
                    FieldDef::required("title", FieldType::String),
                    FieldDef::required("date", FieldType::Timestamp),
                    FieldDef::required("type", FieldType::String),
                    FieldDef::required("status", FieldType::String),
                    FieldDef::required("groupId", FieldType::String),
                    FieldDef::nullable("location", FieldType::String),
                    FieldDef::nullable("organizerName", FieldType::String),
                    FieldDef::nullable("organizerEmail", FieldType::String),
                    FieldDef::nullable("organizerPhone", FieldType::String),
                    FieldDef::nullable("coordinatorName", FieldType::String),
                    FieldDef::nullable("coordinatorEmail", FieldType::String),
                    FieldDef::nullable("coordinatorPhone", FieldType::String),
                    FieldDef::nullable("hotelName", FieldType::String),
                    FieldDef::nullable("hotelAddress", FieldType::String),
                    FieldDef::nullable("hotelCheckIn", FieldType::Timestamp),
                    FieldDef::nullable("hotelCheckOut", FieldType::Timestamp),
                    FieldDef::nullable("fee", FieldType::Float),
                    FieldDef::nullable("currency", FieldType::String),
                    FieldDef::nullable("notes", FieldType::String),
                    FieldDef::nullable("schedule", FieldType::StringList),
                    FieldDef::nullable("setlistId", FieldType::String),
                    FieldDef::optional("isPersonal", FieldType::Bool),
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

    fn sort_key(&self) -> DateTime<Utc> {
        self.date
    }

    fn category(&self) -> Option<&str> {
        Some(self.event_type.as_str())
    }
}

impl Dated for Event {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::WriteMode, Document};
    use chrono::TimeZone;
    use serde_json::json;

    fn concert() -> Event {
        let mut event = Event::new(
            "Summer show",
            Utc.with_ymd_and_hms(2024, 7, 12, 19, 0, 0).unwrap(),
            EventType::Concert,
            "G1",
        );
        event.location = Some("Club".into());
        event.hotel_check_in = Some(Utc.with_ymd_and_hms(2024, 7, 12, 14, 0, 0).unwrap());
        event.fee = Some(1500.0);
        event.schedule = vec!["18:00 soundcheck".into()];
        event
    }

    #[test]
    fn fields_use_store_names_and_timestamps() {
        let fields = concert().to_fields(WriteMode::Create).unwrap();

        assert_eq!(fields["type"], json!("Concert"));
        assert_eq!(fields["status"], json!("Booked"));
        assert_eq!(fields["groupId"], json!("G1"));
        assert!(fields["date"].get("seconds").is_some());
        assert!(fields["hotelCheckIn"].get("seconds").is_some());
        assert!(!fields.contains_key("hotelCheckOut"));
        assert!(!fields.contains_key("notes"));
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn document_roundtrip() {
        let event = concert();
        let fields = event.to_fields(WriteMode::Create).unwrap();
        let decoded = Event::from_document(&Document::new("e1", fields)).unwrap();

        let mut expected = event;
        expected.id = Some("e1".into());
        assert_eq!(decoded, expected);
    }

    #[test]
    fn missing_title_fails() {
        let mut event = concert();
        event.title = " ".into();
        assert!(event.to_fields(WriteMode::Create).is_err());
    }

    #[test]
    fn legacy_string_date_decodes() {
        let doc = Document::new(
            "e2",
            json!({
                "title": "Old",
                "date": "2023-01-05T10:00:00Z",
                "type": "Meeting",
                "status": "Confirmed",
                "groupId": "G1"
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let event = Event::from_document(&doc).unwrap();
        assert_eq!(event.date, Utc.with_ymd_and_hms(2023, 1, 5, 10, 0, 0).unwrap());
        assert_eq!(event.status, EventStatus::Confirmed);
        assert!(event.schedule.is_empty());
    }

    #[test]
    fn category_is_type() {
        assert_eq!(concert().category(), Some("Concert"));
        assert_eq!(EventType::Rehearsal.to_string(), "Rehearsal");
        assert_eq!(EventType::Rehearsal.color_hex(), "#2A9D8F");
    }
}
