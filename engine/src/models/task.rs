//! Group tasks with due dates.

use crate::{
    record::{Dated, Entity},
    schema::{EntitySchema, FieldDef, FieldType},
    GroupId, RecordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "High",
            TaskPriority::Medium => "Medium",
            TaskPriority::Low => "Low",
        }
    }
}

/// A task, ordered by `due_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_to: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    pub group_id: GroupId,
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A new, not yet stored, open task.
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>, group_id: impl Into<GroupId>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            assigned_to: String::new(),
            due_date,
            completed: false,
            group_id: group_id.into(),
            priority: None,
            tags: Vec::new(),
            created_at: None,
            created_by: None,
            completed_at: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date < now
    }
}

impl Entity for Task {
    type SortKey = DateTime<Utc>;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new(
                "tasks",
                "groupId",
                vec![
                    FieldDef::required("title", FieldType::String),
                    FieldDef::required("dueDate", FieldType::Timestamp),
                    FieldDef::required("groupId", FieldType::String),
                    FieldDef::nullable("description", FieldType::String),
                    FieldDef::nullable("assignedTo", FieldType::String),
                    FieldDef::optional("completed", FieldType::Bool),
                    FieldDef::nullable("priority", FieldType::String),
                    FieldDef::nullable("tags", FieldType::StringList),
                    FieldDef::optional("createdAt", FieldType::Timestamp),
                    FieldDef::optional("createdBy", FieldType::String),
                    FieldDef::nullable("completedAt", FieldType::Timestamp),
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
        self.due_date
    }

    fn category(&self) -> Option<&str> {
        self.priority.as_ref().map(TaskPriority::as_str)
    }
}

impl Dated for Task {
    fn date(&self) -> DateTime<Utc> {
        self.due_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::WriteMode, Document, Error};
    use chrono::TimeZone;

    #[test]
    fn minimal_task_roundtrip() {
        let task = Task::new("Rehearsal", Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), "G1");
        let fields = task.to_fields(WriteMode::Create).unwrap();

        // blank description/assignee and empty tags are not written
        assert_eq!(fields.len(), 4);

        let decoded = Task::from_document(&Document::new("t1", fields)).unwrap();
        assert_eq!(decoded.id.as_deref(), Some("t1"));
        assert_eq!(decoded.title, task.title);
        assert_eq!(decoded.due_date, task.due_date);
        assert!(!decoded.completed);
    }

    #[test]
    fn blank_title_is_missing() {
        let task = Task::new("", Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(), "G1");
        let result = task.to_fields(WriteMode::Create);
        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "title"));
    }

    #[test]
    fn category_is_priority() {
        let mut task = Task::new("x", Utc::now(), "G1");
        assert_eq!(task.category(), None);
        task.priority = Some(TaskPriority::High);
        assert_eq!(task.category(), Some("High"));
    }

    #[test]
    fn overdue_only_when_open() {
        let due = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let mut task = Task::new("x", due, "G1");
        assert!(task.is_overdue(now));
        task.completed = true;
        assert!(!task.is_overdue(now));
    }
}
