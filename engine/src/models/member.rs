//! Group members (user profiles scoped to a group).

use crate::{
    record::Entity,
    schema::{EntitySchema, FieldDef, FieldType},
    GroupId, RecordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Role of a member within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Manager,
    Musician,
    #[default]
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Manager => "Manager",
            UserRole::Musician => "Musician",
            UserRole::Member => "Member",
        }
    }
}

/// A user profile as seen by the rest of the group, ordered by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Empty once the member has been removed from the group.
    #[serde(default)]
    pub group_id: GroupId,
    #[serde(default)]
    pub role: UserRole,
    pub is_online: Option<bool>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(name: impl Into<String>, email: impl Into<String>, group_id: impl Into<GroupId>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            phone: String::new(),
            group_id: group_id.into(),
            role: UserRole::Member,
            is_online: None,
            last_seen: None,
        }
    }
}

impl Entity for Member {
    type SortKey = String;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new(
                "users",
                "groupId",
                vec![
                    FieldDef::required("name", FieldType::String),
                    FieldDef::optional("email", FieldType::String),
                    FieldDef::nullable("phone", FieldType::String),
                    FieldDef::nullable("groupId", FieldType::String),
                    FieldDef::optional("role", FieldType::String),
                    FieldDef::optional("isOnline", FieldType::Bool),
                    FieldDef::optional("lastSeen", FieldType::Timestamp),
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

    fn sort_key(&self) -> String {
        self.name.to_lowercase()
    }

    fn category(&self) -> Option<&str> {
        Some(self.role.as_str())
    }
}
