//! Groups (bands) and their membership lists.

use crate::{
    document::{Document, Fields},
    error::Result,
    Error, RecordId,
};
use serde::{Deserialize, Serialize};

/// Remote collection holding groups.
pub const GROUPS_COLLECTION: &str = "groups";

/// Shortest and longest accepted group names, after trimming.
pub const GROUP_NAME_MIN: usize = 2;
pub const GROUP_NAME_MAX: usize = 50;

/// A group and who belongs to it.
///
/// Unlike the group-scoped entities, membership arrays are always written in
/// full: an empty `pendingMembers` must clear the remote list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    /// Invite code members join with
    pub code: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub pending_members: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            code: code.into(),
            members: Vec::new(),
            pending_members: Vec::new(),
        }
    }

    /// Trim and validate a group name.
    pub fn validate_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        let len = trimmed.chars().count();
        if len == 0 {
            return Err(Error::MissingRequiredField("name".into()));
        }
        if !(GROUP_NAME_MIN..=GROUP_NAME_MAX).contains(&len) {
            return Err(Error::InvalidPayload(format!(
                "group name must be {}-{} characters, got {}",
                GROUP_NAME_MIN, GROUP_NAME_MAX, len
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn is_pending(&self, user_id: &str) -> bool {
        self.pending_members.iter().any(|m| m == user_id)
    }

    /// Add a join request. Returns false if already requested.
    pub fn request_join(&mut self, user_id: &str) -> bool {
        if self.is_pending(user_id) {
            return false;
        }
        self.pending_members.push(user_id.to_string());
        true
    }

    /// Move a user from pending to members.
    pub fn approve(&mut self, user_id: &str) {
        self.pending_members.retain(|m| m != user_id);
        if !self.is_member(user_id) {
            self.members.push(user_id.to_string());
        }
    }

    pub fn reject(&mut self, user_id: &str) {
        self.pending_members.retain(|m| m != user_id);
    }

    pub fn remove(&mut self, user_id: &str) {
        self.members.retain(|m| m != user_id);
    }

    /// Membership fields for a partial update.
    pub fn membership_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("members".into(), serde_json::json!(self.members));
        fields.insert("pendingMembers".into(), serde_json::json!(self.pending_members));
        fields
    }

    /// All fields for a create; `id` is never written.
    pub fn to_fields(&self) -> Result<Fields> {
        let mut value =
            serde_json::to_value(self).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| Error::InvalidPayload("group must serialize to an object".into()))?;
        obj.remove("id");
        Ok(std::mem::take(obj))
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut group: Self = serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))
            .map_err(|e| Error::InvalidDocument {
                id: doc.id.clone(),
                reason: e.to_string(),
            })?;
        group.id = Some(doc.id.clone());
        Ok(group)
    }
}
