//! Group membership.
//!
//! Groups are not group-scoped records, so they bypass the entity services:
//! reads and writes go straight to the store. Membership changes that move a
//! user in or out of a group schedule a reconciliation of the member list.

use std::sync::Arc;

use bandsync_engine::{Document, Entity, Group, Member, GROUPS_COLLECTION};
use serde_json::Value;

use crate::gateway::{GatewayError, RemoteGateway};
use crate::network::NetworkMonitor;
use crate::service::EntitySyncService;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("cannot change groups while offline")]
    Offline,

    #[error("{0} not found")]
    NotFound(String),

    #[error("user {0} is already a member of this group")]
    AlreadyMember(String),

    #[error("invalid group name: {0}")]
    InvalidName(String),

    #[error("remote store error: {0}")]
    Gateway(#[from] GatewayError),
}

pub type GroupResult<T> = Result<T, GroupError>;

/// Reads and changes group membership.
pub struct GroupDirectory {
    gateway: Arc<dyn RemoteGateway>,
    network: Arc<NetworkMonitor>,
    members: Arc<EntitySyncService<Member>>,
}

impl std::fmt::Debug for GroupDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupDirectory").finish_non_exhaustive()
    }
}

impl GroupDirectory {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        network: Arc<NetworkMonitor>,
        members: Arc<EntitySyncService<Member>>,
    ) -> Self {
        Self {
            gateway,
            network,
            members,
        }
    }

    fn ensure_online(&self) -> GroupResult<()> {
        if self.network.is_offline() {
            return Err(GroupError::Offline);
        }
        Ok(())
    }

    fn users_collection() -> &'static str {
        &Member::schema().collection
    }

    fn decode(doc: &Document) -> GroupResult<Group> {
        Group::from_document(doc).map_err(|e| GatewayError::Decode(e.to_string()).into())
    }

    /// Create a group with a trimmed name of 2 to 50 characters.
    pub async fn create_group(&self, name: &str, code: &str) -> GroupResult<Group> {
        let name = Group::validate_name(name).map_err(|e| GroupError::InvalidName(e.to_string()))?;
        self.ensure_online()?;

        let mut group = Group::new(name, code);
        let fields = group
            .to_fields()
            .map_err(|e| GroupError::InvalidName(e.to_string()))?;
        let id = self.gateway.create(GROUPS_COLLECTION, fields).await?;
        group.id = Some(id);

        tracing::info!(group_id = ?group.id, name = %group.name, "Group created");
        Ok(group)
    }

    pub async fn group(&self, group_id: &str) -> GroupResult<Group> {
        self.ensure_online()?;
        let doc = self
            .gateway
            .get_by_id(GROUPS_COLLECTION, group_id)
            .await?
            .ok_or_else(|| GroupError::NotFound(format!("group {}", group_id)))?;
        Self::decode(&doc)
    }

    /// The group `user_id` belongs to, if any.
    pub async fn group_for_user(&self, user_id: &str) -> GroupResult<Option<Group>> {
        self.ensure_online()?;
        let user = self
            .gateway
            .get_by_id(Self::users_collection(), user_id)
            .await?
            .ok_or_else(|| GroupError::NotFound(format!("user {}", user_id)))?;

        match user.get("groupId").and_then(Value::as_str) {
            Some(group_id) if !group_id.is_empty() => self.group(group_id).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Ask to join the group with invite `code`. The request waits for
    /// approval in `pendingMembers`.
    pub async fn join_group(&self, code: &str, user_id: &str) -> GroupResult<Group> {
        self.ensure_online()?;
        let docs = self
            .gateway
            .query_by_field(GROUPS_COLLECTION, "code", &Value::String(code.to_string()))
            .await?;
        let doc = docs
            .first()
            .ok_or_else(|| GroupError::NotFound(format!("group with code {}", code)))?;

        let mut group = Self::decode(doc)?;
        if group.is_member(user_id) {
            return Err(GroupError::AlreadyMember(user_id.to_string()));
        }

        if group.request_join(user_id) {
            self.gateway
                .update_by_id(GROUPS_COLLECTION, &doc.id, group.membership_fields())
                .await?;
            tracing::info!(group_id = %doc.id, user_id = %user_id, "Join requested");
        }
        Ok(group)
    }

    /// Move `user_id` from pending to members and point the user at the group.
    pub async fn approve_user(&self, group_id: &str, user_id: &str) -> GroupResult<Group> {
        let mut group = self.group(group_id).await?;
        self.require_user(user_id).await?;
        group.approve(user_id);
        self.write_membership(group_id, &group).await?;
        self.set_user_group(user_id, Value::String(group_id.to_string()))
            .await?;

        tracing::info!(group_id = %group_id, user_id = %user_id, "User approved");
        self.members.reconcile_later(group_id);
        Ok(group)
    }

    /// Drop a pending join request.
    pub async fn reject_user(&self, group_id: &str, user_id: &str) -> GroupResult<Group> {
        let mut group = self.group(group_id).await?;
        group.reject(user_id);
        self.write_membership(group_id, &group).await?;

        tracing::info!(group_id = %group_id, user_id = %user_id, "Join request rejected");
        Ok(group)
    }

    /// Remove a member and clear the user's group.
    pub async fn remove_user(&self, group_id: &str, user_id: &str) -> GroupResult<Group> {
        let mut group = self.group(group_id).await?;
        group.remove(user_id);
        self.write_membership(group_id, &group).await?;
        self.set_user_group(user_id, Value::Null).await?;

        tracing::info!(group_id = %group_id, user_id = %user_id, "User removed");
        self.members.reconcile_later(group_id);
        Ok(group)
    }

    async fn require_user(&self, user_id: &str) -> GroupResult<()> {
        self.gateway
            .get_by_id(Self::users_collection(), user_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| GroupError::NotFound(format!("user {}", user_id)))
    }

    async fn write_membership(&self, group_id: &str, group: &Group) -> GroupResult<()> {
        self.ensure_online()?;
        self.gateway
            .update_by_id(GROUPS_COLLECTION, group_id, group.membership_fields())
            .await?;
        Ok(())
    }

    async fn set_user_group(&self, user_id: &str, group_id: Value) -> GroupResult<()> {
        let mut fields = bandsync_engine::Fields::new();
        fields.insert("groupId".into(), group_id);
        match self
            .gateway
            .update_by_id(Self::users_collection(), user_id, fields)
            .await
        {
            Ok(()) => Ok(()),
            Err(GatewayError::NotFound { .. }) => {
                Err(GroupError::NotFound(format!("user {}", user_id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
