//! Group membership endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bandsync_engine::Group;
use serde::Deserialize;

use crate::error::Result;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub code: String,
    pub user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub user_id: String,
}

/// Create group routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups", post(create_group))
        .route("/groups/join", post(join_group))
        .route("/groups/{group_id}", get(fetch_group))
        .route("/groups/{group_id}/approve", post(approve_user))
        .route("/groups/{group_id}/reject", post(reject_user))
        .route("/groups/{group_id}/remove", post(remove_user))
        .route("/users/{user_id}/group", get(group_for_user))
}

/// POST /groups
async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>)> {
    let group = state
        .context
        .groups
        .create_group(&request.name, &request.code)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/{group_id}
async fn fetch_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<Group>> {
    Ok(Json(state.context.groups.group(&group_id).await?))
}

/// POST /groups/join - request membership by invite code.
async fn join_group(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<Group>> {
    let group = state
        .context
        .groups
        .join_group(&request.code, &request.user_id)
        .await?;
    Ok(Json(group))
}

/// POST /groups/{group_id}/approve
async fn approve_user(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<Group>> {
    let group = state
        .context
        .groups
        .approve_user(&group_id, &request.user_id)
        .await?;
    Ok(Json(group))
}

/// POST /groups/{group_id}/reject
async fn reject_user(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<Group>> {
    let group = state
        .context
        .groups
        .reject_user(&group_id, &request.user_id)
        .await?;
    Ok(Json(group))
}

/// POST /groups/{group_id}/remove
async fn remove_user(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<Group>> {
    let group = state
        .context
        .groups
        .remove_user(&group_id, &request.user_id)
        .await?;
    Ok(Json(group))
}

/// GET /users/{user_id}/group - the user's group, or null.
async fn group_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Option<Group>>> {
    Ok(Json(state.context.groups.group_for_user(&user_id).await?))
}
