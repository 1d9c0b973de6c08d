//! Entity list and write endpoints.
//!
//! Every synced kind gets the same set of routes, generated from its
//! [`ApiEntity`] impl:
//!
//! - `GET /groups/{group_id}/{kind}` loads the group's list
//! - `GET /groups/{group_id}/{kind}/category/{category}` filters it
//! - `POST /{kind}` creates a record
//! - `GET|PUT|DELETE /{kind}/{id}` reads, updates or deletes one
//! - `GET /{kind}/live?groupId=` streams list replacements over a WebSocket
//!
//! Events and tasks add date queries; tasks add `POST /tasks/{id}/toggle`.
//! Members and setlists get only the common set.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bandsync_engine::{Dated, Entity, Event, Member, Setlist, Task};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::context::SyncContext;
use crate::error::{AppError, Result};
use crate::handlers::stream_snapshots;
use crate::service::{EntitySyncService, SyncError, SyncStatus};
use crate::AppState;

/// An entity kind exposed over HTTP.
pub trait ApiEntity: Entity {
    /// Path segment naming the kind.
    const PATH: &'static str;

    /// The kind's service in `context`.
    fn service(context: &SyncContext) -> &Arc<EntitySyncService<Self>>;
}

impl ApiEntity for Event {
    const PATH: &'static str = "events";

    fn service(context: &SyncContext) -> &Arc<EntitySyncService<Self>> {
        &context.events
    }
}

impl ApiEntity for Task {
    const PATH: &'static str = "tasks";

    fn service(context: &SyncContext) -> &Arc<EntitySyncService<Self>> {
        &context.tasks
    }
}

impl ApiEntity for Member {
    const PATH: &'static str = "members";

    fn service(context: &SyncContext) -> &Arc<EntitySyncService<Self>> {
        &context.members
    }
}

impl ApiEntity for Setlist {
    const PATH: &'static str = "setlists";

    fn service(context: &SyncContext) -> &Arc<EntitySyncService<Self>> {
        &context.setlists
    }
}

/// A loaded list with the state it was loaded in.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub records: Vec<T>,
    pub status: SyncStatus,
}

#[derive(Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_upcoming_limit")]
    pub limit: usize,
}

fn default_upcoming_limit() -> usize {
    5
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub group_id: Option<String>,
}

/// Create entity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(entity_routes::<Event>())
        .merge(dated_routes::<Event>())
        .merge(entity_routes::<Task>())
        .merge(dated_routes::<Task>())
        .route("/tasks/{id}/toggle", post(toggle_task))
        .merge(entity_routes::<Member>())
        .merge(entity_routes::<Setlist>())
}

fn entity_routes<T: ApiEntity>() -> Router<AppState> {
    let kind = T::PATH;
    Router::new()
        .route(&format!("/groups/{{group_id}}/{}", kind), get(list::<T>))
        .route(
            &format!("/groups/{{group_id}}/{}/category/{{category}}", kind),
            get(by_category::<T>),
        )
        .route(&format!("/{}", kind), post(create::<T>))
        .route(&format!("/{}/live", kind), get(live::<T>))
        .route(
            &format!("/{}/{{id}}", kind),
            get(fetch_one::<T>).put(update::<T>).delete(remove::<T>),
        )
}

fn dated_routes<T: ApiEntity + Dated>() -> Router<AppState> {
    let kind = T::PATH;
    Router::new()
        .route(
            &format!("/groups/{{group_id}}/{}/upcoming", kind),
            get(upcoming::<T>),
        )
        .route(
            &format!("/groups/{{group_id}}/{}/day/{{date}}", kind),
            get(on_day::<T>),
        )
        .route(
            &format!("/groups/{{group_id}}/{}/month/{{year}}/{{month}}", kind),
            get(in_month::<T>),
        )
}

/// Make sure the service holds `group_id`'s list.
///
/// Returns false when nothing could be loaded for the group.
async fn ensure_loaded<T: Entity>(service: &EntitySyncService<T>, group_id: &str) -> bool {
    if service.group_id().as_deref() != Some(group_id) {
        service.fetch(group_id).await;
    }
    service.group_id().as_deref() == Some(group_id)
}

/// GET /groups/{group_id}/{kind} - load a group's list.
async fn list<T: ApiEntity>(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Json<ListResponse<T>> {
    let service = T::service(&state.context);
    let records = service.fetch(&group_id).await;
    Json(ListResponse {
        records,
        status: service.status(),
    })
}

/// GET /groups/{group_id}/{kind}/category/{category}
async fn by_category<T: ApiEntity>(
    State(state): State<AppState>,
    Path((group_id, category)): Path<(String, String)>,
) -> Json<Vec<T>> {
    let service = T::service(&state.context);
    if !ensure_loaded(service, &group_id).await {
        return Json(Vec::new());
    }
    Json(service.by_category(&category))
}

/// GET /groups/{group_id}/{kind}/upcoming?limit=
async fn upcoming<T: ApiEntity + Dated>(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<UpcomingQuery>,
) -> Json<Vec<T>> {
    let service = T::service(&state.context);
    if !ensure_loaded(service, &group_id).await {
        return Json(Vec::new());
    }
    Json(service.upcoming(Utc::now(), query.limit))
}

/// GET /groups/{group_id}/{kind}/day/{date} - records on a UTC calendar day.
async fn on_day<T: ApiEntity + Dated>(
    State(state): State<AppState>,
    Path((group_id, date)): Path<(String, String)>,
) -> Result<Json<Vec<T>>> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date: {}", date)))?;

    let service = T::service(&state.context);
    if !ensure_loaded(service, &group_id).await {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(service.on_day(day, &Utc)))
}

/// GET /groups/{group_id}/{kind}/month/{year}/{month} - records in a UTC month.
async fn in_month<T: ApiEntity + Dated>(
    State(state): State<AppState>,
    Path((group_id, year, month)): Path<(String, i32, u32)>,
) -> Result<Json<Vec<T>>> {
    if !(1..=12).contains(&month) {
        return Err(AppError::BadRequest(format!("invalid month: {}", month)));
    }

    let service = T::service(&state.context);
    if !ensure_loaded(service, &group_id).await {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(service.in_month(year, month, &Utc)))
}

/// POST /{kind} - create a record.
async fn create<T: ApiEntity>(
    State(state): State<AppState>,
    Json(record): Json<T>,
) -> Result<(StatusCode, Json<T>)> {
    let created = T::service(&state.context).create(record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /{kind}/{id} - one record from the loaded list.
async fn fetch_one<T: ApiEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<T>> {
    T::service(&state.context)
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{} {}", T::PATH, id)))
}

/// PUT /{kind}/{id} - replace a record.
async fn update<T: ApiEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut record): Json<T>,
) -> Result<Json<T>> {
    record.set_id(id);
    let updated = T::service(&state.context).update(record).await?;
    Ok(Json(updated))
}

/// DELETE /{kind}/{id}
async fn remove<T: ApiEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    T::service(&state.context).delete_id(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /tasks/{id}/toggle - flip a listed task's completion.
async fn toggle_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>> {
    let task = state.context.tasks.toggle_completion_id(&id).await?;
    Ok(Json(task))
}

/// GET /{kind}/live?groupId= - stream list replacements.
///
/// With a group, the group is loaded and followed remotely while online.
async fn live<T: ApiEntity>(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> Result<Response> {
    let service = T::service(&state.context).clone();

    if let Some(group_id) = query.group_id {
        service.fetch(&group_id).await;
        match service.watch_group(&group_id).await {
            Ok(()) => {}
            Err(SyncError::OfflineBlocked { .. }) => {
                tracing::debug!(group_id = %group_id, "Offline, serving cached list only");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let network = state.context.network.clone();
    Ok(ws
        .on_upgrade(move |socket| stream_snapshots(socket, service, network))
        .into_response())
}
