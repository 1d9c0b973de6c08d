//! Unified error handling for the HTTP host.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::gateway::GatewayError;
use crate::groups::GroupError;
use crate::service::SyncError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Sync(e) => match e {
                SyncError::OfflineBlocked { .. }
                | SyncError::CacheMiss
                | SyncError::LoadedFromCache => StatusCode::SERVICE_UNAVAILABLE,
                SyncError::Validation(_) | SyncError::MissingId => StatusCode::BAD_REQUEST,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::RemoteRead { .. } | SyncError::RemoteWrite { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Group(e) => match e {
                GroupError::Offline => StatusCode::SERVICE_UNAVAILABLE,
                GroupError::NotFound(_) => StatusCode::NOT_FOUND,
                GroupError::AlreadyMember(_) => StatusCode::CONFLICT,
                GroupError::InvalidName(_) => StatusCode::BAD_REQUEST,
                GroupError::Gateway(GatewayError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
                GroupError::Gateway(GatewayError::NotFound { .. }) => StatusCode::NOT_FOUND,
                GroupError::Gateway(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_message, details) = match &self {
            AppError::Sync(SyncError::RemoteRead { message, .. })
            | AppError::Sync(SyncError::RemoteWrite { message, .. }) => {
                tracing::error!("Remote store error: {}", self);
                (self.to_string(), Some(message.clone()))
            }
            AppError::Group(GroupError::Gateway(e)) => {
                tracing::error!("Remote store error: {:?}", e);
                ("Remote store error".to_string(), Some(e.to_string()))
            }
            _ => {
                tracing::warn!("Request failed: {}", self);
                (self.to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
