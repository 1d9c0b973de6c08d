//! HTTP route definitions.

mod entities;
mod groups;
mod health;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use entities::ApiEntity;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(entities::routes())
        .merge(groups::routes())
}

/// Build the full application with tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::cache::MemoryCache;
    use crate::context::SyncContext;
    use crate::gateway::MemoryGateway;
    use crate::network::NetworkMonitor;
    use crate::service::SyncOptions;

    fn app() -> Router {
        let context = SyncContext::new_shared(
            MemoryGateway::new_shared(),
            Arc::new(MemoryCache::new()),
            NetworkMonitor::new_shared(true),
            SyncOptions::default(),
        );
        create_router(AppState::new(context))
    }

    async fn get(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_and_unknown_route() {
        assert_eq!(get("/health").await, StatusCode::OK);
        assert_eq!(get("/status").await, StatusCode::OK);
        assert_eq!(get("/nope").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn every_kind_is_routed() {
        assert_eq!(get("/groups/G1/events").await, StatusCode::OK);
        assert_eq!(get("/groups/G1/tasks").await, StatusCode::OK);
        assert_eq!(get("/groups/G1/members").await, StatusCode::OK);
        assert_eq!(get("/groups/G1/setlists").await, StatusCode::OK);
        assert_eq!(get("/setlists/l1").await, StatusCode::NOT_FOUND);
        assert_eq!(get("/groups/G1/tasks/upcoming?limit=3").await, StatusCode::OK);
        assert_eq!(get("/tasks/t1").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_date_queries() {
        assert_eq!(
            get("/groups/G1/events/month/2024/13").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get("/groups/G1/tasks/day/june").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get("/groups/G1/tasks/day/2024-06-01").await,
            StatusCode::OK
        );
    }
}
