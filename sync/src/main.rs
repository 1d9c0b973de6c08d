//! BandSync host - runs the sync services behind an HTTP and WebSocket API.
//!
//! Uses PostgreSQL as the remote document store when `DATABASE_URL` is set
//! and an in-memory store otherwise. The offline cache lives in `CACHE_DIR`
//! when set.

use std::sync::Arc;

use bandsync_sync::{
    routes, AppState, Config, FileCache, LocalCache, MemoryCache, MemoryGateway, NetworkMonitor,
    PgGateway, RemoteGateway, SyncContext, SyncOptions,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bandsync_sync=debug,bandsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting BandSync host on {}:{}", config.host, config.port);

    let gateway: Arc<dyn RemoteGateway> = match &config.database_url {
        Some(url) => {
            let gateway = PgGateway::connect(url).await?;
            tracing::info!("Running database migrations...");
            gateway.run_migrations().await?;
            Arc::new(gateway)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            MemoryGateway::new_shared()
        }
    };

    let cache: Arc<dyn LocalCache> = match &config.cache_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Using file cache");
            Arc::new(FileCache::open(dir.clone())?)
        }
        None => Arc::new(MemoryCache::new()),
    };

    let network = NetworkMonitor::new_shared(!config.start_offline);
    let options = SyncOptions {
        reconcile_delay: config.reconcile_delay,
    };
    let context = SyncContext::new_shared(gateway, cache, network, options);

    let app = routes::create_router(AppState::new(context));

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
