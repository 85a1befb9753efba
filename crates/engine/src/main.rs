//! Studio Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studio_engine::api;
use studio_engine::infrastructure::{
    blob_store::{InMemoryBlobStore, SqliteBlobStore},
    clock::SystemClock,
    config::{EngineConfig, StoreBackend},
    image_provider::HttpImageProvider,
    image_sync::{HttpImageSync, NoopImageSync},
    ports::{BlobStorePort, ClockPort, ImageSyncPort},
};
use studio_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be started from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Studio Engine");

    let config = EngineConfig::from_env();
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    let blob_store: Arc<dyn BlobStorePort> = match &config.store {
        StoreBackend::Sqlite(path) => {
            tracing::info!(path = %path, "Using SQLite panel storage");
            Arc::new(SqliteBlobStore::new(path, clock.clone()).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory panel storage, saves will not survive a restart");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    tracing::info!(url = %config.provider_url, "Image provider configured");
    let image_gen = Arc::new(HttpImageProvider::new(
        &config.provider_url,
        config.provider_api_key.clone(),
    ));

    let image_sync: Arc<dyn ImageSyncPort> = match &config.database_sync_url {
        Some(url) => {
            tracing::info!(url = %url, "Database sync enabled");
            Arc::new(HttpImageSync::new(url))
        }
        None => Arc::new(NoopImageSync),
    };

    let app = Arc::new(App::new(
        image_gen,
        image_sync,
        blob_store,
        clock,
        config.generation_settings(),
        config.panel_slots,
        config.project_id,
    ));

    app.use_cases
        .panels
        .switch_project(config.project_id, None)
        .await?;
    tracing::info!(
        project_id = %config.project_id,
        slots = config.panel_slots,
        "Panels loaded"
    );

    let shutdown = CancellationToken::new();
    let reconciler = app
        .use_cases
        .panels
        .allocator
        .spawn_reconciler(shutdown.child_token());

    let mut router = api::http::routes()
        .with_state(app.clone())
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer_from_env() {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = config.bind_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    app.use_cases.panels.flush().await;
    let _ = reconciler.await;
    tracing::info!("Studio Engine stopped");

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer_from_env() -> Option<CorsLayer> {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
