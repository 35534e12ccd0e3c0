//! # Server Configuration
//!
//! This module contains the server setup and configuration for the sync
//! status API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/api/artist-syncs",
            post(handlers::syncs::enqueue_sync).get(handlers::syncs::list_syncs),
        )
        .route("/api/artist-syncs/{id}", get(handlers::syncs::get_sync))
        .route(
            "/api/artist-syncs/{id}/refresh",
            post(handlers::syncs::refresh_sync),
        )
        .layer(axum::middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration. Returns once the
/// shutdown token fires and in-flight requests have drained.
pub async fn run_server(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.bind_addr().context("invalid server address")?;

    let state = AppState { db, config };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Sync status API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Sync status API stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::syncs::enqueue_sync,
        crate::handlers::syncs::list_syncs,
        crate::handlers::syncs::get_sync,
        crate::handlers::syncs::refresh_sync,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::syncs::EnqueueRequest,
            crate::handlers::syncs::SyncJobResponse,
            crate::models::sync_job::SyncSource,
            crate::models::sync_job::SyncStatus,
            crate::models::sync_job::SyncInterval,
        )
    ),
    info(
        title = "Artist Sync API",
        description = "Status and control surface for the artist metadata sync engine",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
