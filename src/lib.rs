pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;
pub mod voting;

use auth::eip1271::Eip1271Client;
use auth::middleware::AppState;
use axum::Router;
use config::Config;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Multipart framing allowance on top of the image size cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for a server backed by `redis` and configured by `config`.
pub fn app_state(redis: redis::Client, config: Config) -> Result<AppState, auth::eip1271::RpcError> {
    let contracts = Eip1271Client::new(
        config.rpc_urls.clone(),
        Duration::from_secs(config.rpc_timeout_secs),
    )?;
    Ok(AppState {
        redis,
        config: Arc::new(config),
        contracts,
    })
}

/// Build the full application: API routes, uploaded images, body limit,
/// CORS and security headers.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    // No cross-origin access: the UI is served from the canonical origin
    let cors = CorsLayer::new();

    routes::api_router()
        .nest_service("/images", ServeDir::new(&config.image_storage_path))
        .layer(axum::extract::DefaultBodyLimit::max(
            config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(cors)
        .layer(axum::middleware::from_fn_with_state(
            config,
            middleware::security_headers,
        ))
        .with_state(state)
}
