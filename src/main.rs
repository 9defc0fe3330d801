//! "Should I?" server entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Prepare the image store
//! 4. Build router with API routes + uploaded image serving
//! 5. Start Axum server

use shouldi::{config::Config, storage};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load config");
    tracing::info!(
        origin = %config.app_origin,
        chain_id = config.chain_id,
        production = config.production,
        "Starting shouldi on {}",
        config.bind_addr
    );

    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");

    // Fail fast if Redis is unreachable
    redis_client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");

    storage::blob::init_storage(&config.image_storage_path)
        .await
        .expect("Failed to create image storage directory");

    let bind_addr = config.bind_addr;
    let state = shouldi::app_state(redis_client, config).expect("Failed to build RPC client");
    let app = shouldi::app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // Connect info feeds the per-IP rate limit on sign-in endpoints
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
