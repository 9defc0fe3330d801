//! Axum extractors for authentication and rate limiting.

use crate::auth::address::WalletAddress;
use crate::auth::eip1271::Eip1271Client;
use crate::auth::session::read_session;
use crate::config::Config;
use crate::error::AppError;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use redis::AsyncCommands;
use std::convert::Infallible;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub redis: redis::Client,
    pub config: Arc<Config>,
    pub contracts: Eip1271Client,
}

impl AppState {
    pub async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))
    }
}

/// Signed-in wallet, read from the session cookie.
///
/// Rejects with 401 "Unauthorized" when the cookie is missing or unreadable.
/// Use `Option<SessionAddress>` for endpoints that work signed out.
#[derive(Debug, Clone, Copy)]
pub struct SessionAddress(pub WalletAddress);

impl FromRequestParts<AppState> for SessionAddress {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        read_session(&parts.headers)
            .map(SessionAddress)
            .ok_or_else(AppError::unauthorized)
    }
}

impl OptionalFromRequestParts<AppState> for SessionAddress {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(read_session(&parts.headers).map(SessionAddress))
    }
}

/// Check rate limit using Redis INCR with TTL.
///
/// # Returns
/// * `Ok(true)` if under limit
/// * `Ok(false)` if limit exceeded
pub async fn check_rate_limit<C>(
    con: &mut C,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let count: u32 = con.incr(key, 1).await?;

    // Window starts at the first request
    if count == 1 {
        con.expire::<_, ()>(key, window_secs as i64).await?;
    }

    Ok(count <= max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::session_cookie;
    use axum::{body::Body, http::Request, routing::get, Router};
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config::from_lookup(|key| {
            (key == "REDIS_URL").then(|| "redis://127.0.0.1:6379".to_string())
        })
        .unwrap();
        AppState {
            redis: redis::Client::open(config.redis_url.as_str()).unwrap(),
            config: Arc::new(config),
            contracts: Eip1271Client::new(HashMap::new(), Duration::from_secs(1)).unwrap(),
        }
    }

    async fn whoami(session: SessionAddress) -> String {
        session.0.to_string()
    }

    async fn maybe_whoami(session: Option<SessionAddress>) -> String {
        session
            .map(|s| s.0.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn app() -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route("/maybe", get(maybe_whoami))
            .with_state(test_state())
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_session_required() {
        let response = app()
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_from_cookie() {
        let address: WalletAddress = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let set_cookie = session_cookie(&address, 60, false).unwrap();
        let pair = set_cookie.split(';').next().unwrap().to_string();

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header("cookie", pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(body_text(response).await, address.to_string());
    }

    #[tokio::test]
    async fn test_optional_session_never_rejects() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/maybe")
                    .header("cookie", "advice_session=garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_check_rate_limit() {
        // Requires a running Redis instance; skipped otherwise
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let client = match redis::Client::open(redis_url) {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return;
            }
        };

        let mut con = match client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis connection failed");
                return;
            }
        };

        let test_key = "test:ratelimit:unit";
        let _: Result<(), _> = con.del(test_key).await;

        for _ in 0..3 {
            assert!(check_rate_limit(&mut con, test_key, 3, 60).await.unwrap());
        }
        assert!(!check_rate_limit(&mut con, test_key, 3, 60).await.unwrap());

        let _: Result<(), _> = con.del(test_key).await;
    }
}
