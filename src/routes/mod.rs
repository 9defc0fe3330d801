//! API route handlers.

pub mod auth;
pub mod profile;
pub mod question;
pub mod upload;
pub mod vote;

use crate::auth::middleware::AppState;
use crate::error::AppError;
use axum::{
    extract::{FromRequest, Request},
    routing::get,
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;

/// Largest page `GET /api/questions` returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Largest accepted `offset`; a full page past it still fits a Redis range index.
pub const MAX_OFFSET: usize = isize::MAX as usize - MAX_PAGE_SIZE;

/// Parse a question id path segment.
pub fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.parse::<u64>()
        .map_err(|_| AppError::BadRequest("Invalid id".to_string()))
}

/// Page bounds from raw `limit` / `offset` query values.
///
/// `limit` is clamped to 1..=100 and absent means unbounded. `offset` is
/// clamped to `0..=MAX_OFFSET`.
pub fn parse_page(
    limit: Option<&str>,
    offset: Option<&str>,
) -> Result<(usize, Option<usize>), AppError> {
    let limit = match limit.filter(|s| !s.is_empty()) {
        Some(raw) => {
            let n: i64 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::BadRequest("Invalid limit".to_string()))?;
            Some(n.clamp(1, MAX_PAGE_SIZE as i64) as usize)
        }
        None => None,
    };

    let offset = match offset.filter(|s| !s.is_empty()) {
        Some(raw) => {
            let n: i64 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::BadRequest("Invalid offset".to_string()))?;
            usize::try_from(n.max(0)).map_or(MAX_OFFSET, |n| n.min(MAX_OFFSET))
        }
        None => 0,
    };

    Ok((offset, limit))
}

/// JSON request body whose rejections render as `{"error": ...}`.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Auth endpoints
        .route("/api/auth/nonce", get(auth::issue_nonce))
        .route("/api/auth/message", post(auth::sign_in_message))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/logout", post(auth::logout))
        // Question endpoints
        .route(
            "/api/questions",
            get(question::list_questions).post(question::create_question),
        )
        .route("/api/questions/{id}", get(question::get_question))
        .route("/api/questions/{id}/vote", post(vote::cast_vote))
        // Per-user endpoints
        .route("/api/my-votes", get(vote::my_votes))
        .route("/api/profile/stats", get(profile::stats))
        .route("/api/upload", post(upload::upload_image))
}
