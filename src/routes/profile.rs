//! Profile API endpoints.

use crate::auth::middleware::{AppState, SessionAddress};
use crate::error::AppError;
use crate::models::ProfileStats;
use crate::storage;
use axum::{extract::State, response::IntoResponse, Json};

/// GET /api/profile/stats — How many questions the wallet asked and answered
pub async fn stats(
    State(state): State<AppState>,
    SessionAddress(address): SessionAddress,
) -> Result<impl IntoResponse, AppError> {
    let mut con = state.connection().await?;

    let questions_count = storage::question::count_questions_by_creator(&mut con, &address).await?;
    let votes_count = storage::vote::count_votes_by_voter(&mut con, &address).await?;

    Ok(Json(ProfileStats {
        questions_count,
        votes_count,
    }))
}
