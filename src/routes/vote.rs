//! Vote API endpoints.

use crate::auth::middleware::{AppState, SessionAddress};
use crate::error::AppError;
use crate::models::{Choice, MyVote, VoteResults, VoteSummary};
use crate::routes::{parse_id, ApiJson};
use crate::storage;
use crate::voting;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::Value;

/// POST /api/questions/{id}/vote — Cast or change a vote
pub async fn cast_vote(
    State(state): State<AppState>,
    SessionAddress(voter): SessionAddress,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<Value>,
) -> Result<impl IntoResponse, AppError> {
    let question_id = parse_id(&id)?;
    let choice = Choice::from_json(&req["choice"])
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut con = state.connection().await?;
    let question = storage::question::get_question(&mut con, question_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    // Self-votes fail the same way whether or not the window is open
    if question.creator_address == voter {
        return Err(AppError::Forbidden(
            "You can't vote on your own question".to_string(),
        ));
    }

    let now = Utc::now();
    if !voting::is_open(question.created_at, now) {
        return Err(AppError::BadRequest(
            "Voting closed for this question".to_string(),
        ));
    }

    storage::vote::upsert_vote(&mut con, question_id, &voter, choice, now).await?;

    let counts = storage::vote::tally_votes(&mut con, question_id).await?;
    storage::vote::upsert_results(
        &mut con,
        question_id,
        &VoteResults {
            counts,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!(action = "vote_cast", question_id, voter = %voter, choice = u8::from(choice), "Vote recorded");

    Ok(Json(VoteSummary::from(counts)))
}

/// GET /api/my-votes — The signed-in wallet's votes, newest first
pub async fn my_votes(
    State(state): State<AppState>,
    SessionAddress(voter): SessionAddress,
) -> Result<impl IntoResponse, AppError> {
    let mut con = state.connection().await?;

    let votes = storage::vote::list_voter_votes(&mut con, &voter).await?;
    let ids: Vec<u64> = votes.iter().map(|(id, _)| *id).collect();
    let questions = storage::question::get_questions(&mut con, &ids).await?;

    let history: Vec<MyVote> = votes
        .into_iter()
        .zip(questions)
        .map(|((question_id, choice), question)| MyVote {
            question_id,
            choice,
            body: question.map(|q| q.body),
        })
        .collect();

    Ok(Json(history))
}
