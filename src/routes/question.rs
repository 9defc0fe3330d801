//! Question API endpoints.

use crate::auth::address::WalletAddress;
use crate::auth::middleware::{AppState, SessionAddress};
use crate::error::AppError;
use crate::models::{CreateQuestionRequest, ListQuestionsQuery, QuestionDetail, VoteSummary};
use crate::routes::{parse_id, parse_page, ApiJson};
use crate::storage;
use crate::voting;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::Value;

/// Longest stored question body, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

const QUESTION_PREFIX: &str = "Should I";

/// Whether `body` opens with "Should I" (any case) followed by whitespace.
pub fn is_should_i_question(body: &str) -> bool {
    match body.get(..QUESTION_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(QUESTION_PREFIX) => body
            [QUESTION_PREFIX.len()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace),
        _ => false,
    }
}

/// GET /api/questions — List questions newest first
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let creator = query
        .creator
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<WalletAddress>())
        .transpose()
        .map_err(|_| AppError::BadRequest("Invalid creator address".to_string()))?;
    let (offset, limit) = parse_page(query.limit.as_deref(), query.offset.as_deref())?;

    let mut con = state.connection().await?;
    let questions =
        storage::question::list_questions(&mut con, creator.as_ref(), offset, limit).await?;

    Ok(Json(questions))
}

/// POST /api/questions — Ask a new question
pub async fn create_question(
    State(state): State<AppState>,
    SessionAddress(creator): SessionAddress,
    ApiJson(req): ApiJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let body = match &req.body {
        Value::String(s) if !s.is_empty() => s.trim(),
        _ => return Err(AppError::BadRequest("body is required".to_string())),
    };

    if !is_should_i_question(body) {
        return Err(AppError::BadRequest(
            "Questions must start with \"Should I\" (e.g. \"Should I buy this?\")".to_string(),
        ));
    }
    let body: String = body.chars().take(MAX_BODY_CHARS).collect();

    let image_url = match req.image_url {
        Value::String(url) if !url.is_empty() => Some(url),
        _ => None,
    };

    let mut con = state.connection().await?;
    let question =
        storage::question::create_question(&mut con, &creator, &body, image_url, Utc::now())
            .await?;

    tracing::info!(action = "question_created", question_id = question.id, creator = %creator, "Question created");

    Ok(Json(question))
}

/// GET /api/questions/{id} — Fetch a question with the viewer's vote and, when visible, results
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
    session: Option<SessionAddress>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;

    let mut con = state.connection().await?;
    let question = storage::question::get_question(&mut con, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let viewer = session.map(|s| s.0);
    let my_choice = match &viewer {
        Some(voter) => storage::vote::get_vote(&mut con, id, voter).await?,
        None => None,
    };
    let has_voted = my_choice.is_some();
    let is_creator = viewer == Some(question.creator_address);

    let now = Utc::now();
    let is_open = voting::is_open(question.created_at, now);

    // Results stay hidden from undecided voters until the window closes
    let results = if has_voted || is_creator || !is_open {
        let counts = storage::vote::get_results(&mut con, id)
            .await?
            .map(|r| r.counts)
            .unwrap_or_default();
        Some(VoteSummary::from(counts))
    } else {
        None
    };

    Ok(Json(QuestionDetail {
        closes_at: voting::closes_at(question.created_at),
        question,
        is_open,
        has_voted,
        my_choice,
        results,
    }))
}
