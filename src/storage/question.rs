//! Question Redis operations.
//!
//! Redis key patterns:
//! - `question:next_id` — id counter
//! - `question:{id}` — question data (JSON)
//! - `questions` — sorted set of all ids, score = id
//! - `questions:creator:{address}` — sorted set of one creator's ids
//!
//! Ids grow with creation time, so reverse score order is newest first.

use crate::auth::address::WalletAddress;
use crate::models::StoredQuestion;
use crate::storage::{from_json, to_json};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

const NEXT_ID_KEY: &str = "question:next_id";
const ALL_QUESTIONS_KEY: &str = "questions";

fn question_key(id: u64) -> String {
    format!("question:{}", id)
}

fn creator_key(creator: &WalletAddress) -> String {
    format!("questions:creator:{}", creator)
}

/// Allocate an id and store a new question.
pub async fn create_question<C>(
    con: &mut C,
    creator: &WalletAddress,
    body: &str,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
) -> Result<StoredQuestion, redis::RedisError>
where
    C: AsyncCommands,
{
    let id: u64 = con.incr(NEXT_ID_KEY, 1).await?;

    let question = StoredQuestion {
        id,
        creator_address: *creator,
        body: body.to_string(),
        image_url,
        created_at,
    };
    let json = to_json(&question)?;

    redis::pipe()
        .atomic()
        .set(question_key(id), json)
        .ignore()
        .zadd(ALL_QUESTIONS_KEY, id, id)
        .ignore()
        .zadd(creator_key(creator), id, id)
        .ignore()
        .query_async::<()>(con)
        .await?;

    Ok(question)
}

pub async fn get_question<C>(
    con: &mut C,
    id: u64,
) -> Result<Option<StoredQuestion>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(question_key(id)).await?;
    json.map(|data| from_json(&data)).transpose()
}

/// Fetch several questions at once; missing ids yield `None` in place.
pub async fn get_questions<C>(
    con: &mut C,
    ids: &[u64],
) -> Result<Vec<Option<StoredQuestion>>, redis::RedisError>
where
    C: AsyncCommands,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<String> = ids.iter().map(|&id| question_key(id)).collect();
    let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(con).await?;

    values
        .into_iter()
        .map(|json| json.map(|data| from_json(&data)).transpose())
        .collect()
}

/// List questions newest first, optionally only those by `creator`.
///
/// Without a `limit` every question from `offset` on is returned.
pub async fn list_questions<C>(
    con: &mut C,
    creator: Option<&WalletAddress>,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<StoredQuestion>, redis::RedisError>
where
    C: AsyncCommands,
{
    let key = match creator {
        Some(address) => creator_key(address),
        None => ALL_QUESTIONS_KEY.to_string(),
    };

    let start = isize::try_from(offset).unwrap_or(isize::MAX);
    let stop = match limit {
        Some(limit) => start.saturating_add(isize::try_from(limit).unwrap_or(isize::MAX) - 1),
        None => -1,
    };

    let ids: Vec<u64> = con.zrevrange(&key, start, stop).await?;
    let questions = get_questions(con, &ids).await?;

    Ok(questions.into_iter().flatten().collect())
}

pub async fn count_questions_by_creator<C>(
    con: &mut C,
    creator: &WalletAddress,
) -> Result<u64, redis::RedisError>
where
    C: AsyncCommands,
{
    con.zcard(creator_key(creator)).await
}
