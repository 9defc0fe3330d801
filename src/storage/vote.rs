//! Vote Redis operations.
//!
//! Redis key patterns:
//! - `votes:{question_id}` — hash voter address → choice (0..=3)
//! - `voter_votes:{address}` — sorted set of question ids, score = first vote time (ms)
//! - `vote_results:{question_id}` — hash with the four counts and `updated_at`
//!
//! A voter has one field per question hash, so HSET is a last-write-wins
//! upsert. The aggregate is always recomputed from the hash.

use crate::auth::address::WalletAddress;
use crate::models::{Choice, VoteResults};
use crate::storage::corrupt;
use crate::voting::VoteCounts;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;

fn votes_key(question_id: u64) -> String {
    format!("votes:{}", question_id)
}

fn voter_key(voter: &WalletAddress) -> String {
    format!("voter_votes:{}", voter)
}

fn results_key(question_id: u64) -> String {
    format!("vote_results:{}", question_id)
}

fn parse_choice(raw: &str) -> Result<Choice, redis::RedisError> {
    raw.parse::<u8>()
        .ok()
        .and_then(|n| Choice::try_from(n).ok())
        .ok_or_else(|| corrupt("stored choice", raw.to_string()))
}

/// Insert or overwrite `voter`'s choice on a question.
pub async fn upsert_vote<C>(
    con: &mut C,
    question_id: u64,
    voter: &WalletAddress,
    choice: Choice,
    now: DateTime<Utc>,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    redis::pipe()
        .atomic()
        .hset(votes_key(question_id), voter.to_string(), u8::from(choice))
        .ignore()
        // NX keeps the time of the first vote when a voter changes their mind
        .cmd("ZADD")
        .arg(voter_key(voter))
        .arg("NX")
        .arg(now.timestamp_millis())
        .arg(question_id)
        .ignore()
        .query_async::<()>(con)
        .await
}

pub async fn get_vote<C>(
    con: &mut C,
    question_id: u64,
    voter: &WalletAddress,
) -> Result<Option<Choice>, redis::RedisError>
where
    C: AsyncCommands,
{
    let raw: Option<String> = con.hget(votes_key(question_id), voter.to_string()).await?;
    raw.as_deref().map(parse_choice).transpose()
}

/// Count every stored vote on a question.
pub async fn tally_votes<C>(con: &mut C, question_id: u64) -> Result<VoteCounts, redis::RedisError>
where
    C: AsyncCommands,
{
    let raw: Vec<String> = con.hvals(votes_key(question_id)).await?;
    let choices = raw
        .iter()
        .map(|value| parse_choice(value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(VoteCounts::tally(choices))
}

/// Overwrite the aggregate row for a question.
pub async fn upsert_results<C>(
    con: &mut C,
    question_id: u64,
    results: &VoteResults,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let counts = &results.counts;
    let fields = [
        ("yes", counts.yes.to_string()),
        ("no", counts.no.to_string()),
        ("wait", counts.wait.to_string()),
        ("depends", counts.depends.to_string()),
        ("updated_at", results.updated_at.to_rfc3339()),
    ];
    con.hset_multiple::<_, _, _, ()>(results_key(question_id), &fields)
        .await
}

pub async fn get_results<C>(
    con: &mut C,
    question_id: u64,
) -> Result<Option<VoteResults>, redis::RedisError>
where
    C: AsyncCommands,
{
    let fields: HashMap<String, String> = con.hgetall(results_key(question_id)).await?;
    if fields.is_empty() {
        return Ok(None);
    }

    let count = |name: &'static str| -> Result<u64, redis::RedisError> {
        match fields.get(name) {
            Some(raw) => raw.parse().map_err(|_| corrupt("vote count", raw.clone())),
            None => Ok(0),
        }
    };
    let counts = VoteCounts {
        yes: count("yes")?,
        no: count("no")?,
        wait: count("wait")?,
        depends: count("depends")?,
    };

    let updated_at = fields
        .get("updated_at")
        .ok_or_else(|| corrupt("vote results", "missing updated_at".to_string()))?;
    let updated_at = DateTime::parse_from_rfc3339(updated_at)
        .map_err(|e| corrupt("vote results updated_at", e.to_string()))?
        .with_timezone(&Utc);

    Ok(Some(VoteResults { counts, updated_at }))
}

/// A voter's votes as `(question_id, choice)`, most recent first.
pub async fn list_voter_votes<C>(
    con: &mut C,
    voter: &WalletAddress,
) -> Result<Vec<(u64, Choice)>, redis::RedisError>
where
    C: AsyncCommands,
{
    let ids: Vec<u64> = con.zrevrange(voter_key(voter), 0, -1).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    // One round trip for every choice
    let field = voter.to_string();
    let mut pipe = redis::pipe();
    for id in &ids {
        pipe.hget(votes_key(*id), &field);
    }
    let raw: Vec<Option<String>> = pipe.query_async(con).await?;

    let mut votes = Vec::with_capacity(ids.len());
    for (id, raw) in ids.into_iter().zip(raw) {
        if let Some(raw) = raw {
            votes.push((id, parse_choice(&raw)?));
        }
    }
    Ok(votes)
}

pub async fn count_votes_by_voter<C>(
    con: &mut C,
    voter: &WalletAddress,
) -> Result<u64, redis::RedisError>
where
    C: AsyncCommands,
{
    con.zcard(voter_key(voter)).await
}
