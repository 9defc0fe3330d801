//! Issued sign-in nonces.
//!
//! Redis key pattern:
//! - `nonce:{nonce}` — issue time (RFC 3339), expires after the nonce TTL
//!
//! A nonce is accepted by at most one successful sign-in. DEL is atomic, so
//! of two concurrent verifications carrying the same nonce only one sees it.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;

fn nonce_key(nonce: &str) -> String {
    format!("nonce:{}", nonce)
}

/// Record a freshly issued nonce.
pub async fn store_nonce<C>(
    con: &mut C,
    nonce: &str,
    issued_at: DateTime<Utc>,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    con.set_ex::<_, _, ()>(nonce_key(nonce), issued_at.to_rfc3339(), ttl_secs)
        .await
}

/// Consume a nonce.
///
/// Returns true if it was issued and not yet used or expired.
pub async fn consume_nonce<C>(con: &mut C, nonce: &str) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let deleted: i32 = con.del(nonce_key(nonce)).await?;
    Ok(deleted > 0)
}
