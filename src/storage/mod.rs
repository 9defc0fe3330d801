//! Redis storage layer for nonces, questions and votes, plus the image store.
//!
//! All Redis functions are async and generic over redis::AsyncCommands.
//! Records are serialized to JSON unless they are plain counters or hashes.

pub mod blob;
pub mod nonce;
pub mod question;
pub mod vote;

use serde::{de::DeserializeOwned, Serialize};

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, redis::RedisError> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "JSON serialize",
            e.to_string(),
        ))
    })
}

pub(crate) fn from_json<T: DeserializeOwned>(data: &str) -> Result<T, redis::RedisError> {
    serde_json::from_str(data).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "JSON deserialize",
            e.to_string(),
        ))
    })
}

/// Error for a stored value that no longer parses.
pub(crate) fn corrupt(what: &'static str, detail: String) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, what, detail))
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Connect to the Redis at REDIS_URL (default localhost), or `None` so
    /// the calling test can skip.
    pub async fn connect() -> Option<redis::aio::MultiplexedConnection> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let client = match redis::Client::open(redis_url) {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return None;
            }
        };

        match client.get_multiplexed_async_connection().await {
            Ok(c) => Some(c),
            Err(_) => {
                eprintln!("Skipping test: Redis connection failed");
                None
            }
        }
    }
}
