//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent Redis data structures.

use crate::auth::address::WalletAddress;
use crate::voting::{Percentages, VoteCounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Votes
// ============================================================================

/// A voter's answer to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Choice {
    Yes = 0,
    No = 1,
    Wait = 2,
    Depends = 3,
}

#[derive(Debug, thiserror::Error)]
#[error("choice must be 0, 1, 2, or 3")]
pub struct InvalidChoice;

impl TryFrom<u8> for Choice {
    type Error = InvalidChoice;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Choice::Yes),
            1 => Ok(Choice::No),
            2 => Ok(Choice::Wait),
            3 => Ok(Choice::Depends),
            _ => Err(InvalidChoice),
        }
    }
}

impl From<Choice> for u8 {
    fn from(choice: Choice) -> Self {
        choice as u8
    }
}

impl Choice {
    /// Accept only a JSON integer in 0..=3.
    pub fn from_json(value: &Value) -> Result<Self, InvalidChoice> {
        value
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or(InvalidChoice)
            .and_then(Choice::try_from)
    }
}

/// Counts and rounded shares for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteSummary {
    pub counts: VoteCounts,
    pub percentages: Percentages,
}

impl From<VoteCounts> for VoteSummary {
    fn from(counts: VoteCounts) -> Self {
        VoteSummary {
            percentages: counts.percentages(),
            counts,
        }
    }
}

/// Aggregate row as stored in Redis, recomputed after every vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteResults {
    pub counts: VoteCounts,
    pub updated_at: DateTime<Utc>,
}

/// Entry in the signed-in user's vote history.
#[derive(Debug, Serialize, Deserialize)]
pub struct MyVote {
    pub question_id: u64,
    pub choice: Choice,
    pub body: Option<String>,
}

// ============================================================================
// Questions
// ============================================================================

/// Question as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredQuestion {
    pub id: u64,
    pub creator_address: WalletAddress,
    pub body: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/questions`. Fields stay untyped so a wrong JSON type
/// reads as missing instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct CreateQuestionRequest {
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub image_url: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuestionsQuery {
    pub creator: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// A question as seen by the current (possibly anonymous) viewer.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: StoredQuestion,
    pub is_open: bool,
    pub closes_at: DateTime<Utc>,
    pub has_voted: bool,
    pub my_choice: Option<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<VoteSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileStats {
    #[serde(rename = "questionsCount")]
    pub questions_count: u64,
    #[serde(rename = "votesCount")]
    pub votes_count: u64,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// Request for the canonical sign-in message.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub address: String,
    pub nonce: String,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Signed sign-in message. Missing fields are rejected as an invalid signature.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
}

/// Current signed-in address, `null` when signed out.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub address: Option<WalletAddress>,
}

// ============================================================================
// Uploads
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}
