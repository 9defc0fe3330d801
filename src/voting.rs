//! Voting window and result arithmetic.
//!
//! Everything here is a pure function of timestamps and stored choices; a
//! question has no stored open/closed flag.

use crate::models::Choice;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a question accepts votes after it is created.
pub const VOTING_WINDOW: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionState {
    Open,
    Closed,
}

/// A question is open while less than [`VOTING_WINDOW`] has elapsed.
pub fn is_open(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < VOTING_WINDOW
}

/// First instant at which the question is closed.
pub fn closes_at(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + VOTING_WINDOW
}

pub fn state_at(created_at: DateTime<Utc>, now: DateTime<Utc>) -> QuestionState {
    if is_open(created_at, now) {
        QuestionState::Open
    } else {
        QuestionState::Closed
    }
}

/// Number of votes per choice for one question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub yes: u64,
    pub no: u64,
    pub wait: u64,
    pub depends: u64,
}

/// Share of the vote per choice, each rounded to the nearest whole percent.
///
/// Buckets are rounded independently, so the sum may be 99 or 101.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentages {
    pub yes: u64,
    pub no: u64,
    pub wait: u64,
    pub depends: u64,
}

impl VoteCounts {
    pub fn tally<I>(choices: I) -> Self
    where
        I: IntoIterator<Item = Choice>,
    {
        let mut counts = VoteCounts::default();
        for choice in choices {
            counts.add(choice);
        }
        counts
    }

    pub fn add(&mut self, choice: Choice) {
        match choice {
            Choice::Yes => self.yes += 1,
            Choice::No => self.no += 1,
            Choice::Wait => self.wait += 1,
            Choice::Depends => self.depends += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.yes + self.no + self.wait + self.depends
    }

    pub fn percentages(&self) -> Percentages {
        let total = self.total();
        if total == 0 {
            return Percentages::default();
        }
        // Round half up in integer arithmetic: floor(count * 100 / total + 1/2)
        let pct = |count: u64| (count * 200 + total) / (2 * total);
        Percentages {
            yes: pct(self.yes),
            no: pct(self.no),
            wait: pct(self.wait),
            depends: pct(self.depends),
        }
    }
}
