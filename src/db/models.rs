use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub votes: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Builds a fresh poll with every option at zero votes.
    pub fn new(question: String, options: Vec<String>) -> Self {
        let votes = zero_tally(&options);
        Poll {
            id: Uuid::new_v4(),
            question,
            options,
            votes,
            created_at: Utc::now(),
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

pub fn zero_tally(options: &[String]) -> BTreeMap<String, u64> {
    options.iter().map(|o| (o.clone(), 0)).collect()
}

/// Point-in-time copy of a poll's tally, pushed to every live observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResults {
    pub poll_id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub votes: BTreeMap<String, u64>,
}

impl From<&Poll> for PollResults {
    fn from(poll: &Poll) -> Self {
        PollResults {
            poll_id: poll.id,
            question: poll.question.clone(),
            options: poll.options.clone(),
            votes: poll.votes.clone(),
        }
    }
}
