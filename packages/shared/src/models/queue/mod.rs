use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's record of waiting to be matched.
///
/// Entries stay in the queue store after pairing with `is_matched` set and
/// `match_id` pointing at the match, so the waiting side can discover the
/// pairing on its next status poll.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueEntry {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub is_matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

impl QueueEntry {
    pub fn new(user_id: &str) -> Self {
        QueueEntry {
            user_id: user_id.to_string(),
            joined_at: Utc::now(),
            is_matched: false,
            match_id: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        !self.is_matched
    }

    pub fn mark_matched(&mut self, match_id: &str) {
        self.is_matched = true;
        self.match_id = Some(match_id.to_string());
    }
}
