pub mod responses;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A confirmed pairing of two users. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Match {
    pub match_id: String,
    /// The user who was waiting in the queue.
    pub user1_id: String,
    /// The user whose join produced the pairing.
    pub user2_id: String,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(user1_id: &str, user2_id: &str) -> Self {
        Match {
            match_id: Uuid::new_v4().to_string(),
            user1_id: user1_id.to_string(),
            user2_id: user2_id.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// Returns the other participant, or `None` if `user_id` is not part of the match.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.user2_id)
        } else if self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }
}

/// Lifecycle of a user with respect to matchmaking.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchmakingStatus {
    NotInQueue,
    Waiting { position: usize, total: usize },
    Matched { details: Match, peer_id: String },
}

impl MatchmakingStatus {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchmakingStatus::Matched { .. })
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, MatchmakingStatus::Waiting { .. })
    }
}
