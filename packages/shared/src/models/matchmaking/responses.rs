use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MatchmakingStatus;

/// Wire form of a user's matchmaking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchmakingState {
    NotInQueue,
    Waiting,
    Matched,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opponent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    pub match_id: String,
    pub opponent: Opponent,
    pub created_at: DateTime<Utc>,
}

/// Body of both `POST /matchmaking/join` and `GET /matchmaking/status`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub status: MatchmakingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_details: Option<MatchDetails>,
}

impl StatusResponse {
    /// `opponent_name` is only used for the matched state.
    pub fn from_status(status: MatchmakingStatus, opponent_name: Option<String>) -> Self {
        match status {
            MatchmakingStatus::NotInQueue => StatusResponse {
                success: true,
                status: MatchmakingState::NotInQueue,
                position: None,
                total: None,
                match_details: None,
            },
            MatchmakingStatus::Waiting { position, total } => StatusResponse {
                success: true,
                status: MatchmakingState::Waiting,
                position: Some(position),
                total: Some(total),
                match_details: None,
            },
            MatchmakingStatus::Matched { details, peer_id } => StatusResponse {
                success: true,
                status: MatchmakingState::Matched,
                position: None,
                total: None,
                match_details: Some(MatchDetails {
                    match_id: details.match_id,
                    opponent: Opponent {
                        id: peer_id,
                        display_name: opponent_name,
                    },
                    created_at: details.created_at,
                }),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LeaveResponse {
    pub success: bool,
    pub status: MatchmakingState,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            success: false,
            error: error.into(),
        }
    }
}
