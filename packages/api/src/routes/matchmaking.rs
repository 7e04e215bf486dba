use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, warn};

use crate::{error::ApiError, middleware::auth::AuthenticatedUser, state::AppState};
use shared::models::matchmaking::responses::{LeaveResponse, MatchmakingState, StatusResponse};
use shared::models::matchmaking::MatchmakingStatus;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matchmaking/join", post(join_queue))
        .route("/matchmaking/leave", post(leave_queue))
        .route("/matchmaking/status", get(queue_status))
}

async fn join_queue(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .matchmaking_service
        .join(&authenticated_user.user_id)
        .await?;

    Ok(Json(describe(&state, status).await))
}

async fn leave_queue(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<LeaveResponse>, ApiError> {
    state
        .matchmaking_service
        .leave(&authenticated_user.user_id)
        .await?;

    Ok(Json(LeaveResponse {
        success: true,
        status: MatchmakingState::NotInQueue,
    }))
}

async fn queue_status(
    State(state): State<AppState>,
    authenticated_user: AuthenticatedUser,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .matchmaking_service
        .status(&authenticated_user.user_id)
        .await?;

    Ok(Json(describe(&state, status).await))
}

/// Builds the response body, adding the opponent's display name when the
/// profile can be loaded within the store timeout.
async fn describe(state: &AppState, status: MatchmakingStatus) -> StatusResponse {
    let opponent_name = match &status {
        MatchmakingStatus::Matched { peer_id, .. } => {
            let lookup = state.user_service.get_user_by_id(peer_id);
            match tokio::time::timeout(state.store_timeout, lookup).await {
                Ok(Ok(user)) => Some(user.display_name()),
                Ok(Err(e)) => {
                    warn!(peer_id = %peer_id, error = %e, "opponent profile lookup failed");
                    None
                }
                Err(_) => {
                    warn!(
                        peer_id = %peer_id,
                        timeout_ms = state.store_timeout.as_millis() as u64,
                        "opponent profile lookup timed out"
                    );
                    None
                }
            }
        }
        _ => None,
    };

    debug!(?status, "matchmaking status");
    StatusResponse::from_status(status, opponent_name)
}
