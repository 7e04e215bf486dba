use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::matchmaking::responses::ErrorResponse;
use shared::services::errors::{
    auth_service_errors::AuthServiceError, matchmaking_service_errors::MatchmakingServiceError,
    user_service_errors::UserServiceError,
};
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    UserService(UserServiceError),
    AuthService(AuthServiceError),
    MatchmakingService(MatchmakingServiceError),
    Unauthorized(String),
}

impl From<UserServiceError> for ApiError {
    fn from(error: UserServiceError) -> Self {
        ApiError::UserService(error)
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(error: AuthServiceError) -> Self {
        ApiError::AuthService(error)
    }
}

impl From<MatchmakingServiceError> for ApiError {
    fn from(error: MatchmakingServiceError) -> Self {
        ApiError::MatchmakingService(error)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UserService(UserServiceError::UserAlreadyExists) => StatusCode::CONFLICT,
            ApiError::UserService(UserServiceError::UserNotFound) => StatusCode::NOT_FOUND,
            ApiError::UserService(UserServiceError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::UserService(
                UserServiceError::RepositoryError(_) | UserServiceError::HashingError(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::AuthService(AuthServiceError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            ApiError::AuthService(AuthServiceError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::AuthService(
                AuthServiceError::InvalidToken | AuthServiceError::ExpiredToken,
            ) => StatusCode::UNAUTHORIZED,
            ApiError::AuthService(
                AuthServiceError::UserServiceError(_) | AuthServiceError::JwtError(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::MatchmakingService(MatchmakingServiceError::ValidationError(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MatchmakingService(
                MatchmakingServiceError::PersistenceError(_)
                | MatchmakingServiceError::ServiceUnavailable(_),
            ) => StatusCode::SERVICE_UNAVAILABLE,

            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message safe to show to clients; internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::UserService(
                UserServiceError::RepositoryError(_) | UserServiceError::HashingError(_),
            )
            | ApiError::AuthService(
                AuthServiceError::UserServiceError(_) | AuthServiceError::JwtError(_),
            ) => "Internal server error".to_string(),
            ApiError::MatchmakingService(
                MatchmakingServiceError::PersistenceError(_)
                | MatchmakingServiceError::ServiceUnavailable(_),
            ) => "Matchmaking is temporarily unavailable".to_string(),
            ApiError::UserService(e) => e.to_string(),
            ApiError::AuthService(e) => e.to_string(),
            ApiError::MatchmakingService(e) => e.to_string(),
            ApiError::Unauthorized(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, %status, "request failed");
        }

        (status, Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}
