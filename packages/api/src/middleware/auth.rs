use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use crate::{error::ApiError, state::AppState};

/// Caller identity taken from the bearer token. The token subject is the user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("Invalid authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let user_id = state.auth_service.extract_user_id_from_token(token)?;

        Ok(AuthenticatedUser { user_id })
    }
}
