use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::auth::responses::{LoginResponse, TokenClaims};
use crate::services::errors::auth_service_errors::AuthServiceError;
use crate::services::errors::user_service_errors::UserServiceError;
use crate::services::password::verify_password;
use crate::services::user_service::UserService;

const TOKEN_TTL_HOURS: i64 = 24;

pub struct AuthService {
    user_service: Arc<UserService>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(user_service: Arc<UserService>, jwt_secret: impl Into<String>) -> Self {
        AuthService {
            user_service,
            jwt_secret: jwt_secret.into(),
        }
    }

    pub async fn authenticate_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginResponse, AuthServiceError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthServiceError::ValidationError(
                "Email or password cannot be empty".to_string(),
            ));
        }

        let user = match self.user_service.get_user_by_email(email).await {
            Ok(user) => user,
            Err(UserServiceError::UserNotFound) => return Err(AuthServiceError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        };

        if !verify_password(password, &user.password_hash)? {
            debug!(user_id = %user.id, "login rejected, wrong password");
            return Err(AuthServiceError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        self.generate_token(&user.id)
    }

    pub fn generate_token(&self, user_id: &str) -> Result<LoginResponse, AuthServiceError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|e| AuthServiceError::JwtError(e.to_string()))?;

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: TOKEN_TTL_HOURS * 60 * 60,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthServiceError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());

        match decode::<TokenClaims>(token, &decoding_key, &Validation::default()) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(AuthServiceError::ExpiredToken)
                }
                _ => Err(AuthServiceError::InvalidToken),
            },
        }
    }

    pub fn extract_user_id_from_token(&self, token: &str) -> Result<String, AuthServiceError> {
        let claims = self.verify_token(token)?;
        if claims.sub.is_empty() {
            return Err(AuthServiceError::InvalidToken);
        }
        Ok(claims.sub)
    }
}
