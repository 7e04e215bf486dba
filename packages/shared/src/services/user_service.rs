use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::models::user::User;
use crate::repositories::errors::user_repository_errors::UserRepositoryError;
use crate::repositories::user_repository::UserRepository;
use crate::services::errors::user_service_errors::UserServiceError;
use crate::services::password::hash_password;

const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        UserService { repository }
    }

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, UserServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() || first_name.is_empty() || last_name.is_empty()
        {
            return Err(UserServiceError::ValidationError(
                "Email, password, first name, or last name cannot be empty".to_string(),
            ));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(UserServiceError::ValidationError(
                "Email is not valid".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self
            .repository
            .email_exists(&email)
            .await
            .map_err(|e| UserServiceError::RepositoryError(e.to_string()))?
        {
            warn!(email = %email, "signup rejected, email already registered");
            return Err(UserServiceError::UserAlreadyExists);
        }

        let user = User::new(
            email,
            hash_password(password)?,
            first_name.to_string(),
            last_name.to_string(),
        );
        self.repository
            .create_user(&user)
            .await
            .map_err(|e| match e {
                UserRepositoryError::AlreadyExists => UserServiceError::UserAlreadyExists,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })?;

        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User, UserServiceError> {
        if user_id.is_empty() {
            return Err(UserServiceError::ValidationError(
                "User ID cannot be empty".to_string(),
            ));
        }
        self.repository
            .get_user_by_id(user_id)
            .await
            .map_err(|e| match e {
                UserRepositoryError::NotFound => UserServiceError::UserNotFound,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, UserServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Email cannot be empty".to_string(),
            ));
        }
        self.repository
            .get_user_by_email(&email)
            .await
            .map_err(|e| match e {
                UserRepositoryError::NotFound => UserServiceError::UserNotFound,
                _ => UserServiceError::RepositoryError(e.to_string()),
            })
    }
}
