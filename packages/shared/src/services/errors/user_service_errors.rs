use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum UserServiceError {
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("User not found")]
    UserNotFound,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Repository error: {0}")]
    RepositoryError(String),
    #[error("Password hashing error: {0}")]
    HashingError(String),
}
