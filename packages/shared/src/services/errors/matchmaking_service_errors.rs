use thiserror::Error;

use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;

#[derive(Debug, Error, PartialEq)]
pub enum MatchmakingServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The store answered but the data could not be written or read back.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    /// The store failed or did not answer within the configured timeout.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<QueueRepositoryError> for MatchmakingServiceError {
    fn from(err: QueueRepositoryError) -> Self {
        match err {
            QueueRepositoryError::Serialization(msg) => {
                MatchmakingServiceError::PersistenceError(msg)
            }
            other => MatchmakingServiceError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<MatchRepositoryError> for MatchmakingServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        match err {
            MatchRepositoryError::Serialization(msg) => {
                MatchmakingServiceError::PersistenceError(msg)
            }
            other => MatchmakingServiceError::ServiceUnavailable(other.to_string()),
        }
    }
}
