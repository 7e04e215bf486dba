use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MatchRepositoryError {
    #[error("Match already exists")]
    AlreadyExists,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}
