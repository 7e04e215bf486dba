use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueueRepositoryError {
    #[error("Queue entry not found")]
    NotFound,
    #[error("Queue entry already exists")]
    AlreadyExists,
    /// A conditional pairing write lost to a concurrent change.
    #[error("Queue entry changed concurrently")]
    Conflict,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}
