use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not logged in: no bearer token")]
    MissingToken,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Status polling failed: {0}")]
    Polling(String),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
