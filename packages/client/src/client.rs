use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;
use shared::models::auth::requests::LoginRequest;
use shared::models::auth::responses::LoginResponse;
use shared::models::matchmaking::responses::{ErrorResponse, LeaveResponse, StatusResponse};

/// Per-request limit, so no call waits on an unresponsive server forever.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over the matchmaking HTTP API. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct MatchmakingClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl MatchmakingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        MatchmakingClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Logs in and keeps the returned token for later calls.
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<LoginResponse, ClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/auth/login"))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await?;
        let login: LoginResponse = parse(response).await?;

        self.token = Some(login.token.clone());
        Ok(login)
    }

    pub async fn join(&self) -> Result<StatusResponse, ClientError> {
        let request = self.authorized(self.http.post(self.url("/matchmaking/join")))?;
        parse(request.send().await?).await
    }

    pub async fn leave(&self) -> Result<LeaveResponse, ClientError> {
        let request = self.authorized(self.http.post(self.url("/matchmaking/leave")))?;
        parse(request.send().await?).await
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let request = self.authorized(self.http.get(self.url("/matchmaking/status")))?;
        parse(request.send().await?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        Ok(request.bearer_auth(token).timeout(self.request_timeout))
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await?;
    debug!(%status, body = %body, "request rejected");
    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => error.error,
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
