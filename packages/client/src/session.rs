use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::client::MatchmakingClient;
use crate::error::ClientError;
use crate::poller::{PollState, StatusPoller};
use shared::models::matchmaking::responses::{LeaveResponse, MatchmakingState, StatusResponse};

/// A user's matchmaking session: the API client plus at most one running
/// status poller. Dropping the session stops polling.
pub struct MatchmakingSession {
    client: MatchmakingClient,
    interval: Duration,
    poller: Option<StatusPoller>,
}

impl MatchmakingSession {
    pub fn new(client: MatchmakingClient, interval: Duration) -> Self {
        MatchmakingSession {
            client,
            interval,
            poller: None,
        }
    }

    pub fn client(&self) -> &MatchmakingClient {
        &self.client
    }

    /// Joins the queue and starts polling if the user has to wait.
    pub async fn join(&mut self) -> Result<StatusResponse, ClientError> {
        self.stop_polling().await;

        let response = self.client.join().await?;
        if response.status == MatchmakingState::Waiting {
            debug!(interval_ms = self.interval.as_millis() as u64, "waiting, starting status polling");
            self.poller = Some(StatusPoller::start(
                self.client.clone(),
                self.interval,
                PollState::from(response.clone()),
            ));
        }

        Ok(response)
    }

    /// Stops polling, then leaves the queue.
    pub async fn leave(&mut self) -> Result<LeaveResponse, ClientError> {
        self.stop_polling().await;
        self.client.leave().await
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    /// Updates from the running poller, if any.
    pub fn updates(&self) -> Option<watch::Receiver<PollState>> {
        self.poller.as_ref().map(StatusPoller::subscribe)
    }

    /// Resolves once polling reaches a terminal state. `None` when not polling.
    pub async fn wait_for_match(&self) -> Option<PollState> {
        match &self.poller {
            Some(poller) => Some(poller.wait_for_terminal().await),
            None => None,
        }
    }

    pub async fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
    }
}
