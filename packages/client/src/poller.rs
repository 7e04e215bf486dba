use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::MatchmakingClient;
use shared::models::matchmaking::responses::{MatchDetails, MatchmakingState, StatusResponse};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Last state observed by a [`StatusPoller`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Waiting {
        position: Option<usize>,
        total: Option<usize>,
    },
    Matched(MatchDetails),
    NotInQueue,
    /// A status request failed; polling ended.
    Failed(String),
    Stopped,
}

impl PollState {
    /// Every state other than `Waiting` ends polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Waiting { .. })
    }
}

impl From<StatusResponse> for PollState {
    fn from(response: StatusResponse) -> Self {
        match (response.status, response.match_details) {
            (MatchmakingState::Waiting, _) => PollState::Waiting {
                position: response.position,
                total: response.total,
            },
            (MatchmakingState::Matched, Some(details)) => PollState::Matched(details),
            (MatchmakingState::Matched, None) => {
                PollState::Failed("matched response without match details".to_string())
            }
            (MatchmakingState::NotInQueue, _) => PollState::NotInQueue,
        }
    }
}

/// Polls `GET /matchmaking/status` on a fixed interval in a background task
/// and publishes each observed state. Dropping the poller stops it.
pub struct StatusPoller {
    state: watch::Receiver<PollState>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Spawns the polling task. The first request goes out after one interval.
    pub fn start(client: MatchmakingClient, interval: Duration, initial: PollState) -> Self {
        let (state_tx, state_rx) = watch::channel(initial);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("status polling stopped");
                        state_tx.send_replace(PollState::Stopped);
                        break;
                    }
                    _ = ticker.tick() => {
                        // a stop request must not wait behind a slow status call
                        let polled = tokio::select! {
                            _ = &mut stop_rx => None,
                            polled = client.status() => Some(polled),
                        };
                        let next = match polled {
                            None => {
                                debug!("status polling stopped during a request");
                                state_tx.send_replace(PollState::Stopped);
                                break;
                            }
                            Some(Ok(response)) => PollState::from(response),
                            Some(Err(e)) => {
                                warn!(error = %e, "status poll failed");
                                PollState::Failed(e.to_string())
                            }
                        };

                        let terminal = next.is_terminal();
                        if let PollState::Matched(details) = &next {
                            info!(match_id = %details.match_id, opponent = %details.opponent.id, "match found");
                        }
                        state_tx.send_replace(next);
                        if terminal {
                            break;
                        }
                    }
                }
            }
        });

        StatusPoller {
            state: state_rx,
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn current(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Resolves with the first terminal state.
    pub async fn wait_for_terminal(&self) -> PollState {
        let mut updates = self.state.clone();
        loop {
            let state = updates.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if updates.changed().await.is_err() {
                return updates.borrow().clone();
            }
        }
    }

    /// Stops polling and waits for the task to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
