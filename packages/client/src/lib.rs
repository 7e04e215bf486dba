//! HTTP client for the matchmaking API, with background status polling.

pub mod client;
pub mod error;
pub mod poller;
pub mod session;

pub use client::{MatchmakingClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
pub use poller::{PollState, StatusPoller, DEFAULT_POLL_INTERVAL};
pub use session::MatchmakingSession;
