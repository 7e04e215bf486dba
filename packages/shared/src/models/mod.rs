pub mod auth;
pub mod matchmaking;
pub mod queue;
pub mod user;
