pub mod auth_service;
pub mod errors;
pub mod matchmaking_service;
pub mod password;
pub mod user_service;
