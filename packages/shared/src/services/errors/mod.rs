pub mod auth_service_errors;
pub mod matchmaking_service_errors;
pub mod user_service_errors;
