pub mod errors;
pub mod in_memory;
pub mod match_repository;
pub mod queue_repository;
pub mod user_repository;
