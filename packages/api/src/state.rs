use std::sync::Arc;
use std::time::Duration;

use shared::config::{AppConfig, StorageBackend};
use shared::repositories::in_memory::{
    InMemoryMatchRepository, InMemoryQueueRepository, InMemoryUserRepository,
};
use shared::repositories::match_repository::{DynamoDbMatchRepository, MatchRepository};
use shared::repositories::queue_repository::{DynamoDbQueueRepository, QueueRepository};
use shared::repositories::user_repository::{DynamoDbUserRepository, UserRepository};
use shared::services::auth_service::AuthService;
use shared::services::matchmaking_service::MatchmakingService;
use shared::services::user_service::UserService;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub matchmaking_service: Arc<MatchmakingService>,
    /// Upper bound for store reads made directly by handlers.
    pub store_timeout: Duration,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> Self {
        match config.storage_backend {
            StorageBackend::DynamoDb => {
                let aws_config = aws_config::load_from_env().await;
                let client = aws_sdk_dynamodb::Client::new(&aws_config);
                info!(
                    queue_table = %config.tables.queue,
                    matches_table = %config.tables.matches,
                    users_table = %config.tables.users,
                    "using DynamoDB storage"
                );

                Self::from_repositories(
                    Arc::new(DynamoDbQueueRepository::new(
                        client.clone(),
                        config.tables.queue.clone(),
                    )),
                    Arc::new(DynamoDbMatchRepository::new(
                        client.clone(),
                        config.tables.matches.clone(),
                    )),
                    Arc::new(DynamoDbUserRepository::new(
                        client,
                        config.tables.users.clone(),
                    )),
                    &config.jwt_secret,
                    config.store_timeout,
                )
            }
            StorageBackend::Memory => {
                info!("using in-memory storage");
                Self::in_memory(&config.jwt_secret, config.store_timeout)
            }
        }
    }

    /// State backed by process-local repositories. Nothing survives a restart.
    pub fn in_memory(jwt_secret: &str, store_timeout: Duration) -> Self {
        Self::from_repositories(
            Arc::new(InMemoryQueueRepository::new()),
            Arc::new(InMemoryMatchRepository::new()),
            Arc::new(InMemoryUserRepository::new()),
            jwt_secret,
            store_timeout,
        )
    }

    pub fn from_repositories(
        queue_repository: Arc<dyn QueueRepository>,
        match_repository: Arc<dyn MatchRepository>,
        user_repository: Arc<dyn UserRepository>,
        jwt_secret: &str,
        store_timeout: Duration,
    ) -> Self {
        let user_service = Arc::new(UserService::new(user_repository));
        let auth_service = Arc::new(AuthService::new(user_service.clone(), jwt_secret));
        let matchmaking_service = Arc::new(MatchmakingService::new(
            queue_repository,
            match_repository,
            store_timeout,
        ));

        AppState {
            auth_service,
            user_service,
            matchmaking_service,
            store_timeout,
        }
    }
}
