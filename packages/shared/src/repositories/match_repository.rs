use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};

use crate::models::matchmaking::Match;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Stores a new match between the two users and returns it.
    async fn create_match(
        &self,
        waiting_user_id: &str,
        joining_user_id: &str,
    ) -> Result<Match, MatchRepositoryError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError>;

    /// Removes a match whose pairing never completed.
    async fn delete_match(&self, match_id: &str) -> Result<(), MatchRepositoryError>;
}

pub struct DynamoDbMatchRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbMatchRepository {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl MatchRepository for DynamoDbMatchRepository {
    async fn create_match(
        &self,
        waiting_user_id: &str,
        joining_user_id: &str,
    ) -> Result<Match, MatchRepositoryError> {
        let created = Match::new(waiting_user_id, joining_user_id);
        let item =
            to_item(&created).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(match_id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(created),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(MatchRepositoryError::AlreadyExists);
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(match_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = output.item {
            let found: Match =
                from_item(item).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
            Ok(Some(found))
        } else {
            Ok(None)
        }
    }

    async fn delete_match(&self, match_id: &str) -> Result<(), MatchRepositoryError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("match_id", AttributeValue::S(match_id.to_string()))
            .send()
            .await
            .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

        Ok(())
    }
}
