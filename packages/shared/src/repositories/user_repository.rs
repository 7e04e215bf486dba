use crate::models::user::User;
use crate::repositories::errors::user_repository_errors::UserRepositoryError;
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};

#[cfg(test)]
use mockall::automock;

pub const EMAIL_INDEX: &str = "GSI_UserByEmail";

pub struct DynamoDbUserRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbUserRepository {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), UserRepositoryError>;
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, UserRepositoryError>;
    async fn get_user_by_email(&self, email: &str) -> Result<User, UserRepositoryError>;
    async fn email_exists(&self, email: &str) -> Result<bool, UserRepositoryError>;
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    async fn create_user(&self, user: &User) -> Result<(), UserRepositoryError> {
        let item = to_item(user).map_err(|e| UserRepositoryError::Serialization(e.to_string()))?;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(UserRepositoryError::AlreadyExists);
                    }
                }
                Err(UserRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, UserRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|e| UserRepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = output.item {
            let user: User =
                from_item(item).map_err(|e| UserRepositoryError::Serialization(e.to_string()))?;
            Ok(user)
        } else {
            Err(UserRepositoryError::NotFound)
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, UserRepositoryError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(EMAIL_INDEX)
            .key_condition_expression("email = :email")
            .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| UserRepositoryError::DynamoDb(e.to_string()))?;

        match output.items.unwrap_or_default().into_iter().next() {
            Some(item) => {
                from_item(item).map_err(|e| UserRepositoryError::Serialization(e.to_string()))
            }
            None => Err(UserRepositoryError::NotFound),
        }
    }

    async fn email_exists(&self, email: &str) -> Result<bool, UserRepositoryError> {
        match self.get_user_by_email(email).await {
            Ok(_) => Ok(true),
            Err(UserRepositoryError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
