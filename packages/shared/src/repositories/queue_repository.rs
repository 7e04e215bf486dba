use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::{AttributeValue, Select, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};

use crate::models::queue::QueueEntry;
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Sparse index over waiting entries, ordered by `wait_key`.
pub const WAITING_INDEX: &str = "GSI_WaitingByJoinTime";
const WAITING_STATE: &str = "waiting";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Inserts a waiting entry. Fails with `AlreadyExists` if the user has any entry.
    async fn enqueue(&self, user_id: &str) -> Result<QueueEntry, QueueRepositoryError>;

    /// Oldest waiting entry whose user is not in `excluding_user_ids`.
    async fn find_oldest_waiting(
        &self,
        excluding_user_ids: &[String],
    ) -> Result<Option<QueueEntry>, QueueRepositoryError>;

    /// Marks both users matched in one atomic step. The waiting user's entry
    /// must exist and be unmatched; the joining user's entry must be absent
    /// (it is created) or unmatched. Otherwise nothing changes and `Conflict`
    /// is returned.
    async fn mark_matched(
        &self,
        match_id: &str,
        waiting_user_id: &str,
        joining_user_id: &str,
    ) -> Result<(), QueueRepositoryError>;

    /// Removes the user's unmatched entry; `NotFound` if there is none.
    async fn dequeue(&self, user_id: &str) -> Result<(), QueueRepositoryError>;

    /// Removes the user's matched entry; `NotFound` if there is none.
    async fn remove_matched(&self, user_id: &str) -> Result<(), QueueRepositoryError>;

    async fn get_entry(&self, user_id: &str) -> Result<Option<QueueEntry>, QueueRepositoryError>;

    /// 1-based position of the user's waiting entry and the number of waiting
    /// users, or `None` when the user is not waiting.
    async fn waiting_position(
        &self,
        user_id: &str,
    ) -> Result<Option<(usize, usize)>, QueueRepositoryError>;
}

/// Item layout in the queue table. Waiting entries carry `queue_state` and
/// `wait_key` so they appear in the waiting index; matched entries drop both.
#[derive(Debug, Deserialize, Serialize)]
struct QueueItem {
    user_id: String,
    joined_at: DateTime<Utc>,
    is_matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    queue_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_key: Option<String>,
}

impl From<&QueueEntry> for QueueItem {
    fn from(entry: &QueueEntry) -> Self {
        let waiting = entry.is_waiting();
        QueueItem {
            user_id: entry.user_id.clone(),
            joined_at: entry.joined_at,
            is_matched: entry.is_matched,
            match_id: entry.match_id.clone(),
            queue_state: waiting.then(|| WAITING_STATE.to_string()),
            wait_key: waiting.then(|| wait_key(&entry.joined_at, &entry.user_id)),
        }
    }
}

impl From<QueueItem> for QueueEntry {
    fn from(item: QueueItem) -> Self {
        QueueEntry {
            user_id: item.user_id,
            joined_at: item.joined_at,
            is_matched: item.is_matched,
            match_id: item.match_id,
        }
    }
}

/// Sort key for the waiting index: join time, then user id for equal times.
pub fn wait_key(joined_at: &DateTime<Utc>, user_id: &str) -> String {
    format!("{:020}#{}", joined_at.timestamp_millis(), user_id)
}

pub struct DynamoDbQueueRepository {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbQueueRepository {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn count_waiting(&self, before: Option<&str>) -> Result<usize, QueueRepositoryError> {
        let mut count = 0usize;
        let mut start_key = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(WAITING_INDEX)
                .select(Select::Count)
                .expression_attribute_values(
                    ":waiting",
                    AttributeValue::S(WAITING_STATE.to_string()),
                )
                .set_exclusive_start_key(start_key.take());

            request = match before {
                Some(key) => request
                    .key_condition_expression("queue_state = :waiting AND wait_key < :wait_key")
                    .expression_attribute_values(":wait_key", AttributeValue::S(key.to_string())),
                None => request.key_condition_expression("queue_state = :waiting"),
            };

            let output = request
                .send()
                .await
                .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

            count += usize::try_from(output.count()).unwrap_or(0);

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(count)
    }
}

#[async_trait]
impl QueueRepository for DynamoDbQueueRepository {
    async fn enqueue(&self, user_id: &str) -> Result<QueueEntry, QueueRepositoryError> {
        let entry = QueueEntry::new(user_id);
        let item = to_item(QueueItem::from(&entry))
            .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(user_id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(entry),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(QueueRepositoryError::AlreadyExists);
                    }
                }
                Err(QueueRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn find_oldest_waiting(
        &self,
        excluding_user_ids: &[String],
    ) -> Result<Option<QueueEntry>, QueueRepositoryError> {
        // One item more than the exclusions guarantees a candidate when one exists.
        let page_size = i32::try_from(excluding_user_ids.len() + 1).unwrap_or(i32::MAX);
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(WAITING_INDEX)
            .key_condition_expression("queue_state = :waiting")
            .expression_attribute_values(":waiting", AttributeValue::S(WAITING_STATE.to_string()))
            .scan_index_forward(true)
            .limit(page_size)
            .send()
            .await
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        for item in output.items.unwrap_or_default() {
            let queued: QueueItem = from_item(item)
                .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;

            if !queued.is_matched && !excluding_user_ids.contains(&queued.user_id) {
                return Ok(Some(queued.into()));
            }
        }

        Ok(None)
    }

    async fn mark_matched(
        &self,
        match_id: &str,
        waiting_user_id: &str,
        joining_user_id: &str,
    ) -> Result<(), QueueRepositoryError> {
        if waiting_user_id == joining_user_id {
            return Err(QueueRepositoryError::Conflict);
        }

        let waiting_update = Update::builder()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(waiting_user_id.to_string()))
            .update_expression(
                "SET is_matched = :matched, match_id = :match_id REMOVE queue_state, wait_key",
            )
            .condition_expression("is_matched = :unmatched")
            .expression_attribute_values(":matched", AttributeValue::Bool(true))
            .expression_attribute_values(":unmatched", AttributeValue::Bool(false))
            .expression_attribute_values(":match_id", AttributeValue::S(match_id.to_string()))
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        // The joiner usually has no entry yet; the update creates it.
        let joining_update = Update::builder()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(joining_user_id.to_string()))
            .update_expression(
                "SET is_matched = :matched, match_id = :match_id, \
                 joined_at = if_not_exists(joined_at, :now) REMOVE queue_state, wait_key",
            )
            .condition_expression("attribute_not_exists(user_id) OR is_matched = :unmatched")
            .expression_attribute_values(":matched", AttributeValue::Bool(true))
            .expression_attribute_values(":unmatched", AttributeValue::Bool(false))
            .expression_attribute_values(":match_id", AttributeValue::S(match_id.to_string()))
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .build()
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().update(waiting_update).build())
            .transact_items(TransactWriteItem::builder().update(joining_update).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_transaction_canceled_exception() {
                        return Err(QueueRepositoryError::Conflict);
                    }
                }
                Err(QueueRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn dequeue(&self, user_id: &str) -> Result<(), QueueRepositoryError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .condition_expression("is_matched = :unmatched")
            .expression_attribute_values(":unmatched", AttributeValue::Bool(false))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(QueueRepositoryError::NotFound);
                    }
                }
                Err(QueueRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn remove_matched(&self, user_id: &str) -> Result<(), QueueRepositoryError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .condition_expression("is_matched = :matched")
            .expression_attribute_values(":matched", AttributeValue::Bool(true))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(QueueRepositoryError::NotFound);
                    }
                }
                Err(QueueRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get_entry(&self, user_id: &str) -> Result<Option<QueueEntry>, QueueRepositoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| QueueRepositoryError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => {
                let queued: QueueItem = from_item(item)
                    .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
                Ok(Some(queued.into()))
            }
            None => Ok(None),
        }
    }

    async fn waiting_position(
        &self,
        user_id: &str,
    ) -> Result<Option<(usize, usize)>, QueueRepositoryError> {
        // The entry is read consistently; only the counts come from the index,
        // which may lag behind the table.
        let entry = match self.get_entry(user_id).await? {
            Some(entry) if entry.is_waiting() => entry,
            _ => return Ok(None),
        };

        let own_key = wait_key(&entry.joined_at, &entry.user_id);
        let ahead = self.count_waiting(Some(&own_key)).await?;
        let total = self.count_waiting(None).await?;
        let position = ahead + 1;

        Ok(Some((position, total.max(position))))
    }
}
