//! Process-local repositories used by `STORAGE_BACKEND=memory` and by tests.
//!
//! Each repository keeps its state behind a single async mutex, so every
//! operation (including the two-entry `mark_matched`) is atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::matchmaking::Match;
use crate::models::queue::QueueEntry;
use crate::models::user::User;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
use crate::repositories::errors::user_repository_errors::UserRepositoryError;
use crate::repositories::match_repository::MatchRepository;
use crate::repositories::queue_repository::QueueRepository;
use crate::repositories::user_repository::UserRepository;

/// Join time plus insertion sequence; the sequence breaks ties between equal timestamps.
type WaitKey = (DateTime<Utc>, u64);

struct StoredEntry {
    entry: QueueEntry,
    seq: u64,
}

impl StoredEntry {
    fn wait_key(&self) -> WaitKey {
        (self.entry.joined_at, self.seq)
    }
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<String, StoredEntry>,
    waiting: BTreeMap<WaitKey, String>,
    next_seq: u64,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[derive(Default)]
pub struct InMemoryQueueRepository {
    state: Mutex<QueueState>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, waiting and matched.
    pub async fn entries(&self) -> Vec<QueueEntry> {
        let state = self.state.lock().await;
        state
            .entries
            .values()
            .map(|stored| stored.entry.clone())
            .collect()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn enqueue(&self, user_id: &str) -> Result<QueueEntry, QueueRepositoryError> {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(user_id) {
            return Err(QueueRepositoryError::AlreadyExists);
        }

        let stored = StoredEntry {
            entry: QueueEntry::new(user_id),
            seq: state.next_seq(),
        };
        let entry = stored.entry.clone();
        state.waiting.insert(stored.wait_key(), user_id.to_string());
        state.entries.insert(user_id.to_string(), stored);

        Ok(entry)
    }

    async fn find_oldest_waiting(
        &self,
        excluding_user_ids: &[String],
    ) -> Result<Option<QueueEntry>, QueueRepositoryError> {
        let state = self.state.lock().await;
        let oldest = state
            .waiting
            .values()
            .find(|user_id| !excluding_user_ids.contains(user_id))
            .and_then(|user_id| state.entries.get(user_id))
            .map(|stored| stored.entry.clone());

        Ok(oldest)
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

        let mut state = self.state.lock().await;

        let waiting_ok = state
            .entries
            .get(waiting_user_id)
            .is_some_and(|stored| stored.entry.is_waiting());
        let joining_ok = state
            .entries
            .get(joining_user_id)
            .map_or(true, |stored| stored.entry.is_waiting());
        if !waiting_ok || !joining_ok {
            return Err(QueueRepositoryError::Conflict);
        }

        for user_id in [waiting_user_id, joining_user_id] {
            if let Some(stored) = state.entries.get(user_id) {
                let key = stored.wait_key();
                state.waiting.remove(&key);
            }
        }

        if !state.entries.contains_key(joining_user_id) {
            let seq = state.next_seq();
            state.entries.insert(
                joining_user_id.to_string(),
                StoredEntry {
                    entry: QueueEntry::new(joining_user_id),
                    seq,
                },
            );
        }

        for user_id in [waiting_user_id, joining_user_id] {
            if let Some(stored) = state.entries.get_mut(user_id) {
                stored.entry.mark_matched(match_id);
            }
        }

        Ok(())
    }

    async fn dequeue(&self, user_id: &str) -> Result<(), QueueRepositoryError> {
        let mut state = self.state.lock().await;
        let key = match state.entries.get(user_id) {
            Some(stored) if stored.entry.is_waiting() => stored.wait_key(),
            _ => return Err(QueueRepositoryError::NotFound),
        };

        state.waiting.remove(&key);
        state.entries.remove(user_id);
        Ok(())
    }

    async fn remove_matched(&self, user_id: &str) -> Result<(), QueueRepositoryError> {
        let mut state = self.state.lock().await;
        let matched = state
            .entries
            .get(user_id)
            .is_some_and(|stored| stored.entry.is_matched);
        if !matched {
            return Err(QueueRepositoryError::NotFound);
        }

        state.entries.remove(user_id);
        Ok(())
    }

    async fn get_entry(&self, user_id: &str) -> Result<Option<QueueEntry>, QueueRepositoryError> {
        let state = self.state.lock().await;
        Ok(state.entries.get(user_id).map(|stored| stored.entry.clone()))
    }

    async fn waiting_position(
        &self,
        user_id: &str,
    ) -> Result<Option<(usize, usize)>, QueueRepositoryError> {
        let state = self.state.lock().await;
        let key = match state.entries.get(user_id) {
            Some(stored) if stored.entry.is_waiting() => stored.wait_key(),
            _ => return Ok(None),
        };

        let ahead = state.waiting.range(..key).count();
        Ok(Some((ahead + 1, state.waiting.len())))
    }
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: Mutex<HashMap<String, Match>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.matches.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn create_match(
        &self,
        waiting_user_id: &str,
        joining_user_id: &str,
    ) -> Result<Match, MatchRepositoryError> {
        let created = Match::new(waiting_user_id, joining_user_id);
        let mut matches = self.matches.lock().await;
        if matches.contains_key(&created.match_id) {
            return Err(MatchRepositoryError::AlreadyExists);
        }
        matches.insert(created.match_id.clone(), created.clone());
        Ok(created)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, MatchRepositoryError> {
        Ok(self.matches.lock().await.get(match_id).cloned())
    }

    async fn delete_match(&self, match_id: &str) -> Result<(), MatchRepositoryError> {
        self.matches.lock().await.remove(match_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, user: &User) -> Result<(), UserRepositoryError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.id) {
            return Err(UserRepositoryError::AlreadyExists);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<User, UserRepositoryError> {
        self.users
            .lock()
            .await
            .get(user_id)
            .cloned()
            .ok_or(UserRepositoryError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, UserRepositoryError> {
        self.users
            .lock()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(UserRepositoryError::NotFound)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, UserRepositoryError> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .any(|user| user.email == email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate_user() {
        let repository = InMemoryQueueRepository::new();
        repository.enqueue("alice").await.unwrap();

        let result = repository.enqueue("alice").await;

        assert_eq!(result.unwrap_err(), QueueRepositoryError::AlreadyExists);
        assert_eq!(repository.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_find_oldest_waiting_excludes_user_and_keeps_insertion_order() {
        let repository = InMemoryQueueRepository::new();
        for user in ["alice", "bob", "carol"] {
            repository.enqueue(user).await.unwrap();
        }

        let oldest = repository
            .find_oldest_waiting(&["dave".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.user_id, "alice");

        let oldest = repository
            .find_oldest_waiting(&["alice".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.user_id, "bob");

        let oldest = repository
            .find_oldest_waiting(&["dave".to_string(), "alice".to_string(), "bob".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.user_id, "carol");
    }

    #[tokio::test]
    async fn test_find_oldest_waiting_on_empty_queue() {
        let repository = InMemoryQueueRepository::new();
        repository.enqueue("alice").await.unwrap();

        assert!(repository
            .find_oldest_waiting(&["alice".to_string()])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_matched_updates_both_entries() {
        let repository = InMemoryQueueRepository::new();
        repository.enqueue("alice").await.unwrap();

        repository.mark_matched("m-1", "alice", "bob").await.unwrap();

        let alice = repository.get_entry("alice").await.unwrap().unwrap();
        let bob = repository.get_entry("bob").await.unwrap().unwrap();
        assert!(alice.is_matched && bob.is_matched);
        assert_eq!(alice.match_id.as_deref(), Some("m-1"));
        assert_eq!(bob.match_id.as_deref(), Some("m-1"));
        assert!(repository
            .find_oldest_waiting(&["carol".to_string()])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_matched_conflicts_leave_state_untouched() {
        let repository = InMemoryQueueRepository::new();
        repository.enqueue("alice").await.unwrap();
        repository.mark_matched("m-1", "alice", "bob").await.unwrap();
        repository.enqueue("carol").await.unwrap();

        // alice is already matched
        let result = repository.mark_matched("m-2", "alice", "dave").await;
        assert_eq!(result.unwrap_err(), QueueRepositoryError::Conflict);
        assert!(repository.get_entry("dave").await.unwrap().is_none());

        // bob (joiner) is already matched
        let result = repository.mark_matched("m-3", "carol", "bob").await;
        assert_eq!(result.unwrap_err(), QueueRepositoryError::Conflict);
        assert!(repository.get_entry("carol").await.unwrap().unwrap().is_waiting());

        // self-match
        let result = repository.mark_matched("m-4", "carol", "carol").await;
        assert_eq!(result.unwrap_err(), QueueRepositoryError::Conflict);

        // waiting user missing
        let result = repository.mark_matched("m-5", "nobody", "erin").await;
        assert_eq!(result.unwrap_err(), QueueRepositoryError::Conflict);
    }

    #[tokio::test]
    async fn test_dequeue_and_remove_matched() {
        let repository = InMemoryQueueRepository::new();
        repository.enqueue("alice").await.unwrap();
        repository.enqueue("bob").await.unwrap();

        repository.dequeue("alice").await.unwrap();
        assert!(repository.get_entry("alice").await.unwrap().is_none());
        assert_eq!(
            repository.dequeue("alice").await.unwrap_err(),
            QueueRepositoryError::NotFound
        );

        repository.mark_matched("m-1", "bob", "carol").await.unwrap();
        assert_eq!(
            repository.dequeue("bob").await.unwrap_err(),
            QueueRepositoryError::NotFound
        );
        repository.remove_matched("bob").await.unwrap();
        assert!(repository.get_entry("bob").await.unwrap().is_none());
        assert_eq!(
            repository.remove_matched("bob").await.unwrap_err(),
            QueueRepositoryError::NotFound
        );
    }

    #[tokio::test]
    async fn test_waiting_position() {
        let repository = InMemoryQueueRepository::new();
        for user in ["alice", "bob", "carol"] {
            repository.enqueue(user).await.unwrap();
        }

        assert_eq!(repository.waiting_position("alice").await.unwrap(), Some((1, 3)));
        assert_eq!(repository.waiting_position("carol").await.unwrap(), Some((3, 3)));
        assert_eq!(repository.waiting_position("dave").await.unwrap(), None);

        repository.dequeue("alice").await.unwrap();
        assert_eq!(repository.waiting_position("carol").await.unwrap(), Some((2, 2)));
    }

    #[tokio::test]
    async fn test_match_repository_create_get_delete() {
        let repository = InMemoryMatchRepository::new();
        let created = repository.create_match("alice", "bob").await.unwrap();

        let found = repository.get_match(&created.match_id).await.unwrap();
        assert_eq!(found, Some(created.clone()));

        repository.delete_match(&created.match_id).await.unwrap();
        assert!(repository.get_match(&created.match_id).await.unwrap().is_none());
        assert!(repository.matches().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_repository_lookup_by_email() {
        let repository = InMemoryUserRepository::new();
        let user = User::new(
            "alice@example.com".to_string(),
            "hash".to_string(),
            "Alice".to_string(),
            "Smith".to_string(),
        );
        repository.create_user(&user).await.unwrap();

        assert!(repository.email_exists("alice@example.com").await.unwrap());
        assert_eq!(
            repository.get_user_by_email("alice@example.com").await.unwrap().id,
            user.id
        );
        assert_eq!(
            repository.get_user_by_id("missing").await.unwrap_err(),
            UserRepositoryError::NotFound
        );
    }
}
