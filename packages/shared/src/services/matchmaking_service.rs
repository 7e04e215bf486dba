use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::matchmaking::MatchmakingStatus;
use crate::models::queue::QueueEntry;
use crate::repositories::errors::queue_repository_errors::QueueRepositoryError;
use crate::repositories::match_repository::MatchRepository;
use crate::repositories::queue_repository::QueueRepository;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;

/// Candidates tried by one join before it falls back to waiting.
pub const MATCH_ATTEMPTS: usize = 5;
pub const MAX_USER_ID_LEN: usize = 128;

pub struct MatchmakingService {
    queue_repository: Arc<dyn QueueRepository>,
    match_repository: Arc<dyn MatchRepository>,
    store_timeout: Duration,
}

impl MatchmakingService {
    pub fn new(
        queue_repository: Arc<dyn QueueRepository>,
        match_repository: Arc<dyn MatchRepository>,
        store_timeout: Duration,
    ) -> Self {
        MatchmakingService {
            queue_repository,
            match_repository,
            store_timeout,
        }
    }

    /// Pairs the user with the oldest waiting user, or queues them.
    ///
    /// Joining again while waiting or matched returns the current status
    /// without touching the queue.
    pub async fn join(&self, user_id: &str) -> Result<MatchmakingStatus, MatchmakingServiceError> {
        validate_user_id(user_id)?;

        let existing = self
            .within("get_entry", self.queue_repository.get_entry(user_id))
            .await??;
        if let Some(entry) = existing {
            debug!(user_id, "join ignored, user already in queue");
            return self.status_of(&entry).await;
        }

        if let Some(status) = self.try_pair(user_id).await? {
            return Ok(status);
        }

        match self
            .within("enqueue", self.queue_repository.enqueue(user_id))
            .await?
        {
            Ok(entry) => {
                info!(user_id, joined_at = %entry.joined_at, "user queued");
                self.waiting_status(user_id).await
            }
            Err(QueueRepositoryError::AlreadyExists) => {
                debug!(user_id, "concurrent join already queued user");
                self.status(user_id).await
            }
            Err(e) => {
                error!(user_id, error = %e, "failed to queue user");
                Err(e.into())
            }
        }
    }

    /// Takes the user out of matchmaking. A matched user's queue entry is
    /// removed too; the match itself is kept.
    pub async fn leave(&self, user_id: &str) -> Result<(), MatchmakingServiceError> {
        validate_user_id(user_id)?;

        let entry = match self
            .within("get_entry", self.queue_repository.get_entry(user_id))
            .await??
        {
            Some(entry) => entry,
            None => {
                debug!(user_id, "leave ignored, user not in queue");
                return Ok(());
            }
        };

        match self.remove_entry(&entry).await? {
            Ok(()) => {}
            // Paired between the read and the delete.
            Err(QueueRepositoryError::NotFound) => {
                let current = self
                    .within("get_entry", self.queue_repository.get_entry(user_id))
                    .await??;
                if let Some(current) = current {
                    match self.remove_entry(&current).await? {
                        Ok(()) | Err(QueueRepositoryError::NotFound) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            Err(e) => {
                error!(user_id, error = %e, "failed to remove queue entry");
                return Err(e.into());
            }
        }

        info!(user_id, was_matched = entry.is_matched, "user left matchmaking");
        Ok(())
    }

    pub async fn status(&self, user_id: &str) -> Result<MatchmakingStatus, MatchmakingServiceError> {
        validate_user_id(user_id)?;

        match self
            .within("get_entry", self.queue_repository.get_entry(user_id))
            .await??
        {
            Some(entry) => self.status_of(&entry).await,
            None => Ok(MatchmakingStatus::NotInQueue),
        }
    }

    /// Claims the oldest waiting candidate for `user_id`. Returns `None` when
    /// nobody could be claimed and the user should wait instead.
    async fn try_pair(
        &self,
        user_id: &str,
    ) -> Result<Option<MatchmakingStatus>, MatchmakingServiceError> {
        // The joiner plus every candidate already lost to another join.
        let mut excluded = vec![user_id.to_string()];

        for attempt in 1..=MATCH_ATTEMPTS {
            let candidate = match self
                .within(
                    "find_oldest_waiting",
                    self.queue_repository.find_oldest_waiting(&excluded),
                )
                .await??
            {
                Some(candidate) => candidate,
                None => return Ok(None),
            };

            let created = self
                .within(
                    "create_match",
                    self.match_repository
                        .create_match(&candidate.user_id, user_id),
                )
                .await??;

            match self
                .within(
                    "mark_matched",
                    self.queue_repository
                        .mark_matched(&created.match_id, &candidate.user_id, user_id),
                )
                .await?
            {
                Ok(()) => {
                    info!(
                        match_id = %created.match_id,
                        waiting_user = %candidate.user_id,
                        joining_user = user_id,
                        "users matched"
                    );
                    return Ok(Some(MatchmakingStatus::Matched {
                        peer_id: candidate.user_id,
                        details: created,
                    }));
                }
                Err(QueueRepositoryError::Conflict) => {
                    warn!(
                        attempt,
                        candidate = %candidate.user_id,
                        joining_user = user_id,
                        "candidate claimed concurrently"
                    );
                    self.within(
                        "delete_match",
                        self.match_repository.delete_match(&created.match_id),
                    )
                    .await??;

                    let own = self
                        .within("get_entry", self.queue_repository.get_entry(user_id))
                        .await??;
                    if let Some(entry) = own {
                        return Ok(Some(self.status_of(&entry).await?));
                    }
                    excluded.push(candidate.user_id);
                }
                Err(e) => {
                    error!(
                        match_id = %created.match_id,
                        error = %e,
                        "failed to mark users matched"
                    );
                    return Err(e.into());
                }
            }
        }

        warn!(user_id, "no candidate could be claimed, queueing");
        Ok(None)
    }

    async fn status_of(
        &self,
        entry: &QueueEntry,
    ) -> Result<MatchmakingStatus, MatchmakingServiceError> {
        if entry.is_matched {
            self.matched_status(entry).await
        } else {
            self.waiting_status(&entry.user_id).await
        }
    }

    async fn waiting_status(
        &self,
        user_id: &str,
    ) -> Result<MatchmakingStatus, MatchmakingServiceError> {
        let position = self
            .within(
                "waiting_position",
                self.queue_repository.waiting_position(user_id),
            )
            .await??;
        if let Some((position, total)) = position {
            return Ok(MatchmakingStatus::Waiting { position, total });
        }

        // No longer waiting: either paired or gone since the last read.
        match self
            .within("get_entry", self.queue_repository.get_entry(user_id))
            .await??
        {
            Some(entry) if entry.is_matched => self.matched_status(&entry).await,
            _ => Ok(MatchmakingStatus::NotInQueue),
        }
    }

    async fn matched_status(
        &self,
        entry: &QueueEntry,
    ) -> Result<MatchmakingStatus, MatchmakingServiceError> {
        let match_id = entry.match_id.as_deref().ok_or_else(|| {
            MatchmakingServiceError::PersistenceError(format!(
                "matched entry for {} has no match id",
                entry.user_id
            ))
        })?;

        let details = self
            .within("get_match", self.match_repository.get_match(match_id))
            .await??
            .ok_or_else(|| {
                error!(match_id, user_id = %entry.user_id, "queue entry references missing match");
                MatchmakingServiceError::PersistenceError(format!("match {} not found", match_id))
            })?;

        let peer_id = details
            .peer_of(&entry.user_id)
            .ok_or_else(|| {
                MatchmakingServiceError::PersistenceError(format!(
                    "match {} does not involve {}",
                    match_id, entry.user_id
                ))
            })?
            .to_string();

        Ok(MatchmakingStatus::Matched { details, peer_id })
    }

    async fn remove_entry(
        &self,
        entry: &QueueEntry,
    ) -> Result<Result<(), QueueRepositoryError>, MatchmakingServiceError> {
        if entry.is_matched {
            self.within(
                "remove_matched",
                self.queue_repository.remove_matched(&entry.user_id),
            )
            .await
        } else {
            self.within("dequeue", self.queue_repository.dequeue(&entry.user_id))
                .await
        }
    }

    /// Bounds a store call by the configured timeout. The outer error is the
    /// timeout; the inner result is the store's own.
    async fn within<T, E, F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<Result<T, E>, MatchmakingServiceError>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| {
                error!(operation, timeout_ms = self.store_timeout.as_millis() as u64, "store call timed out");
                MatchmakingServiceError::ServiceUnavailable(format!("{} timed out", operation))
            })
    }
}

fn validate_user_id(user_id: &str) -> Result<(), MatchmakingServiceError> {
    if user_id.trim().is_empty() {
        return Err(MatchmakingServiceError::ValidationError(
            "User ID cannot be empty".to_string(),
        ));
    }
    if user_id.chars().count() > MAX_USER_ID_LEN {
        return Err(MatchmakingServiceError::ValidationError(format!(
            "User ID cannot be longer than {} characters",
            MAX_USER_ID_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matchmaking::Match;
    use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
    use crate::repositories::in_memory::{InMemoryMatchRepository, InMemoryQueueRepository};
    use crate::repositories::match_repository::MockMatchRepository;
    use crate::repositories::queue_repository::MockQueueRepository;
    use async_trait::async_trait;
    use rstest::rstest;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        queue: Arc<InMemoryQueueRepository>,
        matches: Arc<InMemoryMatchRepository>,
        service: Arc<MatchmakingService>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(InMemoryQueueRepository::new());
        let matches = Arc::new(InMemoryMatchRepository::new());
        let service = Arc::new(MatchmakingService::new(
            queue.clone(),
            matches.clone(),
            Duration::from_secs(5),
        ));
        Fixture {
            queue,
            matches,
            service,
        }
    }

    #[tokio::test]
    async fn test_join_empty_queue_waits() {
        let f = fixture();

        let status = f.service.join("alice").await.unwrap();

        assert_eq!(
            status,
            MatchmakingStatus::Waiting {
                position: 1,
                total: 1
            }
        );
        let entries = f.queue.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_waiting());
    }

    #[tokio::test]
    async fn test_second_join_pairs_both_users() {
        let f = fixture();
        f.service.join("alice").await.unwrap();

        let joined = f.service.join("bob").await.unwrap();
        let (details, peer_id) = match joined {
            MatchmakingStatus::Matched { details, peer_id } => (details, peer_id),
            other => panic!("expected matched, got {:?}", other),
        };
        assert_eq!(peer_id, "alice");
        assert_eq!(details.user1_id, "alice");
        assert_eq!(details.user2_id, "bob");

        // alice learns about the match on her next status read
        match f.service.status("alice").await.unwrap() {
            MatchmakingStatus::Matched {
                details: seen,
                peer_id,
            } => {
                assert_eq!(peer_id, "bob");
                assert_eq!(seen.match_id, details.match_id);
            }
            other => panic!("expected matched, got {:?}", other),
        }

        let stored = f.matches.matches().await;
        assert_eq!(stored.len(), 1);
        for entry in f.queue.entries().await {
            assert!(entry.is_matched);
            assert_eq!(entry.match_id.as_deref(), Some(details.match_id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_join_twice_is_idempotent() {
        let f = fixture();
        f.service.join("alice").await.unwrap();

        let again = f.service.join("alice").await.unwrap();

        assert_eq!(
            again,
            MatchmakingStatus::Waiting {
                position: 1,
                total: 1
            }
        );
        assert_eq!(f.queue.entries().await.len(), 1);
        assert!(f.matches.matches().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_while_matched_returns_match() {
        let f = fixture();
        f.service.join("alice").await.unwrap();
        f.service.join("bob").await.unwrap();

        let status = f.service.join("alice").await.unwrap();

        assert!(status.is_matched());
        assert_eq!(f.matches.matches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pairs_oldest_waiting_first() {
        let f = fixture();
        f.service.join("alice").await.unwrap();
        f.service.join("bob").await.unwrap();
        f.service.join("carol").await.unwrap();
        f.service.join("dave").await.unwrap();

        match f.service.status("carol").await.unwrap() {
            MatchmakingStatus::Matched { peer_id, .. } => assert_eq!(peer_id, "dave"),
            other => panic!("expected matched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_waiting_positions() {
        let queue = Arc::new(InMemoryQueueRepository::new());
        for user in ["alice", "bob", "carol"] {
            queue.enqueue(user).await.unwrap();
        }
        let service = MatchmakingService::new(
            queue,
            Arc::new(InMemoryMatchRepository::new()),
            Duration::from_secs(5),
        );

        assert_eq!(
            service.status("bob").await.unwrap(),
            MatchmakingStatus::Waiting {
                position: 2,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn test_leave_while_waiting() {
        let f = fixture();
        f.service.join("alice").await.unwrap();

        f.service.leave("alice").await.unwrap();

        assert_eq!(
            f.service.status("alice").await.unwrap(),
            MatchmakingStatus::NotInQueue
        );
        assert!(f.queue.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_when_not_queued_is_noop() {
        let f = fixture();

        f.service.leave("ghost").await.unwrap();

        assert_eq!(
            f.service.status("ghost").await.unwrap(),
            MatchmakingStatus::NotInQueue
        );
    }

    #[tokio::test]
    async fn test_leave_while_matched_keeps_match_and_allows_requeue() {
        let f = fixture();
        f.service.join("alice").await.unwrap();
        f.service.join("bob").await.unwrap();

        f.service.leave("alice").await.unwrap();

        assert_eq!(
            f.service.status("alice").await.unwrap(),
            MatchmakingStatus::NotInQueue
        );
        assert!(f.service.status("bob").await.unwrap().is_matched());
        assert_eq!(f.matches.matches().await.len(), 1);

        let requeued = f.service.join("alice").await.unwrap();
        assert!(requeued.is_waiting());
    }

    #[rstest]
    #[case(String::new())]
    #[case("   ".to_string())]
    #[case("x".repeat(MAX_USER_ID_LEN + 1))]
    #[tokio::test]
    async fn test_invalid_user_ids_are_rejected(#[case] user_id: String) {
        let f = fixture();

        let join = f.service.join(&user_id).await;
        let status = f.service.status(&user_id).await;
        let leave = f.service.leave(&user_id).await;

        assert!(matches!(join, Err(MatchmakingServiceError::ValidationError(_))));
        assert!(matches!(status, Err(MatchmakingServiceError::ValidationError(_))));
        assert!(matches!(leave, Err(MatchmakingServiceError::ValidationError(_))));
        assert!(f.queue.entries().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_never_double_match() {
        let f = fixture();
        f.service.join("veteran").await.unwrap();

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let service = f.service.clone();
                tokio::spawn(async move { service.join(&format!("player-{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let matches = f.matches.matches().await;
        let entries = f.queue.entries().await;

        assert_eq!(
            matches.iter().filter(|m| m.involves("veteran")).count(),
            1,
            "waiting user must be matched exactly once"
        );

        let mut paired = HashSet::new();
        for pairing in &matches {
            assert!(paired.insert(pairing.user1_id.clone()), "double match");
            assert!(paired.insert(pairing.user2_id.clone()), "double match");
            for user_id in [&pairing.user1_id, &pairing.user2_id] {
                let entry = entries
                    .iter()
                    .find(|e| &e.user_id == user_id)
                    .unwrap_or_else(|| panic!("no entry for {}", user_id));
                assert_eq!(entry.match_id.as_deref(), Some(pairing.match_id.as_str()));
            }
        }

        for entry in &entries {
            assert_eq!(entry.is_matched, paired.contains(&entry.user_id));
        }
        assert_eq!(entries.len(), 25);
    }

    #[tokio::test]
    async fn test_conflict_skips_claimed_candidate_and_discards_match() {
        let mut queue = MockQueueRepository::new();
        let mut matches = MockMatchRepository::new();

        queue.expect_get_entry().returning(|_| Ok(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue
            .expect_find_oldest_waiting()
            .returning(move |excluded: &[String]| {
                counter.fetch_add(1, Ordering::SeqCst);
                let oldest = ["alice", "bob"]
                    .into_iter()
                    .find(|user| !excluded.iter().any(|e| e.as_str() == *user));
                Ok(oldest.map(QueueEntry::new))
            });
        queue
            .expect_mark_matched()
            .withf(|_, waiting, _| waiting == "alice")
            .times(1)
            .returning(|_, _, _| Err(QueueRepositoryError::Conflict));
        queue
            .expect_mark_matched()
            .withf(|_, waiting, _| waiting == "bob")
            .times(1)
            .returning(|_, _, _| Ok(()));
        matches
            .expect_create_match()
            .times(2)
            .returning(|waiting, joining| Ok(Match::new(waiting, joining)));
        matches
            .expect_delete_match()
            .times(1)
            .returning(|_| Ok(()));

        let service =
            MatchmakingService::new(Arc::new(queue), Arc::new(matches), Duration::from_secs(5));
        let status = service.join("carol").await.unwrap();

        match status {
            MatchmakingStatus::Matched { peer_id, details } => {
                assert_eq!(peer_id, "bob");
                assert_eq!(details.user2_id, "carol");
            }
            other => panic!("expected matched, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_head_entries_do_not_hide_real_waiter() {
        let mut queue = MockQueueRepository::new();
        let mut matches = MockMatchRepository::new();

        // the index still lists three users that were already paired
        queue.expect_get_entry().returning(|_| Ok(None));
        queue
            .expect_find_oldest_waiting()
            .returning(|excluded: &[String]| {
                let oldest = ["stale-1", "stale-2", "stale-3", "alice"]
                    .into_iter()
                    .find(|user| !excluded.iter().any(|e| e.as_str() == *user));
                Ok(oldest.map(QueueEntry::new))
            });
        queue
            .expect_mark_matched()
            .withf(|_, waiting, _| waiting.starts_with("stale"))
            .times(3)
            .returning(|_, _, _| Err(QueueRepositoryError::Conflict));
        queue
            .expect_mark_matched()
            .withf(|_, waiting, _| waiting == "alice")
            .times(1)
            .returning(|_, _, _| Ok(()));
        queue.expect_enqueue().never();
        matches
            .expect_create_match()
            .returning(|waiting, joining| Ok(Match::new(waiting, joining)));
        matches.expect_delete_match().times(3).returning(|_| Ok(()));

        let service =
            MatchmakingService::new(Arc::new(queue), Arc::new(matches), Duration::from_secs(5));

        match service.join("bob").await.unwrap() {
            MatchmakingStatus::Matched { peer_id, .. } => assert_eq!(peer_id, "alice"),
            other => panic!("expected matched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_service_unavailable() {
        let mut queue = MockQueueRepository::new();
        queue
            .expect_get_entry()
            .returning(|_| Err(QueueRepositoryError::DynamoDb("connection reset".to_string())));

        let service = MatchmakingService::new(
            Arc::new(queue),
            Arc::new(MockMatchRepository::new()),
            Duration::from_secs(5),
        );

        assert!(matches!(
            service.join("alice").await,
            Err(MatchmakingServiceError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            service.status("alice").await,
            Err(MatchmakingServiceError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_mark_keeps_match_and_reports_unavailable() {
        let mut queue = MockQueueRepository::new();
        let mut matches = MockMatchRepository::new();
        queue.expect_get_entry().returning(|_| Ok(None));
        queue
            .expect_find_oldest_waiting()
            .returning(|_| Ok(Some(QueueEntry::new("alice"))));
        queue
            .expect_mark_matched()
            .returning(|_, _, _| Err(QueueRepositoryError::DynamoDb("throttled".to_string())));
        matches
            .expect_create_match()
            .returning(|waiting, joining| Ok(Match::new(waiting, joining)));
        matches.expect_delete_match().never();

        let service =
            MatchmakingService::new(Arc::new(queue), Arc::new(matches), Duration::from_secs(5));

        assert!(matches!(
            service.join("bob").await,
            Err(MatchmakingServiceError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_match_store_failure_is_reported() {
        let mut queue = MockQueueRepository::new();
        let mut matches = MockMatchRepository::new();
        queue.expect_get_entry().returning(|_| Ok(None));
        queue
            .expect_find_oldest_waiting()
            .returning(|_| Ok(Some(QueueEntry::new("alice"))));
        queue.expect_mark_matched().never();
        matches
            .expect_create_match()
            .returning(|_, _| Err(MatchRepositoryError::Serialization("bad item".to_string())));

        let service =
            MatchmakingService::new(Arc::new(queue), Arc::new(matches), Duration::from_secs(5));

        assert_eq!(
            service.join("bob").await.unwrap_err(),
            MatchmakingServiceError::PersistenceError("bad item".to_string())
        );
    }

    struct StalledQueueRepository;

    #[async_trait]
    impl QueueRepository for StalledQueueRepository {
        async fn enqueue(&self, _user_id: &str) -> Result<QueueEntry, QueueRepositoryError> {
            unreachable!()
        }

        async fn find_oldest_waiting(
            &self,
            _excluding_user_ids: &[String],
        ) -> Result<Option<QueueEntry>, QueueRepositoryError> {
            unreachable!()
        }

        async fn mark_matched(
            &self,
            _match_id: &str,
            _waiting_user_id: &str,
            _joining_user_id: &str,
        ) -> Result<(), QueueRepositoryError> {
            unreachable!()
        }

        async fn dequeue(&self, _user_id: &str) -> Result<(), QueueRepositoryError> {
            unreachable!()
        }

        async fn remove_matched(&self, _user_id: &str) -> Result<(), QueueRepositoryError> {
            unreachable!()
        }

        async fn get_entry(
            &self,
            _user_id: &str,
        ) -> Result<Option<QueueEntry>, QueueRepositoryError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }

        async fn waiting_position(
            &self,
            _user_id: &str,
        ) -> Result<Option<(usize, usize)>, QueueRepositoryError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let service = MatchmakingService::new(
            Arc::new(StalledQueueRepository),
            Arc::new(InMemoryMatchRepository::new()),
            Duration::from_millis(20),
        );

        let result = service.join("alice").await;

        assert_eq!(
            result.unwrap_err(),
            MatchmakingServiceError::ServiceUnavailable("get_entry timed out".to_string())
        );
    }
}
