//! Vote admission: decides whether a vote attempt is recorded.
//!
//! The order is fixed: normalize the email, find the event, check its password, then
//! hand the insert to the store. Duplicate votes are never looked up in advance. The
//! store's unique constraint rejects them inside the insert transaction.

use tracing::{debug, info};

use crate::models::{normalize_email, EventId, VoteReceipt};
use crate::store::{event_not_found, EventStore};
use crate::utils::error::AppError;
use crate::utils::password;

#[derive(Debug, Clone)]
pub struct VoteAdmission {
    store: EventStore,
}

impl VoteAdmission {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// Casts a vote.
    ///
    /// Rejections come back as [`AppError::NotFound`], [`AppError::PasswordRequired`],
    /// [`AppError::IncorrectPassword`], [`AppError::AlreadyVoted`], or
    /// [`AppError::ValidationError`] for a blank email.
    pub async fn cast_vote(
        &self,
        event_id: EventId,
        email: &str,
        password: Option<&str>,
    ) -> Result<VoteReceipt, AppError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::ValidationError("Email is required".to_string()));
        }

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;

        if let Some(stored_hash) = event.password_hash.filter(|hash| !hash.trim().is_empty()) {
            let raw = password::supplied(password).ok_or(AppError::PasswordRequired)?;
            if !password::verify_password_blocking(raw.to_string(), stored_hash).await? {
                debug!(event_id, "Vote rejected: incorrect password");
                return Err(AppError::IncorrectPassword);
            }
        }

        let receipt = self.store.record_vote(event_id, &email).await?;
        info!(
            event_id,
            vote_count = receipt.vote_count,
            "Vote recorded"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::PasswordlessDelete;
    use crate::store::testing::{memory_store, new_event, TempDatabase};

    async fn setup(password: Option<&str>) -> (VoteAdmission, EventStore, EventId) {
        let store = memory_store(PasswordlessDelete::Forbid).await;
        let id = store
            .create_event(new_event("Lunch", "2024-01-01", password))
            .await
            .unwrap();
        (VoteAdmission::new(store.clone()), store, id)
    }

    #[tokio::test]
    async fn test_lunch_scenario() {
        let (admission, store, id) = setup(None).await;
        assert_eq!(store.list_events().await.unwrap()[0].vote_count, 0);

        let receipt = admission.cast_vote(id, "a@x.com", None).await.unwrap();
        assert_eq!(receipt.vote_count, 1);
        assert_eq!(receipt.email, "a@x.com");

        let again = admission.cast_vote(id, "A@X.com", None).await;
        assert!(matches!(again, Err(AppError::AlreadyVoted)));

        assert_eq!(store.list_events().await.unwrap()[0].vote_count, 1);
        assert_eq!(store.count_votes(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_secret_scenario() {
        let (admission, _store, id) = setup(Some("secret")).await;

        assert!(matches!(
            admission.cast_vote(id, "a@x.com", None).await,
            Err(AppError::PasswordRequired)
        ));
        assert!(matches!(
            admission.cast_vote(id, "a@x.com", Some("wrong")).await,
            Err(AppError::IncorrectPassword)
        ));

        let receipt = admission
            .cast_vote(id, "a@x.com", Some("secret"))
            .await
            .unwrap();
        assert_eq!(receipt.vote_count, 1);
    }

    #[tokio::test]
    async fn test_password_is_exact() {
        let (admission, store, id) = setup(Some("secret")).await;

        for attempt in ["Secret", "SECRET", " secret", "secret ", "secret\n"] {
            assert!(
                matches!(
                    admission.cast_vote(id, "a@x.com", Some(attempt)).await,
                    Err(AppError::IncorrectPassword)
                ),
                "'{}' should be rejected",
                attempt.escape_debug()
            );
        }
        assert!(matches!(
            admission.cast_vote(id, "a@x.com", Some("   ")).await,
            Err(AppError::PasswordRequired)
        ));
        assert_eq!(store.count_votes(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_event_ignores_supplied_password() {
        let (admission, _store, id) = setup(None).await;

        admission.cast_vote(id, "a@x.com", None).await.unwrap();
        let receipt = admission
            .cast_vote(id, "b@x.com", Some("anything"))
            .await
            .unwrap();
        assert_eq!(receipt.vote_count, 2);
    }

    #[tokio::test]
    async fn test_unknown_event_and_blank_email() {
        let (admission, _store, id) = setup(None).await;

        assert!(matches!(
            admission.cast_vote(id + 100, "a@x.com", None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            admission.cast_vote(id, "   ", None).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_same_voter_per_event_not_global() {
        let (admission, store, first) = setup(None).await;
        let second = store
            .create_event(new_event("Dinner", "2024-01-02", None))
            .await
            .unwrap();

        admission.cast_vote(first, "a@x.com", None).await.unwrap();
        admission.cast_vote(second, "a@x.com", None).await.unwrap();

        assert_eq!(store.count_votes(first).await.unwrap(), 1);
        assert_eq!(store.count_votes(second).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_votes_admit_exactly_one() {
        let (admission, store, id) = setup(None).await;

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let admission = admission.clone();
                // Same voter, spelled differently.
                let email = if i % 2 == 0 { "a@x.com" } else { " A@X.COM" };
                tokio::spawn(async move { admission.cast_vote(id, email, None).await })
            })
            .collect();

        let mut recorded = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => recorded += 1,
                Err(AppError::AlreadyVoted) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(store.count_votes(id).await.unwrap(), 1);
        assert_eq!(store.get_event(id).await.unwrap().unwrap().vote_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_vote_count_matches_rows_under_concurrency() {
        let (admission, store, id) = setup(None).await;

        let attempts: Vec<_> = (0..30)
            .map(|i| {
                let admission = admission.clone();
                // 10 distinct voters, each trying three times.
                let email = format!("voter{}@x.com", i % 10);
                tokio::spawn(async move { admission.cast_vote(id, &email, None).await })
            })
            .collect();

        let mut voters = HashSet::new();
        for attempt in attempts {
            if let Ok(receipt) = attempt.await.unwrap() {
                assert!(voters.insert(receipt.email));
            }
        }

        assert_eq!(voters.len(), 10);
        let event = store.get_event(id).await.unwrap().unwrap();
        assert_eq!(event.vote_count, store.count_votes(id).await.unwrap());
        assert_eq!(event.vote_count, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_duplicate_race_across_pooled_connections() {
        let database = TempDatabase::new("vote-race");
        let store = database.store(8).await;
        let admission = VoteAdmission::new(store.clone());
        let id = store
            .create_event(new_event("Lunch", "2024-01-01", None))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..64)
            .map(|i| {
                let admission = admission.clone();
                let email = if i % 2 == 0 {
                    format!("voter{}@x.com", i % 8)
                } else {
                    format!(" VOTER{}@X.COM ", i % 8)
                };
                tokio::spawn(async move { admission.cast_vote(id, &email, None).await })
            })
            .collect();

        let (mut recorded, mut duplicates) = (0, 0);
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => recorded += 1,
                Err(AppError::AlreadyVoted) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(recorded, 8);
        assert_eq!(duplicates, 56);
        let event = store.get_event(id).await.unwrap().unwrap();
        assert_eq!(event.vote_count, 8);
        assert_eq!(store.count_votes(id).await.unwrap(), 8);
        store.pool().close().await;
    }
}
