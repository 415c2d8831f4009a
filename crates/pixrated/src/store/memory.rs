//! In-memory rating store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use pixrate_core::{RatingAggregate, RatingSubmission, SessionId};

use super::{RatingStore, StoreError};

/// Keeps aggregates in a map behind a single write lock.
#[derive(Default)]
pub struct MemoryRatingStore {
    aggregates: RwLock<HashMap<String, RatingAggregate>>,
    fail_writes: AtomicBool,
}

impl MemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save_rating` fail while `fail` is true.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl RatingStore for MemoryRatingStore {
    async fn load_aggregate(&self, image_filename: &str) -> Result<RatingAggregate, StoreError> {
        let aggregates = self.aggregates.read().await;
        Ok(aggregates
            .get(image_filename)
            .cloned()
            .unwrap_or_else(|| RatingAggregate::empty(image_filename)))
    }

    async fn save_rating(
        &self,
        session_id: &SessionId,
        submission: &RatingSubmission,
    ) -> Result<RatingAggregate, StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }

        let mut aggregates = self.aggregates.write().await;
        let aggregate = aggregates
            .entry(submission.image_filename.clone())
            .or_insert_with(|| RatingAggregate::empty(&submission.image_filename));
        aggregate.apply(submission.to_entry(session_id, Utc::now()));
        Ok(aggregate.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(image: &str, rating: f64) -> RatingSubmission {
        RatingSubmission::new(Some(image.to_string()), Some(rating), None, Some("Ada".to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_unknown_is_empty() {
        let store = MemoryRatingStore::new();
        let aggregate = store.load_aggregate("nope.png").await.unwrap();
        assert!(aggregate.is_empty());
        assert_eq!(aggregate.image_filename, "nope.png");
    }

    #[tokio::test]
    async fn test_save_replaces_by_session() {
        let store = MemoryRatingStore::new();
        let s1 = SessionId::new("s1");

        store.save_rating(&s1, &submission("cat.png", 2.0)).await.unwrap();
        let aggregate = store.save_rating(&s1, &submission("cat.png", 5.0)).await.unwrap();

        assert_eq!(aggregate.total_ratings(), 1);
        assert_eq!(aggregate.average_rating(), 5.0);
        assert_eq!(store.load_aggregate("cat.png").await.unwrap(), aggregate);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryRatingStore::new();
        store.set_fail_writes(true);

        let result = store
            .save_rating(&SessionId::new("s1"), &submission("cat.png", 3.0))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.load_aggregate("cat.png").await.unwrap().is_empty());
    }
}
