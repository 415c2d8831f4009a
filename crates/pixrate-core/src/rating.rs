//! Ratings and per-image aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult, SessionId};

/// Display name used when a submission carries none.
pub const ANONYMOUS_USER: &str = "Anonymous";

// ============================================================================
// Submission
// ============================================================================

/// A validated rating request for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSubmission {
    pub image_filename: String,
    pub rating: f64,
    pub comment: String,
    pub user_name: String,
}

impl RatingSubmission {
    /// Validates the raw fields of a rating request.
    ///
    /// The image filename must be non-blank and the rating must be a
    /// finite number. A blank user name falls back to `ANONYMOUS_USER`.
    pub fn new(
        image_filename: Option<String>,
        rating: Option<f64>,
        comment: Option<String>,
        user_name: Option<String>,
    ) -> DomainResult<Self> {
        let image_filename = image_filename
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| DomainError::missing("image_filename"))?;

        let rating = rating.ok_or_else(|| DomainError::missing("rating"))?;
        if !rating.is_finite() {
            return Err(DomainError::InvalidFieldValue {
                field: "rating".to_string(),
                value: rating.to_string(),
                expected: "a finite number".to_string(),
            });
        }

        let user_name = user_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());

        Ok(Self {
            image_filename,
            rating,
            comment: comment.unwrap_or_default(),
            user_name,
        })
    }

    /// Builds the feed entry recorded for `session_id` at `at`.
    pub fn to_entry(&self, session_id: &SessionId, at: DateTime<Utc>) -> RatingEntry {
        RatingEntry {
            session_id: session_id.clone(),
            user_name: self.user_name.clone(),
            rating: self.rating,
            comment: self.comment.clone(),
            timestamp: at,
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// One session's rating of an image, as it appears in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub session_id: SessionId,
    pub user_name: String,
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

/// All ratings recorded for one image.
///
/// The feed holds at most one entry per session, newest first. A session
/// rating the same image again replaces its earlier entry and moves it to
/// the front.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub image_filename: String,
    #[serde(default)]
    pub ratings_feed: Vec<RatingEntry>,
}

impl RatingAggregate {
    /// Creates an aggregate with no ratings.
    pub fn empty(image_filename: impl Into<String>) -> Self {
        Self {
            image_filename: image_filename.into(),
            ratings_feed: Vec::new(),
        }
    }

    /// Records an entry, replacing any earlier entry from the same session.
    ///
    /// Returns `true` if an earlier entry was replaced.
    pub fn apply(&mut self, entry: RatingEntry) -> bool {
        let before = self.ratings_feed.len();
        self.ratings_feed
            .retain(|existing| existing.session_id != entry.session_id);
        let replaced = self.ratings_feed.len() != before;
        self.ratings_feed.insert(0, entry);
        replaced
    }

    /// Number of distinct sessions that rated this image.
    pub fn total_ratings(&self) -> usize {
        self.ratings_feed.len()
    }

    /// Mean rating rounded to two decimals, or `0.0` with no ratings.
    pub fn average_rating(&self) -> f64 {
        if self.ratings_feed.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.ratings_feed.iter().map(|e| e.rating).sum();
        let mean = sum / self.ratings_feed.len() as f64;
        (mean * 100.0).round() / 100.0
    }

    /// The entry recorded by `session_id`, if any.
    pub fn entry_for(&self, session_id: &SessionId) -> Option<&RatingEntry> {
        self.ratings_feed
            .iter()
            .find(|e| &e.session_id == session_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ratings_feed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(session: &str, rating: f64, offset_secs: i64) -> RatingEntry {
        RatingEntry {
            session_id: SessionId::new(session),
            user_name: format!("user-{session}"),
            rating,
            comment: String::new(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_submission_requires_filename() {
        let err = RatingSubmission::new(None, Some(4.0), None, None).unwrap_err();
        assert_eq!(err, DomainError::missing("image_filename"));

        let err = RatingSubmission::new(Some("   ".into()), Some(4.0), None, None).unwrap_err();
        assert_eq!(err, DomainError::missing("image_filename"));
    }

    #[test]
    fn test_submission_requires_rating() {
        let err = RatingSubmission::new(Some("cat.png".into()), None, None, None).unwrap_err();
        assert_eq!(err, DomainError::missing("rating"));
    }

    #[test]
    fn test_submission_rejects_non_finite_rating() {
        let err =
            RatingSubmission::new(Some("cat.png".into()), Some(f64::NAN), None, None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidFieldValue { .. }));
    }

    #[test]
    fn test_submission_defaults() {
        let sub = RatingSubmission::new(Some("cat.png".into()), Some(5.0), None, Some(" ".into()))
            .unwrap();
        assert_eq!(sub.user_name, ANONYMOUS_USER);
        assert_eq!(sub.comment, "");
    }

    #[test]
    fn test_apply_puts_newest_first() {
        let mut agg = RatingAggregate::empty("cat.png");
        assert!(!agg.apply(entry("a", 3.0, 0)));
        assert!(!agg.apply(entry("b", 5.0, 1)));

        assert_eq!(agg.total_ratings(), 2);
        assert_eq!(agg.ratings_feed[0].session_id.as_str(), "b");
    }

    #[test]
    fn test_apply_replaces_same_session() {
        let mut agg = RatingAggregate::empty("cat.png");
        agg.apply(entry("a", 1.0, 0));
        agg.apply(entry("b", 2.0, 1));
        assert!(agg.apply(entry("a", 5.0, 2)));

        assert_eq!(agg.total_ratings(), 2);
        assert_eq!(agg.ratings_feed[0].session_id.as_str(), "a");
        assert_eq!(agg.entry_for(&SessionId::new("a")).map(|e| e.rating), Some(5.0));
    }

    #[test]
    fn test_average_rating() {
        let mut agg = RatingAggregate::empty("cat.png");
        assert_eq!(agg.average_rating(), 0.0);

        agg.apply(entry("a", 4.0, 0));
        agg.apply(entry("b", 5.0, 1));
        agg.apply(entry("c", 5.0, 2));
        assert_eq!(agg.average_rating(), 4.67);
    }
}
