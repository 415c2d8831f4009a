//! Rating persistence.
//!
//! Sessions reach the store only through the `RatingStore` trait:
//! load the aggregate for an image, or record one session's rating of it.
//! Implementations must serialize writes to the same image so that two
//! sessions rating it at once both land in the feed.

use std::path::PathBuf;

use async_trait::async_trait;

use pixrate_core::{RatingAggregate, RatingSubmission, SessionId};

mod file;
mod memory;

pub use file::FileRatingStore;
pub use memory::MemoryRatingStore;

/// Storage for per-image rating aggregates.
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Returns the aggregate for `image_filename`, empty if never rated.
    async fn load_aggregate(&self, image_filename: &str) -> Result<RatingAggregate, StoreError>;

    /// Records `submission` on behalf of `session_id`, replacing that
    /// session's earlier rating of the same image, and returns the
    /// updated aggregate.
    async fn save_rating(
        &self,
        session_id: &SessionId,
        submission: &RatingSubmission,
    ) -> Result<RatingAggregate, StoreError>;
}

/// Errors that can occur in store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid image name: {name:?}")]
    InvalidTarget { name: String },

    #[error("I/O error at {path}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Corrupt rating record at {path}: {error}")]
    Corrupt { path: PathBuf, error: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
