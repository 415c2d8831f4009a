//! File-backed rating store.
//!
//! One JSON record per image under the data directory:
//!
//! ```text
//! ratings/
//! ├── cat.png.json
//! └── sunset.jpg.json
//! ```
//!
//! Each save is a read-modify-write of one record under that image's
//! lock, written to a temporary file and renamed into place.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use pixrate_core::{RatingAggregate, RatingSubmission, SessionId};

use super::{RatingStore, StoreError};

/// Stores one JSON file per rated image.
pub struct FileRatingStore {
    dir: PathBuf,

    /// Per-image write locks, present only while a save is in flight
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileRatingStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `image_filename`.
    ///
    /// Names that could escape the data directory are rejected.
    fn record_path(&self, image_filename: &str) -> Result<PathBuf, StoreError> {
        let invalid = image_filename.is_empty()
            || image_filename.starts_with('.')
            || image_filename.contains(['/', '\\', '\0']);
        if invalid {
            return Err(StoreError::InvalidTarget {
                name: image_filename.to_string(),
            });
        }
        Ok(self.dir.join(format!("{image_filename}.json")))
    }

    async fn lock_for(&self, image_filename: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(image_filename.to_string()).or_default())
    }

    /// Drops the lock entry for `image_filename` once no other save holds
    /// or waits on it. `lock` is the caller's clone, already unlocked.
    async fn release_lock(&self, image_filename: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(image_filename);
        }
    }

    async fn save_locked(
        &self,
        path: &Path,
        session_id: &SessionId,
        submission: &RatingSubmission,
    ) -> Result<RatingAggregate, StoreError> {
        let image = submission.image_filename.as_str();
        let mut aggregate = Self::read_record(path, image).await?;
        let replaced = aggregate.apply(submission.to_entry(session_id, Utc::now()));
        self.write_record(path, &aggregate).await?;

        debug!(
            image = %image,
            session_id = %session_id,
            replaced,
            total = aggregate.total_ratings(),
            "Rating saved"
        );

        Ok(aggregate)
    }

    async fn read_record(path: &Path, image_filename: &str) -> Result<RatingAggregate, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(RatingAggregate::empty(image_filename));
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    async fn write_record(&self, path: &Path, aggregate: &RatingAggregate) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let json = serde_json::to_vec_pretty(aggregate).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl RatingStore for FileRatingStore {
    async fn load_aggregate(&self, image_filename: &str) -> Result<RatingAggregate, StoreError> {
        let path = self.record_path(image_filename)?;
        Self::read_record(&path, image_filename).await
    }

    async fn save_rating(
        &self,
        session_id: &SessionId,
        submission: &RatingSubmission,
    ) -> Result<RatingAggregate, StoreError> {
        let image = submission.image_filename.as_str();
        let path = self.record_path(image)?;

        let lock = self.lock_for(image).await;
        let result = {
            let _guard = lock.lock().await;
            self.save_locked(&path, session_id, submission).await
        };
        self.release_lock(image, lock).await;

        result
    }
}

#[cfg(test)]
impl FileRatingStore {
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}
