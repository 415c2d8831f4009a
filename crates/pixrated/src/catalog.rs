//! Listing of the images available for rating.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// File extensions recognized as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

/// The directory of images offered to clients.
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    dir: PathBuf,
}

impl ImageCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the image files directly inside the directory, sorted.
    ///
    /// A missing or unreadable directory yields an empty list. Entries
    /// that fail to read are skipped.
    pub async fn list_files(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Image directory does not exist");
                return Vec::new();
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to read image directory");
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Failed to read directory entry");
                    break;
                }
            };

            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }

            if let Some(name) = entry.file_name().to_str() {
                if is_image_name(name) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        files
    }
}

/// Whether `name` ends in `.` plus one of the recognized image extensions.
///
/// A plain suffix match, so a bare dotfile such as `.png` counts.
pub fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}
