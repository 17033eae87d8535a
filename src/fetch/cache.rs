use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::slug::cache_file_name;

/// File-per-slug markup cache with a fixed freshness window.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
    ttl: Duration,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Cache directory {} unavailable: {}", dir.display(), e);
        }
        PageCache { dir, ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(cache_file_name(slug))
    }

    /// Cached markup if its age at `now` is below the window.
    pub fn read_fresh(&self, slug: &str, now: SystemTime) -> Option<String> {
        let path = self.path_for(slug);
        let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
        // mtime in the future counts as age zero
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= self.ttl {
            debug!(slug, age_secs = age.as_secs(), "Cache entry stale");
            return None;
        }
        std::fs::read_to_string(&path).ok()
    }

    /// Best-effort: failures are logged, never returned.
    pub fn write(&self, slug: &str, markup: &str) {
        let path = self.path_for(slug);
        if let Err(e) = std::fs::write(&path, markup) {
            warn!("Failed to cache {} at {}: {}", slug, path.display(), e);
        }
    }
}
