//! On-disk content cache for extracted page text.
//!
//! One file per URL, named `<sha256(url) in hex>.txt`, holding the raw
//! extracted text with no envelope. The cache is an optimization only:
//! read failures are misses and write failures are logged no-ops.
//! There is no eviction; `clear` is the only way entries go away.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use websearch_shared::{Result, WebSearchError};

/// File extension used for cache entries.
const ENTRY_EXTENSION: &str = "txt";

/// Summary of the cache directory contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// URL-keyed text cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    /// Open the cache at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| WebSearchError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// The cache root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `url`. The file may not exist.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", cache_key(url)))
    }

    /// Cached text for `url`, or `None` on a miss or unreadable entry.
    pub async fn read(&self, url: &str) -> Option<String> {
        let path = self.path_for(url);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(url, "cache hit");
                Some(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(url, path = %path.display(), error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store text for `url`, replacing any earlier entry.
    pub async fn write(&self, url: &str, content: &str) {
        let path = self.path_for(url);
        match tokio::fs::write(&path, content).await {
            Ok(()) => debug!(url, bytes = content.len(), "cached content"),
            Err(e) => warn!(url, path = %path.display(), error = %e, "cache write failed"),
        }
    }

    /// Count entries and their total size.
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| WebSearchError::io(&self.dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WebSearchError::io(&self.dir, e))?
        {
            if !is_entry(&entry.path()) {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| WebSearchError::io(entry.path(), e))?;
            if meta.is_file() {
                stats.entries += 1;
                stats.total_bytes += meta.len();
            }
        }

        Ok(stats)
    }

    /// Remove every cache entry and recreate an empty directory.
    /// Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.stats().await?.entries;
        tokio::fs::remove_dir_all(&self.dir)
            .await
            .map_err(|e| WebSearchError::io(&self.dir, e))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WebSearchError::io(&self.dir, e))?;
        tracing::info!(dir = %self.dir.display(), removed, "cache cleared");
        Ok(removed)
    }
}

/// Hex-encoded SHA-256 of the URL.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_entry(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
}
