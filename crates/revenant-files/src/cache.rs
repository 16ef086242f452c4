//! Process-wide read-through file cache.
//!
//! The outbound send path re-reads the same quest and patch files for every
//! session; this cache turns those reads into shared, immutable buffers.
//! Entries are keyed by path and never invalidated while the process runs
//! (operators replace files by restarting, which matches how the send path
//! is used).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

/// Content-addressed read-through cache
#[derive(Debug, Default)]
pub struct FileCache {
    entries: DashMap<PathBuf, Arc<Vec<u8>>>,
}

impl FileCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `path`, reading it at most once
    ///
    /// # Errors
    ///
    /// Propagates the filesystem error on first read; failed reads are not
    /// cached, so a transient failure retries on the next call.
    pub fn get(&self, path: &Path) -> std::io::Result<Arc<Vec<u8>>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(Arc::clone(entry.value()));
        }
        let data = Arc::new(std::fs::read(path)?);
        self.entries.insert(path.to_path_buf(), Arc::clone(&data));
        Ok(data)
    }

    /// Number of cached files
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_once_and_shares() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quest.bin");
        std::fs::File::create(&path).unwrap().write_all(b"payload").unwrap();

        let cache = FileCache::new();
        let a = cache.get(&path).unwrap();
        // The file changes on disk, but the cache keeps the first read
        std::fs::write(&path, b"changed").unwrap();
        let b = cache.get(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(&**a, b"payload");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_files_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let cache = FileCache::new();
        assert!(cache.get(&path).is_err());
        std::fs::write(&path, b"now present").unwrap();
        assert_eq!(&**cache.get(&path).unwrap(), b"now present");
    }
}
