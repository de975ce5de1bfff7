//! File path utilities for the cache and state files.
//!
//! Cache files live inside the git repository so they can be committed;
//! state files stay in the private data directory.

use crate::models::EntryKind;
use std::path::{Path, PathBuf};

/// File path manager for data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
    cache_dir: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths with the given data and cache directories
    pub fn new(root: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory holding the cache files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the cache file for an entry kind, e.g. `cache/anime_cache.json`
    pub fn cache_file(&self, kind: EntryKind) -> PathBuf {
        self.cache_dir.join(format!("{}_cache.json", kind))
    }

    /// Get the state directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Get the state file for an entry kind, e.g. `state/anime_state.json`
    pub fn state_file(&self, kind: EntryKind) -> PathBuf {
        self.state_dir().join(format!("{}_state.json", kind))
    }

    /// Create all necessary directories
    pub fn create_dirs(&self) -> std::io::Result<()> {
        let dirs = vec![
            self.root.clone(),
            self.cache_dir.clone(),
            self.state_dir(),
        ];

        for dir in dirs {
            std::fs::create_dir_all(&dir)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let paths = DataPaths::new("/data", "/repo/cache");

        assert_eq!(
            paths.cache_file(EntryKind::Anime),
            PathBuf::from("/repo/cache/anime_cache.json")
        );

        assert_eq!(
            paths.state_file(EntryKind::Manga),
            PathBuf::from("/data/state/manga_state.json")
        );
    }

    #[test]
    fn test_create_dirs() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path().join("data"), temp_dir.path().join("repo/cache"));

        paths.create_dirs()?;

        assert!(paths.state_dir().is_dir());
        assert!(paths.cache_dir().is_dir());
        Ok(())
    }
}
