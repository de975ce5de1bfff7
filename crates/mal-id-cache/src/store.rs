//! Categorized ID store backed by a `<kind>_cache.json` file.
//!
//! In memory every ID maps to exactly one category, so an ID can never be
//! listed as both sfw and nsfw. On disk the IDs are written as two sorted
//! arrays.

use crate::persist::{remove_if_exists, to_pretty_json, write_atomic};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::{Category, CorruptStoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of recording an ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The ID was not known under any category
    Inserted,
    /// The ID was known under the other category and has been moved
    Moved { from: Category },
    /// The ID was already known under this category
    Unchanged,
}

/// Differences applied by [`IdStore::replace_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    pub added: usize,
    pub removed: usize,
    pub moved: usize,
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreFile {
    sfw: Vec<u32>,
    nsfw: Vec<u32>,
}

/// Known IDs for one entry kind
#[derive(Debug, Clone)]
pub struct IdStore {
    path: PathBuf,
    ids: HashMap<u32, Category>,
    dirty: bool,
}

impl IdStore {
    /// Create an empty store that will be saved to `path`
    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ids: HashMap::new(),
            dirty: false,
        }
    }

    /// Load the store from `path`
    ///
    /// A missing file yields an empty store. Malformed content fails with
    /// [`CorruptStoreError`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Cache file not found, starting with an empty cache");
            return Ok(Self::empty(path));
        }

        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;

        let file: StoreFile = serde_json::from_slice(&content)
            .map_err(|e| CorruptStoreError::new(path, e.to_string()))?;

        let mut ids = HashMap::with_capacity(file.sfw.len() + file.nsfw.len());
        for (category, list) in [(Category::Sfw, file.sfw), (Category::Nsfw, file.nsfw)] {
            for id in list {
                if id == 0 {
                    return Err(CorruptStoreError::new(path, "ID 0 is not a valid MyAnimeList ID").into());
                }
                if let Some(previous) = ids.insert(id, category) {
                    if previous != category {
                        return Err(CorruptStoreError::new(
                            path,
                            format!("ID {} is listed under both sfw and nsfw", id),
                        )
                        .into());
                    }
                }
            }
        }

        debug!(path = %path.display(), ids = ids.len(), "Cache loaded");

        Ok(Self {
            path: path.to_path_buf(),
            ids,
            dirty: false,
        })
    }

    /// Path the store is saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Category the ID is known under, if any
    pub fn contains(&self, id: u32) -> Option<Category> {
        self.ids.get(&id).copied()
    }

    /// Record `id` under `category`; the last seen category wins
    pub fn upsert(&mut self, id: u32, category: Category) -> Upsert {
        match self.ids.insert(id, category) {
            None => {
                self.dirty = true;
                Upsert::Inserted
            }
            Some(previous) if previous == category => Upsert::Unchanged,
            Some(previous) => {
                self.dirty = true;
                Upsert::Moved { from: previous }
            }
        }
    }

    /// Sorted IDs of one category
    pub fn ids(&self, category: Category) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .ids
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of IDs in one category
    pub fn count(&self, category: Category) -> usize {
        self.ids.values().filter(|c| **c == category).count()
    }

    /// Highest known ID in either category
    pub fn max_id(&self) -> Option<u32> {
        self.ids.keys().max().copied()
    }

    /// Whether there are changes not yet saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Copy every entry of `other` into this store, returning how many changed
    pub fn merge(&mut self, other: &IdStore) -> usize {
        let mut changed = 0;
        for (&id, &category) in &other.ids {
            if self.upsert(id, category) != Upsert::Unchanged {
                changed += 1;
            }
        }
        changed
    }

    /// Swap in the entries of `fresh`, dropping IDs it does not contain
    pub fn replace_with(&mut self, fresh: IdStore) -> ReplaceStats {
        let mut stats = ReplaceStats::default();
        for (id, category) in &fresh.ids {
            match self.ids.get(id) {
                None => stats.added += 1,
                Some(previous) if previous != category => stats.moved += 1,
                Some(_) => {}
            }
        }
        stats.removed = self
            .ids
            .keys()
            .filter(|id| !fresh.ids.contains_key(id))
            .count();

        if stats != ReplaceStats::default() {
            self.dirty = true;
        }
        self.ids = fresh.ids;
        stats
    }

    /// Write the store atomically
    pub fn save(&mut self) -> Result<()> {
        let file = StoreFile {
            sfw: self.ids(Category::Sfw),
            nsfw: self.ids(Category::Nsfw),
        };
        let content = to_pretty_json(&file)?;
        write_atomic(&self.path, &content)?;
        self.dirty = false;

        debug!(
            path = %self.path.display(),
            sfw = file.sfw.len(),
            nsfw = file.nsfw.len(),
            "Cache saved"
        );
        Ok(())
    }

    /// Delete the cache file, returning whether it existed
    pub fn delete(path: impl AsRef<Path>) -> Result<bool> {
        remove_if_exists(path.as_ref())
    }
}
