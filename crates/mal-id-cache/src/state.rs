//! Per check-range "last checked" timestamps, persisted as `<kind>_state.json`.

use crate::persist::{remove_if_exists, to_pretty_json, write_atomic};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use shared::CheckRange;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// When each check range last completed
#[derive(Debug, Clone)]
pub struct StateTracker {
    path: PathBuf,
    records: BTreeMap<String, DateTime<Utc>>,
}

impl StateTracker {
    /// Create a tracker where every range is unchecked
    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            records: BTreeMap::new(),
        }
    }

    /// Load state from `path`
    ///
    /// A missing or unreadable state only means every range is due again, so
    /// parse failures are logged and treated as empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            debug!(path = %path.display(), "State file not found, every range is due");
            return Ok(Self::empty(path));
        }

        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let records: BTreeMap<String, DateTime<Utc>> = match serde_json::from_slice(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not parse state file, every range is due");
                BTreeMap::new()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn last_checked(&self, name: &str) -> Option<DateTime<Utc>> {
        self.records.get(name).copied()
    }

    /// Whether `range` has never been checked or its interval has elapsed
    pub fn is_due(&self, range: &CheckRange, now: DateTime<Utc>) -> bool {
        match self.last_checked(&range.name) {
            None => true,
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                elapsed >= 0 && elapsed as u64 >= range.interval_secs
            }
        }
    }

    /// Record a completed check
    pub fn mark(&mut self, name: &str, at: DateTime<Utc>) {
        self.records.insert(name.to_string(), at);
    }

    /// Set every configured range as checked at `at`
    pub fn force_all(&mut self, ranges: &[CheckRange], at: DateTime<Utc>) {
        for range in ranges {
            self.mark(&range.name, at);
        }
    }

    /// Write the state atomically
    pub fn save(&self) -> Result<()> {
        let content = to_pretty_json(&self.records)?;
        write_atomic(&self.path, &content)?;
        debug!(path = %self.path.display(), ranges = self.records.len(), "State saved");
        Ok(())
    }

    /// Delete the state file, returning whether it existed
    pub fn delete(path: impl AsRef<Path>) -> Result<bool> {
        remove_if_exists(path.as_ref())
    }
}
