//! Unapproved entry report.
//!
//! MyAnimeList hands out IDs when an entry is submitted but only lists it once
//! a moderator approves it, so the holes below the highest known ID are the
//! entries still waiting for approval (or deleted ones).

use crate::persist::{to_pretty_json, write_atomic};
use crate::store::IdStore;
use anyhow::Result;
use serde::Serialize;
use shared::EntryKind;
use std::fmt::Write as _;
use std::path::Path;

/// File written by the `json` format
pub const REPORT_FILE: &str = "unapproved_mal_ids.json";

/// Output format of the `--unapproved` report
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// One MyAnimeList URL per line
    Table,
    /// Write unapproved_mal_ids.json in the working directory
    Json,
    /// Only the number of entries
    Count,
}

/// Every ID in `[min_id, max_id]` absent from both categories, ascending
pub fn find_gaps(store: &IdStore, min_id: u32, max_id: u32) -> Vec<u32> {
    if min_id > max_id {
        return Vec::new();
    }
    (min_id..=max_id)
        .filter(|id| store.contains(*id).is_none())
        .collect()
}

/// Unapproved IDs per entry kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnapprovedReport {
    #[serde(rename = "unapproved_anime")]
    pub anime: Vec<u32>,
    #[serde(rename = "unapproved_manga")]
    pub manga: Vec<u32>,
}

impl UnapprovedReport {
    /// Gaps of each store between 1 and its highest ID
    pub fn from_stores(anime: &IdStore, manga: &IdStore) -> Self {
        let gaps = |store: &IdStore| store.max_id().map_or_else(Vec::new, |max| find_gaps(store, 1, max));
        Self {
            anime: gaps(anime),
            manga: gaps(manga),
        }
    }

    pub fn ids(&self, kind: EntryKind) -> &[u32] {
        match kind {
            EntryKind::Anime => &self.anime,
            EntryKind::Manga => &self.manga,
        }
    }

    pub fn render_count(&self) -> String {
        let mut out = String::new();
        for kind in EntryKind::ALL {
            let _ = writeln!(out, "Unapproved {} count: {}", kind, self.ids(kind).len());
        }
        out
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        for kind in EntryKind::ALL {
            let _ = writeln!(out, "===== {} =====", kind.as_str().to_uppercase());
            for id in self.ids(kind) {
                let _ = writeln!(out, "https://myanimelist.net/{}/{}", kind, id);
            }
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_atomic(path, &to_pretty_json(self)?)
    }
}
