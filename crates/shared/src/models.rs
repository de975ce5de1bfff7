//! Data models shared across the workspace.
//!
//! The cache only tracks MyAnimeList IDs, partitioned by content rating, for
//! each kind of entry that has a "recently added" listing.

use serde::{Deserialize, Serialize};

/// Kind of MyAnimeList entry that is cached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Anime,
    Manga,
}

impl EntryKind {
    /// Every cached kind, in processing order
    pub const ALL: [EntryKind; 2] = [EntryKind::Anime, EntryKind::Manga];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Anime => "anime",
            EntryKind::Manga => "manga",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content rating partition of the cache
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sfw,
    Nsfw,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Sfw, Category::Nsfw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sfw => "sfw",
            Category::Nsfw => "nsfw",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a "recently added" listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub id: u32,
    pub category: Category,
}

impl PageEntry {
    pub fn new(id: u32, category: Category) -> Self {
        Self { id, category }
    }
}
