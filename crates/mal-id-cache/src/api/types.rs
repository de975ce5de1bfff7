//! Jikan API v4 response types.
//!
//! Only the fields the ID cache needs are modelled; serde ignores the rest.

use serde::{Deserialize, Serialize};

/// Generic pagination wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub last_visible_page: u32,
    pub has_next_page: bool,
}

/// One row of an `/anime` or `/manga` search listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingEntry {
    pub mal_id: u32,
}
