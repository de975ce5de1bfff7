//! Page fetcher contract used by the reconciliation engine.

use crate::api::JikanClient;
use async_trait::async_trait;
use shared::{Category, EntryKind, FetchError, PageEntry};
use tracing::debug;

/// Source of "recently added" listing pages.
///
/// Pages are numbered from 1 and ordered newest ID first. An empty page marks
/// the end of the listing.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch_page(
        &mut self,
        kind: EntryKind,
        category: Category,
        page: u32,
    ) -> Result<Vec<PageEntry>, FetchError>;
}

#[async_trait]
impl PageFetcher for JikanClient {
    async fn fetch_page(
        &mut self,
        kind: EntryKind,
        category: Category,
        page: u32,
    ) -> Result<Vec<PageEntry>, FetchError> {
        match self.recently_added(kind, category, page).await {
            Ok(response) => {
                if let Some(pagination) = &response.pagination {
                    debug!(
                        kind = %kind,
                        category = %category,
                        page = page,
                        last_page = pagination.last_visible_page,
                        has_next = pagination.has_next_page,
                        "Listing page fetched"
                    );
                }
                Ok(response
                    .data
                    .into_iter()
                    .map(|entry| PageEntry::new(entry.mal_id, category))
                    .collect())
            }
            // Jikan answers 404 for pages past the last one
            Err(FetchError::NotFound { url }) if page > 1 => {
                debug!(url = %url, page = page, "Page past end of listing");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
