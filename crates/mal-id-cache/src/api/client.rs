//! Jikan API client with rate limiting and retry logic.

use super::rate_limiter::RateLimiter;
use super::types::*;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use shared::config::JikanConfig;
use shared::{Category, EntryKind, FetchError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// MyAnimeList genre ID used to split the listings into sfw and nsfw
const NSFW_GENRE: u32 = 12;

/// Jikan API v4 client
pub struct JikanClient {
    /// HTTP client
    client: Client,
    /// Base URL for Jikan API
    base_url: String,
    /// Rate limiter
    rate_limiter: RateLimiter,
    /// Maximum retries for failed requests
    max_retries: u32,
    /// Base delay for retry (exponential backoff)
    retry_delay_ms: u64,
}

impl JikanClient {
    /// Create a new Jikan client
    pub fn new(
        base_url: String,
        requests_per_second: f64,
        requests_per_minute: u32,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mal-id-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(requests_per_second, requests_per_minute),
            max_retries,
            retry_delay_ms,
        })
    }

    /// Create a client from the `[jikan]` config section
    pub fn from_config(config: &JikanConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.rate_limit.requests_per_second,
            config.rate_limit.requests_per_minute,
            config.max_retries,
            config.retry_delay_ms,
        )
    }

    /// Endpoint for one page of a kind's listing, newest IDs first
    pub fn listing_endpoint(kind: EntryKind, category: Category, page: u32) -> String {
        let genre_filter = match category {
            Category::Sfw => "genres_exclude",
            Category::Nsfw => "genres",
        };
        format!(
            "/{}?order_by=mal_id&sort=desc&page={}&{}={}",
            kind, page, genre_filter, NSFW_GENRE
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.retry_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        )
    }

    /// Make a GET request with rate limiting and retry logic
    ///
    /// Rate limiting, server errors and network failures are retried with
    /// exponential backoff; other client errors fail immediately.
    async fn get<T: serde::de::DeserializeOwned>(&mut self, endpoint: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            self.rate_limiter.acquire().await;

            debug!(url = %url, attempt = attempt + 1, "Making API request");

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            warn!(url = %url, error = %e, "Failed to parse response");
                            FetchError::Permanent {
                                url: url.clone(),
                                message: format!("Failed to parse response: {}", e),
                            }
                        });
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound { url });
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());

                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        warn!(url = %url, status = %status, error = %error_text, "Request rejected");
                        return Err(FetchError::Permanent {
                            url,
                            message: format!("status {}: {}", status, error_text),
                        });
                    }

                    warn!(url = %url, status = %status, error = %error_text, "Request failed");
                    last_error = format!("status {}: {}", status, error_text);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Request error");
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_retries {
                let delay = self.backoff(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(FetchError::Transient {
            url,
            message: format!(
                "gave up after {} attempts: {}",
                self.max_retries + 1,
                last_error
            ),
        })
    }

    /// Fetch one page of the "recently added" listing
    pub async fn recently_added(
        &mut self,
        kind: EntryKind,
        category: Category,
        page: u32,
    ) -> Result<PaginatedResponse<ListingEntry>, FetchError> {
        debug!(kind = %kind, category = %category, page = page, "Fetching listing page");
        self.get(&Self::listing_endpoint(kind, category, page)).await
    }

    /// Get the number of requests made in the last minute
    pub fn rate_limit_stats(&mut self) -> usize {
        self.rate_limiter.current_minute_count()
    }
}
