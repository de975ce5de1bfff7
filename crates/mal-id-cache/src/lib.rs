//! MyAnimeList ID cache.
//!
//! Keeps a local, git-committed list of every approved anime and manga ID,
//! split into sfw and nsfw. The "recently added" listings of the Jikan API
//! are polled at several depths, each on its own interval, and new IDs are
//! merged into the cache files.

pub mod api;
pub mod fetcher;
pub mod git;
pub mod persist;
pub mod reconcile;
pub mod shutdown;
pub mod state;
pub mod store;
pub mod unapproved;

pub use api::{JikanClient, RateLimiter};
pub use fetcher::PageFetcher;
pub use git::GitRepo;
pub use reconcile::{extend_depth, Reconciler, ScanError, ScanOutcome, TickReport};
pub use shutdown::StopSignal;
pub use state::StateTracker;
pub use store::{IdStore, ReplaceStats, Upsert};
pub use unapproved::{find_gaps, ReportFormat, UnapprovedReport};
