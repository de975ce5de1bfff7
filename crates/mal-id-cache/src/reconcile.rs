//! Reconciliation engine.
//!
//! Walks the "recently added" listings of one entry kind and merges every ID
//! it sees into the [`IdStore`]. Each configured [`CheckRange`] is re-checked
//! once its interval has elapsed; a page that turns up an unknown ID pushes
//! the walk deeper, since a burst of new entries may spill over the planned
//! depth.

use crate::fetcher::PageFetcher;
use crate::shutdown::StopSignal;
use crate::state::StateTracker;
use crate::store::{IdStore, Upsert};
use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::config::PollingConfig;
use shared::{Category, CategoryChangePolicy, CheckRange, Config, DataPaths, EntryKind, FetchError, PageDepth};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Listings are walked in this order
const SCAN_ORDER: [Category; 2] = [Category::Nsfw, Category::Sfw];

/// Why a scan did not complete
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to fetch {kind} {category} page {page}: {source}")]
    Fetch {
        kind: EntryKind,
        category: Category,
        page: u32,
        #[source]
        source: FetchError,
    },

    #[error("scan interrupted by shutdown")]
    Interrupted,
}

/// Progress through one category's listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryScan {
    pub category: Category,
    /// Pages fetched, including a final empty page
    pub pages_checked: u32,
    /// Whether the walk ran off the end of the listing
    pub exhausted: bool,
    pub new_ids: usize,
    pub moved_ids: usize,
}

impl CategoryScan {
    fn new(category: Category) -> Self {
        Self {
            category,
            pages_checked: 0,
            exhausted: false,
            new_ids: 0,
            moved_ids: 0,
        }
    }
}

/// Summary of a completed scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub pages_checked: u32,
    pub deepest_page: u32,
    pub new_ids: usize,
    pub moved_ids: usize,
    pub removed_ids: usize,
    /// Set when every page of every listing was walked
    pub full_rebuild: bool,
    pub categories: Vec<CategoryScan>,
}

impl ScanOutcome {
    fn from_categories(categories: Vec<CategoryScan>) -> Self {
        Self {
            pages_checked: categories.iter().map(|c| c.pages_checked).sum(),
            deepest_page: categories.iter().map(|c| c.pages_checked).max().unwrap_or(0),
            new_ids: categories.iter().map(|c| c.new_ids).sum(),
            moved_ids: categories.iter().map(|c| c.moved_ids).sum(),
            removed_ids: 0,
            full_rebuild: false,
            categories,
        }
    }
}

/// What a call to [`Reconciler::tick`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Ranges that completed, in the order they ran
    pub scanned: Vec<String>,
    /// Ranges whose scan failed
    pub failed: Vec<String>,
    pub interrupted: bool,
    pub new_ids: usize,
    pub moved_ids: usize,
    pub removed_ids: usize,
    pub store_changed: bool,
}

impl TickReport {
    fn record(&mut self, outcome: &ScanOutcome) {
        self.new_ids += outcome.new_ids;
        self.moved_ids += outcome.moved_ids;
        self.removed_ids += outcome.removed_ids;
    }
}

/// Depth after finding an unknown ID on `page`; never below `bound`
pub fn extend_depth(bound: u32, page: u32) -> u32 {
    bound.max(page.saturating_add(5).saturating_add(page / 5))
}

/// Immutable inputs of a listing walk
#[derive(Debug, Clone)]
struct WalkContext {
    kind: EntryKind,
    policy: CategoryChangePolicy,
    stop: StopSignal,
}

/// Walk one category from page 1, up to `planned` pages or to the end of the
/// listing when `planned` is `None`
async fn walk<F: PageFetcher + ?Sized>(
    ctx: &WalkContext,
    fetcher: &mut F,
    store: &mut IdStore,
    category: Category,
    planned: Option<u32>,
) -> Result<CategoryScan, ScanError> {
    let mut progress = CategoryScan::new(category);
    let mut bound = planned;
    let mut page = 1u32;

    while bound.map_or(true, |b| page <= b) {
        if ctx.stop.is_raised() {
            return Err(ScanError::Interrupted);
        }

        let entries = fetcher
            .fetch_page(ctx.kind, category, page)
            .await
            .map_err(|source| ScanError::Fetch {
                kind: ctx.kind,
                category,
                page,
                source,
            })?;
        progress.pages_checked = page;

        if entries.is_empty() {
            debug!(kind = %ctx.kind, category = %category, page = page, "Reached end of listing");
            progress.exhausted = true;
            break;
        }

        let mut novel = false;
        for entry in entries {
            match store.upsert(entry.id, entry.category) {
                Upsert::Inserted => {
                    novel = true;
                    progress.new_ids += 1;
                    if bound.is_some() {
                        debug!(kind = %ctx.kind, category = %entry.category, id = entry.id, "New ID");
                    }
                }
                Upsert::Moved { from } => {
                    progress.moved_ids += 1;
                    match ctx.policy {
                        CategoryChangePolicy::Migrate => debug!(
                            kind = %ctx.kind,
                            id = entry.id,
                            from = %from,
                            to = %entry.category,
                            "ID changed category"
                        ),
                        CategoryChangePolicy::Warn => warn!(
                            kind = %ctx.kind,
                            id = entry.id,
                            from = %from,
                            to = %entry.category,
                            "ID changed category"
                        ),
                    }
                }
                Upsert::Unchanged => {}
            }
        }

        if novel {
            if let Some(current) = bound {
                let extended = extend_depth(current, page);
                if extended > current {
                    info!(
                        kind = %ctx.kind,
                        category = %category,
                        page = page,
                        depth = extended,
                        "Found new IDs, extending search"
                    );
                }
                bound = Some(extended);
            }
        }

        page += 1;
    }

    Ok(progress)
}

/// Keeps one entry kind's cache in sync with the remote listings
#[derive(Debug)]
pub struct Reconciler {
    ctx: WalkContext,
    store: IdStore,
    state: StateTracker,
    /// Deepest first
    ranges: Vec<CheckRange>,
    nsfw_depth_divisor: u32,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(
        kind: EntryKind,
        store: IdStore,
        state: StateTracker,
        ranges: Vec<CheckRange>,
        polling: &PollingConfig,
        stop: StopSignal,
    ) -> Self {
        let mut ranges = ranges;
        ranges.sort_by(|a, b| b.pages.cmp(&a.pages));

        Self {
            ctx: WalkContext {
                kind,
                policy: polling.on_category_change,
                stop,
            },
            store,
            state,
            ranges,
            nsfw_depth_divisor: polling.nsfw_depth_divisor.max(1),
            dry_run: false,
        }
    }

    /// Load the cache and state files of `kind`
    pub fn load(kind: EntryKind, config: &Config, paths: &DataPaths, stop: StopSignal) -> Result<Self> {
        let store = IdStore::load(paths.cache_file(kind))?;
        let state = StateTracker::load(paths.state_file(kind))?;

        info!(
            kind = %kind,
            sfw = store.count(Category::Sfw),
            nsfw = store.count(Category::Nsfw),
            "Loaded cache"
        );

        Ok(Self::new(
            kind,
            store,
            state,
            config.kind(kind).ranges.clone(),
            &config.polling,
            stop,
        ))
    }

    /// Log writes instead of performing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn kind(&self) -> EntryKind {
        self.ctx.kind
    }

    pub fn store(&self) -> &IdStore {
        &self.store
    }

    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    pub fn ranges(&self) -> &[CheckRange] {
        &self.ranges
    }

    /// Run every range that is due at `now`
    ///
    /// A failing range is logged and skipped; its `last_checked` stays put so
    /// it is retried on the next tick. Errors are only returned when the cache
    /// or state cannot be written.
    pub async fn tick<F: PageFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
        now: DateTime<Utc>,
    ) -> Result<TickReport> {
        let mut report = TickReport::default();
        let ranges = self.ranges.clone();

        for range in &ranges {
            if !self.state.is_due(range, now) {
                debug!(kind = %self.ctx.kind, range = %range.name, "Range not due");
                continue;
            }

            info!(
                kind = %self.ctx.kind,
                range = %range.name,
                pages = %range.pages,
                "Checking range"
            );
            let result = self.scan(fetcher, range).await;

            // Partial progress of a failed scan is kept as well
            if self.store.is_dirty() {
                report.store_changed = true;
                self.save_store()?;
            }

            match result {
                Ok(outcome) => {
                    info!(
                        kind = %self.ctx.kind,
                        range = %range.name,
                        pages = outcome.pages_checked,
                        new = outcome.new_ids,
                        moved = outcome.moved_ids,
                        removed = outcome.removed_ids,
                        "Range checked"
                    );
                    report.record(&outcome);
                    report.scanned.push(range.name.clone());

                    for other in &ranges {
                        if other.name == range.name || self.covers(&outcome, other) {
                            self.state.mark(&other.name, now);
                        }
                    }
                    self.save_state()?;
                }
                Err(ScanError::Interrupted) => {
                    info!(kind = %self.ctx.kind, range = %range.name, "Range check interrupted");
                    report.interrupted = true;
                    break;
                }
                Err(e) => {
                    warn!(kind = %self.ctx.kind, range = %range.name, error = %e, "Range check failed");
                    report.failed.push(range.name.clone());
                }
            }
        }

        Ok(report)
    }

    /// Walk both listings to the depth of `range`
    ///
    /// The `all` depth is a [`Reconciler::full_rebuild`].
    pub async fn scan<F: PageFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
        range: &CheckRange,
    ) -> Result<ScanOutcome, ScanError> {
        let Some(depth) = range.pages.pages() else {
            return self.full_rebuild(fetcher).await;
        };

        let mut categories = Vec::with_capacity(SCAN_ORDER.len());
        for category in SCAN_ORDER {
            let planned = self.planned_depth(category, depth);
            let progress = walk(&self.ctx, fetcher, &mut self.store, category, Some(planned)).await?;
            categories.push(progress);
        }

        Ok(ScanOutcome::from_categories(categories))
    }

    /// Walk every page of both listings into a fresh set and swap it in
    ///
    /// IDs that disappeared from the listings are dropped. If the walk fails,
    /// whatever it found is merged into the current set instead.
    pub async fn full_rebuild<F: PageFetcher + ?Sized>(
        &mut self,
        fetcher: &mut F,
    ) -> Result<ScanOutcome, ScanError> {
        info!(kind = %self.ctx.kind, "Starting full rebuild");

        let mut fresh = IdStore::empty(self.store.path());
        let mut categories = Vec::with_capacity(SCAN_ORDER.len());

        for category in SCAN_ORDER {
            match walk(&self.ctx, fetcher, &mut fresh, category, None).await {
                Ok(progress) => categories.push(progress),
                Err(e) => {
                    let merged = self.store.merge(&fresh);
                    warn!(
                        kind = %self.ctx.kind,
                        merged = merged,
                        error = %e,
                        "Full rebuild incomplete, keeping existing IDs"
                    );
                    return Err(e);
                }
            }
        }

        let stats = self.store.replace_with(fresh);
        if stats.moved > 0 && self.ctx.policy == CategoryChangePolicy::Warn {
            warn!(kind = %self.ctx.kind, moved = stats.moved, "IDs changed category during full rebuild");
        }

        let mut outcome = ScanOutcome::from_categories(categories);
        outcome.new_ids = stats.added;
        outcome.moved_ids = stats.moved;
        outcome.removed_ids = stats.removed;
        outcome.full_rebuild = true;
        Ok(outcome)
    }

    /// Mark every range as checked at `at`
    pub fn force_state(&mut self, at: DateTime<Utc>) {
        self.state.force_all(&self.ranges, at);
    }

    /// Write the cache (if changed) and the state
    pub fn persist(&mut self) -> Result<()> {
        if self.store.is_dirty() {
            self.save_store()?;
        }
        self.save_state()
    }

    /// Pages to walk in `category` for a range `depth` pages deep
    fn planned_depth(&self, category: Category, depth: u32) -> u32 {
        match category {
            Category::Sfw => depth,
            Category::Nsfw => depth.div_ceil(self.nsfw_depth_divisor).max(1),
        }
    }

    /// Whether `outcome` walked at least as deep as `range` asks for
    fn covers(&self, outcome: &ScanOutcome, range: &CheckRange) -> bool {
        if outcome.full_rebuild {
            return true;
        }
        let Some(depth) = range.pages.pages() else {
            return false;
        };
        !outcome.categories.is_empty()
            && outcome.categories.iter().all(|c| {
                let planned = PageDepth::Pages(self.planned_depth(c.category, depth));
                c.exhausted || planned.covered_by(c.pages_checked)
            })
    }

    fn save_store(&mut self) -> Result<()> {
        if self.dry_run {
            info!(
                kind = %self.ctx.kind,
                path = %self.store.path().display(),
                sfw = self.store.count(Category::Sfw),
                nsfw = self.store.count(Category::Nsfw),
                "[Dry Run] Would save cache"
            );
            return Ok(());
        }
        self.store.save()
    }

    fn save_state(&self) -> Result<()> {
        if self.dry_run {
            debug!(kind = %self.ctx.kind, "[Dry Run] Would save state");
            return Ok(());
        }
        self.state.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedFetcher;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    /// `pages` pages of two IDs each, counting down from `top`
    fn descending(top: u32, pages: u32) -> Vec<Vec<u32>> {
        (0..pages)
            .map(|p| vec![top - 2 * p, top - 2 * p - 1])
            .collect()
    }

    fn shallow() -> CheckRange {
        CheckRange::new("shallow", PageDepth::Pages(2), 1800)
    }

    fn deep() -> CheckRange {
        CheckRange::new("deep", PageDepth::Pages(8), 28800)
    }

    fn full() -> CheckRange {
        CheckRange::new("full", PageDepth::All, 1296000)
    }

    struct Fixture {
        dir: TempDir,
        paths: DataPaths,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let paths = DataPaths::new(dir.path(), dir.path().join("cache"));
            Self { dir, paths }
        }

        /// Store already containing every ID of the given listings
        fn seeded_store(&self, listings: &[(Category, &Vec<Vec<u32>>)]) -> IdStore {
            let mut store = IdStore::empty(self.paths.cache_file(EntryKind::Anime));
            for (category, pages) in listings {
                for id in pages.iter().flatten() {
                    store.upsert(*id, *category);
                }
            }
            store.save().unwrap();
            store
        }

        fn reconciler(&self, store: IdStore, ranges: Vec<CheckRange>) -> Reconciler {
            self.reconciler_with(store, ranges, PollingConfig::default(), StopSignal::new())
        }

        fn reconciler_with(
            &self,
            store: IdStore,
            ranges: Vec<CheckRange>,
            polling: PollingConfig,
            stop: StopSignal,
        ) -> Reconciler {
            let state = StateTracker::empty(self.paths.state_file(EntryKind::Anime));
            Reconciler::new(EntryKind::Anime, store, state, ranges, &polling, stop)
        }

        fn empty_store(&self) -> IdStore {
            IdStore::empty(self.paths.cache_file(EntryKind::Anime))
        }
    }

    #[test]
    fn test_extend_depth() {
        assert_eq!(extend_depth(2, 1), 6);
        assert_eq!(extend_depth(6, 1), 6);
        assert_eq!(extend_depth(6, 2), 7);
        assert_eq!(extend_depth(8, 10), 17);
        assert_eq!(extend_depth(20, 3), 20);
        assert_eq!(extend_depth(1, u32::MAX), u32::MAX);
    }

    #[test]
    fn test_extend_depth_never_shrinks() {
        for bound in 1..60 {
            for page in 1..60 {
                let extended = extend_depth(bound, page);
                assert!(extended >= bound);
                assert!(extended >= page + 5 + page / 5);
                assert_eq!(extend_depth(extended, page), extended);
            }
        }
    }

    #[test]
    fn test_ranges_sorted_deepest_first() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(fx.empty_store(), vec![shallow(), full(), deep()]);
        let names: Vec<&str> = reconciler.ranges().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["full", "deep", "shallow"]);
    }

    #[tokio::test]
    async fn test_new_id_on_first_page_extends_shallow_range() {
        let fx = Fixture::new();
        let mut listing = vec![vec![500]];
        let known = descending(499, 9);
        listing.extend(known.iter().cloned());
        let store = fx.seeded_store(&[(Category::Sfw, &known)]);

        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, listing);
        let mut reconciler = fx.reconciler(store, vec![shallow()]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        // Page 1 held a new ID: 1 + 5 + 0 = 6 pages
        assert_eq!(fetcher.pages_requested(Category::Sfw), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(fetcher.pages_requested(Category::Nsfw), vec![1]);
        assert_eq!(report.scanned, vec!["shallow"]);
        assert_eq!(report.new_ids, 1);
        assert!(report.store_changed);
        assert_eq!(reconciler.store().contains(500), Some(Category::Sfw));
        assert_eq!(reconciler.state().last_checked("shallow"), Some(t0()));

        let on_disk = IdStore::load(fx.paths.cache_file(EntryKind::Anime)).unwrap();
        assert_eq!(on_disk.contains(500), Some(Category::Sfw));
        let state = StateTracker::load(fx.paths.state_file(EntryKind::Anime)).unwrap();
        assert_eq!(state.last_checked("shallow"), Some(t0()));
    }

    #[tokio::test]
    async fn test_extended_walk_stops_at_end_of_listing() {
        let fx = Fixture::new();
        let mut fetcher =
            ScriptedFetcher::new().with_pages(Category::Sfw, vec![vec![30, 29], vec![28], vec![27]]);
        let mut reconciler = fx.reconciler(fx.empty_store(), vec![shallow()]);

        let outcome = reconciler.scan(&mut fetcher, &shallow()).await.unwrap();

        assert_eq!(fetcher.pages_requested(Category::Sfw), vec![1, 2, 3, 4]);
        assert_eq!(outcome.new_ids, 4);
        assert_eq!(outcome.deepest_page, 4);
        let sfw = outcome.categories.iter().find(|c| c.category == Category::Sfw).unwrap();
        assert!(sfw.exhausted);
    }

    #[tokio::test]
    async fn test_known_ids_keep_planned_depth() {
        let fx = Fixture::new();
        let listing = descending(200, 20);
        let store = fx.seeded_store(&[(Category::Sfw, &listing)]);
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, listing);
        let mut reconciler = fx.reconciler(store, vec![shallow()]);

        let outcome = reconciler.scan(&mut fetcher, &shallow()).await.unwrap();

        assert_eq!(fetcher.pages_requested(Category::Sfw), vec![1, 2]);
        assert_eq!(outcome.new_ids, 0);
        assert!(!reconciler.store().is_dirty());
    }

    #[tokio::test]
    async fn test_failure_keeps_found_ids_and_state() {
        let fx = Fixture::new();
        let range = CheckRange::new("medium", PageDepth::Pages(5), 3600);
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, descending(100, 5))
            .failing_at(Category::Sfw, 2);
        let mut reconciler = fx.reconciler(fx.empty_store(), vec![range]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.failed, vec!["medium"]);
        assert!(report.scanned.is_empty());
        assert!(report.store_changed);
        assert_eq!(reconciler.state().last_checked("medium"), None);

        let on_disk = IdStore::load(fx.paths.cache_file(EntryKind::Anime)).unwrap();
        assert_eq!(on_disk.ids(Category::Sfw), vec![99, 100]);
        assert!(!fx.paths.state_file(EntryKind::Anime).exists());
    }

    #[tokio::test]
    async fn test_scan_is_idempotent() {
        let fx = Fixture::new();
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, descending(50, 3))
            .with_pages(Category::Nsfw, vec![vec![7]]);
        let mut reconciler = fx.reconciler(fx.empty_store(), vec![shallow()]);

        let first = reconciler.scan(&mut fetcher, &shallow()).await.unwrap();
        reconciler.persist().unwrap();
        let sfw_after_first = reconciler.store().ids(Category::Sfw);

        let second = reconciler.scan(&mut fetcher, &shallow()).await.unwrap();

        assert_eq!(first.new_ids, 7);
        assert_eq!(second.new_ids, 0);
        assert_eq!(second.moved_ids, 0);
        assert!(!reconciler.store().is_dirty());
        assert_eq!(reconciler.store().ids(Category::Sfw), sfw_after_first);
    }

    #[tokio::test]
    async fn test_deep_scan_covers_shallow_range() {
        let fx = Fixture::new();
        let listing = descending(300, 30);
        let store = fx.seeded_store(&[(Category::Sfw, &listing)]);
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, listing);
        let mut reconciler = fx.reconciler(store, vec![shallow(), deep()]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.scanned, vec!["deep"]);
        assert_eq!(fetcher.pages_requested(Category::Sfw), (1..=8).collect::<Vec<_>>());
        assert_eq!(reconciler.state().last_checked("deep"), Some(t0()));
        assert_eq!(reconciler.state().last_checked("shallow"), Some(t0()));
        assert!(!report.store_changed);

        // Only the shallow range is due half an hour later
        fetcher.requests.clear();
        let later = t0() + Duration::seconds(1800);
        let report = reconciler.tick(&mut fetcher, later).await.unwrap();
        assert_eq!(report.scanned, vec!["shallow"]);
        assert_eq!(fetcher.pages_requested(Category::Sfw), vec![1, 2]);
        assert_eq!(reconciler.state().last_checked("deep"), Some(t0()));
        assert_eq!(reconciler.state().last_checked("shallow"), Some(later));
    }

    #[tokio::test]
    async fn test_extended_shallow_scan_covers_medium_range() {
        let fx = Fixture::new();
        let medium = CheckRange::new("medium", PageDepth::Pages(6), 28800);
        let mut listing = vec![vec![500]];
        let known = descending(499, 9);
        listing.extend(known.iter().cloned());
        let store = fx.seeded_store(&[(Category::Sfw, &known)]);
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, listing);
        let mut reconciler = fx.reconciler(store, vec![shallow(), medium]);

        // Shallow is due, medium is not
        reconciler.force_state(t0() - Duration::seconds(3600));
        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.scanned, vec!["shallow"]);
        assert_eq!(fetcher.pages_requested(Category::Sfw), (1..=6).collect::<Vec<_>>());
        assert_eq!(reconciler.state().last_checked("shallow"), Some(t0()));
        assert_eq!(reconciler.state().last_checked("medium"), Some(t0()));
    }

    #[tokio::test]
    async fn test_nothing_due_makes_no_requests() {
        let fx = Fixture::new();
        let mut fetcher = ScriptedFetcher::new();
        let mut reconciler = fx.reconciler(fx.empty_store(), vec![shallow(), deep()]);
        reconciler.force_state(t0());

        let report = reconciler.tick(&mut fetcher, t0() + Duration::seconds(60)).await.unwrap();

        assert!(fetcher.requests.is_empty());
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_failed_range_does_not_block_others() {
        let fx = Fixture::new();
        let listing = descending(300, 30);
        let store = fx.seeded_store(&[(Category::Sfw, &listing)]);
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, listing)
            .failing_at(Category::Sfw, 5);
        let mut reconciler = fx.reconciler(store, vec![shallow(), deep()]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.failed, vec!["deep"]);
        assert_eq!(report.scanned, vec!["shallow"]);
        assert_eq!(reconciler.state().last_checked("deep"), None);
        assert_eq!(reconciler.state().last_checked("shallow"), Some(t0()));
    }

    #[tokio::test]
    async fn test_full_rebuild_drops_deleted_ids() {
        let fx = Fixture::new();
        let mut store = fx.empty_store();
        for id in [1, 2, 3] {
            store.upsert(id, Category::Sfw);
        }
        store.upsert(4, Category::Nsfw);

        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, vec![vec![4, 3], vec![1]])
            .with_pages(Category::Nsfw, vec![vec![5]]);
        let mut reconciler = fx.reconciler(store, vec![full()]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.scanned, vec!["full"]);
        assert_eq!(report.new_ids, 1);
        assert_eq!(report.moved_ids, 1);
        assert_eq!(report.removed_ids, 1);
        assert_eq!(reconciler.store().ids(Category::Sfw), vec![1, 3, 4]);
        assert_eq!(reconciler.store().ids(Category::Nsfw), vec![5]);
        assert_eq!(fetcher.pages_requested(Category::Sfw), vec![1, 2, 3]);
        assert_eq!(reconciler.state().last_checked("full"), Some(t0()));
    }

    #[tokio::test]
    async fn test_full_rebuild_matches_incremental_scan() {
        let fx = Fixture::new();
        let sfw = descending(80, 4);
        let nsfw = vec![vec![90, 85], vec![81]];

        let mut incremental = fx.reconciler(fx.empty_store(), vec![deep()]);
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, sfw.clone())
            .with_pages(Category::Nsfw, nsfw.clone());
        incremental.scan(&mut fetcher, &deep()).await.unwrap();

        let mut rebuilt = fx.reconciler(fx.empty_store(), vec![full()]);
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, sfw)
            .with_pages(Category::Nsfw, nsfw);
        rebuilt.full_rebuild(&mut fetcher).await.unwrap();

        for category in Category::ALL {
            assert_eq!(incremental.store().ids(category), rebuilt.store().ids(category));
        }
    }

    #[tokio::test]
    async fn test_failed_full_rebuild_merges_partial_results() {
        let fx = Fixture::new();
        let mut store = fx.empty_store();
        store.upsert(1, Category::Sfw);
        store.upsert(2, Category::Sfw);

        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, vec![vec![9, 8], vec![7]])
            .with_pages(Category::Nsfw, vec![vec![5]])
            .failing_at(Category::Sfw, 2);
        let mut reconciler = fx.reconciler(store, vec![full()]);

        let err = reconciler.full_rebuild(&mut fetcher).await.unwrap_err();

        assert!(matches!(
            err,
            ScanError::Fetch {
                category: Category::Sfw,
                page: 2,
                ..
            }
        ));
        assert_eq!(reconciler.store().ids(Category::Sfw), vec![1, 2, 8, 9]);
        assert_eq!(reconciler.store().ids(Category::Nsfw), vec![5]);
    }

    #[tokio::test]
    async fn test_full_tier_covers_every_range() {
        let fx = Fixture::new();
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, vec![vec![3, 2, 1]]);
        let mut reconciler = fx.reconciler(fx.empty_store(), vec![shallow(), deep(), full()]);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.scanned, vec!["full"]);
        for name in ["full", "deep", "shallow"] {
            assert_eq!(reconciler.state().last_checked(name), Some(t0()));
        }
    }

    #[tokio::test]
    async fn test_stop_before_tick_fetches_nothing() {
        let fx = Fixture::new();
        let stop = StopSignal::new();
        stop.raise();
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, descending(10, 2));
        let mut reconciler =
            fx.reconciler_with(fx.empty_store(), vec![shallow()], PollingConfig::default(), stop);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert!(report.interrupted);
        assert!(fetcher.requests.is_empty());
        assert_eq!(reconciler.state().last_checked("shallow"), None);
    }

    #[tokio::test]
    async fn test_stop_mid_scan_keeps_progress() {
        let fx = Fixture::new();
        let stop = StopSignal::new();
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Nsfw, vec![vec![42]])
            .with_pages(Category::Sfw, descending(10, 4))
            .raising_after(1, stop.clone());
        let mut reconciler =
            fx.reconciler_with(fx.empty_store(), vec![shallow(), deep()], PollingConfig::default(), stop);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert!(report.interrupted);
        assert!(report.scanned.is_empty());
        assert_eq!(fetcher.requests, vec![(Category::Nsfw, 1)]);
        assert_eq!(reconciler.state().last_checked("deep"), None);

        let on_disk = IdStore::load(fx.paths.cache_file(EntryKind::Anime)).unwrap();
        assert_eq!(on_disk.contains(42), Some(Category::Nsfw));
    }

    #[tokio::test]
    async fn test_category_change_moves_id_under_both_policies() {
        for policy in [CategoryChangePolicy::Migrate, CategoryChangePolicy::Warn] {
            let fx = Fixture::new();
            let mut store = fx.empty_store();
            store.upsert(5, Category::Sfw);

            let mut fetcher = ScriptedFetcher::new().with_pages(Category::Nsfw, vec![vec![5]]);
            let polling = PollingConfig {
                on_category_change: policy,
                ..PollingConfig::default()
            };
            let mut reconciler =
                fx.reconciler_with(store, vec![shallow()], polling, StopSignal::new());

            let outcome = reconciler.scan(&mut fetcher, &shallow()).await.unwrap();

            assert_eq!(outcome.new_ids, 0);
            assert_eq!(outcome.moved_ids, 1);
            assert_eq!(reconciler.store().contains(5), Some(Category::Nsfw));
            // A moved ID is not new, so the walk is not extended
            assert_eq!(fetcher.pages_requested(Category::Nsfw), vec![1, 2]);
        }
    }

    #[tokio::test]
    async fn test_nsfw_depth_divisor() {
        let fx = Fixture::new();
        let sfw = descending(500, 20);
        let nsfw = descending(900, 20);
        let store = fx.seeded_store(&[(Category::Sfw, &sfw), (Category::Nsfw, &nsfw)]);
        let mut fetcher = ScriptedFetcher::new()
            .with_pages(Category::Sfw, sfw)
            .with_pages(Category::Nsfw, nsfw);
        let polling = PollingConfig {
            nsfw_depth_divisor: 3,
            ..PollingConfig::default()
        };
        let mut reconciler = fx.reconciler_with(store, vec![deep()], polling, StopSignal::new());

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(fetcher.pages_requested(Category::Nsfw), vec![1, 2, 3]);
        assert_eq!(fetcher.pages_requested(Category::Sfw), (1..=8).collect::<Vec<_>>());
        assert_eq!(report.scanned, vec!["deep"]);
        assert_eq!(reconciler.state().last_checked("deep"), Some(t0()));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let fx = Fixture::new();
        let mut fetcher = ScriptedFetcher::new().with_pages(Category::Sfw, vec![vec![3, 2, 1]]);
        let mut reconciler = fx
            .reconciler(fx.empty_store(), vec![shallow()])
            .with_dry_run(true);

        let report = reconciler.tick(&mut fetcher, t0()).await.unwrap();

        assert_eq!(report.new_ids, 3);
        assert_eq!(reconciler.state().last_checked("shallow"), Some(t0()));
        assert!(!fx.paths.cache_file(EntryKind::Anime).exists());
        assert!(!fx.paths.state_file(EntryKind::Anime).exists());
        assert!(fx.dir.path().exists());
    }
}
