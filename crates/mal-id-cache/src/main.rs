//! MAL ID cache CLI application.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use mal_id_cache::shutdown::install_signal_handlers;
use mal_id_cache::unapproved::REPORT_FILE;
use mal_id_cache::{
    GitRepo, IdStore, JikanClient, Reconciler, ReportFormat, ScanError, StateTracker,
    StopSignal, UnapprovedReport,
};
use shared::{Config, DataPaths, EntryKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Caches IDs for MyAnimeList", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Keep polling until stopped
    #[arg(long = "loop")]
    run_loop: bool,

    /// Log instead of writing cache files or committing
    #[arg(long)]
    dry_run: bool,

    /// Create the data and cache directories and exit
    #[arg(long)]
    init_dir: bool,

    /// Delete the cache and rebuild it from every page
    #[arg(long)]
    initialize: bool,

    /// Mark every range as checked this many seconds ago and exit
    #[arg(long, value_name = "SECS")]
    force_state: Option<u64>,

    /// Delete the cache and state files and exit
    #[arg(long)]
    delete: bool,

    /// Print entries not yet approved on MyAnimeList and exit
    #[arg(long, value_enum, value_name = "FORMAT")]
    unapproved: Option<ReportFormat>,

    /// Commit and push changed cache files after each round
    #[arg(long)]
    commit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level()
    };

    shared::logging::init(shared::LogConfig {
        dir: config.log_dir(),
        file_prefix: "mal-id-cache".to_string(),
        level: log_level,
        console: config.logging.console,
        file: config.logging.file,
        json: config.logging.json_format,
    })?;

    info!(config_file = %args.config.display(), dry_run = args.dry_run, "MAL ID cache starting");

    let paths = DataPaths::new(config.data_dir(), config.cache_dir());
    paths
        .create_dirs()
        .context("Failed to create data directories")?;

    if args.init_dir {
        info!(
            data_dir = %paths.root().display(),
            cache_dir = %paths.cache_dir().display(),
            "Created directories"
        );
        return Ok(());
    }

    if let Some(secs) = args.force_state {
        return force_state(&config, &paths, secs, args.dry_run);
    }

    if args.delete || args.initialize {
        delete_files(&paths, args.dry_run)?;
        if args.delete {
            return Ok(());
        }
    }

    let stop = StopSignal::new();
    let mut reconcilers = EntryKind::ALL
        .into_iter()
        .map(|kind| {
            Reconciler::load(kind, &config, &paths, stop.clone())
                .map(|r| r.with_dry_run(args.dry_run))
                .with_context(|| format!("Failed to load {} cache", kind))
        })
        .collect::<Result<Vec<_>>>()?;

    if let Some(format) = args.unapproved {
        return print_unapproved(&reconcilers, format);
    }

    let mut client = JikanClient::from_config(&config.jikan).context("Failed to create Jikan client")?;
    install_signal_handlers(stop.clone());

    let git = args
        .commit
        .then(|| GitRepo::from_config(config.repo_dir(), &config.git));

    if args.initialize {
        for reconciler in &mut reconcilers {
            initialize(reconciler, &mut client).await?;
            if stop.is_raised() {
                return Ok(());
            }
        }
        return commit(git.as_ref(), &paths, args.dry_run);
    }

    if !args.run_loop {
        info!("Checking if anything needs to be updated");
        run_round(&mut reconcilers, &mut client, &stop).await?;
        return commit(git.as_ref(), &paths, args.dry_run);
    }

    let period = Duration::from_secs(config.polling.loop_period_secs);
    info!(period_secs = period.as_secs(), "Starting loop");

    while !stop.is_raised() {
        if let Err(e) = run_round(&mut reconcilers, &mut client, &stop).await {
            error!(error = %e, "Round failed");
        }
        if let Err(e) = commit(git.as_ref(), &paths, args.dry_run) {
            error!(error = %e, "Failed to commit cache updates");
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = stop.raised() => {}
        }
    }

    info!("MAL ID cache stopped");
    Ok(())
}

/// Tick every entry kind once
async fn run_round(
    reconcilers: &mut [Reconciler],
    client: &mut JikanClient,
    stop: &StopSignal,
) -> Result<()> {
    for reconciler in reconcilers.iter_mut() {
        if stop.is_raised() {
            break;
        }

        let report = match reconciler.tick(client, Utc::now()).await {
            Ok(report) => report,
            Err(e) => {
                error!(kind = %reconciler.kind(), error = %e, "Tick failed");
                continue;
            }
        };
        if report.scanned.is_empty() && report.failed.is_empty() {
            continue;
        }

        info!(
            kind = %reconciler.kind(),
            scanned = ?report.scanned,
            failed = ?report.failed,
            new = report.new_ids,
            moved = report.moved_ids,
            removed = report.removed_ids,
            total = reconciler.store().len(),
            "Tick complete"
        );
    }

    info!(requests_last_minute = client.rate_limit_stats(), "Round complete");
    Ok(())
}

/// Rebuild one kind from scratch and mark every range as checked
async fn initialize(reconciler: &mut Reconciler, client: &mut JikanClient) -> Result<()> {
    let kind = reconciler.kind();
    match reconciler.full_rebuild(client).await {
        Ok(outcome) => {
            reconciler.force_state(Utc::now());
            reconciler.persist()?;
            info!(
                kind = %kind,
                pages = outcome.pages_checked,
                ids = reconciler.store().len(),
                "Cache initialized"
            );
            Ok(())
        }
        Err(e) => {
            // Keep whatever the rebuild found before stopping
            reconciler.persist()?;
            if matches!(e, ScanError::Interrupted) {
                info!(kind = %kind, ids = reconciler.store().len(), "Initialization interrupted");
                return Ok(());
            }
            Err(e).with_context(|| format!("Failed to initialize {} cache", kind))
        }
    }
}

/// Commit and push the cache files when `git` is set
fn commit(git: Option<&GitRepo>, paths: &DataPaths, dry_run: bool) -> Result<()> {
    let Some(git) = git else {
        return Ok(());
    };

    let files: Vec<PathBuf> = EntryKind::ALL
        .into_iter()
        .map(|kind| paths.cache_file(kind))
        .collect();

    if dry_run {
        let changed = git.changed_files(&files)?;
        info!(files = ?changed, "[Dry Run] Would commit and push");
        return Ok(());
    }

    // A push that failed in an earlier round is retried here
    let committed = git.commit_changes(&files)?;
    if committed || git.is_ahead()? {
        git.push()?;
    }
    Ok(())
}

fn force_state(config: &Config, paths: &DataPaths, secs: u64, dry_run: bool) -> Result<()> {
    let ago = i64::try_from(secs).context("--force-state is out of range")?;
    let Some(at) = chrono::Duration::try_seconds(ago).and_then(|d| Utc::now().checked_sub_signed(d)) else {
        bail!("--force-state {} is too far in the past", secs);
    };

    for kind in EntryKind::ALL {
        let mut state = StateTracker::load(paths.state_file(kind))?;
        state.force_all(&config.kind(kind).ranges, at);

        if dry_run {
            info!(kind = %kind, at = %at, "[Dry Run] Would set every range as checked");
            continue;
        }
        state.save()?;
        info!(kind = %kind, at = %at, "Set every range as checked");
    }
    Ok(())
}

fn delete_files(paths: &DataPaths, dry_run: bool) -> Result<()> {
    for kind in EntryKind::ALL {
        let cache = paths.cache_file(kind);
        let state = paths.state_file(kind);

        if dry_run {
            info!(cache = %cache.display(), state = %state.display(), "[Dry Run] Would delete");
            continue;
        }

        log_deleted(&cache, IdStore::delete(&cache)?);
        log_deleted(&state, StateTracker::delete(&state)?);
    }
    Ok(())
}

fn log_deleted(path: &Path, existed: bool) {
    if existed {
        info!(path = %path.display(), "Deleted");
    } else {
        warn!(path = %path.display(), "Nothing to delete");
    }
}

fn print_unapproved(reconcilers: &[Reconciler], format: ReportFormat) -> Result<()> {
    let store = |kind: EntryKind| {
        reconcilers
            .iter()
            .find(|r| r.kind() == kind)
            .map(Reconciler::store)
            .with_context(|| format!("No {} cache loaded", kind))
    };
    let report = UnapprovedReport::from_stores(store(EntryKind::Anime)?, store(EntryKind::Manga)?);

    match format {
        ReportFormat::Count => print!("{}", report.render_count()),
        ReportFormat::Table => print!("{}", report.render_table()),
        ReportFormat::Json => {
            report.write_json(Path::new(REPORT_FILE))?;
            println!("Wrote results to '{}' in this directory.", REPORT_FILE);
        }
    }
    Ok(())
}
