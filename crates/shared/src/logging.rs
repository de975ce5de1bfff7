//! Tracing setup for the ID cache.
//!
//! Events go to stdout, to `<dir>/<file_prefix>.<date>` or to both. `RUST_LOG`
//! replaces the configured level when it is set.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Where and how much to log
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    /// Log files are named `<file_prefix>.YYYY-MM-DD`
    pub file_prefix: String,
    pub level: Level,
    pub console: bool,
    pub file: bool,
    /// Write the file sink as one JSON object per line
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/logs"),
            file_prefix: "mal-id-cache".to_string(),
            level: Level::INFO,
            console: true,
            file: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Our crates at `level`, the HTTP stack only from warnings up
    pub fn default_directives(&self) -> String {
        format!(
            "mal_id_cache={level},shared={level},hyper=warn,reqwest=warn,h2=warn",
            level = self.level
        )
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }
}

fn console_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stdout)
        .boxed()
}

fn file_layer<S>(dir: &Path, file_prefix: &str, json: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir, file_prefix);
    if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(appender)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(appender)
            .boxed()
    }
}

/// Install the global subscriber
///
/// Fails if the log directory cannot be created or a subscriber is already set.
pub fn init(config: LogConfig) -> Result<()> {
    let mut sinks = Vec::new();
    if config.console {
        sinks.push(console_layer());
    }
    if config.file {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("Failed to create log directory: {}", config.dir.display()))?;
        sinks.push(file_layer(&config.dir, &config.file_prefix, config.json));
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(config.filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(log_dir = %config.dir.display(), file = config.file, "Logging initialized");
    Ok(())
}
