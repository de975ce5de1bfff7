//! Configuration management for the ID cache.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use crate::error::ConfigError;
use crate::models::EntryKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Jikan API settings
    pub jikan: JikanConfig,

    /// Cache file settings
    pub cache: CacheConfig,

    /// Polling loop settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Git persistence settings
    #[serde(default)]
    pub git: GitConfig,

    /// Check ranges for anime
    pub anime: KindConfig,

    /// Check ranges for manga
    pub manga: KindConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path (state files and logs)
    pub root_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Jikan API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JikanConfig {
    /// Jikan API base URL
    pub base_url: String,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,

    /// Maximum retries for failed requests
    pub max_retries: u32,

    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: f64,

    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

/// Cache file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `<kind>_cache.json` (relative to the git repo or absolute)
    pub cache_dir: String,
}

/// What to do when an ID reappears under the other category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CategoryChangePolicy {
    /// Move the ID silently
    #[default]
    Migrate,
    /// Move the ID and log a warning
    Warn,
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds to sleep between ticks in loop mode
    pub loop_period_secs: u64,

    /// NSFW listings are walked to `ceil(depth / divisor)` pages
    pub nsfw_depth_divisor: u32,

    /// Handling of IDs that switch category
    pub on_category_change: CategoryChangePolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            loop_period_secs: 300,
            nsfw_depth_divisor: 1,
            on_category_change: CategoryChangePolicy::Migrate,
        }
    }
}

/// Git persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Repository the cache files are committed to
    pub repo_dir: String,

    /// Remote to push to
    pub remote: String,

    /// Commit message for cache updates
    pub commit_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo_dir: ".".to_string(),
            remote: "origin".to_string(),
            commit_message: "cache updates".to_string(),
        }
    }
}

/// Per entry kind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindConfig {
    pub ranges: Vec<CheckRange>,
}

/// How many listing pages a check range walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPageDepth", into = "RawPageDepth")]
pub enum PageDepth {
    /// A fixed number of pages, at least one
    Pages(u32),
    /// Every page, triggering a full rebuild
    All,
}

impl PageDepth {
    /// Page bound, `None` for a full rebuild
    pub fn pages(&self) -> Option<u32> {
        match self {
            PageDepth::Pages(n) => Some(*n),
            PageDepth::All => None,
        }
    }

    /// Whether a scan that reached `page` satisfies this depth
    pub fn covered_by(&self, page: u32) -> bool {
        match self {
            PageDepth::Pages(n) => page >= *n,
            PageDepth::All => false,
        }
    }
}

impl std::fmt::Display for PageDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageDepth::Pages(n) => write!(f, "{}", n),
            PageDepth::All => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPageDepth {
    Pages(u32),
    Word(String),
}

impl TryFrom<RawPageDepth> for PageDepth {
    type Error = String;

    fn try_from(raw: RawPageDepth) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawPageDepth::Pages(0) => Err("page depth must be at least 1".to_string()),
            RawPageDepth::Pages(n) => Ok(PageDepth::Pages(n)),
            RawPageDepth::Word(w) if w == "all" => Ok(PageDepth::All),
            RawPageDepth::Word(w) => Err(format!("invalid page depth {:?}, expected a number or \"all\"", w)),
        }
    }
}

impl From<PageDepth> for RawPageDepth {
    fn from(depth: PageDepth) -> Self {
        match depth {
            PageDepth::Pages(n) => RawPageDepth::Pages(n),
            PageDepth::All => RawPageDepth::Word("all".to_string()),
        }
    }
}

/// A named polling tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRange {
    /// Name used as the key in the state file
    pub name: String,

    /// Pages to walk
    pub pages: PageDepth,

    /// Minimum seconds between two checks
    pub interval_secs: u64,
}

impl CheckRange {
    pub fn new(name: impl Into<String>, pages: PageDepth, interval_secs: u64) -> Self {
        Self {
            name: name.into(),
            pages,
            interval_secs,
        }
    }
}

impl KindConfig {
    /// Check that the tiers are totally ordered: deeper ranges are checked less often
    pub fn validate(&self, kind: EntryKind) -> std::result::Result<(), ConfigError> {
        if self.ranges.is_empty() {
            return Err(ConfigError::new(format!("no check ranges configured for {}", kind)));
        }

        let mut names = HashSet::new();
        for range in &self.ranges {
            if !names.insert(range.name.as_str()) {
                return Err(ConfigError::new(format!(
                    "duplicate check range name {:?} for {}",
                    range.name, kind
                )));
            }
            if range.interval_secs == 0 {
                return Err(ConfigError::new(format!(
                    "check range {:?} for {} has a zero interval",
                    range.name, kind
                )));
            }
        }

        let mut sorted: Vec<&CheckRange> = self.ranges.iter().collect();
        sorted.sort_by_key(|r| r.pages);
        for pair in sorted.windows(2) {
            let (shallow, deep) = (pair[0], pair[1]);
            if shallow.pages == deep.pages {
                return Err(ConfigError::new(format!(
                    "check ranges {:?} and {:?} for {} have the same depth {}",
                    shallow.name, deep.name, kind, deep.pages
                )));
            }
            if shallow.interval_secs > deep.interval_secs {
                return Err(ConfigError::new(format!(
                    "check range {:?} ({} pages) for {} is checked less often than the deeper {:?} ({} pages)",
                    shallow.name, shallow.pages, kind, deep.name, deep.pages
                )));
            }
        }

        Ok(())
    }
}

/// Default polling tiers, from every half hour down to a fortnightly rebuild
fn default_ranges() -> Vec<CheckRange> {
    vec![
        CheckRange::new("shallow", PageDepth::Pages(2), 60 * 30),
        CheckRange::new("medium", PageDepth::Pages(8), 60 * 60 * 8),
        CheckRange::new("deep", PageDepth::Pages(20), 60 * 60 * 24 * 2),
        CheckRange::new("full", PageDepth::All, 60 * 60 * 24 * 15),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            jikan: JikanConfig {
                base_url: "https://api.jikan.moe/v4".to_string(),
                rate_limit: RateLimitConfig {
                    requests_per_second: 1.0,
                    requests_per_minute: 50,
                },
                max_retries: 5,
                retry_delay_ms: 2000,
            },
            cache: CacheConfig {
                cache_dir: "cache".to_string(),
            },
            polling: PollingConfig::default(),
            git: GitConfig::default(),
            anime: KindConfig {
                ranges: default_ranges(),
            },
            manga: KindConfig {
                ranges: default_ranges(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::new(e.to_string()))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Validate every section that has cross-field constraints
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for kind in EntryKind::ALL {
            self.kind(kind).validate(kind)?;
        }
        if self.polling.nsfw_depth_divisor == 0 {
            return Err(ConfigError::new("polling.nsfw_depth_divisor must be at least 1"));
        }
        let rps = self.jikan.rate_limit.requests_per_second;
        if !(rps > 0.0) || !rps.is_finite() {
            return Err(ConfigError::new(
                "jikan.rate_limit.requests_per_second must be a positive number",
            ));
        }
        if self.jikan.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::new("jikan.rate_limit.requests_per_minute must be at least 1"));
        }
        Ok(())
    }

    /// Settings for one entry kind
    pub fn kind(&self, kind: EntryKind) -> &KindConfig {
        match kind {
            EntryKind::Anime => &self.anime,
            EntryKind::Manga => &self.manga,
        }
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        let log_path = Path::new(&self.logging.log_dir);
        if log_path.is_absolute() {
            log_path.to_path_buf()
        } else {
            self.data_dir().join(log_path)
        }
    }

    /// Get the path of the git repository holding the cache files
    pub fn repo_dir(&self) -> PathBuf {
        PathBuf::from(&self.git.repo_dir)
    }

    /// Get the absolute path for the cache directory
    pub fn cache_dir(&self) -> PathBuf {
        let cache_path = Path::new(&self.cache.cache_dir);
        if cache_path.is_absolute() {
            cache_path.to_path_buf()
        } else {
            self.repo_dir().join(cache_path)
        }
    }

    /// Parse the configured default log level
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}
