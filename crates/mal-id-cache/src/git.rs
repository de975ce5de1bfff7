//! Commits and pushes changed cache files.

use anyhow::{bail, Context, Result};
use shared::config::GitConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Git working copy holding the cache files
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
    remote: String,
    message: String,
}

impl GitRepo {
    pub fn new(dir: impl AsRef<Path>, remote: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            remote: remote.into(),
            message: message.into(),
        }
    }

    pub fn from_config(dir: impl AsRef<Path>, config: &GitConfig) -> Self {
        Self::new(dir, config.remote.clone(), config.commit_message.clone())
    }

    /// Which of `paths` differ from HEAD, relative to the repository
    pub fn changed_files(&self, paths: &[PathBuf]) -> Result<Vec<String>> {
        let relative = self.relative_paths(paths);
        let mut args = vec![
            "status".to_string(),
            "--porcelain".to_string(),
            "--untracked-files=all".to_string(),
            "--".to_string(),
        ];
        args.extend(relative);

        let stdout = self.git(&args)?;
        Ok(parse_porcelain(&stdout))
    }

    /// Stage and commit whichever of `paths` changed
    ///
    /// Returns `false` without committing when nothing changed.
    pub fn commit_changes(&self, paths: &[PathBuf]) -> Result<bool> {
        let changed = self.changed_files(paths)?;
        if changed.is_empty() {
            debug!(dir = %self.dir.display(), "No cache changes to commit");
            return Ok(false);
        }

        debug!(files = ?changed, "Cache files modified");
        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(changed.iter().cloned());
        self.git(&add)?;

        self.git(&["commit".to_string(), "-m".to_string(), self.message.clone()])?;
        info!(files = changed.len(), message = %self.message, "Committed cache updates");
        Ok(true)
    }

    /// Whether the branch holds commits its upstream lacks
    ///
    /// A branch without an upstream is never ahead.
    pub fn is_ahead(&self) -> Result<bool> {
        let stdout = self.git(&[
            "status".to_string(),
            "--porcelain=v2".to_string(),
            "--branch".to_string(),
            "--untracked-files=no".to_string(),
        ])?;
        Ok(parse_ahead(&stdout).is_some_and(|ahead| ahead > 0))
    }

    /// Push the current branch to the configured remote
    pub fn push(&self) -> Result<()> {
        self.git(&["push".to_string(), self.remote.clone()])?;
        info!(remote = %self.remote, "Pushed cache updates");
        Ok(())
    }

    fn relative_paths(&self, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| {
                p.strip_prefix(&self.dir)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    fn git(&self, args: &[String]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .context("Failed to execute git command")?;

        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Paths listed by `git status --porcelain`
fn parse_porcelain(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // Renames read "old -> new"
            match path.split_once(" -> ") {
                Some((_, new)) => new.to_string(),
                None => path.to_string(),
            }
        })
        .collect()
}

/// Commits ahead of upstream from `git status --porcelain=v2 --branch`
fn parse_ahead(stdout: &str) -> Option<u32> {
    let counts = stdout
        .lines()
        .find_map(|line| line.strip_prefix("# branch.ab "))?;
    counts
        .split_whitespace()
        .find_map(|count| count.strip_prefix('+'))
        .and_then(|ahead| ahead.parse().ok())
}
