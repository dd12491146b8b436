// src/config.rs

//! Run settings.
//!
//! Loaded from, lowest priority first:
//! - built-in defaults
//! - a TOML file (`--config`, or `.arbor.toml` at the repository root)
//! - command-line flags (applied by the CLI)
//!
//! The file is read once, before any commit is checked out.

use crate::counter::{Metric, Scc, DEFAULT_EXCLUDE_DIRS};
use crate::error::{ArborError, Result};
use crate::renderer::ReportFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = ".arbor.toml";
pub const DEFAULT_OUTPUT: &str = "loc_analysis.html";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Line counter executable
    pub analyzer: String,
    /// Extra arguments placed before the analyzer's own
    pub analyzer_args: Vec<String>,
    /// Subpaths excluded from counting, relative to the repository root
    pub exclude_dirs: Vec<String>,
    /// Per-commit analyzer timeout; 0 disables it
    pub timeout_secs: u64,
    pub metric: Metric,
    pub output: PathBuf,
    pub format: ReportFormat,
    pub max_commits: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analyzer: "scc".to_string(),
            analyzer_args: Vec::new(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 300,
            metric: Metric::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            format: ReportFormat::default(),
            max_commits: None,
        }
    }
}

impl Config {
    /// Load `explicit` if given (it must exist), otherwise the repository's
    /// `.arbor.toml` if there is one, otherwise defaults.
    pub fn load(repo_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = repo_root.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content =
            std::fs::read_to_string(&path).map_err(|source| ArborError::ConfigUnreadable {
                path: path.clone(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ArborError::Config {
            path: path.clone(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// The scc counter these settings describe
    pub fn counter(&self) -> Scc {
        Scc::new(self.analyzer.clone())
            .with_leading_args(self.analyzer_args.clone())
            .with_timeout(self.timeout())
            .with_metric(self.metric)
    }
}
