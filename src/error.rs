// src/error.rs

use git2::Oid;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while walking a repository's history.
///
/// `CheckoutFailed` and `MeasurementFailed` are per-commit and never abort a
/// run; the orchestrator records them and moves on. Everything else is
/// run-level.
#[derive(Debug, Error)]
pub enum ArborError {
    #[error("{} is not a git repository with a working directory", .path.display())]
    NotARepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("cannot resolve the current checkout (unborn branch?)")]
    StateUnreadable(#[source] git2::Error),

    #[error("failed to read commit history")]
    HistoryUnreadable(#[source] git2::Error),

    #[error("failed to checkout commit {commit}")]
    CheckoutFailed {
        commit: Oid,
        #[source]
        source: git2::Error,
    },

    #[error("failed to count lines of code at commit {commit}")]
    MeasurementFailed {
        commit: Oid,
        #[source]
        source: CountError,
    },

    /// Both the branch checkout (when there was a branch) and the fallback
    /// checkout of the original commit failed.
    #[error(
        "failed to restore original checkout {original}{}",
        .branch_error
            .as_ref()
            .map(|e| format!(" (branch checkout failed: {})", e.message()))
            .unwrap_or_default()
    )]
    RestoreFailed {
        original: String,
        branch_error: Option<git2::Error>,
        #[source]
        commit_error: git2::Error,
    },

    #[error("failed to read configuration from {}", .path.display())]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write report to {}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArborError {
    /// True for failures that only cost one commit's data.
    pub fn is_per_commit(&self) -> bool {
        matches!(
            self,
            ArborError::CheckoutFailed { .. } | ArborError::MeasurementFailed { .. }
        )
    }
}

/// Failures of the external line counter. Any of these makes the whole
/// measurement fail; there are no partial results.
#[derive(Debug, Error)]
pub enum CountError {
    #[error("{program} not found, please install it first")]
    AnalyzerUnavailable { program: String },

    #[error("{program} exited with status {status}: {stderr}")]
    AnalyzerFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to parse {program} output")]
    UnparseableOutput {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to run {program}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = ArborError> = std::result::Result<T, E>;
