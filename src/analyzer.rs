// src/analyzer.rs

use crate::counter::LineCounter;
use crate::error::{ArborError, Result};
use crate::model::*;
use crate::repo::{list_commits, GitRepository, RevisionBackend};
use crate::series;
use crate::worktree::{Restored, WorkingTree};
use git2::Oid;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Knobs for one traversal
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    /// Subpaths handed to the line counter as exclusions
    pub exclude_dirs: Vec<String>,
    /// Walk at most this many commits, newest first
    pub max_commits: Option<usize>,
    pub show_progress: bool,
    /// Print a line per measured commit to stdout (above the bar when it
    /// is drawn), and the measured count if restoration fails
    pub report_commits: bool,
}

/// A commit that was skipped, and why
#[derive(Debug)]
pub struct CommitFailure {
    pub commit: Oid,
    pub error: ArborError,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct Analysis {
    /// Oldest authored first
    pub commits: Vec<Commit>,
    pub languages: LanguageSet,
    pub matrix: SeriesMatrix,
    pub original: OriginalState,
    pub restored: Restored,
    pub failures: Vec<CommitFailure>,
    pub cancelled: bool,
}

impl Analysis {
    pub fn measured(&self) -> usize {
        self.commits.iter().filter(|c| c.languages().is_some()).count()
    }

    pub fn total(&self) -> usize {
        self.commits.len()
    }
}

/// Open the repository at `repo_path` and measure every commit.
pub fn analyze(
    repo_path: &Path,
    counter: &dyn LineCounter,
    options: &TraversalOptions,
    cancel: Option<&AtomicBool>,
) -> Result<Analysis> {
    let repo = GitRepository::open(repo_path)?;
    analyze_backend(&repo, counter, options, cancel)
}

/// Walk `backend`'s history: snapshot, checkout+measure each commit,
/// restore, then build the matrix.
///
/// A commit whose checkout or measurement fails is skipped and the walk
/// goes on. Only failing to snapshot, read history, or restore is an
/// error. Once the walk has started the original checkout is always
/// restored, however many commits failed. `cancel` is only checked
/// between commits.
pub fn analyze_backend<B: RevisionBackend>(
    backend: &B,
    counter: &dyn LineCounter,
    options: &TraversalOptions,
    cancel: Option<&AtomicBool>,
) -> Result<Analysis> {
    // 1. Remember what the user had checked out
    let mut tree = WorkingTree::snapshot(backend)?;
    let original = tree.original().clone();

    // 2. Read history in the backend's order
    let mut commits = list_commits(backend)?;
    if let Some(max) = options.max_commits {
        commits.truncate(max);
    }
    info!(
        "Found {} commits to analyze with {}",
        commits.len(),
        counter.name()
    );

    let bar = if options.show_progress {
        let bar = ProgressBar::new(commits.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    // 3. Checkout and measure each commit; failures only cost that commit
    let mut languages = LanguageSet::new();
    let mut failures = Vec::new();
    let mut cancelled = false;
    let mut measured = 0;
    let total = commits.len();

    for (index, commit) in commits.iter_mut().enumerate() {
        if cancelled || cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            cancelled = true;
            commit.record(Measurement::Skipped(SkipReason::Cancelled));
            continue;
        }

        bar.set_message(format!(
            "{} '{}' by {}",
            commit.short_id(),
            commit.summary(),
            commit.author
        ));

        let outcome = match tree.checkout(commit.id) {
            Err(error) => Err((SkipReason::Checkout(cause_chain(&error)), error)),
            Ok(()) => counter
                .measure(tree.path(), &options.exclude_dirs)
                .map_err(|source| {
                    let error = ArborError::MeasurementFailed {
                        commit: commit.id,
                        source,
                    };
                    (SkipReason::Measurement(cause_chain(&error)), error)
                }),
        };

        match outcome {
            Ok(counts) => {
                languages.extend(counts.keys().cloned());
                commit.record(Measurement::Measured(counts));
                measured += 1;
                if options.report_commits {
                    print_line(&bar, progress_line(index + 1, total, commit));
                }
            }
            Err((reason, error)) => {
                bar.suspend(|| warn!("Skipping {}: {}", commit.short_id(), cause_chain(&error)));
                commit.record(Measurement::Skipped(reason));
                failures.push(CommitFailure {
                    commit: commit.id,
                    error,
                });
            }
        }
        bar.inc(1);
    }
    if cancelled {
        bar.abandon_with_message("Cancelled");
    } else {
        bar.finish_with_message("Analysis complete");
    }

    // 4. Put the user's checkout back, no matter what happened above
    let restored = match tree.restore() {
        Ok(restored) => restored,
        Err(e) => {
            error!("{}", cause_chain(&e));
            if options.report_commits {
                println!(
                    "Measured {} of {} commits before restoration failed",
                    measured, total
                );
            }
            return Err(e);
        }
    };
    info!("Restored to {}", restored);

    // 5-6. Chronological order, then the dense projection
    series::sort_chronologically(&mut commits);
    debug_assert_eq!(languages, series::language_set(&commits));
    let matrix = series::aggregate(&commits, &languages);

    Ok(Analysis {
        commits,
        languages,
        matrix,
        original,
        restored,
        failures,
        cancelled,
    })
}

/// `Processed commit 3/10: 1a2b3c4d 'Fix parser' by Jane`
pub fn progress_line(position: usize, total: usize, commit: &Commit) -> String {
    format!(
        "Processed commit {}/{}: {} '{}' by {}",
        position,
        total,
        commit.short_id(),
        commit.summary(),
        commit.author
    )
}

fn print_line(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        println!("{}", line);
    } else {
        bar.println(line);
    }
}

/// `error: cause: cause` on one line
pub fn cause_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
