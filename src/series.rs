// src/series.rs

//! Turns per-commit sparse counts into the dense matrix the report draws.

use crate::model::{Commit, LanguageSet, SeriesMatrix, SeriesRow};

/// Union of every measured commit's languages
pub fn language_set(commits: &[Commit]) -> LanguageSet {
    commits
        .iter()
        .filter_map(Commit::languages)
        .flat_map(|counts| counts.keys().cloned())
        .collect()
}

/// Oldest authored first. Stable, so commits sharing a timestamp keep
/// their relative order.
pub fn sort_chronologically(commits: &mut [Commit]) {
    commits.sort_by_key(|c| c.authored_at);
}

/// Project `commits` (already sorted) onto the columns of `languages`.
///
/// Measured commits get a count for every column, zero where the language
/// wasn't seen. Commits without data get `counts: None` rather than a row
/// of zeros, so a failed measurement never looks like an empty tree.
pub fn aggregate(commits: &[Commit], languages: &LanguageSet) -> SeriesMatrix {
    debug_assert!(
        commits.windows(2).all(|w| w[0].authored_at <= w[1].authored_at),
        "commits must be sorted by author time"
    );
    debug_assert!(
        commits
            .iter()
            .filter_map(Commit::languages)
            .all(|counts| counts.keys().all(|k| languages.contains(k))),
        "language set must cover every commit"
    );

    let rows = commits
        .iter()
        .map(|commit| SeriesRow {
            short_id: commit.short_id(),
            id: commit.id.to_string(),
            author: commit.author.clone(),
            authored_at: commit.authored_at,
            counts: commit.languages().map(|counts| {
                languages
                    .iter()
                    .map(|lang| counts.get(lang).copied().unwrap_or(0))
                    .collect()
            }),
        })
        .collect();

    SeriesMatrix {
        languages: languages.iter().cloned().collect(),
        rows,
    }
}
