// src/model.rs

use chrono::{DateTime, Utc};
use git2::Oid;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Number of hex characters used when a commit is shown to a person
pub const SHORT_ID_LEN: usize = 8;

/// Sparse per-commit counts: language name -> line count
pub type LanguageCounts = BTreeMap<String, u64>;

/// Every language seen in any measured commit. Ordered, so column order
/// is always lexicographic.
pub type LanguageSet = BTreeSet<String>;

pub fn short_id(id: Oid) -> String {
    let mut hex = id.to_string();
    hex.truncate(SHORT_ID_LEN);
    hex
}

/// What the user had checked out before the run started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalState {
    /// On a local branch; `refname` is the full reference name
    Branch { refname: String, commit: Oid },
    /// Detached HEAD
    Detached(Oid),
}

impl OriginalState {
    /// The commit HEAD resolved to at snapshot time
    pub fn commit(&self) -> Oid {
        match self {
            OriginalState::Branch { commit, .. } => *commit,
            OriginalState::Detached(commit) => *commit,
        }
    }

    /// Branch name when on a branch, otherwise the short commit id
    pub fn label(&self) -> String {
        match self {
            OriginalState::Branch { refname, .. } => refname
                .strip_prefix("refs/heads/")
                .unwrap_or(refname)
                .to_string(),
            OriginalState::Detached(commit) => short_id(*commit),
        }
    }
}

/// Why a commit carries no data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Checkout(String),
    Measurement(String),
    Cancelled,
}

/// Outcome of measuring one commit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Measurement {
    #[default]
    Pending,
    Measured(LanguageCounts),
    Skipped(SkipReason),
}

/// A commit read from history, plus its measurement once taken
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: Oid,
    pub message: String,
    pub author: String,
    pub authored_at: DateTime<Utc>,
    measurement: Measurement,
}

impl Commit {
    pub fn new(id: Oid, message: String, author: String, authored_at: DateTime<Utc>) -> Self {
        Self {
            id,
            message,
            author,
            authored_at,
            measurement: Measurement::Pending,
        }
    }

    pub fn short_id(&self) -> String {
        short_id(self.id)
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Counts, if this commit was measured successfully
    pub fn languages(&self) -> Option<&LanguageCounts> {
        match &self.measurement {
            Measurement::Measured(counts) => Some(counts),
            _ => None,
        }
    }

    /// Attach the outcome of this commit's checkout+measure. A commit is
    /// recorded at most once; later calls are ignored.
    pub fn record(&mut self, outcome: Measurement) -> bool {
        if self.measurement != Measurement::Pending {
            return false;
        }
        self.measurement = outcome;
        true
    }
}

/// One row of the dense matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesRow {
    pub short_id: String,
    pub id: String,
    pub author: String,
    pub authored_at: DateTime<Utc>,
    /// One count per matrix column, or `None` when the commit has no data
    pub counts: Option<Vec<u64>>,
}

/// Dense, time-ordered table: one row per commit, one column per language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesMatrix {
    pub languages: Vec<String>,
    pub rows: Vec<SeriesRow>,
}

impl SeriesMatrix {
    /// Short commit ids in row order (the chart's x axis)
    pub fn x_axis(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.short_id.as_str()).collect()
    }

    /// The column for `language`, with `None` where a commit has no data
    pub fn series(&self, language: &str) -> Option<Vec<Option<u64>>> {
        let column = self.languages.iter().position(|l| l == language)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.counts.as_ref().map(|c| c[column]))
                .collect(),
        )
    }

    pub fn measured_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.counts.is_some()).count()
    }
}
