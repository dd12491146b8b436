// src/repo.rs

//! Access to the repository being analyzed.
//!
//! [`RevisionBackend`] is the set of primitives the traversal needs from a
//! version-control system: resolve the current checkout, enumerate commits,
//! force a checkout by id, and check out a named branch. [`GitRepository`]
//! implements it on top of libgit2.

use crate::error::{ArborError, Result};
use crate::model::{Commit, OriginalState};
use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{Delta, Oid, Repository, Sort, Status, StatusOptions};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait RevisionBackend {
    /// Root of the working directory that checkouts write into
    fn workdir(&self) -> &Path;

    /// What HEAD points at right now
    fn current_state(&self) -> std::result::Result<OriginalState, git2::Error>;

    /// All commits reachable from HEAD, in the backend's native order
    fn commits(&self) -> std::result::Result<Vec<Commit>, git2::Error>;

    /// Make the working directory match `id` exactly, discarding local
    /// changes to tracked files, and detach HEAD there
    fn force_checkout(&self, id: Oid) -> std::result::Result<(), git2::Error>;

    /// Check out the branch `refname` (full reference name) and attach HEAD
    fn checkout_branch(&self, refname: &str) -> std::result::Result<(), git2::Error>;

    /// Whether tracked files differ from HEAD
    fn has_local_changes(&self) -> std::result::Result<bool, git2::Error> {
        Ok(false)
    }

    /// Untracked and ignored files in the working directory, relative to it
    fn untracked_paths(&self) -> std::result::Result<BTreeSet<PathBuf>, git2::Error> {
        Ok(BTreeSet::new())
    }

    /// Paths that `target`'s tree has and `base`'s tree lacks, i.e. the
    /// files a checkout from `base` to `target` would create
    fn paths_added(
        &self,
        _base: Oid,
        _target: Oid,
    ) -> std::result::Result<Vec<PathBuf>, git2::Error> {
        Ok(Vec::new())
    }
}

/// A git repository with a working directory
pub struct GitRepository {
    repo: Repository,
    root: PathBuf,
}

impl GitRepository {
    /// Open the repository rooted at `path`. Bare repositories are
    /// rejected since there is no working tree to measure.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|source| ArborError::NotARepository {
            path: path.to_path_buf(),
            source,
        })?;
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| ArborError::NotARepository {
                path: path.to_path_buf(),
                source: git2::Error::from_str("bare repository has no working directory"),
            })?;
        debug!("Opened git repository at {}", root.display());
        Ok(Self { repo, root })
    }

    fn force_checkout_object(&self, object: &git2::Object<'_>) -> std::result::Result<(), git2::Error> {
        let mut opts = CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_tree(object, Some(&mut opts))
    }
}

impl RevisionBackend for GitRepository {
    fn workdir(&self) -> &Path {
        &self.root
    }

    fn current_state(&self) -> std::result::Result<OriginalState, git2::Error> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?.id();
        match head.name() {
            Some(name) if head.is_branch() => Ok(OriginalState::Branch {
                refname: name.to_string(),
                commit,
            }),
            _ => Ok(OriginalState::Detached(commit)),
        }
    }

    fn commits(&self) -> std::result::Result<Vec<Commit>, git2::Error> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let author = commit.author();
            let authored_at =
                DateTime::<Utc>::from_timestamp(author.when().seconds(), 0).unwrap_or_default();
            commits.push(Commit::new(
                commit.id(),
                String::from_utf8_lossy(commit.message_bytes()).into_owned(),
                author.name().unwrap_or("Unknown").to_string(),
                authored_at,
            ));
        }
        Ok(commits)
    }

    fn force_checkout(&self, id: Oid) -> std::result::Result<(), git2::Error> {
        let commit = self.repo.find_commit(id)?;
        self.force_checkout_object(commit.as_object())?;
        self.repo.set_head_detached(id)
    }

    fn checkout_branch(&self, refname: &str) -> std::result::Result<(), git2::Error> {
        let reference = self.repo.find_reference(refname)?;
        if !reference.is_branch() {
            return Err(git2::Error::from_str(&format!("{} is not a local branch", refname)));
        }
        let commit = reference.peel_to_commit()?;
        self.force_checkout_object(commit.as_object())?;
        self.repo.set_head(refname)
    }

    fn has_local_changes(&self) -> std::result::Result<bool, git2::Error> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        Ok(!self.repo.statuses(Some(&mut opts))?.is_empty())
    }

    fn untracked_paths(&self) -> std::result::Result<BTreeSet<PathBuf>, git2::Error> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(true)
            .recurse_ignored_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .filter(|entry| entry.status().intersects(Status::WT_NEW | Status::IGNORED))
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .collect())
    }

    fn paths_added(
        &self,
        base: Oid,
        target: Oid,
    ) -> std::result::Result<Vec<PathBuf>, git2::Error> {
        let old = self.repo.find_commit(base)?.tree()?;
        let new = self.repo.find_commit(target)?.tree()?;
        let diff = self.repo.diff_tree_to_tree(Some(&old), Some(&new), None)?;
        Ok(diff
            .deltas()
            .filter(|delta| matches!(delta.status(), Delta::Added | Delta::Typechange))
            .filter_map(|delta| delta.new_file().path().map(Path::to_path_buf))
            .collect())
    }
}

/// Read the full commit list. The order is whatever the backend yields;
/// sorting for the report happens after measurement.
pub fn list_commits<B: RevisionBackend>(backend: &B) -> Result<Vec<Commit>> {
    backend.commits().map_err(ArborError::HistoryUnreadable)
}
