// src/worktree.rs

//! The working directory as a single-writer resource.
//!
//! A [`WorkingTree`] is created by snapshotting what the user had checked
//! out. From then on it is the only thing allowed to move HEAD: it checks
//! out commits one at a time and finally puts the original checkout back.
//! At any point the directory holds either the original checkout or
//! exactly one commit's tree.
//!
//! Untracked and ignored files present at snapshot time are never
//! overwritten: a commit whose tree would write over one of them is
//! refused instead of checked out.

use crate::error::{ArborError, Result};
use crate::model::{short_id, OriginalState};
use crate::repo::RevisionBackend;
use git2::Oid;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeState {
    Original,
    CheckedOut(Oid),
    Restored,
    RestoreFailed,
}

/// How the original checkout was put back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restored {
    /// Reattached to the original branch (short name)
    Branch(String),
    /// Checked out the original commit directly, HEAD detached
    Commit(Oid),
}

impl std::fmt::Display for Restored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Restored::Branch(name) => write!(f, "{}", name),
            Restored::Commit(id) => write!(f, "{} (detached)", short_id(*id)),
        }
    }
}

pub struct WorkingTree<'r, B: RevisionBackend> {
    backend: &'r B,
    original: OriginalState,
    state: TreeState,
    /// Untracked and ignored files the user had at snapshot time
    protected: BTreeSet<PathBuf>,
}

impl<'r, B: RevisionBackend> WorkingTree<'r, B> {
    /// Capture the current checkout. Must happen before any checkout.
    pub fn snapshot(backend: &'r B) -> Result<Self> {
        let original = backend
            .current_state()
            .map_err(ArborError::StateUnreadable)?;

        match backend.has_local_changes() {
            Ok(true) => warn!(
                "{} has uncommitted changes to tracked files; they will be discarded",
                backend.workdir().display()
            ),
            Ok(false) => {}
            Err(e) => warn!("Could not inspect working tree status: {}", e),
        }

        let protected = backend
            .untracked_paths()
            .map_err(ArborError::StateUnreadable)?;

        debug!(
            "Original checkout: {:?}, {} untracked paths protected",
            original,
            protected.len()
        );
        Ok(Self {
            backend,
            original,
            state: TreeState::Original,
            protected,
        })
    }

    pub fn original(&self) -> &OriginalState {
        &self.original
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        self.backend.workdir()
    }

    /// Force the directory to `id`'s tree. On failure the state is left at
    /// whatever it was before the call. Refuses commits that would write
    /// over a protected untracked file.
    pub fn checkout(&mut self, id: Oid) -> Result<()> {
        if !self.protected.is_empty() {
            let added = self
                .backend
                .paths_added(self.original.commit(), id)
                .map_err(|source| ArborError::CheckoutFailed { commit: id, source })?;
            if let Some(path) = first_clobbered(&self.protected, &added) {
                return Err(ArborError::CheckoutFailed {
                    commit: id,
                    source: git2::Error::from_str(&format!(
                        "checkout would overwrite untracked file {}",
                        path.display()
                    )),
                });
            }
        }
        self.backend
            .force_checkout(id)
            .map_err(|source| ArborError::CheckoutFailed { commit: id, source })?;
        self.state = TreeState::CheckedOut(id);
        Ok(())
    }

    /// Put the original checkout back. Always attempts the restore, even
    /// if no checkout ever succeeded. Consumes the tree so nothing can be
    /// checked out afterwards.
    pub fn restore(mut self) -> Result<Restored> {
        self.restore_in_place()
    }

    fn restore_in_place(&mut self) -> Result<Restored> {
        let original_commit = self.original.commit();

        let branch_error = match &self.original {
            OriginalState::Branch { refname, .. } => match self.backend.checkout_branch(refname) {
                Ok(()) => {
                    self.state = TreeState::Restored;
                    return Ok(Restored::Branch(self.original.label()));
                }
                Err(e) => {
                    warn!(
                        "Could not check out branch {}: {}; falling back to commit {}",
                        self.original.label(),
                        e,
                        short_id(original_commit)
                    );
                    Some(e)
                }
            },
            OriginalState::Detached(_) => None,
        };

        match self.backend.force_checkout(original_commit) {
            Ok(()) => {
                self.state = TreeState::Restored;
                Ok(Restored::Commit(original_commit))
            }
            Err(commit_error) => {
                self.state = TreeState::RestoreFailed;
                Err(ArborError::RestoreFailed {
                    original: self.original.label(),
                    branch_error,
                    commit_error,
                })
            }
        }
    }
}

/// The first path in `added` whose checkout would replace a protected file:
/// the file itself, a protected file below it (the path becomes a file where
/// a directory was), or a protected file above it (a directory where a file
/// was).
fn first_clobbered<'a>(
    protected: &BTreeSet<PathBuf>,
    added: &'a [PathBuf],
) -> Option<&'a PathBuf> {
    added.iter().find(|path| {
        let below = protected
            .range::<Path, _>((Bound::Included(path.as_path()), Bound::Unbounded))
            .next()
            .is_some_and(|p| p.starts_with(path));
        below || path.ancestors().skip(1).any(|a| protected.contains(a))
    })
}

impl<B: RevisionBackend> Drop for WorkingTree<'_, B> {
    fn drop(&mut self) {
        if let TreeState::CheckedOut(id) = self.state {
            warn!(
                "Working tree dropped at {} without restoring; restoring now",
                short_id(id)
            );
            match self.restore_in_place() {
                Ok(restored) => info!("Restored to {}", restored),
                Err(e) => error!("{}", e),
            }
        }
    }
}
