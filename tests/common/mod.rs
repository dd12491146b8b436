#![allow(dead_code)]

use arbor::counter::LineCounter;
use arbor::error::CountError;
use arbor::model::{Commit, LanguageCounts, OriginalState};
use arbor::repo::{GitRepository, RevisionBackend};
use git2::{Oid, Repository, Signature, Time};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// File each test commit carries with the counts the fake counter reports
pub const COUNTS_FILE: &str = "loc.json";

pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commit `files` on top of HEAD with the given author time
    pub fn commit(&self, files: &[(&str, &str)], author_time: i64, message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (name, content) in files {
            let path = self.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            index.add_path(Path::new(name)).unwrap();
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let author =
            Signature::new("Test User", "test@example.com", &Time::new(author_time, 0)).unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &author, &author, message, &tree, &parents)
            .unwrap()
    }

    /// Commit the removal of `name`, leaving the file itself on disk
    pub fn untrack(&self, name: &str, author_time: i64, message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        index.remove_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let author =
            Signature::new("Test User", "test@example.com", &Time::new(author_time, 0)).unwrap();
        let parent = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo
            .commit(Some("HEAD"), &author, &author, message, &tree, &[&parent])
            .unwrap()
    }

    /// Commit a counts file holding `counts` as JSON
    pub fn commit_counts(&self, counts: &[(&str, u64)], author_time: i64) -> Oid {
        let map: LanguageCounts = counts.iter().map(|(l, n)| (l.to_string(), *n)).collect();
        let body = serde_json::to_string(&map).unwrap();
        self.commit(&[(COUNTS_FILE, body.as_str())], author_time, "update counts")
    }

    pub fn open(&self) -> GitRepository {
        GitRepository::open(self.path()).unwrap()
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).unwrap()
    }

    /// HEAD description plus a clean status, for before/after comparisons
    pub fn state(&self) -> (OriginalState, String) {
        let state = self.open().current_state().unwrap();
        let statuses = self.repo.statuses(None).unwrap();
        let dirty: Vec<String> = statuses
            .iter()
            .filter_map(|s| s.path().map(String::from))
            .collect();
        (state, dirty.join(","))
    }
}

/// Reports whatever `loc.json` in the checked-out tree says. A file
/// containing `"FAIL"` makes the measurement fail.
#[derive(Default)]
pub struct ScriptedCounter {
    pub excluded_seen: RefCell<Vec<Vec<String>>>,
    /// Raised on every successful measurement when set
    pub cancel_after_first: Option<&'static AtomicBool>,
}

impl LineCounter for ScriptedCounter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn measure(&self, dir: &Path, excluded: &[String]) -> Result<LanguageCounts, CountError> {
        self.excluded_seen.borrow_mut().push(excluded.to_vec());
        let raw = fs::read_to_string(dir.join(COUNTS_FILE)).map_err(|source| CountError::Io {
            program: "scripted".into(),
            source,
        })?;
        if raw.contains("FAIL") {
            return Err(CountError::AnalyzerFailed {
                program: "scripted".into(),
                status: 1,
                stderr: "told to fail".into(),
            });
        }
        let counts = serde_json::from_str(&raw).map_err(|source| CountError::UnparseableOutput {
            program: "scripted".into(),
            source,
        })?;
        if let Some(flag) = self.cancel_after_first {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(counts)
    }
}

/// Git backend whose checkouts of chosen commits fail, like a held
/// `index.lock` would make them
pub struct LockedCommits {
    pub inner: GitRepository,
    pub locked: RefCell<HashSet<Oid>>,
    pub branch_gone: bool,
}

impl LockedCommits {
    pub fn new(inner: GitRepository, locked: &[Oid]) -> Self {
        Self {
            inner,
            locked: RefCell::new(locked.iter().copied().collect()),
            branch_gone: false,
        }
    }
}

impl RevisionBackend for LockedCommits {
    fn workdir(&self) -> &Path {
        self.inner.workdir()
    }

    fn current_state(&self) -> Result<OriginalState, git2::Error> {
        self.inner.current_state()
    }

    fn commits(&self) -> Result<Vec<Commit>, git2::Error> {
        self.inner.commits()
    }

    fn force_checkout(&self, id: Oid) -> Result<(), git2::Error> {
        if self.locked.borrow().contains(&id) {
            return Err(git2::Error::from_str("could not lock index: index.lock exists"));
        }
        self.inner.force_checkout(id)
    }

    fn checkout_branch(&self, refname: &str) -> Result<(), git2::Error> {
        if self.branch_gone {
            return Err(git2::Error::from_str("reference not found"));
        }
        self.inner.checkout_branch(refname)
    }

    fn untracked_paths(&self) -> Result<BTreeSet<PathBuf>, git2::Error> {
        self.inner.untracked_paths()
    }

    fn paths_added(&self, base: Oid, target: Oid) -> Result<Vec<PathBuf>, git2::Error> {
        self.inner.paths_added(base, target)
    }
}
