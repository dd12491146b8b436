// src/lib.rs

//! Measure how a repository's lines of code, per language, change across
//! its commit history.
//!
//! Every commit is checked out into the repository's own working directory
//! and measured by an external line counter. The user's original checkout
//! is put back afterwards, even when individual commits fail. The per-commit
//! counts are then folded into a dense, time-ordered [`model::SeriesMatrix`].
//!
//! ```no_run
//! use arbor::analyzer::{analyze, TraversalOptions};
//! use arbor::counter::Scc;
//! use std::path::Path;
//!
//! let options = TraversalOptions {
//!     exclude_dirs: vec!["vendor".into()],
//!     ..Default::default()
//! };
//! let analysis = analyze(Path::new("."), &Scc::default(), &options, None)?;
//! println!("{} languages", analysis.languages.len());
//! # Ok::<(), arbor::error::ArborError>(())
//! ```

pub mod analyzer;
pub mod config;
pub mod counter;
pub mod error;
pub mod model;
pub mod renderer;
pub mod repo;
pub mod series;
pub mod worktree;
