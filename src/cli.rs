// src/cli.rs

use anyhow::{Context, Result};
use arbor::analyzer::{self, TraversalOptions};
use arbor::config::Config;
use arbor::counter::Metric;
use arbor::error::ArborError;
use arbor::renderer::{self, ReportFormat};
use arbor::repo::{GitRepository, RevisionBackend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Arbor - A Git repository analysis tool
#[derive(Parser, Debug)]
#[command(name = "arbor", author, version)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze lines of code across commits
    #[command(long_about = "\
Analyze the lines of code for each language across all commits in a Git repository.
If no repository path is provided, the current directory is used.

Each commit is checked out in turn and measured with scc. Local changes to tracked
files are discarded. When the walk is done the original branch or commit is checked
out again, and a chart of lines of code over time is written.")]
    Loc(LocArgs),
}

#[derive(clap::Args, Debug)]
pub struct LocArgs {
    /// Path to the git repository (default: current directory)
    pub path: Option<PathBuf>,

    /// Configuration file (default: <repo>/.arbor.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Directory to exclude from counting, relative to the repository root (repeatable)
    #[arg(long = "exclude-dir", value_name = "DIR")]
    pub exclude_dirs: Vec<String>,

    /// Line counter executable
    #[arg(long)]
    pub analyzer: Option<String>,

    /// Seconds before a single analyzer run is abandoned (0 = never)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Which count to chart
    #[arg(long, value_enum)]
    pub metric: Option<Metric>,

    /// Only walk the newest N commits
    #[arg(long)]
    pub max_commits: Option<usize>,

    /// Don't draw the progress bar; per-commit lines are still printed
    #[arg(long)]
    pub no_progress: bool,
}

impl LocArgs {
    /// Flags win over whatever the config file said
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if !self.exclude_dirs.is_empty() {
            config.exclude_dirs = self.exclude_dirs.clone();
        }
        if let Some(analyzer) = &self.analyzer {
            config.analyzer = analyzer.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(metric) = self.metric {
            config.metric = metric;
        }
        if self.max_commits.is_some() {
            config.max_commits = self.max_commits;
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Loc(args) => run_loc(args),
    }
}

fn run_loc(args: LocArgs) -> Result<()> {
    let repo_path = match &args.path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let repo = GitRepository::open(&repo_path).context("failed to open repository")?;
    let mut config = Config::load(repo.workdir(), args.config.as_deref())?;
    args.apply(&mut config);

    let original_label = repo
        .current_state()
        .map(|s| s.label())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Analyzing repository: {}", repo_path.display());
    println!("Original checkout: {}", original_label);
    println!();

    let counter = config.counter();
    let options = TraversalOptions {
        exclude_dirs: config.exclude_dirs.clone(),
        max_commits: config.max_commits,
        show_progress: !args.no_progress,
        report_commits: true,
    };

    let analysis = match analyzer::analyze_backend(&repo, &counter, &options, None) {
        Ok(analysis) => analysis,
        Err(e @ ArborError::RestoreFailed { .. }) => {
            eprintln!("Restoration failed, manual intervention needed.");
            eprintln!(
                "The repository at {} is not on its original checkout; run `git checkout {}` to return to it.",
                repo_path.display(),
                original_label
            );
            return Err(e.into());
        }
        Err(e) => return Err(e).context("analysis failed"),
    };

    println!("Restored to: {}", analysis.restored);
    println!();

    renderer::write_report(&analysis.matrix, config.format, &config.output)?;

    println!("Report saved as: {}", config.output.display());
    println!(
        "Measured {} of {} commits across {} languages",
        analysis.measured(),
        analysis.total(),
        analysis.languages.len()
    );
    for failure in &analysis.failures {
        println!(
            "  skipped {}: {}",
            arbor::model::short_id(failure.commit),
            analyzer::cause_chain(&failure.error)
        );
    }

    Ok(())
}
