// src/counter.rs

//! Line counting for a checked-out tree.
//!
//! The counting itself is delegated to an external analyzer behind the
//! [`LineCounter`] trait. [`Scc`] runs `scc` and reads its JSON report.

use crate::error::CountError;
use crate::model::LanguageCounts;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exclusions used when none are configured
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["src/test", "test"];

/// Counts lines per language for a directory tree
pub trait LineCounter {
    fn name(&self) -> &str;

    /// Measure `dir`, skipping the given subpaths (relative to `dir`).
    /// Either returns a complete map or fails; never a partial result.
    fn measure(&self, dir: &Path, excluded: &[String]) -> Result<LanguageCounts, CountError>;
}

/// Which column of the analyzer's report ends up in the series
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// All lines, including comments and blanks
    #[default]
    Lines,
    /// Code lines only
    Code,
    Comments,
    Blanks,
}

/// Keep only the exclusions that exist under `dir`. The analyzer is never
/// handed a path that isn't there.
pub fn existing_exclusions(dir: &Path, excluded: &[String]) -> Vec<String> {
    excluded
        .iter()
        .filter(|sub| dir.join(sub.as_str()).exists())
        .cloned()
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SccLanguage {
    name: String,
    lines: u64,
    #[serde(default)]
    code: u64,
    #[serde(default)]
    comment: u64,
    #[serde(default)]
    blank: u64,
}

impl SccLanguage {
    fn value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Lines => self.lines,
            Metric::Code => self.code,
            Metric::Comments => self.comment,
            Metric::Blanks => self.blank,
        }
    }
}

/// Parse an `scc --format json` report
pub fn parse_scc_report(raw: &[u8], metric: Metric) -> Result<LanguageCounts, serde_json::Error> {
    // An empty tree is reported as `null` by some scc versions
    let records: Option<Vec<SccLanguage>> = serde_json::from_slice(raw)?;
    let mut counts = LanguageCounts::new();
    for record in records.unwrap_or_default() {
        let value = record.value(metric);
        *counts.entry(record.name).or_insert(0) += value;
    }
    Ok(counts)
}

/// The `scc` line counter, run as a subprocess
#[derive(Debug, Clone)]
pub struct Scc {
    program: String,
    leading_args: Vec<String>,
    timeout: Option<Duration>,
    metric: Metric,
}

impl Default for Scc {
    fn default() -> Self {
        Self::new("scc")
    }
}

impl Scc {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
            metric: Metric::default(),
        }
    }

    /// Arguments placed before scc's own, for wrappers such as
    /// `docker run ... scc`
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    fn args(&self, dir: &Path, excluded: &[String]) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.extend(["--uloc", "--format", "json"].map(OsString::from));
        // scc wants one --exclude-dir per directory
        for sub in existing_exclusions(dir, excluded) {
            args.push("--exclude-dir".into());
            args.push(sub.into());
        }
        args.push(dir.as_os_str().to_owned());
        args
    }

    fn timed_out(&self) -> CountError {
        let timeout = self.timeout.unwrap_or_default();
        warn!("{} timed out after {}s", self.program, timeout.as_secs());
        CountError::TimedOut {
            program: self.program.clone(),
            timeout,
        }
    }

    fn spawn(&self, args: &[OsString], dir: &Path) -> Result<Child, CountError> {
        debug!("Running {} {:?}", self.program, args);
        Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    CountError::AnalyzerUnavailable {
                        program: self.program.clone(),
                    }
                } else {
                    CountError::Io {
                        program: self.program.clone(),
                        source,
                    }
                }
            })
    }
}

impl LineCounter for Scc {
    fn name(&self) -> &str {
        &self.program
    }

    fn measure(&self, dir: &Path, excluded: &[String]) -> Result<LanguageCounts, CountError> {
        let args = self.args(dir, excluded);
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut child = self.spawn(&args, dir)?;

        // Drain both pipes on their own threads so a chatty analyzer can't
        // block on a full pipe while we wait for it to exit.
        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Pipe::Stdout, tx.clone());
        drain(child.stderr.take(), Pipe::Stderr, tx);

        let status = wait(&mut child, deadline).map_err(|source| CountError::Io {
            program: self.program.clone(),
            source,
        })?;
        let Some(status) = status else {
            return Err(self.timed_out());
        };

        // Anything the analyzer spawned may still hold the pipes open, so
        // collecting its output is bounded by the same deadline.
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for _ in 0..2 {
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((Pipe::Stdout, buf)) => stdout = buf,
                Ok((Pipe::Stderr, buf)) => stderr = buf,
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !status.success() {
            return Err(CountError::AnalyzerFailed {
                program: self.program.clone(),
                status: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        parse_scc_report(&stdout, self.metric).map_err(|source| CountError::UnparseableOutput {
            program: self.program.clone(),
            source,
        })
    }
}

enum Pipe {
    Stdout,
    Stderr,
}

/// Read `pipe` to the end on a detached thread and send the bytes on `tx`.
/// The thread outlives the call if the pipe never closes.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    tx: mpsc::Sender<(Pipe, Vec<u8>)>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((which, buf));
    });
}

/// Wait for `child`, killing it once `deadline` passes. `Ok(None)` means
/// it was killed.
fn wait(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const REPORT: &str = r#"[
        {"Name":"Rust","Bytes":100,"CodeBytes":0,"Lines":120,"Code":90,"Comment":20,"Blank":10,"Complexity":4,"Count":3},
        {"Name":"Markdown","Bytes":10,"CodeBytes":0,"Lines":15,"Code":12,"Comment":0,"Blank":3,"Complexity":0,"Count":1}
    ]"#;

    #[test]
    fn parses_scc_json_by_metric() {
        let lines = parse_scc_report(REPORT.as_bytes(), Metric::Lines).unwrap();
        assert_eq!(lines.get("Rust"), Some(&120));
        assert_eq!(lines.get("Markdown"), Some(&15));

        let code = parse_scc_report(REPORT.as_bytes(), Metric::Code).unwrap();
        assert_eq!(code.get("Rust"), Some(&90));

        let blanks = parse_scc_report(REPORT.as_bytes(), Metric::Blanks).unwrap();
        assert_eq!(blanks.get("Markdown"), Some(&3));
    }

    #[test]
    fn empty_and_null_reports_mean_no_languages() {
        assert!(parse_scc_report(b"[]", Metric::Lines).unwrap().is_empty());
        assert!(parse_scc_report(b"null", Metric::Lines).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_scc_report(b"Language  Files  Lines", Metric::Lines).is_err());
        assert!(parse_scc_report(br#"[{"Name":"Rust"}]"#, Metric::Lines).is_err());
    }

    #[test]
    fn drops_exclusions_that_do_not_exist() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/test")).unwrap();
        let excluded = vec!["src/test".to_string(), "test".to_string()];
        assert_eq!(existing_exclusions(dir.path(), &excluded), vec!["src/test"]);
    }

    #[test]
    fn builds_scc_arguments() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("test")).unwrap();
        let scc = Scc::default();
        let args = scc.args(dir.path(), &["vendor".into(), "test".into()]);
        let mut expected: Vec<OsString> = ["--uloc", "--format", "json", "--exclude-dir", "test"]
            .into_iter()
            .map(OsString::from)
            .collect();
        expected.push(dir.path().as_os_str().to_owned());
        assert_eq!(args, expected);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_directory_is_passed_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let parent = TempDir::new().unwrap();
        let dir = parent.path().join(OsStr::from_bytes(b"caf\xe9"));
        fs::create_dir(&dir).unwrap();
        let args = Scc::default().args(&dir, &[]);
        assert_eq!(args.last().map(OsString::as_os_str), Some(dir.as_os_str()));
    }

    #[test]
    fn missing_analyzer_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let scc = Scc::new("arbor-test-no-such-analyzer");
        let err = scc.measure(dir.path(), &[]).unwrap_err();
        assert!(matches!(err, CountError::AnalyzerUnavailable { .. }));
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> Scc {
        let path = dir.join("fake-scc.sh");
        fs::write(&path, body).unwrap();
        Scc::new("sh").with_leading_args(vec![path.to_string_lossy().into_owned()])
    }

    #[cfg(unix)]
    #[test]
    fn reads_the_report_from_stdout() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(
            tools.path(),
            r#"echo '[{"Name":"Go","Lines":7,"Code":5,"Comment":1,"Blank":1}]'"#,
        );
        let counts = scc.measure(target.path(), &[]).unwrap();
        assert_eq!(counts, LanguageCounts::from([("Go".to_string(), 7)]));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_failure() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(tools.path(), "echo boom >&2\nexit 3");
        match scc.measure(target.path(), &[]).unwrap_err() {
            CountError::AnalyzerFailed { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unparseable_output_is_a_failure() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(tools.path(), "echo not json");
        let err = scc.measure(target.path(), &[]).unwrap_err();
        assert!(matches!(err, CountError::UnparseableOutput { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn slow_analyzer_times_out() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(tools.path(), "exec sleep 5")
            .with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = scc.measure(target.path(), &[]).unwrap_err();
        assert!(matches!(err, CountError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_holds_when_a_grandchild_keeps_the_pipes_open() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(tools.path(), "sleep 4\necho '[]'")
            .with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = scc.measure(target.path(), &[]).unwrap_err();
        assert!(matches!(err, CountError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn output_held_open_by_a_background_process_is_bounded() {
        let tools = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let scc = script(tools.path(), "sleep 4 &\necho '[]'")
            .with_timeout(Some(Duration::from_millis(300)));
        let started = Instant::now();
        let err = scc.measure(target.path(), &[]).unwrap_err();
        assert!(matches!(err, CountError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
