//! Reporter capability set and its backends.
//!
//! Callers drive a [`Reporter`] through `start_step`, `attach`,
//! `log`, `pass` / `fail` / `skip` and finally `flush`. Which
//! backend is active is decided when the runner is built:
//!
//! - [`StepReporter`] writes one result document per step plus
//!   attachment files, in the style of annotation-driven step
//!   reports.
//! - [`DashboardReporter`] writes a single self-contained HTML
//!   dashboard.
//! - [`TeeReporter`] forwards to several backends at once.

pub mod dashboard;
pub mod steps;

use crate::error::ReportError;
use crate::model::{Artifact, StepOutcome};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub use dashboard::DashboardReporter;
pub use steps::StepReporter;

/// The capability set every reporting backend provides.
pub trait Reporter: Send {
    /// Open a new step; subsequent calls apply to it.
    fn start_step(&mut self, name: &str, description: &str);
    fn attach(&mut self, label: &str, content: &[u8], mime_type: &str);
    fn log(&mut self, message: &str);
    fn pass(&mut self, message: &str);
    fn fail(&mut self, message: &str);
    /// Close the current step as not attempted.
    fn skip(&mut self, message: &str);
    /// Run-level key/value shown alongside the steps.
    fn environment(&mut self, key: &str, value: &str);
    /// Write the report artifact.
    ///
    /// Returns `Ok(None)` when nothing was ever recorded. Calling
    /// it again without new records leaves the artifact as is.
    fn flush(&mut self) -> Result<Option<PathBuf>, ReportError>;
}

/// One recorded log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

/// A step as seen by a reporter.
#[derive(Debug, Clone)]
pub struct RecordedStep {
    pub name: String,
    pub description: String,
    pub started: DateTime<Local>,
    pub stopped: Option<DateTime<Local>>,
    /// `None` while the step is still open.
    pub outcome: Option<StepOutcome>,
    pub message: Option<String>,
    pub logs: Vec<LogEntry>,
    pub attachments: Vec<Artifact>,
}

/// Bookkeeping shared by the backends: open step, recorded
/// steps, environment and flush state.
#[derive(Debug, Default)]
pub struct Recorder {
    steps: Vec<RecordedStep>,
    environment: Vec<(String, String)>,
    /// Bumped on every mutation; compared against the revision
    /// seen by the last flush.
    revision: u64,
    flushed: Option<(u64, PathBuf)>,
}

impl Recorder {
    pub fn steps(&self) -> &[RecordedStep] {
        &self.steps
    }

    pub fn environment_entries(&self) -> &[(String, String)] {
        &self.environment
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.environment.is_empty()
    }

    fn current(&mut self) -> Option<&mut RecordedStep> {
        self.revision += 1;
        self.steps.last_mut()
    }

    pub fn start_step(&mut self, name: &str, description: &str) {
        self.revision += 1;
        self.steps.push(RecordedStep {
            name: name.to_string(),
            description: description.to_string(),
            started: Local::now(),
            stopped: None,
            outcome: None,
            message: None,
            logs: Vec::new(),
            attachments: Vec::new(),
        });
    }

    pub fn attach(&mut self, label: &str, content: &[u8], mime_type: &str) {
        if let Some(step) = self.current() {
            step.attachments.push(Artifact::new(label, content, mime_type));
        }
    }

    pub fn log(&mut self, message: &str) {
        if let Some(step) = self.current() {
            step.logs.push(LogEntry {
                at: Local::now(),
                message: message.to_string(),
            });
        }
    }

    /// Close the open step. A step keeps its first outcome.
    pub fn finish(&mut self, outcome: StepOutcome, message: &str) {
        if let Some(step) = self.current() {
            if step.outcome.is_none() {
                step.outcome = Some(outcome);
                step.message = Some(message.to_string());
                step.stopped = Some(Local::now());
            } else {
                step.logs.push(LogEntry {
                    at: Local::now(),
                    message: format!("{outcome}: {message}"),
                });
            }
        }
    }

    pub fn environment(&mut self, key: &str, value: &str) {
        self.revision += 1;
        match self.environment.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.environment.push((key.to_string(), value.to_string())),
        }
    }

    /// Steps that were closed with an outcome.
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == Some(outcome))
            .count()
    }

    /// Path of the last flush when nothing changed since.
    pub fn unchanged_flush(&self) -> Option<&Path> {
        match &self.flushed {
            Some((rev, path)) if *rev == self.revision => Some(path.as_path()),
            _ => None,
        }
    }

    /// Path used by an earlier flush of this run, if any.
    pub fn flushed_path(&self) -> Option<&Path> {
        self.flushed.as_ref().map(|(_, p)| p.as_path())
    }

    pub fn mark_flushed(&mut self, path: PathBuf) {
        self.flushed = Some((self.revision, path));
    }
}

/// Forwards every call to each backend in turn.
pub struct TeeReporter {
    backends: Vec<Box<dyn Reporter>>,
}

impl TeeReporter {
    pub fn new(backends: Vec<Box<dyn Reporter>>) -> Self {
        Self { backends }
    }
}

impl Reporter for TeeReporter {
    fn start_step(&mut self, name: &str, description: &str) {
        self.backends
            .iter_mut()
            .for_each(|b| b.start_step(name, description));
    }

    fn attach(&mut self, label: &str, content: &[u8], mime_type: &str) {
        self.backends
            .iter_mut()
            .for_each(|b| b.attach(label, content, mime_type));
    }

    fn log(&mut self, message: &str) {
        self.backends.iter_mut().for_each(|b| b.log(message));
    }

    fn pass(&mut self, message: &str) {
        self.backends.iter_mut().for_each(|b| b.pass(message));
    }

    fn fail(&mut self, message: &str) {
        self.backends.iter_mut().for_each(|b| b.fail(message));
    }

    fn skip(&mut self, message: &str) {
        self.backends.iter_mut().for_each(|b| b.skip(message));
    }

    fn environment(&mut self, key: &str, value: &str) {
        self.backends
            .iter_mut()
            .for_each(|b| b.environment(key, value));
    }

    /// Flushes every backend even if one fails; returns the first
    /// path written and the first error seen.
    fn flush(&mut self) -> Result<Option<PathBuf>, ReportError> {
        let mut first_path = None;
        let mut first_err = None;
        for backend in &mut self.backends {
            match backend.flush() {
                Ok(path) => {
                    if first_path.is_none() {
                        first_path = path;
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(first_path),
        }
    }
}

/// Lowercase ASCII slug used in artifact file names.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if (ch.is_whitespace() || matches!(ch, '-' | '_')) && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "step".to_string()
    } else {
        slug
    }
}

/// `<dir>/<stem>_<YYYYMMDD_HHMMSS><ext>`, with `_2`, `_3`, ...
/// appended until the path does not exist yet.
pub fn timestamped_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{stem}_{stamp}");
    let mut candidate = dir.join(format!("{base}{ext}"));
    let mut n = 2;
    while candidate.exists() {
        candidate = dir.join(format!("{base}_{n}{ext}"));
        n += 1;
    }
    candidate
}

/// Claim a fresh [`timestamped_path`] with `create`, moving on to
/// the next suffix when another writer got there first.
fn reserve(
    dir: &Path,
    stem: &str,
    ext: &str,
    create: impl Fn(&Path) -> io::Result<()>,
) -> Result<PathBuf, ReportError> {
    let mut last = None;
    for _ in 0..100 {
        let path = timestamped_path(dir, stem, ext);
        match create(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last = Some((path, e)),
            Err(source) => return Err(ReportError::Io { path, source }),
        }
    }
    let (path, source) = last.unwrap_or_else(|| {
        let source = io::Error::new(io::ErrorKind::AlreadyExists, "no free report path");
        (dir.to_path_buf(), source)
    });
    Err(ReportError::Io { path, source })
}

/// Create an empty file at a path no earlier run has used.
pub fn reserve_file(dir: &Path, stem: &str, ext: &str) -> Result<PathBuf, ReportError> {
    reserve(dir, stem, ext, |path| {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
    })
}

/// Create a directory at a path no earlier run has used.
pub fn reserve_dir(dir: &Path, stem: &str) -> Result<PathBuf, ReportError> {
    reserve(dir, stem, "", |path| fs::create_dir(path))
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError {
    let path = path.to_path_buf();
    move |source| ReportError::Io { path, source }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ReportError> {
    fs::create_dir_all(dir).map_err(io_err(dir))
}

/// File extension for a MIME type, used for attachment files.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or("").trim() {
        "application/json" => "json",
        "text/html" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "application/xml" | "text/xml" => "xml",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}
