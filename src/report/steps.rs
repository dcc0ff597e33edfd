//! Step-level result documents.
//!
//! A flush writes one run directory:
//!
//! ```text
//! step-results_20240101_120000/
//!   01-add_place-result.json
//!   02-update_place-result.json
//!   attachments/01-01-request_payload.json
//!   environment.properties
//!   summary.json
//! ```

use super::{ensure_dir, extension_for, io_err, reserve_dir, slugify, Recorder, Reporter};
use crate::error::ReportError;
use crate::model::StepOutcome;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct Label<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct LogStep<'a> {
    name: &'a str,
    at: i64,
}

#[derive(Debug, Serialize)]
struct AttachmentRef<'a> {
    name: &'a str,
    source: String,
    #[serde(rename = "type")]
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepDocument<'a> {
    name: &'a str,
    description: &'a str,
    status: &'a str,
    status_message: Option<&'a str>,
    start: i64,
    stop: Option<i64>,
    labels: Vec<Label<'a>>,
    steps: Vec<LogStep<'a>>,
    attachments: Vec<AttachmentRef<'a>>,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    suite: &'a str,
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
}

/// Escape text for a `.properties` line. Spaces are escaped
/// everywhere in keys and only at the start of values.
fn escape_property(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ':' | '=' | '#' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}

/// Writes per-step JSON result documents and attachment files.
#[derive(Debug)]
pub struct StepReporter {
    out_dir: PathBuf,
    suite: String,
    labels: Vec<(String, String)>,
    recorder: Recorder,
}

impl StepReporter {
    pub fn new<P: AsRef<Path>>(out_dir: P, suite: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            suite: suite.into(),
            labels: Vec::new(),
            recorder: Recorder::default(),
        }
    }

    /// Label attached to every step document (e.g. `epic`,
    /// `feature`).
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((name.into(), value.into()));
        self
    }

    fn run_dir(&self) -> Result<PathBuf, ReportError> {
        if let Some(path) = self.recorder.flushed_path() {
            return Ok(path.to_path_buf());
        }
        ensure_dir(&self.out_dir)?;
        reserve_dir(&self.out_dir, "step-results")
    }

    fn write_run(&self, dir: &Path) -> Result<(), ReportError> {
        let attachments_dir = dir.join("attachments");
        ensure_dir(&attachments_dir)?;

        for (idx, step) in self.recorder.steps().iter().enumerate() {
            let step_no = idx + 1;
            let slug = slugify(&step.name);

            let mut attachments = Vec::new();
            for (a_idx, artifact) in step.attachments.iter().enumerate() {
                let file_name = format!(
                    "{step_no:02}-{:02}-{}.{}",
                    a_idx + 1,
                    slugify(&artifact.label),
                    extension_for(&artifact.mime_type)
                );
                let path = attachments_dir.join(&file_name);
                fs::write(&path, &artifact.content).map_err(io_err(&path))?;
                attachments.push(AttachmentRef {
                    name: &artifact.label,
                    source: format!("attachments/{file_name}"),
                    mime_type: &artifact.mime_type,
                });
            }

            let mut labels: Vec<Label> = self
                .labels
                .iter()
                .map(|(name, value)| Label {
                    name: name.as_str(),
                    value: value.as_str(),
                })
                .collect();
            labels.push(Label {
                name: "suite",
                value: &self.suite,
            });

            let doc = StepDocument {
                name: &step.name,
                description: &step.description,
                status: step.outcome.map(|o| o.as_str()).unwrap_or("unknown"),
                status_message: step.message.as_deref(),
                start: step.started.timestamp_millis(),
                stop: step.stopped.map(|t| t.timestamp_millis()),
                labels,
                steps: step
                    .logs
                    .iter()
                    .map(|l| LogStep {
                        name: &l.message,
                        at: l.at.timestamp_millis(),
                    })
                    .collect(),
                attachments,
            };

            let path = dir.join(format!("{step_no:02}-{slug}-result.json"));
            let json = serde_json::to_string_pretty(&doc)?;
            fs::write(&path, json).map_err(io_err(&path))?;
            debug!("Wrote step result {}", path.display());
        }

        let mut properties = String::new();
        for (key, value) in self.recorder.environment_entries() {
            properties.push_str(&format!(
                "{}={}\n",
                escape_property(key, true),
                escape_property(value, false)
            ));
        }
        let env_path = dir.join("environment.properties");
        fs::write(&env_path, properties).map_err(io_err(&env_path))?;

        let summary = Summary {
            suite: &self.suite,
            total: self.recorder.steps().len(),
            passed: self.recorder.count(StepOutcome::Passed),
            failed: self.recorder.count(StepOutcome::Failed),
            skipped: self.recorder.count(StepOutcome::Skipped),
        };
        let summary_path = dir.join("summary.json");
        fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
            .map_err(io_err(&summary_path))?;

        Ok(())
    }
}

impl Reporter for StepReporter {
    fn start_step(&mut self, name: &str, description: &str) {
        self.recorder.start_step(name, description);
    }

    fn attach(&mut self, label: &str, content: &[u8], mime_type: &str) {
        self.recorder.attach(label, content, mime_type);
    }

    fn log(&mut self, message: &str) {
        self.recorder.log(message);
    }

    fn pass(&mut self, message: &str) {
        self.recorder.finish(StepOutcome::Passed, message);
    }

    fn fail(&mut self, message: &str) {
        self.recorder.finish(StepOutcome::Failed, message);
    }

    fn skip(&mut self, message: &str) {
        self.recorder.finish(StepOutcome::Skipped, message);
    }

    fn environment(&mut self, key: &str, value: &str) {
        self.recorder.environment(key, value);
    }

    fn flush(&mut self) -> Result<Option<PathBuf>, ReportError> {
        if self.recorder.is_empty() {
            return Ok(None);
        }
        if let Some(path) = self.recorder.unchanged_flush() {
            return Ok(Some(path.to_path_buf()));
        }

        let dir = self.run_dir()?;
        self.write_run(&dir)?;
        info!("Step results written to {}", dir.display());
        self.recorder.mark_flushed(dir.clone());
        Ok(Some(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record_two_steps(reporter: &mut StepReporter) {
        reporter.environment("Full Base URL", "http://localhost/maps/api/place");
        reporter.start_step("add_place", "Adding a new place using POST request");
        reporter.log("Sending POST request to add a new place");
        reporter.attach("Request Payload", br#"{"name":"x"}"#, "application/json");
        reporter.pass("Place added successfully");
        reporter.start_step("update_place", "Updating the place");
        reporter.fail("update_place: field 'msg' mismatch");
    }

    #[test]
    fn test_flush_without_records_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = StepReporter::new(dir.path().join("out"), "crud");
        assert!(reporter.flush().unwrap().is_none());
        assert!(reporter.flush().unwrap().is_none());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_flush_writes_one_document_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter =
            StepReporter::new(dir.path(), "crud").with_label("epic", "CRUD Operations");
        record_two_steps(&mut reporter);

        let run_dir = reporter.flush().unwrap().expect("run dir");
        let add: Value = serde_json::from_str(
            &fs::read_to_string(run_dir.join("01-add_place-result.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(add["status"], "passed");
        assert_eq!(add["steps"][0]["name"], "Sending POST request to add a new place");
        assert_eq!(add["labels"][0]["value"], "CRUD Operations");
        let source = add["attachments"][0]["source"].as_str().unwrap();
        assert_eq!(
            fs::read_to_string(run_dir.join(source)).unwrap(),
            r#"{"name":"x"}"#
        );

        let update: Value = serde_json::from_str(
            &fs::read_to_string(run_dir.join("02-update_place-result.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(update["status"], "failed");

        let props = fs::read_to_string(run_dir.join("environment.properties")).unwrap();
        assert_eq!(props, "Full\\ Base\\ URL=http\\://localhost/maps/api/place\n");

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(run_dir.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["total"], 2);
        assert_eq!(summary["failed"], 1);
    }

    #[test]
    fn test_properties_escaping() {
        assert_eq!(escape_property("API Key", true), "API\\ Key");
        assert_eq!(
            escape_property(r"a=b:c\d #1", false),
            r"a\=b\:c\\d \#1"
        );
        assert_eq!(escape_property(" lead", false), r"\ lead");
        assert_eq!(escape_property("two\nlines", false), r"two\nlines");
    }

    #[test]
    fn test_second_flush_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = StepReporter::new(dir.path(), "crud");
        record_two_steps(&mut reporter);

        let first = reporter.flush().unwrap().unwrap();
        let before = fs::read_to_string(first.join("01-add_place-result.json")).unwrap();
        let second = reporter.flush().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(second.join("01-add_place-result.json")).unwrap(),
            before
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_separate_runs_get_separate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = StepReporter::new(dir.path(), "crud");
        record_two_steps(&mut first);
        let mut second = StepReporter::new(dir.path(), "crud");
        record_two_steps(&mut second);

        let a = first.flush().unwrap().unwrap();
        let b = second.flush().unwrap().unwrap();
        assert_ne!(a, b);
    }
}
