//! Step descriptors, outcomes and run results.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Static metadata for one step of an ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Stable identifier, also used to dispatch to the executor.
    pub name: &'static str,
    /// Human-readable title shown in reports.
    pub title: &'static str,
    pub description: &'static str,
    /// Step that must have passed before this one is attempted.
    pub predecessor: Option<&'static str>,
    /// Shared state keys that must be present before this step
    /// is attempted.
    pub requires: &'static [&'static str],
}

/// HTTP verbs used by the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Final outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// Not attempted because the predecessor did not pass.
    Skipped,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Passed => "passed",
            StepOutcome::Failed => "failed",
            StepOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text or binary artifact attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub label: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Artifact {
    pub fn new(
        label: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    /// Content as UTF-8 text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Result of a single step within a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub title: String,
    pub description: String,
    pub outcome: StepOutcome,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn passed(&self) -> bool {
        self.outcome == StepOutcome::Passed
    }
}

/// Result of running a whole sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceReport {
    pub name: String,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
    /// Artifacts written by the reporter's flush, if any.
    pub report_path: Option<PathBuf>,
    /// Set when flushing the reporter failed.
    pub report_error: Option<String>,
}

impl SequenceReport {
    /// `true` iff every step passed.
    pub fn success(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(StepResult::passed)
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    /// Process exit code for the run: 0 iff every step passed.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Captured HTTP request information for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}
