//! Ordered, state-threading step execution

use crate::error::{SequenceError, StepError};
use crate::model::{Artifact, SequenceReport, StepDescriptor, StepOutcome, StepResult};
use crate::report::Reporter;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Named values produced by earlier steps and read by later ones.
///
/// A key can be written once; later writes are rejected.
#[derive(Debug, Default, Clone)]
pub struct SequenceState {
    values: HashMap<String, String>,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value for `key` or [`StepError::MissingSharedState`].
    pub fn require(&self, key: &str) -> Result<&str, StepError> {
        self.get(key)
            .ok_or_else(|| StepError::MissingSharedState(key.to_string()))
    }

    /// Write `key` once. Rewriting the same value is accepted.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), StepError> {
        let value = value.into();
        match self.values.get(key) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(StepError::StateConflict {
                key: key.to_string(),
                existing: existing.clone(),
            }),
            None => {
                debug!("Shared state '{}' = {:?}", key, value);
                self.values.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a step sees while it runs: the shared state and the
/// reporter for the current step.
pub struct StepContext<'a> {
    pub state: &'a mut SequenceState,
    reporter: &'a mut dyn Reporter,
    artifacts: Vec<Artifact>,
    logs: Vec<String>,
}

impl<'a> StepContext<'a> {
    pub fn new(state: &'a mut SequenceState, reporter: &'a mut dyn Reporter) -> Self {
        Self {
            state,
            reporter,
            artifacts: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.reporter.log(&message);
        self.logs.push(message);
    }

    pub fn attach(&mut self, label: &str, content: impl Into<Vec<u8>>, mime_type: &str) {
        let artifact = Artifact::new(label, content, mime_type);
        self.reporter.attach(label, &artifact.content, mime_type);
        self.artifacts.push(artifact);
    }

    pub fn attach_text(&mut self, label: &str, text: &str) {
        self.attach(label, text.as_bytes(), "text/plain");
    }

    pub fn attach_json(&mut self, label: &str, json: &str) {
        self.attach(label, json.as_bytes(), "application/json");
    }

    fn into_parts(self) -> (Vec<Artifact>, Vec<String>) {
        (self.artifacts, self.logs)
    }
}

/// Behaviour behind the step descriptors of a sequence.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run one step. `Ok` carries the pass message.
    async fn execute(
        &self,
        step: &StepDescriptor,
        ctx: &mut StepContext<'_>,
    ) -> Result<String, StepError>;
}

/// Check that names are unique and every predecessor runs
/// earlier in the list.
pub fn validate_sequence(steps: &[StepDescriptor]) -> Result<(), SequenceError> {
    if steps.is_empty() {
        return Err(SequenceError::Empty);
    }
    let mut seen = HashSet::new();
    for step in steps {
        if let Some(pred) = step.predecessor {
            if !seen.contains(pred) {
                return Err(SequenceError::UnknownPredecessor {
                    step: step.name.to_string(),
                    predecessor: pred.to_string(),
                });
            }
        }
        if !seen.insert(step.name) {
            return Err(SequenceError::DuplicateStep(step.name.to_string()));
        }
    }
    Ok(())
}

/// Runs a fixed list of steps strictly in order.
pub struct SequenceRunner {
    name: String,
    steps: Vec<StepDescriptor>,
    reporter: Box<dyn Reporter>,
    environment: Vec<(String, String)>,
}

impl SequenceRunner {
    pub fn new(
        name: impl Into<String>,
        steps: &[StepDescriptor],
        reporter: Box<dyn Reporter>,
    ) -> Result<Self, SequenceError> {
        validate_sequence(steps)?;
        Ok(Self {
            name: name.into(),
            steps: steps.to_vec(),
            reporter,
            environment: Vec::new(),
        })
    }

    /// Run-level value handed to the reporter before the first
    /// step.
    pub fn with_environment(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    fn skipped(step: &StepDescriptor, message: String) -> StepResult {
        StepResult {
            name: step.name.to_string(),
            title: step.title.to_string(),
            description: step.description.to_string(),
            outcome: StepOutcome::Skipped,
            message,
            error_kind: None,
            artifacts: Vec::new(),
            logs: Vec::new(),
            duration_ms: 0,
        }
    }

    async fn run_step(
        &mut self,
        step: &StepDescriptor,
        executor: &dyn StepExecutor,
        state: &mut SequenceState,
    ) -> StepResult {
        let start = Instant::now();
        let missing = step.requires.iter().find(|key| !state.contains(key));

        let mut ctx = StepContext::new(state, self.reporter.as_mut());
        let outcome = match missing {
            Some(key) => Err(StepError::MissingSharedState(key.to_string())),
            None => executor.execute(step, &mut ctx).await,
        };
        let (artifacts, logs) = ctx.into_parts();

        let (outcome, message, error_kind) = match outcome {
            Ok(message) => {
                self.reporter.pass(&message);
                (StepOutcome::Passed, message, None)
            }
            Err(err) => {
                let message = format!("{}: {}", step.name, err);
                error!("Step failed: {}", message);
                self.reporter.fail(&message);
                (StepOutcome::Failed, message, Some(err.kind()))
            }
        };

        StepResult {
            name: step.name.to_string(),
            title: step.title.to_string(),
            description: step.description.to_string(),
            outcome,
            message,
            error_kind,
            artifacts,
            logs,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Execute every step in order and flush the reporter.
    ///
    /// Step failures never escape; they are recorded on the
    /// returned report. Steps whose predecessor did not pass are
    /// skipped.
    #[instrument(skip(self, executor), fields(name = %self.name))]
    pub async fn run(&mut self, executor: &dyn StepExecutor) -> SequenceReport {
        let start_time = Instant::now();
        let mut state = SequenceState::new();
        let mut results: Vec<StepResult> = Vec::new();

        info!("Starting sequence: {}", self.name);
        for (key, value) in &self.environment {
            self.reporter.environment(key, value);
        }

        let steps = self.steps.clone();
        let total = steps.len();
        for (idx, step) in steps.iter().enumerate() {
            info!("Running step {}/{}: {}", idx + 1, total, step.title);
            self.reporter.start_step(step.title, step.description);

            let blocked = step.predecessor.filter(|pred| {
                !results.iter().any(|r| r.name == *pred && r.passed())
            });

            let result = match blocked {
                Some(pred) => {
                    let message = format!("skipped, dependency '{pred}' did not pass");
                    warn!("Step {}: {}", step.name, message);
                    self.reporter.skip(&message);
                    Self::skipped(step, message)
                }
                None => self.run_step(step, executor, &mut state).await,
            };
            results.push(result);
        }

        let (report_path, report_error) = match self.reporter.flush() {
            Ok(path) => (path, None),
            Err(e) => {
                error!("Failed to flush report: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let report = SequenceReport {
            name: self.name.clone(),
            steps: results,
            duration_ms: start_time.elapsed().as_millis() as u64,
            report_path,
            report_error,
        };

        info!(
            "Sequence finished: {} ({} ms) - passed {}, failed {}, skipped {}",
            report.name,
            report.duration_ms,
            report.count(StepOutcome::Passed),
            report.count(StepOutcome::Failed),
            report.count(StepOutcome::Skipped)
        );

        report
    }
}
