//! Error types for fixtures, the HTTP adapter, reporters and steps.
//!
//! Every failure inside a step is converted into a [`StepError`]
//! and recorded on the step result. Setup-time failures
//! (building the client, validating the sequence, writing a
//! report) have their own enums.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve or read a fixture.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("fixture '{name}' not found (looked in {searched})")]
    NotFound { name: String, searched: String },

    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure raised by the HTTP adapter.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid endpoint '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("transport error calling {method} {url}: {cause}")]
    Transport {
        method: String,
        url: String,
        /// Every message in the source chain, outermost first.
        cause: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    pub(crate) fn transport(method: &str, url: &str, source: reqwest::Error) -> Self {
        ClientError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            cause: error_chain(&source),
            source,
        }
    }
}

/// Messages of `err` and its sources joined with `": "`. A message
/// already contained in the previous one is left out.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        let message = source.to_string();
        if parts.last().is_some_and(|prev| !prev.contains(&message)) {
            parts.push(message);
        }
        current = source.source();
    }
    parts.join(": ")
}

/// Failure writing a report artifact.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid step descriptor list.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence has no steps")]
    Empty,

    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' depends on '{predecessor}', which does not run before it")]
    UnknownPredecessor { step: String, predecessor: String },
}

/// Error taxonomy for a single step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("fixture '{name}' not found (looked in {searched})")]
    FixtureNotFound { name: String, searched: String },

    #[error("fixture error: {0}")]
    Fixture(FixtureError),

    #[error("fixture '{name}' is not valid JSON after substitution: {reason}")]
    MalformedFixture { name: String, reason: String },

    #[error("{0}")]
    Transport(ClientError),

    #[error("unexpected status code: expected {expected}, got {actual} (body: {body})")]
    UnexpectedStatus {
        expected: u16,
        actual: u16,
        body: String,
    },

    #[error("field '{field}' mismatch: expected {expected:?}, got {actual:?}")]
    AssertionMismatch {
        field: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("shared state '{0}' is missing; its producing step did not provide it")]
    MissingSharedState(String),

    #[error("shared state '{key}' is already set to {existing:?}")]
    StateConflict { key: String, existing: String },

    #[error("response body is not valid JSON: {0}")]
    MalformedResponse(String),

    #[error("no executor registered for step '{0}'")]
    UnknownStep(String),
}

/// Coarse classification of a [`StepError`], kept on step
/// results so reports can be filtered without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FixtureNotFound,
    Fixture,
    MalformedFixture,
    Transport,
    UnexpectedStatus,
    AssertionMismatch,
    MissingSharedState,
    StateConflict,
    MalformedResponse,
    UnknownStep,
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::FixtureNotFound { .. } => ErrorKind::FixtureNotFound,
            StepError::Fixture(_) => ErrorKind::Fixture,
            StepError::MalformedFixture { .. } => ErrorKind::MalformedFixture,
            StepError::Transport(_) => ErrorKind::Transport,
            StepError::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            StepError::AssertionMismatch { .. } => ErrorKind::AssertionMismatch,
            StepError::MissingSharedState(_) => ErrorKind::MissingSharedState,
            StepError::StateConflict { .. } => ErrorKind::StateConflict,
            StepError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            StepError::UnknownStep(_) => ErrorKind::UnknownStep,
        }
    }
}

impl From<FixtureError> for StepError {
    fn from(err: FixtureError) -> Self {
        match err {
            FixtureError::NotFound { name, searched } => {
                StepError::FixtureNotFound { name, searched }
            }
            other => StepError::Fixture(other),
        }
    }
}

impl From<ClientError> for StepError {
    fn from(err: ClientError) -> Self {
        StepError::Transport(err)
    }
}
