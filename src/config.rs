//! Suite configuration: endpoint, credentials, fixtures and reports.

use crate::api_client::RequestSpec;
use crate::places::{PlaceResources, PlaceSettings};
use crate::report::{DashboardReporter, Reporter, StepReporter, TeeReporter};
use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Reporting backend selectable from config or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    /// Per-step result documents with attachments.
    Steps,
    /// Single HTML dashboard.
    Dashboard,
}

/// Everything a run needs, with defaults for the public demo API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub name: String,
    pub base_url: String,
    pub base_path: String,
    pub api_key: String,
    pub new_address: String,
    pub resources: PlaceResources,
    pub fixture_dir: PathBuf,
    pub report_dir: PathBuf,
    pub reporters: Vec<ReporterKind>,
    /// Per-request timeout; unset keeps the transport default.
    pub timeout_secs: Option<u64>,
    /// Headers the add response must carry.
    pub expected_headers: HashMap<String, String>,
    /// Labels stamped on step-level results (e.g. `epic`).
    pub labels: BTreeMap<String, String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let settings = PlaceSettings::default();
        Self {
            name: "Place CRUD".to_string(),
            base_url: "https://rahulshettyacademy.com".to_string(),
            base_path: "/maps/api/place".to_string(),
            api_key: settings.api_key,
            new_address: settings.new_address,
            resources: settings.resources,
            fixture_dir: PathBuf::from("fixtures/payloads"),
            report_dir: PathBuf::from("target/reports"),
            reporters: vec![ReporterKind::Steps, ReporterKind::Dashboard],
            timeout_secs: None,
            expected_headers: HashMap::new(),
            labels: BTreeMap::from([
                ("epic".to_string(), "CRUD Operations".to_string()),
                ("feature".to_string(), "GoogleMapReplica API".to_string()),
            ]),
        }
    }
}

impl SuiteConfig {
    /// Files tried in order when no config path is given.
    pub const DEFAULT_PATHS: [&'static str; 2] = ["waypoint.yaml", "tests/waypoint.yaml"];

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading suite config from {}", path.display());

        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .context(format!("Failed to parse YAML from {}", path.display()))?;

        debug!("Loaded suite config: {}", config.name);
        Ok(config)
    }

    /// Load `path` if given, else the first default path that
    /// exists, else built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        for candidate in Self::DEFAULT_PATHS {
            if Path::new(candidate).is_file() {
                return Self::load(candidate);
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn request_spec(&self) -> RequestSpec {
        RequestSpec::new(&self.base_url)
            .base_path(&self.base_path)
            .query_param("key", &self.api_key)
            .timeout(self.timeout_secs.map(Duration::from_secs))
    }

    pub fn place_settings(&self) -> PlaceSettings {
        PlaceSettings {
            api_key: self.api_key.clone(),
            new_address: self.new_address.clone(),
            resources: self.resources.clone(),
            expected_headers: self.expected_headers.clone(),
        }
    }

    /// Values shown in the environment section of each report.
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            (
                "Full Base URL".to_string(),
                self.request_spec().endpoint(""),
            ),
            ("API Key".to_string(), self.api_key.clone()),
            (
                "Timestamp".to_string(),
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        ]
    }

    fn build_backend(&self, kind: ReporterKind) -> Box<dyn Reporter> {
        match kind {
            ReporterKind::Steps => {
                let reporter = self
                    .labels
                    .iter()
                    .fold(StepReporter::new(&self.report_dir, &self.name), |r, (k, v)| {
                        r.with_label(k, v)
                    });
                Box::new(reporter)
            }
            ReporterKind::Dashboard => {
                Box::new(DashboardReporter::new(&self.report_dir, &self.name))
            }
        }
    }

    /// Configured reporter kinds, first occurrence wins.
    pub fn reporter_kinds(&self) -> Vec<ReporterKind> {
        let mut kinds = Vec::new();
        for kind in &self.reporters {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    /// The configured reporter; several kinds are combined with a
    /// [`TeeReporter`].
    pub fn build_reporter(&self) -> Box<dyn Reporter> {
        let kinds = self.reporter_kinds();
        match kinds.as_slice() {
            [single] => self.build_backend(*single),
            [] => self.build_backend(ReporterKind::Dashboard),
            many => Box::new(TeeReporter::new(
                many.iter().map(|k| self.build_backend(*k)).collect(),
            )),
        }
    }
}
