//! Self-contained HTML dashboard, written once per run.

use super::{ensure_dir, io_err, reserve_file, RecordedStep, Recorder, Reporter};
use crate::error::ReportError;
use crate::model::StepOutcome;
use chrono::Local;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Escape text for inclusion in HTML element content and
/// attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = r#"
        :root {
            --pass: #22c55e;
            --fail: #ef4444;
            --skip: #f59e0b;
            --bg: #0f172a;
            --panel: #1e293b;
            --text: #f8fafc;
            --muted: #94a3b8;
            --border: #334155;
        }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               background: var(--bg); color: var(--text); margin: 0; padding: 2rem;
               line-height: 1.5; }
        .container { max-width: 1100px; margin: 0 auto; }
        h1 { border-bottom: 2px solid var(--border); padding-bottom: 0.5rem; }
        h2 { color: var(--muted); margin-top: 2rem; }
        .summary { display: grid; gap: 1rem;
                   grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); }
        .stat { background: var(--panel); padding: 1rem; border-radius: 8px;
                border: 1px solid var(--border); }
        .stat-value { font-size: 2rem; font-weight: bold; }
        .stat-label { color: var(--muted); font-size: 0.875rem; }
        table { width: 100%; border-collapse: collapse; background: var(--panel); }
        th, td { padding: 0.5rem 1rem; text-align: left;
                 border-bottom: 1px solid var(--border); }
        .step { background: var(--panel); border: 1px solid var(--border); border-radius: 8px;
                padding: 1rem; margin: 1rem 0; }
        .step h3 { margin: 0 0 0.25rem 0; }
        .description { color: var(--muted); }
        .badge { display: inline-block; padding: 0.15rem 0.5rem; border-radius: 4px;
                 font-size: 0.75rem; font-weight: 600; text-transform: uppercase; }
        .passed { color: var(--pass); }
        .failed { color: var(--fail); }
        .skipped { color: var(--skip); }
        .badge.passed { background: rgba(34, 197, 94, 0.2); }
        .badge.failed { background: rgba(239, 68, 68, 0.2); }
        .badge.skipped { background: rgba(245, 158, 11, 0.2); }
        ul.log { list-style: none; padding-left: 0; font-size: 0.9rem; }
        ul.log time { color: var(--muted); margin-right: 0.5rem; }
        pre { background: var(--bg); padding: 0.75rem; border-radius: 6px;
              overflow-x: auto; font-size: 0.85rem; }
"#;

/// Writes a single HTML dashboard for the whole run.
#[derive(Debug)]
pub struct DashboardReporter {
    out_dir: PathBuf,
    title: String,
    recorder: Recorder,
}

impl DashboardReporter {
    pub fn new<P: AsRef<Path>>(out_dir: P, title: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            title: title.into(),
            recorder: Recorder::default(),
        }
    }

    fn render_step(html: &mut String, step: &RecordedStep) {
        let status = step.outcome.map(|o| o.as_str()).unwrap_or("unknown");
        let _ = write!(
            html,
            r#"        <div class="step {status}">
            <h3>{name} <span class="badge {status}">{status}</span></h3>
            <div class="description">{description}</div>
"#,
            name = escape_html(&step.name),
            description = escape_html(&step.description),
        );

        if !step.logs.is_empty() {
            html.push_str("            <ul class=\"log\">\n");
            for entry in &step.logs {
                let _ = writeln!(
                    html,
                    "                <li><time>{}</time>{}</li>",
                    entry.at.format("%H:%M:%S"),
                    escape_html(&entry.message)
                );
            }
            html.push_str("            </ul>\n");
        }

        for artifact in &step.attachments {
            let _ = writeln!(
                html,
                "            <h4>{} <small>({})</small></h4>",
                escape_html(&artifact.label),
                escape_html(&artifact.mime_type)
            );
            match artifact.as_text() {
                Some(text) => {
                    let _ = writeln!(html, "            <pre>{}</pre>", escape_html(text));
                }
                None => {
                    let _ = writeln!(
                        html,
                        "            <pre>[binary, {} bytes]</pre>",
                        artifact.content.len()
                    );
                }
            }
        }

        if let Some(message) = &step.message {
            let _ = writeln!(
                html,
                "            <p class=\"{status}\">{}</p>",
                escape_html(message)
            );
        }
        html.push_str("        </div>\n");
    }

    /// Render the dashboard for everything recorded so far.
    pub fn render(&self) -> String {
        let steps = self.recorder.steps();
        let passed = self.recorder.count(StepOutcome::Passed);
        let failed = self.recorder.count(StepOutcome::Failed);
        let skipped = self.recorder.count(StepOutcome::Skipped);
        let title = escape_html(&self.title);

        let mut html = String::new();
        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p class="description">Generated {generated}</p>
        <div class="summary">
            <div class="stat">
                <div class="stat-value">{total}</div>
                <div class="stat-label">Steps</div>
            </div>
            <div class="stat">
                <div class="stat-value passed">{passed}</div>
                <div class="stat-label">Passed</div>
            </div>
            <div class="stat">
                <div class="stat-value failed">{failed}</div>
                <div class="stat-label">Failed</div>
            </div>
            <div class="stat">
                <div class="stat-value skipped">{skipped}</div>
                <div class="stat-label">Skipped</div>
            </div>
        </div>
"#,
            generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
            total = steps.len(),
        );

        let environment = self.recorder.environment_entries();
        if !environment.is_empty() {
            html.push_str("        <h2>Environment</h2>\n        <table>\n");
            for (key, value) in environment {
                let _ = writeln!(
                    html,
                    "            <tr><th>{}</th><td>{}</td></tr>",
                    escape_html(key),
                    escape_html(value)
                );
            }
            html.push_str("        </table>\n");
        }

        html.push_str("        <h2>Steps</h2>\n");
        for step in steps {
            Self::render_step(&mut html, step);
        }

        html.push_str("    </div>\n</body>\n</html>\n");
        html
    }
}

impl Reporter for DashboardReporter {
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

        let path = match self.recorder.flushed_path() {
            Some(path) => path.to_path_buf(),
            None => {
                ensure_dir(&self.out_dir)?;
                reserve_file(&self.out_dir, "dashboard", ".html")?
            }
        };

        // Sibling file, then rename over the final path.
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, self.render()).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;

        info!("Dashboard written to {}", path.display());
        self.recorder.mark_flushed(path.clone());
        Ok(Some(path))
    }
}
