//! Pipeline observers — the outward-facing side effects of a run.
//!
//! Nothing inside the pipeline depends on an observer; they only watch.
//! Three sinks ship with the crate:
//! - `TracingObserver`: structured log lines for prompts and commits
//!   (failures are logged by the pipeline itself)
//! - `PromptAuditLog`: append-only JSONL of every prompt sent
//! - `ResultsArchive`: one JSON file per raw model response

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use coordination::{CommitReceipt, FileArtifact};

use crate::errors::{FailureReport, Stage};
use crate::provider::ProviderResponse;

/// One prompt as it was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub file: Option<String>,
    pub provider: String,
    pub model: String,
    pub prompt_version: String,
    pub tool: Option<String>,
    pub temperature: f32,
    pub system: String,
    pub user: String,
}

pub trait PipelineObserver: Send + Sync {
    fn prompt_sent(&self, _record: &PromptRecord) {}

    fn raw_response(&self, _stage: Stage, _file: Option<&str>, _response: &ProviderResponse) {}

    /// A file reached disk. The content is the final, committed content.
    fn file_committed(&self, _artifact: &FileArtifact, _receipt: &CommitReceipt) {}

    fn failed(&self, _report: &FailureReport) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

// ── Fan-out ──────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl PipelineObserver for ObserverSet {
    fn prompt_sent(&self, record: &PromptRecord) {
        for o in &self.observers {
            o.prompt_sent(record);
        }
    }

    fn raw_response(&self, stage: Stage, file: Option<&str>, response: &ProviderResponse) {
        for o in &self.observers {
            o.raw_response(stage, file, response);
        }
    }

    fn file_committed(&self, artifact: &FileArtifact, receipt: &CommitReceipt) {
        for o in &self.observers {
            o.file_committed(artifact, receipt);
        }
    }

    fn failed(&self, report: &FailureReport) {
        for o in &self.observers {
            o.failed(report);
        }
    }
}

// ── Tracing ──────────────────────────────────────────────────────────────────

pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn prompt_sent(&self, record: &PromptRecord) {
        info!(
            stage = %record.stage,
            file = record.file.as_deref().unwrap_or("-"),
            provider = %record.provider,
            model = %record.model,
            bytes = record.system.len() + record.user.len(),
            "prompt sent"
        );
    }

    fn file_committed(&self, _artifact: &FileArtifact, receipt: &CommitReceipt) {
        info!(
            file = %receipt.path,
            bytes = receipt.bytes,
            created = receipt.created,
            "file written"
        );
    }
}

// ── Prompt audit log ─────────────────────────────────────────────────────────

/// Appends every prompt to a JSONL file. Failures are logged, never raised.
pub struct PromptAuditLog {
    path: PathBuf,
}

impl PromptAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PipelineObserver for PromptAuditLog {
    fn prompt_sent(&self, record: &PromptRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize prompt record: {e}");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create prompt log directory: {e}");
                return;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{json}") {
                    warn!("Failed to append prompt record: {e}");
                }
            }
            Err(e) => warn!("Failed to open prompt log: {e}"),
        }
    }
}

// ── Results archive ──────────────────────────────────────────────────────────

/// Persists every raw model response as its own JSON file for audit.
pub struct ResultsArchive {
    dir: PathBuf,
}

impl ResultsArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(stage: Stage, file: Option<&str>) -> String {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let subject: String = file
            .map(coordination::artifact::basename)
            .unwrap_or("task")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("{stamp}-{stage}-{subject}.json")
    }
}

impl PipelineObserver for ResultsArchive {
    fn raw_response(&self, stage: Stage, file: Option<&str>, response: &ProviderResponse) {
        let raw_body = serde_json::from_str::<serde_json::Value>(&response.raw_body)
            .unwrap_or_else(|_| json!(response.raw_body));
        let record = json!({
            "stage": stage,
            "file": file,
            "stop_reason": response.stop_reason.to_string(),
            "invocations": response.invocations,
            "text": response.text,
            "raw_body": raw_body,
        });
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create results directory: {e}");
            return;
        }
        let path = self.dir.join(Self::file_name(stage, file));
        match serde_json::to_string_pretty(&record) {
            Ok(text) => {
                if let Err(e) = fs::write(&path, text) {
                    warn!("Failed to archive model response: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize model response: {e}"),
        }
    }
}
