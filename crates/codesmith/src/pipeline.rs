//! Sequential pipeline driver.
//!
//! ```text
//! task + snapshot ──▶ TaskSplitter ──▶ [WorkItem] ──┐
//!                                                   │ one at a time, cooldown between
//!        ┌──────────────────────────────────────────┘
//!        ▼
//!   CodeSynthesizer ──▶ Reconciler (merge if Modify) ──▶ CommitWriter ──▶ observers
//! ```
//!
//! Items already committed are never rolled back. An auth failure stops the
//! queue; any other failure aborts only its own item unless
//! `on_file_error = "stop"`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use coordination::{CommitReceipt, CommitWriter, FileArtifact, ProjectSnapshot, WorkItem};

use crate::config::{CodesmithConfig, OnFileError, PathsConfig};
use crate::context::PipelineContext;
use crate::errors::{FailureReport, PipelineError};
use crate::observer::PipelineObserver;
use crate::provider::{ChatTransport, ProviderConfig, ProviderGateway};
use crate::reconciler::Reconciler;
use crate::splitter::TaskSplitter;
use crate::synthesizer::CodeSynthesizer;

/// Everything the external collaborators hand the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub task: String,
    pub snapshot: ProjectSnapshot,
    /// Opaque; prepended to every stage's own instructions.
    pub system_prompt: String,
    /// Pre-concatenated memory files, possibly empty.
    pub memory: String,
}

impl PipelineInput {
    pub fn new(task: impl Into<String>, snapshot: ProjectSnapshot) -> Self {
        Self {
            task: task.into(),
            snapshot,
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub work_items: Vec<WorkItem>,
    pub committed: Vec<CommitReceipt>,
    pub failures: Vec<FailureReport>,
    /// `true` when items were left unprocessed.
    pub aborted: bool,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        !self.aborted && self.failures.is_empty()
    }
}

pub struct Pipeline {
    ctx: PipelineContext,
    writer: CommitWriter,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, writer: CommitWriter) -> Self {
        Self { ctx, writer }
    }

    /// Wire a pipeline rooted at `root` from loaded configuration.
    pub fn from_config(
        config: &CodesmithConfig,
        root: &Path,
        provider: ProviderConfig,
        transport: Arc<dyn ChatTransport>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        let ctx = PipelineContext::new(
            ProviderGateway::new(transport),
            provider,
            config.pipeline.clone(),
        )
        .with_observer(observer);
        let writer = CommitWriter::new(
            root,
            PathsConfig::under(root, &config.paths.backup_dir),
            config.pipeline.line_ending.resolve(),
        );
        Self::new(ctx, writer)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Plan only; nothing is generated or written.
    pub async fn plan(&self, input: &PipelineInput) -> Result<Vec<WorkItem>, PipelineError> {
        TaskSplitter::new(&self.ctx).split(input).await
    }

    pub async fn run(&self, input: &PipelineInput) -> PipelineReport {
        let mut report = PipelineReport::default();
        info!(
            provider = %self.ctx.provider.kind,
            model = %self.ctx.provider.model,
            files = input.snapshot.len(),
            "pipeline started"
        );

        let items = match self.plan(input).await {
            Ok(items) => items,
            Err(e) => {
                self.record_failure(&mut report, &e);
                report.aborted = true;
                return report;
            }
        };
        report.work_items = items.clone();

        let cooldown = self.ctx.settings.cooldown();
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 && !cooldown.is_zero() {
                tokio::time::sleep(cooldown).await;
            }
            info!(file = item.file_path(), kind = %item.kind(), n = idx + 1, of = items.len(), "processing work item");

            match self.process(item, input).await {
                Ok(receipt) => report.committed.push(receipt),
                Err(e) => {
                    self.record_failure(&mut report, &e);
                    let remaining = items.len() - idx - 1;
                    if e.is_fatal() {
                        report.aborted = remaining > 0;
                        warn!(remaining, "fatal failure, stopping the queue");
                        break;
                    }
                    if self.ctx.settings.on_file_error == OnFileError::Stop && remaining > 0 {
                        report.aborted = true;
                        warn!(remaining, "on_file_error = stop, stopping the queue");
                        break;
                    }
                }
            }
        }

        info!(
            committed = report.committed.len(),
            failed = report.failures.len(),
            aborted = report.aborted,
            "pipeline finished"
        );
        report
    }

    /// One work item end to end.
    async fn process(
        &self,
        item: &WorkItem,
        input: &PipelineInput,
    ) -> Result<CommitReceipt, PipelineError> {
        let generated = CodeSynthesizer::new(&self.ctx).synthesize(item, input).await?;
        let reconciled = Reconciler::new(&self.ctx)
            .reconcile(item, generated, input)
            .await?;
        let artifact = reconciled.artifact;

        let receipt = self
            .writer
            .commit(&artifact)
            .map_err(|source| PipelineError::Io {
                file: artifact.file_path.clone(),
                source,
            })?;
        let written = self.writer.line_ending().normalize(&artifact.content);
        let committed = FileArtifact::new(receipt.path.clone(), written);
        self.ctx.observer.file_committed(&committed, &receipt);
        Ok(receipt)
    }

    fn record_failure(&self, report: &mut PipelineReport, err: &PipelineError) {
        let failure = err.report();
        error!(
            stage = %failure.stage,
            file = failure.file_path.as_deref().unwrap_or("-"),
            "{}",
            failure.reason
        );
        self.ctx.observer.failed(&failure);
        report.failures.push(failure);
    }
}
