//! Task splitter — one planning call turns a task into file work items.

use std::collections::HashSet;

use tracing::{info, warn};

use coordination::snapshot::canonical_key;
use coordination::{PathResolver, ProjectSnapshot, ResolutionPolicy, TaskKind, ToolSchema, WorkItem};

use crate::context::PipelineContext;
use crate::errors::{PipelineError, Stage};
use crate::parser::StructuredOutputParser;
use crate::pipeline::PipelineInput;
use crate::prompts;
use crate::provider::ProviderRequest;

pub struct TaskSplitter<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> TaskSplitter<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Plan the files `input.task` touches. An empty plan is an error.
    pub async fn split(&self, input: &PipelineInput) -> Result<Vec<WorkItem>, PipelineError> {
        let tool = ToolSchema::plan_files();
        let request = ProviderRequest::tool_call(
            prompts::planner_system(&input.system_prompt, &input.memory),
            prompts::planner_user(&input.task, &input.snapshot),
            self.ctx.settings.planner_temperature,
            tool.clone(),
        );
        let response = self.ctx.call(Stage::Plan, None, &request).await?;
        let parsed = StructuredOutputParser::new(self.ctx).parse_plan(&response, &tool.name)?;
        for warning in &parsed.warnings {
            warn!(stage = %Stage::Plan, "{warning}");
        }

        let items = dedupe(parsed.items, &input.snapshot, self.ctx.settings.path_resolution);
        if items.is_empty() {
            return Err(PipelineError::NoTasks);
        }
        info!(
            items = items.len(),
            modify = items.iter().filter(|i| i.kind() == TaskKind::Modify).count(),
            tier = %parsed.tier,
            "task split into work items"
        );
        Ok(items)
    }
}

/// Drop items whose resolved path and kind repeat an earlier item. Paths that
/// do not resolve (or resolve ambiguously) are compared by canonical form.
pub fn dedupe(
    items: Vec<WorkItem>,
    snapshot: &ProjectSnapshot,
    policy: ResolutionPolicy,
) -> Vec<WorkItem> {
    let resolver = PathResolver::new(snapshot, policy);
    let mut seen: HashSet<(String, TaskKind)> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if item.file_path().trim().is_empty() {
            warn!("dropping work item with an empty path");
            continue;
        }
        let key = match resolver.resolve(item.file_path()) {
            Ok(resolution) => resolution.path().to_string(),
            Err(_) => canonical_key(item.file_path()),
        };
        if seen.insert((key, item.kind())) {
            out.push(item);
        } else {
            warn!(file = item.file_path(), kind = %item.kind(), "dropping duplicate work item");
        }
    }
    out
}
