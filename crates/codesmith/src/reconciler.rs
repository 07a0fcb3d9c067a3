//! Reconciler — resolve the artifact's path, then merge or pass through.
//!
//! | Kind   | Resolved path in snapshot | Outcome                                 |
//! |--------|---------------------------|-----------------------------------------|
//! | Create | any                       | pass through at the resolved path       |
//! | Modify | yes, with content         | merge call; merged content is final     |
//! | Modify | yes, content unavailable  | `MergeError`                            |
//! | Modify | no                        | `PathResolutionError`, no blind overwrite |

use tracing::{info, warn};

use coordination::{
    FileArtifact, PathResolver, Resolution, ResolveError, TaskKind, ToolSchema, WorkItem,
};

use crate::context::PipelineContext;
use crate::errors::{PipelineError, Stage};
use crate::parser::StructuredOutputParser;
use crate::pipeline::PipelineInput;
use crate::prompts;
use crate::provider::ProviderRequest;
use crate::synthesizer::pick_for_item;

/// Final artifact plus how its path was decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub artifact: FileArtifact,
    pub resolution: Resolution,
    /// Whether the content came from a merge call.
    pub merged: bool,
}

pub struct Reconciler<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(
        &self,
        item: &WorkItem,
        artifact: FileArtifact,
        input: &PipelineInput,
    ) -> Result<Reconciled, PipelineError> {
        let resolution = self.resolve(item, &artifact, input)?;

        if item.kind() == TaskKind::Create {
            let artifact = artifact.with_path(resolution.path());
            return Ok(Reconciled {
                artifact,
                resolution,
                merged: false,
            });
        }

        if !resolution.is_known() {
            return Err(PipelineError::PathResolution {
                file: artifact.file_path.clone(),
                reason: "merge target missing from project snapshot".to_string(),
            });
        }
        let path = resolution.path().to_string();
        let existing = input.snapshot.get(&path).ok_or_else(|| PipelineError::Merge {
            file: path.clone(),
            reason: "no existing content to merge with".to_string(),
        })?;

        let merged = self.merge(&path, existing, &artifact.content, input).await?;
        Ok(Reconciled {
            artifact: merged,
            resolution,
            merged: true,
        })
    }

    /// The artifact's own path first; if the snapshot knows nothing of it,
    /// the planned item path.
    fn resolve(
        &self,
        item: &WorkItem,
        artifact: &FileArtifact,
        input: &PipelineInput,
    ) -> Result<Resolution, PipelineError> {
        let resolver = PathResolver::new(&input.snapshot, self.ctx.settings.path_resolution);
        let to_error = |e: ResolveError| PipelineError::PathResolution {
            file: artifact.file_path.clone(),
            reason: e.to_string(),
        };

        let first = resolver.resolve(&artifact.file_path).map_err(to_error)?;
        if first.is_known() || artifact.file_path == item.file_path() {
            return Ok(first);
        }
        let second = resolver.resolve(item.file_path()).map_err(to_error)?;
        if second.is_known() {
            warn!(
                model_path = %artifact.file_path,
                planned_path = item.file_path(),
                "model path unknown, using the planned path"
            );
            return Ok(second);
        }
        Ok(first)
    }

    async fn merge(
        &self,
        path: &str,
        existing: &str,
        generated: &str,
        input: &PipelineInput,
    ) -> Result<FileArtifact, PipelineError> {
        let tool = ToolSchema::merge_file();
        let request = ProviderRequest::tool_call(
            prompts::merge_system(&input.system_prompt, &input.memory),
            prompts::merge_user(path, existing, generated),
            self.ctx.settings.merge_temperature,
            tool.clone(),
        );
        let response = self.ctx.call(Stage::Merge, Some(path), &request).await?;
        let parsed = StructuredOutputParser::new(self.ctx)
            .parse_files(&response, &tool.name, Stage::Merge, path)
            .await?;
        let merged = pick_for_item(parsed.items, path).ok_or_else(|| PipelineError::Merge {
            file: path.to_string(),
            reason: "merge reply contained no file".to_string(),
        })?;
        info!(file = path, tier = %parsed.tier, bytes = merged.content.len(), "merged");
        // The merge target is fixed; the model does not get to move the file.
        Ok(merged.with_path(path))
    }
}
