//! Code synthesizer — full replacement content for one work item.

use tracing::{debug, warn};

use coordination::snapshot::canonical_key;
use coordination::{FileArtifact, ToolSchema, WorkItem};

use crate::context::PipelineContext;
use crate::errors::{PipelineError, Stage};
use crate::parser::StructuredOutputParser;
use crate::pipeline::PipelineInput;
use crate::prompts;
use crate::provider::ProviderRequest;

pub struct CodeSynthesizer<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> CodeSynthesizer<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn synthesize(
        &self,
        item: &WorkItem,
        input: &PipelineInput,
    ) -> Result<FileArtifact, PipelineError> {
        let tool = ToolSchema::write_file();
        let request = ProviderRequest::tool_call(
            prompts::generator_system(&input.system_prompt, &input.memory, item, &input.snapshot),
            prompts::generator_user(&input.task, item),
            self.ctx.settings.generator_temperature,
            tool.clone(),
        );
        let response = self
            .ctx
            .call(Stage::Synthesize, Some(item.file_path()), &request)
            .await?;
        let parsed = StructuredOutputParser::new(self.ctx)
            .parse_files(&response, &tool.name, Stage::Synthesize, item.file_path())
            .await?;
        for warning in &parsed.warnings {
            warn!(file = item.file_path(), "{warning}");
        }

        let count = parsed.items.len();
        let artifact = pick_for_item(parsed.items, item.file_path()).ok_or_else(|| {
            PipelineError::parse(Stage::Synthesize, Some(item.file_path()), "no file records recovered")
        })?;
        if count > 1 {
            warn!(
                file = item.file_path(),
                returned = count,
                "model returned several files for one work item, keeping one"
            );
        }
        debug!(file = %artifact.file_path, bytes = artifact.content.len(), "synthesized");
        Ok(artifact)
    }
}

/// The artifact whose path best matches `wanted`: same canonical path, then
/// same basename, then the first. A blank model path takes the item's.
pub fn pick_for_item(artifacts: Vec<FileArtifact>, wanted: &str) -> Option<FileArtifact> {
    let key = canonical_key(wanted).to_lowercase();
    let name = coordination::artifact::basename(wanted).to_lowercase();
    let idx = artifacts
        .iter()
        .position(|a| canonical_key(&a.file_path).to_lowercase() == key)
        .or_else(|| {
            artifacts
                .iter()
                .position(|a| a.basename().to_lowercase() == name)
        })
        .unwrap_or(0);
    let artifact = artifacts.into_iter().nth(idx)?;
    if artifact.file_path.trim().is_empty() {
        return Some(artifact.with_path(wanted));
    }
    Some(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_path_wins_over_order() {
        let picked = pick_for_item(
            vec![
                FileArtifact::new("Other.cs", "a"),
                FileArtifact::new("src/Foo.cs", "b"),
            ],
            "src/Foo.cs",
        )
        .unwrap();
        assert_eq!(picked.content, "b");
    }

    #[test]
    fn basename_match_then_first() {
        let picked = pick_for_item(
            vec![FileArtifact::new("x.cs", "a"), FileArtifact::new("lib/foo.cs", "b")],
            "src/Foo.cs",
        )
        .unwrap();
        assert_eq!(picked.content, "b");

        let picked = pick_for_item(vec![FileArtifact::new("x.cs", "a")], "Foo.cs").unwrap();
        assert_eq!(picked.file_path, "x.cs");
    }

    #[test]
    fn blank_path_takes_the_item_path() {
        let picked = pick_for_item(vec![FileArtifact::new("", "code")], "src/New.cs").unwrap();
        assert_eq!(picked.file_path, "src/New.cs");
        assert!(pick_for_item(Vec::new(), "a").is_none());
    }
}
