//! Structured output parser — provider responses in, artifacts out.
//!
//! Tiers 1–3 are the offline salvage chain in `coordination::salvage`, run
//! once per tool invocation. Tier 4 (`model_reformat`) is the only one that
//! needs a provider, so it lives here:
//!
//! ```text
//! invocation ──strict──▶ ok
//!            ──brace_escape──▶ ok
//!            ──regex_salvage──▶ ok
//!            ──model_reformat (file content only, if enabled)──▶ ok
//!            └──▶ ParseError, nothing touches disk
//! ```
//!
//! Later tiers are never invoked once an earlier one succeeds. The worst
//! tier used across invocations is reported with the result.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use coordination::salvage::{self, loose_content, loose_path, normalize_escaped_newlines};
use coordination::{FileArtifact, ParseTier, RecordShape, ToolPayload, ToolRecord, WorkItem};

use crate::context::PipelineContext;
use crate::errors::{PipelineError, Stage};
use crate::prompts;
use crate::provider::{ProviderRequest, ProviderResponse, StopReason};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("FENCED_BLOCK regex should compile")
});

/// Parsed items plus the tier that served them.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    /// Worst tier used across all invocations.
    pub tier: ParseTier,
    pub warnings: Vec<String>,
}

/// Result of tiers 1–3 over every invocation in a response.
#[derive(Debug, Clone, Default)]
pub struct OfflineParse {
    pub records: Vec<ToolRecord>,
    pub tier: Option<ParseTier>,
    /// Payloads no offline tier could recover.
    pub unrecovered: Vec<ToolPayload>,
    pub warnings: Vec<String>,
}

impl OfflineParse {
    fn note_tier(&mut self, tier: ParseTier) {
        self.tier = Some(self.tier.map_or(tier, |t| t.max(tier)));
    }
}

/// Pick the payloads to parse: invocations of `tool` (or, if the model named
/// none of them correctly, every invocation), else the free text.
pub fn payloads(response: &ProviderResponse, tool: &str) -> Result<Vec<ToolPayload>, String> {
    if let StopReason::Other(reason) = &response.stop_reason {
        return Err(format!("Unexpected response stop reason: {reason}"));
    }
    let named: Vec<ToolPayload> = response
        .invocations
        .iter()
        .filter(|i| i.name == tool || i.name.is_empty())
        .map(|i| i.to_payload())
        .collect();
    if !named.is_empty() {
        return Ok(named);
    }
    if !response.invocations.is_empty() {
        warn!(expected = tool, "model called an unexpected tool, parsing its arguments anyway");
        return Ok(response.invocations.iter().map(|i| i.to_payload()).collect());
    }
    match response.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(vec![ToolPayload::from_raw(text)]),
        _ => Err(format!(
            "no tool call in response (stop reason: {})",
            response.stop_reason
        )),
    }
}

/// Tiers 1–3 only. Deterministic: the same response always yields the same
/// records.
pub fn parse_offline(payloads: &[ToolPayload], shape: RecordShape) -> OfflineParse {
    let mut out = OfflineParse::default();
    for payload in payloads {
        let resp = salvage::salvage(payload, shape);
        match (resp.payload, ParseTier::from_name(&resp.served_by)) {
            (Some(records), Some(tier)) => {
                out.note_tier(tier);
                out.records.extend(records);
                out.warnings.extend(resp.warnings);
            }
            _ => {
                out.warnings.extend(resp.warnings);
                out.unrecovered.push(payload.clone());
            }
        }
    }
    out
}

pub struct StructuredOutputParser<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> StructuredOutputParser<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Planner output into work items. No model-assisted tier: a plan is
    /// either recoverable offline or not at all.
    pub fn parse_plan(
        &self,
        response: &ProviderResponse,
        tool: &str,
    ) -> Result<Parsed<WorkItem>, PipelineError> {
        let payloads =
            payloads(response, tool).map_err(|reason| PipelineError::parse(Stage::Plan, None, reason))?;
        let mut offline = parse_offline(&payloads, RecordShape::Plan);
        let Some(tier) = offline.tier else {
            // Well-formed but empty: the model planned nothing.
            if payloads.iter().all(is_json) {
                return Ok(Parsed {
                    items: Vec::new(),
                    tier: ParseTier::Strict,
                    warnings: offline.warnings,
                });
            }
            return Err(PipelineError::parse(
                Stage::Plan,
                None,
                exhausted_reason(&offline.warnings),
            ));
        };

        let mut items = Vec::new();
        for record in &offline.records {
            match record.to_work_item() {
                Some(item) => items.push(item),
                None => offline.warnings.push(format!(
                    "skipping plan entry `{}` with invalid TaskId `{}`",
                    record.file_path, record.value
                )),
            }
        }
        log_tier(Stage::Plan, None, tier);
        Ok(Parsed {
            items,
            tier,
            warnings: offline.warnings,
        })
    }

    /// File-content output into artifacts, escalating to the model-assisted
    /// tier for invocations the offline tiers could not recover.
    pub async fn parse_files(
        &self,
        response: &ProviderResponse,
        tool: &str,
        stage: Stage,
        hint_path: &str,
    ) -> Result<Parsed<FileArtifact>, PipelineError> {
        let payloads = payloads(response, tool)
            .map_err(|reason| PipelineError::parse(stage, Some(hint_path), reason))?;
        let mut offline = parse_offline(&payloads, RecordShape::FileContent);
        let mut items: Vec<FileArtifact> = offline
            .records
            .drain(..)
            .map(ToolRecord::into_artifact)
            .collect();
        let mut tier = offline.tier;

        if !offline.unrecovered.is_empty() {
            if self.ctx.settings.model_reformat {
                for payload in &offline.unrecovered {
                    items.push(self.reformat(payload, stage, hint_path).await?);
                }
                tier = Some(ParseTier::ModelReformat);
            } else if items.is_empty() {
                return Err(PipelineError::parse(
                    stage,
                    Some(hint_path),
                    exhausted_reason(&offline.warnings),
                ));
            } else {
                offline.warnings.push(format!(
                    "{} invocation(s) unrecoverable and model reformat is disabled",
                    offline.unrecovered.len()
                ));
            }
        }

        let Some(tier) = tier.filter(|_| !items.is_empty()) else {
            return Err(PipelineError::parse(stage, Some(hint_path), "no file records recovered"));
        };
        log_tier(stage, Some(hint_path), tier);
        Ok(Parsed {
            items,
            tier,
            warnings: offline.warnings,
        })
    }

    /// Tier 4: ask the model to reproduce the damaged content verbatim in a
    /// fenced block.
    async fn reformat(
        &self,
        payload: &ToolPayload,
        stage: Stage,
        hint_path: &str,
    ) -> Result<FileArtifact, PipelineError> {
        let path = loose_path(&payload.raw).unwrap_or_else(|| hint_path.to_string());
        let damaged = normalize_escaped_newlines(&loose_content(&payload.raw));
        let request = ProviderRequest::plain(
            prompts::REFORMAT_PREAMBLE,
            prompts::reformat_user(&damaged),
            0.0,
        );
        let response = self.ctx.call(stage, Some(hint_path), &request).await?;
        let reply = response.text.unwrap_or_default();
        let content = extract_fenced_block(&reply).ok_or_else(|| {
            PipelineError::parse(
                stage,
                Some(hint_path),
                "all tiers failed: reformat reply had no fenced code block",
            )
        })?;
        Ok(FileArtifact::new(path, content))
    }
}

/// Body of the first fenced code block, without the fence lines.
pub fn extract_fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_json(payload: &ToolPayload) -> bool {
    serde_json::from_str::<serde_json::Value>(payload.raw.trim()).is_ok()
}

fn exhausted_reason(warnings: &[String]) -> String {
    if warnings.is_empty() {
        "all parse tiers failed".to_string()
    } else {
        format!("all parse tiers failed ({})", warnings.join("; "))
    }
}

fn log_tier(stage: Stage, file: Option<&str>, tier: ParseTier) {
    if tier == ParseTier::Strict {
        debug!(stage = %stage, file = file.unwrap_or("-"), tier = %tier, "structured output parsed");
    } else {
        info!(stage = %stage, file = file.unwrap_or("-"), tier = %tier, "structured output recovered by fallback tier");
    }
}
