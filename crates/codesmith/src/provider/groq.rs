//! Groq: OpenAI-compatible, with two differences.
//!
//! - `tool_choice` is `"required"` rather than a named function.
//! - When the model's tool call fails Groq's own validation, the reply is a
//!   400 with `error.code == "tool_use_failed"` and the model's raw output in
//!   `error.failed_generation`. That text is handed to the salvage tiers as
//!   a single invocation instead of being treated as a bad request.

use serde_json::{json, Value};

use super::openai::{bearer_headers, chat_body, parse_chat_completion};
use super::{
    error_message, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRequest,
    ProviderResponse, StopReason, ToolInvocation,
};
use crate::errors::GatewayError;

const TOOL_USE_FAILED: &str = "tool_use_failed";

pub struct GroqAdapter;

impl ProviderAdapter for GroqAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/chat/completions", config.base_url())
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        bearer_headers(config)
    }

    fn build_body(&self, config: &ProviderConfig, request: &ProviderRequest) -> Value {
        chat_body(config, request, Some(json!("required")))
    }

    fn parse(&self, body: &Value) -> Result<ProviderResponse, GatewayError> {
        parse_chat_completion(body)
    }

    fn recover_error(
        &self,
        status: u16,
        body: &Value,
        request: &ProviderRequest,
    ) -> Option<ProviderResponse> {
        if status != 400 || error_message(body, "/error/code").as_deref() != Some(TOOL_USE_FAILED) {
            return None;
        }
        let generation = error_message(body, "/error/failed_generation")?;
        tracing::info!(
            provider = "groq",
            bytes = generation.len(),
            "recovering failed tool generation"
        );
        let name = request.tool_name().unwrap_or_default();
        Some(ProviderResponse {
            stop_reason: StopReason::ToolUse,
            invocations: vec![ToolInvocation::from_text(name, generation)],
            text: None,
            raw_body: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::ToolSchema;

    fn request() -> ProviderRequest {
        ProviderRequest::tool_call("s", "u", 0.4, ToolSchema::write_file())
    }

    #[test]
    fn tool_choice_is_required() {
        let cfg = ProviderConfig::new(ProviderKind::Groq, "gsk");
        let body = GroqAdapter.build_body(&cfg, &request());
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(GroqAdapter.endpoint(&cfg), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn failed_generation_becomes_raw_invocation() {
        let body = json!({"error": {
            "code": "tool_use_failed",
            "message": "Failed to call a function",
            "failed_generation": "{\"FilePath\": \"a.cs\", \"Content\": \"class A \\{ \\}\"}"
        }});
        let resp = GroqAdapter.recover_error(400, &body, &request()).unwrap();
        assert_eq!(resp.invocations.len(), 1);
        assert_eq!(resp.invocations[0].name, "write_file");
        assert!(resp.invocations[0].arguments.is_empty());
        assert!(resp.invocations[0].raw_arguments.contains("class A"));
    }

    #[test]
    fn other_bad_requests_are_not_recovered() {
        let body = json!({"error": {"code": "invalid_api_key", "message": "nope"}});
        assert!(GroqAdapter.recover_error(400, &body, &request()).is_none());
        let body = json!({"error": {"code": "tool_use_failed", "failed_generation": "x"}});
        assert!(GroqAdapter.recover_error(401, &body, &request()).is_none());
    }
}
